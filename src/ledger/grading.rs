//! Grading rules: winner determination and selection matching.
//!
//! Pure functions over score payloads and ledger entries. Malformed score
//! data yields no winner — the caller degrades such entries to void rather
//! than dropping them.

use crate::data::EventScore;
use crate::types::Event;

/// Determine the winning team from a completed event's score data.
///
/// The higher of the two reported scores wins; equal scores are a "Draw";
/// missing or unparseable scores mean no winner can be determined.
pub fn determine_winner(score: &EventScore) -> Option<String> {
    if score.scores.len() < 2 {
        return None;
    }

    let a = &score.scores[0];
    let b = &score.scores[1];
    let a_score: i64 = a.score.trim().parse().ok()?;
    let b_score: i64 = b.score.trim().parse().ok()?;

    if a_score > b_score {
        Some(a.name.clone())
    } else if b_score > a_score {
        Some(b.name.clone())
    } else {
        Some("Draw".to_string())
    }
}

/// Whether a recommendation's selection matches the actual winner.
///
/// Tried in order: exact name match, home/away keyword match against the
/// event's team names, draw match, then a substring match as a last
/// resort for abbreviated team names.
pub fn selection_matches_winner(selection: &str, winner: &str, event: &Event) -> bool {
    let sel = selection.trim().to_lowercase();
    let win = winner.trim().to_lowercase();

    if sel == win {
        return true;
    }

    let home = event.home_team.trim().to_lowercase();
    let away = event.away_team.trim().to_lowercase();

    if sel == "home" || sel == home {
        return win == home;
    }
    if sel == "away" || sel == away {
        return win == away;
    }
    if sel == "draw" {
        return win == "draw";
    }

    win.contains(sel.as_str()) || sel.contains(win.as_str())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TeamScore;
    use crate::types::EventStatus;
    use chrono::Utc;

    fn score(completed: bool, pairs: &[(&str, &str)]) -> EventScore {
        EventScore {
            external_id: "x".to_string(),
            completed,
            scores: pairs
                .iter()
                .map(|(name, score)| TeamScore {
                    name: name.to_string(),
                    score: score.to_string(),
                })
                .collect(),
        }
    }

    fn event(home: &str, away: &str) -> Event {
        Event {
            id: 1,
            external_id: "x".to_string(),
            sport_key: "soccer_epl".to_string(),
            sport_title: "EPL".to_string(),
            name: format!("{home} vs {away}"),
            home_team: home.to_string(),
            away_team: away.to_string(),
            start_time: Utc::now() - chrono::Duration::hours(3),
            status: EventStatus::Upcoming,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    // ---- determine_winner --------------------------------------------------

    #[test]
    fn test_winner_higher_score() {
        let s = score(true, &[("TeamA", "3"), ("TeamB", "1")]);
        assert_eq!(determine_winner(&s).as_deref(), Some("TeamA"));

        let s = score(true, &[("TeamA", "0"), ("TeamB", "2")]);
        assert_eq!(determine_winner(&s).as_deref(), Some("TeamB"));
    }

    #[test]
    fn test_winner_equal_scores_is_draw() {
        let s = score(true, &[("TeamA", "2"), ("TeamB", "2")]);
        assert_eq!(determine_winner(&s).as_deref(), Some("Draw"));
    }

    #[test]
    fn test_winner_malformed_scores() {
        assert!(determine_winner(&score(true, &[("TeamA", "3")])).is_none());
        assert!(determine_winner(&score(true, &[])).is_none());
        assert!(determine_winner(&score(true, &[("TeamA", "abc"), ("TeamB", "1")])).is_none());
        assert!(determine_winner(&score(true, &[("TeamA", ""), ("TeamB", "1")])).is_none());
    }

    #[test]
    fn test_winner_whitespace_tolerated() {
        let s = score(true, &[("TeamA", " 3 "), ("TeamB", "1")]);
        assert_eq!(determine_winner(&s).as_deref(), Some("TeamA"));
    }

    // ---- selection_matches_winner ------------------------------------------

    #[test]
    fn test_match_exact_name() {
        let ev = event("Arsenal", "Chelsea");
        assert!(selection_matches_winner("Arsenal", "Arsenal", &ev));
        assert!(selection_matches_winner("arsenal", "ARSENAL", &ev));
        assert!(!selection_matches_winner("Chelsea", "Arsenal", &ev));
    }

    #[test]
    fn test_match_home_keyword() {
        let ev = event("Arsenal", "Chelsea");
        assert!(selection_matches_winner("home", "Arsenal", &ev));
        assert!(!selection_matches_winner("home", "Chelsea", &ev));
        // Team name selection behaves like the keyword.
        assert!(selection_matches_winner("Arsenal", "Arsenal", &ev));
    }

    #[test]
    fn test_match_away_keyword() {
        let ev = event("Arsenal", "Chelsea");
        assert!(selection_matches_winner("away", "Chelsea", &ev));
        assert!(!selection_matches_winner("away", "Arsenal", &ev));
    }

    #[test]
    fn test_match_draw() {
        let ev = event("Arsenal", "Chelsea");
        assert!(selection_matches_winner("draw", "Draw", &ev));
        assert!(!selection_matches_winner("draw", "Arsenal", &ev));
        assert!(!selection_matches_winner("home", "Draw", &ev));
    }

    #[test]
    fn test_match_substring_fallback() {
        // Abbreviated selection against the full reported name.
        let ev = event("Oklahoma City Thunder", "Boston Celtics");
        assert!(selection_matches_winner("Thunder", "Oklahoma City Thunder", &ev));
    }
}
