use crate::types::MatchRow;

/// Epoch-millisecond timestamp of the newest persisted game, or `None` when
/// the dataset is empty (fetch everything). The fetcher resumes from the
/// following millisecond, so the boundary record is never re-requested.
pub fn resolve(existing: &[MatchRow]) -> Option<i64> {
    existing.iter().map(|r| r.created_at.timestamp_millis()).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{encode_matches, parse_matches};
    use crate::types::{Color, GameResult};
    use chrono::{TimeZone, Utc};

    fn row(game_id: &str, created_ms: i64) -> MatchRow {
        MatchRow {
            game_id: game_id.to_string(),
            rated: false,
            speed: "bullet".to_string(),
            created_at: Utc.timestamp_millis_opt(created_ms).unwrap(),
            last_move_at: Utc.timestamp_millis_opt(created_ms).unwrap(),
            status: "outoftime".to_string(),
            source: "lobby".to_string(),
            player_name: "alice".to_string(),
            played_as: Color::Black,
            opponent_name: Some("Bob".to_string()),
            opponent_color: Color::White,
            player_rating: None,
            player_rating_diff: None,
            opponent_rating: None,
            opponent_rating_diff: None,
            result: GameResult::Lose,
            opening_eco: None,
            opening_name: None,
            opening_ply: None,
            tournament: false,
            time_control: None,
            move_count: None,
            turns: None,
        }
    }

    #[test]
    fn empty_dataset_has_no_watermark() {
        assert_eq!(resolve(&[]), None);
    }

    #[test]
    fn watermark_is_the_newest_created_at() {
        let rows = [row("g1", 1000), row("g2", 3000), row("g3", 2000)];
        assert_eq!(resolve(&rows), Some(3000));
    }

    #[test]
    fn watermark_survives_a_csv_round_trip() {
        let rows = vec![row("g1", 1_600_000_000_123), row("g2", 1_600_000_000_999)];
        let reloaded = parse_matches(&encode_matches(&rows).unwrap());
        assert_eq!(resolve(&reloaded), resolve(&rows));
        assert_eq!(resolve(&reloaded), Some(1_600_000_000_999));
    }

    #[test]
    fn unreadable_dataset_degrades_to_full_fetch() {
        let reloaded = parse_matches(b"\x00\x01 completely bogus \xff");
        assert_eq!(resolve(&reloaded), None);
    }
}
