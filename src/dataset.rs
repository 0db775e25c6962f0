use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::warn;

use crate::error::Result;
use crate::merge::RatingTable;
use crate::types::{Color, GameResult, MatchRow};

/// Byte-order mark carried by every published artifact, for spreadsheet
/// tooling that sniffs encodings.
pub const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Column order is part of the persisted format; do not reorder.
pub const GAMES_COLUMNS: [&str; 23] = [
    "game_id",
    "rated",
    "speed",
    "created_at",
    "last_move_at",
    "status",
    "source",
    "player_name",
    "played_as",
    "opponent_name",
    "opponent_color",
    "player_rating",
    "player_rating_diff",
    "opponent_rating",
    "opponent_rating_diff",
    "result",
    "opening_eco",
    "opening_name",
    "opening_ply",
    "tournament",
    "time_control",
    "move_count",
    "turns",
];

const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const DATE_FMT: &str = "%Y-%m-%d";

pub fn games_file_name(username: &str) -> String {
    format!("games_{username}.csv")
}

pub fn rating_file_name(username: &str) -> String {
    format!("rating_history_{username}.csv")
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

pub fn encode_matches(rows: &[MatchRow]) -> Result<Vec<u8>> {
    let mut buf: Vec<u8> = UTF8_BOM.to_vec();
    {
        let mut w = csv::Writer::from_writer(&mut buf);
        w.write_record(GAMES_COLUMNS)?;
        for row in rows {
            w.write_record(&[
                row.game_id.clone(),
                row.rated.to_string(),
                row.speed.clone(),
                fmt_datetime(row.created_at),
                fmt_datetime(row.last_move_at),
                row.status.clone(),
                row.source.clone(),
                row.player_name.clone(),
                row.played_as.to_string(),
                row.opponent_name.clone().unwrap_or_default(),
                row.opponent_color.to_string(),
                fmt_opt_i64(row.player_rating),
                fmt_opt_i64(row.player_rating_diff),
                fmt_opt_i64(row.opponent_rating),
                fmt_opt_i64(row.opponent_rating_diff),
                row.result.to_string(),
                row.opening_eco.clone().unwrap_or_default(),
                row.opening_name.clone().unwrap_or_default(),
                fmt_opt_i64(row.opening_ply),
                row.tournament.to_string(),
                row.time_control.clone().unwrap_or_default(),
                fmt_opt_i64(row.move_count),
                fmt_opt_i64(row.turns),
            ])?;
        }
        w.flush()?;
    }
    Ok(buf)
}

pub fn encode_ratings(table: &RatingTable) -> Result<Vec<u8>> {
    let mut buf: Vec<u8> = UTF8_BOM.to_vec();
    {
        let mut w = csv::Writer::from_writer(&mut buf);
        let mut header = vec!["date".to_string()];
        header.extend(table.categories.iter().cloned());
        w.write_record(&header)?;

        for row in &table.rows {
            let mut record = vec![row.date.format(DATE_FMT).to_string()];
            record.extend(row.values.iter().map(|v| fmt_opt_i64(*v)));
            w.write_record(&record)?;
        }
        w.flush()?;
    }
    Ok(buf)
}

fn fmt_datetime(dt: DateTime<Utc>) -> String {
    dt.format(DATETIME_FMT).to_string()
}

fn fmt_opt_i64(v: Option<i64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Decoding (lenient)
// ---------------------------------------------------------------------------

/// Parse a previously persisted games CSV. Rows that fail to parse are
/// skipped, and a dataset with an unusable header comes back empty — the
/// watermark then degrades to "fetch everything", which re-fetches rather
/// than risking a gap.
pub fn parse_matches(bytes: &[u8]) -> Vec<MatchRow> {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = csv::Reader::from_reader(body);

    let headers = match reader.headers() {
        Ok(h) => h.clone(),
        Err(e) => {
            warn!("existing dataset has unreadable header, treating as empty: {e}");
            return Vec::new();
        }
    };
    let Some(columns) = GAMES_COLUMNS
        .iter()
        .map(|name| headers.iter().position(|h| h == *name))
        .collect::<Option<Vec<usize>>>()
    else {
        warn!("existing dataset is missing expected columns, treating as empty");
        return Vec::new();
    };

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let Ok(record) = record else {
            skipped += 1;
            continue;
        };
        match parse_row(|i| record.get(columns[i]).unwrap_or("")) {
            Some(row) => rows.push(row),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!("skipped {skipped} unparseable row(s) in the existing dataset");
    }
    rows
}

/// `field(i)` yields the raw value for `GAMES_COLUMNS[i]`.
fn parse_row<'a, F: Fn(usize) -> &'a str>(field: F) -> Option<MatchRow> {
    let game_id = field(0);
    if game_id.is_empty() {
        return None;
    }
    Some(MatchRow {
        game_id: game_id.to_string(),
        rated: parse_bool(field(1))?,
        speed: field(2).to_string(),
        created_at: parse_datetime(field(3))?,
        last_move_at: parse_datetime(field(4))?,
        status: field(5).to_string(),
        source: field(6).to_string(),
        player_name: field(7).to_string(),
        played_as: Color::parse(field(8))?,
        opponent_name: non_empty(field(9)),
        opponent_color: Color::parse(field(10))?,
        player_rating: parse_opt_i64(field(11))?,
        player_rating_diff: parse_opt_i64(field(12))?,
        opponent_rating: parse_opt_i64(field(13))?,
        opponent_rating_diff: parse_opt_i64(field(14))?,
        result: GameResult::parse(field(15))?,
        opening_eco: non_empty(field(16)),
        opening_name: non_empty(field(17)),
        opening_ply: parse_opt_i64(field(18))?,
        tournament: parse_bool(field(19))?,
        time_control: non_empty(field(20)),
        move_count: parse_opt_i64(field(21))?,
        turns: parse_opt_i64(field(22))?,
    })
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, DATETIME_FMT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .or_else(|| {
            // Date-only values show up in hand-edited exports.
            NaiveDate::parse_from_str(s, DATE_FMT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    Some(naive.and_utc())
}

fn parse_bool(s: &str) -> Option<bool> {
    // Earlier exports wrote capitalized "True"/"False".
    match s.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Empty → None. Integer columns in earlier exports sometimes carry a float
/// rendering ("1500.0"); accept those too.
fn parse_opt_i64(s: &str) -> Option<Option<i64>> {
    if s.is_empty() {
        return Some(None);
    }
    if let Ok(n) = s.parse::<i64>() {
        return Some(Some(n));
    }
    s.parse::<f64>().ok().map(|f| Some(f as i64))
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{merge_matches, RatingRow};
    use chrono::TimeZone;

    fn row(game_id: &str, created_ms: i64) -> MatchRow {
        MatchRow {
            game_id: game_id.to_string(),
            rated: true,
            speed: "blitz".to_string(),
            created_at: Utc.timestamp_millis_opt(created_ms).unwrap(),
            last_move_at: Utc.timestamp_millis_opt(created_ms + 1000).unwrap(),
            status: "mate".to_string(),
            source: "lobby".to_string(),
            player_name: "alice".to_string(),
            played_as: Color::White,
            opponent_name: None,
            opponent_color: Color::Black,
            player_rating: Some(1500),
            player_rating_diff: None,
            opponent_rating: Some(1490),
            opponent_rating_diff: Some(-5),
            result: GameResult::Win,
            opening_eco: Some("C20".to_string()),
            opening_name: Some("King's Pawn Game".to_string()),
            opening_ply: Some(2),
            tournament: false,
            time_control: Some("3+2".to_string()),
            move_count: Some(41),
            turns: Some(21),
        }
    }

    #[test]
    fn encode_starts_with_bom_and_header() {
        let bytes = encode_matches(&[]).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        assert!(text.starts_with("game_id,rated,speed,created_at"));
    }

    #[test]
    fn encode_then_parse_round_trips_with_millisecond_precision() {
        let rows = vec![row("g1", 1_600_000_000_123), row("g2", 1_600_000_111_999)];
        let bytes = encode_matches(&rows).unwrap();
        let parsed = parse_matches(&bytes);
        assert_eq!(parsed, rows);
    }

    #[test]
    fn running_with_no_new_rows_reproduces_identical_bytes() {
        let merged = merge_matches(vec![], vec![row("g1", 2000), row("g2", 1000)]);
        let first = encode_matches(&merged).unwrap();

        let reloaded = parse_matches(&first);
        let second = encode_matches(&merge_matches(reloaded, vec![])).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn bad_rows_are_skipped_good_rows_kept() {
        let bytes = encode_matches(&[row("g1", 1000)]).unwrap();
        let mut text = String::from_utf8(bytes).unwrap();
        text.push_str("g2,notabool,blitz,garbage,,,,,white,,black,,,,,win,,,,false,,,\n");
        let parsed = parse_matches(text.as_bytes());
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].game_id, "g1");
    }

    #[test]
    fn unrecognizable_dataset_parses_as_empty() {
        assert!(parse_matches(b"not,a,games,csv\n1,2,3,4\n").is_empty());
        assert!(parse_matches(b"\xff\xfe\x00garbage").is_empty());
        assert!(parse_matches(b"").is_empty());
    }

    #[test]
    fn accepts_legacy_booleans_and_float_integers() {
        let bytes = encode_matches(&[row("g1", 1000)]).unwrap();
        let text = String::from_utf8(bytes)
            .unwrap()
            .replace("true", "True")
            .replace("false", "False")
            .replace(",1500,", ",1500.0,");
        let parsed = parse_matches(text.as_bytes());
        assert_eq!(parsed.len(), 1);
        assert!(parsed[0].rated);
        assert_eq!(parsed[0].player_rating, Some(1500));
    }

    #[test]
    fn rating_table_encodes_dates_and_absent_cells() {
        let table = RatingTable {
            categories: vec!["blitz".to_string(), "bullet".to_string()],
            rows: vec![
                RatingRow {
                    date: NaiveDate::from_ymd_opt(2021, 6, 2).unwrap(),
                    values: vec![Some(1510), Some(1400)],
                },
                RatingRow {
                    date: NaiveDate::from_ymd_opt(2021, 6, 1).unwrap(),
                    values: vec![Some(1500), None],
                },
            ],
        };
        let bytes = encode_ratings(&table).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "date,blitz,bullet");
        assert_eq!(lines[1], "2021-06-02,1510,1400");
        assert_eq!(lines[2], "2021-06-01,1500,");
    }

    #[test]
    fn file_names_are_keyed_by_username() {
        assert_eq!(games_file_name("alice"), "games_alice.csv");
        assert_eq!(rating_file_name("alice"), "rating_history_alice.csv");
    }
}
