use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::types::{Color, GameResult, MatchRow, RatingPoint};

#[derive(Debug, Default)]
pub struct NormalizeStats {
    pub total: usize,
    pub kept: usize,
    pub non_standard: usize,
    pub malformed: usize,
}

/// Flatten a batch of raw export records, dropping non-standard variants and
/// records too malformed to key (no id / no createdAt). Drops never fail the
/// run; the stats say how many went where.
pub fn normalize_games(raw: &[Value], username: &str) -> (Vec<MatchRow>, NormalizeStats) {
    let mut rows = Vec::with_capacity(raw.len());
    let mut stats = NormalizeStats { total: raw.len(), ..Default::default() };

    for value in raw {
        match normalize_game_checked(value, username) {
            Ok(row) => {
                rows.push(row);
                stats.kept += 1;
            }
            Err(Drop::NonStandard) => stats.non_standard += 1,
            Err(Drop::Malformed) => stats.malformed += 1,
        }
    }

    (rows, stats)
}

/// Thin wrapper for callers that don't care why a record was dropped.
pub fn normalize_game(value: &Value, username: &str) -> Option<MatchRow> {
    normalize_game_checked(value, username).ok()
}

enum Drop {
    NonStandard,
    Malformed,
}

fn normalize_game_checked(v: &Value, username: &str) -> Result<MatchRow, Drop> {
    let variant = v.get("variant").and_then(Value::as_str).unwrap_or("");
    if variant != "standard" {
        return Err(Drop::NonStandard);
    }

    let game_id = v
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(Drop::Malformed)?
        .to_string();
    let created_at = timestamp_ms(v.get("createdAt")).ok_or(Drop::Malformed)?;
    let last_move_at = timestamp_ms(v.get("lastMoveAt")).unwrap_or(created_at);

    let players = v.get("players").ok_or(Drop::Malformed)?;
    let white_name = player_name(players.get("white"));
    let black_name = player_name(players.get("black"));

    // Case-insensitive side match; neither side matching should not happen
    // for a correctly scoped export, but falls back to white rather than
    // dropping the record.
    let played_as = match (&white_name, &black_name) {
        (Some(w), _) if w.eq_ignore_ascii_case(username) => Color::White,
        (_, Some(b)) if b.eq_ignore_ascii_case(username) => Color::Black,
        _ => Color::White,
    };
    let opponent_color = played_as.opposite();

    let source = v.get("source").and_then(Value::as_str).unwrap_or("").to_string();
    let speed = v.get("speed").and_then(Value::as_str).unwrap_or("").to_string();
    let status = v.get("status").and_then(Value::as_str).unwrap_or("").to_string();

    let mut opponent_name = if source == "ai" {
        Some("Lichess Stockfish".to_string())
    } else {
        match opponent_color {
            Color::White => white_name,
            Color::Black => black_name,
        }
    };
    if opponent_name.is_none() && source == "friend" {
        opponent_name = Some("Unnamed".to_string());
    }

    let subject = players.get(played_as.as_str());
    let opponent = players.get(opponent_color.as_str());
    let player_rating = rating_field(subject, "rating");
    let player_rating_diff = rating_field(subject, "ratingDiff");
    let opponent_rating = rating_field(opponent, "rating");
    let opponent_rating_diff = rating_field(opponent, "ratingDiff");

    let result = match v.get("winner").and_then(Value::as_str) {
        None => GameResult::Draw,
        Some(w) if w.eq_ignore_ascii_case(played_as.as_str()) => GameResult::Win,
        Some(_) => GameResult::Lose,
    };

    let opening = v.get("opening");
    let opening_eco = opening
        .and_then(|o| o.get("eco"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let opening_name = opening
        .and_then(|o| o.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let opening_ply = opening.and_then(|o| o.get("ply")).and_then(Value::as_i64);

    let mut time_control = format_time_control(v.get("clock"));
    if time_control.is_none() && speed == "correspondence" {
        time_control = Some("daily".to_string());
    }
    let time_control = time_control.map(fix_legacy_seconds_marker);

    let tournament = v.get("tournament").is_some_and(|t| !t.is_null());

    let move_count = v
        .get("moves")
        .and_then(Value::as_str)
        .map(|m| m.split_whitespace().count() as i64);
    let turns = move_count.map(|mc| (mc + 1) / 2);

    Ok(MatchRow {
        game_id,
        rated: v.get("rated").and_then(Value::as_bool).unwrap_or(false),
        speed,
        created_at,
        last_move_at,
        status,
        source,
        player_name: username.to_string(),
        played_as,
        opponent_name,
        opponent_color,
        player_rating,
        player_rating_diff,
        opponent_rating,
        opponent_rating_diff,
        result,
        opening_eco,
        opening_name,
        opening_ply,
        tournament,
        time_control,
        move_count,
        turns,
    })
}

/// Display name of one side: `user.name` for accounts, bare `name` for
/// anonymous/legacy entries.
fn player_name(player: Option<&Value>) -> Option<String> {
    let p = player?;
    p.get("user")
        .and_then(|u| u.get("name"))
        .and_then(Value::as_str)
        .or_else(|| p.get("name").and_then(Value::as_str))
        .map(str::to_string)
}

fn rating_field(player: Option<&Value>, field: &str) -> Option<i64> {
    player?.get(field).and_then(Value::as_i64)
}

fn timestamp_ms(value: Option<&Value>) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(value?.as_i64()?).single()
}

/// `(initial_seconds, increment)` → display string. Sub-minute initials
/// render as a reduced fraction of a minute ("1/2+0" for 30s), everything
/// else as whole minutes ("3+2" for 180s).
fn format_time_control(clock: Option<&Value>) -> Option<String> {
    let clock = clock?;
    let initial = clock.get("initial")?.as_i64()?;
    let increment = clock.get("increment")?.as_i64()?;
    if initial < 60 {
        let d = gcd(initial, 60);
        Some(format!("{}/{}+{}", initial / d, 60 / d, increment))
    } else {
        Some(format!("{}+{}", initial / 60, increment))
    }
}

/// Early exports rendered some time controls with an "s" marker; the
/// persisted datasets carry the rewritten form, so keep rewriting.
fn fix_legacy_seconds_marker(tc: String) -> String {
    if tc.contains('+') {
        tc.replace('s', "m")
    } else {
        tc
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

// ---------------------------------------------------------------------------
// Rating history
// ---------------------------------------------------------------------------

/// Flatten the rating-history payload: one entry per perf category, each
/// with `[year, zero-based-month, day, rating]` points. Out-of-range dates
/// are dropped silently.
pub fn normalize_rating_history(v: &Value) -> Vec<RatingPoint> {
    let mut points = Vec::new();
    let Some(entries) = v.as_array() else {
        return points;
    };

    for entry in entries {
        let Some(category) = entry.get("name").and_then(Value::as_str) else {
            continue;
        };
        let Some(list) = entry.get("points").and_then(Value::as_array) else {
            continue;
        };
        for point in list {
            let Some(p) = point.as_array() else { continue };
            let (Some(year), Some(month), Some(day), Some(rating)) = (
                p.first().and_then(Value::as_i64),
                p.get(1).and_then(Value::as_i64),
                p.get(2).and_then(Value::as_i64),
                p.get(3).and_then(Value::as_i64),
            ) else {
                continue;
            };
            if month < 0 || day < 0 {
                continue;
            }
            // Months come zero-based from the API.
            let Some(date) =
                NaiveDate::from_ymd_opt(year as i32, (month + 1) as u32, day as u32)
            else {
                continue;
            };
            points.push(RatingPoint { category: category.to_string(), date, rating });
        }
    }

    points
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
