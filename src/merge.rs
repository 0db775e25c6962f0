use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::NaiveDate;

use crate::types::{MatchRow, RatingPoint};

/// Merge freshly fetched rows into the persisted dataset.
///
/// Incoming rows win on `game_id` collision (they are the newer fetch of the
/// same game). Output is sorted by `created_at` descending with `game_id` as
/// tie-break, so the result depends only on the row set, not on arrival
/// order within a batch.
pub fn merge_matches(existing: Vec<MatchRow>, incoming: Vec<MatchRow>) -> Vec<MatchRow> {
    let mut seen: HashSet<String> = HashSet::with_capacity(existing.len() + incoming.len());
    let mut merged: Vec<MatchRow> = Vec::with_capacity(existing.len() + incoming.len());

    for row in incoming.into_iter().chain(existing) {
        if seen.insert(row.game_id.clone()) {
            merged.push(row);
        }
    }
    debug_assert_eq!(seen.len(), merged.len());

    merged.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.game_id.cmp(&b.game_id))
    });
    merged
}

// ---------------------------------------------------------------------------
// Rating table
// ---------------------------------------------------------------------------

/// Rating points pivoted into one row per calendar day, one column per
/// category, spanning the full observed date range with no gaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingTable {
    /// Column names, sorted lexicographically.
    pub categories: Vec<String>,
    /// Rows sorted by date descending; `values[i]` pairs with `categories[i]`.
    pub rows: Vec<RatingRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingRow {
    pub date: NaiveDate,
    pub values: Vec<Option<i64>>,
}

/// Pivot + forward-fill. For each category the last known rating carries
/// forward across gap days, but days strictly before the category's first
/// observed point stay absent — "not yet rated" is not "rating unchanged".
/// Returns `None` when there are no points at all.
pub fn build_rating_table(points: &[RatingPoint]) -> Option<RatingTable> {
    if points.is_empty() {
        return None;
    }

    let categories: Vec<String> = points
        .iter()
        .map(|p| p.category.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    // Last write wins for duplicate (category, date) observations.
    let mut by_category: BTreeMap<&str, BTreeMap<NaiveDate, i64>> = BTreeMap::new();
    for p in points {
        by_category.entry(p.category.as_str()).or_default().insert(p.date, p.rating);
    }

    let min_date = points.iter().map(|p| p.date).min()?;
    let max_date = points.iter().map(|p| p.date).max()?;

    let mut rows: Vec<RatingRow> = Vec::new();
    let mut last: Vec<Option<i64>> = vec![None; categories.len()];
    let mut date = min_date;
    loop {
        let mut values = Vec::with_capacity(categories.len());
        for (i, category) in categories.iter().enumerate() {
            if let Some(&rating) = by_category[category.as_str()].get(&date) {
                last[i] = Some(rating);
            }
            values.push(last[i]);
        }
        rows.push(RatingRow { date, values });
        if date == max_date {
            break;
        }
        date = date.succ_opt()?;
    }

    rows.reverse();
    Some(RatingTable { categories, rows })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Color, GameResult};
    use chrono::{TimeZone, Utc};

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
            opponent_name: Some("Bob".to_string()),
            opponent_color: Color::Black,
            player_rating: Some(1500),
            player_rating_diff: Some(5),
            opponent_rating: Some(1490),
            opponent_rating_diff: Some(-5),
            result: GameResult::Win,
            opening_eco: None,
            opening_name: None,
            opening_ply: None,
            tournament: false,
            time_control: Some("3+2".to_string()),
            move_count: Some(40),
            turns: Some(20),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 6, d).unwrap()
    }

    fn point(category: &str, date: NaiveDate, rating: i64) -> RatingPoint {
        RatingPoint { category: category.to_string(), date, rating }
    }

    #[test]
    fn dedup_keeps_incoming_version() {
        let mut old = row("g1", 1000);
        old.status = "resign".to_string();
        let new = row("g1", 1000);

        let merged = merge_matches(vec![old], vec![new]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].status, "mate");
    }

    #[test]
    fn sorts_by_created_at_descending() {
        let merged = merge_matches(
            vec![row("g1", 1000), row("g3", 3000)],
            vec![row("g2", 2000)],
        );
        let ids: Vec<&str> = merged.iter().map(|r| r.game_id.as_str()).collect();
        assert_eq!(ids, ["g3", "g2", "g1"]);
    }

    #[test]
    fn equal_timestamps_order_by_game_id() {
        let a = merge_matches(vec![], vec![row("ga", 1000), row("gb", 1000)]);
        let b = merge_matches(vec![], vec![row("gb", 1000), row("ga", 1000)]);
        assert_eq!(a, b);
        assert_eq!(a[0].game_id, "ga");
    }

    #[test]
    fn incremental_merge_equals_single_pass() {
        let (a, b, c) = (row("ga", 1000), row("gb", 2000), row("gc", 3000));

        let two_step =
            merge_matches(merge_matches(vec![], vec![a.clone(), b.clone()]), vec![c.clone()]);
        let one_pass = merge_matches(vec![], vec![a, b, c]);
        assert_eq!(two_step, one_pass);
    }

    #[test]
    fn remerging_same_rows_is_idempotent() {
        let merged = merge_matches(vec![row("g1", 1000)], vec![row("g2", 2000)]);
        let again = merge_matches(merged.clone(), vec![]);
        assert_eq!(merged, again);
    }

    #[test]
    fn forward_fills_gap_days() {
        let table = build_rating_table(&[
            point("blitz", day(1), 1500),
            point("blitz", day(3), 1520),
        ])
        .unwrap();

        assert_eq!(table.categories, ["blitz"]);
        assert_eq!(table.rows.len(), 3);
        // Rows are date-descending.
        assert_eq!(table.rows[0].date, day(3));
        assert_eq!(table.rows[0].values, [Some(1520)]);
        assert_eq!(table.rows[1].date, day(2));
        assert_eq!(table.rows[1].values, [Some(1500)]);
        assert_eq!(table.rows[2].date, day(1));
        assert_eq!(table.rows[2].values, [Some(1500)]);
    }

    #[test]
    fn days_before_first_point_stay_absent() {
        let table = build_rating_table(&[
            point("blitz", day(1), 1500),
            point("bullet", day(3), 1400),
            point("blitz", day(4), 1510),
        ])
        .unwrap();

        assert_eq!(table.categories, ["blitz", "bullet"]);
        // day(2): blitz carried forward, bullet not yet rated.
        let d2 = table.rows.iter().find(|r| r.date == day(2)).unwrap();
        assert_eq!(d2.values, [Some(1500), None]);
        let d4 = table.rows.iter().find(|r| r.date == day(4)).unwrap();
        assert_eq!(d4.values, [Some(1510), Some(1400)]);
    }

    #[test]
    fn spans_full_range_without_gaps() {
        let table = build_rating_table(&[
            point("blitz", day(5), 1500),
            point("blitz", day(25), 1600),
        ])
        .unwrap();

        assert_eq!(table.rows.len(), 21);
        for pair in table.rows.windows(2) {
            assert_eq!(pair[1].date.succ_opt().unwrap(), pair[0].date);
        }
    }

    #[test]
    fn table_is_independent_of_point_order() {
        let forward = [
            point("blitz", day(1), 1500),
            point("bullet", day(2), 1400),
            point("blitz", day(3), 1510),
        ];
        let mut reversed = forward.to_vec();
        reversed.reverse();

        assert_eq!(build_rating_table(&forward), build_rating_table(&reversed));
    }

    #[test]
    fn empty_points_yield_no_table() {
        assert!(build_rating_table(&[]).is_none());
    }
}
