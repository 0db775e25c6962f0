use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tracing::{debug, info};

use crate::config::{Config, GAMES_PAGE_SIZE, HTTP_TIMEOUT_SECS};
use crate::error::{AppError, Result};

/// Fetch every game newer than `watermark` (epoch ms, exclusive) for a user.
///
/// The export endpoint streams NDJSON and caps each response at `max`
/// records, so a full batch means more may follow: the `since` cursor
/// advances to one past the newest `createdAt` seen in the batch and the
/// request is reissued. `until` is captured once at the start of the run so
/// games finishing mid-run don't extend the loop.
pub async fn fetch_games(
    cfg: &Config,
    username: &str,
    watermark: Option<i64>,
) -> Result<Vec<Value>> {
    let client = http_client()?;
    let url = format!("{}/api/games/user/{}", cfg.lichess_api_url, username);
    let until = now_ms();
    let mut since = watermark.map(|w| w + 1);
    let mut records: Vec<Value> = Vec::new();
    let mut batches = 0usize;

    loop {
        let mut query: Vec<(&str, String)> = vec![
            ("until", until.to_string()),
            ("max", GAMES_PAGE_SIZE.to_string()),
            ("clocks", "true".to_string()),
            ("opening", "true".to_string()),
            ("evals", "false".to_string()),
            ("pgnInJson", "false".to_string()),
        ];
        if let Some(s) = since {
            query.push(("since", s.to_string()));
        }

        let mut req = client
            .get(&url)
            .header("Accept", "application/x-ndjson")
            .query(&query);
        if let Some(token) = &cfg.lichess_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(AppError::Fetch(format!(
                "games export for '{username}' returned HTTP {}",
                resp.status()
            )));
        }

        let body = resp.text().await?;
        let batch = parse_ndjson(&body)?;
        batches += 1;
        debug!("batch {batches}: {} games (since={since:?})", batch.len());

        if batch.is_empty() {
            break;
        }
        let full = batch.len() >= GAMES_PAGE_SIZE;
        if full {
            // A full batch without a single createdAt cannot advance the
            // cursor; stop instead of refetching the same page forever.
            let max_created = batch_max_created_at(&batch).ok_or_else(|| {
                AppError::Fetch(
                    "full batch carries no createdAt timestamps; cannot advance cursor"
                        .to_string(),
                )
            })?;
            since = Some(max_created + 1);
        }
        records.extend(batch);
        if !full {
            break;
        }
    }

    info!("Fetched {} games for '{username}' in {batches} request(s)", records.len());
    Ok(records)
}

/// Fetch the complete rating history for a user (one JSON array, no paging).
pub async fn fetch_rating_history(cfg: &Config, username: &str) -> Result<Value> {
    let client = http_client()?;
    let url = format!("{}/api/user/{}/rating-history", cfg.lichess_api_url, username);

    let mut req = client.get(&url).header("Accept", "application/json");
    if let Some(token) = &cfg.lichess_token {
        req = req.bearer_auth(token);
    }

    let resp = req.send().await?;
    if !resp.status().is_success() {
        return Err(AppError::Fetch(format!(
            "rating history for '{username}' returned HTTP {}",
            resp.status()
        )));
    }

    Ok(resp.json().await?)
}

fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()?)
}

/// Parse an NDJSON body into one `Value` per non-empty line. A line that is
/// not valid JSON means broken stream framing and fails the whole fetch.
pub(crate) fn parse_ndjson(body: &str) -> Result<Vec<Value>> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .map_err(|e| AppError::Fetch(format!("malformed NDJSON line: {e}")))
        })
        .collect()
}

/// Newest `createdAt` (epoch ms) in a batch, if any record carries one.
pub(crate) fn batch_max_created_at(batch: &[Value]) -> Option<i64> {
    batch
        .iter()
        .filter_map(|v| v.get("createdAt").and_then(Value::as_i64))
        .max()
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
