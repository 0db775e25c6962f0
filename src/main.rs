mod config;
mod dataset;
mod error;
mod fetcher;
mod merge;
mod normalize;
mod publish;
mod retry;
mod storage;
mod types;
mod watermark;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, MAX_PUBLISH_ATTEMPTS};
use crate::error::Result;
use crate::storage::DriveClient;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    let usernames: Vec<String> = std::env::args().skip(1).collect();
    if usernames.is_empty() {
        eprintln!("Usage: lichess-sync <username> [<username> ...]");
        std::process::exit(1);
    }

    // Each user's pipeline is an isolated unit of work; one user failing
    // (or backing off) never stalls the others.
    let mut handles = Vec::with_capacity(usernames.len());
    for username in usernames {
        let cfg = cfg.clone();
        let handle = tokio::spawn(sync_user(cfg, username.clone()));
        handles.push((username, handle));
    }

    let mut failed = false;
    for (username, handle) in handles {
        match handle.await {
            Ok(Ok(summary)) => info!(
                "'{username}' done: {} new games of {} fetched, {} games total ({:.2} MB); \
                 {} rating rows ({:.2} MB)",
                summary.games_kept,
                summary.games_fetched,
                summary.games_total,
                mb(summary.games_bytes),
                summary.rating_rows,
                mb(summary.rating_bytes),
            ),
            Ok(Err(e)) => {
                error!("sync failed for '{username}': {e}");
                failed = true;
            }
            Err(e) => {
                error!("sync task for '{username}' panicked: {e}");
                failed = true;
            }
        }
    }
    if failed {
        std::process::exit(1);
    }
}

#[derive(Debug, Default)]
struct SyncSummary {
    games_fetched: usize,
    games_kept: usize,
    games_total: usize,
    games_bytes: usize,
    rating_rows: usize,
    rating_bytes: usize,
}

/// The full pipeline for one user: resolve watermark from the persisted
/// dataset, fetch, normalize, merge, then publish. Publish is the last
/// stage, so a failed run never leaves a half-merged dataset behind.
async fn sync_user(cfg: Config, username: String) -> Result<SyncSummary> {
    let store = DriveClient::new(&cfg)?;

    let folder_id = retry::with_backoff("folder lookup", MAX_PUBLISH_ATTEMPTS, || async {
        store.ensure_folder(&cfg.drive_parent_folder_id, &username).await
    })
    .await?;

    // --- Load the persisted dataset and resolve the watermark ---
    let games_name = dataset::games_file_name(&username);
    let existing_bytes = retry::with_backoff("dataset download", MAX_PUBLISH_ATTEMPTS, || async {
        store.download_named(&folder_id, &games_name).await
    })
    .await?;
    let existing = match &existing_bytes {
        Some(bytes) => dataset::parse_matches(bytes),
        None => Vec::new(),
    };

    let watermark = watermark::resolve(&existing);
    match watermark {
        Some(w) => info!("'{username}': {} persisted games, fetching since {w} (ms)", existing.len()),
        None => info!("'{username}': no usable persisted games, fetching everything"),
    }

    // --- Fetch ---
    let raw = fetcher::fetch_games(&cfg, &username, watermark).await?;
    let rating_raw = fetcher::fetch_rating_history(&cfg, &username).await?;

    // --- Normalize ---
    let (rows, stats) = normalize::normalize_games(&raw, &username);
    info!(
        "'{username}': normalized {}/{} games (non-standard: {}, malformed: {})",
        stats.kept, stats.total, stats.non_standard, stats.malformed,
    );
    let points = normalize::normalize_rating_history(&rating_raw);

    // --- Merge ---
    let merged = merge::merge_matches(existing, rows);
    let rating_table = merge::build_rating_table(&points);

    let mut summary = SyncSummary {
        games_fetched: stats.total,
        games_kept: stats.kept,
        games_total: merged.len(),
        ..Default::default()
    };

    // --- Publish ---
    if merged.is_empty() {
        info!("'{username}': no games at all, skipping games dataset");
    } else {
        let games_csv = dataset::encode_matches(&merged)?;
        summary.games_bytes = games_csv.len();
        publish::publish_csv(&store, &folder_id, &games_name, &games_csv).await?;
    }

    match rating_table {
        Some(table) => {
            let rating_csv = dataset::encode_ratings(&table)?;
            summary.rating_rows = table.rows.len();
            summary.rating_bytes = rating_csv.len();
            publish::publish_csv(&store, &folder_id, &dataset::rating_file_name(&username), &rating_csv)
                .await?;
        }
        None => warn!("'{username}': no rating history points, skipping rating dataset"),
    }

    Ok(summary)
}

fn mb(len: usize) -> f64 {
    len as f64 / (1024.0 * 1024.0)
}
