use crate::error::{AppError, Result};

pub const LICHESS_API_URL: &str = "https://lichess.org";
pub const DRIVE_API_URL: &str = "https://www.googleapis.com/drive/v3";
pub const DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3";

/// Max games per export request. A batch smaller than this means the
/// export is exhausted; a full batch advances the `since` cursor.
pub const GAMES_PAGE_SIZE: usize = 1000;

/// Artifacts larger than this are split into `_partN` files before upload.
pub const SPLIT_THRESHOLD_BYTES: usize = 15 * 1024 * 1024;

/// Attempt bound for storage operations (lookup/create/update/download).
pub const MAX_PUBLISH_ATTEMPTS: u32 = 5;

/// Per-request HTTP timeout (seconds). Export responses can be large.
pub const HTTP_TIMEOUT_SECS: u64 = 120;

pub const CSV_MIME: &str = "text/csv";

#[derive(Debug, Clone)]
pub struct Config {
    pub lichess_api_url: String,
    pub drive_api_url: String,
    pub drive_upload_url: String,
    /// Optional bearer token for the games export (LICHESS_TOKEN).
    pub lichess_token: Option<String>,
    /// Bearer token for the storage backend (DRIVE_TOKEN).
    pub drive_token: String,
    /// Folder all per-user folders live under (DRIVE_PARENT_FOLDER_ID).
    pub drive_parent_folder_id: String,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            lichess_api_url: std::env::var("LICHESS_API_URL")
                .unwrap_or_else(|_| LICHESS_API_URL.to_string()),
            drive_api_url: std::env::var("DRIVE_API_URL")
                .unwrap_or_else(|_| DRIVE_API_URL.to_string()),
            drive_upload_url: std::env::var("DRIVE_UPLOAD_URL")
                .unwrap_or_else(|_| DRIVE_UPLOAD_URL.to_string()),
            lichess_token: std::env::var("LICHESS_TOKEN").ok().filter(|t| !t.is_empty()),
            drive_token: std::env::var("DRIVE_TOKEN")
                .map_err(|_| AppError::Config("DRIVE_TOKEN not set".to_string()))?,
            drive_parent_folder_id: std::env::var("DRIVE_PARENT_FOLDER_ID")
                .map_err(|_| AppError::Config("DRIVE_PARENT_FOLDER_ID not set".to_string()))?,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}
