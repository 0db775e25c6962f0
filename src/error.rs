use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Storage backend error (HTTP {status}): {message}")]
    Storage { status: u16, message: String },

    #[error("Publish error: {0}")]
    Publish(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Whether retrying the failed operation is likely to succeed.
    /// Transport-level failures and server-side errors qualify; anything
    /// the backend actively rejected (auth, bad request) does not.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Http(_) | AppError::Io(_) => true,
            AppError::Storage { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
