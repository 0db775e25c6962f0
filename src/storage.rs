use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::{Config, HTTP_TIMEOUT_SECS};
use crate::error::{AppError, Result};

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// The slice of the storage backend the publisher needs: exact-name lookup
/// plus create/update. Kept narrow so tests can run against an in-memory
/// double.
#[allow(async_fn_in_trait)]
pub trait ObjectStore {
    async fn find_file(&self, folder_id: &str, name: &str) -> Result<Option<String>>;
    async fn create_file(
        &self,
        folder_id: &str,
        name: &str,
        mime: &str,
        data: &[u8],
    ) -> Result<String>;
    async fn update_file(&self, file_id: &str, mime: &str, data: &[u8]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Drive v3 REST client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DriveClient {
    http: reqwest::Client,
    api_url: String,
    upload_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileRef>,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    id: String,
    #[allow(dead_code)]
    name: Option<String>,
}

impl DriveClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            api_url: cfg.drive_api_url.clone(),
            upload_url: cfg.drive_upload_url.clone(),
            token: cfg.drive_token.clone(),
        })
    }

    /// Find the per-user folder under `parent_id`, creating it when absent.
    pub async fn ensure_folder(&self, parent_id: &str, name: &str) -> Result<String> {
        let q = format!(
            "name='{}' and mimeType='{FOLDER_MIME}' and '{}' in parents and trashed=false",
            escape_query(name),
            escape_query(parent_id),
        );
        if let Some(existing) = self.list(&q).await?.into_iter().next() {
            debug!("found existing folder '{name}' (id {})", existing.id);
            return Ok(existing.id);
        }

        let resp = self
            .http
            .post(format!("{}/files", self.api_url))
            .bearer_auth(&self.token)
            .query(&[("fields", "id")])
            .json(&json!({
                "name": name,
                "mimeType": FOLDER_MIME,
                "parents": [parent_id],
            }))
            .send()
            .await?;
        let created: FileRef = check(resp).await?.json().await?;
        info!("created folder '{name}' (id {})", created.id);
        Ok(created.id)
    }

    /// Download a file by exact name within a folder; `None` when no such
    /// file exists yet.
    pub async fn download_named(&self, folder_id: &str, name: &str) -> Result<Option<Vec<u8>>> {
        let Some(id) = self.find_file(folder_id, name).await? else {
            return Ok(None);
        };
        let resp = self
            .http
            .get(format!("{}/files/{id}", self.api_url))
            .bearer_auth(&self.token)
            .query(&[("alt", "media")])
            .send()
            .await?;
        let bytes = check(resp).await?.bytes().await?;
        Ok(Some(bytes.to_vec()))
    }

    async fn list(&self, q: &str) -> Result<Vec<FileRef>> {
        let resp = self
            .http
            .get(format!("{}/files", self.api_url))
            .bearer_auth(&self.token)
            .query(&[("q", q), ("fields", "files(id, name)")])
            .send()
            .await?;
        let list: FileList = check(resp).await?.json().await?;
        Ok(list.files)
    }
}

impl ObjectStore for DriveClient {
    async fn find_file(&self, folder_id: &str, name: &str) -> Result<Option<String>> {
        let q = format!(
            "name='{}' and '{}' in parents and trashed=false",
            escape_query(name),
            escape_query(folder_id),
        );
        Ok(self.list(&q).await?.into_iter().next().map(|f| f.id))
    }

    /// Metadata first, then the media bytes; Drive's one-shot multipart
    /// upload needs `multipart/related`, which plain reqwest doesn't speak.
    async fn create_file(
        &self,
        folder_id: &str,
        name: &str,
        mime: &str,
        data: &[u8],
    ) -> Result<String> {
        let resp = self
            .http
            .post(format!("{}/files", self.api_url))
            .bearer_auth(&self.token)
            .query(&[("fields", "id")])
            .json(&json!({
                "name": name,
                "mimeType": mime,
                "parents": [folder_id],
            }))
            .send()
            .await?;
        let created: FileRef = check(resp).await?.json().await?;
        self.update_file(&created.id, mime, data).await?;
        Ok(created.id)
    }

    async fn update_file(&self, file_id: &str, mime: &str, data: &[u8]) -> Result<()> {
        let resp = self
            .http
            .patch(format!("{}/files/{file_id}", self.upload_url))
            .bearer_auth(&self.token)
            .query(&[("uploadType", "media")])
            .header("Content-Type", mime)
            .body(data.to_vec())
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}

/// Map a non-2xx response to `AppError::Storage` so the retry combinator can
/// classify it by status.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    let message = message.chars().take(300).collect::<String>();
    Err(AppError::Storage { status: status.as_u16(), message })
}

fn escape_query(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
