use tracing::info;

use crate::config::{CSV_MIME, MAX_PUBLISH_ATTEMPTS, SPLIT_THRESHOLD_BYTES};
use crate::error::{AppError, Result};
use crate::retry;
use crate::storage::ObjectStore;

/// Publish one serialized dataset, splitting oversized payloads into
/// `_partN` artifacts first. Each artifact is uploaded independently:
/// update-in-place when a file of that name already exists in the folder,
/// create otherwise, with retry/backoff around the whole lookup+write.
pub async fn publish_csv<S: ObjectStore>(
    store: &S,
    folder_id: &str,
    name: &str,
    bytes: &[u8],
) -> Result<()> {
    let parts = split_parts(name, bytes, SPLIT_THRESHOLD_BYTES);
    if parts.len() > 1 {
        info!(
            "'{name}' is {:.2} MB, splitting into {} parts",
            mb(bytes.len()),
            parts.len()
        );
    }
    for (part_name, data) in &parts {
        upload_artifact(store, folder_id, part_name, data).await?;
    }
    Ok(())
}

async fn upload_artifact<S: ObjectStore>(
    store: &S,
    folder_id: &str,
    name: &str,
    data: &[u8],
) -> Result<()> {
    info!("Uploading '{name}' ({:.2} MB)", mb(data.len()));

    retry::with_backoff("upload", MAX_PUBLISH_ATTEMPTS, || async {
        match store.find_file(folder_id, name).await? {
            Some(file_id) => {
                store.update_file(&file_id, CSV_MIME, data).await?;
                info!("Updated existing file '{name}' (id {file_id})");
            }
            None => {
                let file_id = store.create_file(folder_id, name, CSV_MIME, data).await?;
                info!("Uploaded new file '{name}' (id {file_id})");
            }
        }
        Ok(())
    })
    .await
    .map_err(|e| AppError::Publish(format!("upload of '{name}' failed: {e}")))
}

/// Split `bytes` at line boundaries into parts of at most `max_len` bytes
/// (a single oversized line becomes its own part). Concatenating the parts
/// in order reproduces `bytes` exactly. Under the threshold the artifact
/// keeps its original name.
pub fn split_parts(name: &str, bytes: &[u8], max_len: usize) -> Vec<(String, Vec<u8>)> {
    if bytes.len() <= max_len {
        return vec![(name.to_string(), bytes.to_vec())];
    }

    let mut parts: Vec<(String, Vec<u8>)> = Vec::new();
    let mut start = 0usize;
    while start < bytes.len() {
        let mut end = (start + max_len).min(bytes.len());
        if end < bytes.len() {
            match bytes[start..end].iter().rposition(|&b| b == b'\n') {
                Some(pos) => end = start + pos + 1,
                None => {
                    // No newline inside the window: take the whole record.
                    end = bytes[start..]
                        .iter()
                        .position(|&b| b == b'\n')
                        .map(|p| start + p + 1)
                        .unwrap_or(bytes.len());
                }
            }
        }
        let index = parts.len() + 1;
        parts.push((part_name(name, index), bytes[start..end].to_vec()));
        start = end;
    }
    parts
}

/// `games_alice.csv` → `games_alice_part1.csv`; extensionless names get the
/// suffix appended.
fn part_name(name: &str, index: usize) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}_part{index}.{ext}"),
        None => format!("{name}_part{index}"),
    }
}

fn mb(len: usize) -> f64 {
    len as f64 / (1024.0 * 1024.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
