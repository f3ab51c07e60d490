//! `commands.gateway.downloads-cleanup` v1 — grounded on
//! `gateway/src/handlers/download_cleanup_command.py`'s `delete_oldest_files`.

use std::path::Path;

use control_core::envelope::Envelope;
use control_core::error::ControlError;
use control_core::router::Scratch;
use serde_json::{json, Value};

use crate::deps::GatewayDeps;

pub async fn downloads_cleanup_handler(envelope: Envelope, deps: GatewayDeps, scratch: Scratch) -> (Result<Value, ControlError>, Scratch) {
    let max_delete = envelope
        .payload
        .get("max_delete")
        .and_then(Value::as_u64)
        .unwrap_or(1000) as usize;

    let deleted = delete_oldest_files(&deps.downloads_dir, max_delete).await;
    tracing::info!(total_deleted = deleted.len(), max_delete, "download cleanup executed");

    (Ok(json!({ "deleted": deleted.len() })), scratch)
}

/// Lists `dir`, sorts by modification time ascending, and unlinks the oldest
/// `max_delete` files. A missing directory or a file vanishing mid-sweep
/// (the gateway's own send flow deletes files too, per §5) is non-fatal.
async fn delete_oldest_files(dir: &Path, max_delete: usize) -> Vec<String> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let Ok(read_dir) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };

        let mut files: Vec<(std::path::PathBuf, std::time::SystemTime)> = read_dir
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| {
                let modified = entry.metadata().ok()?.modified().ok()?;
                Some((entry.path(), modified))
            })
            .collect();

        files.sort_by_key(|(_, modified)| *modified);

        files
            .into_iter()
            .take(max_delete)
            .filter_map(|(path, _)| {
                let deleted = std::fs::remove_file(&path).is_ok();
                deleted.then(|| path.display().to_string())
            })
            .collect()
    })
    .await
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    #[tokio::test]
    async fn deletes_oldest_first_and_respects_max() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a", "b", "c"] {
            fs::write(dir.path().join(name), b"x").unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let deleted = delete_oldest_files(dir.path(), 2).await;
        assert_eq!(deleted.len(), 2);
        assert!(dir.path().join("c").exists());
    }

    #[tokio::test]
    async fn missing_directory_is_a_no_op() {
        let deleted = delete_oldest_files(Path::new("/nonexistent/definitely-missing"), 10).await;
        assert!(deleted.is_empty());
    }
}
