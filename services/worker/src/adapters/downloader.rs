//! Shells out to the `yt-dlp` binary — the Rust analogue of
//! `src/yt_dlp_client.py`'s `download_video`/`download_audio`, which drove
//! the same tool through its Python bindings. Output filenames are keyed by
//! the content hash the worker already computed for staging, so a repeated
//! command for the same normalized URL is a local cache hit even before the
//! object-store check.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

use crate::ports::{DownloadError, DownloadedFile, MediaDownloader};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

pub struct YtDlpDownloader {
    downloads_dir: PathBuf,
}

impl YtDlpDownloader {
    pub fn new(downloads_dir: impl Into<PathBuf>) -> Self {
        YtDlpDownloader {
            downloads_dir: downloads_dir.into(),
        }
    }

    async fn run(&self, url: &str, stub: &str, format_selector: &str, extra_args: &[&str]) -> Result<PathBuf, DownloadError> {
        tokio::fs::create_dir_all(&self.downloads_dir).await.map_err(|e| DownloadError::Failed(e.to_string()))?;
        let out_template = self.downloads_dir.join(format!("{stub}.%(ext)s"));

        let mut command = Command::new("yt-dlp");
        command
            .arg("--format")
            .arg(format_selector)
            .arg("--output")
            .arg(&out_template)
            .args(extra_args)
            .arg(url);

        let output = tokio::time::timeout(DOWNLOAD_TIMEOUT, command.output())
            .await
            .map_err(|_| DownloadError::Failed("yt-dlp timed out".into()))?
            .map_err(|e| DownloadError::Failed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("Unsupported URL") {
                return Err(DownloadError::Unsupported);
            }
            return Err(DownloadError::Failed(stderr.trim().to_string()));
        }

        find_output_file(&self.downloads_dir, stub).await.ok_or_else(|| DownloadError::Failed("yt-dlp reported success but produced no file".into()))
    }

    fn to_downloaded(path: PathBuf) -> DownloadedFile {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("bin").to_string();
        let original_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("download").to_string();
        let content_type = mime_guess::from_path(&path).first_or_octet_stream().essence_str().to_string();
        DownloadedFile {
            path,
            extension,
            original_name,
            content_type,
        }
    }
}

async fn find_output_file(dir: &Path, stub: &str) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(stub) {
            return Some(entry.path());
        }
    }
    None
}

#[async_trait::async_trait]
impl MediaDownloader for YtDlpDownloader {
    async fn download_video(&self, url: &str) -> Result<DownloadedFile, DownloadError> {
        let stub = control_core::staging::content_hash(url);
        let path = self.run(url, &stub, "best", &["--recode-video", "mp4"]).await?;
        Ok(Self::to_downloaded(path))
    }

    async fn download_audio(&self, url: &str) -> Result<DownloadedFile, DownloadError> {
        let stub = control_core::staging::content_hash(url);
        let path = self.run(url, &stub, "bestaudio/best", &["--extract-audio", "--audio-format", "mp3"]).await?;
        Ok(Self::to_downloaded(path))
    }
}
