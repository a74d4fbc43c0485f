//! Downloading the source to a temporary file

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::config::Compression;
use super::error::IngestError;
use super::progress::{IngestProgress, format_bytes};

/// A downloaded source file, removed from disk when dropped unless kept
#[derive(Debug)]
pub struct TempDownload {
    path: PathBuf,
    bytes: u64,
    keep: bool,
    armed: bool,
}

impl TempDownload {
    fn new(path: PathBuf, keep: bool) -> Self {
        Self {
            path,
            bytes: 0,
            keep,
            armed: true,
        }
    }

    /// Location of the downloaded file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written to disk
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Whether the file survives cleanup
    pub fn is_kept(&self) -> bool {
        self.keep
    }

    /// Delete the file now, returning whether anything was removed.
    ///
    /// A kept download is left in place.
    pub fn cleanup(mut self) -> Result<bool, IngestError> {
        self.armed = false;
        if self.keep {
            return Ok(false);
        }

        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for TempDownload {
    fn drop(&mut self) {
        if !self.armed || self.keep {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed temporary download {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove temporary download {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// Fetches a source over HTTP(S) into a directory
pub struct Downloader {
    client: reqwest::Client,
    download_dir: PathBuf,
    keep: bool,
}

impl Downloader {
    /// Create a downloader writing into `download_dir`
    pub fn new(download_dir: impl Into<PathBuf>, keep: bool) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ingest-data/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            download_dir: download_dir.into(),
            keep,
        })
    }

    /// Temporary file name for a run; the extension follows the URL's compression
    pub fn file_name(url: &str, run_id: &str) -> String {
        format!("output-{}.{}", run_id, Compression::from_name(url).extension())
    }

    /// Download `url`, streaming the body to a temporary file.
    ///
    /// On failure any partially written file is removed.
    pub async fn download(
        &self,
        url: &str,
        run_id: &str,
        progress: &mut IngestProgress,
    ) -> Result<TempDownload, IngestError> {
        let download_error = |reason: String| IngestError::Download {
            url: url.to_string(),
            reason,
        };

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let path = self.download_dir.join(Self::file_name(url, run_id));

        debug!("Requesting {}", url);
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| download_error(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(download_error(format!("HTTP {}", status)));
        }

        let mut download = TempDownload::new(path, self.keep);
        let mut file = tokio::fs::File::create(&download.path).await?;
        progress.start_download(response.content_length());

        while let Some(bytes) = response
            .chunk()
            .await
            .map_err(|e| download_error(e.without_url().to_string()))?
        {
            file.write_all(&bytes).await?;
            download.bytes += bytes.len() as u64;
            progress.update_download(download.bytes);
        }
        file.flush().await?;
        progress.finish_download(download.bytes);

        info!(
            "Downloaded {} to {}",
            format_bytes(download.bytes),
            download.path.display()
        );
        Ok(download)
    }
}
