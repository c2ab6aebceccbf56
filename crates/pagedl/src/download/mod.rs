//! Materializes track bytes on disk.
//!
//! [`DownloadEngine`] owns the idempotency rule (a non-empty destination is
//! never fetched again) and URL rewriting; the [`Fetcher`] behind it only
//! moves bytes. Nothing in here retries; that is the page envelope's job.

mod accelerator;
mod client;
mod http;
mod progress;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use tokio::fs;
use tracing::{debug, info};

pub use accelerator::Aria2cBackend;
pub use client::{build_client, install_rustls_provider, rewrite_url};
pub use http::{HttpBackend, part_path, split_ranges};

use crate::config::{DownloadBackend, DownloadConfig};
use crate::error::TransportError;

/// Moves the bytes of one URL into `dest`.
///
/// Implementations must not leave a partial file under `dest`; `dest` either
/// holds the complete body or does not exist.
#[async_trait]
pub trait Fetcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the number of bytes written.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Destination already held data; no request was made.
    Skipped,
    Downloaded { bytes: u64 },
}

/// Per-track download front end.
#[derive(Clone)]
pub struct DownloadEngine {
    config: Arc<DownloadConfig>,
    fetcher: Arc<dyn Fetcher>,
    /// Covers and danmaku always go through the built-in client.
    aux: Arc<dyn Fetcher>,
}

impl std::fmt::Debug for DownloadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadEngine")
            .field("backend", &self.fetcher.name())
            .field("concurrency", &self.config.concurrency)
            .finish()
    }
}

impl DownloadEngine {
    /// Engine for the configured backend.
    pub fn new(config: Arc<DownloadConfig>) -> Result<Self, TransportError> {
        let client = build_client(&config)?;
        let builtin: Arc<dyn Fetcher> = Arc::new(HttpBackend::new(
            client.clone(),
            config.concurrency,
            config.show_progress,
        ));
        let fetcher: Arc<dyn Fetcher> = match config.backend {
            DownloadBackend::Builtin => builtin,
            DownloadBackend::Aria2c => Arc::new(Aria2cBackend::new(&config)),
        };
        let aux = Arc::new(HttpBackend::new(client, 1, false));
        Ok(Self {
            config,
            fetcher,
            aux,
        })
    }

    /// Engine with a caller supplied fetcher used for every download.
    pub fn with_fetcher(config: Arc<DownloadConfig>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config,
            aux: fetcher.clone(),
            fetcher,
        }
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Download one track.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<DownloadOutcome, TransportError> {
        self.download_with(self.fetcher.as_ref(), url, dest).await
    }

    /// Download an auxiliary file (cover, danmaku) with the built-in client.
    pub async fn download_file(
        &self,
        url: &str,
        dest: &Path,
    ) -> Result<DownloadOutcome, TransportError> {
        self.download_with(self.aux.as_ref(), url, dest).await
    }

    /// Download ordered fragments with bounded concurrency.
    ///
    /// Returns the destination paths in fragment order.
    pub async fn download_fragments(
        &self,
        fragments: &[(String, PathBuf)],
    ) -> Result<Vec<PathBuf>, TransportError> {
        let total = fragments.len();
        stream::iter(fragments.iter().enumerate())
            .map(|(i, (url, dest))| async move {
                info!(fragment = i + 1, total, "Downloading fragment");
                self.download(url, dest).await?;
                Ok::<_, TransportError>(dest.clone())
            })
            .buffered(self.config.concurrency.max(1))
            .try_collect()
            .await
    }

    async fn download_with(
        &self,
        fetcher: &dyn Fetcher,
        url: &str,
        dest: &Path,
    ) -> Result<DownloadOutcome, TransportError> {
        if is_nonempty_file(dest).await {
            debug!(path = %dest.display(), "Destination exists, skipping download");
            return Ok(DownloadOutcome::Skipped);
        }
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| TransportError::io("creating directory", parent, e))?;
        }

        let url = rewrite_url(url, &self.config);
        debug!(backend = fetcher.name(), url = %url, path = %dest.display(), "Starting download");
        let bytes = fetcher.fetch(&url, dest).await?;
        Ok(DownloadOutcome::Downloaded { bytes })
    }
}

/// True when `path` is a regular file with at least one byte.
pub async fn is_nonempty_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file() && meta.len() > 0)
}
