//! Built-in HTTP backend with concurrent byte ranges.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use indicatif::ProgressBar;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::{Response, StatusCode};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};

use super::Fetcher;
use super::progress::track_progress;
use crate::error::TransportError;

/// Fetches a URL with `concurrency` parallel range requests when the server
/// advertises a length, and as a single stream otherwise. A server that answers
/// the initial range but ignores later ones is also read as a single stream.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    concurrency: usize,
    show_progress: bool,
}

/// What the initial `bytes=0-0` probe told us.
enum Probe {
    /// Server honours ranges and reported the full length.
    Ranged { total: u64 },
    /// Server answered with the whole body; stream it.
    Whole(Response),
    /// Ranges honoured but no usable length; fall back to one request.
    Unknown,
}

impl HttpBackend {
    pub fn new(client: reqwest::Client, concurrency: usize, show_progress: bool) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
            show_progress,
        }
    }

    async fn probe(&self, url: &str) -> Result<Probe, TransportError> {
        let response = self.client.get(url).header(RANGE, "bytes=0-0").send().await?;
        let status = response.status();
        if status == StatusCode::PARTIAL_CONTENT {
            let total = response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range_total);
            return Ok(match total {
                Some(total) => Probe::Ranged { total },
                None => Probe::Unknown,
            });
        }
        if status.is_success() {
            return Ok(Probe::Whole(response));
        }
        Err(TransportError::http_status(status, url))
    }

    async fn fetch_sequential(
        &self,
        url: &str,
        part: &Path,
        response: Option<Response>,
    ) -> Result<u64, TransportError> {
        let response = match response {
            Some(response) => response,
            None => {
                let response = self.client.get(url).send().await?;
                if !response.status().is_success() {
                    return Err(TransportError::http_status(response.status(), url));
                }
                response
            }
        };
        let expected = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let progress = track_progress(self.show_progress, expected);
        let mut file = File::create(part)
            .await
            .map_err(|e| TransportError::io("creating", part, e))?;

        let mut received = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| TransportError::io("writing", part, e))?;
            received += chunk.len() as u64;
            progress.inc(chunk.len() as u64);
        }
        file.flush()
            .await
            .map_err(|e| TransportError::io("flushing", part, e))?;
        progress.finish_and_clear();

        if let Some(expected) = expected
            && expected != received
        {
            return Err(TransportError::IncompleteRange {
                url: url.to_string(),
                start: 0,
                end: expected.saturating_sub(1),
                received,
            });
        }
        Ok(received)
    }

    async fn fetch_ranged(&self, url: &str, part: &Path, total: u64) -> Result<u64, TransportError> {
        let file = File::create(part)
            .await
            .map_err(|e| TransportError::io("creating", part, e))?;
        file.set_len(total)
            .await
            .map_err(|e| TransportError::io("allocating", part, e))?;
        drop(file);

        let ranges = split_ranges(total, self.concurrency);
        debug!(url, total, ranges = ranges.len(), "Downloading in ranges");

        let progress = track_progress(self.show_progress, Some(total));
        stream::iter(ranges)
            .map(|(start, end)| {
                let progress = progress.clone();
                async move { self.fetch_range(url, part, start, end, &progress).await }
            })
            .buffer_unordered(self.concurrency)
            .try_collect::<Vec<()>>()
            .await?;
        progress.finish_and_clear();

        let written = fs::metadata(part)
            .await
            .map_err(|e| TransportError::io("inspecting", part, e))?
            .len();
        if written != total {
            return Err(TransportError::IncompleteRange {
                url: url.to_string(),
                start: 0,
                end: total - 1,
                received: written,
            });
        }
        Ok(total)
    }

    async fn fetch_range(
        &self,
        url: &str,
        part: &Path,
        start: u64,
        end: u64,
        progress: &ProgressBar,
    ) -> Result<(), TransportError> {
        let response = self
            .client
            .get(url)
            .header(RANGE, format!("bytes={start}-{end}"))
            .send()
            .await?;
        match response.status() {
            StatusCode::PARTIAL_CONTENT => {}
            StatusCode::OK => {
                return Err(TransportError::RangeIgnored {
                    url: url.to_string(),
                });
            }
            status => return Err(TransportError::http_status(status, url)),
        }

        let mut file = OpenOptions::new()
            .write(true)
            .open(part)
            .await
            .map_err(|e| TransportError::io("opening", part, e))?;
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|e| TransportError::io("seeking", part, e))?;

        let expected = end - start + 1;
        let mut received = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            // Never write past the range even if the server over-delivers.
            let take = (expected - received).min(chunk.len() as u64) as usize;
            file.write_all(&chunk[..take])
                .await
                .map_err(|e| TransportError::io("writing", part, e))?;
            received += take as u64;
            progress.inc(take as u64);
            if received == expected {
                break;
            }
        }
        file.flush()
            .await
            .map_err(|e| TransportError::io("flushing", part, e))?;

        if received != expected {
            return Err(TransportError::IncompleteRange {
                url: url.to_string(),
                start,
                end,
                received,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Fetcher for HttpBackend {
    fn name(&self) -> &'static str {
        "builtin"
    }

    #[instrument(skip(self), level = "debug")]
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, TransportError> {
        let part = part_path(dest);
        let bytes = match self.probe(url).await? {
            Probe::Ranged { total } if total > 0 && self.concurrency > 1 => {
                match self.fetch_ranged(url, &part, total).await {
                    Err(TransportError::RangeIgnored { .. }) => {
                        warn!(url, "Server ignored byte ranges, reading sequentially");
                        self.fetch_sequential(url, &part, None).await?
                    }
                    other => other?,
                }
            }
            Probe::Ranged { .. } | Probe::Unknown => self.fetch_sequential(url, &part, None).await?,
            Probe::Whole(response) => self.fetch_sequential(url, &part, Some(response)).await?,
        };

        fs::rename(&part, dest)
            .await
            .map_err(|e| TransportError::io("renaming", &part, e))?;
        info!(path = %dest.display(), bytes, "Download complete");
        Ok(bytes)
    }
}

/// `{dest}.part`, where bytes land until the download is verified.
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Total length from a `Content-Range: bytes 0-0/12345` header.
fn parse_content_range_total(value: &str) -> Option<u64> {
    value
        .rsplit_once('/')
        .and_then(|(_, total)| total.trim().parse().ok())
}

/// Split `[0, total)` into at most `parts` contiguous inclusive ranges.
pub fn split_ranges(total: u64, parts: usize) -> Vec<(u64, u64)> {
    if total == 0 {
        return Vec::new();
    }
    let parts = (parts.max(1) as u64).min(total);
    let chunk = total.div_ceil(parts);
    (0..parts)
        .map(|i| i * chunk)
        .take_while(|start| *start < total)
        .map(|start| (start, (start + chunk).min(total) - 1))
        .collect()
}
