//! Multiplexing of downloaded elementary streams.
//!
//! Muxing itself is done by external tools behind the [`Muxer`] trait. The
//! [`MuxOrchestrator`] decides which tool runs and owns the cleanup rule:
//! inputs are only removed after a successful mux.

mod ffmpeg;
pub mod language;
mod mp4box;

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

pub use ffmpeg::FfmpegMuxer;
pub use mp4box::Mp4boxMuxer;

use crate::config::MuxConfig;
use crate::error::PageError;
use crate::media::ChapterMarker;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MuxerKind {
    #[default]
    Ffmpeg,
    Mp4box,
}

impl MuxerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ffmpeg => "ffmpeg",
            Self::Mp4box => "mp4box",
        }
    }
}

impl fmt::Display for MuxerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Additional audio stream (background track or dub).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioInput {
    pub title: String,
    pub language: Option<String>,
    pub path: PathBuf,
}

/// Cached subtitle to embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleInput {
    /// Platform language tag.
    pub lang: String,
    pub path: PathBuf,
}

/// Container level tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MuxMetadata {
    pub title: String,
    pub author: String,
    pub description: String,
    pub pub_time: Option<DateTime<Utc>>,
    /// Audio language tag.
    pub language: Option<String>,
    /// Set for multi-page items; carries the page title.
    pub episode_id: Option<String>,
}

/// Everything one mux invocation combines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MuxRequest {
    pub output: PathBuf,
    pub video: Option<PathBuf>,
    pub audio: Option<PathBuf>,
    pub extra_audio: Vec<AudioInput>,
    pub cover: Option<PathBuf>,
    pub subtitles: Vec<SubtitleInput>,
    pub metadata: MuxMetadata,
    pub chapters: Vec<ChapterMarker>,
}

impl MuxRequest {
    /// Elementary inputs, excluding the cover (which may be shared by pages).
    pub fn inputs(&self) -> Vec<&Path> {
        self.video
            .iter()
            .chain(self.audio.iter())
            .map(PathBuf::as_path)
            .chain(self.extra_audio.iter().map(|a| a.path.as_path()))
            .chain(self.subtitles.iter().map(|s| s.path.as_path()))
            .collect()
    }

    pub fn is_audio_only(&self) -> bool {
        self.video.is_none()
    }
}

/// Outcome of an external tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxResult {
    pub success: bool,
    pub diagnostic: String,
}

impl MuxResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            diagnostic: String::new(),
        }
    }

    pub fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            success: false,
            diagnostic: diagnostic.into(),
        }
    }
}

/// An external multiplexer.
#[async_trait]
pub trait Muxer: Send + Sync {
    fn kind(&self) -> MuxerKind;

    /// Whether Dolby Vision streams survive this muxer.
    fn supports_dolby_vision(&self) -> bool {
        true
    }

    async fn mux(&self, request: &MuxRequest) -> MuxResult;

    /// Join ordered parts of one stream into `output`.
    async fn concat(&self, parts: &[PathBuf], output: &Path) -> MuxResult;
}

/// Preferred muxer plus the one used when the preferred cannot handle the content.
#[derive(Clone)]
pub struct MuxerSet {
    primary: Arc<dyn Muxer>,
    fallback: Option<Arc<dyn Muxer>>,
}

impl fmt::Debug for MuxerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MuxerSet")
            .field("primary", &self.primary.kind())
            .field("fallback", &self.fallback.as_ref().map(|m| m.kind()))
            .finish()
    }
}

impl MuxerSet {
    pub fn new(primary: Arc<dyn Muxer>, fallback: Option<Arc<dyn Muxer>>) -> Self {
        Self { primary, fallback }
    }

    /// ffmpeg first with MP4Box as fallback, or MP4Box alone.
    pub fn from_config(config: &MuxConfig) -> Self {
        let mp4box: Arc<dyn Muxer> = Arc::new(Mp4boxMuxer::new(&config.mp4box_path));
        match config.muxer {
            MuxerKind::Ffmpeg => Self::new(
                Arc::new(FfmpegMuxer::detect(&config.ffmpeg_path)),
                Some(mp4box),
            ),
            MuxerKind::Mp4box => Self::new(mp4box, None),
        }
    }

    /// Muxer for a page; Dolby Vision content avoids a muxer that would drop it.
    pub fn pick(&self, dolby_vision: bool) -> Arc<dyn Muxer> {
        if dolby_vision
            && !self.primary.supports_dolby_vision()
            && let Some(fallback) = &self.fallback
        {
            warn!(
                primary = %self.primary.kind(),
                fallback = %fallback.kind(),
                "Dolby Vision needs ffmpeg 5.0 or newer, switching muxer"
            );
            return fallback.clone();
        }
        self.primary.clone()
    }

    /// Muxer used for fragment concatenation.
    pub fn primary(&self) -> Arc<dyn Muxer> {
        self.primary.clone()
    }
}

/// What to delete besides the request's elementary inputs after a good mux.
#[derive(Debug, Clone, Default)]
pub struct CleanupPlan {
    /// Cover file, only on the last page of the item.
    pub cover: Option<PathBuf>,
    /// Working directory, removed when it ends up empty.
    pub work_dir: Option<PathBuf>,
}

/// Runs muxers and cleans up after them.
#[derive(Debug, Clone)]
pub struct MuxOrchestrator {
    muxers: MuxerSet,
}

impl MuxOrchestrator {
    pub fn new(muxers: MuxerSet) -> Self {
        Self { muxers }
    }

    pub fn muxers(&self) -> &MuxerSet {
        &self.muxers
    }

    /// Join fragments into `output`. Parts are removed only on success.
    pub async fn concat_fragments(
        &self,
        parts: &[PathBuf],
        output: &Path,
    ) -> Result<PathBuf, PageError> {
        match parts {
            [] => return Err(PageError::mux_failure("no fragments to concatenate")),
            [single] => {
                fs::rename(single, output).await.map_err(|e| {
                    PageError::mux_failure(format!(
                        "moving {} to {}: {e}",
                        single.display(),
                        output.display()
                    ))
                })?;
                return Ok(output.to_path_buf());
            }
            _ => {}
        }

        info!(parts = parts.len(), output = %output.display(), "Concatenating fragments");
        let result = self.muxers.primary().concat(parts, output).await;
        if !result.success {
            return Err(PageError::mux_failure(result.diagnostic));
        }
        for part in parts {
            remove_quietly(part).await;
        }
        Ok(output.to_path_buf())
    }

    /// Mux `request` and clean up its inputs. On failure everything stays.
    pub async fn mux(
        &self,
        request: &MuxRequest,
        dolby_vision: bool,
        cleanup: &CleanupPlan,
    ) -> Result<PathBuf, PageError> {
        if let Some(parent) = request.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                PageError::mux_failure(format!("creating {}: {e}", parent.display()))
            })?;
        }

        let muxer = self.muxers.pick(dolby_vision);
        info!(
            muxer = %muxer.kind(),
            output = %request.output.display(),
            subtitles = request.subtitles.len(),
            "Muxing"
        );
        let result = muxer.mux(request).await;
        if !result.success {
            return Err(PageError::mux_failure(result.diagnostic));
        }

        for input in request.inputs() {
            remove_quietly(input).await;
        }
        if let Some(cover) = &cleanup.cover {
            remove_quietly(cover).await;
        }
        if let Some(dir) = &cleanup.work_dir {
            remove_dir_if_empty(dir).await;
        }
        Ok(request.output.clone())
    }
}

/// Delete a file, tolerating its absence.
pub(crate) async fn remove_quietly(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove file"),
    }
}

/// Remove `dir` if it exists and holds nothing.
pub async fn remove_dir_if_empty(dir: &Path) {
    let Ok(mut entries) = fs::read_dir(dir).await else {
        return;
    };
    if matches!(entries.next_entry().await, Ok(None)) {
        match fs::remove_dir(dir).await {
            Ok(()) => debug!(path = %dir.display(), "Removed empty working directory"),
            Err(e) => warn!(path = %dir.display(), error = %e, "Failed to remove directory"),
        }
    }
}

/// Chapter start as `HH:MM:SS.mmm`.
pub(crate) fn chapter_timestamp(secs: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}.000",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}
