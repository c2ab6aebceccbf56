//! Resolved, read-only pipeline settings.
//!
//! Built once at startup (CLI arguments layered over the config file) and then
//! shared behind an `Arc`; nothing mutates it afterwards.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::media::ItemKinds;
use crate::mux::MuxerKind;
use crate::retry::RetryPolicy;
use crate::selector::SelectionPreferences;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

pub const DEFAULT_FILE_PATTERN: &str = "<videoTitle>";
pub const DEFAULT_MULTI_FILE_PATTERN: &str = "<videoTitle>/[P<pageNumberWithZero>]<pageTitle>";

/// Which backend materializes track bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadBackend {
    /// Built-in HTTP client with concurrent byte ranges.
    #[default]
    Builtin,
    /// External `aria2c` process.
    Aria2c,
}

/// Download settings shared by every track of every page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub backend: DownloadBackend,
    /// Accelerator binary.
    pub accelerator_path: String,
    /// Extra accelerator arguments; replace the default connection flags when set.
    pub accelerator_args: Vec<String>,
    /// Number of byte ranges (and fragments) fetched at once. `1` disables splitting.
    pub concurrency: usize,
    /// Rewrite `https://` media URLs to `http://`.
    pub force_http: bool,
    /// Replace the host of every media URL (mirror override).
    pub host_override: Option<String>,
    pub user_agent: String,
    pub referer: Option<String>,
    pub connect_timeout_secs: u64,
    /// Draw progress bars on stderr.
    pub show_progress: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            backend: DownloadBackend::Builtin,
            accelerator_path: "aria2c".to_string(),
            accelerator_args: Vec::new(),
            concurrency: 8,
            force_http: false,
            host_override: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referer: Some("https://www.bilibili.com".to_string()),
            connect_timeout_secs: 30,
            show_progress: true,
        }
    }
}

impl DownloadConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Request headers every download carries.
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![("User-Agent".to_string(), self.user_agent.clone())];
        if let Some(referer) = &self.referer {
            headers.push(("Referer".to_string(), referer.clone()));
        }
        headers
    }
}

/// External muxer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    /// Preferred strategy. Dolby Vision on an old ffmpeg falls back to MP4Box.
    pub muxer: MuxerKind,
    pub ffmpeg_path: String,
    pub mp4box_path: String,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            muxer: MuxerKind::Ffmpeg,
            ffmpeg_path: "ffmpeg".to_string(),
            mp4box_path: "MP4Box".to_string(),
        }
    }
}

/// Everything the page pipeline needs to know.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub selection: SelectionPreferences,
    pub download: DownloadConfig,
    pub mux: MuxConfig,
    pub retry: RetryPolicy,
    /// Kinds the user asked for.
    pub download_items: ItemKinds,
    /// Kinds whose absence skips the page.
    pub force_items: ItemKinds,
    /// Print tracks and stop.
    pub only_show_info: bool,
    pub hide_streams: bool,
    /// Download but leave the elementary files unmuxed.
    pub skip_mux: bool,
    pub skip_ai_subtitles: bool,
    pub file_pattern: String,
    pub multi_file_pattern: String,
    /// Audio language tag written into the container.
    pub language: Option<String>,
    /// Pause before each page after the first, in seconds.
    pub page_delay_secs: u64,
    /// Tag substituted for `<apiType>`.
    pub api_type: String,
    /// Root for working directories and relative output paths.
    pub work_dir: PathBuf,
    /// Dump raw extraction payloads next to the working directory.
    pub debug_dump: bool,
    /// `{cid}` is replaced with the page's content id.
    pub danmaku_url_template: String,
    /// Print every page instead of the first five and the last.
    pub show_all_pages: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            selection: SelectionPreferences::default(),
            download: DownloadConfig::default(),
            mux: MuxConfig::default(),
            retry: RetryPolicy::default(),
            download_items: ItemKinds::default(),
            force_items: ItemKinds::empty(),
            only_show_info: false,
            hide_streams: false,
            skip_mux: false,
            skip_ai_subtitles: false,
            file_pattern: DEFAULT_FILE_PATTERN.to_string(),
            multi_file_pattern: DEFAULT_MULTI_FILE_PATTERN.to_string(),
            language: None,
            page_delay_secs: 0,
            api_type: "WEB".to_string(),
            work_dir: PathBuf::from("."),
            debug_dump: false,
            danmaku_url_template: "https://comment.bilibili.com/{cid}.xml".to_string(),
            show_all_pages: false,
        }
    }
}

impl PipelineConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_secs(self.page_delay_secs)
    }

    pub fn danmaku_url(&self, cid: &str) -> String {
        self.danmaku_url_template.replace("{cid}", cid)
    }
}
