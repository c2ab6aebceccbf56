use std::path::PathBuf;

use clap::Parser;
use pagedl_engine::{DownloadBackend, ItemKind, ItemKinds, MuxerKind, PageSelection};

use crate::config::{AppConfig, DanmakuConverterConfig};

/// Download every page of a video item, pick tracks by preference and mux
/// them into one file per page.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Item URL or id (BV…, av…, ep…, ss…)
    pub input: String,

    /// Config file (defaults to <config dir>/pagedl/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// JSON manifest describing the item's pages and streams
    #[arg(short, long, env = "PAGEDL_MANIFEST")]
    pub manifest: Option<PathBuf>,

    /// Pages to download: ALL, LAST, or a list such as 1,3-5
    #[arg(short = 'p', long = "select-page", default_value = "ALL")]
    pub pages: PageSelection,

    /// Enable debug logging and dump extraction payloads
    #[arg(long, conflicts_with = "quiet")]
    pub debug: bool,

    /// Only print errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Choose streams interactively
    #[arg(short, long)]
    pub interactive: bool,

    /// Quality priority, best first (e.g. "8K,1080P 高码率,80")
    #[arg(long = "dfn-priority", value_delimiter = ',')]
    pub dfn_priority: Option<Vec<String>>,

    /// Codec priority, best first (e.g. "hevc,av1,avc")
    #[arg(short = 'e', long = "encoding-priority", value_delimiter = ',')]
    pub encoding_priority: Option<Vec<String>>,

    /// Only accept video streams of exactly this quality
    #[arg(long)]
    pub exact_dfn: Option<String>,

    /// Prefer the lowest video bandwidth
    #[arg(long)]
    pub video_ascending: bool,

    /// Prefer the lowest audio bandwidth
    #[arg(long)]
    pub audio_ascending: bool,

    /// Print streams and exit
    #[arg(long)]
    pub only_show_info: bool,

    /// Do not list available streams
    #[arg(long)]
    pub hide_streams: bool,

    /// Print every page, not only the first five and the last
    #[arg(long)]
    pub show_all: bool,

    #[arg(long, conflicts_with_all = ["audio_only", "sub_only", "cover_only", "danmaku_only"])]
    pub video_only: bool,

    #[arg(long, conflicts_with_all = ["sub_only", "cover_only", "danmaku_only"])]
    pub audio_only: bool,

    #[arg(long, conflicts_with_all = ["cover_only", "danmaku_only"])]
    pub sub_only: bool,

    #[arg(long, conflicts_with = "danmaku_only")]
    pub cover_only: bool,

    #[arg(long)]
    pub danmaku_only: bool,

    /// Also download danmaku and convert it to ASS
    #[arg(long)]
    pub download_danmaku: bool,

    #[arg(long)]
    pub skip_subtitle: bool,

    #[arg(long)]
    pub skip_cover: bool,

    /// Drop machine generated subtitles
    #[arg(long)]
    pub skip_ai: bool,

    /// Items that must be present; a page missing one is skipped (e.g. "subtitle")
    #[arg(long = "force", value_name = "ITEMS")]
    pub force_items: Option<ItemKinds>,

    /// Keep the downloaded streams and do not mux
    #[arg(long)]
    pub skip_mux: bool,

    /// Mux with MP4Box instead of ffmpeg
    #[arg(long)]
    pub use_mp4box: bool,

    #[arg(long)]
    pub ffmpeg_path: Option<String>,

    #[arg(long)]
    pub mp4box_path: Option<String>,

    /// Download with aria2c
    #[arg(long)]
    pub use_aria2c: bool,

    #[arg(long)]
    pub aria2c_path: Option<String>,

    /// Extra aria2c arguments, replacing the default connection settings
    #[arg(long, allow_hyphen_values = true)]
    pub aria2c_args: Option<String>,

    /// Parallel connections per download
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Download over plain HTTP
    #[arg(long)]
    pub force_http: bool,

    /// Replace the host of every media URL
    #[arg(long, value_name = "HOST")]
    pub upos_host: Option<String>,

    #[arg(long)]
    pub user_agent: Option<String>,

    /// Pattern for single-page items
    #[arg(short = 'F', long)]
    pub file_pattern: Option<String>,

    /// Pattern for multi-page items
    #[arg(short = 'M', long)]
    pub multi_file_pattern: Option<String>,

    /// Output root directory
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Seconds to wait between pages
    #[arg(long = "delay-per-page")]
    pub page_delay: Option<u64>,

    /// Audio language tag written into the output
    #[arg(long)]
    pub language: Option<String>,

    /// Danmaku converter program
    #[arg(long)]
    pub danmaku_converter: Option<String>,
}

impl Args {
    /// Layer the flags over `config`. Flags win.
    pub fn apply(&self, config: &mut AppConfig) {
        if self.manifest.is_some() {
            config.manifest = self.manifest.clone();
        }
        if let Some(program) = &self.danmaku_converter {
            config
                .danmaku_converter
                .get_or_insert_with(DanmakuConverterConfig::default)
                .program = program.clone();
        }

        let p = &mut config.pipeline;
        let selection = &mut p.selection;
        if let Some(list) = &self.dfn_priority {
            selection.dfn_priority = list.clone();
        }
        if let Some(list) = &self.encoding_priority {
            selection.encoding_priority = list.clone();
        }
        if self.exact_dfn.is_some() {
            selection.exact_dfn = self.exact_dfn.clone();
        }
        selection.video_ascending |= self.video_ascending;
        selection.audio_ascending |= self.audio_ascending;
        selection.interactive |= self.interactive;

        p.only_show_info |= self.only_show_info;
        p.hide_streams |= self.hide_streams;
        p.show_all_pages |= self.show_all;
        p.skip_mux |= self.skip_mux;
        p.skip_ai_subtitles |= self.skip_ai;
        p.debug_dump |= self.debug;
        if let Some(items) = &self.force_items {
            p.force_items = items.clone();
        }
        if let Some(items) = self.requested_items(&p.download_items) {
            p.download_items = items;
        }

        if self.use_mp4box {
            p.mux.muxer = MuxerKind::Mp4box;
        }
        if let Some(path) = &self.ffmpeg_path {
            p.mux.ffmpeg_path = path.clone();
        }
        if let Some(path) = &self.mp4box_path {
            p.mux.mp4box_path = path.clone();
        }

        let d = &mut p.download;
        if self.use_aria2c {
            d.backend = DownloadBackend::Aria2c;
        }
        if let Some(path) = &self.aria2c_path {
            d.accelerator_path = path.clone();
        }
        if let Some(args) = &self.aria2c_args {
            d.accelerator_args = args.split_whitespace().map(String::from).collect();
        }
        if let Some(threads) = self.threads {
            d.concurrency = threads.max(1);
        }
        d.force_http |= self.force_http;
        if self.upos_host.is_some() {
            d.host_override = self.upos_host.clone();
        }
        if let Some(agent) = &self.user_agent {
            d.user_agent = agent.clone();
        }
        if self.quiet {
            d.show_progress = false;
        }

        if let Some(pattern) = &self.file_pattern {
            p.file_pattern = pattern.clone();
        }
        if let Some(pattern) = &self.multi_file_pattern {
            p.multi_file_pattern = pattern.clone();
        }
        if let Some(dir) = &self.work_dir {
            p.work_dir = dir.clone();
        }
        if let Some(delay) = self.page_delay {
            p.page_delay_secs = delay;
        }
        if self.language.is_some() {
            p.language = self.language.clone();
        }
    }

    /// Item kinds implied by the `--*-only`, `--skip-*` and danmaku flags.
    fn requested_items(&self, current: &ItemKinds) -> Option<ItemKinds> {
        let only = [
            (self.video_only, ItemKind::Video),
            (self.audio_only, ItemKind::Audio),
            (self.sub_only, ItemKind::Subtitle),
            (self.cover_only, ItemKind::Cover),
            (self.danmaku_only, ItemKind::Danmaku),
        ];
        if let Some((_, kind)) = only.iter().find(|(set, _)| *set) {
            let mut items: ItemKinds = [*kind].into_iter().collect();
            // Video-only output still carries subtitles and cover.
            if *kind == ItemKind::Video && !self.skip_subtitle {
                items.insert(ItemKind::Subtitle);
            }
            if matches!(kind, ItemKind::Video | ItemKind::Audio) && !self.skip_cover {
                items.insert(ItemKind::Cover);
            }
            if self.download_danmaku && *kind != ItemKind::Danmaku {
                items.insert(ItemKind::Danmaku);
            }
            return Some(items);
        }

        if !(self.skip_subtitle || self.skip_cover || self.download_danmaku) {
            return None;
        }
        let items = current
            .iter()
            .filter(|kind| !(self.skip_subtitle && *kind == ItemKind::Subtitle))
            .filter(|kind| !(self.skip_cover && *kind == ItemKind::Cover))
            .chain(self.download_danmaku.then_some(ItemKind::Danmaku))
            .collect();
        Some(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("pagedl").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_override_config() {
        let args = parse(&[
            "BV1xx411c7mD",
            "-e",
            "hevc,avc",
            "--use-aria2c",
            "-t",
            "4",
            "--delay-per-page",
            "3",
            "-p",
            "1,3-4",
        ]);
        let mut config = AppConfig::default();
        config.pipeline.selection.encoding_priority = vec!["av1".to_string()];
        args.apply(&mut config);

        let p = &config.pipeline;
        assert_eq!(p.selection.encoding_priority, vec!["hevc", "avc"]);
        assert_eq!(p.download.backend, DownloadBackend::Aria2c);
        assert_eq!(p.download.concurrency, 4);
        assert_eq!(p.page_delay_secs, 3);
        assert_eq!(args.pages.to_string(), "1,3,4");
    }

    #[test]
    fn test_only_flags_select_items() {
        let mut config = AppConfig::default();
        parse(&["BV1xx411c7mD", "--audio-only", "--skip-cover"]).apply(&mut config);
        assert_eq!(config.pipeline.download_items.to_string(), "audio");

        let mut config = AppConfig::default();
        parse(&["BV1xx411c7mD", "--sub-only"]).apply(&mut config);
        assert!(config.pipeline.download_items.is_only(ItemKind::Subtitle));

        let mut config = AppConfig::default();
        parse(&["BV1xx411c7mD", "--video-only"]).apply(&mut config);
        assert_eq!(
            config.pipeline.download_items.to_string(),
            "video,subtitle,cover"
        );
    }

    #[test]
    fn test_skip_and_danmaku_flags() {
        let mut config = AppConfig::default();
        parse(&["BV1xx411c7mD", "--skip-subtitle", "--download-danmaku"]).apply(&mut config);
        let items = &config.pipeline.download_items;
        assert!(!items.contains(ItemKind::Subtitle));
        assert!(items.contains(ItemKind::Danmaku));
        assert!(items.contains(ItemKind::Video));
    }

    #[test]
    fn test_conflicting_only_flags() {
        assert!(
            Args::try_parse_from(["pagedl", "BV1xx411c7mD", "--video-only", "--audio-only"])
                .is_err()
        );
    }
}
