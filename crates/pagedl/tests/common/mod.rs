#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use pagedl_engine::download::Fetcher;
use pagedl_engine::mux::{MuxResult, Muxer, MuxerKind, MuxRequest};
use pagedl_engine::source::{ExtractRequest, Extractor, MetadataSource, TrackPrompt};
use pagedl_engine::{
    DownloadConfig, DownloadEngine, ItemInfo, Page, ParsedResult, PipelineConfig, Track,
    TrackKind, TrackSource, TransportError,
};
use parking_lot::Mutex;

pub fn page(index: u32) -> Page {
    Page {
        index,
        aid: "BV1xx411c7mD".to_string(),
        cid: format!("{index}000"),
        epid: None,
        title: format!("Part {index}"),
        duration: 60,
        owner_name: "uploader".to_string(),
        description: String::new(),
        cover_url: None,
        chapters: Vec::new(),
    }
}

pub fn item(pages: u32) -> ItemInfo {
    ItemInfo {
        id: "BV1xx411c7mD".to_string(),
        title: "Sample Item".to_string(),
        cover_url: None,
        pub_time: 1_600_000_000,
        description: "desc".to_string(),
        pages: (1..=pages).map(page).collect(),
        is_series: false,
        is_series_complete: false,
        is_course: false,
    }
}

pub fn track(kind: TrackKind, dfn: &str, codecs: &str, bandwidth: u64) -> Track {
    Track {
        kind,
        dfn: dfn.to_string(),
        codecs: codecs.to_string(),
        bandwidth,
        resolution: None,
        fps: None,
        duration: 60,
        size: 0,
        source: TrackSource::Url(format!("https://cdn.example/{dfn}-{codecs}-{bandwidth}")),
    }
}

pub fn dash_result() -> ParsedResult {
    ParsedResult {
        video_tracks: vec![track(TrackKind::Video, "80", "avc", 2_000_000)],
        audio_tracks: vec![track(TrackKind::Audio, "30280", "M4A", 192_000)],
        raw_payload: "{}".to_string(),
        ..Default::default()
    }
}

pub fn config(work_dir: &Path) -> PipelineConfig {
    PipelineConfig {
        work_dir: work_dir.to_path_buf(),
        download: DownloadConfig {
            show_progress: false,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Extractor returning canned results and recording the requested quality.
pub struct ScriptedExtractor {
    pub first: ParsedResult,
    /// Returned when extraction is re-invoked with an explicit quality.
    pub by_dfn: Option<ParsedResult>,
    pub calls: Mutex<Vec<Option<String>>>,
}

impl ScriptedExtractor {
    pub fn new(first: ParsedResult) -> Arc<Self> {
        Arc::new(Self {
            first,
            by_dfn: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn with_requality(first: ParsedResult, by_dfn: ParsedResult) -> Arc<Self> {
        Arc::new(Self {
            first,
            by_dfn: Some(by_dfn),
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn extract(&self, request: &ExtractRequest<'_>) -> Result<ParsedResult, TransportError> {
        self.calls.lock().push(request.dfn.map(str::to_string));
        match (request.dfn, &self.by_dfn) {
            (Some(_), Some(result)) => Ok(result.clone()),
            _ => Ok(self.first.clone()),
        }
    }
}

pub struct StaticMetadata(pub ItemInfo);

#[async_trait]
impl MetadataSource for StaticMetadata {
    async fn fetch(&self, item_id: &str) -> Result<ItemInfo, TransportError> {
        if item_id == self.0.id {
            Ok(self.0.clone())
        } else {
            Err(TransportError::extraction(format!("unknown item {item_id}")))
        }
    }
}

/// Writes the URL as file content; fails the first `failures` calls.
pub struct FlakyFetcher {
    pub failures: u32,
    pub calls: AtomicU32,
}

impl FlakyFetcher {
    pub fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FlakyFetcher {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(TransportError::extraction("connection reset by peer"));
        }
        tokio::fs::write(dest, url.as_bytes())
            .await
            .map_err(|e| TransportError::io("writing", dest, e))?;
        Ok(url.len() as u64)
    }
}

pub fn engine(config: &PipelineConfig, fetcher: Arc<dyn Fetcher>) -> DownloadEngine {
    DownloadEngine::with_fetcher(Arc::new(config.download.clone()), fetcher)
}

/// Muxer that records requests and writes a placeholder output.
#[derive(Default)]
pub struct RecordingMuxer {
    pub requests: Mutex<Vec<MuxRequest>>,
    pub concats: Mutex<Vec<Vec<PathBuf>>>,
    /// While set, `mux` fails without writing anything.
    pub fail_mux: AtomicBool,
}

#[async_trait]
impl Muxer for RecordingMuxer {
    fn kind(&self) -> MuxerKind {
        MuxerKind::Ffmpeg
    }

    async fn mux(&self, request: &MuxRequest) -> MuxResult {
        self.requests.lock().push(request.clone());
        if self.fail_mux.load(Ordering::SeqCst) {
            return MuxResult::failed("Invalid data found when processing input");
        }
        match std::fs::write(&request.output, b"muxed") {
            Ok(()) => MuxResult::ok(),
            Err(e) => MuxResult::failed(e.to_string()),
        }
    }

    async fn concat(&self, parts: &[PathBuf], output: &Path) -> MuxResult {
        self.concats.lock().push(parts.to_vec());
        let mut joined = Vec::new();
        for part in parts {
            match std::fs::read(part) {
                Ok(bytes) => joined.extend(bytes),
                Err(e) => return MuxResult::failed(e.to_string()),
            }
        }
        match std::fs::write(output, joined) {
            Ok(()) => MuxResult::ok(),
            Err(e) => MuxResult::failed(e.to_string()),
        }
    }
}

/// Answers every prompt with the same index.
pub struct FixedPrompt(pub i64);

#[async_trait]
impl TrackPrompt for FixedPrompt {
    async fn choose(&self, _label: &str, _count: usize) -> Option<i64> {
        Some(self.0)
    }
}
