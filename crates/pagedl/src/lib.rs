//! Track negotiation and download/mux orchestration.
//!
//! The engine takes the extraction output for each page of an item, picks the
//! best video/audio tracks against the user's priority lists, downloads them
//! into a per-item working directory and hands the elementary streams to an
//! external muxer. Platform specifics (metadata, extraction, subtitles, danmaku)
//! stay behind the collaborator traits in [`source`].

pub mod config;
pub mod download;
pub mod error;
pub mod format;
pub mod layout;
pub mod media;
pub mod mux;
pub mod page;
pub mod retry;
pub mod selector;
pub mod session;
pub mod source;

pub use config::{DownloadBackend, DownloadConfig, MuxConfig, PipelineConfig};
pub use download::{DownloadEngine, DownloadOutcome};
pub use error::{PageError, TransportError};
pub use media::{
    ChapterMarker, ItemInfo, ItemKind, ItemKinds, Page, ParsedResult, RoleAudioGroup, Subtitle,
    Track, TrackKind, TrackSource,
};
pub use mux::{MuxOrchestrator, MuxRequest, MuxResult, Muxer, MuxerKind, MuxerSet};
pub use page::{EarlyExit, ItemContext, PageOutcome, PageRunner, PageState};
pub use retry::RetryPolicy;
pub use selector::{SelectionPreferences, TrackSelector};
pub use session::{PageSelection, RunReport, Session};
