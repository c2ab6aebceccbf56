//! Collaborator seams.
//!
//! Platform API parsing, subtitle transcoding and danmaku conversion live
//! outside the engine. The page pipeline only talks to these traits.

use std::path::Path;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::media::{ChapterMarker, ItemInfo, Page, ParsedResult, Subtitle};

/// Parameters of one extraction call.
#[derive(Debug, Clone)]
pub struct ExtractRequest<'a> {
    pub item_id: &'a str,
    pub page: &'a Page,
    /// First entry of the codec priority list, passed as a hint.
    pub preferred_codec: Option<&'a str>,
    /// Quality to extract. Fragment representations are re-extracted with
    /// the quality the user picked.
    pub dfn: Option<&'a str>,
}

/// Turns a page into downloadable tracks.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, request: &ExtractRequest<'_>) -> Result<ParsedResult, TransportError>;

    /// Chapter markers published for the page.
    async fn chapters(&self, _page: &Page) -> Result<Vec<ChapterMarker>, TransportError> {
        Ok(Vec::new())
    }
}

/// Resolves an item id into its metadata and page list.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self, item_id: &str) -> Result<ItemInfo, TransportError>;
}

/// Lists subtitles and writes them into the working directory.
#[async_trait]
pub trait SubtitleSource: Send + Sync {
    async fn list(&self, item_id: &str, page: &Page) -> Result<Vec<Subtitle>, TransportError>;

    async fn save(&self, subtitle: &Subtitle, dest: &Path) -> Result<(), TransportError>;
}

/// Converts a downloaded danmaku XML file into ASS next to it.
#[async_trait]
pub trait DanmakuConverter: Send + Sync {
    async fn convert(&self, xml: &Path, ass: &Path, page: &Page) -> Result<(), TransportError>;
}

/// Interactive track choice.
#[async_trait]
pub trait TrackPrompt: Send + Sync {
    /// Ask for an index among `count` listed candidates of `label`.
    /// `None` means no (parsable) answer.
    async fn choose(&self, label: &str, count: usize) -> Option<i64>;
}

/// Prompt that never answers; selection falls back to index 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompt;

#[async_trait]
impl TrackPrompt for NoPrompt {
    async fn choose(&self, _label: &str, _count: usize) -> Option<i64> {
        None
    }
}

/// Subtitle source for platforms without subtitles.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSubtitles;

#[async_trait]
impl SubtitleSource for NoSubtitles {
    async fn list(&self, _item_id: &str, _page: &Page) -> Result<Vec<Subtitle>, TransportError> {
        Ok(Vec::new())
    }

    async fn save(&self, _subtitle: &Subtitle, _dest: &Path) -> Result<(), TransportError> {
        Ok(())
    }
}
