//! JSON manifest collaborator.
//!
//! A manifest lists items with their pages and, per page `cid`, the extraction
//! result the engine would otherwise get from a platform API:
//!
//! ```json
//! {
//!   "items": [{
//!     "id": "BV1xx411c7mD",
//!     "aliases": ["av170001"],
//!     "title": "Sample",
//!     "pages": [{ "index": 1, "aid": "BV1xx411c7mD", "cid": "279786", "title": "P1" }],
//!     "streams": {
//!       "279786": {
//!         "video_tracks": [...],
//!         "audio_tracks": [...],
//!         "by_dfn": { "64": { "clips": [...], "dfns": [...] } }
//!       }
//!     },
//!     "subtitles": { "279786": [{ "lang": "zh-CN", "url": "subs/p1.srt" }] }
//!   }]
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pagedl_engine::source::{ExtractRequest, Extractor, MetadataSource, SubtitleSource};
use pagedl_engine::{ChapterMarker, ItemInfo, Page, ParsedResult, Subtitle, TransportError};
use serde::Deserialize;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Deserialize)]
struct ManifestFile {
    items: Vec<ManifestItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct ManifestItem {
    #[serde(flatten)]
    info: ItemInfo,
    #[serde(default)]
    aliases: Vec<String>,
    /// Keyed by page `cid`.
    #[serde(default)]
    streams: HashMap<String, PageStreams>,
    #[serde(default)]
    subtitles: HashMap<String, Vec<Subtitle>>,
}

impl ManifestItem {
    fn matches(&self, id: &str) -> bool {
        self.info.id.eq_ignore_ascii_case(id) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(id))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PageStreams {
    #[serde(flatten)]
    default: ParsedResult,
    /// Results for an explicitly requested quality.
    #[serde(default)]
    by_dfn: HashMap<String, ParsedResult>,
}

/// Item metadata, streams and subtitles read from a JSON manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    items: Vec<ManifestItem>,
    /// Relative subtitle paths resolve against this directory.
    base_dir: PathBuf,
    client: reqwest::Client,
}

impl Manifest {
    pub async fn load(path: &Path, client: reqwest::Client) -> Result<Self> {
        let text = fs::read_to_string(path).await.map_err(|e| {
            AppError::Manifest(format!("cannot read {}: {e}", path.display()))
        })?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let manifest = Self::parse(&text, base_dir, client)?;
        info!(
            path = %path.display(),
            items = manifest.items.len(),
            "Loaded manifest"
        );
        Ok(manifest)
    }

    pub fn parse(text: &str, base_dir: PathBuf, client: reqwest::Client) -> Result<Self> {
        let file: ManifestFile =
            serde_json::from_str(text).map_err(|e| AppError::Manifest(e.to_string()))?;
        Ok(Self {
            items: file.items,
            base_dir,
            client,
        })
    }

    fn item(&self, id: &str) -> Option<&ManifestItem> {
        self.items.iter().find(|item| item.matches(id))
    }

    fn streams(&self, item_id: &str, cid: &str) -> Option<&PageStreams> {
        self.item(item_id).and_then(|item| item.streams.get(cid))
    }
}

#[async_trait]
impl MetadataSource for Manifest {
    async fn fetch(&self, item_id: &str) -> std::result::Result<ItemInfo, TransportError> {
        self.item(item_id)
            .map(|item| item.info.clone())
            .ok_or_else(|| TransportError::extraction(format!("{item_id} is not in the manifest")))
    }
}

#[async_trait]
impl Extractor for Manifest {
    async fn extract(
        &self,
        request: &ExtractRequest<'_>,
    ) -> std::result::Result<ParsedResult, TransportError> {
        let cid = &request.page.cid;
        let streams = self.streams(request.item_id, cid).ok_or_else(|| {
            TransportError::extraction(format!("no streams for {} cid {cid}", request.item_id))
        })?;

        let mut parsed = match request.dfn.and_then(|dfn| streams.by_dfn.get(dfn)) {
            Some(parsed) => parsed.clone(),
            None => streams.default.clone(),
        };
        debug!(cid, dfn = ?request.dfn, codec = ?request.preferred_codec, "Extracted from manifest");
        if parsed.raw_payload.is_empty() {
            parsed.raw_payload = serde_json::to_string(&parsed).unwrap_or_default();
        }
        Ok(parsed)
    }

    async fn chapters(&self, page: &Page) -> std::result::Result<Vec<ChapterMarker>, TransportError> {
        Ok(page.chapters.clone())
    }
}

#[async_trait]
impl SubtitleSource for Manifest {
    async fn list(
        &self,
        item_id: &str,
        page: &Page,
    ) -> std::result::Result<Vec<Subtitle>, TransportError> {
        Ok(self
            .item(item_id)
            .and_then(|item| item.subtitles.get(&page.cid))
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, subtitle: &Subtitle, dest: &Path) -> std::result::Result<(), TransportError> {
        if subtitle.url.starts_with("http://") || subtitle.url.starts_with("https://") {
            let response = self.client.get(&subtitle.url).send().await?;
            if !response.status().is_success() {
                return Err(TransportError::http_status(response.status(), &subtitle.url));
            }
            let bytes = response.bytes().await?;
            fs::write(dest, &bytes)
                .await
                .map_err(|e| TransportError::io("writing", dest, e))?;
        } else {
            let source = self.base_dir.join(&subtitle.url);
            fs::copy(&source, dest)
                .await
                .map_err(|e| TransportError::io("copying", &source, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
      "items": [{
        "id": "BV1xx411c7mD",
        "aliases": ["av170001"],
        "title": "Sample",
        "pages": [
          { "index": 1, "aid": "BV1xx411c7mD", "cid": "100", "title": "Intro" }
        ],
        "streams": {
          "100": {
            "clips": ["https://cdn.example/low.flv"],
            "dfns": ["80", "32"],
            "by_dfn": {
              "80": { "clips": ["https://cdn.example/a.flv", "https://cdn.example/b.flv"], "dfns": ["80", "32"] }
            }
          }
        },
        "subtitles": {
          "100": [{ "lang": "en-US", "url": "subs/intro.srt" }]
        }
      }]
    }"#;

    fn manifest(base: &Path) -> Manifest {
        pagedl_engine::download::install_rustls_provider();
        Manifest::parse(MANIFEST, base.to_path_buf(), reqwest::Client::new()).unwrap()
    }

    #[tokio::test]
    async fn test_metadata_by_alias() {
        let manifest = manifest(Path::new("."));
        let item = manifest.fetch("av170001").await.unwrap();
        assert_eq!(item.title, "Sample");
        assert_eq!(item.pages[0].cid, "100");
        assert!(manifest.fetch("BV0000000000").await.is_err());
    }

    #[tokio::test]
    async fn test_extract_with_quality() {
        let manifest = manifest(Path::new("."));
        let item = manifest.fetch("BV1xx411c7mD").await.unwrap();
        let page = &item.pages[0];

        let mut request = ExtractRequest {
            item_id: "BV1xx411c7mD",
            page,
            preferred_codec: None,
            dfn: None,
        };
        let first = manifest.extract(&request).await.unwrap();
        assert_eq!(first.clips.len(), 1);
        assert!(!first.raw_payload.is_empty());

        request.dfn = Some("80");
        assert_eq!(manifest.extract(&request).await.unwrap().clips.len(), 2);

        request.dfn = Some("16");
        assert_eq!(manifest.extract(&request).await.unwrap().clips.len(), 1);
    }

    #[tokio::test]
    async fn test_local_subtitles() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("subs")).unwrap();
        std::fs::write(dir.path().join("subs/intro.srt"), "1\n00:00:00,000 --> 00:00:01,000\nhi\n").unwrap();

        let manifest = manifest(dir.path());
        let item = manifest.fetch("BV1xx411c7mD").await.unwrap();
        let subs = manifest.list("BV1xx411c7mD", &item.pages[0]).await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].container_type, "srt");

        let dest = dir.path().join("cached.srt");
        manifest.save(&subs[0], &dest).await.unwrap();
        assert!(std::fs::read_to_string(&dest).unwrap().contains("hi"));
    }
}
