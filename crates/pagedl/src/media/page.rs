use serde::{Deserialize, Serialize};

/// Chapter / viewpoint marker, in seconds from the start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterMarker {
    pub start: u64,
    pub end: u64,
    pub title: String,
}

/// One playable unit (part / episode) of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based position inside the item.
    pub index: u32,
    /// Stable container id; names the working directory.
    pub aid: String,
    /// Content id of this page.
    pub cid: String,
    #[serde(default)]
    pub epid: Option<String>,
    pub title: String,
    /// Seconds.
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub owner_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub chapters: Vec<ChapterMarker>,
}

/// Item-level metadata returned by the metadata collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemInfo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub cover_url: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub pub_time: i64,
    #[serde(default)]
    pub description: String,
    pub pages: Vec<Page>,
    #[serde(default)]
    pub is_series: bool,
    #[serde(default)]
    pub is_series_complete: bool,
    #[serde(default)]
    pub is_course: bool,
}

impl ItemInfo {
    /// Multi-page naming applies to items with several pages and to
    /// series that are still airing.
    pub fn uses_multi_page_layout(&self) -> bool {
        self.pages.len() > 1 || (self.is_series && !self.is_series_complete)
    }
}

/// A subtitle offered for a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtitle {
    /// Platform language tag, e.g. `zh-CN`, `en-US`, `ai-zh`.
    pub lang: String,
    pub url: String,
    /// File extension of the cached form, e.g. `srt`.
    #[serde(default = "default_subtitle_type")]
    pub container_type: String,
}

fn default_subtitle_type() -> String {
    "srt".to_string()
}

impl Subtitle {
    /// Machine generated subtitles are tagged `ai-*`.
    pub fn is_ai_generated(&self) -> bool {
        self.lang.starts_with("ai-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(pages: usize, is_series: bool, complete: bool) -> ItemInfo {
        ItemInfo {
            id: "BV1xx".to_string(),
            title: "title".to_string(),
            cover_url: None,
            pub_time: 0,
            description: String::new(),
            pages: (1..=pages as u32)
                .map(|index| Page {
                    index,
                    aid: "BV1xx".to_string(),
                    cid: format!("{index}00"),
                    epid: None,
                    title: format!("P{index}"),
                    duration: 0,
                    owner_name: String::new(),
                    description: String::new(),
                    cover_url: None,
                    chapters: Vec::new(),
                })
                .collect(),
            is_series,
            is_series_complete: complete,
            is_course: false,
        }
    }

    #[test]
    fn test_multi_page_layout() {
        assert!(!item(1, false, false).uses_multi_page_layout());
        assert!(item(2, false, false).uses_multi_page_layout());
        assert!(item(1, true, false).uses_multi_page_layout());
        assert!(!item(1, true, true).uses_multi_page_layout());
    }

    #[test]
    fn test_subtitle_defaults() {
        let sub: Subtitle = serde_json::from_str(r#"{"lang":"ai-zh","url":"u"}"#).unwrap();
        assert_eq!(sub.container_type, "srt");
        assert!(sub.is_ai_generated());
    }
}
