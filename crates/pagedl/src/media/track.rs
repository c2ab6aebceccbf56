use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::page::ChapterMarker;
use super::{format_duration, format_size};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

/// Where a track's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackSource {
    /// One URL holding the whole elementary stream.
    Url(String),
    /// Sequential fragments that must be concatenated in order.
    Fragments(Vec<String>),
}

impl TrackSource {
    /// The first (or only) URL, used for sorting tie-breaks and logging.
    pub fn primary_url(&self) -> &str {
        match self {
            Self::Url(url) => url,
            Self::Fragments(parts) => parts.first().map(String::as_str).unwrap_or(""),
        }
    }

    /// True for a fragment list with nothing in it.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Fragments(parts) if parts.is_empty())
    }
}

/// One candidate video or audio stream. Immutable once extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub kind: TrackKind,
    /// Quality identifier, e.g. `"80"` or `"1080P 高清"`.
    pub dfn: String,
    /// Codec identifier, e.g. `"AVC"`, `"HEVC"`, `"AV1"`, `"M4A"`.
    pub codecs: String,
    /// Bits per second.
    #[serde(default)]
    pub bandwidth: u64,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub fps: Option<String>,
    /// Seconds.
    #[serde(default)]
    pub duration: u64,
    /// Bytes, 0 when unknown.
    #[serde(default)]
    pub size: u64,
    pub source: TrackSource,
}

impl Track {
    pub fn url(&self) -> &str {
        self.source.primary_url()
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::with_capacity(6);
        if self.kind == TrackKind::Video {
            parts.push(self.dfn.clone());
            parts.extend(self.resolution.clone());
        }
        parts.push(self.codecs.clone());
        if self.kind == TrackKind::Video {
            parts.extend(self.fps.clone());
        }
        parts.push(format!("{} kbps", self.bandwidth / 1000));
        if self.size > 0 {
            parts.push(format!("~{}", format_size(self.size)));
        } else if self.duration > 0 {
            let estimated = self.bandwidth / 8 * self.duration;
            parts.push(format!("~{}", format_size(estimated)));
        }
        if self.duration > 0 {
            parts.push(format_duration(self.duration));
        }
        let rendered: Vec<String> = parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .map(|p| format!("[{p}]"))
            .collect();
        write!(f, "{}", rendered.join(" "))
    }
}

/// A named alternate audio set (e.g. a dub) with its own working file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAudioGroup {
    pub title: String,
    #[serde(default)]
    pub language: Option<String>,
    /// Target file; the page layout assigns one when extraction leaves it empty.
    #[serde(default)]
    pub path: Option<PathBuf>,
    pub tracks: Vec<Track>,
}

/// How a page's media is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    /// Separate video/audio tracks, every quality enumerable up front.
    Dash,
    /// Legacy sequential clips of one quality; other qualities need re-extraction.
    Fragmented,
}

/// Extraction output for one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsedResult {
    pub video_tracks: Vec<Track>,
    pub audio_tracks: Vec<Track>,
    pub background_audio_tracks: Vec<Track>,
    pub role_audio: Vec<RoleAudioGroup>,
    /// Ordered fragment URLs of the fragment representation.
    pub clips: Vec<String>,
    /// Quality identifiers selectable for the fragment representation.
    pub dfns: Vec<String>,
    pub extra_points: Vec<ChapterMarker>,
    /// Raw response body, kept for diagnostics.
    pub raw_payload: String,
}

impl ParsedResult {
    /// `None` when the result carries nothing downloadable.
    pub fn representation(&self) -> Option<Representation> {
        let has_tracks = !self.video_tracks.is_empty() || !self.audio_tracks.is_empty();
        if has_tracks && self.clips.is_empty() {
            Some(Representation::Dash)
        } else if !self.clips.is_empty() && !self.dfns.is_empty() {
            Some(Representation::Fragmented)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(dfn: &str) -> Track {
        Track {
            kind: TrackKind::Video,
            dfn: dfn.to_string(),
            codecs: "AVC".to_string(),
            bandwidth: 2_000_000,
            resolution: Some("1920x1080".to_string()),
            fps: Some("30".to_string()),
            duration: 60,
            size: 0,
            source: TrackSource::Url("https://cdn.example/v.m4s".to_string()),
        }
    }

    #[test]
    fn test_representation() {
        let mut parsed = ParsedResult::default();
        assert_eq!(parsed.representation(), None);

        parsed.video_tracks.push(video("80"));
        assert_eq!(parsed.representation(), Some(Representation::Dash));

        let clips_only = ParsedResult {
            clips: vec!["https://cdn.example/1.flv".to_string()],
            dfns: vec!["80".to_string()],
            ..Default::default()
        };
        assert_eq!(clips_only.representation(), Some(Representation::Fragmented));

        let clips_without_dfns = ParsedResult {
            clips: vec!["https://cdn.example/1.flv".to_string()],
            ..Default::default()
        };
        assert_eq!(clips_without_dfns.representation(), None);
    }

    #[test]
    fn test_display_estimates_size() {
        let rendered = video("80").to_string();
        assert_eq!(
            rendered,
            "[80] [1920x1080] [AVC] [30] [2000 kbps] [~14.31 MB] [01:00]"
        );
    }

    #[test]
    fn test_track_source_serde() {
        let json = r#"{"kind":"audio","dfn":"30280","codecs":"M4A","source":{"url":"https://a/b.m4s"}}"#;
        let track: Track = serde_json::from_str(json).unwrap();
        assert_eq!(track.kind, TrackKind::Audio);
        assert_eq!(track.url(), "https://a/b.m4s");
        assert_eq!(track.bandwidth, 0);
    }

    #[test]
    fn test_fragment_source() {
        let json = r#"{"kind":"video","dfn":"80","codecs":"AVC","source":{"fragments":["https://a/1.m4s","https://a/2.m4s"]}}"#;
        let track: Track = serde_json::from_str(json).unwrap();
        assert_eq!(track.url(), "https://a/1.m4s");
        assert!(!track.source.is_empty());
        assert!(TrackSource::Fragments(Vec::new()).is_empty());
        assert!(!TrackSource::Url(String::new()).is_empty());
    }
}
