//! Ranking and filtering of video/audio candidates.
//!
//! Ordering is total: after the preference scores and bandwidth, ties are
//! broken lexically on quality, codec and URL, so the sorted list never
//! depends on the order the extractor returned the tracks in.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::media::Track;
use crate::media::quality::{dfn_matches, normalize_codec};

/// User preferences applied to every page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionPreferences {
    /// Quality identifiers (ids or display names), best first.
    pub dfn_priority: Vec<String>,
    /// Codec names, best first. Compared after normalization.
    pub encoding_priority: Vec<String>,
    /// Prefer the lowest video bandwidth among equal-priority candidates.
    pub video_ascending: bool,
    /// Prefer the lowest audio bandwidth.
    pub audio_ascending: bool,
    /// Keep only tracks of exactly this quality.
    pub exact_dfn: Option<String>,
    /// Ask the user for the track index instead of taking the first.
    pub interactive: bool,
}

/// Track selector.
#[derive(Debug, Clone)]
pub struct TrackSelector {
    prefs: SelectionPreferences,
    encoding: Vec<String>,
}

impl TrackSelector {
    pub fn new(prefs: SelectionPreferences) -> Self {
        let encoding = prefs
            .encoding_priority
            .iter()
            .map(|c| normalize_codec(c))
            .collect();
        Self { prefs, encoding }
    }

    pub fn preferences(&self) -> &SelectionPreferences {
        &self.prefs
    }

    pub fn is_interactive(&self) -> bool {
        self.prefs.interactive
    }

    /// Filter by the exact quality (if any) and sort video candidates best first.
    ///
    /// An exact quality with no match yields an empty list; the caller decides
    /// whether that is fatal for the page.
    pub fn sort_video(&self, tracks: &[Track]) -> Vec<Track> {
        let mut candidates: Vec<Track> = match &self.prefs.exact_dfn {
            Some(exact) => tracks
                .iter()
                .filter(|t| dfn_matches(exact, &t.dfn))
                .cloned()
                .collect(),
            None => tracks.to_vec(),
        };
        if candidates.is_empty() && !tracks.is_empty() {
            debug!(
                exact = ?self.prefs.exact_dfn,
                available = tracks.len(),
                "No video track matches the exact quality"
            );
        }
        candidates.sort_by(|a, b| self.compare_video(a, b));
        candidates
    }

    /// Sort audio (or background / role audio) candidates by bandwidth.
    pub fn sort_audio(&self, tracks: &[Track]) -> Vec<Track> {
        let mut candidates = tracks.to_vec();
        candidates.sort_by(|a, b| {
            by_bandwidth(a, b, self.prefs.audio_ascending).then_with(|| tie_break(a, b))
        });
        candidates
    }

    /// Compare two video tracks. Lower sorts first.
    fn compare_video(&self, a: &Track, b: &Track) -> Ordering {
        self.dfn_score(a)
            .cmp(&self.dfn_score(b))
            .then_with(|| self.codec_score(a).cmp(&self.codec_score(b)))
            .then_with(|| by_bandwidth(a, b, self.prefs.video_ascending))
            .then_with(|| tie_break(a, b))
    }

    /// Position in the quality priority list; `usize::MAX` when absent.
    fn dfn_score(&self, track: &Track) -> usize {
        self.prefs
            .dfn_priority
            .iter()
            .position(|p| dfn_matches(p, &track.dfn))
            .unwrap_or(usize::MAX)
    }

    fn codec_score(&self, track: &Track) -> usize {
        let codec = normalize_codec(&track.codecs);
        self.encoding
            .iter()
            .position(|c| *c == codec)
            .unwrap_or(usize::MAX)
    }
}

fn by_bandwidth(a: &Track, b: &Track, ascending: bool) -> Ordering {
    if ascending {
        a.bandwidth.cmp(&b.bandwidth)
    } else {
        b.bandwidth.cmp(&a.bandwidth)
    }
}

fn tie_break(a: &Track, b: &Track) -> Ordering {
    a.dfn
        .cmp(&b.dfn)
        .then_with(|| a.codecs.cmp(&b.codecs))
        .then_with(|| a.url().cmp(b.url()))
}

/// Resolve a requested index against `count` candidates. Anything outside
/// `[0, count)` (or no request at all) picks the first candidate.
pub fn clamp_index(requested: Option<i64>, count: usize) -> usize {
    match requested {
        Some(index) if index >= 0 && (index as u64) < count as u64 => index as usize,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{TrackKind, TrackSource};

    fn track(kind: TrackKind, dfn: &str, codecs: &str, bandwidth: u64) -> Track {
        Track {
            kind,
            dfn: dfn.to_string(),
            codecs: codecs.to_string(),
            bandwidth,
            resolution: None,
            fps: None,
            duration: 0,
            size: 0,
            source: TrackSource::Url(format!("https://cdn/{dfn}-{codecs}-{bandwidth}")),
        }
    }

    fn video(dfn: &str, codecs: &str, bandwidth: u64) -> Track {
        track(TrackKind::Video, dfn, codecs, bandwidth)
    }

    fn keys(tracks: &[Track]) -> Vec<(String, String, u64)> {
        tracks
            .iter()
            .map(|t| (t.dfn.clone(), t.codecs.clone(), t.bandwidth))
            .collect()
    }

    #[test]
    fn test_priority_ordering() {
        let selector = TrackSelector::new(SelectionPreferences {
            dfn_priority: vec!["80".into(), "64".into()],
            encoding_priority: vec!["hevc".into(), "avc".into()],
            ..Default::default()
        });
        let tracks = vec![
            video("64", "HEVC", 900),
            video("80", "AVC", 2000),
            video("120", "HEVC", 9000),
            video("80", "HEVC", 1500),
        ];

        let sorted = selector.sort_video(&tracks);
        assert_eq!(
            keys(&sorted),
            vec![
                ("80".into(), "HEVC".into(), 1500),
                ("80".into(), "AVC".into(), 2000),
                ("64".into(), "HEVC".into(), 900),
                ("120".into(), "HEVC".into(), 9000),
            ]
        );
    }

    #[test]
    fn test_bandwidth_direction() {
        let tracks = vec![video("80", "AVC", 1000), video("80", "AVC", 3000)];

        let desc = TrackSelector::new(SelectionPreferences::default()).sort_video(&tracks);
        assert_eq!(desc[0].bandwidth, 3000);

        let asc = TrackSelector::new(SelectionPreferences {
            video_ascending: true,
            ..Default::default()
        })
        .sort_video(&tracks);
        assert_eq!(asc[0].bandwidth, 1000);
    }

    #[test]
    fn test_order_independent() {
        let selector = TrackSelector::new(SelectionPreferences {
            encoding_priority: vec!["avc".into()],
            ..Default::default()
        });
        let mut tracks = vec![
            video("80", "AVC", 1000),
            video("80", "HEVC", 1000),
            video("64", "AVC", 1000),
            video("80", "AV1", 1000),
            video("32", "AVC", 500),
        ];
        let expected = keys(&selector.sort_video(&tracks));

        for rotation in 1..tracks.len() {
            tracks.rotate_left(1);
            assert_eq!(keys(&selector.sort_video(&tracks)), expected, "{rotation}");
        }
        tracks.reverse();
        assert_eq!(keys(&selector.sort_video(&tracks)), expected);
    }

    #[test]
    fn test_exact_dfn_filters() {
        let tracks = vec![video("80", "AVC", 1000), video("64", "AVC", 800)];
        let selector = TrackSelector::new(SelectionPreferences {
            exact_dfn: Some("720P 高清".into()),
            ..Default::default()
        });
        let sorted = selector.sort_video(&tracks);
        assert_eq!(sorted.len(), 1);
        assert_eq!(sorted[0].dfn, "64");

        let none = TrackSelector::new(SelectionPreferences {
            exact_dfn: Some("127".into()),
            ..Default::default()
        });
        assert!(none.sort_video(&tracks).is_empty());
    }

    #[test]
    fn test_audio_by_bandwidth() {
        let tracks = vec![
            track(TrackKind::Audio, "30216", "M4A", 64_000),
            track(TrackKind::Audio, "30280", "M4A", 192_000),
            track(TrackKind::Audio, "30232", "M4A", 132_000),
        ];
        let sorted = TrackSelector::new(SelectionPreferences::default()).sort_audio(&tracks);
        assert_eq!(sorted[0].bandwidth, 192_000);

        let asc = TrackSelector::new(SelectionPreferences {
            audio_ascending: true,
            ..Default::default()
        })
        .sort_audio(&tracks);
        assert_eq!(asc[0].bandwidth, 64_000);
    }

    #[test]
    fn test_clamp_index() {
        assert_eq!(clamp_index(None, 3), 0);
        assert_eq!(clamp_index(Some(2), 3), 2);
        assert_eq!(clamp_index(Some(3), 3), 0);
        assert_eq!(clamp_index(Some(-1), 3), 0);
        assert_eq!(clamp_index(Some(5), 0), 0);
    }
}
