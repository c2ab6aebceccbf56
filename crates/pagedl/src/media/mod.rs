//! Value types produced by the extraction and metadata collaborators.

mod kinds;
mod page;
pub mod quality;
mod track;

pub use kinds::{ItemKind, ItemKinds};
pub use page::{ChapterMarker, ItemInfo, Page, Subtitle};
pub use track::{ParsedResult, Representation, RoleAudioGroup, Track, TrackKind, TrackSource};

/// Human readable byte count, e.g. `12.50 MB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

/// `HH:MM:SS` (or `MM:SS` under an hour).
pub fn format_duration(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
