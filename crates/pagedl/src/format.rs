//! Output path patterns.
//!
//! A pattern is a `/`-separated relative path containing `<placeholder>`
//! tokens. Every substituted value is sanitized for use as a single path
//! component, so metadata can never introduce extra directories. An unknown
//! token keeps its name, with the angle brackets sanitized to `_` like any
//! other character invalid in a file name.

use std::path::PathBuf;

use chrono::DateTime;

use crate::media::{Page, Subtitle, Track};

const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const CONTAINER_EXTENSIONS: &[&str] = &["mp4", "m4a", "mkv", "mov", "flv", "srt", "ass", "jpg"];

/// Make `input` safe as one path component on every platform.
///
/// Invalid and control characters collapse into a single `_`, leading and
/// trailing spaces/dots are dropped, reserved Windows names get a `_` prefix
/// and an empty result becomes `unnamed`.
pub fn sanitize_filename(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut last_was_replacement = false;
    for c in input.chars() {
        if c.is_control() || INVALID_CHARS.contains(&c) {
            if !last_was_replacement {
                result.push('_');
                last_was_replacement = true;
            }
        } else {
            result.push(c);
            last_was_replacement = false;
        }
    }

    let trimmed = result.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return "unnamed".to_string();
    }

    let upper = trimmed.to_uppercase();
    let stem = upper.split('.').next().unwrap_or_default();
    if RESERVED_NAMES.contains(&stem) {
        return format!("_{trimmed}");
    }
    trimmed.to_string()
}

/// Everything a pattern may refer to.
#[derive(Debug, Clone, Copy)]
pub struct FormatContext<'a> {
    pub item_title: &'a str,
    pub page: &'a Page,
    /// Total pages of the item, before page filtering.
    pub page_count: usize,
    pub video: Option<&'a Track>,
    pub audio: Option<&'a Track>,
    pub api_type: &'a str,
    /// Unix seconds.
    pub pub_time: i64,
    /// Set when naming a standalone subtitle file.
    pub subtitle: Option<&'a Subtitle>,
    /// No video is requested; the container becomes `.m4a`.
    pub audio_only: bool,
}

/// Turns a pattern into a relative output path.
pub trait PathFormatter: Send + Sync {
    fn format(&self, pattern: &str, ctx: &FormatContext<'_>) -> PathBuf;
}

/// Formatter understanding the built-in placeholder set.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPathFormatter;

impl DefaultPathFormatter {
    fn value(&self, name: &str, ctx: &FormatContext<'_>) -> Option<String> {
        let page = ctx.page;
        let value = match name {
            "videoTitle" => ctx.item_title.to_string(),
            "pageNumber" => page.index.to_string(),
            "pageNumberWithZero" => {
                let width = ctx.page_count.max(1).to_string().len();
                format!("{:0width$}", page.index)
            }
            "pageTitle" => page.title.clone(),
            "bvid" | "aid" => page.aid.clone(),
            "cid" => page.cid.clone(),
            "dfn" => ctx.video.map(|v| v.dfn.clone()).unwrap_or_default(),
            "res" => ctx
                .video
                .and_then(|v| v.resolution.clone())
                .unwrap_or_default(),
            "fps" => ctx.video.and_then(|v| v.fps.clone()).unwrap_or_default(),
            "videoCodecs" => ctx.video.map(|v| v.codecs.clone()).unwrap_or_default(),
            "videoBandwidth" => ctx
                .video
                .map(|v| v.bandwidth.to_string())
                .unwrap_or_default(),
            "audioCodecs" => ctx.audio.map(|a| a.codecs.clone()).unwrap_or_default(),
            "audioBandwidth" => ctx
                .audio
                .map(|a| a.bandwidth.to_string())
                .unwrap_or_default(),
            "ownerName" => page.owner_name.clone(),
            "apiType" => ctx.api_type.to_string(),
            "publishDate" => DateTime::from_timestamp(ctx.pub_time, 0)
                .map(|t| t.format("%Y-%m-%d_%H-%M-%S").to_string())
                .unwrap_or_default(),
            "subtitleType" => ctx.subtitle.map(|s| s.lang.clone()).unwrap_or_default(),
            _ => return None,
        };
        Some(value)
    }

    fn substitute(&self, component: &str, ctx: &FormatContext<'_>) -> String {
        let mut out = String::with_capacity(component.len());
        let mut rest = component;
        while let Some(start) = rest.find('<') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            match tail.find('>') {
                Some(end) => {
                    let name = &tail[1..end];
                    match self.value(name, ctx) {
                        Some(value) => out.push_str(&sanitize_filename_lenient(&value)),
                        // Sanitized with the rest of the component: `<x>` becomes `_x_`.
                        None => out.push_str(&tail[..=end]),
                    }
                    rest = &tail[end + 1..];
                }
                None => {
                    out.push_str(tail);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// Like [`sanitize_filename`] but keeps empty values empty, so optional
/// placeholders can vanish from a component.
fn sanitize_filename_lenient(value: &str) -> String {
    if value.trim().is_empty() {
        String::new()
    } else {
        sanitize_filename(value)
    }
}

impl PathFormatter for DefaultPathFormatter {
    fn format(&self, pattern: &str, ctx: &FormatContext<'_>) -> PathBuf {
        let components: Vec<String> = pattern
            .split(['/', '\\'])
            .filter(|c| !c.is_empty())
            .map(|c| sanitize_filename(&self.substitute(c, ctx)))
            .collect();

        let mut path: PathBuf = components.iter().collect();
        let has_container = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| CONTAINER_EXTENSIONS.contains(&e.to_lowercase().as_str()));

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unnamed")
            .to_string();

        let file_name = match ctx.subtitle {
            Some(sub) => {
                let stem = if has_container {
                    path.file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or("unnamed")
                        .to_string()
                } else {
                    file_name
                };
                if pattern.contains("<subtitleType>") {
                    format!("{stem}.{}", sub.container_type)
                } else {
                    format!("{stem}.{}.{}", sub.lang, sub.container_type)
                }
            }
            None if has_container => file_name,
            None if ctx.audio_only => format!("{file_name}.m4a"),
            None => format!("{file_name}.mp4"),
        };
        path.set_file_name(file_name);
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{TrackKind, TrackSource};

    fn page(index: u32, title: &str) -> Page {
        Page {
            index,
            aid: "BV1xx411c7mD".to_string(),
            cid: "1176840".to_string(),
            epid: None,
            title: title.to_string(),
            duration: 60,
            owner_name: "up".to_string(),
            description: String::new(),
            cover_url: None,
            chapters: Vec::new(),
        }
    }

    fn video() -> Track {
        Track {
            kind: TrackKind::Video,
            dfn: "1080P 高清".to_string(),
            codecs: "AVC".to_string(),
            bandwidth: 2_000_000,
            resolution: Some("1920x1080".to_string()),
            fps: Some("30".to_string()),
            duration: 60,
            size: 0,
            source: TrackSource::Url("https://cdn/v".to_string()),
        }
    }

    fn ctx<'a>(page: &'a Page, video: Option<&'a Track>) -> FormatContext<'a> {
        FormatContext {
            item_title: "My Title",
            page,
            page_count: 12,
            video,
            audio: None,
            api_type: "WEB",
            pub_time: 0,
            subtitle: None,
            audio_only: false,
        }
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("hello?world"), "hello_world");
        assert_eq!(sanitize_filename("a<>:b"), "a_b");
        assert_eq!(sanitize_filename(".hidden."), "hidden");
        assert_eq!(sanitize_filename(""), "unnamed");
        assert_eq!(sanitize_filename("con.txt"), "_con.txt");
        assert_eq!(sanitize_filename("观看一只青蛙?"), "观看一只青蛙_");
    }

    #[test]
    fn test_multi_page_pattern() {
        let page = page(3, "Intro/Part");
        let path = DefaultPathFormatter.format(
            "<videoTitle>/[P<pageNumberWithZero>]<pageTitle>",
            &ctx(&page, None),
        );
        assert_eq!(path, PathBuf::from("My Title").join("[P03]Intro_Part.mp4"));
    }

    #[test]
    fn test_track_placeholders() {
        let page = page(1, "p");
        let video = video();
        let path = DefaultPathFormatter.format(
            "<videoTitle>-<dfn>-<res>-<videoCodecs>-<apiType>-<publishDate>",
            &ctx(&page, Some(&video)),
        );
        assert_eq!(
            path,
            PathBuf::from("My Title-1080P 高清-1920x1080-AVC-WEB-1970-01-01_00-00-00.mp4")
        );
    }

    #[test]
    fn test_audio_only_and_explicit_extension() {
        let page = page(1, "p");
        let mut context = ctx(&page, None);
        context.audio_only = true;
        assert_eq!(
            DefaultPathFormatter.format("<videoTitle>", &context),
            PathBuf::from("My Title.m4a")
        );
        assert_eq!(
            DefaultPathFormatter.format("<videoTitle>.mkv", &context),
            PathBuf::from("My Title.mkv")
        );
    }

    #[test]
    fn test_subtitle_naming() {
        let page = page(1, "p");
        let sub = Subtitle {
            lang: "en-US".to_string(),
            url: "u".to_string(),
            container_type: "srt".to_string(),
        };
        let mut context = ctx(&page, None);
        context.subtitle = Some(&sub);
        assert_eq!(
            DefaultPathFormatter.format("<videoTitle>", &context),
            PathBuf::from("My Title.en-US.srt")
        );
        assert_eq!(
            DefaultPathFormatter.format("<videoTitle>.<subtitleType>", &context),
            PathBuf::from("My Title.en-US.srt")
        );
    }

    #[test]
    fn test_unknown_placeholder_keeps_its_name() {
        let page = page(1, "p");
        let path = DefaultPathFormatter.format("<nope>x", &ctx(&page, None));
        assert_eq!(path, PathBuf::from("_nope_x.mp4"));

        let path = DefaultPathFormatter.format("<pageNumber>/<nope>", &ctx(&page, None));
        assert_eq!(path, PathBuf::from("1/_nope_.mp4"));
    }
}
