//! MP4Box muxer, used for Dolby Vision when ffmpeg is too old.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use process_utils::{run_captured, tokio_command};
use tokio::fs;
use tracing::debug;

use super::language::{audio_language, subtitle_language};
use super::{Muxer, MuxerKind, MuxRequest, MuxResult, chapter_timestamp, remove_quietly};
use crate::media::ChapterMarker;

#[derive(Debug, Clone)]
pub struct Mp4boxMuxer {
    program: String,
}

impl Mp4boxMuxer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn build_mux_args(&self, request: &MuxRequest, chapters_file: Option<&Path>) -> Vec<String> {
        let mut args = vec!["-inter".to_string(), "500".to_string(), "-noprog".to_string()];
        let audio_lang = request.metadata.language.as_deref().map(audio_language);

        if let Some(video) = &request.video {
            args.push("-add".to_string());
            args.push(format!("{}#trackID=1:name=", video.display()));
        }
        if let Some(audio) = &request.audio {
            let mut track = format!("{}:name=", audio.display());
            if let Some(lang) = &audio_lang {
                track.push_str(&format!(":lang={lang}"));
            }
            args.push("-add".to_string());
            args.push(track);
        }
        for extra in &request.extra_audio {
            let mut track = format!("{}:name={}", extra.path.display(), extra.title);
            if let Some(lang) = &extra.language {
                track.push_str(&format!(":lang={}", audio_language(lang)));
            }
            args.push("-add".to_string());
            args.push(track);
        }
        for sub in &request.subtitles {
            let (code, name) = subtitle_language(&sub.lang);
            args.push("-add".to_string());
            args.push(format!("{}#trackID=1:name={name}:lang={code}", sub.path.display()));
        }
        if let Some(chapters) = chapters_file {
            args.push("-chap".to_string());
            args.push(chapters.display().to_string());
        }

        let meta = &request.metadata;
        let mut tags = Vec::new();
        if !meta.title.is_empty() {
            tags.push(format!("title={}", meta.title));
        }
        if !meta.author.is_empty() {
            tags.push(format!("artist={}", meta.author));
        }
        if !meta.description.is_empty() {
            tags.push(format!("comment={}", meta.description.replace(':', "：")));
        }
        if let Some(time) = meta.pub_time {
            tags.push(format!("created={}", time.format("%Y-%m-%d")));
        }
        if let Some(cover) = &request.cover {
            tags.push(format!("cover={}", cover.display()));
        }
        if !tags.is_empty() {
            args.push("-itags".to_string());
            args.push(tags.join(":"));
        }

        args.push("-new".to_string());
        args.push(request.output.display().to_string());
        args
    }

    async fn run(&self, args: &[String]) -> MuxResult {
        debug!(program = %self.program, ?args, "Running MP4Box");
        let mut command = tokio_command(&self.program);
        command.args(args);
        match run_captured(&mut command).await {
            Ok(output) if output.status.success() => MuxResult::ok(),
            Ok(output) => MuxResult::failed(output.diagnostic()),
            Err(e) => MuxResult::failed(format!("failed to spawn {}: {e}", self.program)),
        }
    }
}

#[async_trait]
impl Muxer for Mp4boxMuxer {
    fn kind(&self) -> MuxerKind {
        MuxerKind::Mp4box
    }

    async fn mux(&self, request: &MuxRequest) -> MuxResult {
        let chapters_file = if request.chapters.is_empty() {
            None
        } else {
            let mut name = request.output.as_os_str().to_owned();
            name.push(".chapters.txt");
            let path = PathBuf::from(name);
            if let Err(e) = fs::write(&path, ogg_chapters(&request.chapters)).await {
                return MuxResult::failed(format!("writing {}: {e}", path.display()));
            }
            Some(path)
        };

        let args = self.build_mux_args(request, chapters_file.as_deref());
        let result = self.run(&args).await;
        if let Some(path) = chapters_file {
            remove_quietly(&path).await;
        }
        result
    }

    async fn concat(&self, parts: &[PathBuf], output: &Path) -> MuxResult {
        let mut args = Vec::with_capacity(parts.len() * 2 + 2);
        for part in parts {
            args.push("-cat".to_string());
            args.push(part.display().to_string());
        }
        args.push("-new".to_string());
        args.push(output.display().to_string());
        self.run(&args).await
    }
}

/// OGM style chapter list understood by `-chap`.
fn ogg_chapters(chapters: &[ChapterMarker]) -> String {
    chapters
        .iter()
        .enumerate()
        .map(|(i, chapter)| {
            let n = i + 1;
            format!(
                "CHAPTER{n}={}\nCHAPTER{n}NAME={}\n",
                chapter_timestamp(chapter.start),
                chapter.title
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mux::{MuxMetadata, SubtitleInput};

    #[test]
    fn test_mux_args() {
        let request = MuxRequest {
            output: PathBuf::from("out.mp4"),
            video: Some(PathBuf::from("v.mp4")),
            audio: Some(PathBuf::from("a.m4a")),
            cover: Some(PathBuf::from("c.jpg")),
            subtitles: vec![SubtitleInput {
                lang: "zh-CN".to_string(),
                path: PathBuf::from("s.srt"),
            }],
            metadata: MuxMetadata {
                title: "T".to_string(),
                author: "up".to_string(),
                language: Some("zh".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let args = Mp4boxMuxer::new("MP4Box").build_mux_args(&request, Some(Path::new("ch.txt")));
        let joined = args.join(" ");
        assert!(joined.contains("-add v.mp4#trackID=1:name="));
        assert!(joined.contains("-add a.m4a:name=:lang=chi"));
        assert!(joined.contains("-add s.srt#trackID=1:name=中文（简体）:lang=chi"));
        assert!(joined.contains("-chap ch.txt"));
        assert!(joined.contains("-itags title=T:artist=up:cover=c.jpg"));
        assert!(joined.ends_with("-new out.mp4"));
    }

    #[test]
    fn test_ogg_chapters() {
        let doc = ogg_chapters(&[
            ChapterMarker {
                start: 0,
                end: 30,
                title: "Intro".to_string(),
            },
            ChapterMarker {
                start: 75,
                end: 120,
                title: "Main".to_string(),
            },
        ]);
        assert_eq!(
            doc,
            "CHAPTER1=00:00:00.000\nCHAPTER1NAME=Intro\nCHAPTER2=00:01:15.000\nCHAPTER2NAME=Main\n"
        );
    }
}
