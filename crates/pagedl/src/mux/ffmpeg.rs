//! ffmpeg muxer.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use process_utils::{probe_version, run_captured, tokio_command};
use tokio::fs;
use tracing::{debug, info};

use super::language::{audio_language, subtitle_language};
use super::{Muxer, MuxerKind, MuxRequest, MuxResult, remove_quietly};
use crate::media::ChapterMarker;

/// First major version that keeps Dolby Vision configuration records.
const DOLBY_VISION_MIN_MAJOR: u32 = 5;

#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    program: String,
    version: Option<String>,
}

impl FfmpegMuxer {
    /// Muxer with a known version line (or none if it could not be probed).
    pub fn new(program: impl Into<String>, version: Option<String>) -> Self {
        Self {
            program: program.into(),
            version,
        }
    }

    /// Probe `program -version` once.
    pub fn detect(program: &str) -> Self {
        let version = probe_version(program, "-version");
        match &version {
            Some(v) => info!(version = %v, "Detected ffmpeg"),
            None => debug!(program, "ffmpeg version could not be detected"),
        }
        Self::new(program, version)
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn build_mux_args(&self, request: &MuxRequest, chapters_file: Option<&Path>) -> Vec<String> {
        let mut args = vec!["-loglevel".to_string(), "warning".to_string(), "-y".to_string()];
        let mut inputs: Vec<&Path> = Vec::new();

        let video_input = request.video.as_deref().map(|p| {
            inputs.push(p);
            inputs.len() - 1
        });
        let audio_input = request.audio.as_deref().map(|p| {
            inputs.push(p);
            inputs.len() - 1
        });
        let extra_start = inputs.len();
        inputs.extend(request.extra_audio.iter().map(|a| a.path.as_path()));
        let sub_start = inputs.len();
        inputs.extend(request.subtitles.iter().map(|s| s.path.as_path()));
        let cover_input = request.cover.as_deref().map(|p| {
            inputs.push(p);
            inputs.len() - 1
        });
        let chapters_input = chapters_file.map(|p| {
            inputs.push(p);
            inputs.len() - 1
        });

        for input in &inputs {
            args.push("-i".to_string());
            args.push(input.display().to_string());
        }

        let map = |args: &mut Vec<String>, index: usize| {
            args.push("-map".to_string());
            args.push(index.to_string());
        };
        if let Some(i) = video_input {
            map(&mut args, i);
        }
        if let Some(i) = audio_input {
            map(&mut args, i);
        }
        for i in extra_start..sub_start {
            map(&mut args, i);
        }
        for i in sub_start..sub_start + request.subtitles.len() {
            map(&mut args, i);
        }
        if let Some(i) = cover_input {
            map(&mut args, i);
        }
        if let Some(i) = chapters_input {
            args.extend(["-map_chapters".to_string(), i.to_string()]);
        }

        let meta = &request.metadata;
        let mut tag = |key: &str, value: &str| {
            if !value.is_empty() {
                args.push("-metadata".to_string());
                args.push(format!("{key}={value}"));
            }
        };
        tag("title", &meta.title);
        tag("artist", &meta.author);
        tag("description", &meta.description);
        if let Some(episode) = &meta.episode_id {
            tag("album", &meta.title);
            tag("episode_id", episode);
        }
        if let Some(time) = meta.pub_time {
            tag("creation_time", &time.to_rfc3339());
        }

        let mut audio_stream = 0;
        if request.audio.is_some() {
            if let Some(lang) = &meta.language {
                args.push(format!("-metadata:s:a:{audio_stream}"));
                args.push(format!("language={}", audio_language(lang)));
            }
            audio_stream += 1;
        }
        for extra in &request.extra_audio {
            args.push(format!("-metadata:s:a:{audio_stream}"));
            args.push(format!("title={}", extra.title));
            if let Some(lang) = &extra.language {
                args.push(format!("-metadata:s:a:{audio_stream}"));
                args.push(format!("language={}", audio_language(lang)));
            }
            audio_stream += 1;
        }
        for (n, sub) in request.subtitles.iter().enumerate() {
            let (code, name) = subtitle_language(&sub.lang);
            args.push(format!("-metadata:s:s:{n}"));
            args.push(format!("language={code}"));
            args.push(format!("-metadata:s:s:{n}"));
            args.push(format!("title={name}"));
        }

        args.extend(["-c".to_string(), "copy".to_string()]);
        if !request.subtitles.is_empty() {
            args.extend(["-c:s".to_string(), "mov_text".to_string()]);
        }
        if cover_input.is_some() {
            let cover_stream = usize::from(video_input.is_some());
            args.push(format!("-disposition:v:{cover_stream}"));
            args.push("attached_pic".to_string());
        }

        args.push(request.output.display().to_string());
        args
    }

    async fn run(&self, args: &[String]) -> MuxResult {
        debug!(program = %self.program, ?args, "Running ffmpeg");
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
impl Muxer for FfmpegMuxer {
    fn kind(&self) -> MuxerKind {
        MuxerKind::Ffmpeg
    }

    fn supports_dolby_vision(&self) -> bool {
        self.version
            .as_deref()
            .is_some_and(|v| match parse_major_version(v) {
                Some(major) => major >= DOLBY_VISION_MIN_MAJOR,
                // Nightly builds (`N-112345-g...`) are always recent.
                None => v.contains("version N-"),
            })
    }

    async fn mux(&self, request: &MuxRequest) -> MuxResult {
        let chapters_file = if request.chapters.is_empty() {
            None
        } else {
            let path = sidecar(&request.output, "ffmeta.txt");
            if let Err(e) = fs::write(&path, ffmetadata(&request.chapters)).await {
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
        let list = sidecar(output, "concat.txt");
        if let Err(e) = fs::write(&list, concat_list(parts)).await {
            return MuxResult::failed(format!("writing {}: {e}", list.display()));
        }
        let args: Vec<String> = [
            "-loglevel", "warning", "-y", "-f", "concat", "-safe", "0", "-i",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain([
            list.display().to_string(),
            "-c".to_string(),
            "copy".to_string(),
            output.display().to_string(),
        ])
        .collect();
        let result = self.run(&args).await;
        remove_quietly(&list).await;
        result
    }
}

/// `{path}.{suffix}` next to `path`.
fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Major version from `ffmpeg version 6.1.1-...` or `ffmpeg version n5.0`.
fn parse_major_version(line: &str) -> Option<u32> {
    let rest = line.split("version ").nth(1)?;
    let rest = rest.strip_prefix('n').unwrap_or(rest);
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn escape_ffmetadata(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '=' | ';' | '#' | '\\' | '\n') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// FFMETADATA document holding `chapters`, in milliseconds.
fn ffmetadata(chapters: &[ChapterMarker]) -> String {
    let mut out = String::from(";FFMETADATA1\n");
    for chapter in chapters {
        out.push_str("[CHAPTER]\nTIMEBASE=1/1000\n");
        out.push_str(&format!("START={}\n", chapter.start * 1000));
        out.push_str(&format!("END={}\n", chapter.end * 1000));
        out.push_str(&format!("title={}\n", escape_ffmetadata(&chapter.title)));
    }
    out
}

fn concat_list(parts: &[PathBuf]) -> String {
    parts
        .iter()
        .map(|p| {
            let absolute = std::path::absolute(p).unwrap_or_else(|_| p.clone());
            format!("file '{}'\n", absolute.display().to_string().replace('\'', r"'\''"))
        })
        .collect()
}
