//! Per-page pipeline: `Parsing → Fetching → Selecting → Downloading → Muxing →
//! Cleanup → Done`, with `Failed` reachable from every state.
//!
//! `Fetching` through `Muxing` run inside the bounded retry envelope. Only
//! transport errors are retried; every other failure ends the page at once
//! and lets the run continue, while an exhausted envelope aborts the run.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::download::{DownloadEngine, is_nonempty_file};
use crate::error::{PageError, TransportError};
use crate::format::{DefaultPathFormatter, FormatContext, PathFormatter};
use crate::layout::{PageLayout, fragment_path};
use crate::media::quality::{is_dolby_vision, quality_name};
use crate::media::{
    ChapterMarker, ItemInfo, ItemKind, Page, ParsedResult, Representation, Subtitle, Track,
    TrackSource, format_duration,
};
use crate::mux::{
    AudioInput, CleanupPlan, MuxMetadata, MuxOrchestrator, MuxRequest, SubtitleInput,
    remove_dir_if_empty, remove_quietly,
};
use crate::retry::retry_fixed;
use crate::selector::{TrackSelector, clamp_index};
use crate::source::{
    DanmakuConverter, ExtractRequest, Extractor, NoPrompt, NoSubtitles, SubtitleSource,
    TrackPrompt,
};

/// Payloads shorter than this are echoed in full when extraction fails.
const SHORT_PAYLOAD_LEN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Parsing,
    Fetching,
    Selecting,
    Downloading,
    Muxing,
    Cleanup,
    Done,
    Failed,
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parsing => "parsing",
            Self::Fetching => "fetching",
            Self::Selecting => "selecting",
            Self::Downloading => "downloading",
            Self::Muxing => "muxing",
            Self::Cleanup => "cleanup",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Ways a page can finish successfully without producing a muxed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EarlyExit {
    InfoOnly,
    CoverOnly,
    SubtitleOnly,
    DanmakuOnly,
    AlreadyExists(PathBuf),
    MuxSkipped,
}

#[derive(Debug)]
pub enum PageOutcome {
    Done { output: PathBuf },
    Finished(EarlyExit),
    /// Non-fatal failure; the run moves on to the next page.
    Failed { state: PageState, error: PageError },
}

impl PageOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    fn failed(state: PageState, error: PageError) -> Self {
        error!(%state, error = %error, "Page failed");
        Self::Failed { state, error }
    }
}

/// Item-level facts every page needs.
#[derive(Debug, Clone, Copy)]
pub struct ItemContext<'a> {
    pub item: &'a ItemInfo,
    /// Output pattern chosen for the item (single or multi-page).
    pub pattern: &'a str,
    /// Pages of the item before filtering.
    pub page_count: usize,
    pub multi_page: bool,
    /// 0-based position among the selected pages.
    pub position: usize,
    pub selected: usize,
    /// Last selected page sharing this working directory; owns cover cleanup.
    pub is_last_page: bool,
}

/// Track indices the user picked; asked once per page and reused on retries.
#[derive(Debug, Clone, Copy, Default)]
struct ManualChoice {
    video: usize,
    audio: usize,
    /// Index into `dfns` for the fragment representation.
    dfn: Option<usize>,
}

/// Runs pages against the configured collaborators.
pub struct PageRunner {
    config: Arc<PipelineConfig>,
    selector: TrackSelector,
    downloads: DownloadEngine,
    mux: MuxOrchestrator,
    extractor: Arc<dyn Extractor>,
    subtitles: Arc<dyn SubtitleSource>,
    danmaku: Option<Arc<dyn DanmakuConverter>>,
    prompt: Arc<dyn TrackPrompt>,
    formatter: Arc<dyn PathFormatter>,
}

impl PageRunner {
    pub fn new(
        config: Arc<PipelineConfig>,
        downloads: DownloadEngine,
        mux: MuxOrchestrator,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        Self {
            selector: TrackSelector::new(config.selection.clone()),
            config,
            downloads,
            mux,
            extractor,
            subtitles: Arc::new(NoSubtitles),
            danmaku: None,
            prompt: Arc::new(NoPrompt),
            formatter: Arc::new(DefaultPathFormatter),
        }
    }

    pub fn with_subtitles(mut self, subtitles: Arc<dyn SubtitleSource>) -> Self {
        self.subtitles = subtitles;
        self
    }

    pub fn with_danmaku(mut self, converter: Arc<dyn DanmakuConverter>) -> Self {
        self.danmaku = Some(converter);
        self
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn TrackPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn PathFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one page to completion.
    ///
    /// Returns `Err` only for [`PageError::Fatal`]; every other failure is
    /// reported as [`PageOutcome::Failed`].
    pub async fn run(&self, ctx: &ItemContext<'_>, page: &Page) -> Result<PageOutcome, PageError> {
        debug!(page = page.index, state = %PageState::Parsing, "Entering state");
        info!(
            "Parsing P{}... ({} of {})",
            page.index,
            ctx.position + 1,
            ctx.selected
        );
        let layout = PageLayout::new(&self.config.work_dir, page);
        let choice: Mutex<Option<ManualChoice>> = Mutex::new(None);

        let result = retry_fixed(&self.config.retry, |attempt| {
            let layout = &layout;
            let choice = &choice;
            async move {
                if attempt > 0 {
                    info!(page = page.index, attempt = attempt + 1, "Retrying page");
                }
                self.attempt(ctx, page, layout, choice).await
            }
        })
        .await;

        match result {
            Ok(outcome) => {
                if let PageOutcome::Done { output } = &outcome {
                    info!(page = page.index, output = %output.display(), "Page done");
                }
                Ok(outcome)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => Ok(PageOutcome::failed(PageState::Fetching, e)),
        }
    }

    async fn attempt(
        &self,
        ctx: &ItemContext<'_>,
        page: &Page,
        layout: &PageLayout,
        choice: &Mutex<Option<ManualChoice>>,
    ) -> Result<PageOutcome, PageError> {
        enter(page, PageState::Fetching);
        let items = &self.config.download_items;

        let mut chapters = match self.extractor.chapters(page).await {
            Ok(points) if !points.is_empty() => points,
            Ok(_) => page.chapters.clone(),
            Err(e) => {
                warn!(page = page.index, error = %e, "Failed to fetch chapters");
                page.chapters.clone()
            }
        };

        let mut subtitles = Vec::new();
        let mut cover = None;
        if !self.config.only_show_info {
            create_dir(layout.dir()).await?;

            if items.contains(ItemKind::Cover) {
                match self.fetch_cover(ctx, page, layout).await? {
                    CoverStep::Ready(path) => cover = path,
                    CoverStep::Exit(outcome) => return Ok(outcome),
                }
            }

            if items.contains(ItemKind::Subtitle) {
                match self.fetch_subtitles(ctx, page, layout).await? {
                    SubtitleStep::Ready(list) => subtitles = list,
                    SubtitleStep::Exit(outcome) => return Ok(outcome),
                }
            }
        }

        let request = ExtractRequest {
            item_id: &ctx.item.id,
            page,
            preferred_codec: self.preferred_codec(),
            dfn: None,
        };
        let parsed = self.extractor.extract(&request).await?;
        if chapters.is_empty() {
            chapters = parsed.extra_points.clone();
        }
        self.dump_payload(&parsed).await;

        let Some(representation) = parsed.representation() else {
            error!(page = page.index, "Extraction returned nothing downloadable (use --debug for details)");
            if parsed.raw_payload.chars().count() < SHORT_PAYLOAD_LEN {
                error!("{}", parsed.raw_payload);
            }
            debug!(payload = %parsed.raw_payload, "Extraction payload");
            return Ok(PageOutcome::failed(
                PageState::Fetching,
                PageError::ParseFailure {
                    payload: parsed.raw_payload,
                },
            ));
        };

        let assets = PageAssets {
            cover,
            subtitles,
            chapters,
        };
        match representation {
            Representation::Dash => {
                self.run_dash(ctx, page, layout, choice, parsed, assets)
                    .await
            }
            Representation::Fragmented => {
                self.run_fragmented(ctx, page, layout, choice, parsed, assets)
                    .await
            }
        }
    }

    async fn run_dash(
        &self,
        ctx: &ItemContext<'_>,
        page: &Page,
        layout: &PageLayout,
        choice: &Mutex<Option<ManualChoice>>,
        parsed: ParsedResult,
        assets: PageAssets,
    ) -> Result<PageOutcome, PageError> {
        enter(page, PageState::Selecting);
        let items = &self.config.download_items;
        let forced = &self.config.force_items;

        let mut video = self.selector.sort_video(&without_empty_sources(parsed.video_tracks));
        let mut audio = without_empty_sources(parsed.audio_tracks);
        let mut background = without_empty_sources(parsed.background_audio_tracks);
        let mut roles = parsed.role_audio;
        for role in &mut roles {
            role.tracks = without_empty_sources(std::mem::take(&mut role.tracks));
        }

        if forced.contains(ItemKind::Video) && video.is_empty() {
            return Ok(PageOutcome::failed(
                PageState::Selecting,
                PageError::missing(ItemKind::Video),
            ));
        }
        if forced.contains(ItemKind::Audio) && audio.is_empty() {
            return Ok(PageOutcome::failed(
                PageState::Selecting,
                PageError::missing(ItemKind::Audio),
            ));
        }

        if !items.contains(ItemKind::Video) {
            video.clear();
        }
        if !items.contains(ItemKind::Audio) {
            audio.clear();
            background.clear();
            roles.clear();
        }
        audio = self.selector.sort_audio(&audio);
        background = self.selector.sort_audio(&background);
        for role in &mut roles {
            role.tracks = self.selector.sort_audio(&role.tracks);
        }

        if !self.config.hide_streams {
            print_tracks(&video, &audio, page.duration);
        }
        if self.config.only_show_info {
            return Ok(PageOutcome::Finished(EarlyExit::InfoOnly));
        }

        let picked = self.manual_choice(choice, &video, &audio).await;
        let selected_video = video.get(picked.video);
        let selected_audio = audio.get(picked.audio);
        let selected_background =
            background.get(clamp_index(Some(picked.audio as i64), background.len()));

        let output = self.output_path(ctx, page, selected_video, selected_audio);
        debug!(output = %output.display(), "Formatted output path");

        if items.contains(ItemKind::Danmaku)
            && let Some(outcome) = self.fetch_danmaku(page, layout, &output).await?
        {
            return Ok(outcome);
        }

        info!("Selected streams:");
        if let Some(v) = selected_video {
            info!("  {v}");
        }
        if let Some(a) = selected_audio {
            info!("  {a}");
        }

        if is_nonempty_file(&output).await {
            return Ok(self.already_exists(ctx, layout, output).await);
        }

        enter(page, PageState::Downloading);
        let mut request = MuxRequest {
            output,
            ..Default::default()
        };
        if let Some(v) = selected_video {
            info!("Downloading P{} video...", page.index);
            let path = layout.video();
            if let Err(e) = self.fetch_track(&v.source, &path).await {
                return join_failed(e);
            }
            request.video = Some(path);
        }
        if let Some(a) = selected_audio {
            info!("Downloading P{} audio...", page.index);
            let path = layout.audio();
            if let Err(e) = self.fetch_track(&a.source, &path).await {
                return join_failed(e);
            }
            request.audio = Some(path);
        }
        if let Some(bg) = selected_background {
            info!("Downloading P{} background audio...", page.index);
            let path = layout.background_audio();
            if let Err(e) = self.fetch_track(&bg.source, &path).await {
                return join_failed(e);
            }
            request.extra_audio.push(AudioInput {
                title: "Background".to_string(),
                language: None,
                path,
            });
        }
        for (slot, role) in roles.iter().enumerate() {
            let Some(track) = role
                .tracks
                .get(clamp_index(Some(picked.audio as i64), role.tracks.len()))
            else {
                continue;
            };
            info!("Downloading P{} dub [{}]...", page.index, role.title);
            let path = role.path.clone().unwrap_or_else(|| layout.role_audio(slot));
            if let Err(e) = self.fetch_track(&track.source, &path).await {
                return join_failed(e);
            }
            request.extra_audio.push(AudioInput {
                title: role.title.clone(),
                language: role.language.clone(),
                path,
            });
        }
        info!("P{} downloaded", page.index);

        if self.config.skip_mux {
            return Ok(PageOutcome::Finished(EarlyExit::MuxSkipped));
        }

        let dolby = selected_video.is_some_and(|v| is_dolby_vision(&v.dfn));
        self.finish_mux(ctx, page, layout, request, assets, dolby).await
    }

    async fn run_fragmented(
        &self,
        ctx: &ItemContext<'_>,
        page: &Page,
        layout: &PageLayout,
        choice: &Mutex<Option<ManualChoice>>,
        mut parsed: ParsedResult,
        mut assets: PageAssets,
    ) -> Result<PageOutcome, PageError> {
        enter(page, PageState::Selecting);

        if self.selector.is_interactive() {
            let stored = (*choice.lock()).and_then(|c| c.dfn);
            let index = match stored {
                Some(index) => index,
                None => {
                    for (i, dfn) in parsed.dfns.iter().enumerate() {
                        info!("{i}. {}", quality_name(dfn));
                    }
                    let requested = self.prompt.choose("quality", parsed.dfns.len()).await;
                    let index = clamp_index(requested, parsed.dfns.len());
                    *choice.lock() = Some(ManualChoice {
                        dfn: Some(index),
                        ..Default::default()
                    });
                    index
                }
            };
            let dfn = parsed.dfns.get(index).cloned().unwrap_or_default();
            info!(dfn = %quality_name(&dfn), "Re-extracting with selected quality");
            let request = ExtractRequest {
                item_id: &ctx.item.id,
                page,
                preferred_codec: self.preferred_codec(),
                dfn: Some(&dfn),
            };
            parsed = self.extractor.extract(&request).await?;
            if assets.chapters.is_empty() {
                assets.chapters = parsed.extra_points.clone();
            }
        }

        let video = self.selector.sort_video(&parsed.video_tracks);
        let clips = parsed.clips;
        info!("{} stream(s), {} clip(s)", video.len(), clips.len());
        if !self.config.hide_streams {
            for (i, v) in video.iter().enumerate() {
                info!("{i}. {v}");
            }
        }
        if self.config.only_show_info {
            for clip in &clips {
                info!("{clip}");
            }
            return Ok(PageOutcome::Finished(EarlyExit::InfoOnly));
        }
        if clips.is_empty() {
            return Ok(PageOutcome::failed(
                PageState::Selecting,
                PageError::ParseFailure {
                    payload: parsed.raw_payload,
                },
            ));
        }

        let selected_video = video.first();
        let output = self.output_path(ctx, page, selected_video, None);
        if is_nonempty_file(&output).await {
            return Ok(self.already_exists(ctx, layout, output).await);
        }

        enter(page, PageState::Downloading);
        info!("Downloading P{} video in {} fragments...", page.index, clips.len());
        let joined = layout.video();
        if let Err(e) = self.fetch_joined(&clips, &joined).await {
            return join_failed(e);
        }
        info!("P{} downloaded", page.index);

        if self.config.skip_mux {
            return Ok(PageOutcome::Finished(EarlyExit::MuxSkipped));
        }

        let request = MuxRequest {
            output,
            video: Some(joined),
            ..Default::default()
        };
        let dolby = selected_video.is_some_and(|v| is_dolby_vision(&v.dfn));
        self.finish_mux(ctx, page, layout, request, assets, dolby).await
    }

    /// Download one track into `dest`, joining fragment sources in order.
    async fn fetch_track(&self, source: &TrackSource, dest: &Path) -> Result<(), PageError> {
        match source {
            TrackSource::Url(url) => {
                self.downloads.download(url, dest).await?;
            }
            TrackSource::Fragments(urls) => self.fetch_joined(urls, dest).await?,
        }
        Ok(())
    }

    /// Download `urls` next to `dest` and concatenate them into it.
    ///
    /// A non-empty `dest` left by an earlier run is reused as is, so a page
    /// that failed while muxing does not fetch its fragments again.
    async fn fetch_joined(&self, urls: &[String], dest: &Path) -> Result<(), PageError> {
        if is_nonempty_file(dest).await {
            debug!(path = %dest.display(), "Joined stream exists, skipping fragments");
            return Ok(());
        }
        let fragments: Vec<(String, PathBuf)> = urls
            .iter()
            .enumerate()
            .map(|(i, url)| (url.clone(), fragment_path(dest, i, urls.len())))
            .collect();
        let parts = self.downloads.download_fragments(&fragments).await?;
        self.mux.concat_fragments(&parts, dest).await?;
        Ok(())
    }

    async fn finish_mux(
        &self,
        ctx: &ItemContext<'_>,
        page: &Page,
        layout: &PageLayout,
        mut request: MuxRequest,
        assets: PageAssets,
        dolby: bool,
    ) -> Result<PageOutcome, PageError> {
        enter(page, PageState::Muxing);
        let item = ctx.item;
        request.cover = assets.cover;
        request.subtitles = assets.subtitles;
        request.chapters = assets.chapters;
        request.metadata = MuxMetadata {
            title: if ctx.multi_page {
                page.title.clone()
            } else {
                item.title.clone()
            },
            author: page.owner_name.clone(),
            description: if page.description.is_empty() {
                item.description.clone()
            } else {
                page.description.clone()
            },
            pub_time: DateTime::from_timestamp(item.pub_time, 0),
            language: self.config.language.clone(),
            episode_id: ctx.multi_page.then(|| page.title.clone()),
        };

        let cleanup = CleanupPlan {
            cover: ctx.is_last_page.then(|| layout.cover()),
            work_dir: Some(layout.dir().to_path_buf()),
        };
        info!(
            "Muxing{}...",
            if request.subtitles.is_empty() { "" } else { " with subtitles" }
        );
        match self.mux.mux(&request, dolby, &cleanup).await {
            Ok(output) => {
                enter(page, PageState::Cleanup);
                enter(page, PageState::Done);
                Ok(PageOutcome::Done { output })
            }
            Err(e) => Ok(PageOutcome::failed(PageState::Muxing, e)),
        }
    }

    async fn fetch_cover(
        &self,
        ctx: &ItemContext<'_>,
        page: &Page,
        layout: &PageLayout,
    ) -> Result<CoverStep, PageError> {
        let url = ctx
            .item
            .cover_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or(page.cover_url.as_deref().filter(|u| !u.is_empty()));
        let Some(url) = url else {
            if self.config.force_items.contains(ItemKind::Cover) {
                remove_dir_if_empty(layout.dir()).await;
                return Ok(CoverStep::Exit(PageOutcome::failed(
                    PageState::Selecting,
                    PageError::missing(ItemKind::Cover),
                )));
            }
            return Ok(CoverStep::Ready(None));
        };

        let path = layout.cover();
        self.downloads.download_file(url, &path).await?;

        if self.config.download_items.is_only(ItemKind::Cover) {
            let target = self
                .output_path(ctx, page, None, None)
                .with_extension(url_extension(url).unwrap_or_else(|| "jpg".to_string()));
            move_file(&path, &target).await?;
            info!(path = %target.display(), "Cover saved");
            remove_dir_if_empty(layout.dir()).await;
            return Ok(CoverStep::Exit(PageOutcome::Finished(EarlyExit::CoverOnly)));
        }
        Ok(CoverStep::Ready(Some(path)))
    }

    async fn fetch_subtitles(
        &self,
        ctx: &ItemContext<'_>,
        page: &Page,
        layout: &PageLayout,
    ) -> Result<SubtitleStep, PageError> {
        info!("Fetching subtitles...");
        let mut list = self.subtitles.list(&ctx.item.id, page).await?;
        if self.config.skip_ai_subtitles && !list.is_empty() {
            info!("Skipping AI generated subtitles");
            list.retain(|s| !s.is_ai_generated());
        }
        if list.is_empty() && self.config.force_items.contains(ItemKind::Subtitle) {
            remove_dir_if_empty(layout.dir()).await;
            return Ok(SubtitleStep::Exit(PageOutcome::failed(
                PageState::Selecting,
                PageError::missing(ItemKind::Subtitle),
            )));
        }

        let only = self.config.download_items.is_only(ItemKind::Subtitle);
        let mut cached = Vec::with_capacity(list.len());
        for subtitle in &list {
            info!(lang = %subtitle.lang, "Downloading subtitle");
            debug!(url = %subtitle.url, "Subtitle source");
            let path = layout.subtitle_cache(subtitle);
            self.subtitles.save(subtitle, &path).await?;
            if only && is_nonempty_file(&path).await {
                let target = self.subtitle_path(ctx, page, subtitle);
                move_file(&path, &target).await?;
                info!(path = %target.display(), "Subtitle saved");
            } else {
                cached.push(SubtitleInput {
                    lang: subtitle.lang.clone(),
                    path,
                });
            }
        }

        if only {
            remove_dir_if_empty(layout.dir()).await;
            return Ok(SubtitleStep::Exit(PageOutcome::Finished(
                EarlyExit::SubtitleOnly,
            )));
        }
        Ok(SubtitleStep::Ready(cached))
    }

    /// Download the danmaku XML next to the output and convert it.
    ///
    /// Returns an outcome when the page ends here.
    async fn fetch_danmaku(
        &self,
        page: &Page,
        layout: &PageLayout,
        output: &Path,
    ) -> Result<Option<PageOutcome>, PageError> {
        let xml = output.with_extension("xml");
        let ass = output.with_extension("ass");
        info!("Downloading danmaku XML");
        self.downloads
            .download_file(&self.config.danmaku_url(&page.cid), &xml)
            .await?;

        if let Some(converter) = &self.danmaku {
            info!("Converting danmaku to ASS...");
            if let Err(e) = converter.convert(&xml, &ass, page).await {
                warn!(error = %e, "Danmaku conversion failed, removing XML");
                remove_quietly(&xml).await;
                if self.config.force_items.contains(ItemKind::Danmaku) {
                    return Ok(Some(PageOutcome::failed(
                        PageState::Selecting,
                        PageError::missing(ItemKind::Danmaku),
                    )));
                }
            }
        }

        if self.config.download_items.is_only(ItemKind::Danmaku) {
            remove_dir_if_empty(layout.dir()).await;
            return Ok(Some(PageOutcome::Finished(EarlyExit::DanmakuOnly)));
        }
        Ok(None)
    }

    async fn manual_choice(
        &self,
        choice: &Mutex<Option<ManualChoice>>,
        video: &[Track],
        audio: &[Track],
    ) -> ManualChoice {
        if !self.selector.is_interactive() {
            return ManualChoice::default();
        }
        let stored = *choice.lock();
        if let Some(stored) = stored {
            return stored;
        }
        let mut picked = ManualChoice::default();
        if !video.is_empty() {
            picked.video = clamp_index(self.prompt.choose("video", video.len()).await, video.len());
        }
        if !audio.is_empty() {
            picked.audio = clamp_index(self.prompt.choose("audio", audio.len()).await, audio.len());
        }
        *choice.lock() = Some(picked);
        picked
    }

    async fn already_exists(
        &self,
        ctx: &ItemContext<'_>,
        layout: &PageLayout,
        output: PathBuf,
    ) -> PageOutcome {
        info!(path = %output.display(), "Output already exists, skipping download");
        if ctx.is_last_page {
            remove_quietly(&layout.cover()).await;
        }
        remove_dir_if_empty(layout.dir()).await;
        PageOutcome::Finished(EarlyExit::AlreadyExists(output))
    }

    fn output_path(
        &self,
        ctx: &ItemContext<'_>,
        page: &Page,
        video: Option<&Track>,
        audio: Option<&Track>,
    ) -> PathBuf {
        let format = FormatContext {
            item_title: &ctx.item.title,
            page,
            page_count: ctx.page_count,
            video,
            audio,
            api_type: &self.config.api_type,
            pub_time: ctx.item.pub_time,
            subtitle: None,
            audio_only: !self.config.download_items.contains(ItemKind::Video),
        };
        self.config
            .work_dir
            .join(self.formatter.format(ctx.pattern, &format))
    }

    fn subtitle_path(&self, ctx: &ItemContext<'_>, page: &Page, subtitle: &Subtitle) -> PathBuf {
        let format = FormatContext {
            item_title: &ctx.item.title,
            page,
            page_count: ctx.page_count,
            video: None,
            audio: None,
            api_type: &self.config.api_type,
            pub_time: ctx.item.pub_time,
            subtitle: Some(subtitle),
            audio_only: false,
        };
        self.config
            .work_dir
            .join(self.formatter.format(ctx.pattern, &format))
    }

    fn preferred_codec(&self) -> Option<&str> {
        self.config
            .selection
            .encoding_priority
            .first()
            .map(String::as_str)
    }

    async fn dump_payload(&self, parsed: &ParsedResult) {
        if !self.config.debug_dump {
            return;
        }
        let name = format!("debug_{}.json", Local::now().format("%Y%m%d%H%M%S%3f"));
        let path = self.config.work_dir.join(name);
        match fs::write(&path, &parsed.raw_payload).await {
            Ok(()) => debug!(path = %path.display(), "Wrote extraction payload"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to write extraction payload"),
        }
    }
}

/// Artifacts gathered during `Fetching` that end up in the mux request.
struct PageAssets {
    cover: Option<PathBuf>,
    subtitles: Vec<SubtitleInput>,
    chapters: Vec<ChapterMarker>,
}

enum CoverStep {
    Ready(Option<PathBuf>),
    Exit(PageOutcome),
}

enum SubtitleStep {
    Ready(Vec<SubtitleInput>),
    Exit(PageOutcome),
}

/// A concatenation failure ends the page in `Muxing`; anything else propagates.
fn join_failed(e: PageError) -> Result<PageOutcome, PageError> {
    match e {
        PageError::MuxFailure { .. } => Ok(PageOutcome::failed(PageState::Muxing, e)),
        other => Err(other),
    }
}

fn without_empty_sources(tracks: Vec<Track>) -> Vec<Track> {
    tracks
        .into_iter()
        .filter(|track| {
            if track.source.is_empty() {
                warn!(kind = ?track.kind, dfn = %track.dfn, "Dropping track without fragments");
                return false;
            }
            true
        })
        .collect()
}

fn enter(page: &Page, state: PageState) {
    debug!(page = page.index, %state, "Entering state");
}

fn print_tracks(video: &[Track], audio: &[Track], duration: u64) {
    if !video.is_empty() {
        info!("{} video stream(s):", video.len());
        for (i, track) in video.iter().enumerate() {
            info!("{i}. {track}");
        }
    }
    if !audio.is_empty() {
        info!("{} audio stream(s):", audio.len());
        for (i, track) in audio.iter().enumerate() {
            info!("{i}. {track}");
        }
    }
    if duration > 0 {
        debug!(duration = %format_duration(duration), "Page duration");
    }
}

async fn create_dir(dir: &Path) -> Result<(), TransportError> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| TransportError::io("creating directory", dir, e))
}

/// Move `from` to `to`, replacing `to`. Falls back to copy + delete across
/// filesystems.
async fn move_file(from: &Path, to: &Path) -> Result<(), TransportError> {
    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir(parent).await?;
    }
    if fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    fs::copy(from, to)
        .await
        .map_err(|e| TransportError::io("copying", from, e))?;
    remove_quietly(from).await;
    Ok(())
}

/// Extension of the last path segment of `url`, if it has one.
fn url_extension(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let name = parsed.path_segments()?.next_back()?;
    let (_, ext) = name.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_lowercase())
}
