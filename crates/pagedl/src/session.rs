//! Item level driver: resolves metadata, filters pages and runs them in order.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::error::PageError;
use crate::media::{ItemInfo, Page, format_duration};
use crate::page::{EarlyExit, ItemContext, PageOutcome, PageRunner, PageState};
use crate::source::MetadataSource;

/// Pages of an item to process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PageSelection {
    #[default]
    All,
    Last,
    /// 1-based page numbers.
    Indices(BTreeSet<u32>),
}

impl PageSelection {
    pub fn apply<'a>(&self, pages: &'a [Page]) -> Vec<&'a Page> {
        match self {
            Self::All => pages.iter().collect(),
            Self::Last => pages.last().into_iter().collect(),
            Self::Indices(indices) => pages.iter().filter(|p| indices.contains(&p.index)).collect(),
        }
    }
}

impl FromStr for PageSelection {
    type Err = String;

    /// `ALL`, `LAST`, or a list such as `1,3-5,8`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        if trimmed.eq_ignore_ascii_case("last") {
            return Ok(Self::Last);
        }

        let mut indices = BTreeSet::new();
        for part in trimmed.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let parse = |n: &str| {
                n.trim()
                    .parse::<u32>()
                    .map_err(|_| format!("invalid page number `{n}`"))
            };
            match part.split_once('-') {
                Some((start, end)) => {
                    let (start, end) = (parse(start)?, parse(end)?);
                    if start > end {
                        return Err(format!("invalid page range `{part}`"));
                    }
                    indices.extend(start..=end);
                }
                None => {
                    indices.insert(parse(part)?);
                }
            }
        }
        Ok(Self::Indices(indices))
    }
}

impl fmt::Display for PageSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("ALL"),
            Self::Last => f.write_str("LAST"),
            Self::Indices(indices) => {
                let list: Vec<String> = indices.iter().map(u32::to_string).collect();
                f.write_str(&list.join(","))
            }
        }
    }
}

/// Per-page results of one run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outputs: Vec<PathBuf>,
    pub early_exits: Vec<(u32, EarlyExit)>,
    pub failures: Vec<(u32, PageState, PageError)>,
}

impl RunReport {
    pub fn pages(&self) -> usize {
        self.outputs.len() + self.early_exits.len() + self.failures.len()
    }

    fn record(&mut self, page: u32, outcome: PageOutcome) {
        match outcome {
            PageOutcome::Done { output } => self.outputs.push(output),
            PageOutcome::Finished(exit) => self.early_exits.push((page, exit)),
            PageOutcome::Failed { state, error } => self.failures.push((page, state, error)),
        }
    }
}

/// Resolves an item and drives its pages strictly one after another.
pub struct Session {
    metadata: Arc<dyn MetadataSource>,
    runner: PageRunner,
}

impl Session {
    pub fn new(metadata: Arc<dyn MetadataSource>, runner: PageRunner) -> Self {
        Self { metadata, runner }
    }

    pub async fn run(
        &self,
        item_id: &str,
        selection: &PageSelection,
    ) -> Result<RunReport, PageError> {
        let config = self.runner.config();

        info!("Fetching item info...");
        let item = self.metadata.fetch(item_id).await.map_err(|e| PageError::Fatal {
            reason: format!("cannot resolve item {item_id}: {e}"),
            source: Some(Box::new(PageError::from(e))),
        })?;

        info!("Title: {}", item.title);
        if let Some(published) = DateTime::from_timestamp(item.pub_time, 0) {
            info!(
                "Published: {}",
                published.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S %z")
            );
        }
        print_pages(&item, config.show_all_pages);

        let pages = selection.apply(&item.pages);
        info!(
            "{} page(s) in total, selected: {}",
            item.pages.len(),
            selection
        );
        if pages.is_empty() {
            warn!("No page matches the selection");
        }

        let multi_page = item.uses_multi_page_layout();
        let pattern = if multi_page {
            &config.multi_file_pattern
        } else {
            &config.file_pattern
        };

        let mut report = RunReport::default();
        let last_aid = pages.last().map(|p| p.aid.clone());
        for (position, page) in pages.iter().enumerate() {
            if position > 0 && pages.len() > 1 && config.page_delay_secs > 0 {
                info!("Pausing {} second(s)...", config.page_delay_secs);
                tokio::time::sleep(config.page_delay()).await;
            }

            let ctx = ItemContext {
                item: &item,
                pattern,
                page_count: item.pages.len(),
                multi_page,
                position,
                selected: pages.len(),
                is_last_page: position + 1 == pages.len()
                    || last_aid.as_deref() != Some(page.aid.as_str()),
            };
            let outcome = self.runner.run(&ctx, page).await?;
            report.record(page.index, outcome);
        }

        info!(
            done = report.outputs.len(),
            skipped = report.early_exits.len(),
            failed = report.failures.len(),
            "Task finished"
        );
        Ok(report)
    }
}

/// First five pages, an ellipsis, then the last page.
fn print_pages(item: &ItemInfo, show_all: bool) {
    let total = item.pages.len();
    let mut elided = false;
    for page in &item.pages {
        let visible = show_all || page.index <= 5 || page.index as usize == total;
        if !visible {
            if !elided {
                info!("......");
                elided = true;
            }
            continue;
        }
        info!(
            "P{}: [{}] [{}] [{}]",
            page.index,
            page.cid,
            page.title,
            format_duration(page.duration)
        );
    }
}
