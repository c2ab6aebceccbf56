//! Working directory layout.
//!
//! Every item gets `{root}/{id}/`; elementary files are named after the item
//! id, page index and content id so reruns find what an earlier run left.

use std::path::{Path, PathBuf};

use crate::media::{Page, Subtitle};

/// Paths of one page's intermediate artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLayout {
    dir: PathBuf,
    id: String,
    index: u32,
    cid: String,
}

impl PageLayout {
    pub fn new(root: &Path, page: &Page) -> Self {
        Self {
            dir: root.join(&page.aid),
            id: page.aid.clone(),
            index: page.index,
            cid: page.cid.clone(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn stem(&self) -> String {
        format!("{}.P{}.{}", self.id, self.index, self.cid)
    }

    pub fn video(&self) -> PathBuf {
        self.dir.join(format!("{}.mp4", self.stem()))
    }

    pub fn audio(&self) -> PathBuf {
        self.dir.join(format!("{}.m4a", self.stem()))
    }

    pub fn background_audio(&self) -> PathBuf {
        self.dir
            .join(format!("{}.{}.P{}.back_ground.m4a", self.id, self.cid, self.index))
    }

    pub fn role_audio(&self, slot: usize) -> PathBuf {
        self.dir
            .join(format!("{}.{}.P{}.role_{slot}.m4a", self.id, self.cid, self.index))
    }

    /// Shared by every page of the item.
    pub fn cover(&self) -> PathBuf {
        self.dir.join(format!("{}.jpg", self.id))
    }

    pub fn subtitle_cache(&self, subtitle: &Subtitle) -> PathBuf {
        self.dir.join(format!(
            "{}.{}.{}.{}",
            self.id, self.cid, subtitle.lang, subtitle.container_type
        ))
    }
}

/// Fragment `index` of `count` that is joined into `dest`.
///
/// Named `{stem}.{index}.{ext}` with the index zero padded to the width of
/// `count`, so lexical and numeric order agree.
pub fn fragment_path(dest: &Path, index: usize, count: usize) -> PathBuf {
    let width = count.to_string().len();
    let stem = dest
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match dest.extension() {
        Some(ext) => format!("{stem}.{index:0width$}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{index:0width$}"),
    };
    dest.with_file_name(name)
}
