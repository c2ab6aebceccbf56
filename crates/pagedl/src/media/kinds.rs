use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kinds of artifact a page can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Video,
    Audio,
    Subtitle,
    Cover,
    Danmaku,
}

impl ItemKind {
    pub const ALL: [ItemKind; 5] = [
        Self::Video,
        Self::Audio,
        Self::Subtitle,
        Self::Cover,
        Self::Danmaku,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Subtitle => "subtitle",
            Self::Cover => "cover",
            Self::Danmaku => "danmaku",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "subtitle" | "sub" => Ok(Self::Subtitle),
            "cover" => Ok(Self::Cover),
            "danmaku" => Ok(Self::Danmaku),
            other => Err(format!("unknown item kind `{other}`")),
        }
    }
}

/// A set of requested item kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKinds(BTreeSet<ItemKind>);

impl ItemKinds {
    pub fn empty() -> Self {
        Self(BTreeSet::new())
    }

    pub fn contains(&self, kind: ItemKind) -> bool {
        self.0.contains(&kind)
    }

    /// True when `kind` is the only requested kind.
    pub fn is_only(&self, kind: ItemKind) -> bool {
        self.0.len() == 1 && self.contains(kind)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, kind: ItemKind) {
        self.0.insert(kind);
    }

    pub fn iter(&self) -> impl Iterator<Item = ItemKind> + '_ {
        self.0.iter().copied()
    }
}

impl Default for ItemKinds {
    /// Everything except danmaku, which has to be asked for.
    fn default() -> Self {
        [
            ItemKind::Video,
            ItemKind::Audio,
            ItemKind::Subtitle,
            ItemKind::Cover,
        ]
        .into_iter()
        .collect()
    }
}

impl FromIterator<ItemKind> for ItemKinds {
    fn from_iter<I: IntoIterator<Item = ItemKind>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl FromStr for ItemKinds {
    type Err = String;

    /// Comma separated list, e.g. `video,audio`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(ItemKind::from_str)
            .collect()
    }
}

impl fmt::Display for ItemKinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(ItemKind::as_str).collect();
        f.write_str(&names.join(","))
    }
}
