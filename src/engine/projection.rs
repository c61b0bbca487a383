//! Filtered views and counters over the flattened item sequence.
//!
//! Everything here is a pure function of `(items, filter)`. Counts are taken
//! over the unfiltered corpus so tab and chip counters stay stable while the
//! displayed list narrows.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::feed::{Embed, FeedItem};

/// Media classification of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Text,
    Images,
    Videos,
}

impl ContentKind {
    /// Video beats images beats text; an item is exactly one kind.
    pub fn of(item: &FeedItem) -> Self {
        match item.embed {
            Some(Embed::Video { .. }) => ContentKind::Videos,
            Some(Embed::Images(_)) => ContentKind::Images,
            _ => ContentKind::Text,
        }
    }
}

impl FeedItem {
    pub fn content_kind(&self) -> ContentKind {
        ContentKind::of(self)
    }
}

/// Content-kind selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KindFilter {
    #[default]
    All,
    Text,
    Images,
    Videos,
}

impl KindFilter {
    pub fn matches(self, kind: ContentKind) -> bool {
        match self {
            KindFilter::All => true,
            KindFilter::Text => kind == ContentKind::Text,
            KindFilter::Images => kind == ContentKind::Images,
            KindFilter::Videos => kind == ContentKind::Videos,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KindFilter::All => "all",
            KindFilter::Text => "text",
            KindFilter::Images => "images",
            KindFilter::Videos => "videos",
        }
    }
}

impl fmt::Display for KindFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KindFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(KindFilter::All),
            "text" => Ok(KindFilter::Text),
            "images" | "image" => Ok(KindFilter::Images),
            "videos" | "video" => Ok(KindFilter::Videos),
            other => Err(format!(
                "unknown content kind '{other}' (expected all, text, images or videos)"
            )),
        }
    }
}

/// Consumer-owned filter selection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterState {
    pub kind: KindFilter,
    /// Selected tags, OR-combined. Empty means no tag filtering.
    pub tags: BTreeSet<char>,
}

impl FilterState {
    pub fn new(kind: KindFilter, tags: impl IntoIterator<Item = char>) -> Self {
        Self {
            kind,
            tags: tags.into_iter().collect(),
        }
    }

    pub fn with_kind(kind: KindFilter) -> Self {
        Self {
            kind,
            tags: BTreeSet::new(),
        }
    }

    pub fn matches(&self, item: &FeedItem) -> bool {
        if !self.kind.matches(item.content_kind()) {
            return false;
        }
        if self.tags.is_empty() {
            return true;
        }
        item.tag().is_some_and(|tag| self.tags.contains(&tag))
    }
}

/// Per-kind totals over the whole corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KindCounts {
    pub all: usize,
    pub text: usize,
    pub images: usize,
    pub videos: usize,
}

impl KindCounts {
    pub fn get(&self, filter: KindFilter) -> usize {
        match filter {
            KindFilter::All => self.all,
            KindFilter::Text => self.text,
            KindFilter::Images => self.images,
            KindFilter::Videos => self.videos,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagCount {
    pub tag: char,
    pub count: usize,
}

/// Output of [`project`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Projection {
    /// Items passing the filter, in fetch order.
    pub items: Vec<Arc<FeedItem>>,
    pub kind_counts: KindCounts,
    /// Descending by count, ties in first-seen order.
    pub tag_counts: Vec<TagCount>,
}

pub fn kind_counts(items: &[Arc<FeedItem>]) -> KindCounts {
    items.iter().fold(
        KindCounts {
            all: items.len(),
            ..KindCounts::default()
        },
        |mut counts, item| {
            match item.content_kind() {
                ContentKind::Text => counts.text += 1,
                ContentKind::Images => counts.images += 1,
                ContentKind::Videos => counts.videos += 1,
            }
            counts
        },
    )
}

pub fn tag_counts(items: &[Arc<FeedItem>]) -> Vec<TagCount> {
    let mut index: HashMap<char, usize> = HashMap::new();
    let mut counts: Vec<TagCount> = Vec::new();

    for tag in items.iter().filter_map(|item| item.tag()) {
        match index.get(&tag) {
            Some(&i) => counts[i].count += 1,
            None => {
                index.insert(tag, counts.len());
                counts.push(TagCount { tag, count: 1 });
            }
        }
    }

    // Stable sort keeps first-seen order among equal counts
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

/// Applies `filter` to `items` and computes corpus-wide counters.
pub fn project(items: &[Arc<FeedItem>], filter: &FilterState) -> Projection {
    Projection {
        items: items
            .iter()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect(),
        kind_counts: kind_counts(items),
        tag_counts: tag_counts(items),
    }
}
