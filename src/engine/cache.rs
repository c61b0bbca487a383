use std::collections::HashSet;
use std::sync::Arc;

use crate::feed::{FeedItem, Page};

/// Append-only log of fetched pages.
///
/// Pages keep their fetch order forever; the only way to remove one is
/// [`PageCache::reset`]. Items are deduplicated by URI across all pages.
#[derive(Debug, Default)]
pub struct PageCache {
    pages: Vec<Page>,
    seen: HashSet<String>,
    cursor: Option<String>,
    /// Bumped on every reset; in-flight results from an older generation are stale.
    generation: u64,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn item_count(&self) -> usize {
        self.seen.len()
    }

    /// Newest item of the first page, if any.
    pub fn newest(&self) -> Option<&Arc<FeedItem>> {
        self.pages.first().and_then(|p| p.items.first())
    }

    /// Appends a page, dropping items whose URI is already cached, and
    /// replaces the cursor with the page's cursor.
    ///
    /// Returns the number of items actually added.
    pub fn append(&mut self, page: Page) -> usize {
        let Page { items, cursor } = page;
        let before = items.len();

        let fresh: Vec<Arc<FeedItem>> = items
            .into_iter()
            .filter(|item| self.seen.insert(item.uri.clone()))
            .collect();

        let added = fresh.len();
        if added < before {
            tracing::debug!(
                duplicates = before - added,
                generation = self.generation,
                "Dropped duplicate items while appending page"
            );
        }

        self.pages.push(Page {
            items: fresh,
            cursor: cursor.clone(),
        });
        self.cursor = cursor;
        added
    }

    /// Drops every page and the cursor and starts a new generation.
    pub fn reset(&mut self) -> u64 {
        self.pages.clear();
        self.seen.clear();
        self.cursor = None;
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    /// Flattened item sequence in fetch order.
    pub fn items(&self) -> impl Iterator<Item = &Arc<FeedItem>> + '_ {
        self.pages.iter().flat_map(|p| p.items.iter())
    }

    /// Owned snapshot of the flattened sequence (cheap `Arc` clones).
    pub fn snapshot(&self) -> Vec<Arc<FeedItem>> {
        self.items().cloned().collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use crate::feed::{Author, Embed};

    pub(crate) fn item(uri: &str, text: &str, embed: Option<Embed>) -> Arc<FeedItem> {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        Arc::new(FeedItem {
            uri: uri.to_string(),
            cid: format!("cid-{uri}"),
            author: Author {
                did: "did:plc:test".to_string(),
                handle: "test.bsky.social".to_string(),
                display_name: "Test".to_string(),
                avatar: None,
            },
            text: text.to_string(),
            created_at: at,
            indexed_at: at,
            like_count: 0,
            repost_count: 0,
            reply_count: 0,
            embed,
        })
    }

    fn page(uris: &[&str], cursor: Option<&str>) -> Page {
        Page {
            items: uris.iter().map(|u| item(u, "", None)).collect(),
            cursor: cursor.map(str::to_string),
        }
    }

    fn uris(cache: &PageCache) -> Vec<String> {
        cache.items().map(|i| i.uri.clone()).collect()
    }

    #[test]
    fn test_flattened_order_is_fetch_order() {
        let mut cache = PageCache::new();
        cache.append(page(&["a", "b"], Some("c1")));
        cache.append(page(&["c", "d"], Some("c2")));
        cache.append(page(&["e"], None));

        assert_eq!(uris(&cache), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(cache.page_count(), 3);
        assert_eq!(cache.item_count(), 5);
    }

    #[test]
    fn test_duplicate_items_are_dropped() {
        let mut cache = PageCache::new();
        assert_eq!(cache.append(page(&["a", "b"], Some("c1"))), 2);
        assert_eq!(cache.append(page(&["b", "c"], Some("c2"))), 1);

        assert_eq!(uris(&cache), vec!["a", "b", "c"]);
        assert_eq!(cache.cursor(), Some("c2"));
    }

    #[test]
    fn test_cursor_cleared_on_last_page() {
        let mut cache = PageCache::new();
        cache.append(page(&["a"], Some("c1")));
        assert_eq!(cache.cursor(), Some("c1"));
        cache.append(page(&["b"], None));
        assert_eq!(cache.cursor(), None);
    }

    #[test]
    fn test_reset_bumps_generation_and_clears() {
        let mut cache = PageCache::new();
        cache.append(page(&["a"], Some("c1")));
        let generation = cache.reset();

        assert_eq!(generation, 1);
        assert!(cache.is_empty());
        assert_eq!(cache.item_count(), 0);
        assert_eq!(cache.cursor(), None);

        // Previously seen keys are accepted again after a reset
        assert_eq!(cache.append(page(&["a"], None)), 1);
    }

    #[test]
    fn test_newest_is_first_item_of_first_page() {
        let mut cache = PageCache::new();
        assert!(cache.newest().is_none());
        cache.append(page(&["a", "b"], Some("c1")));
        cache.append(page(&["c"], None));
        assert_eq!(cache.newest().map(|i| i.uri.as_str()), Some("a"));
    }
}
