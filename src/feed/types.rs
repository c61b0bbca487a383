use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

use crate::engine::tags::{extract_tag, strip_tag};

// ============================================================================
// Domain Types
// ============================================================================

/// Identity and aggregate counters for the feed's account.
///
/// Replaced wholesale on every refresh; never patched field by field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub did: String,
    pub handle: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub banner: Option<String>,
    #[serde(default)]
    pub followers_count: u64,
    #[serde(default)]
    pub follows_count: u64,
    #[serde(default)]
    pub posts_count: u64,
}

/// Author summary attached to every post.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub did: String,
    pub handle: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub thumb: String,
    pub fullsize: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub aspect_ratio: Option<AspectRatio>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExternalLink {
    pub uri: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumb: Option<String>,
}

/// Resolved media attached to a post, discriminated by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Embed {
    Images(Vec<Image>),
    Video {
        playlist: String,
        thumbnail: Option<String>,
        aspect_ratio: Option<AspectRatio>,
    },
    External(ExternalLink),
}

/// A single post. `uri` is the cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub uri: String,
    pub cid: String,
    pub author: Author,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,
    pub like_count: u64,
    pub repost_count: u64,
    pub reply_count: u64,
    pub embed: Option<Embed>,
}

impl FeedItem {
    /// Single-character category parsed from the leading bracketed prefix.
    pub fn tag(&self) -> Option<char> {
        extract_tag(&self.text)
    }

    /// Body text with the tag prefix removed, for display.
    pub fn display_text(&self) -> &str {
        strip_tag(&self.text)
    }

    /// Public web link: `https://bsky.app/profile/{handle}/post/{rkey}`.
    pub fn web_url(&self) -> String {
        let rkey = self.uri.rsplit('/').next().unwrap_or_default();
        format!(
            "https://bsky.app/profile/{}/post/{}",
            self.author.handle, rkey
        )
    }
}

/// One batch of posts plus the cursor for the batch after it.
///
/// `cursor` is `None` on the last page.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Arc<FeedItem>>,
    pub cursor: Option<String>,
}

// ============================================================================
// Wire Types (app.bsky.feed.getAuthorFeed)
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct AuthorFeedResponse {
    #[serde(default)]
    pub feed: Vec<FeedViewPost>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FeedViewPost {
    pub post: PostView,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PostView {
    pub uri: String,
    pub cid: String,
    pub author: Author,
    pub record: PostRecord,
    #[serde(default)]
    pub embed: Option<EmbedView>,
    #[serde(default)]
    pub reply_count: u64,
    #[serde(default)]
    pub repost_count: u64,
    #[serde(default)]
    pub like_count: u64,
    pub indexed_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PostRecord {
    #[serde(default)]
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Embed views keyed by `$type`. Unrecognized types (quoted records etc.)
/// collapse into `Other` and carry no media.
#[derive(Debug, Deserialize)]
#[serde(tag = "$type")]
pub(crate) enum EmbedView {
    #[serde(rename = "app.bsky.embed.images#view")]
    Images { images: Vec<Image> },
    #[serde(rename = "app.bsky.embed.video#view", rename_all = "camelCase")]
    Video {
        playlist: String,
        #[serde(default)]
        thumbnail: Option<String>,
        #[serde(default)]
        aspect_ratio: Option<AspectRatio>,
    },
    #[serde(rename = "app.bsky.embed.external#view")]
    External { external: ExternalLink },
    #[serde(other)]
    Other,
}

impl EmbedView {
    fn into_embed(self) -> Option<Embed> {
        match self {
            EmbedView::Images { images } => Some(Embed::Images(images)),
            EmbedView::Video {
                playlist,
                thumbnail,
                aspect_ratio,
            } => Some(Embed::Video {
                playlist,
                thumbnail,
                aspect_ratio,
            }),
            EmbedView::External { external } => Some(Embed::External(external)),
            EmbedView::Other => None,
        }
    }
}

impl From<PostView> for FeedItem {
    fn from(post: PostView) -> Self {
        Self {
            uri: post.uri,
            cid: post.cid,
            author: post.author,
            text: post.record.text,
            created_at: post.record.created_at,
            indexed_at: post.indexed_at,
            like_count: post.like_count,
            repost_count: post.repost_count,
            reply_count: post.reply_count,
            embed: post.embed.and_then(EmbedView::into_embed),
        }
    }
}

impl From<AuthorFeedResponse> for Page {
    fn from(response: AuthorFeedResponse) -> Self {
        Self {
            items: response
                .feed
                .into_iter()
                .map(|entry| Arc::new(FeedItem::from(entry.post)))
                .collect(),
            cursor: response.cursor.filter(|c| !c.is_empty()),
        }
    }
}
