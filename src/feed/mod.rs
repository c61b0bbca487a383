//! Remote feed access.
//!
//! - [`source`] - The [`FeedSource`] trait the engine pulls pages through, and [`FetchError`]
//! - [`fetcher`] - [`BlueskySource`], the HTTP implementation over the public XRPC API
//! - [`types`] - Domain types ([`Profile`], [`FeedItem`], [`Page`]) and their wire decoding

mod fetcher;
mod source;
mod types;

pub use fetcher::{build_client, BlueskySource};
pub use source::{FeedSource, FetchError};
pub use types::{AspectRatio, Author, Embed, ExternalLink, FeedItem, Image, Page, Profile};
