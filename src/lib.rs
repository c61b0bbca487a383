//! Progressive loading and client-side filtering of one Bluesky account's
//! public feed.
//!
//! - [`feed`] - Upstream access: the [`FeedSource`](feed::FeedSource) trait and its HTTP implementation
//! - [`engine`] - Page cache, continuation controller, projection and viewport trigger
//! - [`app`] - The consumer facade publishing [`FeedView`](app::FeedView) snapshots
//! - [`runner`] - Event loop tying engine events, intents and signals together
//! - [`config`] - TOML configuration
//! - [`report`] - Plain-text rendering for the CLI
//! - [`util`] - Terminal-safe text helpers

pub mod app;
pub mod config;
pub mod engine;
pub mod feed;
pub mod report;
pub mod runner;
pub mod util;
