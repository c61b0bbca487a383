//! The feed engine: everything between the [`FeedSource`](crate::feed::FeedSource)
//! and a rendered list.
//!
//! - [`cache`] - Append-only page log with generation tracking
//! - [`controller`] - Fetch state machine, auto-continuation and revalidation
//! - [`projection`] - Pure filtering and counters over cached items
//! - [`scheduler`] - Disarmable timers feeding the event channel
//! - [`tags`] - Leading bracketed-ideograph tag extraction
//! - [`viewport`] - Proximity trigger for demand-driven paging

pub mod cache;
pub mod controller;
pub mod projection;
pub mod scheduler;
pub mod tags;
pub mod viewport;

pub use cache::PageCache;
pub use controller::{EngineConfig, FeedController, FeedEvent, FetchState, PageRequest, Stream};
pub use projection::{
    kind_counts, project, tag_counts, ContentKind, FilterState, KindCounts, KindFilter,
    Projection, TagCount,
};
pub use tags::{extract_tag, strip_tag};
pub use viewport::{DemandSink, ScrollPosition, SentinelObservation, ViewportTrigger};
