//! Consumer-facing facade over the engine.
//!
//! [`App`] owns the consumer's [`FilterState`], forwards intents to the
//! controller and republishes a [`FeedView`] through a `watch` channel after
//! every mutation. Renderers only ever read the view.

use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::engine::{
    project, EngineConfig, FeedController, FeedEvent, FetchState, FilterState,
    KindCounts, KindFilter, SentinelObservation, TagCount, ViewportTrigger,
};
use crate::feed::{FeedItem, FeedSource, FetchError, Profile};

// ============================================================================
// Published View
// ============================================================================

/// Everything a renderer needs, as one consistent snapshot.
#[derive(Debug, Clone, Default)]
pub struct FeedView {
    /// Items passing the current filter, in fetch order.
    pub items: Vec<Arc<FeedItem>>,
    /// Per-kind totals over all cached items.
    pub kind_counts: KindCounts,
    /// Per-tag totals over all cached items, highest first.
    pub tag_counts: Vec<TagCount>,
    pub filter: FilterState,
    pub profile: Option<Arc<Profile>>,
    pub feed_state: FetchState,
    pub profile_state: FetchState,
    pub is_loading: bool,
    pub is_fetching_more: bool,
    pub has_more: bool,
    pub feed_error: Option<Arc<FetchError>>,
    pub profile_error: Option<Arc<FetchError>>,
    /// Newer posts exist upstream than the cached first page shows.
    pub upstream_changed: bool,
    pub generation: u64,
}

// ============================================================================
// Intents
// ============================================================================

/// User intents, for consumers that drive the app through a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    SetContentFilter(KindFilter),
    ToggleTag(char),
    ClearTags,
    RequestMore,
    RefreshAll,
    /// The end-of-list sentinel moved.
    Viewport(SentinelObservation),
}

/// Line syntax used by the CLI's watch mode:
/// `kind <all|text|images|videos>`, `tag <char>`, `clear`, `more`,
/// `refresh`, `near <px>`.
impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let command = parts.next().ok_or_else(|| "empty command".to_string())?;
        let arg = parts.next();

        match (command, arg) {
            ("kind", Some(kind)) => kind.parse().map(Intent::SetContentFilter),
            ("tag", Some(tag)) => {
                let mut chars = tag.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Intent::ToggleTag(c)),
                    _ => Err(format!("tag must be a single character, got '{tag}'")),
                }
            }
            ("clear", None) => Ok(Intent::ClearTags),
            ("more", None) => Ok(Intent::RequestMore),
            ("refresh", None) => Ok(Intent::RefreshAll),
            ("near", Some(px)) => px
                .parse::<f64>()
                .map(|distance_px| Intent::Viewport(SentinelObservation { distance_px }))
                .map_err(|e| format!("invalid distance '{px}': {e}")),
            _ => Err(format!("unrecognized command '{}'", s.trim())),
        }
    }
}

// ============================================================================
// App
// ============================================================================

pub struct App<S: FeedSource> {
    controller: FeedController<S>,
    filter: FilterState,
    trigger: ViewportTrigger,
    view_tx: watch::Sender<FeedView>,
}

impl<S: FeedSource> App<S> {
    pub fn new(source: Arc<S>, config: EngineConfig, event_tx: mpsc::Sender<FeedEvent>) -> Self {
        let trigger = ViewportTrigger::new(config.viewport_margin_px);
        let (view_tx, _) = watch::channel(FeedView::default());
        Self {
            controller: FeedController::new(source, config, event_tx),
            filter: FilterState::default(),
            trigger,
            view_tx,
        }
    }

    /// Start with a pre-selected filter (e.g. from command-line flags).
    pub fn with_filter(mut self, filter: FilterState) -> Self {
        self.filter = filter;
        self.publish();
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedView> {
        self.view_tx.subscribe()
    }

    /// The most recently published view.
    pub fn view(&self) -> FeedView {
        self.view_tx.borrow().clone()
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn is_settled(&self) -> bool {
        self.controller.is_settled()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    pub fn activate(&mut self) {
        self.controller.activate();
    }

    pub fn deactivate(&mut self) {
        self.controller.deactivate();
    }

    pub fn initial_load(&mut self) {
        self.controller.initial_load();
        self.publish();
    }

    // ------------------------------------------------------------------------
    // Intents
    // ------------------------------------------------------------------------

    pub fn set_content_filter(&mut self, kind: KindFilter) {
        if self.filter.kind == kind {
            return;
        }
        tracing::debug!(%kind, "Content filter changed");
        self.filter.kind = kind;
        self.publish();
    }

    /// Add `tag` to the selection, or remove it if already selected.
    pub fn toggle_tag(&mut self, tag: char) {
        if !self.filter.tags.remove(&tag) {
            self.filter.tags.insert(tag);
        }
        tracing::debug!(%tag, selected = self.filter.tags.len(), "Tag selection toggled");
        self.publish();
    }

    pub fn clear_tags(&mut self) {
        if self.filter.tags.is_empty() {
            return;
        }
        self.filter.tags.clear();
        self.publish();
    }

    /// Explicit demand for the next page. Returns `true` if a fetch started.
    pub fn request_more(&mut self) -> bool {
        let started = self.controller.load_next_page();
        if started {
            self.publish();
        }
        started
    }

    /// Reset both streams and start over. The filter selection survives.
    pub fn refresh_all(&mut self) {
        self.controller.refresh();
        self.trigger.reset();
        self.publish();
    }

    /// Feed a sentinel observation through the viewport trigger.
    pub fn observe_viewport(&mut self, observation: impl Into<SentinelObservation>) -> bool {
        let fired = self.trigger.observe(observation, &mut self.controller);
        if fired {
            self.publish();
        }
        fired
    }

    pub fn apply(&mut self, intent: Intent) {
        match intent {
            Intent::SetContentFilter(kind) => self.set_content_filter(kind),
            Intent::ToggleTag(tag) => self.toggle_tag(tag),
            Intent::ClearTags => self.clear_tags(),
            Intent::RequestMore => {
                self.request_more();
            }
            Intent::RefreshAll => self.refresh_all(),
            Intent::Viewport(observation) => {
                self.observe_viewport(observation);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Engine events
    // ------------------------------------------------------------------------

    pub fn handle_event(&mut self, event: FeedEvent) {
        if self.controller.handle_event(event) {
            self.publish();
        }
    }

    fn publish(&self) {
        let projection = project(&self.controller.items(), &self.filter);
        let ctl = &self.controller;

        self.view_tx.send_replace(FeedView {
            items: projection.items,
            kind_counts: projection.kind_counts,
            tag_counts: projection.tag_counts,
            filter: self.filter.clone(),
            profile: ctl.profile().cloned(),
            feed_state: ctl.feed_state(),
            profile_state: ctl.profile_state(),
            is_loading: ctl.is_loading(),
            is_fetching_more: ctl.is_fetching_more(),
            has_more: ctl.has_more(),
            feed_error: ctl.feed_error().cloned(),
            profile_error: ctl.profile_error().cloned(),
            upstream_changed: ctl.upstream_changed(),
            generation: ctl.generation(),
        });
    }
}
