//! Page cache ownership, continuation and refresh policy.
//!
//! Network calls run in spawned tasks that report back as [`FeedEvent`]s.
//! All state changes happen in [`FeedController::handle_event`] and the
//! request methods, which the owning loop calls one at a time. Each stream
//! (profile, feed) has at most one request in flight. Results issued under an
//! older generation are dropped on arrival.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::cache::PageCache;
use super::scheduler::Timer;
use super::viewport::DemandSink;
use crate::feed::{FeedItem, FeedSource, FetchError, Page, Profile};

/// Tunables for fetching and background continuation.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Auto-continuation stops once this many items are cached.
    pub target_ceiling: usize,
    /// Pause between a page settling and the next automatic request.
    pub continuation_delay: Duration,
    pub profile_stale_after: Duration,
    pub feed_stale_after: Duration,
    pub profile_revalidate_every: Duration,
    pub feed_revalidate_every: Duration,
    /// How close the end-of-list sentinel must come before demand is signalled.
    pub viewport_margin_px: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_ceiling: 500,
            continuation_delay: Duration::from_millis(500),
            profile_stale_after: Duration::from_secs(5 * 60),
            feed_stale_after: Duration::from_secs(2 * 60),
            profile_revalidate_every: Duration::from_secs(10 * 60),
            feed_revalidate_every: Duration::from_secs(5 * 60),
            viewport_margin_px: 100.0,
        }
    }
}

/// Per-stream fetch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchState {
    #[default]
    Idle,
    LoadingFirst,
    LoadingMore,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Profile,
    Feed,
}

/// What a feed page response answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRequest {
    /// Page 1 after a reset or on first load.
    First,
    /// The page after the current cursor.
    Next,
    /// Background refetch of page 1 against an existing cache.
    Revalidate,
}

/// Completion and timer events delivered to the controller's owner.
#[derive(Debug)]
pub enum FeedEvent {
    ProfileLoaded {
        generation: u64,
        result: Result<Profile, FetchError>,
    },
    PageLoaded {
        generation: u64,
        request: PageRequest,
        result: Result<Page, FetchError>,
    },
    ContinuationDue {
        generation: u64,
    },
    RevalidateDue(Stream),
}

#[derive(Debug, Default)]
struct StreamStatus {
    state: FetchState,
    in_flight: bool,
    last_fetched: Option<Instant>,
    error: Option<Arc<FetchError>>,
}

impl StreamStatus {
    fn is_stale(&self, max_age: Duration) -> bool {
        self.last_fetched.is_none_or(|at| at.elapsed() > max_age)
    }

    fn begin(&mut self, state: FetchState) {
        self.state = state;
        self.in_flight = true;
    }

    fn succeed(&mut self) {
        self.state = FetchState::Idle;
        self.in_flight = false;
        self.error = None;
    }

    fn fail(&mut self, error: FetchError) {
        self.state = FetchState::Error;
        self.in_flight = false;
        self.error = Some(Arc::new(error));
    }
}

pub struct FeedController<S: FeedSource> {
    source: Arc<S>,
    config: EngineConfig,
    event_tx: mpsc::Sender<FeedEvent>,

    cache: PageCache,
    feed: StreamStatus,
    /// Revalidation saw a different newest item than page 1 holds.
    upstream_changed: bool,
    /// A continuation tick arrived while another feed request was in flight.
    continuation_deferred: bool,

    profile: Option<Arc<Profile>>,
    profile_status: StreamStatus,
    profile_generation: u64,

    continuation: Timer,
    profile_revalidation: Timer,
    feed_revalidation: Timer,
}

impl<S: FeedSource> FeedController<S> {
    pub fn new(source: Arc<S>, config: EngineConfig, event_tx: mpsc::Sender<FeedEvent>) -> Self {
        Self {
            source,
            config,
            event_tx,
            cache: PageCache::new(),
            feed: StreamStatus::default(),
            upstream_changed: false,
            continuation_deferred: false,
            profile: None,
            profile_status: StreamStatus::default(),
            profile_generation: 0,
            continuation: Timer::new(),
            profile_revalidation: Timer::new(),
            feed_revalidation: Timer::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start passive revalidation of both streams.
    pub fn activate(&mut self) {
        self.profile_revalidation.arm_interval(
            self.config.profile_revalidate_every,
            self.event_tx.clone(),
            || FeedEvent::RevalidateDue(Stream::Profile),
        );
        self.feed_revalidation.arm_interval(
            self.config.feed_revalidate_every,
            self.event_tx.clone(),
            || FeedEvent::RevalidateDue(Stream::Feed),
        );
        tracing::debug!("Revalidation timers armed");
    }

    /// Stop every timer. In-flight requests still complete and are applied.
    pub fn deactivate(&mut self) {
        self.profile_revalidation.disarm();
        self.feed_revalidation.disarm();
        self.continuation.disarm();
        tracing::debug!("Controller timers disarmed");
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Fetch whatever is missing or stale. Streams with a request in flight are left alone.
    pub fn initial_load(&mut self) {
        if !self.profile_status.in_flight
            && self.profile_status.is_stale(self.config.profile_stale_after)
        {
            self.start_profile_fetch();
        }

        if !self.feed.in_flight && self.feed.is_stale(self.config.feed_stale_after) {
            if !self.cache.is_empty() {
                tracing::info!("Cached feed is stale, restarting from page 1");
                self.reset_feed();
            }
            self.start_page_fetch(PageRequest::First, None);
        }
    }

    /// Request the page after the current cursor.
    ///
    /// No-op (returns `false`) when the feed is exhausted or any feed request
    /// is already in flight.
    pub fn load_next_page(&mut self) -> bool {
        let Some(cursor) = self.cache.cursor().map(str::to_owned) else {
            tracing::debug!("No cursor, nothing more to load");
            return false;
        };
        if self.feed.in_flight {
            tracing::debug!(state = ?self.feed.state, "Feed request already in flight, ignoring");
            return false;
        }

        self.continuation.disarm();
        self.start_page_fetch(PageRequest::Next, Some(cursor));
        true
    }

    /// Drop all pages and refetch page 1 and the profile, regardless of staleness.
    pub fn refresh(&mut self) {
        tracing::info!("Refreshing feed and profile");
        self.reset_feed();
        self.start_page_fetch(PageRequest::First, None);

        self.profile_generation = self.profile_generation.wrapping_add(1);
        self.start_profile_fetch();
    }

    fn reset_feed(&mut self) {
        self.continuation.disarm();
        self.continuation_deferred = false;
        self.upstream_changed = false;
        self.feed = StreamStatus::default();
        let generation = self.cache.reset();
        tracing::debug!(generation, "Feed cache reset");
    }

    fn revalidate_profile(&mut self) {
        if self.profile_status.in_flight {
            return;
        }
        tracing::debug!("Revalidating profile");
        self.start_profile_fetch();
    }

    fn revalidate_feed(&mut self) {
        if self.feed.in_flight {
            tracing::debug!("Skipping feed revalidation, request in flight");
            return;
        }
        if self.cache.is_empty() {
            self.start_page_fetch(PageRequest::First, None);
        } else {
            tracing::debug!("Revalidating feed page 1");
            self.start_page_fetch(PageRequest::Revalidate, None);
        }
    }

    fn start_profile_fetch(&mut self) {
        let state = if self.profile.is_some() {
            FetchState::Idle
        } else {
            FetchState::LoadingFirst
        };
        self.profile_status.begin(state);

        let source = Arc::clone(&self.source);
        let tx = self.event_tx.clone();
        let generation = self.profile_generation;

        tokio::spawn(async move {
            let result = source.fetch_profile().await;
            if let Err(e) = tx.send(FeedEvent::ProfileLoaded { generation, result }).await {
                tracing::warn!(error = %e, "Failed to deliver profile result (receiver dropped)");
            }
        });
    }

    fn start_page_fetch(&mut self, request: PageRequest, cursor: Option<String>) {
        let state = match request {
            PageRequest::First => FetchState::LoadingFirst,
            PageRequest::Next => FetchState::LoadingMore,
            PageRequest::Revalidate => self.feed.state,
        };
        self.feed.begin(state);

        let source = Arc::clone(&self.source);
        let tx = self.event_tx.clone();
        let generation = self.cache.generation();
        tracing::debug!(?request, generation, cursor = ?cursor, "Requesting feed page");

        tokio::spawn(async move {
            let result = source.fetch_feed_page(cursor.as_deref()).await;
            let event = FeedEvent::PageLoaded {
                generation,
                request,
                result,
            };
            if let Err(e) = tx.send(event).await {
                tracing::warn!(error = %e, "Failed to deliver page result (receiver dropped)");
            }
        });
    }

    // ========================================================================
    // Event Handling
    // ========================================================================

    /// Apply one event. Returns `true` if observable state changed.
    pub fn handle_event(&mut self, event: FeedEvent) -> bool {
        match event {
            FeedEvent::ProfileLoaded { generation, result } => {
                self.handle_profile_loaded(generation, result)
            }
            FeedEvent::PageLoaded {
                generation,
                request,
                result,
            } => self.handle_page_loaded(generation, request, result),
            FeedEvent::ContinuationDue { generation } => {
                if generation != self.cache.generation() {
                    tracing::debug!(
                        expected = self.cache.generation(),
                        got = generation,
                        "Ignoring stale continuation tick"
                    );
                    return false;
                }
                if self.feed.in_flight {
                    tracing::debug!("Continuation tick during in-flight request, deferring");
                    self.continuation_deferred = true;
                    return false;
                }
                self.should_continue() && self.load_next_page()
            }
            FeedEvent::RevalidateDue(Stream::Profile) => {
                self.revalidate_profile();
                true
            }
            FeedEvent::RevalidateDue(Stream::Feed) => {
                self.revalidate_feed();
                true
            }
        }
    }

    fn handle_profile_loaded(&mut self, generation: u64, result: Result<Profile, FetchError>) -> bool {
        if generation != self.profile_generation {
            tracing::debug!(
                expected = self.profile_generation,
                got = generation,
                "Ignoring stale profile (generation mismatch)"
            );
            return false;
        }

        match result {
            Ok(profile) => {
                tracing::debug!(handle = %profile.handle, "Profile loaded");
                self.profile = Some(Arc::new(profile));
                self.profile_status.succeed();
                self.profile_status.last_fetched = Some(Instant::now());
            }
            Err(e) => {
                tracing::warn!(error = %e, "Profile fetch failed");
                self.profile_status.fail(e);
            }
        }
        true
    }

    fn handle_page_loaded(
        &mut self,
        generation: u64,
        request: PageRequest,
        result: Result<Page, FetchError>,
    ) -> bool {
        // Results from before a reset must never reach the new cache
        if generation != self.cache.generation() {
            tracing::debug!(
                expected = self.cache.generation(),
                got = generation,
                ?request,
                "Discarding stale page (generation mismatch)"
            );
            return false;
        }

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(?request, error = %e, "Feed page fetch failed");
                self.feed.fail(e);
                if request == PageRequest::Revalidate {
                    self.resume_deferred_continuation();
                } else {
                    self.continuation_deferred = false;
                }
                return true;
            }
        };

        if request == PageRequest::Revalidate {
            self.reconcile_first_page(&page);
            self.feed.succeed();
            self.feed.last_fetched = Some(Instant::now());
            self.resume_deferred_continuation();
            return true;
        }

        let added = self.cache.append(page);
        self.feed.succeed();
        if request == PageRequest::First {
            self.feed.last_fetched = Some(Instant::now());
        }
        tracing::info!(
            ?request,
            added,
            total = self.cache.item_count(),
            pages = self.cache.page_count(),
            has_more = self.cache.cursor().is_some(),
            "Feed page appended"
        );

        self.schedule_continuation();
        true
    }

    /// Compare a fresh page 1 with the cached one. Cached pages are never
    /// touched here; a difference only raises `upstream_changed` until the
    /// next full refresh.
    fn reconcile_first_page(&mut self, fresh: &Page) {
        let fresh_newest = fresh.items.first().map(|i| i.uri.as_str());
        let cached_newest = self.cache.newest().map(|i| i.uri.as_str());

        if fresh_newest != cached_newest {
            tracing::info!(
                cached = ?cached_newest,
                fresh = ?fresh_newest,
                "New content upstream; cached pages kept until refresh"
            );
            self.upstream_changed = true;
        }
    }

    // ========================================================================
    // Auto-continuation
    // ========================================================================

    fn should_continue(&self) -> bool {
        self.cache.cursor().is_some()
            && self.cache.item_count() < self.config.target_ceiling
            && !self.feed.in_flight
    }

    /// Re-arm a continuation that was skipped because a revalidation held
    /// the feed stream.
    fn resume_deferred_continuation(&mut self) {
        if std::mem::take(&mut self.continuation_deferred) {
            self.schedule_continuation();
        }
    }

    fn schedule_continuation(&mut self) {
        self.continuation_deferred = false;
        if self.cache.cursor().is_none() {
            tracing::info!(total = self.cache.item_count(), "Feed exhausted, continuation stopped");
            return;
        }
        if self.cache.item_count() >= self.config.target_ceiling {
            tracing::info!(
                total = self.cache.item_count(),
                ceiling = self.config.target_ceiling,
                "Target ceiling reached, continuation stopped"
            );
            return;
        }
        if !self.should_continue() {
            return;
        }

        self.continuation.arm_once(
            self.config.continuation_delay,
            self.event_tx.clone(),
            FeedEvent::ContinuationDue {
                generation: self.cache.generation(),
            },
        );
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn items(&self) -> Vec<Arc<FeedItem>> {
        self.cache.snapshot()
    }

    pub fn item_count(&self) -> usize {
        self.cache.item_count()
    }

    pub fn page_count(&self) -> usize {
        self.cache.page_count()
    }

    pub fn generation(&self) -> u64 {
        self.cache.generation()
    }

    pub fn profile(&self) -> Option<&Arc<Profile>> {
        self.profile.as_ref()
    }

    pub fn feed_state(&self) -> FetchState {
        self.feed.state
    }

    pub fn profile_state(&self) -> FetchState {
        self.profile_status.state
    }

    pub fn feed_error(&self) -> Option<&Arc<FetchError>> {
        self.feed.error.as_ref()
    }

    pub fn profile_error(&self) -> Option<&Arc<FetchError>> {
        self.profile_status.error.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.feed.state == FetchState::LoadingFirst
    }

    pub fn is_fetching_more(&self) -> bool {
        self.feed.state == FetchState::LoadingMore
    }

    pub fn has_more(&self) -> bool {
        self.cache.cursor().is_some()
    }

    pub fn upstream_changed(&self) -> bool {
        self.upstream_changed
    }

    /// Nothing in flight on either stream and no continuation pending.
    pub fn is_settled(&self) -> bool {
        !self.feed.in_flight && !self.profile_status.in_flight && !self.continuation.is_armed()
    }
}

impl<S: FeedSource> DemandSink for FeedController<S> {
    fn has_more(&self) -> bool {
        FeedController::has_more(self)
    }

    fn is_fetching_more(&self) -> bool {
        FeedController::is_fetching_more(self)
    }

    fn request_more(&mut self) -> bool {
        self.load_next_page()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::cache::tests::item;
    use crate::engine::viewport::{SentinelObservation, ViewportTrigger};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Semaphore;

    const PAGE_SIZE: usize = 20;

    /// Numbered pages of `PAGE_SIZE` items; cursor `pN` yields page N.
    struct MockSource {
        last_page: Option<usize>,
        /// URI prefix, swapped to simulate new content upstream.
        prefix: Mutex<String>,
        cursors: Mutex<Vec<Option<String>>>,
        profile_calls: AtomicUsize,
        fail_pages: Mutex<Vec<usize>>,
        gate: Option<Semaphore>,
    }

    impl MockSource {
        fn endless() -> Self {
            Self {
                last_page: None,
                prefix: Mutex::new("a".to_string()),
                cursors: Mutex::new(Vec::new()),
                profile_calls: AtomicUsize::new(0),
                fail_pages: Mutex::new(Vec::new()),
                gate: None,
            }
        }

        fn finite(last_page: usize) -> Self {
            Self {
                last_page: Some(last_page),
                ..Self::endless()
            }
        }

        fn gated() -> Self {
            Self {
                gate: Some(Semaphore::new(0)),
                ..Self::endless()
            }
        }

        fn release(&self, n: usize) {
            if let Some(gate) = &self.gate {
                gate.add_permits(n);
            }
        }

        fn page_calls(&self) -> usize {
            self.cursors.lock().unwrap().len()
        }
    }

    impl FeedSource for MockSource {
        async fn fetch_profile(&self) -> Result<Profile, FetchError> {
            self.profile_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Profile {
                did: "did:plc:test".to_string(),
                handle: "test.bsky.social".to_string(),
                display_name: "Test".to_string(),
                description: String::new(),
                avatar: None,
                banner: None,
                followers_count: 1,
                follows_count: 2,
                posts_count: 3,
            })
        }

        async fn fetch_feed_page(&self, cursor: Option<&str>) -> Result<Page, FetchError> {
            self.cursors.lock().unwrap().push(cursor.map(str::to_string));
            if let Some(gate) = &self.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }

            let n: usize = cursor
                .and_then(|c| c.strip_prefix('p'))
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
            if self.fail_pages.lock().unwrap().contains(&n) {
                return Err(FetchError::Upstream(503));
            }

            let prefix = self.prefix.lock().unwrap().clone();
            let items = (0..PAGE_SIZE)
                .map(|i| item(&format!("at://{prefix}/{n}/{i}"), "", None))
                .collect();
            let cursor = match self.last_page {
                Some(last) if n >= last => None,
                _ => Some(format!("p{}", n + 1)),
            };
            Ok(Page { items, cursor })
        }
    }

    fn controller(
        source: Arc<MockSource>,
        config: EngineConfig,
    ) -> (FeedController<MockSource>, mpsc::Receiver<FeedEvent>) {
        let (tx, rx) = mpsc::channel(64);
        (FeedController::new(source, config, tx), rx)
    }

    /// Handle events until nothing arrives for 10 (virtual) seconds.
    async fn drain(ctl: &mut FeedController<MockSource>, rx: &mut mpsc::Receiver<FeedEvent>) {
        while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(10), rx.recv()).await {
            ctl.handle_event(event);
        }
    }

    async fn next_event(rx: &mut mpsc::Receiver<FeedEvent>) -> FeedEvent {
        tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .ok()
            .flatten()
            .unwrap()
    }

    fn no_continuation() -> EngineConfig {
        EngineConfig {
            target_ceiling: 0,
            ..EngineConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_load_fetches_profile_and_first_page() {
        let source = Arc::new(MockSource::finite(0));
        let (mut ctl, mut rx) = controller(source.clone(), EngineConfig::default());

        ctl.initial_load();
        assert!(ctl.is_loading());
        assert_eq!(ctl.profile_state(), FetchState::LoadingFirst);

        drain(&mut ctl, &mut rx).await;

        assert_eq!(ctl.feed_state(), FetchState::Idle);
        assert_eq!(ctl.profile_state(), FetchState::Idle);
        assert_eq!(ctl.item_count(), PAGE_SIZE);
        assert!(ctl.profile().is_some());
        assert!(!ctl.has_more());
        assert!(ctl.is_settled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_load_skips_fresh_streams() {
        let source = Arc::new(MockSource::finite(0));
        let (mut ctl, mut rx) = controller(source.clone(), EngineConfig::default());

        ctl.initial_load();
        drain(&mut ctl, &mut rx).await;
        ctl.initial_load();

        assert!(ctl.is_settled());
        assert_eq!(source.page_calls(), 1);
        assert_eq!(source.profile_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_load_refetches_stale_streams() {
        let source = Arc::new(MockSource::finite(0));
        let (mut ctl, mut rx) = controller(source.clone(), EngineConfig::default());

        ctl.initial_load();
        drain(&mut ctl, &mut rx).await;

        // Past the 2 minute feed threshold, short of the 5 minute profile one
        tokio::time::advance(Duration::from_secs(3 * 60)).await;
        let generation = ctl.generation();
        ctl.initial_load();
        drain(&mut ctl, &mut rx).await;

        assert_eq!(source.page_calls(), 2);
        assert_eq!(source.profile_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctl.generation(), generation + 1);
        assert_eq!(ctl.item_count(), PAGE_SIZE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_next_page_appends_in_order() {
        let source = Arc::new(MockSource::finite(2));
        let (mut ctl, mut rx) = controller(source.clone(), no_continuation());

        ctl.initial_load();
        drain(&mut ctl, &mut rx).await;
        assert!(ctl.load_next_page());
        drain(&mut ctl, &mut rx).await;
        assert!(ctl.load_next_page());
        drain(&mut ctl, &mut rx).await;

        assert!(!ctl.has_more());
        assert!(!ctl.load_next_page());

        let uris: Vec<String> = ctl.items().iter().map(|i| i.uri.clone()).collect();
        let expected: Vec<String> = (0..3)
            .flat_map(|n| (0..PAGE_SIZE).map(move |i| format!("at://a/{n}/{i}")))
            .collect();
        assert_eq!(uris, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_collapse_to_one_fetch() {
        let source = Arc::new(MockSource::endless());
        let (mut ctl, mut rx) = controller(source.clone(), no_continuation());

        ctl.initial_load();
        drain(&mut ctl, &mut rx).await;
        assert_eq!(source.page_calls(), 1);

        assert!(ctl.load_next_page());
        assert!(!ctl.load_next_page());
        assert!(ctl.is_fetching_more());
        drain(&mut ctl, &mut rx).await;

        assert_eq!(source.page_calls(), 2);
        assert_eq!(ctl.page_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuation_stops_at_ceiling() {
        let source = Arc::new(MockSource::endless());
        let (mut ctl, mut rx) = controller(source.clone(), EngineConfig::default());

        ctl.initial_load();
        drain(&mut ctl, &mut rx).await;

        assert_eq!(ctl.item_count(), 500);
        assert_eq!(source.page_calls(), 25);
        assert!(ctl.has_more());
        assert!(ctl.is_settled());

        // Nothing scheduled behind our back
        tokio::time::advance(Duration::from_secs(60)).await;
        drain(&mut ctl, &mut rx).await;
        assert_eq!(source.page_calls(), 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuation_is_throttled() {
        let source = Arc::new(MockSource::finite(3));
        let (mut ctl, mut rx) = controller(source.clone(), EngineConfig::default());
        let start = Instant::now();

        ctl.initial_load();
        drain(&mut ctl, &mut rx).await;

        assert_eq!(source.page_calls(), 4);
        // Three continuation gaps of 500ms each
        assert!(start.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_load_allowed_beyond_ceiling() {
        let source = Arc::new(MockSource::endless());
        let config = EngineConfig {
            target_ceiling: 40,
            ..EngineConfig::default()
        };
        let (mut ctl, mut rx) = controller(source.clone(), config);

        ctl.initial_load();
        drain(&mut ctl, &mut rx).await;
        assert_eq!(ctl.item_count(), 40);

        assert!(ctl.load_next_page());
        drain(&mut ctl, &mut rx).await;
        assert_eq!(ctl.item_count(), 60);
        assert_eq!(source.page_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_page_discarded_after_refresh() {
        let source = Arc::new(MockSource::gated());
        let (mut ctl, mut rx) = controller(source.clone(), no_continuation());

        ctl.initial_load();
        source.release(1);
        drain(&mut ctl, &mut rx).await;
        assert_eq!(ctl.page_count(), 1);

        // Next page goes out under generation 0, then the cache is reset
        assert!(ctl.load_next_page());
        ctl.refresh();
        assert_eq!(ctl.generation(), 1);
        assert!(ctl.is_loading());

        source.release(2);
        drain(&mut ctl, &mut rx).await;

        assert_eq!(ctl.page_count(), 1);
        assert_eq!(ctl.item_count(), PAGE_SIZE);
        assert!(ctl.items().iter().all(|i| i.uri.starts_with("at://a/0/")));
        assert_eq!(ctl.feed_state(), FetchState::Idle);
        assert_eq!(source.page_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_profile_discarded_after_refresh() {
        let source = Arc::new(MockSource::finite(0));
        let (mut ctl, mut rx) = controller(source.clone(), EngineConfig::default());

        ctl.initial_load();
        ctl.refresh();

        let mut discarded = 0;
        while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(10), rx.recv()).await {
            if matches!(event, FeedEvent::ProfileLoaded { generation: 0, .. }) {
                assert!(!ctl.handle_event(event));
                discarded += 1;
            } else {
                ctl.handle_event(event);
            }
        }
        assert_eq!(discarded, 1);
        assert!(ctl.profile().is_some());
        assert_eq!(source.profile_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_preserves_pages_and_stops_continuation() {
        let source = Arc::new(MockSource::endless());
        source.fail_pages.lock().unwrap().push(2);
        let (mut ctl, mut rx) = controller(source.clone(), EngineConfig::default());

        ctl.initial_load();
        drain(&mut ctl, &mut rx).await;

        assert_eq!(ctl.feed_state(), FetchState::Error);
        assert!(matches!(
            ctl.feed_error().map(|e| e.as_ref()),
            Some(FetchError::Upstream(503))
        ));
        assert_eq!(ctl.item_count(), 2 * PAGE_SIZE);
        assert_eq!(source.page_calls(), 3);
        // Profile stream is unaffected
        assert_eq!(ctl.profile_state(), FetchState::Idle);

        // A demand signal is the retry path
        source.fail_pages.lock().unwrap().clear();
        assert!(ctl.load_next_page());
        let event = next_event(&mut rx).await;
        ctl.handle_event(event);
        assert_eq!(ctl.feed_state(), FetchState::Idle);
        assert!(ctl.feed_error().is_none());
        assert_eq!(ctl.item_count(), 3 * PAGE_SIZE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revalidation_keeps_pages_and_flags_new_content() {
        let source = Arc::new(MockSource::finite(1));
        let (mut ctl, mut rx) = controller(source.clone(), EngineConfig::default());

        ctl.initial_load();
        drain(&mut ctl, &mut rx).await;
        let before: Vec<String> = ctl.items().iter().map(|i| i.uri.clone()).collect();

        // Same page 1 upstream: no signal
        ctl.handle_event(FeedEvent::RevalidateDue(Stream::Feed));
        drain(&mut ctl, &mut rx).await;
        assert!(!ctl.upstream_changed());

        // Newer content upstream: signal, but cached pages untouched
        *source.prefix.lock().unwrap() = "b".to_string();
        ctl.handle_event(FeedEvent::RevalidateDue(Stream::Feed));
        drain(&mut ctl, &mut rx).await;

        let after: Vec<String> = ctl.items().iter().map(|i| i.uri.clone()).collect();
        assert!(ctl.upstream_changed());
        assert_eq!(before, after);
        assert_eq!(ctl.generation(), 0);

        // A manual refresh resyncs and clears the signal
        ctl.refresh();
        drain(&mut ctl, &mut rx).await;
        assert!(!ctl.upstream_changed());
        assert!(ctl.items().iter().all(|i| i.uri.starts_with("at://b/")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuation_resumes_after_overlapping_revalidation() {
        let source = Arc::new(MockSource::gated());
        let (mut ctl, mut rx) = controller(source.clone(), EngineConfig::default());

        ctl.initial_load();
        source.release(1);
        while ctl.item_count() == 0 {
            let event = next_event(&mut rx).await;
            ctl.handle_event(event);
        }

        // Revalidation holds the feed stream when the continuation tick lands
        ctl.handle_event(FeedEvent::RevalidateDue(Stream::Feed));
        loop {
            match next_event(&mut rx).await {
                event @ FeedEvent::ContinuationDue { .. } => {
                    assert!(!ctl.handle_event(event));
                    break;
                }
                event => {
                    ctl.handle_event(event);
                }
            }
        }
        assert_eq!(ctl.page_count(), 1);
        assert!(!ctl.is_settled());

        source.release(100);
        drain(&mut ctl, &mut rx).await;

        assert_eq!(ctl.item_count(), 500);
        // 25 content pages plus the revalidation of page 1
        assert_eq!(source.page_calls(), 26);
        assert!(ctl.is_settled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuation_resumes_after_failed_revalidation() {
        let source = Arc::new(MockSource::gated());
        let (mut ctl, mut rx) = controller(source.clone(), EngineConfig::default());

        ctl.initial_load();
        source.release(1);
        while ctl.item_count() == 0 {
            let event = next_event(&mut rx).await;
            ctl.handle_event(event);
        }

        source.fail_pages.lock().unwrap().push(0);
        ctl.handle_event(FeedEvent::RevalidateDue(Stream::Feed));
        loop {
            match next_event(&mut rx).await {
                event @ FeedEvent::ContinuationDue { .. } => {
                    ctl.handle_event(event);
                    break;
                }
                event => {
                    ctl.handle_event(event);
                }
            }
        }

        source.release(1);
        let event = next_event(&mut rx).await;
        assert!(matches!(
            event,
            FeedEvent::PageLoaded {
                request: PageRequest::Revalidate,
                ..
            }
        ));
        ctl.handle_event(event);
        assert_eq!(ctl.feed_state(), FetchState::Error);
        assert_eq!(ctl.item_count(), PAGE_SIZE);

        source.release(100);
        drain(&mut ctl, &mut rx).await;
        assert_eq!(ctl.item_count(), 500);
        assert_eq!(ctl.feed_state(), FetchState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_demand_during_revalidation_is_not_latched() {
        let source = Arc::new(MockSource::gated());
        let (mut ctl, mut rx) = controller(source.clone(), no_continuation());

        ctl.initial_load();
        source.release(1);
        drain(&mut ctl, &mut rx).await;
        assert_eq!(ctl.page_count(), 1);

        ctl.handle_event(FeedEvent::RevalidateDue(Stream::Feed));
        assert!(!ctl.is_fetching_more());

        let mut trigger = ViewportTrigger::default();
        let near = SentinelObservation { distance_px: 0.0 };
        assert!(!trigger.observe(near, &mut ctl));
        assert!(!trigger.is_intersecting());

        source.release(1);
        drain(&mut ctl, &mut rx).await;

        // Sentinel never left the margin; the next observation still fires
        source.release(1);
        assert!(trigger.observe(near, &mut ctl));
        assert!(ctl.is_fetching_more());
        drain(&mut ctl, &mut rx).await;

        assert_eq!(ctl.page_count(), 2);
        assert_eq!(source.page_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_profile_revalidation_replaces_profile_in_place() {
        let source = Arc::new(MockSource::finite(0));
        let (mut ctl, mut rx) = controller(source.clone(), EngineConfig::default());

        ctl.initial_load();
        drain(&mut ctl, &mut rx).await;
        let before = Arc::clone(ctl.profile().unwrap());

        assert!(ctl.handle_event(FeedEvent::RevalidateDue(Stream::Profile)));
        // Old profile stays visible and no loading state is shown
        assert_eq!(ctl.profile_state(), FetchState::Idle);
        assert!(Arc::ptr_eq(ctl.profile().unwrap(), &before));
        assert!(!ctl.is_settled());

        // A second tick while in flight does not issue another request
        ctl.handle_event(FeedEvent::RevalidateDue(Stream::Profile));

        drain(&mut ctl, &mut rx).await;
        let after = ctl.profile().unwrap();
        assert!(!Arc::ptr_eq(after, &before));
        assert_eq!(after.handle, before.handle);
        assert_eq!(ctl.profile_state(), FetchState::Idle);
        assert_eq!(source.profile_calls.load(Ordering::SeqCst), 2);
        // Feed stream untouched
        assert_eq!(source.page_calls(), 1);
        assert!(ctl.is_settled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_revalidation_timers_fire_while_active() {
        let source = Arc::new(MockSource::finite(0));
        let (mut ctl, mut rx) = controller(source.clone(), EngineConfig::default());

        ctl.activate();
        ctl.initial_load();
        drain(&mut ctl, &mut rx).await;
        assert_eq!(source.page_calls(), 1);

        // 5 minute feed interval
        let event = tokio::time::timeout(Duration::from_secs(6 * 60), rx.recv())
            .await
            .ok()
            .flatten()
            .unwrap();
        assert!(matches!(event, FeedEvent::RevalidateDue(Stream::Feed)));

        ctl.deactivate();
        drop(rx);
        assert!(ctl.is_settled());
    }
}
