//! Turns "end of list is near" observations into demand signals.
//!
//! A sentinel sits at the end of the rendered list. The trigger fires on the
//! transition into proximity, not while the sentinel stays near, so a
//! consumer that keeps reporting positions does not flood the engine.

/// Anything that can serve more items on demand.
pub trait DemandSink {
    fn has_more(&self) -> bool;
    fn is_fetching_more(&self) -> bool;
    /// Returns `true` if a fetch was actually started.
    fn request_more(&mut self) -> bool;
}

/// Distance from the bottom of the viewport to the sentinel, in pixels.
/// Zero or negative means the sentinel is on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentinelObservation {
    pub distance_px: f64,
}

/// Scroll geometry of a list container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollPosition {
    pub offset: f64,
    pub viewport_height: f64,
    pub content_height: f64,
}

impl From<ScrollPosition> for SentinelObservation {
    fn from(pos: ScrollPosition) -> Self {
        Self {
            distance_px: pos.content_height - (pos.offset + pos.viewport_height),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewportTrigger {
    margin_px: f64,
    intersecting: bool,
}

impl ViewportTrigger {
    pub fn new(margin_px: f64) -> Self {
        Self {
            margin_px: margin_px.max(0.0),
            intersecting: false,
        }
    }

    pub fn margin_px(&self) -> f64 {
        self.margin_px
    }

    pub fn is_intersecting(&self) -> bool {
        self.intersecting
    }

    /// Record a new observation and signal `sink` if the sentinel just came
    /// within the margin. Returns `true` when the sink started a fetch.
    ///
    /// The crossing only counts once the sink accepts it; a refused request
    /// leaves the trigger armed for the next observation.
    pub fn observe(
        &mut self,
        observation: impl Into<SentinelObservation>,
        sink: &mut impl DemandSink,
    ) -> bool {
        let observation = observation.into();
        if observation.distance_px > self.margin_px {
            self.intersecting = false;
            return false;
        }
        if self.intersecting {
            return false;
        }
        if !sink.has_more() || sink.is_fetching_more() {
            tracing::trace!(
                has_more = sink.has_more(),
                fetching = sink.is_fetching_more(),
                "Sentinel near but no demand signalled"
            );
            return false;
        }

        let started = sink.request_more();
        if !started {
            tracing::trace!("Demand refused by sink");
        }
        self.intersecting = started;
        started
    }

    /// Forget the last observation, e.g. after the list was replaced.
    pub fn reset(&mut self) {
        self.intersecting = false;
    }
}

impl Default for ViewportTrigger {
    fn default() -> Self {
        Self::new(100.0)
    }
}
