use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// A disarmable timer that delivers events into a channel.
///
/// At most one schedule is active per timer: arming again replaces the
/// previous schedule. Dropping the timer disarms it.
#[derive(Debug, Default)]
pub struct Timer {
    handle: Option<JoinHandle<()>>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` once, after `delay`.
    pub fn arm_once<E>(&mut self, delay: Duration, tx: mpsc::Sender<E>, event: E)
    where
        E: Send + 'static,
    {
        self.disarm();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(event).await.is_err() {
                tracing::debug!("Timer fired after receiver dropped");
            }
        }));
    }

    /// Deliver `make_event()` every `period`, first tick one period from now.
    pub fn arm_interval<E, F>(&mut self, period: Duration, tx: mpsc::Sender<E>, make_event: F)
    where
        E: Send + 'static,
        F: Fn() -> E + Send + 'static,
    {
        self.disarm();
        self.handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tx.send(make_event()).await.is_err() {
                    tracing::debug!("Interval timer stopping, receiver dropped");
                    break;
                }
            }
        }));
    }

    pub fn disarm(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// True while a schedule is pending (a fired one-shot counts as disarmed).
    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.disarm();
    }
}
