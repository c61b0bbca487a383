//! Main event loop.
//!
//! Multiplexes shutdown signals, engine events and consumer intents. All
//! state changes go through the [`App`] on this one task.

use anyhow::Result;
use tokio::sync::mpsc;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use crate::app::{App, Intent};
use crate::engine::FeedEvent;
use crate::feed::FeedSource;

/// When [`run`] returns on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Return once nothing is in flight and no continuation is pending.
    UntilSettled,
    /// Keep revalidating until a shutdown signal.
    Watch,
}

/// Drive `app` until `mode` says to stop.
///
/// Starts with `initial_load`; in [`RunMode::Watch`] the revalidation timers
/// are armed as well and disarmed again on exit.
pub async fn run<S: FeedSource>(
    app: &mut App<S>,
    mut event_rx: mpsc::Receiver<FeedEvent>,
    mut intent_rx: mpsc::Receiver<Intent>,
    mode: RunMode,
) -> Result<()> {
    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate())?;
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt())?;

    if mode == RunMode::Watch {
        app.activate();
    }
    app.initial_load();

    let mut intents_open = true;

    loop {
        // Drain completed work before looking at new input
        while let Ok(event) = event_rx.try_recv() {
            app.handle_event(event);
        }

        if mode == RunMode::UntilSettled && app.is_settled() {
            tracing::debug!("Engine settled");
            break;
        }

        #[cfg(unix)]
        let sigterm_fut = sigterm.recv();
        #[cfg(not(unix))]
        let sigterm_fut = std::future::pending::<Option<()>>();

        #[cfg(unix)]
        let sigint_fut = sigint.recv();
        #[cfg(not(unix))]
        let sigint_fut = std::future::pending::<Option<()>>();

        tokio::select! {
            biased;

            _ = sigterm_fut => {
                tracing::info!("Received SIGTERM, shutting down gracefully");
                break;
            }

            _ = sigint_fut => {
                tracing::info!("Received SIGINT, shutting down gracefully");
                break;
            }

            maybe_event = event_rx.recv() => match maybe_event {
                Some(event) => app.handle_event(event),
                // The app holds a sender, so this only happens on teardown
                None => break,
            },

            maybe_intent = intent_rx.recv(), if intents_open => match maybe_intent {
                Some(intent) => {
                    tracing::debug!(?intent, "Applying intent");
                    app.apply(intent);
                }
                None => {
                    tracing::debug!("Intent channel closed");
                    intents_open = false;
                }
            },
        }
    }

    app.deactivate();
    Ok(())
}
