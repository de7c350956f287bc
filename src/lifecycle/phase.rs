//! Server lifecycle phases.

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle phase. Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Config loaded, subsystems initializing, not yet accepting.
    Starting,
    /// Accepting connections.
    Listening,
    /// Shutdown requested; no new connections, in-flight requests finishing.
    Draining,
    /// Server stopped and spans flushed.
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Listening => "listening",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Shared, observable lifecycle phase.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    tx: Arc<watch::Sender<Phase>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Phase::Starting);
        Self { tx: Arc::new(tx) }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        *self.tx.borrow()
    }

    /// Receiver notified on every transition.
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.tx.subscribe()
    }

    /// Wait until the phase reaches at least `target`.
    pub async fn wait_for(&self, target: Phase) {
        let mut rx = self.subscribe();
        // The sender lives as long as self, so this cannot fail.
        let _ = rx.wait_for(|phase| *phase >= target).await;
    }

    /// Move to `next`. Backward or repeated transitions are ignored.
    pub(crate) fn advance(&self, next: Phase) {
        let mut from = None;
        self.tx.send_if_modified(|current| {
            if next > *current {
                from = Some(*current);
                *current = next;
                true
            } else {
                false
            }
        });
        if let Some(from) = from {
            tracing::info!(%from, to = %next, "Lifecycle transition");
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_only_move_forward() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.phase(), Phase::Starting);

        lifecycle.advance(Phase::Draining);
        assert_eq!(lifecycle.phase(), Phase::Draining);

        lifecycle.advance(Phase::Listening);
        assert_eq!(lifecycle.phase(), Phase::Draining);

        lifecycle.advance(Phase::Stopped);
        assert_eq!(lifecycle.phase(), Phase::Stopped);
    }

    #[tokio::test]
    async fn wait_for_resolves_on_transition() {
        let lifecycle = Lifecycle::new();
        let observer = lifecycle.clone();
        let waiter = tokio::spawn(async move { observer.wait_for(Phase::Listening).await });

        lifecycle.advance(Phase::Listening);
        waiter.await.unwrap();
    }
}
