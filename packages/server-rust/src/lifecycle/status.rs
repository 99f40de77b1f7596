//! Adapter state and in-flight dispatch tracking.
//!
//! Both live in `watch` channels: consumers subscribe to the state to stop
//! pulling messages, and `stop` waits on the in-flight count reaching zero.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Starting -> Ready -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    /// Not yet accepting messages.
    Starting,
    /// Accepting and dispatching messages.
    Ready,
    /// No new messages accepted; in-flight dispatches are finishing.
    Draining,
    /// All in-flight dispatches completed.
    Stopped,
}

impl AdapterState {
    /// `true` once shutdown has begun.
    #[must_use]
    pub fn is_shutting_down(self) -> bool {
        matches!(self, Self::Draining | Self::Stopped)
    }
}

/// Shared adapter status, read by the dispatcher and consumers.
#[derive(Debug)]
pub struct AdapterStatus {
    state: watch::Sender<AdapterState>,
    in_flight: Arc<watch::Sender<usize>>,
}

impl AdapterStatus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: watch::Sender::new(AdapterState::Starting),
            in_flight: Arc::new(watch::Sender::new(0)),
        }
    }

    pub fn set_ready(&self) {
        self.state.send_replace(AdapterState::Ready);
    }

    #[must_use]
    pub fn state(&self) -> AdapterState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.state() == AdapterState::Ready
    }

    /// Subscribes to state changes. Consumers stop once shutdown begins.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AdapterState> {
        self.state.subscribe()
    }

    /// Admits one dispatch, or returns `None` unless the adapter is ready.
    ///
    /// The count is raised before the state is checked, so a drain that
    /// starts concurrently either rejects the dispatch or waits for it.
    #[must_use]
    pub fn admit(&self) -> Option<InFlightGuard> {
        let guard = InFlightGuard::enter(&self.in_flight);
        self.is_accepting().then_some(guard)
    }

    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Stops admitting dispatches and waits up to `timeout` for the ones in
    /// flight to finish.
    ///
    /// Returns `true` and moves to `Stopped` once none remain; returns
    /// `false` and stays `Draining` on timeout.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.state.send_replace(AdapterState::Draining);
        let mut in_flight = self.in_flight.subscribe();
        let drained = tokio::time::timeout(timeout, in_flight.wait_for(|count| *count == 0))
            .await
            .is_ok_and(|idle| idle.is_ok());
        if drained {
            self.state.send_replace(AdapterState::Stopped);
        }
        drained
    }
}

impl Default for AdapterStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// One admitted dispatch; released on drop, including during unwinding.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<watch::Sender<usize>>,
}

impl InFlightGuard {
    fn enter(in_flight: &Arc<watch::Sender<usize>>) -> Self {
        in_flight.send_modify(|count| *count += 1);
        Self {
            in_flight: Arc::clone(in_flight),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.send_modify(|count| *count = count.saturating_sub(1));
    }
}
