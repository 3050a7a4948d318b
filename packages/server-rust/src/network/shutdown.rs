//! Server health state and in-flight submission tracking for graceful
//! shutdown.
//!
//! Probes read the state lock-free from an `ArcSwap`. Each accepted
//! submission holds an [`InFlightGuard`]; dropping the last one wakes the
//! drain waiter directly instead of it polling the counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{watch, Notify};

/// Starting -> Ready -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Starting,
    /// Accepting submissions.
    Ready,
    /// Refusing new submissions, finishing accepted ones.
    Draining,
    Stopped,
}

impl HealthState {
    /// Lower-case name reported by the health endpoint.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Default)]
struct InFlight {
    count: AtomicU64,
    idle: Notify,
}

/// Coordinates the drain: the submission handler checks
/// [`accepts_requests`](Self::accepts_requests) and holds a guard while it
/// works; [`trigger_shutdown`](Self::trigger_shutdown) flips to Draining and
/// wakes every [`shutdown_receiver`](Self::shutdown_receiver);
/// [`wait_for_drain`](Self::wait_for_drain) returns once the guards are gone.
#[derive(Debug)]
pub struct ShutdownController {
    signal: watch::Sender<bool>,
    in_flight: Arc<InFlight>,
    state: ArcSwap<HealthState>,
}

impl ShutdownController {
    #[must_use]
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            signal,
            in_flight: Arc::new(InFlight::default()),
            state: ArcSwap::from_pointee(HealthState::Starting),
        }
    }

    pub fn set_ready(&self) {
        self.state.store(Arc::new(HealthState::Ready));
    }

    /// Sees `true` once shutdown has been triggered.
    #[must_use]
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }

    /// Move to Draining and notify receivers. Idempotent.
    pub fn trigger_shutdown(&self) {
        self.state.store(Arc::new(HealthState::Draining));
        self.signal.send_replace(true);
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.state.load()
    }

    /// Only `Ready` accepts new notifications.
    #[must_use]
    pub fn accepts_requests(&self) -> bool {
        self.health_state() == HealthState::Ready
    }

    /// Count one submission as in flight until the guard drops (including
    /// during unwinding).
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.count.load(Ordering::Acquire)
    }

    /// Wait until no submission is in flight, at most `timeout`.
    ///
    /// `true` means drained, and the state is now Stopped. `false` means the
    /// timeout expired and the state is left as it was.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register before checking so a guard dropped in between still wakes us.
            let idle = self.in_flight.idle.notified();
            if self.in_flight_count() == 0 {
                self.state.store(Arc::new(HealthState::Stopped));
                return true;
            }
            if tokio::time::timeout_at(deadline, idle).await.is_err() {
                return false;
            }
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks one submission as in flight. See [`ShutdownController::in_flight_guard`].
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.in_flight.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.in_flight.idle.notify_waiters();
        }
    }
}
