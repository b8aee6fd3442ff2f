//! Graceful shutdown coordination.
//!
//! On shutdown the service stops admitting jobs, lets running jobs finish
//! within a timeout, then cancels whatever is still running.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;

/// Shutdown state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

impl ShutdownState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

/// Result of a shutdown operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownResult {
    Complete,
    /// Jobs still running when the timeout hit; they were cancelled.
    Timeout { remaining: u32 },
}

/// Coordinates graceful shutdown across runtime components.
pub struct ShutdownCoordinator {
    state: Arc<RwLock<ShutdownState>>,
    in_flight: Arc<AtomicU32>,
    notify: Arc<Notify>,
    /// Parent of every job's cancellation token.
    root: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ShutdownState::Running)),
            in_flight: Arc::new(AtomicU32::new(0)),
            notify: Arc::new(Notify::new()),
            root: CancellationToken::new(),
        }
    }

    pub async fn state(&self) -> ShutdownState {
        *self.state.read().await
    }

    /// Check if accepting new jobs.
    pub fn is_accepting(&self) -> bool {
        self.state
            .try_read()
            .map(|s| *s == ShutdownState::Running)
            .unwrap_or(false)
    }

    /// Token cancelled once running jobs must stop.
    pub fn root_token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Count a running job until the guard drops.
    pub fn track(&self) -> ShutdownGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        ShutdownGuard {
            counter: self.in_flight.clone(),
            notify: self.notify.clone(),
        }
    }

    pub fn in_flight_count(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop accepting, wait up to `timeout` for running jobs, then cancel
    /// the rest.
    pub async fn initiate(&self, timeout: Duration) -> ShutdownResult {
        {
            let mut state = self.state.write().await;
            if *state != ShutdownState::Running {
                return ShutdownResult::Complete;
            }
            *state = ShutdownState::Draining;
        }
        tracing::info!(in_flight = self.in_flight_count(), "draining running jobs");

        let result = self.wait_for_drain(timeout).await;
        if let ShutdownResult::Timeout { remaining } = result {
            tracing::warn!(remaining, "drain timed out, cancelling running jobs");
        }
        self.root.cancel();

        *self.state.write().await = ShutdownState::Stopped;
        result
    }

    async fn wait_for_drain(&self, timeout: Duration) -> ShutdownResult {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.notify.notified();
            let count = self.in_flight_count();
            if count == 0 {
                return ShutdownResult::Complete;
            }

            let remaining_time = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining_time.is_zero() {
                return ShutdownResult::Timeout { remaining: count };
            }

            tokio::select! {
                _ = notified => continue,
                _ = tokio::time::sleep(remaining_time) => {
                    let final_count = self.in_flight_count();
                    if final_count == 0 {
                        return ShutdownResult::Complete;
                    }
                    return ShutdownResult::Timeout { remaining: final_count };
                }
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for running-job tracking.
pub struct ShutdownGuard {
    counter: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}
