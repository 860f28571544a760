//! Shutdown coordination: `Running -> Draining -> Closed`.
//!
//! On a termination signal the gateway stops accepting new turns, gives
//! in-flight turns a bounded grace period, then closes collaborator
//! resources. A stalled pipeline never prevents process exit — the grace
//! period elapsing is logged and shutdown proceeds regardless.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{info, warn};

/// Lifecycle phase of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Draining,
    Closed,
}

const PHASE_RUNNING: u8 = 0;
const PHASE_DRAINING: u8 = 1;
const PHASE_CLOSED: u8 = 2;

/// Drains in-flight turns and gates admission during shutdown.
pub struct ShutdownCoordinator {
    phase: AtomicU8,
    active_turns: AtomicUsize,
    turn_finished: Notify,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(PHASE_RUNNING),
            active_turns: AtomicUsize::new(0),
            turn_finished: Notify::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        match self.phase.load(Ordering::SeqCst) {
            PHASE_RUNNING => Phase::Running,
            PHASE_DRAINING => Phase::Draining,
            _ => Phase::Closed,
        }
    }

    /// Whether new turns may be admitted.
    pub fn is_accepting(&self) -> bool {
        self.phase() == Phase::Running
    }

    /// Count a turn into the drain set.
    ///
    /// Returns `None` once draining has begun — the caller rejects the
    /// turn. The guard decrements on drop, so a panicking pipeline still
    /// releases its slot.
    pub fn begin_turn(self: &Arc<Self>) -> Option<TurnGuard> {
        if !self.is_accepting() {
            return None;
        }
        self.active_turns.fetch_add(1, Ordering::SeqCst);
        Some(TurnGuard {
            coordinator: self.clone(),
        })
    }

    /// Number of turns currently in flight.
    pub fn active_turns(&self) -> usize {
        self.active_turns.load(Ordering::SeqCst)
    }

    /// Stop accepting new turns.
    pub fn begin_drain(&self) {
        if self
            .phase
            .compare_exchange(
                PHASE_RUNNING,
                PHASE_DRAINING,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
        {
            info!("Shutdown: draining, no new turns accepted");
        }
    }

    /// Wait up to `grace` for in-flight turns to finish.
    ///
    /// Returns true if the pipeline drained; false if the grace period
    /// elapsed with turns still running.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.begin_drain();

        let deadline = tokio::time::Instant::now() + grace;
        loop {
            if self.active_turns() == 0 {
                return true;
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                warn!(
                    still_in_flight = self.active_turns(),
                    "Shutdown grace period elapsed, forcing close"
                );
                return false;
            }
            tokio::select! {
                _ = self.turn_finished.notified() => {}
                _ = tokio::time::sleep(remaining.min(Duration::from_millis(100))) => {}
            }
        }
    }

    /// Mark collaborator resources closed.
    pub fn mark_closed(&self) {
        self.phase.store(PHASE_CLOSED, Ordering::SeqCst);
        info!("Shutdown: closed");
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for one in-flight turn.
pub struct TurnGuard {
    coordinator: Arc<ShutdownCoordinator>,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.coordinator.active_turns.fetch_sub(1, Ordering::SeqCst);
        self.coordinator.turn_finished.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_progress_forward() {
        let coordinator = ShutdownCoordinator::new();
        assert_eq!(coordinator.phase(), Phase::Running);
        assert!(coordinator.is_accepting());

        coordinator.begin_drain();
        assert_eq!(coordinator.phase(), Phase::Draining);
        assert!(!coordinator.is_accepting());

        coordinator.mark_closed();
        assert_eq!(coordinator.phase(), Phase::Closed);
    }

    #[test]
    fn draining_rejects_new_turns() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let guard = coordinator.begin_turn();
        assert!(guard.is_some());

        coordinator.begin_drain();
        assert!(coordinator.begin_turn().is_none());
    }

    #[tokio::test]
    async fn drain_completes_when_turns_finish() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let guard = coordinator.begin_turn().expect("running");

        let drainer = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.drain(Duration::from_secs(5)).await })
        };

        // Finish the turn shortly after draining starts.
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);

        assert!(drainer.await.unwrap());
        assert_eq!(coordinator.active_turns(), 0);
    }

    #[tokio::test]
    async fn drain_times_out_with_stuck_turn() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let _guard = coordinator.begin_turn().expect("running");

        // The stuck turn never finishes; drain must still return.
        let drained = coordinator.drain(Duration::from_millis(50)).await;
        assert!(!drained);
        assert_eq!(coordinator.active_turns(), 1);
    }

    #[tokio::test]
    async fn guard_releases_on_drop() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        {
            let _guard = coordinator.begin_turn().expect("running");
            assert_eq!(coordinator.active_turns(), 1);
        }
        assert_eq!(coordinator.active_turns(), 0);
    }
}
