//! Snapshot-and-restore around application visibility changes.
//!
//! While the application is hidden the process may be suspended and no ticks
//! arrive. On hide the clock state is written to a [`SnapshotStore`]; on show
//! the snapshot is consumed and the clock is fast-forwarded by the wall-clock
//! time spent in the background, so the result equals ticking through it.

mod snapshot;
mod store;

pub use snapshot::{ClockSnapshot, SNAPSHOT_VERSION};
pub use store::{MemorySnapshotStore, SnapshotStore, SNAPSHOT_KEY};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::CoreError;
use crate::events::ClockEvent;
use crate::timer::{fast_forward, ClockState};

/// State rebuilt from a consumed snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Restored {
    pub state: ClockState,
    pub background_secs: u64,
    /// Wall-clock instant `state` corresponds to: the capture time plus
    /// `background_secs`. At most one second behind the show time.
    pub resumed_at: DateTime<Utc>,
    /// Events produced while fast-forwarding, in order.
    pub events: Vec<ClockEvent>,
}

/// Result of a show.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// Nothing was pending.
    NoSnapshot,
    /// A snapshot existed but could not be used; it has been removed.
    Discarded { reason: String },
    Restored(Restored),
}

impl RecoveryOutcome {
    pub fn restored(self) -> Option<Restored> {
        match self {
            RecoveryOutcome::Restored(restored) => Some(restored),
            _ => None,
        }
    }
}

/// Hide/show handling over a snapshot store.
#[derive(Debug)]
pub struct RecoveryLayer<S> {
    store: S,
}

impl<S: SnapshotStore> RecoveryLayer<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persist `state` if time is accruing. Returns whether a snapshot was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be encoded or stored.
    pub fn hide(&self, state: &ClockState, now: DateTime<Utc>) -> Result<bool, CoreError> {
        let Some(snapshot) = ClockSnapshot::capture(state, now) else {
            // An earlier checkpoint no longer describes the clock.
            self.store.delete_snapshot()?;
            tracing::debug!(phase = %state.phase(), "clock idle on hide, no snapshot");
            return Ok(false);
        };
        self.store.save_snapshot(&snapshot.encode()?)?;
        tracing::debug!(phase = %state.phase(), "clock snapshot saved");
        Ok(true)
    }

    /// Whether a snapshot is waiting to be consumed.
    pub fn is_pending(&self) -> bool {
        matches!(self.store.load_snapshot(), Ok(Some(_)))
    }

    /// Consume the pending snapshot, if any, and fast-forward it to `now`.
    ///
    /// Never fails: unreadable snapshots and store errors are logged and
    /// treated as absent.
    pub fn show(&self, now: DateTime<Utc>) -> RecoveryOutcome {
        let payload = match self.store.load_snapshot() {
            Ok(Some(payload)) => payload,
            Ok(None) => return RecoveryOutcome::NoSnapshot,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read clock snapshot");
                return RecoveryOutcome::NoSnapshot;
            }
        };

        // Consume before applying so a snapshot can never be restored twice.
        if let Err(e) = self.store.delete_snapshot() {
            tracing::warn!(error = %e, "failed to delete clock snapshot, not restoring");
            return RecoveryOutcome::Discarded {
                reason: e.to_string(),
            };
        }

        let snapshot = match ClockSnapshot::decode(&payload) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable clock snapshot");
                return RecoveryOutcome::Discarded {
                    reason: e.to_string(),
                };
            }
        };

        let restored = Self::fast_forward_to(&snapshot, now);
        tracing::info!(
            background_secs = restored.background_secs,
            from = %snapshot.state.phase(),
            to = %restored.state.phase(),
            "clock restored"
        );
        RecoveryOutcome::Restored(restored)
    }

    /// What `show(now)` would restore, leaving the snapshot in place.
    ///
    /// For readers that must not take over the clock from the process that
    /// owns it.
    pub fn peek(&self, now: DateTime<Utc>) -> Option<Restored> {
        let payload = self.store.load_snapshot().ok().flatten()?;
        let snapshot = ClockSnapshot::decode(&payload).ok()?;
        Some(Self::fast_forward_to(&snapshot, now))
    }

    fn fast_forward_to(snapshot: &ClockSnapshot, now: DateTime<Utc>) -> Restored {
        let (background_secs, resumed_at) = snapshot.background_secs(now);
        let (state, events) = fast_forward(&snapshot.state, background_secs);
        Restored {
            state,
            background_secs,
            resumed_at,
            events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::{DurationConfig, SessionClock, SessionPhase};
    use chrono::Duration;

    fn running_clock() -> SessionClock {
        let mut clock = SessionClock::new(DurationConfig::default());
        clock.select_task(Some("task-1".into()));
        clock.start(Utc::now()).unwrap();
        clock
    }

    #[test]
    fn hide_skips_paused_clock() {
        let layer = RecoveryLayer::new(MemorySnapshotStore::new());
        let mut clock = running_clock();
        clock.pause().unwrap();
        assert!(!layer.hide(clock.state(), Utc::now()).unwrap());
        assert!(!layer.is_pending());
        assert_eq!(layer.show(Utc::now()), RecoveryOutcome::NoSnapshot);
    }

    #[test]
    fn hide_of_paused_clock_clears_stale_snapshot() {
        let layer = RecoveryLayer::new(MemorySnapshotStore::new());
        let mut clock = running_clock();
        layer.hide(clock.state(), Utc::now()).unwrap();
        assert!(layer.is_pending());

        clock.pause().unwrap();
        assert!(!layer.hide(clock.state(), Utc::now()).unwrap());
        assert!(!layer.is_pending());
    }

    #[test]
    fn peek_leaves_snapshot_pending() {
        let layer = RecoveryLayer::new(MemorySnapshotStore::new());
        let clock = running_clock();
        let hidden_at = Utc::now();
        layer.hide(clock.state(), hidden_at).unwrap();

        let peeked = layer.peek(hidden_at + Duration::seconds(30)).unwrap();
        assert_eq!(peeked.state.elapsed_secs(), 30);
        assert!(layer.is_pending());

        let restored = layer
            .show(hidden_at + Duration::seconds(30))
            .restored()
            .unwrap();
        assert_eq!(restored, peeked);
        assert!(layer.peek(hidden_at).is_none());
    }

    #[test]
    fn show_consumes_snapshot_once() {
        let layer = RecoveryLayer::new(MemorySnapshotStore::new());
        let clock = running_clock();
        let hidden_at = Utc::now();
        assert!(layer.hide(clock.state(), hidden_at).unwrap());
        assert!(layer.is_pending());

        let restored = layer
            .show(hidden_at + Duration::seconds(60))
            .restored()
            .unwrap();
        assert_eq!(restored.background_secs, 60);
        assert_eq!(restored.resumed_at, hidden_at + Duration::seconds(60));
        assert_eq!(restored.state.time_left_secs(), 1500 - 60);
        assert_eq!(restored.state.elapsed_secs(), 60);
        assert!(restored.state.is_running());

        assert_eq!(
            layer.show(hidden_at + Duration::seconds(120)),
            RecoveryOutcome::NoSnapshot
        );
    }

    #[test]
    fn show_with_backwards_clock_restores_unchanged() {
        let layer = RecoveryLayer::new(MemorySnapshotStore::new());
        let clock = running_clock();
        let hidden_at = Utc::now();
        layer.hide(clock.state(), hidden_at).unwrap();

        let restored = layer
            .show(hidden_at - Duration::seconds(30))
            .restored()
            .unwrap();
        assert_eq!(restored.background_secs, 0);
        assert_eq!(&restored.state, clock.state());
        assert!(restored.events.is_empty());
    }

    #[test]
    fn corrupt_snapshot_is_discarded() {
        let layer = RecoveryLayer::new(MemorySnapshotStore::with_payload("{\"version\":"));
        assert!(matches!(
            layer.show(Utc::now()),
            RecoveryOutcome::Discarded { .. }
        ));
        assert!(layer.store().peek().is_none());
        assert_eq!(layer.show(Utc::now()), RecoveryOutcome::NoSnapshot);
    }

    #[test]
    fn long_absence_crosses_into_overtime() {
        let layer = RecoveryLayer::new(MemorySnapshotStore::new());
        let clock = running_clock();
        let hidden_at = Utc::now();
        layer.hide(clock.state(), hidden_at).unwrap();

        let restored = layer
            .show(hidden_at + Duration::seconds(1500 + 10 + 45))
            .restored()
            .unwrap();
        assert_eq!(restored.state.phase(), SessionPhase::TaskOvertime);
        assert_eq!(restored.state.overtime_secs(), 45);
        assert!(restored
            .events
            .contains(&ClockEvent::TaskOvertimeStarted { unattended: true }));
    }
}
