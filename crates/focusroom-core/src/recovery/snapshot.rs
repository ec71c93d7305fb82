use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;
use crate::timer::ClockState;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Clock state captured when the application is hidden.
///
/// Self-describing: restoring it needs nothing from the process that wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockSnapshot {
    pub version: u32,
    pub captured_at: DateTime<Utc>,
    pub state: ClockState,
}

impl ClockSnapshot {
    /// Capture `state` if time is accruing; a paused or idle clock needs no
    /// snapshot.
    pub fn capture(state: &ClockState, now: DateTime<Utc>) -> Option<Self> {
        state.is_accruing().then(|| Self {
            version: SNAPSHOT_VERSION,
            captured_at: now,
            state: state.clone(),
        })
    }

    pub fn encode(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(payload: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(payload)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(snapshot)
    }

    /// Whole seconds between capture and `now`, and the instant those
    /// seconds end at. The sub-second remainder lies between that instant and
    /// `now`; stamping the next snapshot with it keeps the remainder.
    ///
    /// A clock that moved backwards counts as no time at all and re-anchors
    /// at `now`.
    pub fn background_secs(&self, now: DateTime<Utc>) -> (u64, DateTime<Utc>) {
        let whole = (now - self.captured_at).num_seconds();
        match u64::try_from(whole) {
            Ok(secs) if now >= self.captured_at => {
                (secs, self.captured_at + Duration::seconds(whole))
            }
            _ => (0, now),
        }
    }
}
