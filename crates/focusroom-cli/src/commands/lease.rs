//! Ownership of the session clock across CLI processes.
//!
//! Every `timer` invocation that may change the clock holds the lease for
//! its duration. `timer run` holds it until it exits and renews it with each
//! checkpoint. A lease that has not been renewed for [`LEASE_TTL_SECS`] is
//! presumed dead and may be taken over; the old holder notices on its next
//! renewal and stops without writing.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use focusroom_core::storage::Database;
use focusroom_core::CoreError;

const LEASE_KEY: &str = "clock_lease";
const LEASE_TTL_SECS: i64 = 3;
const ACQUIRE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LeaseRecord {
    token: String,
    pid: u32,
    renewed_at: DateTime<Utc>,
}

impl LeaseRecord {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.renewed_at) < Duration::seconds(LEASE_TTL_SECS)
    }
}

/// A lease this process holds. `payload` is the exact stored value, so
/// renewal and release only succeed while nobody has replaced it.
#[derive(Debug)]
pub struct Lease {
    record: LeaseRecord,
    payload: String,
}

pub enum Acquired {
    Held(Lease),
    /// Another live process holds the clock.
    Busy { pid: Option<u32> },
}

pub fn acquire(db: &Database, now: DateTime<Utc>) -> Result<Acquired, CoreError> {
    let record = LeaseRecord {
        token: uuid::Uuid::new_v4().to_string(),
        pid: std::process::id(),
        renewed_at: now,
    };
    let payload = serde_json::to_string(&record)?;

    for _ in 0..ACQUIRE_ATTEMPTS {
        let current = db.kv_get(LEASE_KEY)?;
        if let Some(existing) = &current {
            match serde_json::from_str::<LeaseRecord>(existing) {
                Ok(holder) if holder.is_live(now) => {
                    return Ok(Acquired::Busy {
                        pid: Some(holder.pid),
                    })
                }
                Ok(holder) => tracing::info!(pid = holder.pid, "taking over stale clock lease"),
                Err(e) => tracing::warn!(error = %e, "replacing unreadable clock lease"),
            }
        }
        if db.kv_compare_and_swap(LEASE_KEY, current.as_deref(), Some(&payload))? {
            return Ok(Acquired::Held(Lease { record, payload }));
        }
    }
    Ok(Acquired::Busy { pid: None })
}

impl Lease {
    /// Extend the lease. `false` means it was taken over and this process no
    /// longer owns the clock.
    pub fn renew(&mut self, db: &Database, now: DateTime<Utc>) -> Result<bool, CoreError> {
        let record = LeaseRecord {
            renewed_at: now,
            ..self.record.clone()
        };
        let payload = serde_json::to_string(&record)?;
        if !db.kv_compare_and_swap(LEASE_KEY, Some(&self.payload), Some(&payload))? {
            return Ok(false);
        }
        self.record = record;
        self.payload = payload;
        Ok(true)
    }

    pub fn release(self, db: &Database) -> Result<(), CoreError> {
        if !db.kv_compare_and_swap(LEASE_KEY, Some(&self.payload), None)? {
            tracing::debug!("clock lease already taken over");
        }
        Ok(())
    }
}
