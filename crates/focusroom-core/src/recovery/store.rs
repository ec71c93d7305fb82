use std::cell::RefCell;

use crate::error::CoreError;
use crate::storage::Database;

/// Well-known key of the single snapshot slot.
pub const SNAPSHOT_KEY: &str = "session_clock_snapshot";

/// Durable single-slot storage for the recovery snapshot.
pub trait SnapshotStore {
    fn load_snapshot(&self) -> Result<Option<String>, CoreError>;

    /// Overwrites any previous snapshot.
    fn save_snapshot(&self, payload: &str) -> Result<(), CoreError>;

    /// Deleting an empty slot is not an error.
    fn delete_snapshot(&self) -> Result<(), CoreError>;
}

impl<T: SnapshotStore + ?Sized> SnapshotStore for &T {
    fn load_snapshot(&self) -> Result<Option<String>, CoreError> {
        (**self).load_snapshot()
    }

    fn save_snapshot(&self, payload: &str) -> Result<(), CoreError> {
        (**self).save_snapshot(payload)
    }

    fn delete_snapshot(&self) -> Result<(), CoreError> {
        (**self).delete_snapshot()
    }
}

impl SnapshotStore for Database {
    fn load_snapshot(&self) -> Result<Option<String>, CoreError> {
        self.kv_get(SNAPSHOT_KEY)
    }

    fn save_snapshot(&self, payload: &str) -> Result<(), CoreError> {
        self.kv_set(SNAPSHOT_KEY, payload)
    }

    fn delete_snapshot(&self) -> Result<(), CoreError> {
        self.kv_delete(SNAPSHOT_KEY)
    }
}

/// In-process snapshot slot, for embedding without a database and for tests.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    slot: RefCell<Option<String>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `payload`.
    pub fn with_payload(payload: impl Into<String>) -> Self {
        Self {
            slot: RefCell::new(Some(payload.into())),
        }
    }

    pub fn peek(&self) -> Option<String> {
        self.slot.borrow().clone()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load_snapshot(&self) -> Result<Option<String>, CoreError> {
        Ok(self.slot.borrow().clone())
    }

    fn save_snapshot(&self, payload: &str) -> Result<(), CoreError> {
        *self.slot.borrow_mut() = Some(payload.to_string());
        Ok(())
    }

    fn delete_snapshot(&self) -> Result<(), CoreError> {
        self.slot.borrow_mut().take();
        Ok(())
    }
}
