//! Core error types for focusroom-core.
//!
//! Clock preconditions are reported through [`ClockRejection`], which is not a
//! fault: the clock state is left untouched. Everything that touches disk or
//! serialization goes through [`CoreError`].

use std::path::PathBuf;
use thiserror::Error;

use crate::timer::SessionPhase;

/// Core error type for focusroom-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Recovery snapshot errors
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),
}

/// Recovery snapshot errors. These never escape `show`; they are logged and
/// the snapshot is treated as absent.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Snapshot is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Snapshot version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// A clock operation whose precondition does not hold.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClockRejection {
    #[error("No active task selected")]
    NoActiveTask,

    #[error("Cannot pause during {phase}")]
    CannotPause { phase: SessionPhase },

    #[error("'{operation}' is not valid during {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: SessionPhase,
    },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) if e.code == rusqlite::ErrorCode::DatabaseBusy => {
                DatabaseError::Locked
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_messages_name_the_phase() {
        let err = ClockRejection::CannotPause {
            phase: SessionPhase::TaskGrace,
        };
        assert_eq!(err.to_string(), "Cannot pause during task_grace");

        let err = ClockRejection::InvalidPhase {
            operation: "skip_break",
            phase: SessionPhase::Focus,
        };
        assert_eq!(err.to_string(), "'skip_break' is not valid during focus");
    }

    #[test]
    fn snapshot_error_wraps_into_core_error() {
        let err: CoreError = SnapshotError::UnsupportedVersion {
            found: 9,
            expected: 1,
        }
        .into();
        assert!(err.to_string().contains("version 9"));
    }
}
