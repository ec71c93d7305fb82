//! # Focusroom Core Library
//!
//! Core logic for the Focusroom focus-session timer. Every operation is
//! available through the standalone CLI binary; any GUI is meant to be a thin
//! layer over this same library.
//!
//! ## Architecture
//!
//! - **Session Clock**: a wall-clock-free state machine over focus, break,
//!   grace and overtime phases. The caller drives it with `tick()`.
//! - **Recovery**: snapshot on hide, fast-forward on show, so time spent in
//!   the background is accounted for exactly.
//! - **Session Orchestrator**: binds the clock to the active task, fires
//!   effect callbacks and turns clock events into notices.
//! - **Storage**: SQLite time logs and key/value state, TOML configuration.
//!
//! ## Key Components
//!
//! - [`SessionClock`]: focus/break state machine
//! - [`SessionOrchestrator`]: clock + task + effects + recovery
//! - [`RecoveryLayer`]: hide/show snapshot handling
//! - [`Database`]: time log and state persistence
//! - [`Config`]: application configuration management

pub mod error;
pub mod events;
pub mod recovery;
pub mod session;
pub mod storage;
pub mod timer;

pub use error::{ClockRejection, ConfigError, CoreError, DatabaseError, SnapshotError};
pub use events::{ClockEvent, TaskStatus};
pub use recovery::{
    ClockSnapshot, MemorySnapshotStore, RecoveryLayer, RecoveryOutcome, Restored, SnapshotStore,
};
pub use session::{
    ActiveTask, EffectFailure, NoEffects, Notice, NoticeLevel, Report, SessionEffects,
    SessionOrchestrator,
};
pub use storage::{Config, Database, Stats, TimeLog, TimeLogKind};
pub use timer::{
    fast_forward, BreakKind, ClockCommand, ClockState, DurationConfig, SessionClock,
    SessionPhase, Transition,
};
