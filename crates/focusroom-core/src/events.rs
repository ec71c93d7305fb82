use serde::{Deserialize, Serialize};

use crate::timer::{BreakKind, SessionPhase};

/// Status written back to the task store when a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Completed,
    Todo,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Completed => "completed",
            TaskStatus::Todo => "todo",
        }
    }
}

/// Every clock transition produces zero or more events.
///
/// The orchestrator turns the logging events into effect callbacks and the
/// rest into user-facing notices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClockEvent {
    TaskSelected {
        task_id: Option<String>,
    },
    FocusStarted {
        duration_secs: u64,
        auto_start: bool,
    },
    Resumed {
        phase: SessionPhase,
        elapsed_secs: u64,
    },
    Paused {
        phase: SessionPhase,
    },
    /// The focus countdown reached zero; the task grace period has begun.
    FocusPhaseEnded {
        pomodoro: u32,
    },
    /// Task grace expired. `unattended` is set when it expired while the
    /// application was hidden.
    TaskOvertimeStarted {
        unattended: bool,
    },
    BreakStarted {
        kind: BreakKind,
        duration_secs: u64,
        auto_start: bool,
    },
    /// The break countdown reached zero; the break grace period has begun.
    BreakPhaseEnded {
        duration_secs: u64,
    },
    BreakOvertimeStarted {
        unattended: bool,
    },
    FocusSessionEnded {
        task_id: Option<String>,
        total_secs: u64,
    },
    Interrupted {
        task_id: Option<String>,
        total_secs: u64,
    },
    BreakCompleted {
        task_id: Option<String>,
        total_secs: u64,
    },
    TaskStatusChanged {
        task_id: String,
        status: TaskStatus,
    },
    Reset,
}
