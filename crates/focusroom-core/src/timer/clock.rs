//! Session clock implementation.
//!
//! The session clock is a tick-driven state machine. It does not use internal
//! threads or read the wall clock - the caller invokes `tick()` once per second
//! and passes `now` to the few transitions that record an anchor time.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Focus -> TaskGrace -> TaskOvertime
//!           \________\______________\--(skip to break)--> Break -> BreakGrace -> BreakOvertime
//!                                                           \_______\______________\--(skip break)--> Focus
//! ```
//!
//! Reset, complete and cancel return to `Idle` from anywhere.
//!
//! ## Usage
//!
//! ```ignore
//! let mut clock = SessionClock::new(DurationConfig::default());
//! clock.select_task(Some("task-1".into()));
//! clock.start(Utc::now())?;
//! // Once per second:
//! let events = clock.tick();
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::phase::{SessionPhase, BREAK_GRACE_SECS, TASK_GRACE_SECS};
use super::schedule::DurationConfig;
use crate::error::ClockRejection;
use crate::events::{ClockEvent, TaskStatus};

/// Result of a clock transition.
pub type Transition = Result<Vec<ClockEvent>, ClockRejection>;

/// Complete, self-describing state of the session clock.
///
/// Only the clock mutates this value; everyone else reads it through the
/// accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ClockState {
    pub(crate) phase: SessionPhase,
    pub(crate) time_left_secs: u64,
    pub(crate) total_duration_secs: u64,
    pub(crate) elapsed_secs: u64,
    pub(crate) pomodoro_count: u32,
    pub(crate) grace_time_left_secs: u64,
    pub(crate) overtime_secs: u64,
    #[serde(default)]
    pub(crate) last_nominal_break_secs: Option<u64>,
    pub(crate) is_running: bool,
    #[serde(default)]
    pub(crate) active_task_id: Option<String>,
    /// The focus phase before the current break reached its nominal end.
    #[serde(default)]
    pub(crate) full_pomodoro: bool,
    /// Origin of the elapsed-time count (`now - elapsed` at the last start).
    #[serde(default)]
    pub(crate) focus_started_at: Option<DateTime<Utc>>,
}

impl ClockState {
    /// Idle defaults, optionally still attached to a task.
    pub fn idle(active_task_id: Option<String>) -> Self {
        Self {
            active_task_id,
            ..Self::default()
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn time_left_secs(&self) -> u64 {
        self.time_left_secs
    }

    pub fn total_duration_secs(&self) -> u64 {
        self.total_duration_secs
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    pub fn pomodoro_count(&self) -> u32 {
        self.pomodoro_count
    }

    pub fn grace_time_left_secs(&self) -> u64 {
        self.grace_time_left_secs
    }

    pub fn overtime_secs(&self) -> u64 {
        self.overtime_secs
    }

    pub fn last_nominal_break_secs(&self) -> Option<u64> {
        self.last_nominal_break_secs
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn active_task_id(&self) -> Option<&str> {
        self.active_task_id.as_deref()
    }

    pub fn focus_started_at(&self) -> Option<DateTime<Utc>> {
        self.focus_started_at
    }

    /// Overtime that belongs to the task (zero outside `TaskOvertime`).
    pub fn task_overtime_secs(&self) -> u64 {
        if self.phase == SessionPhase::TaskOvertime {
            self.overtime_secs
        } else {
            0
        }
    }

    /// Time worked on the task in the current focus phase, overtime included.
    pub fn focus_total_secs(&self) -> u64 {
        self.elapsed_secs.saturating_add(self.task_overtime_secs())
    }

    /// Whether time is accruing: the nominal countdown runs, or a grace or
    /// overtime phase is active.
    pub fn is_accruing(&self) -> bool {
        self.is_running || self.phase.always_runs()
    }

    /// 0.0 .. 1.0 progress within the current nominal countdown.
    pub fn progress(&self) -> f64 {
        if self.total_duration_secs == 0 {
            return 0.0;
        }
        1.0 - (self.time_left_secs as f64 / self.total_duration_secs as f64)
    }

    // ── Phase-end handlers ───────────────────────────────────────────
    //
    // Shared by the tick loop and by fast-forward so both take exactly the
    // same path through a phase boundary.

    pub(crate) fn end_focus_phase(&mut self, events: &mut Vec<ClockEvent>) {
        self.phase = SessionPhase::TaskGrace;
        self.time_left_secs = 0;
        self.grace_time_left_secs = TASK_GRACE_SECS;
        self.is_running = false;
        self.full_pomodoro = true;
        events.push(ClockEvent::FocusPhaseEnded {
            pomodoro: self.pomodoro_count.saturating_add(1),
        });
    }

    pub(crate) fn end_break_phase(&mut self, events: &mut Vec<ClockEvent>) {
        self.phase = SessionPhase::BreakGrace;
        self.time_left_secs = 0;
        self.grace_time_left_secs = BREAK_GRACE_SECS;
        self.last_nominal_break_secs = Some(self.total_duration_secs);
        self.is_running = false;
        events.push(ClockEvent::BreakPhaseEnded {
            duration_secs: self.total_duration_secs,
        });
    }

    /// Grace expired: enter the matching overtime phase with `overtime_secs`
    /// already accrued.
    pub(crate) fn enter_overtime(
        &mut self,
        overtime_secs: u64,
        unattended: bool,
        events: &mut Vec<ClockEvent>,
    ) {
        let task = self.phase == SessionPhase::TaskGrace;
        self.phase = if task {
            SessionPhase::TaskOvertime
        } else {
            SessionPhase::BreakOvertime
        };
        self.grace_time_left_secs = 0;
        self.time_left_secs = 0;
        self.overtime_secs = overtime_secs;
        self.is_running = true;
        events.push(if task {
            ClockEvent::TaskOvertimeStarted { unattended }
        } else {
            ClockEvent::BreakOvertimeStarted { unattended }
        });
    }
}

/// A single input to the clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockCommand {
    Tick,
    Start,
    Pause,
    Reset,
    SkipToBreak { auto_start: bool },
    SkipBreak { auto_start: bool },
    CompleteTask,
    CancelTask,
    SelectTask { task_id: Option<String> },
}

/// Focus/break state machine.
///
/// Owns its [`ClockState`] exclusively; every mutation goes through one of the
/// transition methods below.
#[derive(Debug, Clone)]
pub struct SessionClock {
    state: ClockState,
    durations: DurationConfig,
}

impl SessionClock {
    /// Create an idle clock with no task attached.
    pub fn new(durations: DurationConfig) -> Self {
        Self {
            state: ClockState::default(),
            durations,
        }
    }

    /// Rebuild a clock around previously persisted state.
    pub fn from_state(state: ClockState, durations: DurationConfig) -> Self {
        Self { state, durations }
    }

    pub fn state(&self) -> &ClockState {
        &self.state
    }

    pub fn durations(&self) -> &DurationConfig {
        &self.durations
    }

    /// Replace the nominal durations. Applies from the next phase entered.
    pub fn set_durations(&mut self, durations: DurationConfig) {
        self.durations = durations;
    }

    /// Replace the whole state (used by recovery).
    pub(crate) fn replace_state(&mut self, state: ClockState) {
        self.state = state;
    }

    /// Dispatch a command to the matching transition.
    pub fn apply(&mut self, command: ClockCommand, now: DateTime<Utc>) -> Transition {
        match command {
            ClockCommand::Tick => Ok(self.tick()),
            ClockCommand::Start => self.start(now),
            ClockCommand::Pause => self.pause(),
            ClockCommand::Reset => Ok(self.reset()),
            ClockCommand::SkipToBreak { auto_start } => self.skip_to_break(auto_start),
            ClockCommand::SkipBreak { auto_start } => self.skip_break(auto_start, now),
            ClockCommand::CompleteTask => self.complete_task(),
            ClockCommand::CancelTask => self.cancel_task(),
            ClockCommand::SelectTask { task_id } => Ok(self.select_task(task_id)),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Attach the clock to a task. A different task (or none) hard-resets
    /// every counter; the same task is a no-op.
    pub fn select_task(&mut self, task_id: Option<String>) -> Vec<ClockEvent> {
        if task_id == self.state.active_task_id {
            return Vec::new();
        }
        tracing::debug!(from = ?self.state.active_task_id, to = ?task_id, "switching task");
        self.state = ClockState::idle(task_id.clone());
        let mut events = vec![ClockEvent::TaskSelected {
            task_id: task_id.clone(),
        }];
        if task_id.is_some() {
            self.enter_focus(false, None, &mut events);
        }
        events
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Transition {
        match self.state.phase {
            // Pressing start during the grace countdown means "begin my break now".
            SessionPhase::TaskGrace => return self.skip_to_break(true),
            SessionPhase::BreakGrace | SessionPhase::BreakOvertime => {
                return self.skip_break(true, now)
            }
            _ => {}
        }
        self.require_task()?;

        let mut events = Vec::new();
        match self.state.phase {
            SessionPhase::Idle => self.enter_focus(true, Some(now), &mut events),
            SessionPhase::Focus | SessionPhase::Break => {
                if self.state.is_running {
                    return Ok(events);
                }
                self.state.is_running = true;
                if self.state.phase == SessionPhase::Focus {
                    self.state.focus_started_at =
                        Some(now - Duration::seconds(clamp_secs(self.state.elapsed_secs)));
                }
                events.push(ClockEvent::Resumed {
                    phase: self.state.phase,
                    elapsed_secs: self.state.elapsed_secs,
                });
            }
            // Overtime already runs.
            _ => self.state.is_running = true,
        }
        Ok(events)
    }

    pub fn pause(&mut self) -> Transition {
        let phase = self.state.phase;
        if phase.always_runs() {
            return Err(ClockRejection::CannotPause { phase });
        }
        if !self.state.is_running {
            return Ok(Vec::new());
        }
        self.state.is_running = false;

        let mut events = vec![ClockEvent::Paused { phase }];
        let total = self.state.focus_total_secs();
        if phase == SessionPhase::Focus && total > 0 {
            events.push(ClockEvent::Interrupted {
                task_id: self.state.active_task_id.clone(),
                total_secs: total,
            });
        }
        Ok(events)
    }

    /// Back to idle defaults. Accumulated time is discarded, not logged.
    pub fn reset(&mut self) -> Vec<ClockEvent> {
        let task = self.state.active_task_id.take();
        self.state = ClockState::idle(task);
        vec![ClockEvent::Reset]
    }

    pub fn skip_to_break(&mut self, auto_start: bool) -> Transition {
        self.require_task()?;
        if !self.state.phase.is_focus_family() {
            return Err(ClockRejection::InvalidPhase {
                operation: "skip_to_break",
                phase: self.state.phase,
            });
        }

        let mut events = Vec::new();
        let total = self.state.focus_total_secs();
        if total > 0 {
            events.push(ClockEvent::FocusSessionEnded {
                task_id: self.state.active_task_id.clone(),
                total_secs: total,
            });
        }

        let kind = self
            .durations
            .break_kind_after(self.state.pomodoro_count.saturating_add(1));
        let secs = self.durations.break_secs(kind);

        let state = &mut self.state;
        state.phase = SessionPhase::Break;
        state.time_left_secs = secs;
        state.total_duration_secs = secs;
        state.elapsed_secs = 0;
        state.grace_time_left_secs = 0;
        state.overtime_secs = 0;
        state.last_nominal_break_secs = None;
        state.is_running = auto_start;
        state.focus_started_at = None;

        events.push(ClockEvent::BreakStarted {
            kind,
            duration_secs: secs,
            auto_start,
        });
        Ok(events)
    }

    pub fn skip_break(&mut self, auto_start: bool, now: DateTime<Utc>) -> Transition {
        if !self.state.phase.is_break_family() {
            return Err(ClockRejection::InvalidPhase {
                operation: "skip_break",
                phase: self.state.phase,
            });
        }

        let mut events = Vec::new();
        let taken = match self.state.last_nominal_break_secs {
            Some(nominal) => nominal.saturating_add(self.state.overtime_secs),
            // Skipped before the nominal countdown ended.
            None => self
                .state
                .total_duration_secs
                .saturating_sub(self.state.time_left_secs),
        };
        if taken > 0 {
            events.push(ClockEvent::BreakCompleted {
                task_id: self.state.active_task_id.clone(),
                total_secs: taken,
            });
        }

        if self.state.full_pomodoro {
            self.state.pomodoro_count = self.state.pomodoro_count.saturating_add(1);
        }
        self.state.full_pomodoro = false;
        self.enter_focus(auto_start, Some(now), &mut events);
        Ok(events)
    }

    pub fn complete_task(&mut self) -> Transition {
        self.finish_task(TaskStatus::Completed)
    }

    pub fn cancel_task(&mut self) -> Transition {
        self.finish_task(TaskStatus::Todo)
    }

    /// Advance one second. Matches on the phase and applies exactly one rule.
    pub fn tick(&mut self) -> Vec<ClockEvent> {
        let mut events = Vec::new();
        let state = &mut self.state;
        match state.phase {
            SessionPhase::Idle => {}
            SessionPhase::Focus | SessionPhase::Break if !state.is_running => {}
            SessionPhase::Focus => {
                if state.time_left_secs > 0 {
                    state.time_left_secs -= 1;
                    state.elapsed_secs += 1;
                }
                if state.time_left_secs == 0 {
                    state.end_focus_phase(&mut events);
                }
            }
            SessionPhase::Break => {
                state.time_left_secs = state.time_left_secs.saturating_sub(1);
                if state.time_left_secs == 0 {
                    state.end_break_phase(&mut events);
                }
            }
            SessionPhase::TaskGrace | SessionPhase::BreakGrace => {
                state.grace_time_left_secs = state.grace_time_left_secs.saturating_sub(1);
                if state.grace_time_left_secs == 0 {
                    state.enter_overtime(0, false, &mut events);
                }
            }
            SessionPhase::TaskOvertime | SessionPhase::BreakOvertime => {
                state.overtime_secs = state.overtime_secs.saturating_add(1);
            }
        }
        events
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Start and skip-to-break need a task unless grace or overtime is still
    /// running from a previous one.
    fn require_task(&self) -> Result<(), ClockRejection> {
        if self.state.active_task_id.is_none() && !self.state.phase.always_runs() {
            return Err(ClockRejection::NoActiveTask);
        }
        Ok(())
    }

    fn enter_focus(
        &mut self,
        auto_start: bool,
        now: Option<DateTime<Utc>>,
        events: &mut Vec<ClockEvent>,
    ) {
        let secs = self.durations.focus_secs;
        let state = &mut self.state;
        state.phase = SessionPhase::Focus;
        state.time_left_secs = secs;
        state.total_duration_secs = secs;
        state.elapsed_secs = 0;
        state.grace_time_left_secs = 0;
        state.overtime_secs = 0;
        state.last_nominal_break_secs = None;
        state.is_running = auto_start;
        state.focus_started_at = if auto_start { now } else { None };
        events.push(ClockEvent::FocusStarted {
            duration_secs: secs,
            auto_start,
        });
    }

    fn finish_task(&mut self, status: TaskStatus) -> Transition {
        let Some(task_id) = self.state.active_task_id.clone() else {
            return Err(ClockRejection::NoActiveTask);
        };

        let mut events = Vec::new();
        let total = self.state.focus_total_secs();
        if total > 0 {
            let task_id = Some(task_id.clone());
            events.push(match status {
                TaskStatus::Completed => ClockEvent::FocusSessionEnded {
                    task_id,
                    total_secs: total,
                },
                TaskStatus::Todo => ClockEvent::Interrupted {
                    task_id,
                    total_secs: total,
                },
            });
        }
        events.push(ClockEvent::TaskStatusChanged { task_id, status });
        self.state = ClockState::idle(None);
        Ok(events)
    }
}

fn clamp_secs(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}
