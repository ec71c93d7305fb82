use chrono::{DateTime, Utc};
use serde::Serialize;

use super::effects::SessionEffects;
use super::notice::{notice_for, Notice};
use super::ActiveTask;
use crate::error::{ClockRejection, CoreError};
use crate::events::ClockEvent;
use crate::recovery::{RecoveryLayer, RecoveryOutcome, SnapshotStore};
use crate::timer::{ClockCommand, ClockState, DurationConfig, SessionClock};

/// An effect callback that returned an error. Advisory only: the clock
/// transition that caused it has already been committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectFailure {
    pub callback: &'static str,
    pub task_id: Option<String>,
    pub message: String,
}

/// Everything one orchestrator call produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    pub events: Vec<ClockEvent>,
    pub notices: Vec<Notice>,
    pub effect_failures: Vec<EffectFailure>,
    /// Seconds fast-forwarded by a restore performed during this call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restored_secs: Option<u64>,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.notices.is_empty() && self.effect_failures.is_empty()
    }

    /// Append `other`, keeping event order.
    pub fn merge(&mut self, other: Report) {
        self.events.extend(other.events);
        self.notices.extend(other.notices);
        self.effect_failures.extend(other.effect_failures);
        if let Some(secs) = other.restored_secs {
            *self.restored_secs.get_or_insert(0) += secs;
        }
    }
}

/// Ties the clock to the active task, the effect callbacks and the
/// recovery snapshot.
///
/// All mutation goes through `&mut self`, so transitions never interleave.
pub struct SessionOrchestrator<E, S> {
    clock: SessionClock,
    task: Option<ActiveTask>,
    effects: E,
    recovery: RecoveryLayer<S>,
    sound_enabled: bool,
    hidden: bool,
    /// Wall-clock instant the clock state was last fast-forwarded to, while
    /// nothing has changed it since. Snapshots are stamped with it so the
    /// sub-second remainder of a restore is not lost.
    synced_at: Option<DateTime<Utc>>,
}

impl<E: SessionEffects, S: SnapshotStore> SessionOrchestrator<E, S> {
    pub fn new(durations: DurationConfig, effects: E, store: S) -> Self {
        Self {
            clock: SessionClock::new(durations),
            task: None,
            effects,
            recovery: RecoveryLayer::new(store),
            sound_enabled: true,
            hidden: false,
            synced_at: None,
        }
    }

    /// Resume from persisted state. A task that does not match the state's
    /// active task id is dropped.
    pub fn with_state(
        state: ClockState,
        task: Option<ActiveTask>,
        durations: DurationConfig,
        effects: E,
        store: S,
    ) -> Self {
        let task = task.filter(|t| state.active_task_id() == Some(t.id.as_str()));
        Self {
            clock: SessionClock::from_state(state, durations),
            task,
            effects,
            recovery: RecoveryLayer::new(store),
            sound_enabled: true,
            hidden: false,
            synced_at: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &ClockState {
        self.clock.state()
    }

    pub fn active_task(&self) -> Option<&ActiveTask> {
        self.task.as_ref()
    }

    /// Whether a hide snapshot is outstanding.
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    // ── Settings ─────────────────────────────────────────────────────

    pub fn set_durations(&mut self, durations: DurationConfig) {
        self.clock.set_durations(durations);
    }

    pub fn set_sound_enabled(&mut self, enabled: bool) {
        self.sound_enabled = enabled;
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Switch to `task`. Re-selecting the current task only refreshes its
    /// title; any other change hard-resets the clock.
    pub fn select_task(&mut self, task: Option<ActiveTask>) -> Report {
        let mut report = self.prepare(Utc::now());
        let before = self.clock.state().clone();
        let task_id = task.as_ref().map(|t| t.id.clone());
        self.task = task;
        let events = self.clock.select_task(task_id);
        self.settle(&before);
        self.dispatch(events, &mut report);
        report
    }

    pub fn start(&mut self) -> Result<Report, ClockRejection> {
        self.run(ClockCommand::Start)
    }

    pub fn pause(&mut self) -> Result<Report, ClockRejection> {
        self.run(ClockCommand::Pause)
    }

    pub fn reset(&mut self) -> Report {
        let mut report = self.prepare(Utc::now());
        let before = self.clock.state().clone();
        let events = self.clock.reset();
        self.settle(&before);
        self.dispatch(events, &mut report);
        report
    }

    pub fn skip_to_break(&mut self, auto_start: bool) -> Result<Report, ClockRejection> {
        self.run(ClockCommand::SkipToBreak { auto_start })
    }

    pub fn skip_break(&mut self, auto_start: bool) -> Result<Report, ClockRejection> {
        self.run(ClockCommand::SkipBreak { auto_start })
    }

    pub fn complete_task(&mut self) -> Result<Report, ClockRejection> {
        let report = self.run(ClockCommand::CompleteTask)?;
        self.task = None;
        Ok(report)
    }

    pub fn cancel_task(&mut self) -> Result<Report, ClockRejection> {
        let report = self.run(ClockCommand::CancelTask)?;
        self.task = None;
        Ok(report)
    }

    /// One second of foreground time. Ignored while hidden: the snapshot
    /// already accounts for that time.
    pub fn tick(&mut self) -> Report {
        let mut report = Report::default();
        if self.hidden {
            tracing::trace!("tick ignored while hidden");
            return report;
        }
        self.synced_at = None;
        let events = self.clock.tick();
        self.dispatch(events, &mut report);
        report
    }

    /// Apply `secs` seconds the tick loop missed (process suspended while in
    /// the foreground).
    pub fn catch_up(&mut self, secs: u64) -> Report {
        let mut report = Report::default();
        if self.hidden || secs == 0 {
            return report;
        }
        tracing::debug!(secs, "catching up missed ticks");
        self.synced_at = None;
        let events = self.clock.fast_forward(secs);
        self.dispatch(events, &mut report);
        report
    }

    /// Application went to the background.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written; the clock is then
    /// left visible so ticks keep advancing it.
    pub fn hide(&mut self, now: DateTime<Utc>) -> Result<bool, CoreError> {
        let written = self.recovery.hide(self.clock.state(), self.stamp(now))?;
        self.hidden = written;
        self.synced_at = None;
        Ok(written)
    }

    /// Write a snapshot of the current state while staying in the
    /// foreground, so another process can pick the clock up if this one
    /// dies. Ticks keep advancing the clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub fn checkpoint(&self, now: DateTime<Utc>) -> Result<bool, CoreError> {
        self.recovery.hide(self.clock.state(), self.stamp(now))
    }

    /// Application came back to the foreground. Consumes any pending
    /// snapshot, including one left by another process.
    pub fn show(&mut self, now: DateTime<Utc>) -> Report {
        let mut report = Report::default();
        self.restore_into(now, &mut report);
        report
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn run(&mut self, command: ClockCommand) -> Result<Report, ClockRejection> {
        let now = Utc::now();
        let mut report = self.prepare(now);
        let before = self.clock.state().clone();
        let events = self.clock.apply(command, now)?;
        self.settle(&before);
        self.dispatch(events, &mut report);
        Ok(report)
    }

    /// Forget the sync instant once a transition changed the state.
    fn settle(&mut self, before: &ClockState) {
        if self.clock.state() != before {
            self.synced_at = None;
        }
    }

    fn stamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.synced_at.filter(|at| *at <= now).unwrap_or(now)
    }

    /// User transitions always act on restored state.
    fn prepare(&mut self, now: DateTime<Utc>) -> Report {
        let mut report = Report::default();
        if self.hidden {
            self.restore_into(now, &mut report);
        }
        report
    }

    fn restore_into(&mut self, now: DateTime<Utc>, report: &mut Report) {
        self.hidden = false;
        if let RecoveryOutcome::Restored(restored) = self.recovery.show(now) {
            if restored.state.active_task_id() != self.task.as_ref().map(|t| t.id.as_str()) {
                self.task = None;
            }
            self.clock.replace_state(restored.state);
            self.synced_at = Some(restored.resumed_at);
            report.restored_secs = Some(restored.background_secs);
            self.dispatch(restored.events, report);
        }
    }

    fn dispatch(&mut self, events: Vec<ClockEvent>, report: &mut Report) {
        for event in events {
            if let Some(failure) = self.fire_effect(&event) {
                tracing::warn!(
                    callback = failure.callback,
                    error = %failure.message,
                    "session effect failed"
                );
                report.effect_failures.push(failure);
            }
            if let Some(notice) = notice_for(&event, self.task.as_ref(), self.sound_enabled) {
                report.notices.push(notice);
            }
            report.events.push(event);
        }
    }

    fn fire_effect(&self, event: &ClockEvent) -> Option<EffectFailure> {
        let (callback, task_id, result) = match event {
            ClockEvent::FocusSessionEnded {
                task_id,
                total_secs,
            } => (
                "on_focus_session_end",
                task_id.clone(),
                self.effects
                    .on_focus_session_end(task_id.as_deref(), *total_secs),
            ),
            ClockEvent::Interrupted {
                task_id,
                total_secs,
            } => (
                "on_interruption",
                task_id.clone(),
                self.effects.on_interruption(task_id.as_deref(), *total_secs),
            ),
            ClockEvent::BreakCompleted {
                task_id,
                total_secs,
            } => (
                "on_break_completed",
                task_id.clone(),
                self.effects
                    .on_break_completed(task_id.as_deref(), *total_secs),
            ),
            ClockEvent::TaskStatusChanged { task_id, status } => (
                "on_task_status_change",
                Some(task_id.clone()),
                self.effects.on_task_status_change(task_id, *status),
            ),
            _ => return None,
        };
        result.err().map(|e| EffectFailure {
            callback,
            task_id,
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TaskStatus;
    use crate::recovery::{ClockSnapshot, MemorySnapshotStore};
    use crate::session::{NoEffects, NoticeLevel};
    use crate::timer::SessionPhase;
    use chrono::Duration;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<String>>,
        fail: bool,
    }

    impl SessionEffects for Recorder {
        fn on_focus_session_end(
            &self,
            task_id: Option<&str>,
            secs: u64,
        ) -> Result<(), Box<dyn std::error::Error>> {
            self.calls
                .borrow_mut()
                .push(format!("focus:{}:{secs}", task_id.unwrap_or("-")));
            if self.fail {
                return Err("journal offline".into());
            }
            Ok(())
        }

        fn on_interruption(
            &self,
            task_id: Option<&str>,
            secs: u64,
        ) -> Result<(), Box<dyn std::error::Error>> {
            self.calls
                .borrow_mut()
                .push(format!("interruption:{}:{secs}", task_id.unwrap_or("-")));
            Ok(())
        }

        fn on_task_status_change(
            &self,
            task_id: &str,
            status: TaskStatus,
        ) -> Result<(), Box<dyn std::error::Error>> {
            self.calls
                .borrow_mut()
                .push(format!("status:{task_id}:{}", status.as_str()));
            Ok(())
        }
    }

    fn durations() -> DurationConfig {
        DurationConfig::from_minutes(25, 5, 15)
    }

    fn task(id: &str) -> ActiveTask {
        ActiveTask {
            id: id.into(),
            title: format!("Task {id}"),
        }
    }

    #[test]
    fn start_requires_task() {
        let mut orch = SessionOrchestrator::new(durations(), NoEffects, MemorySnapshotStore::new());
        assert_eq!(orch.start(), Err(ClockRejection::NoActiveTask));
        assert_eq!(orch.state().phase(), SessionPhase::Idle);
    }

    #[test]
    fn pause_reports_interruption() {
        let recorder = Recorder::default();
        let mut orch = SessionOrchestrator::new(durations(), &recorder, MemorySnapshotStore::new());
        orch.select_task(Some(task("a")));
        orch.start().unwrap();
        for _ in 0..90 {
            orch.tick();
        }
        let report = orch.pause().unwrap();
        assert!(report.effect_failures.is_empty());
        assert_eq!(*recorder.calls.borrow(), vec!["interruption:a:90"]);

        // A second pause is a no-op.
        orch.pause().unwrap();
        assert_eq!(recorder.calls.borrow().len(), 1);
    }

    #[test]
    fn failing_effect_keeps_transition() {
        let recorder = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let mut orch = SessionOrchestrator::new(durations(), &recorder, MemorySnapshotStore::new());
        orch.select_task(Some(task("a")));
        orch.start().unwrap();
        for _ in 0..30 {
            orch.tick();
        }
        let report = orch.complete_task().unwrap();
        assert_eq!(report.effect_failures.len(), 1);
        assert_eq!(report.effect_failures[0].callback, "on_focus_session_end");
        assert_eq!(report.effect_failures[0].message, "journal offline");
        assert_eq!(orch.state().phase(), SessionPhase::Idle);
        assert!(orch.active_task().is_none());
        assert_eq!(
            *recorder.calls.borrow(),
            vec!["focus:a:30", "status:a:completed"]
        );
    }

    #[test]
    fn reselecting_same_task_keeps_progress() {
        let mut orch = SessionOrchestrator::new(durations(), NoEffects, MemorySnapshotStore::new());
        orch.select_task(Some(task("a")));
        orch.start().unwrap();
        orch.tick();
        let report = orch.select_task(Some(ActiveTask {
            id: "a".into(),
            title: "Renamed".into(),
        }));
        assert!(report.events.is_empty());
        assert_eq!(orch.state().elapsed_secs(), 1);
        assert_eq!(orch.active_task().unwrap().title, "Renamed");

        orch.select_task(Some(task("b")));
        assert_eq!(orch.state().elapsed_secs(), 0);
        assert!(!orch.state().is_running());
    }

    #[test]
    fn ticks_are_ignored_while_hidden() {
        let mut orch = SessionOrchestrator::new(durations(), NoEffects, MemorySnapshotStore::new());
        orch.select_task(Some(task("a")));
        orch.start().unwrap();
        let hidden_at = Utc::now();
        assert!(orch.hide(hidden_at).unwrap());
        assert!(orch.is_hidden());

        for _ in 0..5 {
            assert!(orch.tick().is_empty());
        }
        assert_eq!(orch.state().elapsed_secs(), 0);

        let report = orch.show(hidden_at + Duration::seconds(120));
        assert_eq!(report.restored_secs, Some(120));
        assert!(!orch.is_hidden());
        assert_eq!(orch.state().elapsed_secs(), 120);
        assert_eq!(orch.state().time_left_secs(), 1500 - 120);
    }

    #[test]
    fn user_transition_restores_first() {
        let recorder = Recorder::default();
        let mut orch = SessionOrchestrator::new(durations(), &recorder, MemorySnapshotStore::new());
        orch.select_task(Some(task("a")));
        orch.start().unwrap();
        orch.hide(Utc::now() - Duration::seconds(600)).unwrap();

        let report = orch.pause().unwrap();
        let restored = report.restored_secs.unwrap();
        assert!((600..=601).contains(&restored));
        assert!(!orch.is_hidden());
        assert_eq!(orch.state().elapsed_secs(), restored);
        assert_eq!(
            *recorder.calls.borrow(),
            vec![format!("interruption:a:{restored}")]
        );
    }

    #[test]
    fn frequent_show_hide_cycles_keep_sub_second_time() {
        let mut orch = SessionOrchestrator::new(durations(), NoEffects, MemorySnapshotStore::new());
        orch.select_task(Some(task("a")));
        orch.start().unwrap();
        let started = Utc::now();
        orch.hide(started).unwrap();

        let mut now = started;
        for _ in 0..100 {
            now += Duration::milliseconds(600);
            orch.show(now);
            orch.hide(now).unwrap();
        }
        orch.show(now);
        assert_eq!(orch.state().elapsed_secs(), 60);
        assert_eq!(orch.state().time_left_secs(), 1500 - 60);
    }

    #[test]
    fn hide_after_restore_keeps_remainder_in_stamp() {
        let store = MemorySnapshotStore::new();
        let mut orch = SessionOrchestrator::new(durations(), NoEffects, &store);
        orch.select_task(Some(task("a")));
        orch.start().unwrap();
        let hidden_at = Utc::now();
        orch.hide(hidden_at).unwrap();

        orch.show(hidden_at + Duration::milliseconds(2_700));
        assert_eq!(orch.state().elapsed_secs(), 2);
        orch.hide(hidden_at + Duration::milliseconds(2_700)).unwrap();
        let snapshot = ClockSnapshot::decode(&store.peek().unwrap()).unwrap();
        assert_eq!(snapshot.captured_at, hidden_at + Duration::seconds(2));

        // A tick moves the state past the restore, so the next stamp is the
        // current time again.
        orch.show(hidden_at + Duration::milliseconds(3_100));
        orch.tick();
        let now = hidden_at + Duration::milliseconds(3_200);
        orch.hide(now).unwrap();
        let snapshot = ClockSnapshot::decode(&store.peek().unwrap()).unwrap();
        assert_eq!(snapshot.captured_at, now);
    }

    #[test]
    fn checkpoint_keeps_ticking() {
        let store = MemorySnapshotStore::new();
        let mut orch = SessionOrchestrator::new(durations(), NoEffects, &store);
        orch.select_task(Some(task("a")));
        orch.start().unwrap();
        let now = Utc::now();
        assert!(orch.checkpoint(now).unwrap());
        assert!(!orch.is_hidden());
        orch.tick();
        assert_eq!(orch.state().elapsed_secs(), 1);

        // Another process picking up the checkpoint starts from its state.
        let mut other = SessionOrchestrator::new(durations(), NoEffects, &store);
        let report = other.show(now + Duration::seconds(5));
        assert_eq!(report.restored_secs, Some(5));
        assert_eq!(other.state().elapsed_secs(), 5);
        assert!(store.peek().is_none());
    }

    #[test]
    fn unattended_overtime_produces_warning() {
        let mut orch = SessionOrchestrator::new(
            DurationConfig::from_minutes(1, 1, 1),
            NoEffects,
            MemorySnapshotStore::new(),
        );
        orch.select_task(Some(task("a")));
        orch.start().unwrap();
        let hidden_at = Utc::now();
        orch.hide(hidden_at).unwrap();

        let report = orch.show(hidden_at + Duration::seconds(60 + 10 + 5));
        assert_eq!(orch.state().phase(), SessionPhase::TaskOvertime);
        assert_eq!(orch.state().overtime_secs(), 5);
        assert!(report
            .notices
            .iter()
            .any(|n| n.level == NoticeLevel::Warning));
    }

    #[test]
    fn catch_up_matches_ticking() {
        let mut ticked = SessionOrchestrator::new(durations(), NoEffects, MemorySnapshotStore::new());
        let mut caught = SessionOrchestrator::new(durations(), NoEffects, MemorySnapshotStore::new());
        for orch in [&mut ticked, &mut caught] {
            orch.select_task(Some(task("a")));
            orch.start().unwrap();
        }
        for _ in 0..1520 {
            ticked.tick();
        }
        caught.catch_up(1520);
        let (a, b) = (ticked.state(), caught.state());
        assert_eq!(a.phase(), SessionPhase::TaskOvertime);
        assert_eq!(a.phase(), b.phase());
        assert_eq!(a.overtime_secs(), b.overtime_secs());
        assert_eq!(a.elapsed_secs(), b.elapsed_secs());
        assert_eq!(a.pomodoro_count(), b.pomodoro_count());
    }
}
