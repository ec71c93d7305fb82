use chrono::Utc;

use crate::events::TaskStatus;
use crate::storage::{Database, TimeLogKind};

/// Outbound hooks fired by the orchestrator when a session produces
/// something worth recording.
///
/// Failures are reported back to the caller but never undo the clock
/// transition that triggered them.
pub trait SessionEffects {
    /// A focus session ended (task completed or skipped to break).
    fn on_focus_session_end(
        &self,
        _task_id: Option<&str>,
        _secs: u64,
    ) -> Result<(), Box<dyn std::error::Error>> {
        Ok(()) // default no-op
    }

    /// Focus was paused or the task cancelled with time on the clock.
    fn on_interruption(
        &self,
        _task_id: Option<&str>,
        _secs: u64,
    ) -> Result<(), Box<dyn std::error::Error>> {
        Ok(()) // default no-op
    }

    fn on_break_completed(
        &self,
        _task_id: Option<&str>,
        _secs: u64,
    ) -> Result<(), Box<dyn std::error::Error>> {
        Ok(()) // default no-op
    }

    fn on_task_status_change(
        &self,
        _task_id: &str,
        _status: TaskStatus,
    ) -> Result<(), Box<dyn std::error::Error>> {
        Ok(()) // default no-op
    }
}

impl<T: SessionEffects + ?Sized> SessionEffects for &T {
    fn on_focus_session_end(
        &self,
        task_id: Option<&str>,
        secs: u64,
    ) -> Result<(), Box<dyn std::error::Error>> {
        (**self).on_focus_session_end(task_id, secs)
    }

    fn on_interruption(
        &self,
        task_id: Option<&str>,
        secs: u64,
    ) -> Result<(), Box<dyn std::error::Error>> {
        (**self).on_interruption(task_id, secs)
    }

    fn on_break_completed(
        &self,
        task_id: Option<&str>,
        secs: u64,
    ) -> Result<(), Box<dyn std::error::Error>> {
        (**self).on_break_completed(task_id, secs)
    }

    fn on_task_status_change(
        &self,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<(), Box<dyn std::error::Error>> {
        (**self).on_task_status_change(task_id, status)
    }
}

/// Discards every effect.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEffects;

impl SessionEffects for NoEffects {}

/// Records time logs and task status in the local database.
impl SessionEffects for Database {
    fn on_focus_session_end(
        &self,
        task_id: Option<&str>,
        secs: u64,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.record_time_log(TimeLogKind::Focus, task_id, secs, Utc::now())?;
        Ok(())
    }

    fn on_interruption(
        &self,
        task_id: Option<&str>,
        secs: u64,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.record_time_log(TimeLogKind::Interruption, task_id, secs, Utc::now())?;
        Ok(())
    }

    fn on_break_completed(
        &self,
        task_id: Option<&str>,
        secs: u64,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.record_time_log(TimeLogKind::Break, task_id, secs, Utc::now())?;
        Ok(())
    }

    fn on_task_status_change(
        &self,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.set_task_status(task_id, status, Utc::now())?;
        Ok(())
    }
}
