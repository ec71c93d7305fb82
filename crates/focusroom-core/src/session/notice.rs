use serde::{Deserialize, Serialize};

use super::ActiveTask;
use crate::events::{ClockEvent, TaskStatus};
use crate::timer::BreakKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
}

/// A user-facing message derived from a clock event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub play_sound: bool,
}

impl Notice {
    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            play_sound: false,
        }
    }

    fn with_sound(mut self, enabled: bool) -> Self {
        self.play_sound = enabled;
        self
    }
}

/// Translate `event` into a notice, if it warrants one.
///
/// Phase-end notices ring when `sound_enabled`; everything else is silent.
pub fn notice_for(
    event: &ClockEvent,
    task: Option<&ActiveTask>,
    sound_enabled: bool,
) -> Option<Notice> {
    let title = task.map(|t| t.title.as_str()).unwrap_or("task");
    let notice = match event {
        ClockEvent::FocusStarted {
            duration_secs,
            auto_start: true,
        } => Notice::new(
            NoticeLevel::Info,
            format!("Focus on {title} for {} min", duration_secs / 60),
        ),
        ClockEvent::FocusPhaseEnded { pomodoro } => Notice::new(
            NoticeLevel::Success,
            format!("Pomodoro #{pomodoro} done. Take a break?"),
        )
        .with_sound(sound_enabled),
        ClockEvent::TaskOvertimeStarted { unattended: true } => Notice::new(
            NoticeLevel::Warning,
            format!("{title} ran into overtime while you were away"),
        ),
        ClockEvent::TaskOvertimeStarted { unattended: false } => {
            Notice::new(NoticeLevel::Info, format!("{title} is in overtime"))
        }
        ClockEvent::BreakStarted {
            kind,
            duration_secs,
            auto_start: true,
        } => {
            let kind = match kind {
                BreakKind::Short => "Short",
                BreakKind::Long => "Long",
            };
            Notice::new(
                NoticeLevel::Info,
                format!("{kind} break, {} min", duration_secs / 60),
            )
        }
        ClockEvent::BreakPhaseEnded { .. } => {
            Notice::new(NoticeLevel::Success, "Break over. Ready to focus?")
                .with_sound(sound_enabled)
        }
        ClockEvent::BreakOvertimeStarted { unattended: true } => Notice::new(
            NoticeLevel::Warning,
            "Break ran into overtime while you were away",
        ),
        ClockEvent::BreakOvertimeStarted { unattended: false } => {
            Notice::new(NoticeLevel::Info, "Break is in overtime")
        }
        ClockEvent::TaskStatusChanged {
            status: TaskStatus::Completed,
            ..
        } => Notice::new(NoticeLevel::Success, format!("Completed {title}")),
        ClockEvent::TaskStatusChanged {
            status: TaskStatus::Todo,
            ..
        } => Notice::new(NoticeLevel::Info, format!("Cancelled {title}")),
        _ => return None,
    };
    Some(notice)
}
