use serde::{Deserialize, Serialize};

/// Seconds of grace after a focus countdown ends before task overtime starts.
pub const TASK_GRACE_SECS: u64 = 10;

/// Seconds of grace after a break countdown ends before break overtime starts.
pub const BREAK_GRACE_SECS: u64 = 20;

/// The mutually exclusive mode the session clock is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    Focus,
    TaskGrace,
    TaskOvertime,
    Break,
    BreakGrace,
    BreakOvertime,
}

impl SessionPhase {
    /// Focus, TaskGrace or TaskOvertime.
    pub fn is_focus_family(self) -> bool {
        matches!(
            self,
            SessionPhase::Focus | SessionPhase::TaskGrace | SessionPhase::TaskOvertime
        )
    }

    /// Break, BreakGrace or BreakOvertime.
    pub fn is_break_family(self) -> bool {
        matches!(
            self,
            SessionPhase::Break | SessionPhase::BreakGrace | SessionPhase::BreakOvertime
        )
    }

    pub fn is_grace(self) -> bool {
        matches!(self, SessionPhase::TaskGrace | SessionPhase::BreakGrace)
    }

    pub fn is_overtime(self) -> bool {
        matches!(self, SessionPhase::TaskOvertime | SessionPhase::BreakOvertime)
    }

    /// Grace and overtime phases accrue time whether or not the nominal
    /// countdown is running, and cannot be paused.
    pub fn always_runs(self) -> bool {
        self.is_grace() || self.is_overtime()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Focus => "focus",
            SessionPhase::TaskGrace => "task_grace",
            SessionPhase::TaskOvertime => "task_overtime",
            SessionPhase::Break => "break",
            SessionPhase::BreakGrace => "break_grace",
            SessionPhase::BreakOvertime => "break_overtime",
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SessionPhase; 7] = [
        SessionPhase::Idle,
        SessionPhase::Focus,
        SessionPhase::TaskGrace,
        SessionPhase::TaskOvertime,
        SessionPhase::Break,
        SessionPhase::BreakGrace,
        SessionPhase::BreakOvertime,
    ];

    #[test]
    fn families_are_disjoint() {
        for phase in ALL {
            assert!(!(phase.is_focus_family() && phase.is_break_family()), "{phase}");
        }
        assert!(!SessionPhase::Idle.is_focus_family());
        assert!(!SessionPhase::Idle.is_break_family());
    }

    #[test]
    fn only_grace_and_overtime_always_run() {
        let running: Vec<_> = ALL.into_iter().filter(|p| p.always_runs()).collect();
        assert_eq!(
            running,
            vec![
                SessionPhase::TaskGrace,
                SessionPhase::TaskOvertime,
                SessionPhase::BreakGrace,
                SessionPhase::BreakOvertime,
            ]
        );
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&SessionPhase::TaskOvertime).unwrap();
        assert_eq!(json, "\"task_overtime\"");
        let back: SessionPhase = serde_json::from_str("\"break_grace\"").unwrap();
        assert_eq!(back, SessionPhase::BreakGrace);
    }
}
