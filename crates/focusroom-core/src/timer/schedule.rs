use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakKind {
    Short,
    Long,
}

/// Nominal phase lengths consumed by the session clock.
///
/// All durations are in seconds. The clock never mutates this value; it is
/// replaced wholesale on an explicit refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationConfig {
    pub focus_secs: u64,
    pub short_break_secs: u64,
    pub long_break_secs: u64,
    /// Every N-th break is a long one.
    #[serde(default = "default_pomodoros_before_long_break")]
    pub pomodoros_before_long_break: u32,
}

fn default_pomodoros_before_long_break() -> u32 {
    4
}

impl DurationConfig {
    /// Build from minute values, the unit the configuration file uses.
    ///
    /// Uses saturating arithmetic so absurd configuration values cannot overflow.
    pub fn from_minutes(focus_min: u64, short_break_min: u64, long_break_min: u64) -> Self {
        Self {
            focus_secs: focus_min.saturating_mul(60),
            short_break_secs: short_break_min.saturating_mul(60),
            long_break_secs: long_break_min.saturating_mul(60),
            pomodoros_before_long_break: default_pomodoros_before_long_break(),
        }
    }

    /// Which break follows the `nth` pomodoro (counted from 1).
    pub fn break_kind_after(&self, nth: u32) -> BreakKind {
        let cadence = self.pomodoros_before_long_break.max(1);
        if nth > 0 && nth % cadence == 0 {
            BreakKind::Long
        } else {
            BreakKind::Short
        }
    }

    pub fn break_secs(&self, kind: BreakKind) -> u64 {
        match kind {
            BreakKind::Short => self.short_break_secs,
            BreakKind::Long => self.long_break_secs,
        }
    }
}

impl Default for DurationConfig {
    fn default() -> Self {
        Self::from_minutes(25, 5, 15)
    }
}
