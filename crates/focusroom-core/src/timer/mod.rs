mod clock;
mod fast_forward;
mod phase;
mod schedule;

pub use clock::{ClockCommand, ClockState, SessionClock, Transition};
pub use fast_forward::fast_forward;
pub use phase::{SessionPhase, BREAK_GRACE_SECS, TASK_GRACE_SECS};
pub use schedule::{BreakKind, DurationConfig};
