//! Closed-form clock advance.
//!
//! Used when the tick loop could not run (application hidden, process
//! suspended). Advancing by `k` seconds here yields exactly the state that
//! `k` calls to [`SessionClock::tick`](super::SessionClock::tick) would,
//! including every phase boundary crossed on the way.

use super::clock::{ClockState, SessionClock};
use super::phase::SessionPhase;
use crate::events::ClockEvent;

/// Advance `state` by `secs` seconds of wall-clock time.
///
/// Overtime entered here is flagged `unattended`, since nobody was looking
/// when the grace period ran out.
pub fn fast_forward(state: &ClockState, secs: u64) -> (ClockState, Vec<ClockEvent>) {
    let mut next = state.clone();
    let mut events = Vec::new();
    let mut remaining = secs;

    while remaining > 0 {
        match next.phase {
            SessionPhase::Focus | SessionPhase::Break if next.is_running => {
                let left = next.time_left_secs;
                if remaining < left {
                    next.time_left_secs -= remaining;
                    if next.phase == SessionPhase::Focus {
                        next.elapsed_secs = next.elapsed_secs.saturating_add(remaining);
                    }
                    remaining = 0;
                } else {
                    // A countdown already at zero still spends one tick on
                    // the transition.
                    remaining -= left.max(1);
                    next.time_left_secs = 0;
                    if next.phase == SessionPhase::Focus {
                        next.elapsed_secs = next.elapsed_secs.saturating_add(left);
                        next.end_focus_phase(&mut events);
                    } else {
                        next.end_break_phase(&mut events);
                    }
                }
            }
            SessionPhase::TaskGrace | SessionPhase::BreakGrace => {
                let grace = next.grace_time_left_secs;
                if remaining < grace {
                    next.grace_time_left_secs -= remaining;
                    // Remaining grace is presented to the user, not consumed silently.
                    next.is_running = false;
                    remaining = 0;
                } else {
                    let overshoot = remaining - grace.max(1);
                    next.enter_overtime(overshoot, true, &mut events);
                    remaining = 0;
                }
            }
            SessionPhase::TaskOvertime | SessionPhase::BreakOvertime => {
                next.overtime_secs = next.overtime_secs.saturating_add(remaining);
                next.is_running = true;
                remaining = 0;
            }
            // Idle, or a paused nominal countdown: nothing accrues.
            _ => break,
        }
    }

    (next, events)
}

impl SessionClock {
    /// Apply [`fast_forward`] to this clock's state in place.
    pub fn fast_forward(&mut self, secs: u64) -> Vec<ClockEvent> {
        let (next, events) = fast_forward(self.state(), secs);
        self.replace_state(next);
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::{DurationConfig, BREAK_GRACE_SECS, TASK_GRACE_SECS};
    use chrono::Utc;
    use proptest::prelude::*;

    fn durations() -> DurationConfig {
        DurationConfig {
            focus_secs: 40,
            short_break_secs: 15,
            long_break_secs: 45,
            pomodoros_before_long_break: 4,
        }
    }

    fn running_focus() -> SessionClock {
        let mut clock = SessionClock::new(durations());
        clock.select_task(Some("t".into()));
        clock.start(Utc::now()).unwrap();
        clock
    }

    #[test]
    fn zero_seconds_is_identity() {
        let clock = running_focus();
        let (next, events) = fast_forward(clock.state(), 0);
        assert_eq!(&next, clock.state());
        assert!(events.is_empty());
    }

    #[test]
    fn partial_focus_keeps_running() {
        let clock = running_focus();
        let (next, events) = fast_forward(clock.state(), 25);
        assert!(events.is_empty());
        assert_eq!(next.phase(), SessionPhase::Focus);
        assert_eq!(next.time_left_secs(), 15);
        assert_eq!(next.elapsed_secs(), 25);
        assert!(next.is_running());
    }

    #[test]
    fn paused_focus_does_not_move() {
        let mut clock = running_focus();
        clock.pause().unwrap();
        let (next, _) = fast_forward(clock.state(), 1_000);
        assert_eq!(&next, clock.state());
    }

    #[test]
    fn focus_overshoot_lands_in_remaining_grace_paused() {
        let clock = running_focus();
        let (next, events) = fast_forward(clock.state(), 43);
        assert_eq!(events, vec![ClockEvent::FocusPhaseEnded { pomodoro: 1 }]);
        assert_eq!(next.phase(), SessionPhase::TaskGrace);
        assert_eq!(next.grace_time_left_secs(), TASK_GRACE_SECS - 3);
        assert_eq!(next.elapsed_secs(), 40);
        assert!(!next.is_running());
    }

    #[test]
    fn grace_overshoot_becomes_overtime() {
        let clock = running_focus();
        let (next, events) = fast_forward(clock.state(), 40 + TASK_GRACE_SECS + 17);
        assert_eq!(
            events,
            vec![
                ClockEvent::FocusPhaseEnded { pomodoro: 1 },
                ClockEvent::TaskOvertimeStarted { unattended: true },
            ]
        );
        assert_eq!(next.phase(), SessionPhase::TaskOvertime);
        assert_eq!(next.overtime_secs(), 17);
        assert!(next.is_running());
        assert_eq!(next.focus_total_secs(), 57);
    }

    #[test]
    fn break_passes_through_grace() {
        let mut clock = running_focus();
        clock.skip_to_break(true).unwrap();
        let (next, _) = fast_forward(clock.state(), 15 + BREAK_GRACE_SECS + 5);
        assert_eq!(next.phase(), SessionPhase::BreakOvertime);
        assert_eq!(next.overtime_secs(), 5);
        assert_eq!(next.last_nominal_break_secs(), Some(15));
    }

    #[test]
    fn overtime_just_accumulates() {
        let clock = running_focus();
        let (overtime, _) = fast_forward(clock.state(), 40 + TASK_GRACE_SECS + 1);
        let (next, events) = fast_forward(&overtime, 600);
        assert!(events.is_empty());
        assert_eq!(next.overtime_secs(), 601);
    }

    /// Drive a clock into one of several starting points.
    fn prepared(setup: u8, warmup: u64) -> SessionClock {
        let mut clock = running_focus();
        match setup % 5 {
            0 => {}
            1 => {
                clock.pause().unwrap();
            }
            2 => {
                clock.skip_to_break(true).unwrap();
            }
            3 => {
                clock.skip_to_break(false).unwrap();
            }
            _ => {
                clock.reset();
            }
        }
        for _ in 0..warmup {
            clock.tick();
        }
        clock
    }

    proptest! {
        #[test]
        fn fast_forward_matches_ticking(setup in 0u8..5, warmup in 0u64..120, k in 0u64..200) {
            let mut ticked = prepared(setup, warmup);
            let start = ticked.state().clone();
            for _ in 0..k {
                ticked.tick();
            }
            let (jumped, _) = fast_forward(&start, k);
            prop_assert_eq!(&jumped, ticked.state());
        }

        #[test]
        fn overtime_never_decreases(warmup in 0u64..120, k in 0u64..200) {
            let clock = prepared(0, warmup);
            let (a, _) = fast_forward(clock.state(), k);
            let (b, _) = fast_forward(&a, 1);
            if a.phase().is_overtime() {
                prop_assert!(b.overtime_secs() >= a.overtime_secs());
            }
        }
    }
}
