use std::ops::ControlFlow;

use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::Serialize;

use focusroom_core::session::driver;
use focusroom_core::storage::Database;
use focusroom_core::{
    ActiveTask, ClockEvent, ClockRejection, ClockState, Config, NoticeLevel,
    RecoveryLayer, Report, SessionOrchestrator,
};

use super::lease::{self, Acquired, Lease};

const STATE_KEY: &str = "session_clock";
const TASK_KEY: &str = "active_task";

type Orchestrator<'a> = SessionOrchestrator<&'a Database, &'a Database>;

#[derive(Subcommand)]
pub enum TimerAction {
    /// Attach the timer to a task (resets the clock if the task changes)
    Select {
        /// Task title
        #[arg(long)]
        title: String,
        /// Task ID (a new UUID if omitted)
        #[arg(long)]
        task_id: Option<String>,
    },
    /// Detach the current task and return to idle
    Clear,
    /// Start or resume the countdown
    Start,
    /// Pause the focus or break countdown
    Pause,
    /// Reset to idle, keeping the task
    Reset,
    /// Finish the task and log the focus time
    Complete,
    /// Abandon the task and log the time as an interruption
    Cancel,
    /// Print current timer state as JSON
    Status,
    /// End focus and start a break
    SkipToBreak {
        /// Leave the break paused
        #[arg(long)]
        no_auto_start: bool,
    },
    /// End the break and start focusing
    SkipBreak {
        /// Leave the focus countdown paused
        #[arg(long)]
        no_auto_start: bool,
    },
    /// Advance the clock by whole seconds
    Tick {
        #[arg(long, default_value = "1")]
        count: u64,
    },
    /// Run the timer in the foreground until Ctrl-C
    Run,
}

#[derive(Serialize)]
struct Output<'a> {
    state: &'a ClockState,
    progress: f64,
    task: Option<&'a ActiveTask>,
    events: &'a [ClockEvent],
    #[serde(skip_serializing_if = "Option::is_none")]
    restored_secs: Option<u64>,
    /// Process currently driving the clock, when it is not this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    driven_by_pid: Option<u32>,
}

impl TimerAction {
    fn is_read_only(&self) -> bool {
        matches!(self, TimerAction::Status)
    }
}

fn load_state(db: &Database) -> ClockState {
    match db.kv_get(STATE_KEY) {
        Ok(Some(json)) => serde_json::from_str::<ClockState>(&json).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "discarding unreadable clock state");
            ClockState::default()
        }),
        Ok(None) => ClockState::default(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read clock state");
            ClockState::default()
        }
    }
}

fn load_task(db: &Database) -> Option<ActiveTask> {
    db.kv_get(TASK_KEY)
        .ok()
        .flatten()
        .and_then(|json| serde_json::from_str::<ActiveTask>(&json).ok())
}

fn load_orchestrator<'a>(db: &'a Database, config: &Config) -> Orchestrator<'a> {
    let mut orch = SessionOrchestrator::with_state(
        load_state(db),
        load_task(db),
        config.durations(),
        db,
        db,
    );
    orch.set_sound_enabled(config.sound_enabled());
    orch
}

fn save_orchestrator(
    db: &Database,
    orch: &Orchestrator<'_>,
) -> Result<(), Box<dyn std::error::Error>> {
    db.kv_set(STATE_KEY, &serde_json::to_string(orch.state())?)?;
    match orch.active_task() {
        Some(task) => db.kv_set(TASK_KEY, &serde_json::to_string(task)?)?,
        None => db.kv_delete(TASK_KEY)?,
    }
    Ok(())
}

/// Persist the live clock so other invocations can read it and a crashed
/// `timer run` can be recovered from its last second.
fn checkpoint(
    db: &Database,
    orch: &Orchestrator<'_>,
    now: DateTime<Utc>,
) -> Result<(), Box<dyn std::error::Error>> {
    save_orchestrator(db, orch)?;
    orch.checkpoint(now)?;
    Ok(())
}

fn print_notices(report: &Report) {
    for notice in &report.notices {
        let level = match notice.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => "done",
            NoticeLevel::Warning => "warn",
        };
        let bell = if notice.play_sound { "\x07" } else { "" };
        eprintln!("{bell}[{level}] {}", notice.message);
    }
    for failure in &report.effect_failures {
        eprintln!("[warn] {} failed: {}", failure.callback, failure.message);
    }
}

fn print_output(orch: &Orchestrator<'_>, report: &Report) -> Result<(), serde_json::Error> {
    let output = Output {
        state: orch.state(),
        progress: orch.state().progress(),
        task: orch.active_task(),
        events: &report.events,
        restored_secs: report.restored_secs,
        driven_by_pid: None,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Status while another process owns the clock: project its last
/// checkpoint to now without consuming it or firing any effects.
fn print_live_status(db: &Database, pid: Option<u32>) -> Result<(), Box<dyn std::error::Error>> {
    let (state, restored_secs) = match RecoveryLayer::new(db).peek(Utc::now()) {
        Some(restored) => (restored.state, Some(restored.background_secs)),
        None => (load_state(db), None),
    };
    let task = load_task(db).filter(|t| state.active_task_id() == Some(t.id.as_str()));
    let output = Output {
        state: &state,
        progress: state.progress(),
        task: task.as_ref(),
        events: &[],
        restored_secs,
        driven_by_pid: pid,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn busy_error(pid: Option<u32>) -> Box<dyn std::error::Error> {
    match pid {
        Some(pid) => format!(
            "the timer is being driven by another process (pid {pid}); stop `timer run` first"
        )
        .into(),
        None => "the timer is being changed by another process; try again".into(),
    }
}

fn apply(
    orch: &mut Orchestrator<'_>,
    action: TimerAction,
    auto_advance: bool,
) -> Result<Report, ClockRejection> {
    match action {
        TimerAction::Select { title, task_id } => {
            let id = task_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            Ok(orch.select_task(Some(ActiveTask { id, title })))
        }
        TimerAction::Clear => Ok(orch.select_task(None)),
        TimerAction::Start => orch.start(),
        TimerAction::Pause => orch.pause(),
        TimerAction::Reset => Ok(orch.reset()),
        TimerAction::Complete => orch.complete_task(),
        TimerAction::Cancel => orch.cancel_task(),
        TimerAction::Status => Ok(Report::default()),
        TimerAction::SkipToBreak { no_auto_start } => {
            orch.skip_to_break(auto_advance && !no_auto_start)
        }
        TimerAction::SkipBreak { no_auto_start } => {
            orch.skip_break(auto_advance && !no_auto_start)
        }
        TimerAction::Tick { count } => {
            let mut report = Report::default();
            for _ in 0..count {
                report.merge(orch.tick());
            }
            Ok(report)
        }
        TimerAction::Run => Ok(Report::default()),
    }
}

/// Drive the clock until Ctrl-C, checkpointing every second. Returns
/// whether the lease was still held at the end.
fn run_foreground(
    db: &Database,
    orch: &mut Orchestrator<'_>,
    lease: &mut Lease,
) -> Result<bool, Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl-C");
        }
    };
    if let Err(e) = checkpoint(db, orch, Utc::now()) {
        tracing::warn!(error = %e, "failed to checkpoint clock");
    }
    let mut owned = true;
    runtime.block_on(driver::run_until(orch, shutdown, |orch, report| {
        if !report.is_empty() {
            print_notices(report);
            if let Err(e) = print_output(orch, report) {
                tracing::warn!(error = %e, "failed to print report");
            }
        }

        let now = Utc::now();
        match lease.renew(db, now) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("clock taken over by another process, stopping");
                owned = false;
                return ControlFlow::Break(());
            }
            // Keep going; if the lease lapses the next renewal stops the loop.
            Err(e) => tracing::warn!(error = %e, "failed to renew clock lease"),
        }
        if let Err(e) = checkpoint(db, orch, now) {
            tracing::warn!(error = %e, "failed to checkpoint clock");
        }
        ControlFlow::Continue(())
    }));
    Ok(owned)
}

/// Each invocation shows the clock (fast-forwarding the time since the last
/// one), applies the action, then hides it again so the next invocation can
/// account for the gap. Only the holder of the clock lease may do this;
/// while `timer run` holds it, `status` reads its checkpoint instead.
pub fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let mut lease = match lease::acquire(&db, Utc::now())? {
        Acquired::Held(lease) => lease,
        Acquired::Busy { pid } if action.is_read_only() => return print_live_status(&db, pid),
        Acquired::Busy { pid } => return Err(busy_error(pid)),
    };

    let config = Config::load_or_default();
    let mut orch = load_orchestrator(&db, &config);

    let mut report = orch.show(Utc::now());
    let foreground = matches!(action, TimerAction::Run);
    let result =
        apply(&mut orch, action, config.auto_advance).map(|applied| report.merge(applied));
    print_notices(&report);
    print_output(&orch, &report)?;

    if foreground && result.is_ok() && !run_foreground(&db, &mut orch, &mut lease)? {
        // The new owner restored from the last checkpoint; writing now would
        // overwrite its changes.
        return Ok(());
    }

    // Persist even when the action was rejected: the restore above already
    // consumed the snapshot.
    let persisted = persist(&db, &mut orch);
    if let Err(e) = lease.release(&db) {
        tracing::warn!(error = %e, "failed to release clock lease");
    }
    persisted?;
    result?;
    Ok(())
}

fn persist(db: &Database, orch: &mut Orchestrator<'_>) -> Result<(), Box<dyn std::error::Error>> {
    orch.hide(Utc::now())?;
    save_orchestrator(db, orch)
}
