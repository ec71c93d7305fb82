//! Session orchestration: the clock plus task identity, effect callbacks,
//! notices and hide/show recovery.

pub mod driver;
mod effects;
mod notice;
mod orchestrator;

pub use effects::{NoEffects, SessionEffects};
pub use notice::{notice_for, Notice, NoticeLevel};
pub use orchestrator::{EffectFailure, Report, SessionOrchestrator};

use serde::{Deserialize, Serialize};

/// The task a session is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveTask {
    pub id: String,
    pub title: String,
}
