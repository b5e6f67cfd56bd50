//! Session Events
//!
//! Outbound events produced by session transitions. The transport turns these
//! into wire messages; the engine never formats anything itself.

use std::time::Duration;

use serde::{Serialize, Deserialize};

use crate::game::fight::{FailureReason, FightView};

/// A landed fish with everything it paid out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatchSummary {
    /// Species name.
    pub fish_name: String,
    /// Weight (kg).
    pub weight: f64,
    /// Money earned.
    pub price: u32,
    /// Experience earned.
    pub experience: u32,
    /// The catch levelled the player up.
    pub leveled_up: bool,
    /// Level after the catch.
    pub new_level: u32,
    /// Achievements unlocked by this catch.
    pub achievements: Vec<String>,
    /// Time from hook set to landing.
    pub fight_duration: Duration,
}

/// Event emitted by a session transition or tick.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// A fish took the bait.
    Bite {
        /// Species name.
        fish_name: String,
        /// Bite strength (0.3-1.0).
        intensity: f64,
    },

    /// The bite window closed without a hook set.
    BiteTimeout,

    /// Hook set, fight on.
    FightStarted {
        /// Species name.
        fish_name: String,
        /// Weight (kg).
        weight: f64,
    },

    /// Fight tick without a terminal outcome.
    FightUpdate(FightView),

    /// Fight won.
    Caught(CatchSummary),

    /// Fight lost.
    Lost {
        /// Cause.
        reason: FailureReason,
    },

    /// The session hit an inconsistent state and was reset to idle.
    Reset {
        /// What went wrong.
        message: String,
    },
}

impl SessionEvent {
    /// Event ends a fight.
    pub fn is_fight_end(&self) -> bool {
        matches!(self, SessionEvent::Caught(_) | SessionEvent::Lost { .. })
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Bite { .. } => "bite",
            SessionEvent::BiteTimeout => "bite_timeout",
            SessionEvent::FightStarted { .. } => "fight_started",
            SessionEvent::FightUpdate(_) => "fight_update",
            SessionEvent::Caught(_) => "caught",
            SessionEvent::Lost { .. } => "lost",
            SessionEvent::Reset { .. } => "reset",
        }
    }
}
