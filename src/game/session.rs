//! Fishing Session State Machine
//!
//! One session per connected player. Owns the cast parameters, the hooked
//! fish, the fight sub-state and the timers, and is the only place those
//! change. Every operation checks the current state first and rejects the
//! call without side effects when it does not apply.
//!
//! ```text
//!  IDLE ──cast──▶ WAITING ──bite──▶ BITE ──hook──▶ FIGHTING
//!   ▲                ▲               │                │
//!   │                └───timeout─────┘                │
//!   └──────────────────── caught / lost ──────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Deserialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::rng::DeterministicRng;
use crate::game::bite::{BiteCalculator, BiteContext};
use crate::game::catalog::{Catalog, EquipmentSlot, FishSpecies, Location, LocationId, Tackle};
use crate::game::events::{CatchSummary, SessionEvent};
use crate::game::fight::{FailureReason, FightOutcome, FightSimulator, FightState, FightView};
use crate::game::input::{CastInput, FightAction, MAX_CAST_ANGLE};
use crate::game::services::{PlayerId, PlayerServices};

// =============================================================================
// STATE
// =============================================================================

/// Resting states of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Line out of the water.
    Idle,
    /// Bait in the water, waiting for a bite.
    Waiting,
    /// A fish is on the bait, hook set pending.
    Bite,
    /// Fish hooked.
    Fighting,
}

impl SessionState {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Waiting => "waiting",
            SessionState::Bite => "bite",
            SessionState::Fighting => "fighting",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// No such location.
    #[error("location {0} not found")]
    LocationNotFound(LocationId),

    /// Location closed or above the player's level.
    #[error("location {0} is not accessible")]
    LocationLocked(LocationId),

    /// A tackle slot is empty.
    #[error("equipment incomplete: no {0} equipped")]
    MissingEquipment(EquipmentSlot),

    /// Bait ran out.
    #[error("no bait left")]
    NoBait,

    /// Action not legal in the current state.
    #[error("cannot {action} while {state}")]
    InvalidState {
        /// Attempted action.
        action: &'static str,
        /// State at the time.
        state: SessionState,
    },

    /// Hook set after the bite window closed.
    #[error("too late, the fish let go of the bait")]
    BiteExpired,

    /// Session data contradicts its state. The session has been reset.
    #[error("session reset: {0}")]
    Inconsistent(String),
}

/// Session timer lengths.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionTimings {
    /// Time the player has to set the hook.
    pub bite_window: Duration,
    /// Pause before bite checks resume after a missed bite.
    pub post_timeout_delay: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            bite_window: Duration::from_secs(8),
            post_timeout_delay: Duration::from_secs(10),
        }
    }
}

/// The fish on the line.
#[derive(Clone, Debug, PartialEq)]
pub struct HookedFish {
    /// Species.
    pub species: FishSpecies,
    /// Rolled weight (kg).
    pub weight: f64,
}

/// Reply to a successful cast.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CastResult {
    /// Cast distance (m).
    pub distance: f64,
    /// Bait depth (m).
    pub depth: f64,
}

/// Read-only view of a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session id.
    pub session_id: Uuid,
    /// Current state.
    pub state: SessionState,
    /// Location fished.
    pub location_id: LocationId,
    /// Location name.
    pub location_name: String,
    /// Last cast distance.
    pub cast_distance: f64,
    /// Last cast depth.
    pub cast_depth: f64,
    /// Hooked or biting species.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hooked_fish: Option<String>,
    /// Fight view while fighting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fight: Option<FightView>,
}

// =============================================================================
// SESSION
// =============================================================================

/// A player's fishing session.
pub struct FishingSession {
    id: Uuid,
    player: PlayerId,
    location: Location,
    state: SessionState,

    catalog: Arc<dyn Catalog>,
    services: Arc<dyn PlayerServices>,
    timings: SessionTimings,
    rng: DeterministicRng,

    tackle: Option<Tackle>,
    cast_distance: f64,
    cast_depth: f64,
    hooked: Option<HookedFish>,
    simulator: Option<FightSimulator>,
    fight: FightState,

    bite_deadline: Option<Instant>,
    next_bite_check_at: Option<Instant>,
    fight_started_at: Option<Instant>,
}

impl std::fmt::Debug for FishingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FishingSession")
            .field("id", &self.id)
            .field("player", &self.player)
            .field("location", &self.location.id)
            .field("state", &self.state)
            .finish()
    }
}

impl FishingSession {
    /// Open a session at a location after checking access and tackle.
    pub fn join(
        player: PlayerId,
        location_id: LocationId,
        catalog: Arc<dyn Catalog>,
        services: Arc<dyn PlayerServices>,
        timings: SessionTimings,
        entropy: u64,
    ) -> Result<Self, SessionError> {
        let location = catalog
            .location(location_id)
            .ok_or(SessionError::LocationNotFound(location_id))?;
        if !services.can_access_location(player, &location) {
            return Err(SessionError::LocationLocked(location_id));
        }
        services
            .equipped_tackle(player)
            .map_err(SessionError::MissingEquipment)?;

        let id = Uuid::new_v4();
        let rng = DeterministicRng::for_session(player.as_bytes(), id.as_bytes(), entropy);
        info!(session = %id, player = %player, location = location_id, "Session opened");

        Ok(Self {
            id,
            player,
            location,
            state: SessionState::Idle,
            catalog,
            services,
            timings,
            rng,
            tackle: None,
            cast_distance: 0.0,
            cast_depth: 0.0,
            hooked: None,
            simulator: None,
            fight: FightState::default(),
            bite_deadline: None,
            next_bite_check_at: None,
            fight_started_at: None,
        })
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Session id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Owning player.
    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// Location fished.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Fish on the line, in BITE and FIGHTING.
    pub fn hooked(&self) -> Option<&HookedFish> {
        self.hooked.as_ref()
    }

    /// Fight sub-state. Defaults outside FIGHTING.
    pub fn fight(&self) -> &FightState {
        &self.fight
    }

    /// Last cast distance.
    pub fn cast_distance(&self) -> f64 {
        self.cast_distance
    }

    /// Last cast depth.
    pub fn cast_depth(&self) -> f64 {
        self.cast_depth
    }

    /// When the hook set window closes.
    pub fn bite_deadline(&self) -> Option<Instant> {
        self.bite_deadline
    }

    /// When the next bite roll is due.
    pub fn next_bite_check_at(&self) -> Option<Instant> {
        self.next_bite_check_at
    }

    /// When the current fight began.
    pub fn fight_started_at(&self) -> Option<Instant> {
        self.fight_started_at
    }

    /// Timer lengths.
    pub fn timings(&self) -> SessionTimings {
        self.timings
    }

    /// Snapshot for clients and diagnostics.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            state: self.state,
            location_id: self.location.id,
            location_name: self.location.name.clone(),
            cast_distance: self.cast_distance,
            cast_depth: self.cast_depth,
            hooked_fish: self.hooked.as_ref().map(|h| h.species.name.clone()),
            fight: (self.state == SessionState::Fighting).then(|| self.fight.view()),
        }
    }

    fn require(&self, action: &'static str, state: SessionState) -> Result<(), SessionError> {
        if self.state == state {
            Ok(())
        } else {
            Err(SessionError::InvalidState { action, state: self.state })
        }
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    /// IDLE -> WAITING. Consumes one unit of bait.
    pub fn cast(&mut self, input: CastInput, now: Instant) -> Result<CastResult, SessionError> {
        self.require("cast", SessionState::Idle)?;

        let tackle = self
            .services
            .equipped_tackle(self.player)
            .map_err(SessionError::MissingEquipment)?;
        if !self.services.can_access_location(self.player, &self.location) {
            return Err(SessionError::LocationLocked(self.location.id));
        }
        if !self.services.consume_bait(self.player) {
            return Err(SessionError::NoBait);
        }

        let input = input.normalized();
        let distance = (20.0 + 30.0 * input.power) * (1.0 + tackle.rod.cast_distance_bonus / 100.0);
        let depth = self.location.max_depth * (0.3 + input.angle / MAX_CAST_ANGLE * 0.7);

        self.cast_distance = distance;
        self.cast_depth = depth;
        self.tackle = Some(tackle);
        self.next_bite_check_at = Some(now);
        self.state = SessionState::Waiting;

        self.services.record_cast_stats(self.player);
        debug!(session = %self.id, distance, depth, "Cast");

        Ok(CastResult { distance, depth })
    }

    /// WAITING tick: roll for a bite if one is due.
    ///
    /// `hour` is the local hour of day used for feeding windows.
    pub fn check_bite(&mut self, now: Instant, hour: u8) -> Result<Option<SessionEvent>, SessionError> {
        self.require("check for bites", SessionState::Waiting)?;

        let due = match self.next_bite_check_at {
            Some(due) => due,
            None => return Err(self.force_reset("waiting without a bite schedule")),
        };
        if now < due {
            return Ok(None);
        }

        let bait = match &self.tackle {
            Some(tackle) => tackle.bait.id,
            None => return Err(self.force_reset("waiting without tackle")),
        };
        let ctx = BiteContext {
            location: self.location.id,
            bait,
            cast_distance: self.cast_distance,
            depth: self.cast_depth,
            hour,
        };
        let result = BiteCalculator::new(self.catalog.as_ref()).calculate(&ctx, &mut self.rng);

        let species = match result.fish {
            Some(species) if result.will_bite => species,
            _ => {
                self.next_bite_check_at = Some(due + Duration::from_secs_f64(result.wait_seconds));
                return Ok(None);
            }
        };

        let weight = species.generate_weight(&mut self.rng);
        let fish_name = species.name.clone();
        debug!(
            session = %self.id,
            fish = %fish_name,
            weight,
            wait = result.wait_seconds,
            "Bite"
        );

        self.hooked = Some(HookedFish { species, weight });
        self.bite_deadline = Some(now + self.timings.bite_window);
        self.next_bite_check_at = None;
        self.state = SessionState::Bite;

        Ok(Some(SessionEvent::Bite { fish_name, intensity: result.intensity }))
    }

    /// BITE -> WAITING once the bite window has closed.
    pub fn expire_bite(&mut self, now: Instant) -> Result<Option<SessionEvent>, SessionError> {
        self.require("expire a bite", SessionState::Bite)?;

        match self.bite_deadline {
            Some(deadline) if now < deadline => return Ok(None),
            Some(_) => {}
            None => return Err(self.force_reset("bite without a deadline")),
        }

        self.hooked = None;
        self.bite_deadline = None;
        self.next_bite_check_at = Some(now + self.timings.post_timeout_delay);
        self.state = SessionState::Waiting;
        debug!(session = %self.id, "Bite missed");

        Ok(Some(SessionEvent::BiteTimeout))
    }

    /// BITE -> FIGHTING.
    ///
    /// A hook set at or after the deadline applies the timeout and fails
    /// with `BiteExpired`.
    pub fn hook(&mut self, now: Instant) -> Result<SessionEvent, SessionError> {
        self.require("hook", SessionState::Bite)?;

        if self.expire_bite(now)?.is_some() {
            return Err(SessionError::BiteExpired);
        }

        let (hooked, tackle) = match (&self.hooked, &self.tackle) {
            (Some(hooked), Some(tackle)) => (hooked, tackle),
            _ => return Err(self.force_reset("bite without a hooked fish")),
        };

        self.simulator = Some(FightSimulator::new(&hooked.species, hooked.weight, tackle));
        let event = SessionEvent::FightStarted {
            fish_name: hooked.species.name.clone(),
            weight: hooked.weight,
        };

        self.fight = FightState::hooked(self.cast_distance);
        self.fight_started_at = Some(now);
        self.bite_deadline = None;
        self.state = SessionState::Fighting;
        info!(session = %self.id, player = %self.player, "Fish hooked");

        Ok(event)
    }

    /// Apply a fight action. Terminal checks run on the next tick.
    pub fn apply_action(&mut self, action: FightAction) -> Result<(), SessionError> {
        self.require(action.name(), SessionState::Fighting)?;

        match &self.simulator {
            Some(simulator) => {
                simulator.apply_action(&mut self.fight, action);
                Ok(())
            }
            None => Err(self.force_reset("fighting without a simulator")),
        }
    }

    /// FIGHTING tick. Returns a fight update, or the terminal event.
    pub fn advance_fight(&mut self, dt: f64, now: Instant) -> Result<SessionEvent, SessionError> {
        self.require("advance the fight", SessionState::Fighting)?;

        if self.hooked.is_none() {
            return Err(self.force_reset("fighting without a hooked fish"));
        }
        let outcome = match &self.simulator {
            Some(simulator) => simulator.advance(&mut self.fight, dt, &mut self.rng),
            None => return Err(self.force_reset("fighting without a simulator")),
        };

        match outcome {
            None => Ok(SessionEvent::FightUpdate(self.fight.view())),
            Some(outcome) => self.complete(outcome, now),
        }
    }

    /// Resolve a fight and return to IDLE.
    fn complete(&mut self, outcome: FightOutcome, now: Instant) -> Result<SessionEvent, SessionError> {
        let hooked = match self.hooked.take() {
            Some(hooked) => hooked,
            None => return Err(self.force_reset("fight ended without a hooked fish")),
        };
        let fight_duration = self
            .fight_started_at
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default();
        self.reset_to_idle();

        let event = match outcome {
            FightOutcome::Caught => {
                let reward = self.services.record_catch(self.player, &hooked.species, self.location.id, hooked.weight);
                self.services.record_catch_stats(self.player, &hooked.species, fight_duration);
                let achievements = self.services.check_achievements(self.player);

                info!(
                    session = %self.id,
                    player = %self.player,
                    fish = %hooked.species.name,
                    weight = hooked.weight,
                    price = reward.price,
                    "Fish caught"
                );

                SessionEvent::Caught(CatchSummary {
                    fish_name: hooked.species.name,
                    weight: hooked.weight,
                    price: reward.price,
                    experience: reward.experience,
                    leveled_up: reward.leveled_up,
                    new_level: reward.new_level,
                    achievements,
                    fight_duration,
                })
            }
            FightOutcome::Failed(reason) => {
                match reason {
                    FailureReason::LineBreak => self.services.record_line_break(self.player),
                    FailureReason::LineWorn | FailureReason::FishEscaped => {
                        self.services.record_fish_escaped(self.player)
                    }
                }
                info!(session = %self.id, player = %self.player, %reason, "Fish lost");
                SessionEvent::Lost { reason }
            }
        };

        Ok(event)
    }

    fn reset_to_idle(&mut self) {
        self.state = SessionState::Idle;
        self.fight.reset();
        self.hooked = None;
        self.simulator = None;
        self.tackle = None;
        self.bite_deadline = None;
        self.next_bite_check_at = None;
        self.fight_started_at = None;
    }

    /// Drop whatever is in progress and return to IDLE.
    pub fn force_reset(&mut self, reason: &str) -> SessionError {
        warn!(session = %self.id, state = %self.state, reason, "Session force-reset");
        self.reset_to_idle();
        SessionError::Inconsistent(reason.to_string())
    }

    #[cfg(test)]
    pub(crate) fn rng_mut(&mut self) -> &mut DeterministicRng {
        &mut self.rng
    }

    #[cfg(test)]
    pub(crate) fn drop_hooked_fish(&mut self) {
        self.hooked = None;
    }
}

// =============================================================================
// TESTS
// =============================================================================
