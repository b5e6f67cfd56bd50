//! Fish Behavior Model
//!
//! One tick of hooked-fish behavior: the next behavior state plus the pull,
//! heading change and stamina drain that state produces. The fight simulator
//! applies the result; this module never touches fight state itself.

use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;
use crate::game::catalog::FishSpecies;

/// Stamina below which the fish gives up entirely.
pub const EXHAUSTION_THRESHOLD: f64 = 20.0;

/// Stamina below which a tired fish may drop back to passive.
pub const TIRED_THRESHOLD: f64 = 40.0;

/// Tension above which rush chance doubles.
pub const RUSH_PROVOKE_TENSION: f64 = 70.0;

/// What the fish is doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorState {
    /// Drifting, weak pull.
    Passive,
    /// Steady resistance.
    Active,
    /// Hard run away from the angler.
    Rush,
    /// Spent, barely pulling.
    Exhausted,
}

impl Default for BehaviorState {
    fn default() -> Self {
        BehaviorState::Passive
    }
}

impl BehaviorState {
    /// Multiplier applied to tension gained from reeling in this state.
    pub fn reel_tension_multiplier(self) -> f64 {
        match self {
            BehaviorState::Passive => 1.0,
            BehaviorState::Active => 1.5,
            BehaviorState::Rush => 3.0,
            BehaviorState::Exhausted => 0.5,
        }
    }
}

/// Result of one behavior tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FishBehavior {
    /// State after this tick.
    pub state: BehaviorState,
    /// Heading change in degrees.
    pub direction_change: f64,
    /// Pull on the line (0-100ish).
    pub pull_force: f64,
    /// Stamina lost per second before drag and rod modifiers.
    pub stamina_drain: f64,
}

/// Behavior model bound to one hooked fish.
#[derive(Clone, Debug)]
pub struct FishBehaviorModel {
    strength: f64,
    aggressiveness: f64,
    weight_factor: f64,
}

impl FishBehaviorModel {
    /// Build the model for a fish of the given weight.
    pub fn new(species: &FishSpecies, weight: f64) -> Self {
        let weight_factor = if species.max_weight > 0.0 {
            weight / species.max_weight
        } else {
            1.0
        };
        Self {
            strength: species.strength as f64,
            aggressiveness: species.aggressiveness as f64,
            weight_factor,
        }
    }

    /// Produce one tick of behavior.
    pub fn update(
        &self,
        current: BehaviorState,
        stamina: f64,
        tension: f64,
        is_reeling: bool,
        rng: &mut DeterministicRng,
    ) -> FishBehavior {
        if stamina < EXHAUSTION_THRESHOLD {
            return self.behavior_for(BehaviorState::Exhausted, tension, rng);
        }

        let next = self.next_state(current, stamina, tension, is_reeling, rng);
        self.behavior_for(next, tension, rng)
    }

    fn next_state(
        &self,
        current: BehaviorState,
        stamina: f64,
        tension: f64,
        is_reeling: bool,
        rng: &mut DeterministicRng,
    ) -> BehaviorState {
        let mut rush_chance = self.aggressiveness / 100.0 * (tension / 100.0) * 0.15;
        if tension > RUSH_PROVOKE_TENSION {
            rush_chance *= 2.0;
        }

        if is_reeling
            && current == BehaviorState::Passive
            && rng.chance(0.3 + self.strength / 200.0)
        {
            return BehaviorState::Active;
        }

        if rng.chance(rush_chance) {
            return BehaviorState::Rush;
        }

        if stamina < TIRED_THRESHOLD && rng.chance(0.4) {
            return BehaviorState::Passive;
        }

        match current {
            BehaviorState::Rush => {
                if rng.chance(0.6) {
                    BehaviorState::Active
                } else {
                    BehaviorState::Passive
                }
            }
            BehaviorState::Active => {
                if rng.chance(0.2 + (100.0 - stamina) / 200.0) {
                    BehaviorState::Passive
                } else {
                    BehaviorState::Active
                }
            }
            BehaviorState::Passive => {
                if rng.chance(self.aggressiveness / 300.0) {
                    BehaviorState::Active
                } else {
                    BehaviorState::Passive
                }
            }
            BehaviorState::Exhausted => BehaviorState::Exhausted,
        }
    }

    fn behavior_for(&self, state: BehaviorState, tension: f64, rng: &mut DeterministicRng) -> FishBehavior {
        match state {
            BehaviorState::Rush => FishBehavior {
                state,
                direction_change: rng.range_f64(-60.0, 60.0),
                pull_force: 70.0 + self.strength * 0.3 * self.weight_factor,
                stamina_drain: 3.0 + self.strength * 0.05,
            },
            BehaviorState::Active => FishBehavior {
                state,
                direction_change: rng.range_f64(-20.0, 20.0),
                pull_force: 30.0 + self.strength * 0.4 * self.weight_factor,
                stamina_drain: 1.5 + tension / 100.0 * 0.5,
            },
            BehaviorState::Passive => FishBehavior {
                state,
                direction_change: rng.range_f64(-5.0, 5.0),
                pull_force: 10.0 + self.strength * 0.1,
                stamina_drain: 0.5,
            },
            BehaviorState::Exhausted => FishBehavior {
                state,
                direction_change: 0.0,
                pull_force: 5.0,
                stamina_drain: 0.1,
            },
        }
    }
}

/// Chance the hook slips out of a fish on a slack line.
///
/// Only fresh fish (stamina above 50) on a line under 10 tension can shake
/// free; the chance grows as the line goes slack.
pub fn escape_chance(tension: f64, stamina: f64) -> f64 {
    if tension < 10.0 && stamina > 50.0 {
        0.02 * (1.0 - tension / 10.0)
    } else {
        0.0
    }
}
