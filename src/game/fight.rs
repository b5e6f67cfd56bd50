//! Fight Simulator
//!
//! Per-tick authority over an active fight. Player actions are applied
//! immediately; `advance` runs the fish model, line physics and the terminal
//! checks.
//!
//! ## Terminal priority
//!
//! 1. Tension at or above 100 breaks the line.
//! 2. Line health at zero wears the line through.
//! 3. A fish beyond 90% of the spool escapes.
//! 4. A close, tired fish (or one with no stamina left) is caught.
//! 5. A fresh fish on a slack line may shake the hook.

use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;
use crate::game::catalog::{FishSpecies, Tackle};
use crate::game::fish_ai::{escape_chance, BehaviorState, FishBehaviorModel};
use crate::game::input::{clamp_drag, normalize_direction, FightAction};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Tension added per unit of effective reel speed.
pub const TENSION_PER_REEL: f64 = 5.0;

/// Metres recovered per unit of effective reel speed.
pub const DISTANCE_PER_REEL: f64 = 0.5;

/// Tension dropped by giving line.
pub const RELEASE_TENSION_DROP: f64 = 20.0;

/// Metres given back by a release.
pub const RELEASE_DISTANCE: f64 = 1.0;

/// Metres per second a rushing fish takes.
pub const RUSH_DISTANCE_PER_SEC: f64 = 2.0;

/// Natural tension decay per second.
pub const TENSION_DECAY_PER_SEC: f64 = 2.0;

/// Tension above which the line wears.
pub const LINE_DAMAGE_THRESHOLD: f64 = 80.0;

/// Tension reported as critical.
pub const CRITICAL_TENSION: f64 = 90.0;

/// Tension at which the line snaps.
pub const MAX_TENSION: f64 = 100.0;

/// Tension right after the hook set.
pub const HOOK_SET_TENSION: f64 = 30.0;

/// Initial drag level.
pub const DEFAULT_DRAG: f64 = 0.5;

/// Landing distance (m).
pub const LANDING_DISTANCE: f64 = 3.0;

// =============================================================================
// FIGHT STATE
// =============================================================================

/// Mutable fight sub-state of a session.
#[derive(Clone, Debug, PartialEq)]
pub struct FightState {
    /// Current fish behavior.
    pub behavior: BehaviorState,
    /// Fish stamina (0-100).
    pub stamina: f64,
    /// Fish distance from the angler (m).
    pub distance: f64,
    /// Fish heading in degrees, (-180, 180].
    pub direction: f64,
    /// Line tension (0-100).
    pub tension: f64,
    /// Line health (0-100).
    pub line_health: f64,
    /// Drag level (0.1-1.0).
    pub drag_level: f64,
    /// A reel action arrived since the last tick.
    pub is_reeling: bool,
}

impl Default for FightState {
    fn default() -> Self {
        Self {
            behavior: BehaviorState::Passive,
            stamina: 100.0,
            distance: 0.0,
            direction: 0.0,
            tension: 0.0,
            line_health: 100.0,
            drag_level: DEFAULT_DRAG,
            is_reeling: false,
        }
    }
}

impl FightState {
    /// State right after a successful hook set. The fish starts the fight
    /// active.
    pub fn hooked(cast_distance: f64) -> Self {
        Self {
            behavior: BehaviorState::Active,
            distance: (cast_distance * 0.8).max(0.0),
            tension: HOOK_SET_TENSION,
            ..Self::default()
        }
    }

    /// Return every field to its default.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Tension is in the danger zone.
    pub fn is_critical(&self) -> bool {
        self.tension >= CRITICAL_TENSION
    }

    /// Rounded view for clients.
    pub fn view(&self) -> FightView {
        FightView {
            behavior_state: self.behavior,
            stamina: round_to(self.stamina, 1),
            distance: round_to(self.distance, 1),
            direction: round_to(self.direction, 1),
            tension: round_to(self.tension, 1),
            line_health: round_to(self.line_health, 1),
            drag_level: round_to(self.drag_level, 2),
            is_critical: self.is_critical(),
        }
    }
}

/// Client-facing fight snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FightView {
    /// Fish behavior.
    pub behavior_state: BehaviorState,
    /// Fish stamina.
    pub stamina: f64,
    /// Fish distance.
    pub distance: f64,
    /// Fish heading.
    pub direction: f64,
    /// Line tension.
    pub tension: f64,
    /// Line health.
    pub line_health: f64,
    /// Drag level.
    pub drag_level: f64,
    /// Tension at or above 90.
    pub is_critical: bool,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

// =============================================================================
// OUTCOMES
// =============================================================================

/// Why a fight was lost.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Tension reached 100.
    LineBreak,
    /// Line health reached 0.
    LineWorn,
    /// Fish ran out of line or shook the hook.
    FishEscaped,
}

impl FailureReason {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::LineBreak => "line_break",
            FailureReason::LineWorn => "line_worn",
            FailureReason::FishEscaped => "fish_escaped",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of a fight tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FightOutcome {
    /// Fish landed.
    Caught,
    /// Fish lost.
    Failed(FailureReason),
}

// =============================================================================
// SIMULATOR
// =============================================================================

/// Fight rules for one hooked fish and one tackle snapshot.
#[derive(Clone, Debug)]
pub struct FightSimulator {
    model: FishBehaviorModel,
    rod_power: f64,
    reel_speed_factor: f64,
    line_length: f64,
}

impl FightSimulator {
    /// Bind the simulator to a fish and the tackle captured at cast.
    pub fn new(species: &FishSpecies, weight: f64, tackle: &Tackle) -> Self {
        Self {
            model: FishBehaviorModel::new(species, weight),
            rod_power: tackle.rod.power,
            reel_speed_factor: tackle.reel_speed_factor(),
            line_length: tackle.line.length,
        }
    }

    /// Apply a player action. Terminal checks wait for the next tick.
    pub fn apply_action(&self, state: &mut FightState, action: FightAction) {
        match action.normalized() {
            FightAction::Reel { speed } => {
                let effective = speed * self.reel_speed_factor;
                let multiplier = state.behavior.reel_tension_multiplier();

                state.distance = (state.distance - DISTANCE_PER_REEL * effective).max(0.0);
                state.tension = (state.tension + TENSION_PER_REEL * effective * multiplier).min(MAX_TENSION);
                state.stamina = (state.stamina - 0.5 * effective).max(0.0);
                if speed > 0.0 {
                    state.is_reeling = true;
                }
            }
            FightAction::Release => {
                state.tension = (state.tension - RELEASE_TENSION_DROP).max(0.0);
                state.distance += RELEASE_DISTANCE;
            }
            FightAction::SetDrag { level } => {
                state.drag_level = clamp_drag(level);
            }
            FightAction::Hold => {}
        }
    }

    /// Advance the fight by `dt` seconds.
    ///
    /// A non-positive or non-finite `dt` leaves the state and the RNG untouched.
    pub fn advance(&self, state: &mut FightState, dt: f64, rng: &mut DeterministicRng) -> Option<FightOutcome> {
        if !dt.is_finite() || dt <= 0.0 {
            return None;
        }

        let behavior = self.model.update(state.behavior, state.stamina, state.tension, state.is_reeling, rng);
        state.is_reeling = false;
        state.behavior = behavior.state;
        state.direction = normalize_direction(state.direction + behavior.direction_change);

        let mut tension = state.tension + behavior.pull_force * state.drag_level * dt * 0.5;

        if behavior.state == BehaviorState::Rush {
            state.distance += RUSH_DISTANCE_PER_SEC * dt;
        }

        let drain = behavior.stamina_drain
            * dt
            * (1.0 + state.drag_level * 0.5)
            * (1.0 + self.rod_power / 200.0);
        state.stamina = (state.stamina - drain).max(0.0);

        tension = (tension - TENSION_DECAY_PER_SEC * dt).max(0.0);
        if tension > LINE_DAMAGE_THRESHOLD {
            let damage = (tension - LINE_DAMAGE_THRESHOLD) * 0.1 * dt;
            state.line_health = (state.line_health - damage).max(0.0);
        }

        // Stored tension stays in range; the break check uses the raw value.
        state.tension = tension.min(MAX_TENSION);

        self.evaluate(state, tension, rng)
    }

    fn evaluate(&self, state: &FightState, raw_tension: f64, rng: &mut DeterministicRng) -> Option<FightOutcome> {
        if raw_tension >= MAX_TENSION {
            return Some(FightOutcome::Failed(FailureReason::LineBreak));
        }
        if state.line_health <= 0.0 {
            return Some(FightOutcome::Failed(FailureReason::LineWorn));
        }
        if state.distance > self.line_length * 0.9 {
            return Some(FightOutcome::Failed(FailureReason::FishEscaped));
        }

        let landed = state.distance <= LANDING_DISTANCE && state.stamina < 20.0;
        if landed || state.stamina <= 0.0 {
            return Some(FightOutcome::Caught);
        }

        if rng.chance(escape_chance(state.tension, state.stamina)) {
            return Some(FightOutcome::Failed(FailureReason::FishEscaped));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::catalog::{starter_tackle, ActiveHours, Rarity};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn species() -> FishSpecies {
        FishSpecies {
            id: 4,
            name: "Pike".into(),
            min_weight: 1.0,
            max_weight: 10.0,
            rarity: Rarity::Rare,
            base_price: 20,
            strength: 40,
            stamina: 60,
            aggressiveness: 50,
            active_hours: ActiveHours::default(),
            depth_min: 1.0,
            depth_max: 8.0,
            locations: vec![1],
            bait_attraction: BTreeMap::new(),
        }
    }

    fn tackle(rod_power: f64, retrieve_speed: f64) -> Tackle {
        let mut tackle = starter_tackle();
        tackle.rod.power = rod_power;
        tackle.reel.retrieve_speed = retrieve_speed;
        tackle.line.breaking_strength = 20.0;
        tackle.line.length = 100.0;
        tackle
    }

    fn simulator() -> FightSimulator {
        FightSimulator::new(&species(), 5.0, &tackle(50.0, 80.0))
    }

    #[test]
    fn test_reel_scenario() {
        let sim = simulator();
        let mut state = FightState { behavior: BehaviorState::Passive, ..FightState::hooked(50.0) };

        sim.apply_action(&mut state, FightAction::Reel { speed: 1.0 });

        assert!((state.tension - 38.0).abs() < 1e-9);
        assert!((state.distance - 39.2).abs() < 1e-9);
        assert!((state.stamina - 99.2).abs() < 1e-9);
        assert!(state.is_reeling);
    }

    #[test]
    fn test_hooked_fish_starts_active() {
        let state = FightState::hooked(50.0);
        assert_eq!(state.behavior, BehaviorState::Active);
        assert_eq!(state.distance, 40.0);
        assert_eq!(state.tension, HOOK_SET_TENSION);

        let sim = simulator();
        let mut state = FightState::hooked(50.0);
        sim.apply_action(&mut state, FightAction::Reel { speed: 0.5 });
        // 5 * 0.5 * 1.6 * 1.5
        assert!((state.tension - 36.0).abs() < 1e-9);
    }

    #[test]
    fn test_reel_multiplier_by_behavior() {
        let sim = simulator();
        let mut state = FightState { behavior: BehaviorState::Rush, ..FightState::hooked(50.0) };

        sim.apply_action(&mut state, FightAction::Reel { speed: 0.5 });
        // 5 * 0.5 * 1.6 * 3.0
        assert!((state.tension - 42.0).abs() < 1e-9);
    }

    #[test]
    fn test_reel_caps_tension_and_floors_distance() {
        let sim = simulator();
        let mut state = FightState { tension: 99.0, distance: 0.3, ..FightState::default() };

        sim.apply_action(&mut state, FightAction::Reel { speed: 1.0 });
        assert_eq!(state.tension, MAX_TENSION);
        assert_eq!(state.distance, 0.0);
    }

    #[test]
    fn test_zero_speed_reel_is_not_reeling() {
        let sim = simulator();
        let mut state = FightState::hooked(50.0);

        sim.apply_action(&mut state, FightAction::Reel { speed: 0.0 });
        assert!(!state.is_reeling);
        assert_eq!(state, FightState::hooked(50.0));
    }

    #[test]
    fn test_release_drag_hold() {
        let sim = simulator();
        let mut state = FightState { tension: 15.0, distance: 10.0, ..FightState::default() };

        sim.apply_action(&mut state, FightAction::Release);
        assert_eq!(state.tension, 0.0);
        assert_eq!(state.distance, 11.0);

        sim.apply_action(&mut state, FightAction::SetDrag { level: 2.0 });
        assert_eq!(state.drag_level, 1.0);
        sim.apply_action(&mut state, FightAction::SetDrag { level: 0.0 });
        assert_eq!(state.drag_level, 0.1);

        let before = state.clone();
        sim.apply_action(&mut state, FightAction::Hold);
        assert_eq!(state, before);
    }

    #[test]
    fn test_advance_zero_is_noop() {
        let sim = simulator();
        let mut rng = DeterministicRng::new(1);
        let mut state = FightState { is_reeling: true, ..FightState::hooked(40.0) };
        let before = state.clone();
        let rng_before = rng.state();

        assert_eq!(sim.advance(&mut state, 0.0, &mut rng), None);
        assert_eq!(sim.advance(&mut state, -1.0, &mut rng), None);
        assert_eq!(sim.advance(&mut state, f64::NAN, &mut rng), None);
        assert_eq!(state, before);
        assert_eq!(rng.state(), rng_before);
    }

    #[test]
    fn test_win_by_distance() {
        let sim = simulator();
        let mut rng = DeterministicRng::new(2);
        let mut state = FightState { stamina: 19.0, distance: 3.0, tension: 30.0, ..FightState::default() };

        assert_eq!(sim.advance(&mut state, 0.1, &mut rng), Some(FightOutcome::Caught));
        assert_eq!(state.behavior, BehaviorState::Exhausted);
    }

    #[test]
    fn test_win_by_exhaustion() {
        let sim = simulator();
        let mut rng = DeterministicRng::new(3);
        let mut state = FightState { stamina: 0.0, distance: 50.0, tension: 30.0, ..FightState::default() };

        assert_eq!(sim.advance(&mut state, 0.1, &mut rng), Some(FightOutcome::Caught));
    }

    #[test]
    fn test_line_break_in_single_advance() {
        let sim = simulator();
        let mut rng = DeterministicRng::new(4);
        let mut state = FightState { tension: 98.0, drag_level: 1.0, distance: 20.0, ..FightState::default() };

        let outcome = sim.advance(&mut state, 1.0, &mut rng);
        assert_eq!(outcome, Some(FightOutcome::Failed(FailureReason::LineBreak)));
        assert!(state.tension <= MAX_TENSION);

        state.reset();
        assert_eq!(state, FightState::default());
        assert_eq!(state.stamina, 100.0);
        assert_eq!(state.distance, 0.0);
        assert_eq!(state.tension, 0.0);
        assert_eq!(state.line_health, 100.0);
    }

    #[test]
    fn test_line_worn() {
        let sim = simulator();
        let mut rng = DeterministicRng::new(5);
        let mut state = FightState {
            tension: 85.0,
            drag_level: 0.1,
            line_health: 0.01,
            distance: 20.0,
            ..FightState::default()
        };

        let outcome = sim.advance(&mut state, 0.1, &mut rng);
        assert_eq!(outcome, Some(FightOutcome::Failed(FailureReason::LineWorn)));
        assert_eq!(state.line_health, 0.0);
    }

    #[test]
    fn test_fish_runs_out_of_line() {
        let sim = simulator();
        let mut rng = DeterministicRng::new(6);
        let mut state = FightState { distance: 95.0, tension: 30.0, ..FightState::default() };

        let outcome = sim.advance(&mut state, 0.1, &mut rng);
        assert_eq!(outcome, Some(FightOutcome::Failed(FailureReason::FishEscaped)));
    }

    #[test]
    fn test_slack_line_escape_rate() {
        let sim = simulator();
        let mut rng = DeterministicRng::new(7);

        let trials = 4000;
        let escaped = (0..trials)
            .filter(|_| {
                let mut state = FightState { tension: 0.0, drag_level: 0.1, stamina: 90.0, distance: 20.0, ..FightState::default() };
                sim.advance(&mut state, 0.1, &mut rng) == Some(FightOutcome::Failed(FailureReason::FishEscaped))
            })
            .count();

        // Roughly 2% of ticks on a fully slack line.
        assert!(escaped > 30 && escaped < 140, "escaped {}", escaped);
    }

    #[test]
    fn test_view_rounds_values() {
        let state = FightState {
            stamina: 55.56,
            distance: 12.349,
            direction: -33.333,
            tension: 90.04,
            line_health: 99.99,
            drag_level: 0.456,
            ..FightState::default()
        };
        let view = state.view();

        assert_eq!(view.stamina, 55.6);
        assert_eq!(view.distance, 12.3);
        assert_eq!(view.direction, -33.3);
        assert_eq!(view.tension, 90.0);
        assert_eq!(view.line_health, 100.0);
        assert_eq!(view.drag_level, 0.46);
        assert!(view.is_critical);
    }

    fn arb_action() -> impl Strategy<Value = FightAction> {
        prop_oneof![
            (-1.0f64..2.0).prop_map(|speed| FightAction::Reel { speed }),
            Just(FightAction::Release),
            (-1.0f64..2.0).prop_map(|level| FightAction::SetDrag { level }),
            Just(FightAction::Hold),
        ]
    }

    proptest! {
        #[test]
        fn prop_ticks_keep_bounds(
            seed in any::<u64>(),
            cast in 0.0f64..80.0,
            actions in proptest::collection::vec(arb_action(), 1..200),
        ) {
            let sim = simulator();
            let mut rng = DeterministicRng::new(seed);
            let mut state = FightState::hooked(cast);

            for action in actions {
                sim.apply_action(&mut state, action);
                let outcome = sim.advance(&mut state, 0.1, &mut rng);

                prop_assert!((0.0..=MAX_TENSION).contains(&state.tension));
                prop_assert!((0.0..=100.0).contains(&state.stamina));
                prop_assert!((0.0..=100.0).contains(&state.line_health));
                prop_assert!(state.distance >= 0.0);
                prop_assert!(state.direction > -180.0 && state.direction <= 180.0);
                prop_assert!((0.1..=1.0).contains(&state.drag_level));

                if outcome.is_some() {
                    break;
                }
            }
        }
    }
}
