//! Player Input Normalization
//!
//! Inbound values arrive as untrusted floats. Everything the engine consumes
//! passes through here first so the simulation only ever sees in-range values.

use serde::{Serialize, Deserialize};

// =============================================================================
// RANGES
// =============================================================================

/// Largest cast angle in degrees.
pub const MAX_CAST_ANGLE: f64 = 90.0;

/// Smallest drag level.
pub const MIN_DRAG: f64 = 0.1;

/// Largest drag level.
pub const MAX_DRAG: f64 = 1.0;

/// Clamp to [min, max], mapping NaN and infinities to `min`.
#[inline]
pub fn clamp_finite(value: f64, min: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        min
    }
}

/// Clamp to [0, 1].
#[inline]
pub fn clamp_unit(value: f64) -> f64 {
    clamp_finite(value, 0.0, 1.0)
}

/// Clamp a drag level to [0.1, 1.0].
#[inline]
pub fn clamp_drag(level: f64) -> f64 {
    clamp_finite(level, MIN_DRAG, MAX_DRAG)
}

/// Wrap an angle in degrees to (-180, 180].
pub fn normalize_direction(degrees: f64) -> f64 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let mut d = degrees % 360.0;
    while d > 180.0 {
        d -= 360.0;
    }
    while d <= -180.0 {
        d += 360.0;
    }
    d
}

// =============================================================================
// INPUT TYPES
// =============================================================================

/// Cast parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CastInput {
    /// Cast strength (0-1).
    pub power: f64,
    /// Cast angle in degrees (0-90). Steeper casts sink deeper.
    pub angle: f64,
}

impl CastInput {
    /// Create a normalized cast input.
    pub fn new(power: f64, angle: f64) -> Self {
        Self { power, angle }.normalized()
    }

    /// Clamp both fields into range.
    pub fn normalized(self) -> Self {
        Self {
            power: clamp_unit(self.power),
            angle: clamp_finite(self.angle, 0.0, MAX_CAST_ANGLE),
        }
    }
}

/// Player action during a fight.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FightAction {
    /// Reel in at a speed (0-1).
    Reel {
        /// Reel speed.
        speed: f64,
    },
    /// Give line to drop tension.
    Release,
    /// Change the drag level.
    SetDrag {
        /// Requested drag (clamped to 0.1-1.0).
        level: f64,
    },
    /// Do nothing this instant.
    Hold,
}

impl FightAction {
    /// Clamp any payload into range.
    pub fn normalized(self) -> Self {
        match self {
            FightAction::Reel { speed } => FightAction::Reel { speed: clamp_unit(speed) },
            FightAction::SetDrag { level } => FightAction::SetDrag { level: clamp_drag(level) },
            other => other,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            FightAction::Reel { .. } => "reel",
            FightAction::Release => "release",
            FightAction::SetDrag { .. } => "set_drag",
            FightAction::Hold => "hold",
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
