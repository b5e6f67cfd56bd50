//! Game Logic Module
//!
//! The fishing engine. Pure state and simulation; no I/O beyond the
//! collaborator traits.
//!
//! ## Module Structure
//!
//! - `catalog`: Species, locations, tackle and the `Catalog` trait
//! - `services`: Player identity and the `PlayerServices` trait
//! - `input`: Clamping and normalization of player input
//! - `bite`: Bite probability, fish selection and wait times
//! - `fish_ai`: Per-tick behavior of a hooked fish
//! - `fight`: Line physics and terminal conditions
//! - `session`: Session state machine
//! - `events`: Events emitted by session transitions

pub mod catalog;
pub mod services;
pub mod input;
pub mod bite;
pub mod fish_ai;
pub mod fight;
pub mod session;
pub mod events;

// Re-export key types
pub use catalog::{Catalog, InMemoryCatalog, FishSpecies, Location, Rarity, Tackle, Equipment};
pub use services::{PlayerId, PlayerServices, InMemoryPlayerServices};
pub use input::{CastInput, FightAction};
pub use fight::{FightState, FightOutcome, FailureReason};
pub use session::{FishingSession, SessionState, SessionError};
pub use events::SessionEvent;
