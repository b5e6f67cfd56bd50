//! Player Services
//!
//! Everything the engine needs to know or tell about a player lives behind
//! the `PlayerServices` trait. Account storage, currency and achievement
//! bookkeeping belong to other systems; `InMemoryPlayerServices` is a small
//! stand-in for local runs and tests.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

use crate::game::catalog::{starter_tackle, Equipment, EquipmentSlot, FishSpecies, Loadout, Location, LocationId, Tackle};

// =============================================================================
// PLAYER ID
// =============================================================================

/// Unique player identifier (16 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub [u8; 16]);

impl PlayerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Derive the id for an authenticated account subject.
    pub fn from_subject(subject: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"angler-player:");
        hasher.update(subject.as_bytes());
        let hash = hasher.finalize();

        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash[..16]);
        Self(bytes)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

// =============================================================================
// SERVICE TRAIT
// =============================================================================

/// Rewards granted for a landed fish.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatchReward {
    /// Money earned.
    pub price: u32,
    /// Experience earned.
    pub experience: u32,
    /// The catch pushed the player up at least one level.
    pub leveled_up: bool,
    /// Level after the catch.
    pub new_level: u32,
}

/// Player-side collaborator of the fishing engine.
pub trait PlayerServices: Send + Sync {
    /// Complete equipped tackle, or the first empty slot.
    fn equipped_tackle(&self, player: PlayerId) -> Result<Tackle, EquipmentSlot>;

    /// Use one unit of the equipped bait. False when there is none.
    fn consume_bait(&self, player: PlayerId) -> bool;

    /// Can the player fish at this location.
    fn can_access_location(&self, player: PlayerId, location: &Location) -> bool;

    /// Book a landed fish and pay out its rewards.
    fn record_catch(&self, player: PlayerId, fish: &FishSpecies, location: LocationId, weight: f64) -> CatchReward;

    /// Count a cast.
    fn record_cast_stats(&self, player: PlayerId);

    /// Count a landed fish and its fight duration.
    fn record_catch_stats(&self, player: PlayerId, fish: &FishSpecies, fight_duration: Duration);

    /// Count a fish lost to escape or a worn line.
    fn record_fish_escaped(&self, player: PlayerId);

    /// Count a snapped line.
    fn record_line_break(&self, player: PlayerId);

    /// Unlock any achievements now reached, returning their names.
    fn check_achievements(&self, player: PlayerId) -> Vec<String>;
}

// =============================================================================
// IN-MEMORY IMPLEMENTATION
// =============================================================================

/// Bait units handed out with the starter tackle.
pub const STARTER_BAIT: u32 = 50;

/// Catch-count milestones unlocked by the in-memory services.
const CATCH_MILESTONES: [(u32, &str); 3] = [(1, "First Catch"), (10, "Ten in the Net"), (100, "Seasoned Angler")];

/// Fishing counters kept per player.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlayerStats {
    /// Casts made.
    pub total_casts: u32,
    /// Fish landed.
    pub successful_catches: u32,
    /// Fish lost by escape or worn line.
    pub fish_escaped: u32,
    /// Lines snapped.
    pub line_breaks: u32,
    /// Longest landed fight (s).
    pub longest_fight_seconds: u64,
}

#[derive(Debug)]
struct PlayerRecord {
    level: u32,
    experience: u64,
    loadout: Loadout,
    bait_quantity: u32,
    stats: PlayerStats,
    unlocked: BTreeSet<&'static str>,
}

impl PlayerRecord {
    /// Add experience, levelling up as many times as it covers.
    fn add_experience(&mut self, amount: u64) -> bool {
        let start = self.level;
        self.experience += amount;
        loop {
            let needed = experience_for_level(self.level);
            if self.experience < needed {
                break;
            }
            self.experience -= needed;
            self.level += 1;
        }
        self.level > start
    }
}

/// Experience needed to leave `level`.
fn experience_for_level(level: u32) -> u64 {
    (100.0 * (level as f64).powf(1.5)) as u64
}

/// Process-local player services.
#[derive(Debug, Default)]
pub struct InMemoryPlayerServices {
    players: Mutex<HashMap<PlayerId, PlayerRecord>>,
}

impl InMemoryPlayerServices {
    fn players(&self) -> MutexGuard<'_, HashMap<PlayerId, PlayerRecord>> {
        // A panic while holding the lock leaves plain data behind; keep using it.
        self.players.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_player<R>(&self, player: PlayerId, f: impl FnOnce(&mut PlayerRecord) -> R) -> Option<R> {
        self.players().get_mut(&player).map(f)
    }

    /// Create a level 1 profile with the starter tackle. Returns false if it
    /// already exists.
    pub fn create_profile(&self, player: PlayerId) -> bool {
        let tackle = starter_tackle();
        let mut loadout = Loadout::default();
        for item in [
            Equipment::Rod(tackle.rod),
            Equipment::Reel(tackle.reel),
            Equipment::Line(tackle.line),
            Equipment::Bait(tackle.bait),
        ] {
            loadout.equip(item);
        }
        self.create_profile_with(player, loadout, STARTER_BAIT)
    }

    /// Create a level 1 profile with the given loadout and bait supply.
    /// Returns false if it already exists.
    pub fn create_profile_with(&self, player: PlayerId, loadout: Loadout, bait_quantity: u32) -> bool {
        let mut players = self.players();
        if players.contains_key(&player) {
            return false;
        }
        players.insert(player, PlayerRecord {
            level: 1,
            experience: 0,
            loadout,
            bait_quantity,
            stats: PlayerStats::default(),
            unlocked: BTreeSet::new(),
        });
        true
    }

    /// Counters for one player.
    pub fn stats(&self, player: PlayerId) -> Option<PlayerStats> {
        self.with_player(player, |record| record.stats.clone())
    }
}

#[cfg(test)]
impl InMemoryPlayerServices {
    pub(crate) fn set_bait_quantity(&self, player: PlayerId, quantity: u32) {
        self.with_player(player, |record| record.bait_quantity = quantity);
    }

    pub(crate) fn bait_quantity(&self, player: PlayerId) -> Option<u32> {
        self.with_player(player, |record| record.bait_quantity)
    }
}

impl PlayerServices for InMemoryPlayerServices {
    fn equipped_tackle(&self, player: PlayerId) -> Result<Tackle, EquipmentSlot> {
        self.with_player(player, |record| record.loadout.tackle())
            .unwrap_or(Err(EquipmentSlot::Rod))
    }

    fn consume_bait(&self, player: PlayerId) -> bool {
        // The bait stays equipped at zero units so an empty supply reads as
        // "no bait" rather than incomplete tackle.
        self.with_player(player, |record| match record.bait_quantity.checked_sub(1) {
            Some(left) => {
                record.bait_quantity = left;
                true
            }
            None => false,
        })
        .unwrap_or(false)
    }

    fn can_access_location(&self, player: PlayerId, location: &Location) -> bool {
        self.with_player(player, |record| location.is_active && location.required_level <= record.level)
            .unwrap_or(false)
    }

    fn record_catch(&self, player: PlayerId, fish: &FishSpecies, _location: LocationId, weight: f64) -> CatchReward {
        let price = fish.calculate_price(weight);
        let experience = fish.calculate_experience(weight);

        self.with_player(player, |record| {
            let leveled_up = record.add_experience(experience as u64);
            CatchReward { price, experience, leveled_up, new_level: record.level }
        })
        .unwrap_or(CatchReward { price, experience, leveled_up: false, new_level: 1 })
    }

    fn record_cast_stats(&self, player: PlayerId) {
        self.with_player(player, |record| record.stats.total_casts += 1);
    }

    fn record_catch_stats(&self, player: PlayerId, _fish: &FishSpecies, fight_duration: Duration) {
        let seconds = fight_duration.as_secs();
        self.with_player(player, |record| {
            record.stats.successful_catches += 1;
            record.stats.longest_fight_seconds = record.stats.longest_fight_seconds.max(seconds);
        });
    }

    fn record_fish_escaped(&self, player: PlayerId) {
        self.with_player(player, |record| record.stats.fish_escaped += 1);
    }

    fn record_line_break(&self, player: PlayerId) {
        self.with_player(player, |record| record.stats.line_breaks += 1);
    }

    fn check_achievements(&self, player: PlayerId) -> Vec<String> {
        self.with_player(player, |record| {
            let mut unlocked = Vec::new();
            for (target, name) in CATCH_MILESTONES {
                if record.stats.successful_catches >= target && record.unlocked.insert(name) {
                    unlocked.push(name.to_string());
                }
            }
            unlocked
        })
        .unwrap_or_default()
    }
}
