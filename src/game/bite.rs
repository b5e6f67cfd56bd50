//! Bite Calculator
//!
//! Decides, for one bite check, whether a fish takes the bait, which one,
//! how long the float sits before it goes under and how hard it hits.
//! Pure: the only input besides the arguments is the session RNG.

use crate::core::rng::DeterministicRng;
use crate::game::catalog::{BaitId, Catalog, FishSpecies, LocationId};

/// Ceiling on the combined bite probability of one check.
pub const MAX_BITE_PROBABILITY: f64 = 0.8;

/// Wait range when nothing can bite here at all.
pub const EMPTY_WATER_WAIT: (f64, f64) = (30.0, 60.0);

/// Wait range after an unlucky roll.
pub const MISSED_ROLL_WAIT: (f64, f64) = (15.0, 45.0);

/// Where and with what the line is in the water.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BiteContext {
    /// Location fished.
    pub location: LocationId,
    /// Bait on the hook.
    pub bait: BaitId,
    /// Cast distance (m).
    pub cast_distance: f64,
    /// Bait depth (m).
    pub depth: f64,
    /// Local hour of day (0-23).
    pub hour: u8,
}

/// Outcome of a bite check.
#[derive(Clone, Debug, PartialEq)]
pub struct BiteResult {
    /// A fish takes the bait.
    pub will_bite: bool,
    /// The biting species.
    pub fish: Option<FishSpecies>,
    /// Seconds until the bite, or until the next check when nothing bit.
    pub wait_seconds: f64,
    /// Bite strength (0.3-1.0), zero when nothing bit.
    pub intensity: f64,
}

impl BiteResult {
    fn no_bite(wait_seconds: f64) -> Self {
        Self { will_bite: false, fish: None, wait_seconds, intensity: 0.0 }
    }
}

/// Bite calculator over a catalog.
pub struct BiteCalculator<'a> {
    catalog: &'a dyn Catalog,
}

impl<'a> BiteCalculator<'a> {
    /// Create a calculator reading species from the catalog.
    pub fn new(catalog: &'a dyn Catalog) -> Self {
        Self { catalog }
    }

    /// Run one bite check.
    pub fn calculate(&self, ctx: &BiteContext, rng: &mut DeterministicRng) -> BiteResult {
        let fish = self.catalog.fish_at(ctx.location, ctx.depth);
        roll_bite(ctx, &fish, rng)
    }
}

/// Run one bite check against an explicit list of fish found at the depth.
pub fn roll_bite(ctx: &BiteContext, fish: &[FishSpecies], rng: &mut DeterministicRng) -> BiteResult {
    let candidates: Vec<(&FishSpecies, f64)> = fish
        .iter()
        .filter(|f| f.is_active_at(ctx.hour))
        .filter_map(|f| {
            let attraction = f.attraction_for(ctx.bait);
            if attraction == 0 {
                None
            } else {
                Some((f, bite_probability(f, attraction, ctx.depth)))
            }
        })
        .collect();

    if candidates.is_empty() {
        return BiteResult::no_bite(rng.range_f64(EMPTY_WATER_WAIT.0, EMPTY_WATER_WAIT.1));
    }

    let total: f64 = candidates.iter().map(|(_, p)| p).sum();
    if rng.next_f64() >= total.min(MAX_BITE_PROBABILITY) {
        return BiteResult::no_bite(rng.range_f64(MISSED_ROLL_WAIT.0, MISSED_ROLL_WAIT.1));
    }

    let chosen = match weighted_select(&candidates, rng) {
        Some(f) => *f,
        None => return BiteResult::no_bite(rng.range_f64(MISSED_ROLL_WAIT.0, MISSED_ROLL_WAIT.1)),
    };

    let (min_wait, max_wait) = chosen.rarity.wait_range();
    let wait_seconds = rng.range_f64(min_wait, max_wait);
    let intensity = bite_intensity(chosen, rng);

    BiteResult {
        will_bite: true,
        fish: Some(chosen.clone()),
        wait_seconds,
        intensity,
    }
}

/// Bite probability of one species for a bait attraction and depth.
pub fn bite_probability(fish: &FishSpecies, attraction: u32, depth: f64) -> f64 {
    let attraction_factor = 0.5 + attraction as f64 / 100.0;
    fish.rarity.bite_factor() * attraction_factor * depth_factor(fish, depth)
}

/// How well the depth matches the species, from 0.5 to 1.0.
pub fn depth_factor(fish: &FishSpecies, depth: f64) -> f64 {
    let range = fish.depth_range();
    let diff = (depth - fish.depth_center()).abs();
    if range <= 0.0 {
        return if diff == 0.0 { 1.0 } else { 0.5 };
    }
    (1.0 - diff / range).max(0.5)
}

fn bite_intensity(fish: &FishSpecies, rng: &mut DeterministicRng) -> f64 {
    let base = (fish.strength + fish.aggressiveness) as f64 / 200.0;
    (base + rng.range_f64(-0.1, 0.1)).clamp(0.3, 1.0)
}

/// Pick an item with probability proportional to its weight.
///
/// Draws in [0, total) and walks the cumulative sum with a strict `<`,
/// falling back to the last item on rounding overflow.
pub fn weighted_select<'t, T>(items: &'t [(T, f64)], rng: &mut DeterministicRng) -> Option<&'t T> {
    let last = items.last()?;
    let total: f64 = items.iter().map(|(_, w)| w).sum();
    let r = rng.range_f64(0.0, total);

    let mut cumulative = 0.0;
    for (item, weight) in items {
        cumulative += weight;
        if r < cumulative {
            return Some(item);
        }
    }
    Some(&last.0)
}
