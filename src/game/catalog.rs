//! Catalog Reference Data
//!
//! Read-only data the engine simulates against: fish species, locations and
//! tackle. Storage lives outside the engine; the `Catalog` trait is the seam,
//! and `InMemoryCatalog` is the reference implementation loaded from JSON.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::rng::DeterministicRng;

/// Location identifier.
pub type LocationId = u32;

/// Fish species identifier.
pub type FishId = u32;

/// Bait identifier.
pub type BaitId = u32;

/// Attraction used when a species has no entry for the equipped bait.
pub const DEFAULT_BAIT_ATTRACTION: u32 = 20;

// =============================================================================
// RARITY
// =============================================================================

/// Fish rarity tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    /// Everyday catch.
    Common,
    /// Slightly harder to find.
    Uncommon,
    /// Rare.
    Rare,
    /// Epic.
    Epic,
    /// Legendary.
    Legendary,
}

impl Rarity {
    /// Base bite probability factor.
    pub fn bite_factor(self) -> f64 {
        match self {
            Rarity::Common => 0.4,
            Rarity::Uncommon => 0.25,
            Rarity::Rare => 0.15,
            Rarity::Epic => 0.08,
            Rarity::Legendary => 0.03,
        }
    }

    /// Seconds before the bite lands, as a uniform range.
    pub fn wait_range(self) -> (f64, f64) {
        match self {
            Rarity::Common => (5.0, 20.0),
            Rarity::Uncommon => (10.0, 30.0),
            Rarity::Rare => (20.0, 45.0),
            Rarity::Epic => (30.0, 60.0),
            Rarity::Legendary => (45.0, 90.0),
        }
    }

    /// Sale price multiplier.
    pub fn price_multiplier(self) -> f64 {
        match self {
            Rarity::Common => 1.0,
            Rarity::Uncommon => 1.5,
            Rarity::Rare => 2.5,
            Rarity::Epic => 4.0,
            Rarity::Legendary => 8.0,
        }
    }

    /// Experience granted before the weight bonus.
    pub fn base_experience(self) -> u32 {
        match self {
            Rarity::Common => 10,
            Rarity::Uncommon => 25,
            Rarity::Rare => 50,
            Rarity::Epic => 100,
            Rarity::Legendary => 250,
        }
    }
}

// =============================================================================
// FISH SPECIES
// =============================================================================

/// Hours of the day a species feeds: `from` inclusive, `until` exclusive.
///
/// A window with `from > until` wraps past midnight (e.g. 22 -> 4).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveHours {
    /// First active hour (0-23).
    pub from: u8,
    /// First inactive hour (1-24).
    pub until: u8,
}

impl Default for ActiveHours {
    fn default() -> Self {
        Self { from: 0, until: 24 }
    }
}

impl ActiveHours {
    /// Check if the window covers the given hour.
    pub fn contains(&self, hour: u8) -> bool {
        if self.from <= self.until {
            self.from <= hour && hour < self.until
        } else {
            hour >= self.from || hour < self.until
        }
    }
}

/// A fish species as stored in the catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FishSpecies {
    /// Species identifier.
    pub id: FishId,
    /// Display name.
    pub name: String,
    /// Smallest weight (kg).
    pub min_weight: f64,
    /// Largest weight (kg).
    pub max_weight: f64,
    /// Rarity tier.
    pub rarity: Rarity,
    /// Price per kg before the rarity multiplier.
    pub base_price: u32,
    /// Fight strength (1-100).
    pub strength: u32,
    /// Fight endurance (1-100).
    pub stamina: u32,
    /// Rush frequency (1-100).
    pub aggressiveness: u32,
    /// Feeding window.
    #[serde(default)]
    pub active_hours: ActiveHours,
    /// Shallowest depth the species is found at (m).
    pub depth_min: f64,
    /// Deepest depth the species is found at (m).
    pub depth_max: f64,
    /// Locations the species lives in.
    pub locations: Vec<LocationId>,
    /// Bait attraction (0-100) keyed by bait id.
    #[serde(default)]
    pub bait_attraction: BTreeMap<BaitId, u32>,
}

impl FishSpecies {
    /// Attraction of this species to a bait, defaulting when unlisted.
    pub fn attraction_for(&self, bait: BaitId) -> u32 {
        self.bait_attraction
            .get(&bait)
            .copied()
            .unwrap_or(DEFAULT_BAIT_ATTRACTION)
    }

    /// Is the species feeding at this hour.
    pub fn is_active_at(&self, hour: u8) -> bool {
        self.active_hours.contains(hour)
    }

    /// Midpoint of the depth range.
    pub fn depth_center(&self) -> f64 {
        (self.depth_min + self.depth_max) / 2.0
    }

    /// Width of the depth range.
    pub fn depth_range(&self) -> f64 {
        self.depth_max - self.depth_min
    }

    /// Check if the species can be found at a depth.
    pub fn lives_at_depth(&self, depth: f64) -> bool {
        self.depth_min <= depth && depth <= self.depth_max
    }

    /// Roll a weight for a hooked fish, rounded to 10 g.
    pub fn generate_weight(&self, rng: &mut DeterministicRng) -> f64 {
        let raw = rng.range_f64(self.min_weight, self.max_weight);
        let rounded = (raw * 100.0).round() / 100.0;
        rounded.clamp(self.min_weight, self.max_weight)
    }

    /// Sale price of a fish of the given weight.
    pub fn calculate_price(&self, weight: f64) -> u32 {
        (weight * self.base_price as f64 * self.rarity.price_multiplier()) as u32
    }

    /// Experience for landing a fish of the given weight.
    pub fn calculate_experience(&self, weight: f64) -> u32 {
        let bonus = if self.max_weight > 0.0 { weight / self.max_weight } else { 0.0 };
        (self.rarity.base_experience() as f64 * (1.0 + bonus)) as u32
    }
}

// =============================================================================
// LOCATIONS
// =============================================================================

/// A fishing location.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Location identifier.
    pub id: LocationId,
    /// Display name.
    pub name: String,
    /// Maximum water depth (m).
    pub max_depth: f64,
    /// Player level needed to fish here.
    #[serde(default = "default_required_level")]
    pub required_level: u32,
    /// Whether the location is open.
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_required_level() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

// =============================================================================
// TACKLE
// =============================================================================

/// Fishing rod.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rod {
    /// Catalog id.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Control over large fish (1-100).
    pub power: f64,
    /// Cast distance bonus in percent.
    pub cast_distance_bonus: f64,
}

/// Fishing reel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reel {
    /// Catalog id.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Maximum drag (kg).
    pub drag_power: f64,
    /// Retrieve speed (1-100).
    pub retrieve_speed: f64,
}

/// Fishing line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Line {
    /// Catalog id.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Breaking strength (kg).
    pub breaking_strength: f64,
    /// Spool length (m).
    pub length: f64,
}

/// Bait.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bait {
    /// Catalog id, used for attraction lookups.
    pub id: BaitId,
    /// Display name.
    pub name: String,
}

/// Equipment slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentSlot {
    /// Rod slot.
    Rod,
    /// Reel slot.
    Reel,
    /// Line slot.
    Line,
    /// Bait slot.
    Bait,
}

impl std::fmt::Display for EquipmentSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EquipmentSlot::Rod => "rod",
            EquipmentSlot::Reel => "reel",
            EquipmentSlot::Line => "line",
            EquipmentSlot::Bait => "bait",
        })
    }
}

/// Any piece of equipment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Equipment {
    /// A rod.
    Rod(Rod),
    /// A reel.
    Reel(Reel),
    /// A line.
    Line(Line),
    /// A bait.
    Bait(Bait),
}

/// Equipped items, possibly incomplete.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Loadout {
    rod: Option<Rod>,
    reel: Option<Reel>,
    line: Option<Line>,
    bait: Option<Bait>,
}

impl Loadout {
    /// Put an item in its slot, returning what was there.
    pub fn equip(&mut self, item: Equipment) -> Option<Equipment> {
        match item {
            Equipment::Rod(rod) => self.rod.replace(rod).map(Equipment::Rod),
            Equipment::Reel(reel) => self.reel.replace(reel).map(Equipment::Reel),
            Equipment::Line(line) => self.line.replace(line).map(Equipment::Line),
            Equipment::Bait(bait) => self.bait.replace(bait).map(Equipment::Bait),
        }
    }

    /// Complete tackle, or the first empty slot.
    pub fn tackle(&self) -> Result<Tackle, EquipmentSlot> {
        Ok(Tackle {
            rod: self.rod.clone().ok_or(EquipmentSlot::Rod)?,
            reel: self.reel.clone().ok_or(EquipmentSlot::Reel)?,
            line: self.line.clone().ok_or(EquipmentSlot::Line)?,
            bait: self.bait.clone().ok_or(EquipmentSlot::Bait)?,
        })
    }
}

/// Complete tackle snapshot used as simulation parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tackle {
    /// Rod.
    pub rod: Rod,
    /// Reel.
    pub reel: Reel,
    /// Line.
    pub line: Line,
    /// Bait.
    pub bait: Bait,
}

impl Tackle {
    /// Reel speed normalized so a retrieve speed of 50 is 1.0.
    pub fn reel_speed_factor(&self) -> f64 {
        self.reel.retrieve_speed / 50.0
    }
}

// =============================================================================
// CATALOG
// =============================================================================

/// Catalog errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Catalog file could not be read.
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog file is not valid JSON for the schema.
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    /// A record violates a catalog constraint.
    #[error("invalid catalog entry: {0}")]
    Invalid(String),
}

/// Read-only access to locations and species.
pub trait Catalog: Send + Sync {
    /// Look up a location.
    fn location(&self, id: LocationId) -> Option<Location>;

    /// Species found at a location and depth.
    fn fish_at(&self, location: LocationId, depth: f64) -> Vec<FishSpecies>;
}

/// On-disk catalog layout.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    /// All locations.
    pub locations: Vec<Location>,
    /// All species.
    pub fish: Vec<FishSpecies>,
}

/// Catalog held in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCatalog {
    locations: BTreeMap<LocationId, Location>,
    fish: BTreeMap<FishId, FishSpecies>,
}

impl InMemoryCatalog {
    /// Build from a parsed catalog file, validating every record.
    pub fn from_file(file: CatalogFile) -> Result<Self, CatalogError> {
        let mut catalog = Self::default();
        for location in file.locations {
            if location.max_depth < 0.0 {
                return Err(CatalogError::Invalid(format!(
                    "location {} has negative max_depth", location.id
                )));
            }
            catalog.locations.insert(location.id, location);
        }
        for fish in file.fish {
            validate_species(&fish)?;
            catalog.fish.insert(fish.id, fish);
        }
        Ok(catalog)
    }

    /// Parse a catalog from JSON text.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        Self::from_file(serde_json::from_str(json)?)
    }

    /// Load a catalog from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Number of species.
    pub fn fish_count(&self) -> usize {
        self.fish.len()
    }

    /// Number of locations.
    pub fn location_count(&self) -> usize {
        self.locations.len()
    }

    /// Small built-in catalog for local runs.
    pub fn demo() -> Self {
        let locations = vec![
            Location { id: 1, name: "Quiet Pond".into(), max_depth: 6.0, required_level: 1, is_active: true },
            Location { id: 2, name: "River Bend".into(), max_depth: 12.0, required_level: 3, is_active: true },
            Location { id: 3, name: "Deep Lake".into(), max_depth: 40.0, required_level: 8, is_active: true },
        ];

        let fish = vec![
            demo_species(1, "Roach", Rarity::Common, (0.1, 0.6), (20, 30, 25), (0.5, 4.0), &[1, 2], ActiveHours::default()),
            demo_species(2, "Perch", Rarity::Common, (0.2, 1.5), (35, 40, 50), (1.0, 6.0), &[1, 2, 3], ActiveHours { from: 5, until: 21 }),
            demo_species(3, "Bream", Rarity::Uncommon, (0.5, 4.0), (40, 55, 20), (2.0, 10.0), &[2, 3], ActiveHours::default()),
            demo_species(4, "Pike", Rarity::Rare, (1.0, 12.0), (70, 60, 85), (1.5, 8.0), &[1, 2, 3], ActiveHours { from: 4, until: 11 }),
            demo_species(5, "Carp", Rarity::Rare, (2.0, 20.0), (75, 80, 35), (1.0, 5.0), &[1, 2], ActiveHours::default()),
            demo_species(6, "Catfish", Rarity::Epic, (5.0, 60.0), (90, 85, 55), (8.0, 35.0), &[2, 3], ActiveHours { from: 22, until: 4 }),
            demo_species(7, "Lake Sturgeon", Rarity::Legendary, (10.0, 80.0), (95, 95, 70), (20.0, 40.0), &[3], ActiveHours::default()),
        ];

        Self {
            locations: locations.into_iter().map(|l| (l.id, l)).collect(),
            fish: fish.into_iter().map(|f| (f.id, f)).collect(),
        }
    }
}

impl Catalog for InMemoryCatalog {
    fn location(&self, id: LocationId) -> Option<Location> {
        self.locations.get(&id).cloned()
    }

    fn fish_at(&self, location: LocationId, depth: f64) -> Vec<FishSpecies> {
        self.fish
            .values()
            .filter(|f| f.locations.contains(&location) && f.lives_at_depth(depth))
            .cloned()
            .collect()
    }
}

fn validate_species(fish: &FishSpecies) -> Result<(), CatalogError> {
    let invalid = |what: &str| Err(CatalogError::Invalid(format!("fish {} ({}): {}", fish.id, fish.name, what)));

    if !(fish.min_weight > 0.0 && fish.min_weight <= fish.max_weight) {
        return invalid("weight range must satisfy 0 < min <= max");
    }
    if fish.depth_min > fish.depth_max {
        return invalid("depth_min exceeds depth_max");
    }
    for (stat, value) in [("strength", fish.strength), ("stamina", fish.stamina), ("aggressiveness", fish.aggressiveness)] {
        if !(1..=100).contains(&value) {
            return invalid(&format!("{} must be in 1..=100", stat));
        }
    }
    if fish.active_hours.from > 23 || fish.active_hours.until > 24 {
        return invalid("active hours out of range");
    }
    if fish.bait_attraction.values().any(|a| *a > 100) {
        return invalid("bait attraction must be in 0..=100");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn demo_species(
    id: FishId,
    name: &str,
    rarity: Rarity,
    weight: (f64, f64),
    stats: (u32, u32, u32),
    depth: (f64, f64),
    locations: &[LocationId],
    active_hours: ActiveHours,
) -> FishSpecies {
    FishSpecies {
        id,
        name: name.into(),
        min_weight: weight.0,
        max_weight: weight.1,
        rarity,
        base_price: 10 + id * 5,
        strength: stats.0,
        stamina: stats.1,
        aggressiveness: stats.2,
        active_hours,
        depth_min: depth.0,
        depth_max: depth.1,
        locations: locations.to_vec(),
        bait_attraction: BTreeMap::new(),
    }
}

/// Starter tackle handed to new profiles in the in-memory services.
pub fn starter_tackle() -> Tackle {
    Tackle {
        rod: Rod { id: 1, name: "Willow Rod".into(), power: 30.0, cast_distance_bonus: 0.0 },
        reel: Reel { id: 1, name: "Brook Reel".into(), drag_power: 4.0, retrieve_speed: 50.0 },
        line: Line { id: 1, name: "Mono 0.20".into(), breaking_strength: 5.0, length: 100.0 },
        bait: Bait { id: 1, name: "Worm".into() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_hours_plain_window() {
        let hours = ActiveHours { from: 5, until: 21 };
        assert!(hours.contains(5));
        assert!(hours.contains(20));
        assert!(!hours.contains(21));
        assert!(!hours.contains(2));
    }

    #[test]
    fn test_active_hours_wraps_midnight() {
        let hours = ActiveHours { from: 22, until: 4 };
        assert!(hours.contains(1));
        assert!(hours.contains(22));
        assert!(hours.contains(23));
        assert!(!hours.contains(4));
        assert!(!hours.contains(12));
    }

    #[test]
    fn test_default_hours_always_active() {
        let hours = ActiveHours::default();
        for hour in 0..24 {
            assert!(hours.contains(hour));
        }
    }

    #[test]
    fn test_attraction_default() {
        let mut fish = demo_species(1, "Roach", Rarity::Common, (0.1, 0.6), (20, 30, 25), (0.5, 4.0), &[1], ActiveHours::default());
        assert_eq!(fish.attraction_for(7), DEFAULT_BAIT_ATTRACTION);

        fish.bait_attraction.insert(7, 0);
        assert_eq!(fish.attraction_for(7), 0);
    }

    #[test]
    fn test_generate_weight_in_range() {
        let catalog = InMemoryCatalog::demo();
        let mut rng = DeterministicRng::new(3);

        for fish in catalog.fish.values() {
            for _ in 0..200 {
                let w = fish.generate_weight(&mut rng);
                assert!(w >= fish.min_weight && w <= fish.max_weight, "{} weight {}", fish.name, w);
            }
        }
    }

    #[test]
    fn test_price_and_experience() {
        let mut fish = demo_species(4, "Pike", Rarity::Rare, (1.0, 10.0), (70, 60, 85), (1.5, 8.0), &[1], ActiveHours::default());
        fish.base_price = 20;

        // 5 kg * 20 * 2.5
        assert_eq!(fish.calculate_price(5.0), 250);
        // 50 * (1 + 5/10)
        assert_eq!(fish.calculate_experience(5.0), 75);
    }

    #[test]
    fn test_loadout_reports_missing_slot() {
        let tackle = starter_tackle();
        let mut loadout = Loadout::default();
        assert_eq!(loadout.tackle(), Err(EquipmentSlot::Rod));

        loadout.equip(Equipment::Rod(tackle.rod.clone()));
        loadout.equip(Equipment::Reel(tackle.reel.clone()));
        loadout.equip(Equipment::Line(tackle.line.clone()));
        assert_eq!(loadout.tackle(), Err(EquipmentSlot::Bait));

        let previous = loadout.equip(Equipment::Bait(tackle.bait.clone()));
        assert!(previous.is_none());
        assert_eq!(loadout.tackle(), Ok(tackle.clone()));

        let previous = loadout.equip(Equipment::Reel(tackle.reel.clone()));
        assert_eq!(previous, Some(Equipment::Reel(tackle.reel.clone())));
    }

    #[test]
    fn test_fish_at_filters_location_and_depth() {
        let catalog = InMemoryCatalog::demo();

        let shallow: Vec<_> = catalog.fish_at(1, 3.0).into_iter().map(|f| f.name).collect();
        assert!(shallow.contains(&"Roach".to_string()));
        assert!(!shallow.contains(&"Lake Sturgeon".to_string()));

        assert!(catalog.fish_at(3, 39.0).iter().all(|f| f.lives_at_depth(39.0)));
        assert!(catalog.fish_at(99, 3.0).is_empty());
    }

    #[test]
    fn test_catalog_from_json() {
        let json = r#"{
            "locations": [{ "id": 1, "name": "Pond", "max_depth": 5.0 }],
            "fish": [{
                "id": 10, "name": "Rudd", "min_weight": 0.1, "max_weight": 0.8,
                "rarity": "uncommon", "base_price": 12,
                "strength": 20, "stamina": 20, "aggressiveness": 30,
                "active_hours": { "from": 22, "until": 4 },
                "depth_min": 0.5, "depth_max": 3.0,
                "locations": [1],
                "bait_attraction": { "1": 80 }
            }]
        }"#;

        let catalog = InMemoryCatalog::from_json(json).unwrap();
        assert_eq!(catalog.location_count(), 1);
        assert_eq!(catalog.fish_count(), 1);

        let location = catalog.location(1).unwrap();
        assert_eq!(location.required_level, 1);
        assert!(location.is_active);

        let rudd = &catalog.fish_at(1, 1.0)[0];
        assert_eq!(rudd.attraction_for(1), 80);
        assert_eq!(rudd.rarity, Rarity::Uncommon);
    }

    #[test]
    fn test_catalog_rejects_bad_species() {
        let json = r#"{
            "locations": [],
            "fish": [{
                "id": 1, "name": "Broken", "min_weight": 3.0, "max_weight": 1.0,
                "rarity": "common", "base_price": 1,
                "strength": 10, "stamina": 10, "aggressiveness": 10,
                "depth_min": 0.0, "depth_max": 1.0, "locations": []
            }]
        }"#;

        assert!(matches!(InMemoryCatalog::from_json(json), Err(CatalogError::Invalid(_))));
    }
}
