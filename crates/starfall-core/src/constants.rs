//! Game balance constants.

use starfall_protocol::{PowerupKind, Resources};

pub const MAX_TIER: u8 = 3;

/// Relative roll weights for non-home tiers 0..=3.
pub const TIER_WEIGHTS: [u32; 4] = [50, 30, 15, 5];

/// Per-kind yield range (inclusive) by tier.
pub const TIER_RESOURCE_RANGE: [(u32, u32); 4] = [(0, 1), (1, 2), (2, 4), (3, 6)];

/// Fleet production bonus by tier.
pub const TIER_BONUS: [u32; 4] = [0, 1, 2, 4];

/// Initial neutral garrison range (inclusive) by tier.
pub const TIER_GARRISON_RANGE: [(u32, u32); 4] = [(0, 2), (1, 3), (2, 5), (3, 8)];

/// Guaranteed per-kind yield of a homeworld.
pub const HOMEWORLD_MIN_RESOURCE: u32 = 3;
/// Extra yield points spread randomly across kinds on a homeworld.
pub const HOMEWORLD_SURPLUS: u32 = 4;
pub const HOMEWORLD_GARRISON: u32 = 10;

pub const BASE_PRODUCTION: u32 = 3;
/// Research of a single kind needed to buy one extra fleet.
pub const RESEARCH_PER_FLEET: u32 = 5;

pub const DEFENSE_NET_TURNS: u32 = 3;
pub const WORMHOLE_TURNS: u32 = 3;
pub const ALLIANCE_TURNS: u32 = 3;

pub const SURVIVAL_CHANCE: f64 = 0.5;

pub const GALAXY_DENSITY: f64 = 0.55;
pub const SPAWN_ANCHOR_CHANCE: f64 = 0.08;
pub const SECOND_HOP_CHANCE: f64 = 0.3;
pub const MIN_SYSTEMS: usize = 12;

pub const BATTLE_STAGGER_MS: u64 = 250;
pub const BATTLE_BASE_MS: u64 = 600;
pub const BATTLE_ROUND_MS: u64 = 350;
pub const MOVEMENT_WINDOW_MS: u64 = 1200;

pub const MAX_NAME_LEN: usize = 24;

pub const fn powerup_cost(kind: PowerupKind) -> Resources {
    match kind {
        PowerupKind::StellarBomb => Resources::new(20, 20, 10),
        PowerupKind::Terraform => Resources::new(15, 10, 0),
        PowerupKind::DefenseNet => Resources::new(10, 20, 0),
        PowerupKind::Wormhole => Resources::new(0, 15, 15),
    }
}
