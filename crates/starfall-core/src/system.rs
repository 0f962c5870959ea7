use serde::{Deserialize, Serialize};
use starfall_protocol::{Hex, PlayerId, Resources, SystemId, SystemView};

use crate::constants::{
    HOMEWORLD_MIN_RESOURCE, HOMEWORLD_SURPLUS, MAX_TIER, TIER_BONUS, TIER_GARRISON_RANGE,
    TIER_RESOURCE_RANGE,
};
use crate::rng::SeededRng;

/// A node of the galaxy graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarSystem {
    pub id: SystemId,
    pub hex: Hex,
    pub tier: u8,
    pub resources: Resources,
    pub owner: Option<PlayerId>,
    pub fleets: u32,
    pub defense_net_turns: u32,
    pub terraformed: bool,
    pub is_home: bool,
}

impl StarSystem {
    /// Fleet production bonus derived from the tier.
    pub fn bonus(&self) -> u32 {
        TIER_BONUS[usize::from(self.tier.min(MAX_TIER))]
    }

    pub fn is_shielded(&self) -> bool {
        self.defense_net_turns > 0
    }

    pub fn is_owned_by(&self, player: PlayerId) -> bool {
        self.owner == Some(player)
    }

    /// Drop ownership and shield, as happens when the last fleet leaves.
    pub fn abandon(&mut self) {
        self.owner = None;
        self.fleets = 0;
        self.defense_net_turns = 0;
    }

    pub fn view(&self) -> SystemView {
        SystemView {
            id: self.id,
            hex: self.hex,
            tier: self.tier,
            resources: self.resources,
            bonus: self.bonus(),
            owner: self.owner,
            fleets: self.fleets,
            defense_net_turns: self.defense_net_turns,
            terraformed: self.terraformed,
            is_home: self.is_home,
        }
    }
}

/// Roll a per-kind yield inside the tier's range.
pub fn roll_resources(tier: u8, rng: &mut SeededRng) -> Resources {
    let (lo, hi) = TIER_RESOURCE_RANGE[usize::from(tier.min(MAX_TIER))];
    Resources::new(
        rng.gen_inclusive(lo, hi),
        rng.gen_inclusive(lo, hi),
        rng.gen_inclusive(lo, hi),
    )
}

/// Homeworld yield: a fixed floor per kind plus surplus points spread randomly.
pub fn roll_homeworld_resources(rng: &mut SeededRng) -> Resources {
    let mut res = Resources::new(
        HOMEWORLD_MIN_RESOURCE,
        HOMEWORLD_MIN_RESOURCE,
        HOMEWORLD_MIN_RESOURCE,
    );
    for _ in 0..HOMEWORLD_SURPLUS {
        if let Some(&kind) = rng.pick(&starfall_protocol::ResourceKind::ALL) {
            *res.get_mut(kind) += 1;
        }
    }
    res
}

pub fn roll_garrison(tier: u8, rng: &mut SeededRng) -> u32 {
    let (lo, hi) = TIER_GARRISON_RANGE[usize::from(tier.min(MAX_TIER))];
    rng.gen_inclusive(lo, hi)
}
