//! Procedural galaxy generation.
//!
//! Carves a connected graph of star systems out of an axial hex rectangle: spread-out homeworlds,
//! a random walk/spawn growth pass, tiered yields and garrisons, hex-adjacency links, then
//! component repair so every system is reachable.

use std::collections::{BTreeSet, HashMap};

use starfall_protocol::{hex, Hex, MapSize, Resources, SystemId};
use tracing::debug;

use crate::constants::{
    GALAXY_DENSITY, MAX_TIER, MIN_SYSTEMS, SECOND_HOP_CHANCE, SPAWN_ANCHOR_CHANCE, TIER_WEIGHTS,
};
use crate::graph::{connected_components, LinkGraph};
use crate::rng::SeededRng;
use crate::system::{roll_garrison, roll_homeworld_resources, roll_resources, StarSystem};

/// Configuration for galaxy generation.
#[derive(Clone, Debug)]
pub struct GalaxyConfig {
    pub width: u32,
    pub height: u32,
    /// Fraction of grid cells that should become systems (0.0-1.0)
    pub density: f64,
    /// Number of spread-out homeworlds to reserve
    pub homeworlds: usize,
}

impl GalaxyConfig {
    pub fn for_map(size: MapSize, homeworlds: usize) -> Self {
        let (width, height) = size.dimensions();
        Self {
            width,
            height,
            density: GALAXY_DENSITY,
            homeworlds,
        }
    }

    fn target_count(&self) -> usize {
        let cells = (self.width * self.height) as usize;
        let by_density = (cells as f64 * self.density.clamp(0.0, 1.0)).round() as usize;
        by_density.max(MIN_SYSTEMS).min(cells)
    }
}

impl Default for GalaxyConfig {
    fn default() -> Self {
        Self::for_map(MapSize::Medium, 0)
    }
}

/// Result of galaxy generation.
#[derive(Clone, Debug)]
pub struct Galaxy {
    pub width: u32,
    pub height: u32,
    /// Indexed by `SystemId`.
    pub systems: Vec<StarSystem>,
    pub links: LinkGraph,
    /// Homeworld systems, in placement order.
    pub homeworlds: Vec<SystemId>,
}

impl Galaxy {
    pub fn system_ids(&self) -> Vec<SystemId> {
        self.systems.iter().map(|s| s.id).collect()
    }

    pub fn system_at(&self, hex: Hex) -> Option<SystemId> {
        self.systems.iter().find(|s| s.hex == hex).map(|s| s.id)
    }

    /// Force every in-bounds neighbour of `home` to exist as a neutral tier-0 system linked to it.
    ///
    /// Existing neighbours are reset to tier 0 (other homeworlds are left alone); missing ones are
    /// created and linked to every generated system next to them.
    pub fn ensure_perimeter(&mut self, home: SystemId, rng: &mut SeededRng) {
        let Some(center) = self.systems.get(home.index()).map(|s| s.hex) else {
            return;
        };

        let mut by_hex: HashMap<Hex, SystemId> =
            self.systems.iter().map(|s| (s.hex, s.id)).collect();

        for cell in center.neighbors() {
            if !cell.in_rect(self.width, self.height) {
                continue;
            }

            match by_hex.get(&cell).copied() {
                Some(id) => {
                    let sys = &mut self.systems[id.index()];
                    if !sys.is_home {
                        sys.tier = 0;
                        sys.terraformed = false;
                        sys.owner = None;
                        sys.resources = roll_resources(0, rng);
                        sys.fleets = roll_garrison(0, rng);
                    }
                    self.links.link(home, id);
                }
                None => {
                    let id = SystemId(self.systems.len() as u32);
                    self.systems.push(StarSystem {
                        id,
                        hex: cell,
                        tier: 0,
                        resources: roll_resources(0, rng),
                        owner: None,
                        fleets: roll_garrison(0, rng),
                        defense_net_turns: 0,
                        terraformed: false,
                        is_home: false,
                    });
                    by_hex.insert(cell, id);
                    for n in cell.neighbors() {
                        if let Some(&other) = by_hex.get(&n) {
                            self.links.link(id, other);
                        }
                    }
                }
            }
        }
    }
}

/// Generate a galaxy with the given configuration and seed.
pub fn generate_galaxy(config: &GalaxyConfig, seed: &str) -> Galaxy {
    let mut rng = SeededRng::from_seed(seed);
    let cells = hex::rect(config.width, config.height);

    let homes = pick_homeworlds(&cells, config, &mut rng);
    let chosen = grow_systems(&cells, &homes, config, &mut rng);

    // Roll tiers and yields in coordinate order so ids are stable for a seed.
    let home_set: BTreeSet<Hex> = homes.iter().copied().collect();
    let mut systems: Vec<StarSystem> = chosen
        .iter()
        .enumerate()
        .map(|(i, &cell)| roll_system(SystemId(i as u32), cell, home_set.contains(&cell), &mut rng))
        .collect();

    let by_hex: HashMap<Hex, SystemId> = systems.iter().map(|s| (s.hex, s.id)).collect();
    let mut links = LinkGraph::new();
    for sys in &systems {
        links.add_node(sys.id);
        for n in sys.hex.neighbors() {
            if let Some(&other) = by_hex.get(&n) {
                links.link(sys.id, other);
            }
        }
    }

    // Drop unreachable singletons and compact ids.
    let mut remap: HashMap<SystemId, SystemId> = HashMap::new();
    systems.retain(|s| links.degree(s.id) > 0);
    for (i, sys) in systems.iter_mut().enumerate() {
        let new_id = SystemId(i as u32);
        remap.insert(sys.id, new_id);
        sys.id = new_id;
    }
    let mut links = links.remapped(&remap);

    connect_components(&systems, &mut links);

    let homeworlds = homes
        .iter()
        .filter_map(|h| systems.iter().find(|s| s.hex == *h).map(|s| s.id))
        .collect();

    debug!(
        systems = systems.len(),
        links = links.edges().len(),
        "galaxy generated"
    );

    Galaxy {
        width: config.width,
        height: config.height,
        systems,
        links,
        homeworlds,
    }
}

/// Farthest-point selection over interior cells (all six neighbours in bounds).
fn pick_homeworlds(cells: &[Hex], config: &GalaxyConfig, rng: &mut SeededRng) -> Vec<Hex> {
    if config.homeworlds == 0 {
        return Vec::new();
    }

    let mut candidates: Vec<Hex> = cells
        .iter()
        .copied()
        .filter(|c| c.neighbors().all(|n| n.in_rect(config.width, config.height)))
        .collect();
    if candidates.len() < config.homeworlds {
        candidates = cells.to_vec();
    }

    let mut chosen = Vec::with_capacity(config.homeworlds);
    let Some(&first) = rng.pick(&candidates) else {
        return chosen;
    };
    chosen.push(first);

    while chosen.len() < config.homeworlds {
        let best = candidates
            .iter()
            .filter(|c| !chosen.contains(c))
            .map(|&c| {
                let nearest = chosen.iter().map(|h| h.distance(c)).min().unwrap_or(i32::MAX);
                (nearest, c)
            })
            // First candidate wins ties, so the scan order decides.
            .fold(None, |best: Option<(i32, Hex)>, (d, c)| match best {
                Some((bd, _)) if bd >= d => best,
                _ => Some((d, c)),
            });

        match best {
            Some((_, c)) => chosen.push(c),
            None => break,
        }
    }

    chosen
}

/// Random walk/spawn hybrid growth. Homeworlds and their rings are always included.
fn grow_systems(
    cells: &[Hex],
    homes: &[Hex],
    config: &GalaxyConfig,
    rng: &mut SeededRng,
) -> Vec<Hex> {
    let mut grown = Growth {
        width: config.width,
        height: config.height,
        set: BTreeSet::new(),
        order: Vec::new(),
    };

    for &home in homes {
        grown.add(home);
        for n in home.neighbors() {
            grown.add(n);
        }
    }

    let target = config.target_count().max(grown.set.len());
    let attempt_limit = cells.len() * 50;
    let mut attempts = 0;

    while grown.set.len() < target && attempts < attempt_limit {
        attempts += 1;

        if grown.order.is_empty() || rng.chance(SPAWN_ANCHOR_CHANCE) {
            if let Some(&anchor) = rng.pick(cells) {
                grown.add(anchor);
            }
            continue;
        }

        let Some(&base) = rng.pick(&grown.order) else {
            continue;
        };
        let step = base + Hex::DIRECTIONS[rng.gen_range(0..6) as usize];
        if !grown.add(step) {
            continue;
        }

        if rng.chance(SECOND_HOP_CHANCE) {
            let hop = step + Hex::DIRECTIONS[rng.gen_range(0..6) as usize];
            grown.add(hop);
        }
    }

    grown.set.into_iter().collect()
}

struct Growth {
    width: u32,
    height: u32,
    set: BTreeSet<Hex>,
    /// Insertion order, so random picks do not depend on set ordering.
    order: Vec<Hex>,
}

impl Growth {
    /// Returns true if `cell` is in bounds (new or already present).
    fn add(&mut self, cell: Hex) -> bool {
        if !cell.in_rect(self.width, self.height) {
            return false;
        }
        if self.set.insert(cell) {
            self.order.push(cell);
        }
        true
    }
}

fn roll_system(id: SystemId, hex: Hex, is_home: bool, rng: &mut SeededRng) -> StarSystem {
    let (tier, resources, fleets) = if is_home {
        // Home garrison is set when the room starts.
        (MAX_TIER, roll_homeworld_resources(rng), 0)
    } else {
        let tier = rng.weighted_index(&TIER_WEIGHTS).unwrap_or(0) as u8;
        (tier, roll_resources(tier, rng), roll_garrison(tier, rng))
    };

    StarSystem {
        id,
        hex,
        tier,
        resources,
        owner: None,
        fleets,
        defense_net_turns: 0,
        terraformed: false,
        is_home,
    }
}

/// Join components pairwise by their globally closest systems until one remains.
fn connect_components(systems: &[StarSystem], links: &mut LinkGraph) {
    let ids: Vec<SystemId> = systems.iter().map(|s| s.id).collect();

    loop {
        let components = connected_components(links, &ids);
        if components.len() <= 1 {
            return;
        }

        let mut component_of: HashMap<SystemId, usize> = HashMap::new();
        for (idx, comp) in components.iter().enumerate() {
            for &id in comp {
                component_of.insert(id, idx);
            }
        }

        let mut best: Option<(i32, SystemId, SystemId)> = None;
        for a in systems {
            for b in systems {
                if a.id >= b.id || component_of.get(&a.id) == component_of.get(&b.id) {
                    continue;
                }
                let d = a.hex.distance(b.hex);
                if best.map_or(true, |(bd, _, _)| d < bd) {
                    best = Some((d, a.id, b.id));
                }
            }
        }

        match best {
            Some((distance, a, b)) => {
                debug!(%a, %b, distance, "bridging galaxy components");
                links.link(a, b);
            }
            None => return,
        }
    }
}

/// Total yield of a galaxy, handy for balance checks.
pub fn total_resources(galaxy: &Galaxy) -> Resources {
    galaxy
        .systems
        .iter()
        .fold(Resources::ZERO, |acc, s| acc + s.resources)
}
