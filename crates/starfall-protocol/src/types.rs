use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Metal,
    Energy,
    Exotics,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::Metal,
        ResourceKind::Energy,
        ResourceKind::Exotics,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "metal" => Some(Self::Metal),
            "energy" => Some(Self::Energy),
            "exotics" | "exotic" => Some(Self::Exotics),
            _ => None,
        }
    }
}

/// One amount per resource kind. Used for system yields, income, stockpiles and costs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resources {
    pub metal: u32,
    pub energy: u32,
    pub exotics: u32,
}

impl Resources {
    pub const ZERO: Resources = Resources::new(0, 0, 0);

    pub const fn new(metal: u32, energy: u32, exotics: u32) -> Self {
        Self {
            metal,
            energy,
            exotics,
        }
    }

    pub fn get(&self, kind: ResourceKind) -> u32 {
        match kind {
            ResourceKind::Metal => self.metal,
            ResourceKind::Energy => self.energy,
            ResourceKind::Exotics => self.exotics,
        }
    }

    pub fn get_mut(&mut self, kind: ResourceKind) -> &mut u32 {
        match kind {
            ResourceKind::Metal => &mut self.metal,
            ResourceKind::Energy => &mut self.energy,
            ResourceKind::Exotics => &mut self.exotics,
        }
    }

    pub fn total(&self) -> u32 {
        self.metal + self.energy + self.exotics
    }

    /// True when every kind in `self` is at least the matching kind in `cost`.
    pub fn covers(&self, cost: &Resources) -> bool {
        ResourceKind::ALL
            .iter()
            .all(|&kind| self.get(kind) >= cost.get(kind))
    }

    /// Deduct `cost` if affordable. Returns false and leaves `self` untouched otherwise.
    pub fn try_spend(&mut self, cost: &Resources) -> bool {
        if !self.covers(cost) {
            return false;
        }
        for kind in ResourceKind::ALL {
            *self.get_mut(kind) -= cost.get(kind);
        }
        true
    }

    /// Per-kind maximum.
    pub fn max(self, other: Resources) -> Resources {
        Resources {
            metal: self.metal.max(other.metal),
            energy: self.energy.max(other.energy),
            exotics: self.exotics.max(other.exotics),
        }
    }
}

impl std::ops::Add for Resources {
    type Output = Resources;

    fn add(self, other: Resources) -> Resources {
        Resources {
            metal: self.metal + other.metal,
            energy: self.energy + other.energy,
            exotics: self.exotics + other.exotics,
        }
    }
}

impl std::ops::AddAssign for Resources {
    fn add_assign(&mut self, other: Resources) {
        *self = *self + other;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerupKind {
    StellarBomb,
    Terraform,
    DefenseNet,
    Wormhole,
}

impl PowerupKind {
    pub const ALL: [PowerupKind; 4] = [
        PowerupKind::StellarBomb,
        PowerupKind::Terraform,
        PowerupKind::DefenseNet,
        PowerupKind::Wormhole,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "stellarbomb" | "bomb" => Some(Self::StellarBomb),
            "terraform" => Some(Self::Terraform),
            "defensenet" | "shield" => Some(Self::DefenseNet),
            "wormhole" => Some(Self::Wormhole),
            _ => None,
        }
    }
}

/// Usage record for one powerup kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerupState {
    pub uses: u32,
    #[serde(default)]
    pub last_used_turn: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Room exists but has not been started.
    Lobby,
    Planning,
    Resolving,
    Complete,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapSize {
    Small,
    #[default]
    Medium,
    Large,
    Massive,
}

impl MapSize {
    /// Grid (width, height) of the axial rectangle the galaxy is carved from.
    pub const fn dimensions(self) -> (u32, u32) {
        match self {
            MapSize::Small => (9, 7),
            MapSize::Medium => (12, 9),
            MapSize::Large => (15, 11),
            MapSize::Massive => (20, 14),
        }
    }
}

/// Per-room settings chosen at creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Maximum players allowed (2-8)
    pub max_players: u8,
    pub map_size: MapSize,
    /// Turn at which the room completes on territory count
    pub max_turns: u32,
    /// Planning phase length in seconds
    pub turn_seconds: u32,
    /// Private rooms are hidden from listings
    pub is_private: bool,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_players: 4,
            map_size: MapSize::Medium,
            max_turns: 30,
            turn_seconds: 60,
            is_private: false,
        }
    }
}

/// Player colors, unique within a room.
pub const PALETTE: [&str; 8] = [
    "crimson", "azure", "emerald", "amber", "violet", "teal", "magenta", "ivory",
];

/// Normalize a requested color to its palette spelling.
pub fn palette_color(name: &str) -> Option<&'static str> {
    let wanted = name.trim();
    PALETTE
        .iter()
        .copied()
        .find(|c| c.eq_ignore_ascii_case(wanted))
}
