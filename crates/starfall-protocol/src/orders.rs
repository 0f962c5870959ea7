//! Player orders for one planning phase.
//!
//! Client input is untrusted. [`Orders::from_json`] is the only way loosely-typed input becomes
//! orders: anything malformed is dropped entry by entry, never rejected wholesale, and legality
//! (ownership, budgets, adjacency) is left to resolution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{PowerupKind, ResourceKind, SystemId};

/// Upper bound on entries kept per order list.
pub const MAX_ORDER_ENTRIES: usize = 128;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOrder {
    pub from: SystemId,
    pub to: SystemId,
    pub count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PowerupOrder {
    StellarBomb { target: SystemId },
    Terraform { target: SystemId },
    DefenseNet { target: SystemId },
    /// The linking powerup: `from` anchors the effect and must be owned.
    Wormhole { from: SystemId, to: SystemId },
}

impl PowerupOrder {
    pub fn kind(&self) -> PowerupKind {
        match self {
            PowerupOrder::StellarBomb { .. } => PowerupKind::StellarBomb,
            PowerupOrder::Terraform { .. } => PowerupKind::Terraform,
            PowerupOrder::DefenseNet { .. } => PowerupKind::DefenseNet,
            PowerupOrder::Wormhole { .. } => PowerupKind::Wormhole,
        }
    }
}

/// Spend research stockpile of one kind on extra fleets this turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchOrder {
    pub resource: ResourceKind,
    pub amount: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orders {
    #[serde(default)]
    pub placements: BTreeMap<SystemId, u32>,
    #[serde(default)]
    pub moves: Vec<MoveOrder>,
    #[serde(default)]
    pub powerups: Vec<PowerupOrder>,
    #[serde(default)]
    pub research: Vec<ResearchOrder>,
}

impl Orders {
    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
            && self.moves.is_empty()
            && self.powerups.is_empty()
            && self.research.is_empty()
    }

    /// Parse untrusted client JSON into strict orders.
    pub fn from_json(value: &Value) -> Orders {
        let Some(obj) = value.as_object() else {
            return Orders::default();
        };

        Orders {
            placements: obj.get("placements").map(parse_placements).unwrap_or_default(),
            moves: list(obj.get("moves"), parse_move),
            powerups: list(obj.get("powerups"), parse_powerup),
            research: list(obj.get("research"), parse_research),
        }
    }
}

fn list<T>(value: Option<&Value>, parse: impl Fn(&Value) -> Option<T>) -> Vec<T> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(parse)
                .take(MAX_ORDER_ENTRIES)
                .collect()
        })
        .unwrap_or_default()
}

/// Non-negative integer from a JSON number or numeric string.
fn as_count(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    }
}

fn as_system(value: &Value) -> Option<SystemId> {
    as_count(value).map(SystemId)
}

fn field<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.as_object()?.get(key)
}

fn parse_placements(value: &Value) -> BTreeMap<SystemId, u32> {
    let mut out: BTreeMap<SystemId, u32> = BTreeMap::new();
    let mut add = |system: SystemId, count: u32| {
        if count > 0 && (out.len() < MAX_ORDER_ENTRIES || out.contains_key(&system)) {
            let slot = out.entry(system).or_insert(0);
            *slot = slot.saturating_add(count);
        }
    };

    match value {
        // { "12": 3 }
        Value::Object(map) => {
            for (key, count) in map {
                if let (Ok(id), Some(count)) = (key.trim().parse::<u32>(), as_count(count)) {
                    add(SystemId(id), count);
                }
            }
        }
        // [{ "system": 12, "count": 3 }]
        Value::Array(items) => {
            for item in items {
                let system = field(item, "system").and_then(as_system);
                let count = field(item, "count").and_then(as_count);
                if let (Some(system), Some(count)) = (system, count) {
                    add(system, count);
                }
            }
        }
        _ => {}
    }
    out
}

fn parse_move(value: &Value) -> Option<MoveOrder> {
    let from = as_system(field(value, "from")?)?;
    let to = as_system(field(value, "to")?)?;
    let count = as_count(field(value, "count")?)?;
    if count == 0 || from == to {
        return None;
    }
    Some(MoveOrder { from, to, count })
}

fn parse_powerup(value: &Value) -> Option<PowerupOrder> {
    let kind = PowerupKind::parse(field(value, "type")?.as_str()?)?;
    let target = || field(value, "target").and_then(as_system);
    match kind {
        PowerupKind::StellarBomb => Some(PowerupOrder::StellarBomb { target: target()? }),
        PowerupKind::Terraform => Some(PowerupOrder::Terraform { target: target()? }),
        PowerupKind::DefenseNet => Some(PowerupOrder::DefenseNet { target: target()? }),
        PowerupKind::Wormhole => {
            let from = field(value, "from").and_then(as_system)?;
            let to = field(value, "to").and_then(as_system)?;
            Some(PowerupOrder::Wormhole { from, to })
        }
    }
}

fn parse_research(value: &Value) -> Option<ResearchOrder> {
    let resource = ResourceKind::parse(field(value, "resource")?.as_str()?)?;
    let amount = as_count(field(value, "amount")?)?;
    (amount > 0).then_some(ResearchOrder { resource, amount })
}
