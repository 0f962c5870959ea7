use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use starfall_protocol::{
    Orders, PlayerEconomy, PlayerId, PlayerView, PowerupKind, PowerupState, Resources, SystemId,
};

/// One seat in a room. Never removed once the room has started.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub color: String,
    pub home: Option<SystemId>,
    /// Yield of owned systems, collected into `research` at the end of each turn
    pub income: Resources,
    /// Stockpile powerups and extra fleets are bought from
    pub research: Resources,
    pub powerups: BTreeMap<PowerupKind, PowerupState>,
    /// This turn's placement budget
    pub fleets_to_place: u32,
    pub wormhole_turns: u32,
    pub wormhole_anchor: Option<SystemId>,
    /// Allied player -> remaining turns
    pub alliances: BTreeMap<PlayerId, u32>,
    pub connected: bool,
    pub locked: bool,
    pub orders: Orders,
    #[serde(skip)]
    pub reconnect_token: String,
}

impl Player {
    pub fn new(id: PlayerId, name: String, color: String) -> Self {
        Self {
            id,
            name,
            color,
            home: None,
            income: Resources::ZERO,
            research: Resources::ZERO,
            powerups: PowerupKind::ALL
                .into_iter()
                .map(|kind| (kind, PowerupState::default()))
                .collect(),
            fleets_to_place: 0,
            wormhole_turns: 0,
            wormhole_anchor: None,
            alliances: BTreeMap::new(),
            connected: true,
            locked: false,
            orders: Orders::default(),
            reconnect_token: String::new(),
        }
    }

    pub fn has_wormhole(&self) -> bool {
        self.wormhole_turns > 0
    }

    /// Check if the alliance with `other` is still running
    pub fn is_allied_with(&self, other: PlayerId) -> bool {
        self.alliances.get(&other).is_some_and(|&turns| turns > 0)
    }

    pub fn record_powerup(&mut self, kind: PowerupKind, turn: u32) {
        let state = self.powerups.entry(kind).or_default();
        state.uses += 1;
        state.last_used_turn = Some(turn);
    }

    pub fn cancel_wormhole(&mut self) {
        self.wormhole_turns = 0;
        self.wormhole_anchor = None;
    }

    /// End-of-turn countdown of wormhole and alliance durations.
    pub fn tick_durations(&mut self) {
        self.wormhole_turns = self.wormhole_turns.saturating_sub(1);
        if self.wormhole_turns == 0 {
            self.wormhole_anchor = None;
        }
        for turns in self.alliances.values_mut() {
            *turns = turns.saturating_sub(1);
        }
        self.alliances.retain(|_, turns| *turns > 0);
    }

    /// Reset per-phase state for a fresh planning phase.
    pub fn reset_for_planning(&mut self) {
        self.locked = false;
        self.orders = Orders::default();
    }

    /// Public view. Economy and orders are included only when the caller allows it.
    pub fn view(
        &self,
        systems_owned: u32,
        fleets_total: u32,
        show_economy: bool,
        show_orders: bool,
    ) -> PlayerView {
        PlayerView {
            id: self.id,
            name: self.name.clone(),
            color: self.color.clone(),
            home: self.home,
            connected: self.connected,
            locked: self.locked,
            systems_owned,
            fleets_total,
            wormhole_turns: self.wormhole_turns,
            alliances: self.alliances.iter().map(|(&p, &t)| (p, t)).collect(),
            economy: show_economy.then(|| PlayerEconomy {
                income: self.income,
                research: self.research,
                fleets_to_place: self.fleets_to_place,
                powerups: self.powerups.clone(),
            }),
            orders: show_orders.then(|| self.orders.clone()),
        }
    }
}
