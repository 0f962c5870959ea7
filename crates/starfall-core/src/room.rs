//! One room's lifecycle: roster, economy, phase transitions and order intake.
//!
//! Phases cycle `Lobby -> Planning -> Resolving -> (Planning | Complete)`. While planning, a
//! deadline is set and no resolution block exists; while resolving, the reverse. Every method
//! takes the current time explicitly so the scheduler (and tests) own the clock.

use std::collections::{BTreeMap, BTreeSet};

use starfall_protocol::{
    palette_color, Battle, Orders, Phase, PlayerId, PublicRoomState, Resources, RevealedMove,
    RoomConfig, RoomId, SystemId, PALETTE,
};
use tracing::{debug, info, warn};

use crate::constants::{
    ALLIANCE_TURNS, BASE_PRODUCTION, HOMEWORLD_GARRISON, MAX_NAME_LEN, MAX_TIER, RESEARCH_PER_FLEET,
};
use crate::error::GameError;
use crate::galaxy::{generate_galaxy, Galaxy, GalaxyConfig};
use crate::graph::LinkGraph;
use crate::player::Player;
use crate::powerups::apply_powerups;
use crate::resolve::{resolve_turn, MoverInput, ResolutionInput, ResolutionPlan};
use crate::rng::SeededRng;
use crate::system::StarSystem;

pub const MIN_PLAYERS: u8 = 2;
pub const MAX_PLAYERS: u8 = 8;

/// Resolution-only state. Dropped when the turn is finalized.
#[derive(Clone, Debug)]
pub struct PendingResolution {
    pub revealed_moves: Vec<RevealedMove>,
    pub started_at_ms: u64,
    pub ends_at_ms: u64,
    pub plan: Option<ResolutionPlan>,
}

impl PendingResolution {
    pub fn battles(&self) -> &[Battle] {
        self.plan
            .as_ref()
            .map(|p| p.battles.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug)]
pub struct Room {
    id: RoomId,
    seed: String,
    config: RoomConfig,
    created_at_ms: u64,
    started: bool,
    turn: u32,
    phase: Phase,
    turn_ends_at_ms: Option<u64>,
    systems: Vec<StarSystem>,
    links: LinkGraph,
    players: BTreeMap<PlayerId, Player>,
    next_player_id: u8,
    winner: Option<PlayerId>,
    resolution: Option<PendingResolution>,
}

pub fn validate_config(config: &RoomConfig) -> Result<(), GameError> {
    if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&config.max_players) {
        return Err(GameError::InvalidConfig(format!(
            "max_players must be {MIN_PLAYERS}-{MAX_PLAYERS}, got {}",
            config.max_players
        )));
    }
    if config.max_turns == 0 {
        return Err(GameError::InvalidConfig("max_turns must be at least 1".into()));
    }
    if config.turn_seconds == 0 {
        return Err(GameError::InvalidConfig("turn_seconds must be at least 1".into()));
    }
    Ok(())
}

impl Room {
    pub fn new(
        id: RoomId,
        config: RoomConfig,
        seed: impl Into<String>,
        now_ms: u64,
    ) -> Result<Self, GameError> {
        validate_config(&config)?;
        Ok(Self {
            id,
            seed: seed.into(),
            config,
            created_at_ms: now_ms,
            started: false,
            turn: 1,
            phase: Phase::Lobby,
            turn_ends_at_ms: None,
            systems: Vec::new(),
            links: LinkGraph::new(),
            players: BTreeMap::new(),
            next_player_id: 0,
            winner: None,
            resolution: None,
        })
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn winner(&self) -> Option<PlayerId> {
        self.winner
    }

    pub fn turn_ends_at_ms(&self) -> Option<u64> {
        self.turn_ends_at_ms
    }

    pub fn resolution(&self) -> Option<&PendingResolution> {
        self.resolution.as_ref()
    }

    pub fn systems(&self) -> &[StarSystem] {
        &self.systems
    }

    pub fn links(&self) -> &LinkGraph {
        &self.links
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= usize::from(self.config.max_players)
    }

    pub fn connected_count(&self) -> usize {
        self.players.values().filter(|p| p.connected).count()
    }

    fn player_mut(&mut self, id: PlayerId) -> Result<&mut Player, GameError> {
        self.players.get_mut(&id).ok_or(GameError::UnknownPlayer(id))
    }

    fn deadline(&self, now_ms: u64) -> u64 {
        now_ms + u64::from(self.config.turn_seconds) * 1000
    }

    fn require_planning(&self) -> Result<(), GameError> {
        match self.phase {
            Phase::Planning => Ok(()),
            Phase::Complete => Err(GameError::GameOver),
            Phase::Lobby => Err(GameError::NotStarted),
            other => Err(GameError::WrongPhase(other)),
        }
    }

    // ---- Roster ----

    /// Seat a new player. `color` must be a free palette color; `None` picks the first free one.
    pub fn add_player(&mut self, name: &str, color: Option<&str>) -> Result<PlayerId, GameError> {
        if self.started {
            return Err(GameError::AlreadyStarted);
        }
        if self.is_full() {
            return Err(GameError::RoomFull);
        }

        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(GameError::InvalidName);
        }
        let folded = name.to_lowercase();
        if self.players.values().any(|p| p.name.to_lowercase() == folded) {
            return Err(GameError::NameTaken(name.to_string()));
        }

        let taken: BTreeSet<&str> = self.players.values().map(|p| p.color.as_str()).collect();
        let color = match color {
            Some(wanted) => {
                let color = palette_color(wanted)
                    .ok_or_else(|| GameError::InvalidColor(wanted.to_string()))?;
                if taken.contains(color) {
                    return Err(GameError::ColorTaken(color.to_string()));
                }
                color
            }
            None => PALETTE
                .iter()
                .copied()
                .find(|c| !taken.contains(c))
                .ok_or(GameError::RoomFull)?,
        };

        let id = PlayerId(self.next_player_id);
        self.next_player_id = self
            .next_player_id
            .checked_add(1)
            .ok_or(GameError::RoomFull)?;
        self.players
            .insert(id, Player::new(id, name.to_string(), color.to_string()));
        info!("Player {} joined room {} as {}", name, self.id, id);
        Ok(id)
    }

    /// Drop a player from a room that has not started.
    pub fn remove_player(&mut self, id: PlayerId) -> Result<(), GameError> {
        if self.started {
            return Err(GameError::AlreadyStarted);
        }
        self.players
            .remove(&id)
            .map(|_| ())
            .ok_or(GameError::UnknownPlayer(id))
    }

    pub fn set_reconnect_token(&mut self, id: PlayerId, token: String) -> Result<(), GameError> {
        self.player_mut(id)?.reconnect_token = token;
        Ok(())
    }

    pub fn set_connected(&mut self, id: PlayerId, connected: bool) -> Result<(), GameError> {
        self.player_mut(id)?.connected = connected;
        Ok(())
    }

    /// Rebind a player by token and mark them connected.
    pub fn reconnect(&mut self, token: &str) -> Result<PlayerId, GameError> {
        if token.is_empty() {
            return Err(GameError::InvalidToken);
        }
        let player = self
            .players
            .values_mut()
            .find(|p| p.reconnect_token == token)
            .ok_or(GameError::InvalidToken)?;
        player.connected = true;
        Ok(player.id)
    }

    // ---- Lifecycle ----

    /// Generate the galaxy, seat every player on a homeworld and open the first planning phase.
    pub fn start(&mut self, now_ms: u64) -> Result<(), GameError> {
        if self.started {
            return Err(GameError::AlreadyStarted);
        }
        if self.players.len() < usize::from(MIN_PLAYERS) {
            return Err(GameError::NotEnoughPlayers);
        }

        let galaxy_config = GalaxyConfig::for_map(self.config.map_size, self.players.len());
        let mut galaxy = generate_galaxy(&galaxy_config, &self.seed);

        let mut rng = SeededRng::from_seed(&format!("{}-start", self.seed));
        for home in galaxy.homeworlds.clone() {
            galaxy.ensure_perimeter(home, &mut rng);
        }

        self.start_with_galaxy(galaxy, now_ms)
    }

    /// Start on a prepared galaxy. Players take `galaxy.homeworlds` in join order.
    pub fn start_with_galaxy(&mut self, mut galaxy: Galaxy, now_ms: u64) -> Result<(), GameError> {
        if self.started {
            return Err(GameError::AlreadyStarted);
        }
        if self.players.len() < usize::from(MIN_PLAYERS) {
            return Err(GameError::NotEnoughPlayers);
        }
        let homes_valid = galaxy.homeworlds.len() >= self.players.len()
            && galaxy
                .homeworlds
                .iter()
                .all(|h| h.index() < galaxy.systems.len());
        if !homes_valid {
            return Err(GameError::NoHomeworld(self.players.len()));
        }

        for (player, &home) in self.players.values_mut().zip(&galaxy.homeworlds) {
            let sys = &mut galaxy.systems[home.index()];
            sys.tier = MAX_TIER;
            sys.is_home = true;
            sys.owner = Some(player.id);
            sys.fleets = HOMEWORLD_GARRISON;
            player.home = Some(home);
        }

        self.systems = galaxy.systems;
        self.links = galaxy.links;
        self.started = true;
        self.turn = 1;
        self.refresh_economy();
        self.enter_planning(now_ms);

        info!(
            "Room {} started: {} players, {} systems",
            self.id,
            self.players.len(),
            self.systems.len()
        );
        Ok(())
    }

    fn enter_planning(&mut self, now_ms: u64) {
        self.phase = Phase::Planning;
        self.resolution = None;
        self.turn_ends_at_ms = Some(self.deadline(now_ms));
        for player in self.players.values_mut() {
            player.reset_for_planning();
        }
    }

    /// Recompute income and production from current ownership.
    fn refresh_economy(&mut self) {
        for player in self.players.values_mut() {
            let owned = self.systems.iter().filter(|s| s.is_owned_by(player.id));
            let (income, bonus) = owned.fold(
                (Resources::ZERO, 0),
                |(income, bonus), s| (income + s.resources, bonus + s.bonus()),
            );
            player.income = income;
            player.fleets_to_place = BASE_PRODUCTION + bonus;
        }
    }

    // ---- Planning ----

    /// Replace a player's orders wholesale.
    pub fn submit_orders(&mut self, id: PlayerId, orders: Orders) -> Result<(), GameError> {
        self.require_planning()?;
        let player = self.player_mut(id)?;
        if player.locked {
            return Err(GameError::AlreadyLocked(id));
        }
        player.orders = orders;
        Ok(())
    }

    /// Lock a player's orders. Returns whether every player is now locked.
    pub fn lock_in(&mut self, id: PlayerId) -> Result<bool, GameError> {
        self.require_planning()?;
        self.player_mut(id)?.locked = true;
        Ok(self.all_locked())
    }

    pub fn all_locked(&self) -> bool {
        !self.players.is_empty() && self.players.values().all(|p| p.locked)
    }

    pub fn force_lock_all(&mut self) {
        for player in self.players.values_mut() {
            player.locked = true;
        }
    }

    /// Whether the planning deadline has passed.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.phase == Phase::Planning && self.turn_ends_at_ms.is_some_and(|t| now_ms >= t)
    }

    /// Forced expiry: lock everyone and begin resolution. No-op outside planning.
    pub fn expire(&mut self, now_ms: u64) -> bool {
        if self.phase != Phase::Planning {
            return false;
        }
        self.force_lock_all();
        self.begin_resolution(now_ms)
    }

    // ---- Resolution ----

    /// Reveal orders, apply spends, placements and powerups, and compute the pending plan.
    ///
    /// Returns false (and changes nothing) outside planning.
    pub fn begin_resolution(&mut self, now_ms: u64) -> bool {
        if self.phase != Phase::Planning {
            return false;
        }
        self.phase = Phase::Resolving;
        self.turn_ends_at_ms = None;

        let revealed_moves: Vec<RevealedMove> = self
            .players
            .values()
            .flat_map(|p| {
                p.orders.moves.iter().map(move |m| RevealedMove {
                    player: p.id,
                    from: m.from,
                    to: m.to,
                    count: m.count,
                })
            })
            .collect();

        self.apply_research_spends();
        self.apply_placements();
        let applied = apply_powerups(
            &mut self.systems,
            &self.links,
            &mut self.players,
            self.turn,
            &mut SeededRng::for_powerups(&self.seed, self.turn),
        );

        let plan = self.compute_plan();
        let window = plan.window_ms;

        debug!(
            room = %self.id,
            turn = self.turn,
            powerups = applied.len(),
            battles = plan.battles.len(),
            "resolution planned"
        );

        self.resolution = Some(PendingResolution {
            revealed_moves,
            started_at_ms: now_ms,
            ends_at_ms: now_ms + window,
            plan: Some(plan),
        });
        true
    }

    /// Resolve the current board. Deterministic for a given board, turn and seed.
    fn compute_plan(&self) -> ResolutionPlan {
        let mut rng = SeededRng::for_turn(&self.seed, self.turn);
        resolve_turn(&self.resolution_input(), &mut rng)
    }

    fn resolution_input(&self) -> ResolutionInput<'_> {
        ResolutionInput {
            systems: &self.systems,
            links: &self.links,
            movers: self
                .players
                .values()
                .map(|p| MoverInput {
                    player: p.id,
                    moves: p.orders.moves.clone(),
                    wormhole: p.has_wormhole(),
                    wormhole_anchor: p.wormhole_anchor,
                    allies: p
                        .alliances
                        .iter()
                        .filter(|(_, &t)| t > 0)
                        .map(|(&a, _)| a)
                        .collect(),
                })
                .collect(),
        }
    }

    /// Convert research stockpile into extra fleets, whole units only.
    fn apply_research_spends(&mut self) {
        for player in self.players.values_mut() {
            let spends = player.orders.research.clone();
            for spend in spends {
                let stock = player.research.get_mut(spend.resource);
                let fleets = spend.amount.min(*stock) / RESEARCH_PER_FLEET;
                *stock -= fleets * RESEARCH_PER_FLEET;
                player.fleets_to_place += fleets;
            }
        }
    }

    /// Place production onto owned systems in ascending id order, clamped to the budget.
    fn apply_placements(&mut self) {
        for player in self.players.values_mut() {
            let mut budget = player.fleets_to_place;
            for (&target, &count) in &player.orders.placements {
                if budget == 0 {
                    break;
                }
                let Some(sys) = self.systems.get_mut(target.index()) else {
                    continue;
                };
                if !sys.is_owned_by(player.id) {
                    continue;
                }
                let placed = count.min(budget);
                sys.fleets += placed;
                budget -= placed;
            }
            // Unplaced production does not carry over.
            player.fleets_to_place = 0;
        }
    }

    /// Commit the pending plan, tick durations, collect income and advance the turn.
    ///
    /// Returns `Ok(false)` outside resolving. On error the room is left untouched.
    pub fn finalize_resolution(&mut self, now_ms: u64) -> Result<bool, GameError> {
        if self.phase != Phase::Resolving {
            return Ok(false);
        }

        let plan = match self.resolution.as_ref().and_then(|r| r.plan.clone()) {
            Some(plan) => plan,
            None => {
                warn!("Room {} has no resolution plan, recomputing", self.id);
                self.compute_plan()
            }
        };

        if let Some(bad) = plan
            .updates
            .iter()
            .find(|u| u.id.index() >= self.systems.len())
        {
            return Err(GameError::PlanMismatch(bad.id));
        }

        for update in &plan.updates {
            let sys = &mut self.systems[update.id.index()];
            sys.owner = update.owner;
            sys.fleets = update.fleets;
            sys.defense_net_turns = update.defense_net_turns;
        }
        for pid in &plan.cancelled_wormholes {
            if let Some(player) = self.players.get_mut(pid) {
                player.cancel_wormhole();
            }
        }

        for sys in &mut self.systems {
            sys.defense_net_turns = sys.defense_net_turns.saturating_sub(1);
        }
        for player in self.players.values_mut() {
            player.tick_durations();
        }

        self.refresh_economy();
        for player in self.players.values_mut() {
            player.research += player.income;
        }

        self.resolution = None;
        match self.check_victory() {
            Some(winner) => {
                self.winner = Some(winner);
                self.phase = Phase::Complete;
                self.turn_ends_at_ms = None;
                info!("Room {} complete on turn {}: winner {}", self.id, self.turn, winner);
            }
            None => {
                self.turn += 1;
                self.enter_planning(now_ms);
                debug!(room = %self.id, turn = self.turn, "planning");
            }
        }
        Ok(true)
    }

    fn systems_owned(&self, id: PlayerId) -> u32 {
        self.systems.iter().filter(|s| s.is_owned_by(id)).count() as u32
    }

    fn check_victory(&self) -> Option<PlayerId> {
        let owners: BTreeSet<PlayerId> = self.systems.iter().filter_map(|s| s.owner).collect();
        if owners.len() == 1 {
            return owners.into_iter().next();
        }

        if self.turn >= self.config.max_turns {
            // Join order breaks ties: the first player with the top count wins.
            let mut best: Option<(PlayerId, u32)> = None;
            for &id in self.players.keys() {
                let owned = self.systems_owned(id);
                if best.map_or(true, |(_, b)| owned > b) {
                    best = Some((id, owned));
                }
            }
            return best.map(|(id, _)| id);
        }
        None
    }

    /// Drop any resolution state and reopen planning with a fresh deadline.
    pub fn recover_to_planning(&mut self, now_ms: u64) {
        if !self.started || self.phase == Phase::Complete {
            return;
        }
        warn!("Room {} recovering to planning on turn {}", self.id, self.turn);
        self.enter_planning(now_ms);
    }

    // ---- Diplomacy ----

    /// Mutual alliance for `ALLIANCE_TURNS`; calling again refreshes it.
    pub fn set_alliance(&mut self, from: PlayerId, to: PlayerId) -> Result<(), GameError> {
        match self.phase {
            Phase::Complete => return Err(GameError::GameOver),
            Phase::Lobby => return Err(GameError::NotStarted),
            _ => {}
        }
        if from == to {
            return Err(GameError::SelfAlliance);
        }
        if !self.players.contains_key(&to) {
            return Err(GameError::UnknownPlayer(to));
        }
        self.player_mut(from)?.alliances.insert(to, ALLIANCE_TURNS);
        self.player_mut(to)?.alliances.insert(from, ALLIANCE_TURNS);
        info!("Players {} and {} allied in room {}", from, to, self.id);
        Ok(())
    }

    // ---- Views ----

    /// Redacted snapshot for one viewer (`None` = spectator).
    pub fn view(&self, viewer: Option<PlayerId>) -> PublicRoomState {
        let revealed = self.phase == Phase::Resolving;
        let resolution = self.resolution.as_ref();

        PublicRoomState {
            id: self.id.clone(),
            viewer,
            phase: self.phase,
            turn: self.turn,
            config: self.config.clone(),
            created_at_ms: self.created_at_ms,
            turn_ends_at_ms: self.turn_ends_at_ms,
            systems: self.systems.iter().map(StarSystem::view).collect(),
            links: self.links.edges(),
            players: self
                .players
                .values()
                .map(|p| {
                    let own = viewer == Some(p.id);
                    let fleets_total = self
                        .systems
                        .iter()
                        .filter(|s| s.is_owned_by(p.id))
                        .map(|s| s.fleets)
                        .sum();
                    p.view(self.systems_owned(p.id), fleets_total, own, own || revealed)
                })
                .collect(),
            revealed_moves: resolution.map(|r| r.revealed_moves.clone()).unwrap_or_default(),
            battles: resolution.map(|r| r.battles().to_vec()).unwrap_or_default(),
            resolution_started_at_ms: resolution.map(|r| r.started_at_ms),
            resolution_ends_at_ms: resolution.map(|r| r.ends_at_ms),
            winner: self.winner,
        }
    }

    /// Total fleets on the board, for conservation checks.
    pub fn total_fleets(&self) -> u64 {
        self.systems.iter().map(|s| u64::from(s.fleets)).sum()
    }

    /// Systems a player currently owns, in id order.
    pub fn owned_systems(&self, id: PlayerId) -> Vec<SystemId> {
        self.systems
            .iter()
            .filter(|s| s.is_owned_by(id))
            .map(|s| s.id)
            .collect()
    }

    /// Swap the pending plan. No-op outside resolving.
    #[cfg(any(test, feature = "test-support"))]
    pub fn replace_pending_plan(&mut self, plan: Option<ResolutionPlan>) {
        if let Some(pending) = self.resolution.as_mut() {
            pending.plan = plan;
        }
    }

    #[cfg(test)]
    pub(crate) fn systems_mut(&mut self) -> &mut Vec<StarSystem> {
        &mut self.systems
    }

    #[cfg(test)]
    pub(crate) fn player_mut_for_test(&mut self, id: PlayerId) -> &mut Player {
        self.players.get_mut(&id).expect("player")
    }
}
