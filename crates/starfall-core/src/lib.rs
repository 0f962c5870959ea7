//! Starfall game engine: galaxy generation, the per-room phase machine and turn resolution.
//!
//! Everything here is deterministic given a room seed. Time is always passed in explicitly.

pub mod combat;
pub mod constants;
mod error;
pub mod galaxy;
pub mod graph;
mod player;
pub mod powerups;
pub mod resolve;
mod rng;
pub mod room;
pub mod selfplay;
mod system;

pub use crate::combat::{duel, skirmish, DuelOutcome, SkirmishOutcome};
pub use crate::error::GameError;
pub use crate::galaxy::{generate_galaxy, Galaxy, GalaxyConfig};
pub use crate::graph::{connected_components, is_connected, reachable_through, LinkGraph, UnionFind};
pub use crate::player::Player;
pub use crate::resolve::{resolve_turn, MoverInput, ResolutionInput, ResolutionPlan, SystemUpdate};
pub use crate::rng::SeededRng;
pub use crate::room::{PendingResolution, Room};
pub use crate::selfplay::{plan_orders, run_selfplay, SelfPlayConfig, SelfPlayResult};
pub use crate::system::{roll_garrison, roll_homeworld_resources, roll_resources, StarSystem};
