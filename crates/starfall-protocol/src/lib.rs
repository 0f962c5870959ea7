//! Shared value types for Starfall rooms: coordinates, ids, orders, battles and viewer state.

pub mod battle;
pub mod hex;
pub mod ids;
pub mod orders;
pub mod types;
pub mod view;
pub mod wire;

pub use battle::*;
pub use hex::Hex;
pub use ids::*;
pub use orders::*;
pub use types::*;
pub use view::*;
