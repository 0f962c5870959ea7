//! Starfall room host.
//!
//! Owns the room registry, binds client sessions to rooms, and drives per-room deadlines from a
//! single timer queue. Transport is left to the embedding binary.

pub mod config;
pub mod protocol;
pub mod scheduler;
pub mod session;
pub mod store;

pub use config::ServerConfig;
pub use protocol::*;
pub use scheduler::{Scheduler, TimerEntry, TimerKind};
pub use session::{Session, SessionRole, SessionTable};
pub use store::{ChannelOutbox, MemoryOutbox, NullOutbox, Outbox, RoomStore, StoreError};
