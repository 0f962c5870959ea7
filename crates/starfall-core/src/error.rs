use starfall_protocol::{Phase, PlayerId, SystemId};

/// Synchronous validation failures. None of these leave a room half-mutated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("Invalid room config: {0}")]
    InvalidConfig(String),
    #[error("Game has already started")]
    AlreadyStarted,
    #[error("Game has not started")]
    NotStarted,
    #[error("Room is full")]
    RoomFull,
    #[error("Invalid player name")]
    InvalidName,
    #[error("Name already taken: {0}")]
    NameTaken(String),
    #[error("Invalid color: {0}")]
    InvalidColor(String),
    #[error("Color already taken: {0}")]
    ColorTaken(String),
    #[error("Unknown player {0}")]
    UnknownPlayer(PlayerId),
    #[error("Not allowed during {0:?}")]
    WrongPhase(Phase),
    #[error("Player {0} has already locked in")]
    AlreadyLocked(PlayerId),
    #[error("Cannot ally with yourself")]
    SelfAlliance,
    #[error("Game is over")]
    GameOver,
    #[error("Not enough players to start")]
    NotEnoughPlayers,
    #[error("Invalid reconnect token")]
    InvalidToken,
    #[error("Galaxy has no room for {0} homeworlds")]
    NoHomeworld(usize),
    #[error("Resolution plan references unknown system {0}")]
    PlanMismatch(SystemId),
}
