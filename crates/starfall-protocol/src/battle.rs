use serde::{Deserialize, Serialize};

use crate::{PlayerId, SystemId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleRole {
    Attacker,
    Defender,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleParticipant {
    /// `None` for an unowned garrison.
    pub player: Option<PlayerId>,
    pub role: BattleRole,
    pub starting_fleets: u32,
}

/// Attacker fleet counts after one skirmish round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkirmishRound {
    pub fleets: Vec<(PlayerId, u32)>,
}

/// Both sides' fleet counts after one head-to-head round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatRound {
    pub attacker: u32,
    pub defender: u32,
}

/// One contested system in one turn.
///
/// Offsets are relative to the resolution start; the engine never assigns wall-clock times.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Battle {
    pub system: SystemId,
    pub participants: Vec<BattleParticipant>,
    #[serde(default)]
    pub skirmish: Vec<SkirmishRound>,
    #[serde(default)]
    pub rounds: Vec<CombatRound>,
    /// Attacker that reached head-to-head combat (skirmish survivor or sole attacker).
    pub attacker: Option<PlayerId>,
    pub winner: Option<PlayerId>,
    pub final_owner: Option<PlayerId>,
    pub final_fleets: u32,
    pub start_offset_ms: u64,
    pub duration_ms: u64,
}

impl Battle {
    pub fn end_offset_ms(&self) -> u64 {
        self.start_offset_ms + self.duration_ms
    }
}
