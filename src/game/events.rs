//! Game Events
//!
//! Emitted once per committed transition. The execution host stamps each
//! event with a sequence number and the transaction time.

use serde::{Serialize, Deserialize};

use crate::core::clock::Timestamp;
use crate::core::ids::{Address, GameId};
use crate::game::moves::Move;
use crate::game::state::Winner;
use crate::proof::commitment::Commitment;

/// Game event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameEventData {
    /// New game waiting for a joiner
    GameCreated {
        /// Game id.
        id: GameId,
        /// Creator, who escrowed the first stake.
        committer: Address,
        /// Wagered token.
        token: Address,
        /// Per-player stake.
        stake: u128,
        /// Hash of the committer's move and salt.
        commitment: Commitment,
    },

    /// Second player joined with a plaintext move
    PlayerJoined {
        /// Game id.
        id: GameId,
        /// Second player.
        joiner: Address,
        /// Joiner's move, public from here on.
        #[serde(rename = "move")]
        joiner_move: Move,
        /// Last second a reveal is accepted.
        reveal_deadline: Timestamp,
    },

    /// Committer revealed and the round resolved
    GameSettled {
        /// Game id.
        id: GameId,
        /// Resolved winner.
        winner: Winner,
    },

    /// Reveal deadline passed without a reveal
    GameForfeited {
        /// Game id.
        id: GameId,
    },

    /// Escrowed share paid out
    PrizeWithdrawn {
        /// Game id.
        id: GameId,
        /// Paid account.
        recipient: Address,
        /// Amount released from escrow.
        amount: u128,
    },
}

impl GameEventData {
    /// Game this event belongs to.
    pub fn game_id(&self) -> GameId {
        match self {
            Self::GameCreated { id, .. }
            | Self::PlayerJoined { id, .. }
            | Self::GameSettled { id, .. }
            | Self::GameForfeited { id }
            | Self::PrizeWithdrawn { id, .. } => *id,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GameCreated { .. } => "GameCreated",
            Self::PlayerJoined { .. } => "PlayerJoined",
            Self::GameSettled { .. } => "GameSettled",
            Self::GameForfeited { .. } => "GameForfeited",
            Self::PrizeWithdrawn { .. } => "PrizeWithdrawn",
        }
    }
}

/// A committed event with ordering metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Position in the host's total order (starts at 1)
    pub sequence: u64,

    /// Host time of the transaction that emitted it
    pub timestamp: Timestamp,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(sequence: u64, timestamp: Timestamp, data: GameEventData) -> Self {
        Self {
            sequence,
            timestamp,
            data,
        }
    }

    /// Game this event belongs to.
    pub fn game_id(&self) -> GameId {
        self.data.game_id()
    }
}
