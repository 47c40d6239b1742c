//! Game Record Definitions
//!
//! One `Game` per wager round. Fields are crate-private and only
//! `game::machine` mutates them; everything else reads through accessors
//! or the positional [`GameRecord`] encoding.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::clock::Timestamp;
use crate::core::ids::{Address, GameId};
use crate::error::Precondition;
use crate::game::moves::Move;
use crate::game::outcome::Outcome;
use crate::proof::commitment::Commitment;

// =============================================================================
// GAME STATE
// =============================================================================

/// Lifecycle state. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum GameState {
    /// Created, waiting for a joiner.
    AwaitingJoin = 0,
    /// Joined, waiting for the committer's reveal.
    AwaitingReveal = 1,
    /// Revealed and resolved.
    Settled = 2,
    /// Committer missed the deadline.
    Forfeited = 3,
}

impl GameState {
    /// Is this a final state?
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, GameState::Settled | GameState::Forfeited)
    }

    /// Is `next` a legal successor of `self`?
    pub fn can_advance_to(self, next: GameState) -> bool {
        matches!(
            (self, next),
            (GameState::AwaitingJoin, GameState::AwaitingReveal)
                | (GameState::AwaitingReveal, GameState::Settled)
                | (GameState::AwaitingReveal, GameState::Forfeited)
        )
    }

    /// Checked transition.
    pub fn advance(self, next: GameState) -> Result<GameState, Precondition> {
        if self.can_advance_to(next) {
            Ok(next)
        } else {
            Err(Precondition::IllegalTransition { from: self, to: next })
        }
    }
}

// =============================================================================
// WINNER
// =============================================================================

/// Resolved winner of a game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    /// Equal moves; each side takes back its stake.
    Tie,
    /// Committer takes the pot.
    Committer,
    /// Joiner takes the pot.
    Joiner,
}

impl From<Outcome> for Winner {
    fn from(outcome: Outcome) -> Self {
        // The committer's move is always the first argument to `resolve`.
        match outcome {
            Outcome::Tie => Winner::Tie,
            Outcome::First => Winner::Committer,
            Outcome::Second => Winner::Joiner,
        }
    }
}

/// Side of the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Game creator.
    Committer,
    /// Second player.
    Joiner,
}

// =============================================================================
// GAME
// =============================================================================

/// Positional encoding of a [`Game`], in stable field order.
///
/// `(id, committer, joiner, token, stake, commitment, committer_move,
/// joiner_move, state, created_at, joined_at, reveal_deadline, winner,
/// timeout_secs, committer_withdrawn, joiner_withdrawn)`
pub type GameRecord = (
    GameId,
    Address,
    Option<Address>,
    Address,
    u128,
    Commitment,
    Option<Move>,
    Option<Move>,
    GameState,
    Timestamp,
    Option<Timestamp>,
    Option<Timestamp>,
    Option<Winner>,
    u64,
    bool,
    bool,
);

/// Errors decoding a positional record.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Bytes are not a record.
    #[error("record decode failed: {0}")]
    Decode(#[from] bincode::Error),
    /// Fields decode but break an invariant.
    #[error("inconsistent record: {0}")]
    Inconsistent(&'static str),
}

/// One wager round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub(crate) id: GameId,
    pub(crate) committer: Address,
    pub(crate) joiner: Option<Address>,
    pub(crate) token: Address,
    pub(crate) stake: u128,
    pub(crate) commitment: Commitment,
    pub(crate) committer_move: Option<Move>,
    pub(crate) joiner_move: Option<Move>,
    pub(crate) state: GameState,
    pub(crate) created_at: Timestamp,
    pub(crate) joined_at: Option<Timestamp>,
    pub(crate) reveal_deadline: Option<Timestamp>,
    pub(crate) winner: Option<Winner>,
    pub(crate) timeout_secs: u64,
    pub(crate) committer_withdrawn: bool,
    pub(crate) joiner_withdrawn: bool,
}

impl Game {
    /// Fresh game in `AwaitingJoin`. Inputs are validated by the caller.
    pub(crate) fn new(
        id: GameId,
        committer: Address,
        token: Address,
        stake: u128,
        commitment: Commitment,
        timeout_secs: u64,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            committer,
            joiner: None,
            token,
            stake,
            commitment,
            committer_move: None,
            joiner_move: None,
            state: GameState::AwaitingJoin,
            created_at,
            joined_at: None,
            reveal_deadline: None,
            winner: None,
            timeout_secs,
            committer_withdrawn: false,
            joiner_withdrawn: false,
        }
    }

    /// Game id.
    pub fn id(&self) -> GameId { self.id }
    /// Creator.
    pub fn committer(&self) -> Address { self.committer }
    /// Second player, once joined.
    pub fn joiner(&self) -> Option<Address> { self.joiner }
    /// Wagered asset.
    pub fn token(&self) -> Address { self.token }
    /// Per-player stake.
    pub fn stake(&self) -> u128 { self.stake }
    /// Committed hash.
    pub fn commitment(&self) -> Commitment { self.commitment }
    /// Committer's move, once revealed.
    pub fn committer_move(&self) -> Option<Move> { self.committer_move }
    /// Joiner's plaintext move.
    pub fn joiner_move(&self) -> Option<Move> { self.joiner_move }
    /// Lifecycle state.
    pub fn state(&self) -> GameState { self.state }
    /// Creation time.
    pub fn created_at(&self) -> Timestamp { self.created_at }
    /// Join time.
    pub fn joined_at(&self) -> Option<Timestamp> { self.joined_at }
    /// Last second a reveal is accepted.
    pub fn reveal_deadline(&self) -> Option<Timestamp> { self.reveal_deadline }
    /// Resolved winner.
    pub fn winner(&self) -> Option<Winner> { self.winner }
    /// Reveal window chosen at creation.
    pub fn timeout_secs(&self) -> u64 { self.timeout_secs }
    /// Has the committer's share been paid?
    pub fn committer_withdrawn(&self) -> bool { self.committer_withdrawn }
    /// Has the joiner's share been paid?
    pub fn joiner_withdrawn(&self) -> bool { self.joiner_withdrawn }

    /// Total pot (`2 × stake`). Overflow is rejected at creation.
    pub fn pot(&self) -> u128 {
        self.stake.saturating_mul(2)
    }

    /// Which side `who` sits on, if any.
    pub fn side_of(&self, who: &Address) -> Option<Side> {
        if *who == self.committer {
            Some(Side::Committer)
        } else if self.joiner.as_ref() == Some(who) {
            Some(Side::Joiner)
        } else {
            None
        }
    }

    /// Amount `who` may withdraw right now.
    pub fn entitlement(&self, who: &Address) -> Result<(Side, u128), Precondition> {
        if !self.state.is_terminal() {
            return Err(Precondition::WrongState { operation: "withdraw", state: self.state });
        }

        let side = self.side_of(who).ok_or(Precondition::NotEntitled)?;
        let amount = match (self.winner, side) {
            (Some(Winner::Tie), _) => self.stake,
            (Some(Winner::Committer), Side::Committer) => self.pot(),
            (Some(Winner::Joiner), Side::Joiner) => self.pot(),
            _ => return Err(Precondition::NotEntitled),
        };

        if self.is_withdrawn(side) {
            return Err(Precondition::AlreadyWithdrawn);
        }
        Ok((side, amount))
    }

    /// Has `side` already been paid?
    pub fn is_withdrawn(&self, side: Side) -> bool {
        match side {
            Side::Committer => self.committer_withdrawn,
            Side::Joiner => self.joiner_withdrawn,
        }
    }

    /// Data-model invariants that must hold in every reachable state.
    pub fn check_invariants(&self) -> Result<(), &'static str> {
        let joined = self.state >= GameState::AwaitingReveal;
        if joined != self.reveal_deadline.is_some() {
            return Err("reveal_deadline defined iff joined");
        }
        if joined != (self.joiner.is_some() && self.joiner_move.is_some() && self.joined_at.is_some()) {
            return Err("joiner fields set iff joined");
        }
        if self.state.is_terminal() != self.winner.is_some() {
            return Err("winner set iff terminal");
        }
        if (self.state == GameState::Settled) != self.committer_move.is_some() {
            return Err("committer_move set iff settled");
        }
        if self.state == GameState::Forfeited && self.winner != Some(Winner::Joiner) {
            return Err("forfeit pays the joiner");
        }
        if self.joiner == Some(self.committer) {
            return Err("joiner equals committer");
        }
        if self.stake == 0 || !self.commitment.is_well_formed() {
            return Err("stake and commitment validated at creation");
        }
        if !self.state.is_terminal() && (self.committer_withdrawn || self.joiner_withdrawn) {
            return Err("withdrawal only after resolution");
        }
        Ok(())
    }

    /// Positional view.
    pub fn to_record(&self) -> GameRecord {
        (
            self.id,
            self.committer,
            self.joiner,
            self.token,
            self.stake,
            self.commitment,
            self.committer_move,
            self.joiner_move,
            self.state,
            self.created_at,
            self.joined_at,
            self.reveal_deadline,
            self.winner,
            self.timeout_secs,
            self.committer_withdrawn,
            self.joiner_withdrawn,
        )
    }

    /// Rebuild from a positional view, checking invariants.
    pub fn from_record(record: GameRecord) -> Result<Self, RecordError> {
        let (
            id,
            committer,
            joiner,
            token,
            stake,
            commitment,
            committer_move,
            joiner_move,
            state,
            created_at,
            joined_at,
            reveal_deadline,
            winner,
            timeout_secs,
            committer_withdrawn,
            joiner_withdrawn,
        ) = record;

        let game = Self {
            id,
            committer,
            joiner,
            token,
            stake,
            commitment,
            committer_move,
            joiner_move,
            state,
            created_at,
            joined_at,
            reveal_deadline,
            winner,
            timeout_secs,
            committer_withdrawn,
            joiner_withdrawn,
        };
        game.check_invariants().map_err(RecordError::Inconsistent)?;
        Ok(game)
    }

    /// Binary positional encoding (bincode over [`GameRecord`]).
    pub fn encode_positional(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(&self.to_record())
    }

    /// Inverse of [`Game::encode_positional`].
    pub fn decode_positional(bytes: &[u8]) -> Result<Self, RecordError> {
        let record: GameRecord = bincode::deserialize(bytes)?;
        Self::from_record(record)
    }
}
