//! Transaction Executor
//!
//! Applies one transaction at a time against the game book. The clock is
//! sampled once per transaction, so every check inside it sees the same
//! `now`. Committed transactions append exactly one event to the log;
//! failed ones append nothing.

use serde::{Serialize, Deserialize};
use tracing::{debug, warn};

use crate::core::clock::{Clock, Timestamp};
use crate::core::ids::{Address, GameId};
use crate::error::GameError;
use crate::game::events::GameEvent;
use crate::game::machine::{CreateGame, GameBook, ProtocolConfig};
use crate::game::moves::Move;
use crate::game::state::Game;
use crate::ledger::TokenLedger;
use crate::proof::settlement::Reveal;
use crate::proof::verify::ProofVerifier;

/// A caller-signed request to the protocol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transaction {
    /// Open a game with a committed move.
    CreateGame(CreateGame),
    /// Join an open game.
    JoinGame {
        /// Target game.
        id: GameId,
        /// Plaintext move.
        player_move: Move,
    },
    /// Reveal and settle.
    RevealAndSettle {
        /// Target game.
        id: GameId,
        /// Move, salt and proof.
        reveal: Reveal,
    },
    /// Claim a missed reveal for the joiner.
    Forfeit {
        /// Target game.
        id: GameId,
    },
    /// Collect an entitled payout.
    Withdraw {
        /// Target game.
        id: GameId,
    },
}

impl Transaction {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateGame(_) => "create_game",
            Self::JoinGame { .. } => "join_game",
            Self::RevealAndSettle { .. } => "reveal_and_settle",
            Self::Forfeit { .. } => "forfeit",
            Self::Withdraw { .. } => "withdraw",
        }
    }
}

/// Result of a committed transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Who submitted it.
    pub caller: Address,
    /// Event appended to the log.
    pub event: GameEvent,
}

impl Receipt {
    /// Host time the transaction executed at.
    pub fn timestamp(&self) -> Timestamp {
        self.event.timestamp
    }

    /// Game the transaction touched.
    pub fn game_id(&self) -> GameId {
        self.event.game_id()
    }
}

/// Single-writer execution host.
pub struct Host<L, V, C> {
    book: GameBook,
    ledger: L,
    verifier: V,
    clock: C,
    log: Vec<GameEvent>,
}

impl<L, V, C> Host<L, V, C>
where
    L: TokenLedger,
    V: ProofVerifier,
    C: Clock,
{
    /// Create a host with an empty book.
    pub fn new(config: ProtocolConfig, ledger: L, verifier: V, clock: C) -> Self {
        Self {
            book: GameBook::new(config),
            ledger,
            verifier,
            clock,
            log: Vec::new(),
        }
    }

    /// Execute `tx` on behalf of `caller`.
    pub fn execute(&mut self, caller: Address, tx: Transaction) -> Result<Receipt, GameError> {
        let now = self.clock.now();
        let name = tx.name();
        debug!(tx = name, caller = %caller.short(), now, "executing");

        let result = match tx {
            Transaction::CreateGame(params) => {
                self.book.create(&mut self.ledger, caller, params, now)
            }
            Transaction::JoinGame { id, player_move } => {
                self.book.join(&mut self.ledger, id, caller, player_move, now)
            }
            Transaction::RevealAndSettle { id, reveal } => {
                self.book.reveal_and_settle(&self.verifier, id, caller, &reveal, now)
            }
            Transaction::Forfeit { id } => self.book.forfeit(id, now),
            Transaction::Withdraw { id } => self.book.withdraw(&mut self.ledger, id, caller),
        };

        let data = match result {
            Ok(data) => data,
            Err(err) => {
                warn!(tx = name, kind = ?err.kind(), error = %err, "transaction reverted");
                return Err(err);
            }
        };

        let event = GameEvent::new(self.log.len() as u64 + 1, now, data);
        self.log.push(event.clone());

        Ok(Receipt { caller, event })
    }

    /// Set the caller's escrow allowance.
    pub fn approve(&mut self, owner: Address, token: Address, amount: u128) {
        self.ledger.approve(&token, &owner, amount);
    }

    /// Game book (read-only).
    pub fn book(&self) -> &GameBook {
        &self.book
    }

    /// Look up one game.
    pub fn game(&self, id: GameId) -> Option<&Game> {
        self.book.get(id)
    }

    /// Underlying ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Clock used to stamp transactions.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Full event log in commit order.
    pub fn events(&self) -> &[GameEvent] {
        &self.log
    }

    /// Events for one game in commit order.
    pub fn events_for(&self, id: GameId) -> impl Iterator<Item = &GameEvent> {
        self.log.iter().filter(move |e| e.game_id() == id)
    }
}
