//! Game State Machine
//!
//! `GameBook` owns every game record and is the only code that mutates one.
//! Each operation validates all preconditions first, then performs the one
//! fallible ledger call, then mutates the record. An error at any point
//! leaves both the book and the ledger as they were.
//!
//! Time is passed in as `now`; the book has no clock.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};
use tracing::{debug, info, instrument, warn};

use crate::core::clock::Timestamp;
use crate::core::ids::{Address, GameId};
use crate::error::{GameError, InvalidInput, Precondition};
use crate::game::events::GameEventData;
use crate::game::moves::Move;
use crate::game::state::{Game, GameState, Side, Winner};
use crate::game::timeout::{self, TimeoutPolicy};
use crate::ledger::TokenLedger;
use crate::proof::commitment::Commitment;
use crate::proof::settlement::{Reveal, SettlementCoordinator};
use crate::proof::verify::ProofVerifier;

/// Default cap on serialized proof size (bytes).
pub const DEFAULT_MAX_PROOF_BYTES: usize = 16 * 1024;

/// Protocol parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Accepted reveal windows.
    pub timeout: TimeoutPolicy,
    /// Largest proof accepted at reveal.
    pub max_proof_bytes: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            timeout: TimeoutPolicy::default(),
            max_proof_bytes: DEFAULT_MAX_PROOF_BYTES,
        }
    }
}

impl ProtocolConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout: TimeoutPolicy {
                min_secs: env_parse("RPS_MIN_TIMEOUT_SECS").unwrap_or(defaults.timeout.min_secs),
                max_secs: env_parse("RPS_MAX_TIMEOUT_SECS").unwrap_or(defaults.timeout.max_secs),
            },
            max_proof_bytes: env_parse("RPS_MAX_PROOF_BYTES").unwrap_or(defaults.max_proof_bytes),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Arguments to [`GameBook::create`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateGame {
    /// Wagered asset.
    pub token: Address,
    /// Per-player stake.
    pub stake: u128,
    /// Hash of the hidden move and salt.
    pub commitment: Commitment,
    /// Reveal window after join.
    pub timeout_secs: u64,
}

/// All games, addressed by id.
#[derive(Debug)]
pub struct GameBook {
    games: BTreeMap<GameId, Game>,
    next_id: GameId,
    config: ProtocolConfig,
}

impl Default for GameBook {
    fn default() -> Self {
        Self::new(ProtocolConfig::default())
    }
}

impl GameBook {
    /// Create an empty book.
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            games: BTreeMap::new(),
            next_id: 1,
            config,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Look up a game.
    pub fn get(&self, id: GameId) -> Option<&Game> {
        self.games.get(&id)
    }

    /// Look up a game or fail with `GameNotFound`.
    pub fn game(&self, id: GameId) -> Result<&Game, GameError> {
        self.games
            .get(&id)
            .ok_or_else(|| Precondition::GameNotFound(id).into())
    }

    /// Number of games ever created.
    pub fn len(&self) -> usize {
        self.games.len()
    }

    /// No games yet?
    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// All games in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Game> {
        self.games.values()
    }

    /// Games in `state`, in id order.
    pub fn in_state(&self, state: GameState) -> impl Iterator<Item = &Game> {
        self.games.values().filter(move |g| g.state == state)
    }

    fn game_mut(&mut self, id: GameId) -> Result<&mut Game, GameError> {
        self.games
            .get_mut(&id)
            .ok_or_else(|| Precondition::GameNotFound(id).into())
    }

    // =========================================================================
    // TRANSITIONS
    // =========================================================================

    /// Open a game and escrow the committer's stake.
    #[instrument(level = "debug", skip_all, fields(committer = %committer.short()))]
    pub fn create<L: TokenLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        committer: Address,
        params: CreateGame,
        now: Timestamp,
    ) -> Result<GameEventData, GameError> {
        if params.stake == 0 {
            return Err(InvalidInput::ZeroStake.into());
        }
        if params.stake.checked_mul(2).is_none() {
            return Err(InvalidInput::StakeOverflow(params.stake).into());
        }
        if !params.commitment.is_well_formed() {
            return Err(InvalidInput::MalformedCommitment.into());
        }
        let timeout_secs = self.config.timeout.validate(params.timeout_secs)?;

        ledger.escrow(&params.token, &committer, params.stake)?;

        let id = self.next_id;
        self.next_id += 1;

        let game = Game::new(
            id,
            committer,
            params.token,
            params.stake,
            params.commitment,
            timeout_secs,
            now,
        );
        self.games.insert(id, game);

        info!(
            game_id = id,
            stake = %params.stake,
            timeout_secs,
            "game created"
        );

        Ok(GameEventData::GameCreated {
            id,
            committer,
            token: params.token,
            stake: params.stake,
            commitment: params.commitment,
        })
    }

    /// Join with a plaintext move and escrow the joiner's stake.
    #[instrument(level = "debug", skip_all, fields(game_id = id, joiner = %joiner.short()))]
    pub fn join<L: TokenLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        id: GameId,
        joiner: Address,
        joiner_move: Move,
        now: Timestamp,
    ) -> Result<GameEventData, GameError> {
        let game = self.game(id)?;

        if game.state != GameState::AwaitingJoin {
            return Err(Precondition::WrongState { operation: "join", state: game.state }.into());
        }
        if joiner == game.committer {
            return Err(Precondition::SelfJoin.into());
        }
        debug_assert!(game.joiner.is_none() && game.joiner_move.is_none());

        let next_state = game.state.advance(GameState::AwaitingReveal)?;
        let reveal_deadline = timeout::deadline(now, game.timeout_secs)?;
        let (token, stake) = (game.token, game.stake);

        ledger.escrow(&token, &joiner, stake)?;

        let game = self.game_mut(id)?;
        game.joiner = Some(joiner);
        game.joiner_move = Some(joiner_move);
        game.joined_at = Some(now);
        game.reveal_deadline = Some(reveal_deadline);
        game.state = next_state;

        info!(game_id = id, reveal_deadline, "player joined");

        Ok(GameEventData::PlayerJoined {
            id,
            joiner,
            joiner_move,
            reveal_deadline,
        })
    }

    /// Reveal the committed move with a proof and resolve the game.
    #[instrument(level = "debug", skip_all, fields(game_id = id))]
    pub fn reveal_and_settle<V: ProofVerifier + ?Sized>(
        &mut self,
        verifier: &V,
        id: GameId,
        caller: Address,
        reveal: &Reveal,
        now: Timestamp,
    ) -> Result<GameEventData, GameError> {
        let game = self.game(id)?;

        if game.state != GameState::AwaitingReveal {
            return Err(Precondition::WrongState { operation: "reveal", state: game.state }.into());
        }
        if caller != game.committer {
            return Err(Precondition::NotCommitter.into());
        }
        reveal.proof.check_encoding(self.config.max_proof_bytes)?;

        let (deadline, joiner_move) = match (game.reveal_deadline, game.joiner_move) {
            (Some(deadline), Some(joiner_move)) => (deadline, joiner_move),
            // Unreachable while invariants hold; refuse rather than guess.
            _ => return Err(Precondition::WrongState { operation: "reveal", state: game.state }.into()),
        };
        if timeout::is_expired(now, deadline) {
            warn!(game_id = id, deadline, now, "reveal after deadline");
            return Err(GameError::DeadlineExceeded { deadline, now });
        }

        let next_state = game.state.advance(GameState::Settled)?;
        let settlement = SettlementCoordinator::new(verifier)
            .settle(&game.commitment, joiner_move, reveal)
            .map_err(|err| {
                warn!(game_id = id, error = %err, "reveal rejected");
                err
            })?;

        let game = self.game_mut(id)?;
        game.committer_move = Some(settlement.committer_move);
        game.winner = Some(settlement.winner);
        game.state = next_state;

        info!(
            game_id = id,
            committer_move = %settlement.committer_move,
            joiner_move = %settlement.joiner_move,
            winner = ?settlement.winner,
            "game settled"
        );

        Ok(GameEventData::GameSettled {
            id,
            winner: settlement.winner,
        })
    }

    /// Award the pot to the joiner after a missed reveal. Anyone may call.
    #[instrument(level = "debug", skip_all, fields(game_id = id))]
    pub fn forfeit(&mut self, id: GameId, now: Timestamp) -> Result<GameEventData, GameError> {
        let game = self.game(id)?;

        if game.state != GameState::AwaitingReveal {
            return Err(Precondition::WrongState { operation: "forfeit", state: game.state }.into());
        }
        let deadline = game
            .reveal_deadline
            .ok_or(Precondition::WrongState { operation: "forfeit", state: game.state })?;
        if !timeout::is_expired(now, deadline) {
            return Err(Precondition::DeadlineNotReached { deadline, now }.into());
        }
        let next_state = game.state.advance(GameState::Forfeited)?;

        let game = self.game_mut(id)?;
        game.winner = Some(Winner::Joiner);
        game.state = next_state;

        info!(game_id = id, deadline, now, "game forfeited");

        Ok(GameEventData::GameForfeited { id })
    }

    /// Pay the caller's entitled share out of escrow, once.
    #[instrument(level = "debug", skip_all, fields(game_id = id, caller = %caller.short()))]
    pub fn withdraw<L: TokenLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        id: GameId,
        caller: Address,
    ) -> Result<GameEventData, GameError> {
        let game = self.game(id)?;
        let (side, amount) = game.entitlement(&caller)?;
        let token = game.token;

        ledger.release(&token, &caller, amount)?;

        let game = self.game_mut(id)?;
        match side {
            Side::Committer => game.committer_withdrawn = true,
            Side::Joiner => game.joiner_withdrawn = true,
        }

        debug!(game_id = id, side = ?side, "share marked withdrawn");
        info!(game_id = id, amount = %amount, "prize withdrawn");

        Ok(GameEventData::PrizeWithdrawn {
            id,
            recipient: caller,
            amount,
        })
    }
}
