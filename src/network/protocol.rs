//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Text frames carry tagged JSON messages. Binary frames carry a bincode
//! [`SubmitFrame`].
//!
//! Amounts travel as decimal strings and addresses, hashes and salts as
//! `0x` hex, so every JSON client can represent them exactly.

use serde::{Serialize, Deserialize};

use crate::core::clock::Timestamp;
use crate::core::ids::{Address, GameId};
use crate::error::{ErrorKind, InvalidInput};
use crate::game::events::{GameEvent, GameEventData};
use crate::game::machine::CreateGame;
use crate::game::moves::Move;
use crate::game::state::{Game, GameState, Winner};
use crate::host::executor::{Receipt, Transaction};
use crate::proof::commitment::{Commitment, Salt};
use crate::proof::public_inputs::{ProofPublicInputs, M31, PUBLIC_INPUT_ELEMENT_COUNT};
use crate::proof::settlement::Reveal;
use crate::proof::verify::ZkProof;

// =============================================================================
// FIELD PARSING
// =============================================================================

/// Parse a decimal amount.
pub fn parse_amount(s: &str) -> Result<u128, InvalidInput> {
    s.trim()
        .parse()
        .map_err(|_| InvalidInput::MalformedAmount(s.to_string()))
}

/// Parse a hex address.
pub fn parse_address(s: &str) -> Result<Address, InvalidInput> {
    Address::from_hex(s).ok_or_else(|| InvalidInput::MalformedAddress(s.to_string()))
}

/// Parse a move by name (`"rock"`) or canonical byte (`"1"`).
pub fn parse_move(s: &str) -> Result<Move, InvalidInput> {
    match s.trim().parse::<u8>() {
        Ok(byte) => Move::from_byte(byte),
        Err(_) => s.parse(),
    }
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate with a JWT.
    Auth(AuthRequest),

    /// Set escrow allowance for a token.
    Approve(ApproveRequest),

    /// Open a game.
    CreateGame(CreateGameRequest),

    /// Join a game.
    JoinGame(JoinGameRequest),

    /// Reveal and settle.
    Reveal(RevealRequest),

    /// Claim a missed reveal.
    Forfeit {
        /// Echoed in the reply.
        request_id: u64,
        /// Target game.
        game_id: GameId,
    },

    /// Collect a payout.
    Withdraw {
        /// Echoed in the reply.
        request_id: u64,
        /// Target game.
        game_id: GameId,
    },

    /// Fetch a game snapshot.
    GetGame {
        /// Target game.
        game_id: GameId,
    },

    /// Fetch own balance and allowance.
    Balance {
        /// Token address.
        token: String,
    },

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },
}

/// Authentication request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    /// JWT issued by the identity provider.
    pub token: String,
    /// Client version for compatibility check.
    #[serde(default)]
    pub client_version: String,
}

/// Allowance update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveRequest {
    /// Echoed in the reply.
    pub request_id: u64,
    /// Token address.
    pub token: String,
    /// Decimal amount.
    pub amount: String,
}

/// Game creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGameRequest {
    /// Echoed in the reply.
    pub request_id: u64,
    /// Token address.
    pub token: String,
    /// Decimal stake.
    pub stake: String,
    /// Commitment hash (hex).
    pub commitment: String,
    /// Reveal window in seconds.
    pub timeout_secs: u64,
}

/// Join request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinGameRequest {
    /// Echoed in the reply.
    pub request_id: u64,
    /// Target game.
    pub game_id: GameId,
    /// Move name or byte.
    #[serde(rename = "move")]
    pub player_move: String,
}

/// Reveal request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealRequest {
    /// Echoed in the reply.
    pub request_id: u64,
    /// Target game.
    pub game_id: GameId,
    /// Committed move name or byte.
    #[serde(rename = "move")]
    pub player_move: String,
    /// Committed salt (hex).
    pub salt: String,
    /// Proof bytes (hex).
    pub proof: String,
    /// Public signals: committer move, joiner move, winner.
    pub public_inputs: [M31; PUBLIC_INPUT_ELEMENT_COUNT],
}

impl ClientMessage {
    /// Request id to echo, for messages that carry one.
    pub fn request_id(&self) -> Option<u64> {
        match self {
            Self::Approve(r) => Some(r.request_id),
            Self::CreateGame(r) => Some(r.request_id),
            Self::JoinGame(r) => Some(r.request_id),
            Self::Reveal(r) => Some(r.request_id),
            Self::Forfeit { request_id, .. } | Self::Withdraw { request_id, .. } => Some(*request_id),
            Self::Auth(_) | Self::GetGame { .. } | Self::Balance { .. } | Self::Ping { .. } => None,
        }
    }

    /// Transaction this message submits, if it submits one.
    pub fn to_transaction(&self) -> Result<Option<Transaction>, InvalidInput> {
        let tx = match self {
            Self::CreateGame(req) => Transaction::CreateGame(CreateGame {
                token: parse_address(&req.token)?,
                stake: parse_amount(&req.stake)?,
                commitment: Commitment::from_hex(&req.commitment)?,
                timeout_secs: req.timeout_secs,
            }),
            Self::JoinGame(req) => Transaction::JoinGame {
                id: req.game_id,
                player_move: parse_move(&req.player_move)?,
            },
            Self::Reveal(req) => {
                let proof = hex::decode(req.proof.trim_start_matches("0x"))
                    .map_err(|e| InvalidInput::MalformedProof(e.to_string()))?;
                Transaction::RevealAndSettle {
                    id: req.game_id,
                    reveal: Reveal {
                        player_move: parse_move(&req.player_move)?,
                        salt: Salt::from_hex(&req.salt)?,
                        proof: ZkProof::new(proof, ProofPublicInputs::from_m31_array(&req.public_inputs)),
                    },
                }
            }
            Self::Forfeit { game_id, .. } => Transaction::Forfeit { id: *game_id },
            Self::Withdraw { game_id, .. } => Transaction::Withdraw { id: *game_id },
            _ => return Ok(None),
        };
        Ok(Some(tx))
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Binary submission: a bincode-encoded transaction.
///
/// Tagged JSON enums do not survive bincode, so binary clients send the
/// transaction in its native externally tagged form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitFrame {
    /// Echoed in the reply.
    pub request_id: u64,
    /// Transaction to execute.
    pub tx: Transaction,
}

impl SubmitFrame {
    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication result.
    AuthResult(AuthResult),

    /// Transaction committed.
    Receipt(ReceiptInfo),

    /// Transaction or request refused.
    Rejected(Rejection),

    /// Allowance updated.
    Approved {
        /// Request being answered.
        request_id: u64,
    },

    /// Game snapshot.
    Game(GameView),

    /// Balance and allowance.
    Balance {
        /// Token address.
        token: String,
        /// Decimal balance.
        balance: String,
        /// Decimal allowance.
        allowance: String,
    },

    /// Event committed by any participant.
    Event(EventNotice),

    /// Pong response.
    Pong {
        /// Client timestamp from the ping.
        timestamp: u64,
        /// Server unix time in milliseconds.
        server_time: u64,
    },

    /// Error not tied to a request.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Reason.
        reason: String,
    },
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Rejection for `request_id`.
    pub fn rejected(request_id: Option<u64>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Rejected(Rejection {
            request_id,
            code,
            message: message.into(),
        })
    }
}

/// Authentication result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResult {
    /// Whether authentication succeeded.
    pub success: bool,
    /// Ledger address bound to this connection.
    pub address: Option<String>,
    /// Failure reason.
    pub error: Option<String>,
    /// Failure code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    /// Server version.
    pub server_version: String,
}

/// Committed transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptInfo {
    /// Request being answered.
    pub request_id: u64,
    /// Event the transaction emitted.
    pub notice: EventNotice,
}

impl ReceiptInfo {
    /// Build from a host receipt.
    pub fn new(request_id: u64, receipt: &Receipt) -> Self {
        Self {
            request_id,
            notice: EventNotice::from(&receipt.event),
        }
    }
}

/// Refused request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rejection {
    /// Request being answered, if it had one.
    pub request_id: Option<u64>,
    /// Machine-readable code.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
}

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Error message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Frame did not parse.
    InvalidMessage,
    /// Not authenticated.
    NotAuthenticated,
    /// Authentication failed.
    AuthFailed,
    /// JWT token has expired.
    TokenExpired,
    /// Field malformed or out of range.
    InvalidInput,
    /// Wrong state, wrong caller, or too early.
    PreconditionViolation,
    /// Reveal does not open the commitment.
    CommitmentMismatch,
    /// Proof rejected.
    ProofInvalid,
    /// Balance too low.
    InsufficientFunds,
    /// Allowance too low.
    InsufficientAllowance,
    /// Reveal too late.
    DeadlineExceeded,
    /// Ledger invariant broken.
    LedgerFault,
    /// Unknown game.
    GameNotFound,
    /// Server overloaded.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

impl From<ErrorKind> for ErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::InvalidInput => ErrorCode::InvalidInput,
            ErrorKind::PreconditionViolation => ErrorCode::PreconditionViolation,
            ErrorKind::CommitmentMismatch => ErrorCode::CommitmentMismatch,
            ErrorKind::ProofInvalid => ErrorCode::ProofInvalid,
            ErrorKind::InsufficientFunds => ErrorCode::InsufficientFunds,
            ErrorKind::InsufficientAllowance => ErrorCode::InsufficientAllowance,
            ErrorKind::DeadlineExceeded => ErrorCode::DeadlineExceeded,
            ErrorKind::LedgerFault => ErrorCode::LedgerFault,
        }
    }
}

// =============================================================================
// VIEWS
// =============================================================================

/// Event with ordering metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventNotice {
    /// Position in the host's event log.
    pub sequence: u64,
    /// Host time of the transaction.
    pub timestamp: Timestamp,
    /// Event body.
    pub event: EventView,
}

impl From<&GameEvent> for EventNotice {
    fn from(event: &GameEvent) -> Self {
        Self {
            sequence: event.sequence,
            timestamp: event.timestamp,
            event: EventView::from(&event.data),
        }
    }
}

/// JSON-safe rendering of [`GameEventData`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventView {
    /// Game opened.
    GameCreated {
        /// Game id.
        game_id: GameId,
        /// Creator.
        committer: String,
        /// Token.
        token: String,
        /// Decimal stake.
        stake: String,
        /// Commitment hash.
        commitment: String,
    },
    /// Second player joined.
    PlayerJoined {
        /// Game id.
        game_id: GameId,
        /// Joiner.
        joiner: String,
        /// Joiner's move.
        #[serde(rename = "move")]
        player_move: String,
        /// Last second a reveal is accepted.
        reveal_deadline: Timestamp,
    },
    /// Game resolved by reveal.
    GameSettled {
        /// Game id.
        game_id: GameId,
        /// Winner.
        winner: Winner,
    },
    /// Game resolved by missed reveal.
    GameForfeited {
        /// Game id.
        game_id: GameId,
    },
    /// Payout made.
    PrizeWithdrawn {
        /// Game id.
        game_id: GameId,
        /// Payee.
        recipient: String,
        /// Decimal amount.
        amount: String,
    },
}

impl From<&GameEventData> for EventView {
    fn from(data: &GameEventData) -> Self {
        match data {
            GameEventData::GameCreated { id, committer, token, stake, commitment } => Self::GameCreated {
                game_id: *id,
                committer: committer.to_hex(),
                token: token.to_hex(),
                stake: stake.to_string(),
                commitment: commitment.to_hex(),
            },
            GameEventData::PlayerJoined { id, joiner, joiner_move, reveal_deadline } => Self::PlayerJoined {
                game_id: *id,
                joiner: joiner.to_hex(),
                player_move: joiner_move.name().to_string(),
                reveal_deadline: *reveal_deadline,
            },
            GameEventData::GameSettled { id, winner } => Self::GameSettled {
                game_id: *id,
                winner: *winner,
            },
            GameEventData::GameForfeited { id } => Self::GameForfeited { game_id: *id },
            GameEventData::PrizeWithdrawn { id, recipient, amount } => Self::PrizeWithdrawn {
                game_id: *id,
                recipient: recipient.to_hex(),
                amount: amount.to_string(),
            },
        }
    }
}

/// JSON-safe game snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameView {
    /// Game id.
    pub game_id: GameId,
    /// Creator.
    pub committer: String,
    /// Joiner, once joined.
    pub joiner: Option<String>,
    /// Token.
    pub token: String,
    /// Decimal stake.
    pub stake: String,
    /// Commitment hash.
    pub commitment: String,
    /// Committer move, once revealed.
    pub committer_move: Option<String>,
    /// Joiner move, once joined.
    pub joiner_move: Option<String>,
    /// Lifecycle state.
    pub state: GameState,
    /// Creation time.
    pub created_at: Timestamp,
    /// Join time.
    pub joined_at: Option<Timestamp>,
    /// Reveal deadline.
    pub reveal_deadline: Option<Timestamp>,
    /// Winner, once resolved.
    pub winner: Option<Winner>,
    /// Reveal window.
    pub timeout_secs: u64,
    /// Committer share paid.
    pub committer_withdrawn: bool,
    /// Joiner share paid.
    pub joiner_withdrawn: bool,
}

impl From<&Game> for GameView {
    fn from(game: &Game) -> Self {
        Self {
            game_id: game.id(),
            committer: game.committer().to_hex(),
            joiner: game.joiner().map(|a| a.to_hex()),
            token: game.token().to_hex(),
            stake: game.stake().to_string(),
            commitment: game.commitment().to_hex(),
            committer_move: game.committer_move().map(|m| m.name().to_string()),
            joiner_move: game.joiner_move().map(|m| m.name().to_string()),
            state: game.state(),
            created_at: game.created_at(),
            joined_at: game.joined_at(),
            reveal_deadline: game.reveal_deadline(),
            winner: game.winner(),
            timeout_secs: game.timeout_secs(),
            committer_withdrawn: game.committer_withdrawn(),
            joiner_withdrawn: game.joiner_withdrawn(),
        }
    }
}
