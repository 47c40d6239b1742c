//! Protocol Errors
//!
//! Every error is scoped to one transition attempt and leaves the game
//! record untouched.

use thiserror::Error;

use crate::core::clock::Timestamp;
use crate::core::ids::GameId;
use crate::game::outcome::Outcome;
use crate::game::state::GameState;
use crate::ledger::LedgerError;
use crate::proof::verify::ProofVerificationError;

/// Error kinds callers can branch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-range input.
    InvalidInput,
    /// Wrong state, wrong caller, or not yet allowed.
    PreconditionViolation,
    /// Revealed move and salt do not hash to the commitment.
    CommitmentMismatch,
    /// Proof rejected or inconsistent with the revealed moves.
    ProofInvalid,
    /// Caller balance cannot cover the stake.
    InsufficientFunds,
    /// Caller has not approved enough for escrow.
    InsufficientAllowance,
    /// Reveal arrived after the deadline.
    DeadlineExceeded,
    /// Ledger invariant broken (escrow shortfall, overflow).
    LedgerFault,
}

/// Input rejected before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidInput {
    /// Move byte outside the canonical set.
    #[error("move byte {0} is not rock(1), paper(2) or scissors(3)")]
    UnknownMove(u8),
    /// Move name not recognized.
    #[error("unknown move name: {0}")]
    UnknownMoveName(String),
    /// Stake of zero.
    #[error("stake must be positive")]
    ZeroStake,
    /// Pot (2 x stake) does not fit.
    #[error("stake {0} overflows the pot")]
    StakeOverflow(u128),
    /// Timeout outside configured bounds.
    #[error("timeout {got}s outside [{min}s, {max}s]")]
    TimeoutOutOfRange {
        /// Requested timeout.
        got: u64,
        /// Lower bound.
        min: u64,
        /// Upper bound.
        max: u64,
    },
    /// Deadline arithmetic overflowed.
    #[error("reveal deadline overflows")]
    DeadlineOverflow,
    /// Commitment is not a 32-byte non-zero hash.
    #[error("malformed commitment")]
    MalformedCommitment,
    /// Salt is not 32 bytes.
    #[error("malformed salt")]
    MalformedSalt,
    /// Address is not 20 bytes of hex.
    #[error("malformed address: {0}")]
    MalformedAddress(String),
    /// Amount is not a decimal integer.
    #[error("malformed amount: {0}")]
    MalformedAmount(String),
    /// Proof bytes or public inputs unusable.
    #[error("malformed proof: {0}")]
    MalformedProof(String),
}

/// Transition not allowed in the current situation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Precondition {
    /// No game under this id.
    #[error("game {0} not found")]
    GameNotFound(GameId),
    /// Operation not valid in the game's state.
    #[error("{operation} not allowed while game is {state:?}")]
    WrongState {
        /// Attempted operation.
        operation: &'static str,
        /// Current state.
        state: GameState,
    },
    /// State edge that does not exist.
    #[error("illegal transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current state.
        from: GameState,
        /// Requested state.
        to: GameState,
    },
    /// Committer tried to join their own game.
    #[error("committer cannot join own game")]
    SelfJoin,
    /// Only the committer may reveal.
    #[error("only the committer may reveal")]
    NotCommitter,
    /// Reveal window still open.
    #[error("reveal deadline {deadline} not yet passed at {now}")]
    DeadlineNotReached {
        /// Reveal deadline.
        deadline: Timestamp,
        /// Host time of the attempt.
        now: Timestamp,
    },
    /// Caller has no share in the pot.
    #[error("caller is not entitled to a payout")]
    NotEntitled,
    /// Caller's share already paid.
    #[error("payout already withdrawn")]
    AlreadyWithdrawn,
}

/// Why a reveal proof was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofRejection {
    /// Verifier answered "invalid".
    #[error("verifier rejected proof")]
    Rejected,
    /// Verifier failed to produce an answer.
    #[error("verifier error: {0}")]
    Verifier(ProofVerificationError),
    /// Public inputs name moves other than the revealed/recorded ones.
    #[error("public inputs do not match revealed moves")]
    PublicInputMismatch,
    /// Claimed winner disagrees with local resolution.
    #[error("claimed outcome {claimed:?} but moves resolve to {resolved:?}")]
    WinnerMismatch {
        /// Outcome in the proof's public inputs.
        claimed: Outcome,
        /// Outcome from the local resolver.
        resolved: Outcome,
    },
}

/// Errors returned by protocol transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    /// Malformed input.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInput),

    /// Transition not allowed.
    #[error("precondition violated: {0}")]
    Precondition(#[from] Precondition),

    /// Reveal does not open the commitment.
    #[error("revealed move and salt do not match commitment")]
    CommitmentMismatch,

    /// Proof refused.
    #[error("proof invalid: {0}")]
    ProofInvalid(#[from] ProofRejection),

    /// Balance too low for the stake.
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds {
        /// Stake required.
        needed: u128,
        /// Balance held.
        available: u128,
    },

    /// Allowance too low for the stake.
    #[error("insufficient allowance: need {needed}, approved {approved}")]
    InsufficientAllowance {
        /// Stake required.
        needed: u128,
        /// Amount approved for escrow.
        approved: u128,
    },

    /// Reveal after deadline.
    #[error("reveal deadline {deadline} exceeded at {now}")]
    DeadlineExceeded {
        /// Reveal deadline.
        deadline: Timestamp,
        /// Host time of the attempt.
        now: Timestamp,
    },

    /// Ledger invariant failure.
    #[error("ledger fault: {0}")]
    Ledger(LedgerError),
}

impl GameError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Precondition(_) => ErrorKind::PreconditionViolation,
            Self::CommitmentMismatch => ErrorKind::CommitmentMismatch,
            Self::ProofInvalid(_) => ErrorKind::ProofInvalid,
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::InsufficientAllowance { .. } => ErrorKind::InsufficientAllowance,
            Self::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
            Self::Ledger(_) => ErrorKind::LedgerFault,
        }
    }
}

impl From<LedgerError> for GameError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds { needed, available } => {
                Self::InsufficientFunds { needed, available }
            }
            LedgerError::InsufficientAllowance { needed, approved } => {
                Self::InsufficientAllowance { needed, approved }
            }
            other => Self::Ledger(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(GameError::from(InvalidInput::ZeroStake).kind(), ErrorKind::InvalidInput);
        assert_eq!(GameError::from(Precondition::SelfJoin).kind(), ErrorKind::PreconditionViolation);
        assert_eq!(GameError::from(ProofRejection::Rejected).kind(), ErrorKind::ProofInvalid);
        assert_eq!(GameError::CommitmentMismatch.kind(), ErrorKind::CommitmentMismatch);
        assert_eq!(
            GameError::DeadlineExceeded { deadline: 1, now: 2 }.kind(),
            ErrorKind::DeadlineExceeded
        );
    }

    #[test]
    fn test_ledger_errors_map_to_taxonomy() {
        let funds = GameError::from(LedgerError::InsufficientFunds { needed: 10, available: 5 });
        assert_eq!(funds.kind(), ErrorKind::InsufficientFunds);

        let allowance = GameError::from(LedgerError::InsufficientAllowance { needed: 10, approved: 0 });
        assert_eq!(allowance.kind(), ErrorKind::InsufficientAllowance);

        let fault = GameError::from(LedgerError::EscrowShortfall { needed: 10, held: 0 });
        assert_eq!(fault.kind(), ErrorKind::LedgerFault);
    }

    #[test]
    fn test_display() {
        let err = GameError::from(Precondition::GameNotFound(7));
        assert_eq!(err.to_string(), "precondition violated: game 7 not found");
    }
}
