//! Proof Public Inputs
//!
//! The winner circuit exposes three public signals, in this order:
//! committer move, joiner move, winner. Moves are the circuit's zero-based
//! indices; this is the only place the canonical move byte is converted.

use serde::{Serialize, Deserialize};

use crate::game::moves::Move;
use crate::game::outcome::Outcome;

/// Field element of the proof system's base field (u32 < 2^31 - 1).
pub type M31 = u32;

/// Mersenne-31 prime: 2^31 - 1
pub const M31_PRIME: u32 = 2147483647;

/// Total number of field elements in public inputs.
pub const PUBLIC_INPUT_ELEMENT_COUNT: usize = 3;

/// Public inputs attested by a reveal proof.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProofPublicInputs {
    /// Committer's move (circuit index).
    pub committer_move: M31,
    /// Joiner's move (circuit index).
    pub joiner_move: M31,
    /// Claimed outcome signal (0 tie, 1 committer, 2 joiner).
    pub winner: M31,
}

impl ProofPublicInputs {
    /// Encode a round at the proof boundary.
    pub fn from_round(committer_move: Move, joiner_move: Move, winner: Outcome) -> Self {
        Self {
            committer_move: committer_move.circuit_index(),
            joiner_move: joiner_move.circuit_index(),
            winner: winner.signal(),
        }
    }

    /// Decoded committer move, if the signal is in range.
    pub fn committer_move(&self) -> Option<Move> {
        Move::from_circuit_index(self.committer_move)
    }

    /// Decoded joiner move, if the signal is in range.
    pub fn joiner_move(&self) -> Option<Move> {
        Move::from_circuit_index(self.joiner_move)
    }

    /// Decoded winner claim, if the signal is in range.
    pub fn claimed_outcome(&self) -> Option<Outcome> {
        Outcome::from_signal(self.winner)
    }

    /// Are all signals valid field elements naming a move/outcome?
    pub fn is_well_formed(&self) -> bool {
        self.to_m31_array().iter().all(|&v| v < M31_PRIME)
            && self.committer_move().is_some()
            && self.joiner_move().is_some()
            && self.claimed_outcome().is_some()
    }

    /// Encode to flat field-element array.
    pub fn to_m31_array(&self) -> [M31; PUBLIC_INPUT_ELEMENT_COUNT] {
        [self.committer_move, self.joiner_move, self.winner]
    }

    /// Decode from flat field-element array.
    pub fn from_m31_array(arr: &[M31; PUBLIC_INPUT_ELEMENT_COUNT]) -> Self {
        Self {
            committer_move: arr[0],
            joiner_move: arr[1],
            winner: arr[2],
        }
    }
}
