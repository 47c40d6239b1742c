//! Winner Resolution
//!
//! Pure mapping from two moves to an outcome. No state, no I/O.

use serde::{Serialize, Deserialize};

use crate::game::moves::Move;

/// Outcome of one round from the first mover's perspective.
///
/// Discriminants are the values the proof circuit exposes as its public
/// `winner` signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Outcome {
    /// Both moves equal.
    Tie = 0,
    /// First move wins.
    First = 1,
    /// Second move wins.
    Second = 2,
}

impl Outcome {
    /// Value used in proof public inputs.
    #[inline]
    pub const fn signal(self) -> u32 {
        self as u32
    }

    /// Inverse of [`Outcome::signal`].
    pub fn from_signal(signal: u32) -> Option<Outcome> {
        match signal {
            0 => Some(Outcome::Tie),
            1 => Some(Outcome::First),
            2 => Some(Outcome::Second),
            _ => None,
        }
    }
}

/// Resolve a round.
pub fn resolve(first: Move, second: Move) -> Outcome {
    if first == second {
        Outcome::Tie
    } else if first.beats() == second {
        Outcome::First
    } else {
        Outcome::Second
    }
}
