//! Move Encoding
//!
//! One canonical byte per move, used for commitments, storage and the wire:
//! `Rock = 1`, `Paper = 2`, `Scissors = 3`. Zero is never a move.
//!
//! The proof system numbers moves from zero. That index is produced only by
//! [`Move::circuit_index`] when building proof public inputs.

use serde::{Serialize, Deserialize};

use crate::error::InvalidInput;

/// A Rock-Paper-Scissors move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Move {
    /// Beats scissors.
    Rock = 1,
    /// Beats rock.
    Paper = 2,
    /// Beats paper.
    Scissors = 3,
}

impl Move {
    /// All moves in canonical order.
    pub const ALL: [Move; 3] = [Move::Rock, Move::Paper, Move::Scissors];

    /// Canonical byte.
    #[inline]
    pub const fn to_byte(self) -> u8 {
        self as u8
    }

    /// Parse the canonical byte.
    pub fn from_byte(byte: u8) -> Result<Move, InvalidInput> {
        match byte {
            1 => Ok(Move::Rock),
            2 => Ok(Move::Paper),
            3 => Ok(Move::Scissors),
            other => Err(InvalidInput::UnknownMove(other)),
        }
    }

    /// Zero-based index expected by the proof circuit.
    #[inline]
    pub const fn circuit_index(self) -> u32 {
        self as u32 - 1
    }

    /// Inverse of [`Move::circuit_index`].
    pub fn from_circuit_index(index: u32) -> Option<Move> {
        match index {
            0 => Some(Move::Rock),
            1 => Some(Move::Paper),
            2 => Some(Move::Scissors),
            _ => None,
        }
    }

    /// Lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            Move::Rock => "rock",
            Move::Paper => "paper",
            Move::Scissors => "scissors",
        }
    }

    /// The move this one defeats.
    pub const fn beats(self) -> Move {
        match self {
            Move::Rock => Move::Scissors,
            Move::Paper => Move::Rock,
            Move::Scissors => Move::Paper,
        }
    }
}

impl TryFrom<u8> for Move {
    type Error = InvalidInput;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Move::from_byte(byte)
    }
}

impl From<Move> for u8 {
    fn from(mv: Move) -> u8 {
        mv.to_byte()
    }
}

impl std::str::FromStr for Move {
    type Err = InvalidInput;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rock" | "r" => Ok(Move::Rock),
            "paper" | "p" => Ok(Move::Paper),
            "scissors" | "s" => Ok(Move::Scissors),
            _ => Err(InvalidInput::UnknownMoveName(s.to_string())),
        }
    }
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_bytes() {
        assert_eq!(Move::Rock.to_byte(), 1);
        assert_eq!(Move::Paper.to_byte(), 2);
        assert_eq!(Move::Scissors.to_byte(), 3);

        for mv in Move::ALL {
            assert_eq!(Move::from_byte(mv.to_byte()), Ok(mv));
        }
    }

    #[test]
    fn test_out_of_range_bytes_rejected() {
        assert_eq!(Move::from_byte(0), Err(InvalidInput::UnknownMove(0)));
        assert_eq!(Move::from_byte(4), Err(InvalidInput::UnknownMove(4)));
        assert_eq!(Move::from_byte(255), Err(InvalidInput::UnknownMove(255)));
    }

    #[test]
    fn test_circuit_index_is_zero_based() {
        assert_eq!(Move::Rock.circuit_index(), 0);
        assert_eq!(Move::Scissors.circuit_index(), 2);

        for mv in Move::ALL {
            assert_eq!(Move::from_circuit_index(mv.circuit_index()), Some(mv));
        }
        assert_eq!(Move::from_circuit_index(3), None);
    }

    #[test]
    fn test_serde_uses_canonical_byte() {
        assert_eq!(serde_json::to_string(&Move::Paper).unwrap(), "2");
        assert_eq!(serde_json::from_str::<Move>("3").unwrap(), Move::Scissors);
        assert!(serde_json::from_str::<Move>("0").is_err());

        let bytes = bincode::serialize(&Move::Rock).unwrap();
        assert_eq!(bytes, vec![1]);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("Rock".parse::<Move>(), Ok(Move::Rock));
        assert_eq!("s".parse::<Move>(), Ok(Move::Scissors));
        assert!("lizard".parse::<Move>().is_err());
    }
}
