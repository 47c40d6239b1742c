//! Move Commitment Protocol
//!
//! The committer publishes `SHA-256(move_byte || salt)` when creating a game
//! and reveals the move and salt at settlement.
//!
//! `move_byte` is the canonical byte from [`Move::to_byte`]. The same byte is
//! hashed at creation and at reveal; there is no other encoding.

use rand::RngCore;
use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};
use subtle::ConstantTimeEq;

use crate::core::hash::Hash32;
use crate::error::InvalidInput;
use crate::game::moves::Move;

/// Salt length in bytes.
pub const SALT_LEN: usize = 32;

/// Secret 32-byte salt chosen by the committer.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Salt(pub [u8; SALT_LEN]);

impl Salt {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; SALT_LEN]) -> Self {
        Self(bytes)
    }

    /// Draw a fresh salt from the OS RNG.
    pub fn random() -> Self {
        let mut bytes = [0u8; SALT_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parse from hex, with or without `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, InvalidInput> {
        decode_hex32(s)
            .map(Self)
            .ok_or(InvalidInput::MalformedSalt)
    }

    /// `0x`-prefixed hex string.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

// Keep salts out of log lines.
impl std::fmt::Debug for Salt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Salt(..)")
    }
}

/// Published commitment hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment(pub Hash32);

impl Commitment {
    /// Wrap a raw hash after checking it is well-formed.
    pub fn from_bytes(bytes: Hash32) -> Result<Self, InvalidInput> {
        let commitment = Self(bytes);
        if !commitment.is_well_formed() {
            return Err(InvalidInput::MalformedCommitment);
        }
        Ok(commitment)
    }

    /// Parse from hex, with or without `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, InvalidInput> {
        let bytes = decode_hex32(s).ok_or(InvalidInput::MalformedCommitment)?;
        Self::from_bytes(bytes)
    }

    /// All-zero is the "unset" value and never a valid commitment.
    pub fn is_well_formed(&self) -> bool {
        self.0.iter().any(|&b| b != 0)
    }

    /// Check a revealed move and salt against this commitment.
    pub fn verify(&self, player_move: Move, salt: &Salt) -> bool {
        verify(self, player_move, salt)
    }

    /// `0x`-prefixed hex string.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &Hash32 {
        &self.0
    }
}

/// Pre-image data (kept secret by the committer until reveal).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentPreimage {
    /// Hidden move.
    pub player_move: Move,
    /// Hidden salt.
    pub salt: Salt,
}

impl CommitmentPreimage {
    /// Pair a move with a fresh random salt.
    pub fn generate(player_move: Move) -> Self {
        Self {
            player_move,
            salt: Salt::random(),
        }
    }

    /// Commitment for this preimage.
    pub fn commitment(&self) -> Commitment {
        commit(self.player_move, &self.salt)
    }
}

/// Compute the commitment for a move and salt.
pub fn commit(player_move: Move, salt: &Salt) -> Commitment {
    let mut hasher = Sha256::new();
    hasher.update([player_move.to_byte()]);
    hasher.update(salt.0);
    Commitment(hasher.finalize().into())
}

/// Recompute and compare. Only a boolean leaves this function.
pub fn verify(commitment: &Commitment, player_move: Move, salt: &Salt) -> bool {
    let computed = commit(player_move, salt);
    computed.0.as_slice().ct_eq(commitment.0.as_slice()).into()
}

fn decode_hex32(s: &str) -> Option<[u8; 32]> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).ok()?;
    bytes.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_move() -> impl Strategy<Value = Move> {
        prop_oneof![Just(Move::Rock), Just(Move::Paper), Just(Move::Scissors)]
    }

    #[test]
    fn test_formula_is_move_byte_then_salt() {
        let salt = Salt::new([7; 32]);

        let mut preimage = vec![Move::Paper.to_byte()];
        preimage.extend_from_slice(&salt.0);
        let expected = crate::core::hash::hash_bytes(&preimage);

        assert_eq!(commit(Move::Paper, &salt).0, expected);
    }

    #[test]
    fn test_commitment_determinism() {
        let salt = Salt::new([1; 32]);
        assert_eq!(commit(Move::Rock, &salt), commit(Move::Rock, &salt));
    }

    #[test]
    fn test_wrong_move_fails() {
        let salt = Salt::new([9; 32]);
        let commitment = commit(Move::Rock, &salt);

        assert!(commitment.verify(Move::Rock, &salt));
        assert!(!commitment.verify(Move::Paper, &salt));
        assert!(!commitment.verify(Move::Scissors, &salt));
    }

    #[test]
    fn test_last_byte_difference_rejected() {
        let salt = Salt::new([5; 32]);
        let mut tampered = commit(Move::Scissors, &salt);
        tampered.0[31] ^= 1;

        assert!(!verify(&tampered, Move::Scissors, &salt));
        assert!(verify(&commit(Move::Scissors, &salt), Move::Scissors, &salt));
    }

    #[test]
    fn test_zero_commitment_malformed() {
        assert_eq!(Commitment::from_bytes([0; 32]), Err(InvalidInput::MalformedCommitment));
        assert!(Commitment::from_bytes([1; 32]).is_ok());
    }

    #[test]
    fn test_hex_parsing() {
        let commitment = commit(Move::Scissors, &Salt::new([3; 32]));
        assert_eq!(Commitment::from_hex(&commitment.to_hex()), Ok(commitment));
        assert_eq!(Commitment::from_hex("0x1234"), Err(InvalidInput::MalformedCommitment));

        let salt = Salt::new([0xaa; 32]);
        assert_eq!(Salt::from_hex(&salt.to_hex()), Ok(salt));
        assert_eq!(Salt::from_hex("zz"), Err(InvalidInput::MalformedSalt));
    }

    #[test]
    fn test_salt_debug_redacted() {
        let salt = Salt::new([0xaa; 32]);
        assert_eq!(format!("{:?}", salt), "Salt(..)");
    }

    #[test]
    fn test_generated_preimage_commits() {
        let preimage = CommitmentPreimage::generate(Move::Paper);
        let commitment = preimage.commitment();

        assert!(commitment.is_well_formed());
        assert!(commitment.verify(Move::Paper, &preimage.salt));
    }

    proptest! {
        #[test]
        fn prop_round_trip(mv in arb_move(), salt in any::<[u8; 32]>()) {
            let salt = Salt::new(salt);
            prop_assert!(verify(&commit(mv, &salt), mv, &salt));
        }

        #[test]
        fn prop_other_preimage_rejected(
            mv in arb_move(),
            other_mv in arb_move(),
            salt in any::<[u8; 32]>(),
            other_salt in any::<[u8; 32]>(),
        ) {
            prop_assume!(mv != other_mv || salt != other_salt);
            let commitment = commit(mv, &Salt::new(salt));
            prop_assert!(!verify(&commitment, other_mv, &Salt::new(other_salt)));
        }
    }
}
