//! Reveal Settlement
//!
//! A reveal settles a game only if three independent checks agree:
//!
//! 1. the revealed move and salt open the stored commitment,
//! 2. the external verifier accepts the proof for public inputs naming the
//!    revealed committer move and the recorded joiner move,
//! 3. the local resolver reaches the winner the proof claims.
//!
//! Public inputs are supplied by the caller, so a verifying proof alone is
//! not enough.

use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::error::{GameError, ProofRejection};
use crate::game::moves::Move;
use crate::game::outcome::{resolve, Outcome};
use crate::game::state::Winner;
use crate::proof::commitment::{Commitment, Salt};
use crate::proof::verify::{ProofVerifier, ZkProof};

/// What the committer submits at reveal time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reveal {
    /// Committed move.
    pub player_move: Move,
    /// Committed salt.
    pub salt: Salt,
    /// Proof over (committer move, joiner move, winner).
    pub proof: ZkProof,
}

/// Result of a successful settlement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settlement {
    /// Revealed committer move.
    pub committer_move: Move,
    /// Joiner move on record.
    pub joiner_move: Move,
    /// Resolver outcome (committer first).
    pub outcome: Outcome,
    /// Winner to record.
    pub winner: Winner,
}

/// Runs the three reveal checks against an external verifier.
pub struct SettlementCoordinator<'a, V: ProofVerifier + ?Sized> {
    verifier: &'a V,
}

impl<'a, V: ProofVerifier + ?Sized> SettlementCoordinator<'a, V> {
    /// Create a coordinator over `verifier`.
    pub fn new(verifier: &'a V) -> Self {
        Self { verifier }
    }

    /// Check a reveal. Pure with respect to game state.
    pub fn settle(
        &self,
        commitment: &Commitment,
        joiner_move: Move,
        reveal: &Reveal,
    ) -> Result<Settlement, GameError> {
        // 1. Commitment opens
        if !commitment.verify(reveal.player_move, &reveal.salt) {
            debug!(commitment = %commitment.to_hex(), "reveal does not open commitment");
            return Err(GameError::CommitmentMismatch);
        }

        // 2. Proof covers these moves and verifies
        let inputs = &reveal.proof.public_inputs;
        if inputs.committer_move() != Some(reveal.player_move)
            || inputs.joiner_move() != Some(joiner_move)
        {
            return Err(ProofRejection::PublicInputMismatch.into());
        }

        let valid = self
            .verifier
            .verify_proof(inputs, &reveal.proof.data)
            .map_err(ProofRejection::Verifier)?;
        if !valid {
            return Err(ProofRejection::Rejected.into());
        }

        // 3. Local resolution agrees with the attested winner
        let outcome = resolve(reveal.player_move, joiner_move);
        let claimed = inputs
            .claimed_outcome()
            .ok_or(ProofRejection::PublicInputMismatch)?;
        if claimed != outcome {
            return Err(ProofRejection::WinnerMismatch { claimed, resolved: outcome }.into());
        }

        Ok(Settlement {
            committer_move: reveal.player_move,
            joiner_move,
            outcome,
            winner: Winner::from(outcome),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::proof::commitment::commit;
    use crate::proof::public_inputs::ProofPublicInputs;
    use crate::proof::verify::{DigestProofVerifier, StubProofVerifier};

    fn salt() -> Salt {
        Salt::new([0x5a; 32])
    }

    fn reveal(mv: Move, proof: ZkProof) -> Reveal {
        Reveal { player_move: mv, salt: salt(), proof }
    }

    #[test]
    fn test_valid_reveal_settles() {
        let commitment = commit(Move::Rock, &salt());
        let proof = DigestProofVerifier::prove(ProofPublicInputs::from_round(
            Move::Rock,
            Move::Paper,
            Outcome::Second,
        ));

        let settlement = SettlementCoordinator::new(&DigestProofVerifier)
            .settle(&commitment, Move::Paper, &reveal(Move::Rock, proof))
            .unwrap();

        assert_eq!(settlement.outcome, Outcome::Second);
        assert_eq!(settlement.winner, Winner::Joiner);
    }

    #[test]
    fn test_commitment_checked_first() {
        let commitment = commit(Move::Rock, &salt());
        let proof = DigestProofVerifier::prove(ProofPublicInputs::from_round(
            Move::Scissors,
            Move::Paper,
            Outcome::First,
        ));

        let err = SettlementCoordinator::new(&DigestProofVerifier)
            .settle(&commitment, Move::Paper, &reveal(Move::Scissors, proof))
            .unwrap_err();
        assert_eq!(err, GameError::CommitmentMismatch);
    }

    #[test]
    fn test_wrong_winner_rejected_even_if_proof_verifies() {
        let commitment = commit(Move::Rock, &salt());
        // Stub accepts anything; the claim says the committer won Rock vs Paper.
        let proof = ZkProof::new(
            vec![1, 2, 3],
            ProofPublicInputs::from_round(Move::Rock, Move::Paper, Outcome::First),
        );

        let err = SettlementCoordinator::new(&StubProofVerifier)
            .settle(&commitment, Move::Paper, &reveal(Move::Rock, proof))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ProofInvalid);
        assert_eq!(
            err,
            GameError::ProofInvalid(ProofRejection::WinnerMismatch {
                claimed: Outcome::First,
                resolved: Outcome::Second,
            })
        );
    }

    #[test]
    fn test_public_inputs_must_name_recorded_joiner_move() {
        let commitment = commit(Move::Rock, &salt());
        let proof = DigestProofVerifier::prove(ProofPublicInputs::from_round(
            Move::Rock,
            Move::Scissors,
            Outcome::First,
        ));

        let err = SettlementCoordinator::new(&DigestProofVerifier)
            .settle(&commitment, Move::Paper, &reveal(Move::Rock, proof))
            .unwrap_err();
        assert_eq!(err, GameError::ProofInvalid(ProofRejection::PublicInputMismatch));
    }

    #[test]
    fn test_verifier_rejection() {
        let commitment = commit(Move::Paper, &salt());
        let inputs = ProofPublicInputs::from_round(Move::Paper, Move::Paper, Outcome::Tie);
        let forged = ZkProof::new(vec![0; 32], inputs);

        let err = SettlementCoordinator::new(&DigestProofVerifier)
            .settle(&commitment, Move::Paper, &reveal(Move::Paper, forged))
            .unwrap_err();
        assert_eq!(err, GameError::ProofInvalid(ProofRejection::Rejected));
    }
}
