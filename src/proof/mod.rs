//! Commitment and Proof System
//!
//! Hides the committer's move until reveal and checks the reveal against an
//! external zero-knowledge verifier.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PROOF SYSTEM                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  commitment.rs    - SHA-256(move || salt) commit/verify     │
//! │  public_inputs.rs - (committer, joiner, winner) M31 inputs  │
//! │  verify.rs        - ProofVerifier trait and local verifiers │
//! │  settlement.rs    - Commitment + proof + resolver agreement │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod commitment;
pub mod public_inputs;
pub mod verify;
pub mod settlement;

// Re-export key types
pub use commitment::{commit, Commitment, CommitmentPreimage, Salt, SALT_LEN};
pub use public_inputs::{ProofPublicInputs, M31};
pub use verify::{
    DigestProofVerifier, ProofVerifier, ProofVerificationError, StubProofVerifier, ZkProof,
};
pub use settlement::{Reveal, Settlement, SettlementCoordinator};
