//! Proof Verification Interface
//!
//! The zero-knowledge system is an external oracle. The settlement path only
//! needs a yes/no answer for a proof and its public inputs.

use serde::{Serialize, Deserialize};
use subtle::ConstantTimeEq;

use crate::core::hash::{DomainHasher, Hash32};
use crate::error::InvalidInput;
use crate::proof::public_inputs::ProofPublicInputs;

/// Serialized proof plus the public inputs it claims to attest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZkProof {
    /// Opaque proof bytes, interpreted only by the verifier.
    pub data: Vec<u8>,
    /// Public inputs the proof was generated against.
    pub public_inputs: ProofPublicInputs,
}

impl ZkProof {
    /// Create a new proof envelope.
    pub fn new(data: Vec<u8>, public_inputs: ProofPublicInputs) -> Self {
        Self { data, public_inputs }
    }

    /// Reject encodings no verifier could accept.
    pub fn check_encoding(&self, max_bytes: usize) -> Result<(), InvalidInput> {
        if self.data.is_empty() {
            return Err(InvalidInput::MalformedProof("empty proof".into()));
        }
        if self.data.len() > max_bytes {
            return Err(InvalidInput::MalformedProof(format!(
                "{} bytes exceeds limit of {}",
                self.data.len(),
                max_bytes
            )));
        }
        if !self.public_inputs.is_well_formed() {
            return Err(InvalidInput::MalformedProof("public inputs out of range".into()));
        }
        Ok(())
    }
}

/// Interface for reveal proof verification.
///
/// Implementations wrap a real verifier (on-chain precompile, remote
/// prover service, native library).
pub trait ProofVerifier {
    /// Verify a proof against public inputs.
    fn verify_proof(
        &self,
        public_inputs: &ProofPublicInputs,
        proof: &[u8],
    ) -> Result<bool, ProofVerificationError>;
}

impl<V: ProofVerifier + ?Sized> ProofVerifier for Box<V> {
    fn verify_proof(
        &self,
        public_inputs: &ProofPublicInputs,
        proof: &[u8],
    ) -> Result<bool, ProofVerificationError> {
        (**self).verify_proof(public_inputs, proof)
    }
}

/// Errors during proof verification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProofVerificationError {
    /// Proof bytes are not in the verifier's format.
    #[error("Invalid proof format")]
    InvalidProofFormat,
}

/// Stub verifier for testing (accepts any non-empty proof).
pub struct StubProofVerifier;

impl ProofVerifier for StubProofVerifier {
    fn verify_proof(
        &self,
        _public_inputs: &ProofPublicInputs,
        proof: &[u8],
    ) -> Result<bool, ProofVerificationError> {
        if proof.is_empty() {
            return Err(ProofVerificationError::InvalidProofFormat);
        }
        Ok(true)
    }
}

/// Length of a digest proof.
pub const DIGEST_PROOF_LEN: usize = 32;

/// Compute a digest proof binding bytes to public inputs.
///
/// Not zero-knowledge. Used by the demo and tests where a proof must be
/// tied to one specific set of public inputs.
pub fn digest_proof(public_inputs: &ProofPublicInputs) -> Hash32 {
    let mut hasher = DomainHasher::for_proof_digest();
    for element in public_inputs.to_m31_array() {
        hasher.update_u32(element);
    }
    hasher.finalize()
}

/// Verifier for [`digest_proof`] proofs.
#[derive(Clone, Copy, Debug, Default)]
pub struct DigestProofVerifier;

impl DigestProofVerifier {
    /// Produce a proof this verifier accepts.
    pub fn prove(public_inputs: ProofPublicInputs) -> ZkProof {
        ZkProof::new(digest_proof(&public_inputs).to_vec(), public_inputs)
    }
}

impl ProofVerifier for DigestProofVerifier {
    fn verify_proof(
        &self,
        public_inputs: &ProofPublicInputs,
        proof: &[u8],
    ) -> Result<bool, ProofVerificationError> {
        if proof.len() != DIGEST_PROOF_LEN {
            return Err(ProofVerificationError::InvalidProofFormat);
        }
        Ok(proof.ct_eq(digest_proof(public_inputs).as_slice()).into())
    }
}
