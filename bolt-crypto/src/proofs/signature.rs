//! Showing a merchant signature without revealing it or the signed state.
//!
//! The prover re-randomizes the signature, commits to the message in G2 under
//! [`PublicKey::to_g2_pedersen_parameters`], and offsets the signature by the commitment's
//! blinding factor. A verifier then needs two checks: the blinded pairing equation
//! `e(h, g~^x * C~) == e(h_exp * h^r, g~)`, and a Schnorr proof that the prover can open `C~`.
//! Response scalars for individual message positions are exposed so callers can tie them to other
//! proofs or to values they already know.

use crate::{
    common::*,
    pointcheval_sanders::{BlindedSignature, PublicKey, Signature},
    proofs::{
        Challenge, ChallengeBuilder, ChallengeInput, CommitmentProof, CommitmentProofBuilder,
    },
};
use serde::{Deserialize, Serialize};

/// Proof of knowledge of a [`Signature`] together with the [`Message`] it signs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureProof<const N: usize> {
    blinded_signature: BlindedSignature,
    /// Opening proof for the G2 commitment `C~`.
    commitment_proof: CommitmentProof<G2Projective, N>,
}

/// First move of a [`SignatureProof`]: everything that goes into the challenge.
#[derive(Debug, Clone)]
pub struct SignatureProofBuilder<const N: usize> {
    blinded_signature: BlindedSignature,
    commitment_proof_builder: CommitmentProofBuilder<G2Projective, N>,
}

impl<const N: usize> SignatureProofBuilder<N> {
    /// Randomize and blind `signature`, and commit to `message`.
    ///
    /// A `Some` entry in `conjunction_commitment_scalars` fixes the commitment scalar for that
    /// message position, so another proof built with the same scalar proves equality with it.
    pub fn generate_proof_commitments(
        rng: &mut impl Rng,
        message: Message<N>,
        mut signature: Signature,
        conjunction_commitment_scalars: &[Option<Scalar>; N],
        public_key: &PublicKey<N>,
    ) -> Self {
        let commitment_proof_builder = CommitmentProofBuilder::generate_proof_commitments(
            rng,
            message,
            conjunction_commitment_scalars,
            &public_key.to_g2_pedersen_parameters(),
        );

        signature.randomize(rng);
        let blinded_signature =
            signature.blind(commitment_proof_builder.message_blinding_factor());

        Self {
            blinded_signature,
            commitment_proof_builder,
        }
    }

    /// Commitment scalars per message position, blinding factor excluded.
    pub fn conjunction_commitment_scalars(&self) -> &[Scalar; N] {
        self.commitment_proof_builder
            .conjunction_commitment_scalars()
    }

    /// Answer `challenge`.
    pub fn generate_proof_response(self, challenge: Challenge) -> SignatureProof<N> {
        SignatureProof {
            blinded_signature: self.blinded_signature,
            commitment_proof: self
                .commitment_proof_builder
                .generate_proof_response(challenge),
        }
    }
}

impl<const N: usize> ChallengeInput for SignatureProofBuilder<N> {
    fn consume(&self, builder: &mut ChallengeBuilder) {
        builder.consume(&self.blinded_signature);
        builder.consume(&self.commitment_proof_builder);
    }
}

impl<const N: usize> SignatureProof<N> {
    /// Accept only if the commitment opening verifies under `challenge` and the blinded
    /// signature is a well-formed signature on the committed message under `public_key`.
    pub fn verify_knowledge_of_signature(
        &self,
        public_key: &PublicKey<N>,
        challenge: Challenge,
    ) -> bool {
        let params = public_key.to_g2_pedersen_parameters();
        self.commitment_proof
            .verify_knowledge_of_opening(&params, challenge)
            && public_key.verify_blinded(self.commitment_proof.commitment(), &self.blinded_signature)
    }

    /// Response scalars per message position, blinding factor excluded.
    pub fn conjunction_response_scalars(&self) -> &[Scalar; N] {
        self.commitment_proof.conjunction_response_scalars()
    }
}

impl<const N: usize> ChallengeInput for SignatureProof<N> {
    fn consume(&self, builder: &mut ChallengeBuilder) {
        builder.consume(&self.blinded_signature);
        builder.consume(&self.commitment_proof);
    }
}
