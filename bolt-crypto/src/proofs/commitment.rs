//! Schnorr proof that the prover can open a Pedersen commitment.
//!
//! For a commitment `C = h^r * prod(g_i^m_i)` the prover sends an announcement
//! `A = h^t * prod(g_i^s_i)` for random nonces, receives a challenge `c`, and answers with
//! `r' = t + c*r` and `m_i' = s_i + c*m_i`. The verifier recomputes the commitment of the answers
//! and compares it against `A * C^c`.
//!
//! Nonces for individual message positions may be supplied by the caller. Two proofs that use the
//! same nonce for a position (and the same challenge) have equal responses there exactly when the
//! underlying values are equal; nonces chosen as `s_c = s_a + s_b` express `m_c = m_a + m_b`.

use crate::{
    common::*,
    pedersen::{Commitment, PedersenParameters},
    proofs::{Challenge, ChallengeBuilder, ChallengeInput},
    serde::SerializeElement,
};
use ff::Field;
use serde::{Deserialize, Serialize};

/// A completed opening proof for [`CommitmentProof::commitment`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "G: SerializeElement")]
pub struct CommitmentProof<G: Group<Scalar = Scalar>, const N: usize> {
    commitment: Commitment<G>,
    announcement: Commitment<G>,
    #[serde(with = "SerializeElement")]
    blinding_response: Scalar,
    #[serde(with = "SerializeElement")]
    responses: Box<[Scalar; N]>,
}

impl<G: Group<Scalar = Scalar>, const N: usize> CommitmentProof<G, N> {
    /// Check the responses against `challenge`.
    ///
    /// This says nothing about which commitment was opened: callers compare
    /// [`commitment`](Self::commitment) to what they expect, and check any cross-proof relations
    /// on [`conjunction_response_scalars`](Self::conjunction_response_scalars).
    pub fn verify_knowledge_of_opening(
        &self,
        pedersen_params: &PedersenParameters<G, N>,
        challenge: Challenge,
    ) -> bool {
        let answered = Message::new(*self.responses).commit(
            pedersen_params,
            BlindingFactor::from_scalar(self.blinding_response),
        );
        let expected =
            self.announcement.to_element() + self.commitment.to_element() * challenge.to_scalar();
        answered.to_element() == expected
    }

    /// Responses per message position, blinding factor excluded.
    pub fn conjunction_response_scalars(&self) -> &[Scalar; N] {
        &self.responses
    }

    /// The commitment this proof opens.
    pub fn commitment(&self) -> Commitment<G> {
        self.commitment
    }
}

impl<G: Group<Scalar = Scalar> + GroupEncoding, const N: usize> ChallengeInput
    for CommitmentProof<G, N>
{
    fn consume(&self, builder: &mut ChallengeBuilder) {
        builder.consume(&self.commitment);
        builder.consume(&self.announcement);
    }
}

/// Prover state between announcement and response.
#[derive(Debug, Clone)]
pub struct CommitmentProofBuilder<G: Group<Scalar = Scalar>, const N: usize> {
    msg: Message<N>,
    blinding_factor: BlindingFactor,
    commitment: Commitment<G>,
    announcement: Commitment<G>,
    blinding_nonce: Scalar,
    nonces: Box<[Scalar; N]>,
}

impl<G: Group<Scalar = Scalar>, const N: usize> CommitmentProofBuilder<G, N> {
    /// Commit to `msg` under a fresh blinding factor and compute the announcement.
    ///
    /// Positions where `conjunction_commitment_scalars` is `Some` use that nonce; the rest are
    /// sampled.
    pub fn generate_proof_commitments(
        rng: &mut impl Rng,
        msg: Message<N>,
        conjunction_commitment_scalars: &[Option<Scalar>; N],
        pedersen_params: &PedersenParameters<G, N>,
    ) -> Self {
        let blinding_factor = BlindingFactor::new(&mut *rng);
        let blinding_nonce = Scalar::random(&mut *rng);
        let mut nonces = Box::new([Scalar::zero(); N]);
        for (i, fixed) in conjunction_commitment_scalars.iter().enumerate() {
            nonces[i] = match fixed {
                Some(nonce) => *nonce,
                None => Scalar::random(&mut *rng),
            };
        }

        Self {
            commitment: msg.commit(pedersen_params, blinding_factor),
            announcement: Message::new(*nonces)
                .commit(pedersen_params, BlindingFactor::from_scalar(blinding_nonce)),
            msg,
            blinding_factor,
            blinding_nonce,
            nonces,
        }
    }

    /// The commitment being opened.
    pub fn commitment(&self) -> Commitment<G> {
        self.commitment
    }

    /// Blinding factor of [`commitment`](Self::commitment).
    pub fn message_blinding_factor(&self) -> BlindingFactor {
        self.blinding_factor
    }

    /// Nonces per message position, blinding factor excluded.
    pub fn conjunction_commitment_scalars(&self) -> &[Scalar; N] {
        &self.nonces
    }

    /// Answer `challenge`, consuming the prover state.
    pub fn generate_proof_response(self, challenge: Challenge) -> CommitmentProof<G, N> {
        let c = challenge.to_scalar();
        let mut responses = self.nonces;
        responses
            .iter_mut()
            .zip(self.msg.iter())
            .for_each(|(response, m)| *response += c * m);

        CommitmentProof {
            commitment: self.commitment,
            announcement: self.announcement,
            blinding_response: self.blinding_nonce + c * self.blinding_factor.as_scalar(),
            responses,
        }
    }
}

impl<G: Group<Scalar = Scalar> + GroupEncoding, const N: usize> ChallengeInput
    for CommitmentProofBuilder<G, N>
{
    fn consume(&self, builder: &mut ChallengeBuilder) {
        builder.consume(&self.commitment);
        builder.consume(&self.announcement);
    }
}
