//! Proof that a committed value lies in `[0, 2^63)`.
//!
//! A [`RangeConstraint`] proves nothing by itself. It is bound to one message position of a
//! [`CommitmentProof`](crate::proofs::CommitmentProof) or [`SignatureProof`] through a shared
//! commitment scalar, and only then shows that the value at that position is in range. Channel
//! balances are constrained this way so that neither side can go negative after a payment.
//!
//! The construction follows Camenisch, Chaabouni and shelat, "Efficient protocols for set
//! membership and range proofs" (ASIACRYPT 2008), with Pointcheval-Sanders signatures on the
//! digits. The verifier publishes a signature on every base-128 digit under a key that signs
//! nothing else. The prover splits the value into 9 digits (128^9 = 2^63) and proves knowledge of
//! a signature on each one. Each digit proof's commitment scalar `s_j` is folded into
//! `sum(128^j * s_j)`, which becomes the commitment scalar for the value in the outer proof, so
//! the same weighted sum of digit responses must equal the value's response.
//!
//! Prover steps, for position `j` of an outer proof:
//! 1. [`RangeConstraintBuilder::generate_constraint_commitments`] on the value.
//! 2. Pass [`RangeConstraintBuilder::commitment_scalar`] as `Some(..)` at position `j` when
//!    building the outer proof.
//! 3. Derive one challenge over both builders and answer it with both.
//!
//! The verifier checks the outer proof and hands its `j`th response scalar to
//! [`RangeConstraint::verify_range_constraint`].

use crate::{
    common::*,
    pointcheval_sanders::{KeyPair, PublicKey, Signature},
    proofs::{Challenge, ChallengeBuilder, ChallengeInput, SignatureProof, SignatureProofBuilder},
    Error,
};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

const DIGIT_BASE: u64 = 128;
const DIGIT_COUNT: usize = 9;

/// Smallest value that cannot be constrained, `128^9`.
pub const RANGE_UPPER_BOUND: u64 = 1 << 63;

/// `sum(128^j * scalars[j])`
fn recombine(scalars: impl Iterator<Item = Scalar>) -> Scalar {
    let base = Scalar::from(DIGIT_BASE);
    let mut weight = Scalar::one();
    let mut sum = Scalar::zero();
    for scalar in scalars {
        sum += weight * scalar;
        weight *= base;
    }
    sum
}

/// Digit signatures and the key that made them, published by the verifier.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRangeConstraintParameters")]
pub struct RangeConstraintParameters {
    /// Entry `d` signs the digit `d`.
    digit_signatures: Vec<Signature>,
    public_key: PublicKey<1>,
}

#[derive(Deserialize)]
struct RawRangeConstraintParameters {
    digit_signatures: Vec<Signature>,
    public_key: PublicKey<1>,
}

impl TryFrom<RawRangeConstraintParameters> for RangeConstraintParameters {
    type Error = String;

    fn try_from(raw: RawRangeConstraintParameters) -> Result<Self, Self::Error> {
        match raw.digit_signatures.len() as u64 {
            DIGIT_BASE => Ok(Self {
                digit_signatures: raw.digit_signatures,
                public_key: raw.public_key,
            }),
            found => Err(format!(
                "range parameters need {} digit signatures, found {}",
                DIGIT_BASE, found
            )),
        }
    }
}

impl RangeConstraintParameters {
    /// Sign every digit with a throwaway key. The secret key is dropped before returning.
    pub fn new(rng: &mut impl Rng) -> Self {
        let signer = KeyPair::<1>::new(rng);
        Self {
            digit_signatures: (0..DIGIT_BASE)
                .map(|digit| signer.sign(&mut *rng, &Scalar::from(digit).into()))
                .collect(),
            public_key: signer.public_key().clone(),
        }
    }

    /// Key under which the digit signatures verify.
    pub fn public_key(&self) -> &PublicKey<1> {
        &self.public_key
    }
}

/// Prover state for a [`RangeConstraint`] before the challenge is known.
#[derive(Debug)]
pub struct RangeConstraintBuilder {
    digits: Vec<SignatureProofBuilder<1>>,
    commitment_scalar: Scalar,
}

/// Digit proofs for one value. Verify it together with the proof it is attached to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeConstraint {
    digits: Vec<SignatureProof<1>>,
}

impl RangeConstraintBuilder {
    /// Decompose `value` into digits and start a signature proof for each.
    ///
    /// Fails with [`Error::OutsideRange`] if `value >= 2^63`.
    pub fn generate_constraint_commitments(
        value: u64,
        params: &RangeConstraintParameters,
        rng: &mut impl Rng,
    ) -> Result<Self, Error> {
        if value >= RANGE_UPPER_BOUND {
            return Err(Error::OutsideRange(value));
        }

        let digits: Vec<_> = (0..DIGIT_COUNT as u32)
            .map(|j| (value / DIGIT_BASE.pow(j)) % DIGIT_BASE)
            .map(|digit| {
                SignatureProofBuilder::generate_proof_commitments(
                    &mut *rng,
                    Scalar::from(digit).into(),
                    params.digit_signatures[digit as usize],
                    &[None],
                    &params.public_key,
                )
            })
            .collect();
        let commitment_scalar =
            recombine(digits.iter().map(|d| d.conjunction_commitment_scalars()[0]));

        Ok(Self {
            digits,
            commitment_scalar,
        })
    }

    /// Answer `challenge` for every digit.
    pub fn generate_constraint_response(self, challenge: Challenge) -> RangeConstraint {
        RangeConstraint {
            digits: self
                .digits
                .into_iter()
                .map(|digit| digit.generate_proof_response(challenge))
                .collect(),
        }
    }

    /// Commitment scalar to use for the value in the outer proof.
    pub fn commitment_scalar(&self) -> Scalar {
        self.commitment_scalar
    }
}

impl ChallengeInput for RangeConstraintBuilder {
    fn consume(&self, builder: &mut ChallengeBuilder) {
        self.digits.iter().for_each(|digit| builder.consume(digit));
    }
}

impl RangeConstraint {
    /// Check every digit proof, then check that the digits recombine to
    /// `expected_response_scalar`, the outer proof's response for the constrained value.
    pub fn verify_range_constraint(
        &self,
        params: &RangeConstraintParameters,
        challenge: Challenge,
        expected_response_scalar: Scalar,
    ) -> bool {
        self.digits.len() == DIGIT_COUNT
            && self
                .digits
                .iter()
                .all(|digit| digit.verify_knowledge_of_signature(&params.public_key, challenge))
            && recombine(self.digits.iter().map(|d| d.conjunction_response_scalars()[0]))
                == expected_response_scalar
    }
}

impl ChallengeInput for RangeConstraint {
    fn consume(&self, builder: &mut ChallengeBuilder) {
        self.digits.iter().for_each(|digit| builder.consume(digit));
    }
}
