//! Fiat-Shamir challenges.
//!
//! Every proof in this crate is a Schnorr protocol made non-interactive by hashing the public
//! statement and the prover's announcements. A conjunction of proofs shares one challenge: feed all
//! of their builders into the same [`ChallengeBuilder`], together with any context bytes (channel
//! id, merchant key) the proof should be bound to.

use crate::common::*;
use sha3::{Digest, Sha3_512};

/// Public data that can be absorbed into a challenge.
pub trait ChallengeInput {
    /// Feed this value into `builder`.
    fn consume(&self, builder: &mut ChallengeBuilder);
}

impl<T: ChallengeInput> ChallengeInput for &T {
    fn consume(&self, builder: &mut ChallengeBuilder) {
        T::consume(*self, builder)
    }
}

impl ChallengeInput for Scalar {
    fn consume(&self, builder: &mut ChallengeBuilder) {
        builder.consume_bytes(self.to_bytes());
    }
}

// Points are absorbed in compressed affine form, so both representations hash alike.
macro_rules! absorb_point {
    ($affine:ty, $projective:ty) => {
        impl ChallengeInput for $affine {
            fn consume(&self, builder: &mut ChallengeBuilder) {
                builder.consume_bytes(self.to_compressed());
            }
        }

        impl ChallengeInput for $projective {
            fn consume(&self, builder: &mut ChallengeBuilder) {
                <$affine>::from(self).consume(builder);
            }
        }
    };
}

absorb_point!(G1Affine, G1Projective);
absorb_point!(G2Affine, G2Projective);

/// The verifier's challenge, derived from a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Challenge(Scalar);

impl Challenge {
    /// The challenge as a field element.
    pub fn to_scalar(self) -> Scalar {
        self.0
    }
}

/// Running SHA3-512 transcript for a [`Challenge`].
#[derive(Debug, Clone)]
#[allow(missing_copy_implementations)]
pub struct ChallengeBuilder {
    hasher: Sha3_512,
}

impl Default for ChallengeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengeBuilder {
    /// Start an empty transcript.
    pub fn new() -> Self {
        Self {
            hasher: Sha3_512::new(),
        }
    }

    /// Absorb `object`.
    pub fn consume<T: ChallengeInput>(&mut self, object: &T) {
        object.consume(self);
    }

    /// Builder-style [`consume`](Self::consume).
    pub fn with<T: ChallengeInput>(mut self, object: &T) -> Self {
        object.consume(&mut self);
        self
    }

    /// Absorb raw context bytes.
    pub fn consume_bytes(&mut self, bytes: impl AsRef<[u8]>) {
        self.hasher.update(bytes);
    }

    /// Builder-style [`consume_bytes`](Self::consume_bytes).
    pub fn with_bytes(mut self, bytes: impl AsRef<[u8]>) -> Self {
        self.consume_bytes(bytes);
        self
    }

    /// Close the transcript. The 64-byte digest is reduced mod the scalar field order, which
    /// keeps the bias negligible.
    pub fn finish(self) -> Challenge {
        let mut wide = [0u8; 64];
        wide.copy_from_slice(self.hasher.finalize().as_slice());
        Challenge(Scalar::from_bytes_wide(&wide))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::rng;
    use ff::Field;

    #[test]
    fn challenge_is_deterministic() {
        let mut rng = rng();
        let scalar = Scalar::random(&mut rng);
        let point = G1Projective::random(&mut rng);

        let first = ChallengeBuilder::new().with(&scalar).with(&point).finish();
        let second = ChallengeBuilder::new().with(&scalar).with(&point).finish();
        assert_eq!(first, second);
    }

    #[test]
    fn challenge_depends_on_order_and_content() {
        let mut rng = rng();
        let a = Scalar::random(&mut rng);
        let b = Scalar::random(&mut rng);

        let ab = ChallengeBuilder::new().with(&a).with(&b).finish();
        let ba = ChallengeBuilder::new().with(&b).with(&a).finish();
        let a_tagged = ChallengeBuilder::new()
            .with(&a)
            .with(&b)
            .with_bytes(b"context")
            .finish();

        assert_ne!(ab, ba);
        assert_ne!(ab, a_tagged);
    }

    #[test]
    fn affine_and_projective_agree() {
        let mut rng = rng();
        let point = G2Projective::random(&mut rng);
        let affine = G2Affine::from(point);

        assert_eq!(
            ChallengeBuilder::new().with(&point).finish(),
            ChallengeBuilder::new().with(&affine).finish()
        );
    }
}
