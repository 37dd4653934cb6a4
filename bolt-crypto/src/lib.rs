//! Cryptographic primitives for bidirectional anonymous payment channels, instantiated over the
//! pairing-friendly curve BLS12-381:
//! - Pedersen commitments over G1 and G2.
//! - Pointcheval-Sanders signatures and blind signatures (CT-RSA 2016).
//! - Schnorr-style zero-knowledge proofs of knowledge of commitment openings and signatures, which
//!   can be combined into conjunctions, linear relations, and range constraints.
//!
//! Every randomized operation takes an explicit [`Rng`]; nothing in this crate holds global state.

#![warn(missing_docs)]
#![warn(missing_copy_implementations, missing_debug_implementations)]
#![warn(unused_qualifications, unused_results)]
#![warn(future_incompatible)]
#![warn(unused)]
#![forbid(broken_intra_doc_links)]

pub mod pedersen;
pub mod pointcheval_sanders;
pub mod proofs;

mod serde;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use crate::serde::SerializeElement;
pub use common::Rng;

use crate::common::*;
use ::serde::{Deserialize, Serialize};
use ff::Field;
use std::ops::Deref;
use thiserror::Error;

/// Failures reported by this crate. Verification results are plain `bool`s; only inputs that
/// cannot be proven at all are errors.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The value is not below [`proofs::RANGE_UPPER_BOUND`].
    #[error("cannot build a range constraint on {0}: value must lie in [0, 2^63)")]
    OutsideRange(u64),
}

/// A tuple of `N` scalars: what gets committed to, signed, and proven about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message<const N: usize>(#[serde(with = "SerializeElement")] [Scalar; N]);

impl<const N: usize> Deref for Message<N> {
    type Target = [Scalar; N];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const N: usize> Message<N> {
    /// Wrap `scalars` in message order.
    pub fn new(scalars: [Scalar; N]) -> Self {
        Message(scalars)
    }

    /// Uniformly random message.
    pub fn random(rng: &mut impl Rng) -> Self {
        let mut msg = Message([Scalar::zero(); N]);
        msg.0.iter_mut().for_each(|m| *m = Scalar::random(&mut *rng));
        msg
    }
}

impl From<Scalar> for Message<1> {
    fn from(scalar: Scalar) -> Self {
        Self([scalar])
    }
}

/// Randomness that hides a commitment or a signature. Whoever holds it can open or unblind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindingFactor(#[serde(with = "SerializeElement")] Scalar);

impl BlindingFactor {
    /// Fresh uniformly random blinding factor.
    pub fn new(rng: &mut impl Rng) -> Self {
        Self(Scalar::random(rng))
    }

    /// Rebuild a blinding factor from its scalar, e.g. one stored in a wallet. Never use a
    /// predictable scalar here.
    pub fn from_scalar(scalar: Scalar) -> Self {
        Self(scalar)
    }

    /// The underlying scalar.
    pub fn as_scalar(&self) -> Scalar {
        self.0
    }
}

mod common {
    //! Curve types and sampling helpers shared by every module.

    pub use crate::{BlindingFactor, Message};
    pub use bls12_381::{pairing, G1Affine, G1Projective, G2Affine, G2Projective, Scalar};
    pub use group::{Group, GroupEncoding};

    /// Any cryptographically secure generator; implemented for every `CryptoRng + RngCore`.
    pub trait Rng: rand::CryptoRng + rand::RngCore {}
    impl<T: rand::CryptoRng + rand::RngCore> Rng for T {}

    /// Uniform element of `G` other than the identity.
    pub fn random_non_identity<G>(rng: &mut impl Rng) -> G
    where
        G: Group<Scalar = Scalar>,
    {
        std::iter::repeat_with(|| G::random(&mut *rng))
            .find(|g| !bool::from(g.is_identity()))
            .unwrap_or_else(G::generator)
    }

    /// Uniform non-zero scalar.
    pub fn random_non_zero(rng: &mut impl Rng) -> Scalar {
        std::iter::repeat_with(|| <Scalar as ff::Field>::random(&mut *rng))
            .find(|r| *r != Scalar::zero())
            .unwrap_or_else(Scalar::one)
    }
}
