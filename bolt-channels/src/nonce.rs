//! Cryptographically random nonces.
use crate::{types::*, Rng};
use ff::Field;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A random nonce that identifies one version of a customer wallet.
///
/// The merchant sees the nonce of the wallet being spent in each payment and refuses to accept
/// any nonce twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce(#[serde(with = "SerializeElement")] Scalar);

#[cfg(feature = "sqlite")]
bolt_crypto::impl_sqlx_for_bincode_ty!(Nonce);

impl Nonce {
    /// Generate a new cryptographically random nonce with the given random number generator.
    pub(crate) fn new(rng: &mut impl Rng) -> Self {
        Self(Scalar::random(rng))
    }

    /// Convert a nonce to its canonical `Scalar` representation.
    pub(crate) fn to_scalar(self) -> Scalar {
        self.0
    }

    /// Encode the nonce as bytes in little-endian order.
    pub fn as_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

impl Hash for Nonce {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}
