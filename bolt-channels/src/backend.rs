/*!
Handle through which the channel protocol reaches its cryptographic primitives.

A [`CryptoBackend`] owns the randomness used by a party and performs the operations the
protocol only sequences: blind signing, and verification of the zero-knowledge proofs sent by
the customer. Create one backend per process and pass it to the functions in
[`bidirectional`](crate::bidirectional); dropping it releases everything it holds.
*/
use crate::{
    merchant, EstablishProof, EstablishProofPublicValues, PayProof, PayProofPublicValues, Rng,
    Verification,
};
use bolt_crypto::pointcheval_sanders::{BlindedMessage, BlindedSignature, KeyPair};
use rand::{rngs::StdRng, SeedableRng};

/// Cryptographic operations consumed by the channel protocol.
///
/// Only [`CryptoBackend::rng`] is required; the remaining operations default to the
/// BLS12-381 implementations in `bolt_crypto`.
pub trait CryptoBackend {
    /// Source of randomness for commitments, proofs and signatures.
    type Rng: Rng;

    /// Borrow the random number generator.
    fn rng(&mut self) -> &mut Self::Rng;

    /// Blindly sign a committed wallet message.
    fn blind_sign(&mut self, keypair: &KeyPair<5>, msg: &BlindedMessage) -> BlindedSignature {
        keypair.blind_sign(self.rng(), msg)
    }

    /// Verify the proof that an initial wallet commitment is well formed.
    fn verify_establish_proof(
        &self,
        config: &merchant::Config,
        proof: &EstablishProof,
        public_values: &EstablishProofPublicValues,
    ) -> Verification {
        proof.verify(config, public_values)
    }

    /// Verify the proof that a new wallet is a correct update of a signed one.
    fn verify_pay_proof(
        &self,
        config: &merchant::Config,
        proof: &PayProof,
        public_values: &PayProofPublicValues,
    ) -> Verification {
        proof.verify(config, public_values)
    }
}

/// The BLS12-381 backend.
#[derive(Debug)]
pub struct Bls12Backend<R: Rng = StdRng> {
    rng: R,
}

impl Bls12Backend {
    /// Create a backend seeded from operating system entropy.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a deterministic backend. Only suitable for tests.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            rng: StdRng::from_seed(seed),
        }
    }
}

impl Default for Bls12Backend {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> Bls12Backend<R> {
    /// Create a backend around an existing random number generator.
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> CryptoBackend for Bls12Backend<R> {
    type Rng = R;

    fn rng(&mut self) -> &mut R {
        &mut self.rng
    }
}
