/*!
Bidirectional anonymous payment channels between a customer and a merchant.

A channel is set up with public parameters, initialized by both parties, and established when
the merchant blindly signs a commitment to the customer's initial wallet. After that, the
customer pays by proving in zero knowledge that a new wallet is a correct update of one the
merchant has signed, receiving a close token on the new wallet, and revoking the old wallet by
revealing its revocation secret. Only then does the merchant release the pay token that makes the
new wallet spendable. Either party can close at any time: the customer presents the latest closing
signature, and the merchant can dispute a close on a revoked wallet with the matching revocation
secret.

The party-facing operations live in [`bidirectional`]. The merchant and customer state machines
live in [`merchant`] and [`customer`]. Cryptographic work is routed through a
[`CryptoBackend`] handle, so there is no global state: creating a backend sets up randomness and
dropping it tears everything down.

 # References

 1: Green and Miers. "Bolt: Anonymous Payment Channels for Decentralized Currencies".
 URL: <https://eprint.iacr.org/2016/701>
 */
#![warn(missing_docs)]
#![warn(missing_copy_implementations, missing_debug_implementations)]
#![warn(unused_qualifications, unused_results)]
#![warn(future_incompatible)]
#![warn(unused)]
#![forbid(broken_intra_doc_links)]

pub mod backend;
pub mod bidirectional;
pub mod channel;
pub mod close;
pub mod customer;
pub mod merchant;
pub mod record;
pub mod revlock;
pub mod session;
pub mod wire;

mod error;
mod nonce;
mod proofs;
mod states;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use backend::{Bls12Backend, CryptoBackend};
pub use error::Error;
pub use nonce::Nonce;
pub use proofs::{
    EstablishProof, EstablishProofPublicValues, PayProof, PayProofPublicValues, PaymentProof,
    RevokeToken, WalletCommitment,
};
/// Rename cryptographically correct `BlindedPayToken` to the semantic `PayToken`.
pub use states::BlindedPayToken as PayToken;
/// Rename cryptographically correct `CloseStateBlindedSignature` to the semantic `CloseToken`.
pub use states::CloseStateBlindedSignature as CloseToken;
pub use states::{
    ChannelId, CloseStateCommitment, CustomerBalance, MerchantBalance, PaymentAmount,
    StateCommitment,
};

#[allow(unused)]
mod types {
    pub use bls12_381::{G1Projective, Scalar};
    pub use bolt_crypto::*;
}

/// Trait synonym for a cryptographically secure random number generator.
pub trait Rng: rand::CryptoRng + rand::RngCore {}
impl<T: rand::CryptoRng + rand::RngCore> Rng for T {}

/// The result of a verification of some property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "the result of a verification should always be checked"]
pub enum Verification {
    /// A verification succeeded.
    Verified,
    /// A verification failed.
    Failed,
}

impl From<bool> for Verification {
    fn from(b: bool) -> Self {
        if b {
            Verification::Verified
        } else {
            Verification::Failed
        }
    }
}

impl Verification {
    /// Whether the verification succeeded.
    pub fn is_verified(self) -> bool {
        matches!(self, Verification::Verified)
    }
}
