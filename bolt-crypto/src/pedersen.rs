//! Pedersen commitments in either pairing group of BLS12-381.
//!
//! A commitment to an `N`-element [`Message`] under parameters `(h; g_1..g_N)` and blinding
//! factor `r` is the group element `h^r * g_1^m_1 * ... * g_N^m_N`. It hides the message
//! perfectly and binds the committer under the discrete logarithm assumption, as long as nobody
//! knows a relation between the generators.
//!
//! The channel layer commits to wallet states in G1 (see
//! [`PublicKey::to_g1_pedersen_parameters`](crate::pointcheval_sanders::PublicKey::to_g1_pedersen_parameters))
//! and to revocation locks with freshly sampled parameters.
//!
//! ```
//! # use bolt_crypto::{BlindingFactor, Message, pedersen::PedersenParameters};
//! # use bls12_381::G1Projective;
//! # let mut rng = rand::thread_rng();
//! let params = PedersenParameters::<G1Projective, 2>::new(&mut rng);
//! let state = Message::<2>::random(&mut rng);
//! let r = BlindingFactor::new(&mut rng);
//! let com = state.commit(&params, r);
//! assert!(com.verify_opening(&params, r, &state));
//! ```
//!
//! Torben Pryds Pedersen, "Non-interactive and information-theoretic secure verifiable secret
//! sharing", CRYPTO 1991.

use crate::{
    common::*,
    proofs::{ChallengeBuilder, ChallengeInput},
    serde::SerializeElement,
};
use serde::{Deserialize, Serialize};

/// A commitment to a [`Message`], as produced by [`Message::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "G: SerializeElement")]
pub struct Commitment<G>(#[serde(with = "SerializeElement")] pub(crate) G)
where
    G: Group<Scalar = Scalar>;

impl<G: Group<Scalar = Scalar>> Commitment<G> {
    /// Check that `msg` and `bf` open this commitment under `params`.
    pub fn verify_opening<const N: usize>(
        &self,
        params: &PedersenParameters<G, N>,
        bf: BlindingFactor,
        msg: &Message<N>,
    ) -> bool {
        *self == msg.commit(params, bf)
    }

    /// The group element this commitment wraps.
    pub fn to_element(self) -> G {
        self.0
    }
}

impl<G: Group<Scalar = Scalar> + GroupEncoding> ChallengeInput for Commitment<G> {
    fn consume(&self, builder: &mut ChallengeBuilder) {
        builder.consume_bytes(self.0.to_bytes());
    }
}

impl<const N: usize> Message<N> {
    /// Commit to this message with blinding factor `bf`.
    pub fn commit<G: Group<Scalar = Scalar>>(
        &self,
        params: &PedersenParameters<G, N>,
        bf: BlindingFactor,
    ) -> Commitment<G> {
        let mut element = params.blinding_generator * bf.as_scalar();
        for (generator, scalar) in params.message_generators.iter().zip(self.iter()) {
            element += *generator * scalar;
        }
        Commitment(element)
    }
}

/// Generators for committing to `N`-element messages in group `G`.
///
/// The message generators live on the heap; parameter sets are passed around by reference and
/// copied into proofs.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(bound = "G: SerializeElement")]
pub struct PedersenParameters<G, const N: usize>
where
    G: Group<Scalar = Scalar>,
{
    #[serde(with = "SerializeElement")]
    blinding_generator: G,
    #[serde(with = "SerializeElement")]
    message_generators: Box<[G; N]>,
}

impl<G: Group<Scalar = Scalar>, const N: usize> PedersenParameters<G, N> {
    /// Sample independent non-identity generators.
    pub fn new(rng: &mut impl Rng) -> Self {
        let blinding_generator = random_non_identity(&mut *rng);
        let mut message_generators = Box::new([G::identity(); N]);
        message_generators
            .iter_mut()
            .for_each(|g| *g = random_non_identity(&mut *rng));
        Self {
            blinding_generator,
            message_generators,
        }
    }

    /// Assemble parameters from generators chosen elsewhere, such as a signing public key.
    ///
    /// The caller is responsible for the generators being independent.
    pub fn from_generators(blinding_generator: G, message_generators: [G; N]) -> Self {
        Self {
            blinding_generator,
            message_generators: Box::new(message_generators),
        }
    }

    /// Generator paired with the blinding factor.
    pub fn blinding_generator(&self) -> &G {
        &self.blinding_generator
    }

    /// Generators paired with each message scalar, in message order.
    pub fn message_generators(&self) -> &[G; N] {
        &self.message_generators
    }
}

impl<G: Group<Scalar = Scalar> + GroupEncoding, const N: usize> ChallengeInput
    for PedersenParameters<G, N>
{
    fn consume(&self, builder: &mut ChallengeBuilder) {
        std::iter::once(&self.blinding_generator)
            .chain(self.message_generators.iter())
            .for_each(|g| builder.consume_bytes(g.to_bytes()));
    }
}
