//! Pointcheval-Sanders signatures on `N`-scalar messages over BLS12-381.
//!
//! Scheme from Pointcheval and Sanders, "Short Randomizable Signatures", CT-RSA 2016
//! (<https://eprint.iacr.org/2015/525>), with the blind-signing variant from section 6.1.
//!
//! A signature is a pair `(h, h^(x + sum y_i m_i))` in G1 and is checked with one pairing
//! equation in G2. Multiplying both halves by the same random scalar yields a fresh signature on
//! the same message, which is how a customer shows a merchant-signed wallet without linking it to
//! the issuing session.
//!
//! Blind issuance: the customer hands over a [`BlindedMessage`] (a Pedersen commitment under the
//! G1 half of the [`PublicKey`]), the merchant answers with a [`BlindedSignature`], and only the
//! customer, holding the [`BlindingFactor`], can [`unblind`](BlindedSignature::unblind) it.

use crate::{
    common::*,
    pedersen::{Commitment, PedersenParameters},
    proofs::{ChallengeBuilder, ChallengeInput},
    serde::SerializeElement,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
struct SecretKey<const N: usize> {
    #[serde(with = "SerializeElement")]
    x: Scalar,
    #[serde(with = "SerializeElement")]
    ys: Box<[Scalar; N]>,
    /// `g^x`, needed for blind signing.
    #[serde(with = "SerializeElement")]
    g_x: G1Affine,
}

/// Verification key. Its G1 half doubles as the commitment parameters for blind issuance.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PublicKey<const N: usize> {
    #[serde(with = "SerializeElement")]
    g: G1Affine,
    /// `g^y_i`
    #[serde(with = "SerializeElement")]
    g_ys: Box<[G1Affine; N]>,
    #[serde(with = "SerializeElement")]
    g_tilde: G2Affine,
    /// `g~^x`
    #[serde(with = "SerializeElement")]
    g_tilde_x: G2Affine,
    /// `g~^y_i`
    #[serde(with = "SerializeElement")]
    g_tilde_ys: Box<[G2Affine; N]>,
}

/// Signing key together with its [`PublicKey`].
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct KeyPair<const N: usize> {
    sk: SecretKey<N>,
    pk: PublicKey<N>,
}

/// `x + sum(y_i * m_i)`
fn exponent<const N: usize>(x: Scalar, ys: &[Scalar; N], msg: &Message<N>) -> Scalar {
    ys.iter().zip(msg.iter()).map(|(y, m)| y * m).fold(x, |acc, term| acc + term)
}

impl<const N: usize> KeyPair<N> {
    /// Sample a key pair. Secret scalars are non-zero and both generators are non-identity.
    pub fn new(rng: &mut impl Rng) -> Self {
        let g: G1Projective = random_non_identity(&mut *rng);
        let g_tilde: G2Projective = random_non_identity(&mut *rng);
        let x = random_non_zero(&mut *rng);
        let mut ys = Box::new([Scalar::zero(); N]);
        ys.iter_mut().for_each(|y| *y = random_non_zero(&mut *rng));

        let mut g_ys = Box::new([G1Affine::identity(); N]);
        let mut g_tilde_ys = Box::new([G2Affine::identity(); N]);
        for (i, y) in ys.iter().enumerate() {
            g_ys[i] = (g * y).into();
            g_tilde_ys[i] = (g_tilde * y).into();
        }

        let pk = PublicKey {
            g: g.into(),
            g_ys,
            g_tilde: g_tilde.into(),
            g_tilde_x: (g_tilde * x).into(),
            g_tilde_ys,
        };
        let sk = SecretKey {
            x,
            ys,
            g_x: (g * x).into(),
        };
        KeyPair { sk, pk }
    }

    /// The verification half of the pair.
    pub fn public_key(&self) -> &PublicKey<N> {
        &self.pk
    }

    /// Sign a message in the clear.
    pub fn sign(&self, rng: &mut impl Rng, msg: &Message<N>) -> Signature {
        let h: G1Projective = random_non_identity(&mut *rng);
        Signature {
            h: h.into(),
            h_exp: (h * exponent(self.sk.x, &self.sk.ys, msg)).into(),
        }
    }

    /// Sign a committed message without learning it.
    ///
    /// Only call this after verifying a proof that the caller knows an opening of `msg` that
    /// satisfies whatever the signer is vouching for.
    pub fn blind_sign(&self, rng: &mut impl Rng, msg: &BlindedMessage) -> BlindedSignature {
        let u = random_non_zero(rng);
        let g_x = G1Projective::from(self.sk.g_x);
        BlindedSignature(Signature {
            h: (self.pk.g * u).into(),
            h_exp: ((g_x + msg.0.to_element()) * u).into(),
        })
    }
}

impl<const N: usize> PublicKey<N> {
    /// Commitment parameters `(g; g^y_1..g^y_N)`. A commitment under them is a
    /// [`BlindedMessage`].
    pub fn to_g1_pedersen_parameters(&self) -> PedersenParameters<G1Projective, N> {
        let mut gs = [G1Projective::identity(); N];
        gs.iter_mut()
            .zip(self.g_ys.iter())
            .for_each(|(g, g_y)| *g = g_y.into());
        PedersenParameters::from_generators(self.g.into(), gs)
    }

    /// Commitment parameters `(g~; g~^y_1..g~^y_N)`, used to prove knowledge of a signature.
    pub(crate) fn to_g2_pedersen_parameters(&self) -> PedersenParameters<G2Projective, N> {
        let mut gs = [G2Projective::identity(); N];
        gs.iter_mut()
            .zip(self.g_tilde_ys.iter())
            .for_each(|(g, g_y)| *g = g_y.into());
        PedersenParameters::from_generators(self.g_tilde.into(), gs)
    }

    /// Check `e(h, g~^x * prod(g~^(y_i m_i))) == e(h_exp, g~)`.
    pub fn verify(&self, msg: &Message<N>, sig: &Signature) -> bool {
        let mut rhs = G2Projective::from(self.g_tilde_x);
        for (g_y, m) in self.g_tilde_ys.iter().zip(msg.iter()) {
            rhs += g_y * m;
        }
        sig.satisfies(&rhs, &self.g_tilde)
    }

    /// Same as [`verify`](Self::verify), but against a G2 commitment `C~` to the message made with
    /// [`to_g2_pedersen_parameters`](Self::to_g2_pedersen_parameters). The signature must have
    /// been blinded with the commitment's blinding factor.
    pub(crate) fn verify_blinded(
        &self,
        message_commitment: Commitment<G2Projective>,
        sig: &BlindedSignature,
    ) -> bool {
        let rhs = G2Projective::from(self.g_tilde_x) + message_commitment.to_element();
        sig.0.satisfies(&rhs, &self.g_tilde)
    }

    /// Commit to `msg` so it can be signed blindly.
    pub fn blind_message(&self, msg: &Message<N>, bf: BlindingFactor) -> BlindedMessage {
        BlindedMessage(msg.commit(&self.to_g1_pedersen_parameters(), bf))
    }

    /// Compressed encoding of every key element, G1 part first.
    pub fn to_bytes(&self) -> Vec<u8> {
        let g1_part = std::iter::once(&self.g).chain(self.g_ys.iter());
        let g2_part = std::iter::once(&self.g_tilde)
            .chain(std::iter::once(&self.g_tilde_x))
            .chain(self.g_tilde_ys.iter());

        let mut bytes = Vec::with_capacity(48 * (N + 1) + 96 * (N + 2));
        g1_part.for_each(|p| bytes.extend_from_slice(&p.to_compressed()));
        g2_part.for_each(|p| bytes.extend_from_slice(&p.to_compressed()));
        bytes
    }
}

impl<const N: usize> ChallengeInput for PublicKey<N> {
    fn consume(&self, builder: &mut ChallengeBuilder) {
        builder.consume_bytes(self.to_bytes());
    }
}

/// A signature `(h, h^(x + sum y_i m_i))`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(with = "SerializeElement")]
    h: G1Affine,
    #[serde(with = "SerializeElement")]
    h_exp: G1Affine,
}

impl Signature {
    /// Re-randomize in place. The result verifies on the same message and is unlinkable to the
    /// previous value.
    pub fn randomize(&mut self, rng: &mut impl Rng) {
        let r = random_non_zero(rng);
        self.h = (self.h * r).into();
        self.h_exp = (self.h_exp * r).into();
    }

    /// A signature with `h` at the identity verifies on every message and must be refused.
    /// Deserialization already guarantees both elements are in G1.
    pub fn is_well_formed(&self) -> bool {
        !bool::from(self.h.is_identity())
    }

    fn satisfies(&self, rhs: &G2Projective, g_tilde: &G2Affine) -> bool {
        self.is_well_formed() && pairing(&self.h, &rhs.into()) == pairing(&self.h_exp, g_tilde)
    }

    /// Hide the signature behind `h^bf` so it can appear in a proof of knowledge.
    pub(crate) fn blind(self, bf: BlindingFactor) -> BlindedSignature {
        let h_exp = G1Projective::from(self.h_exp) + self.h * bf.as_scalar();
        BlindedSignature(Signature {
            h: self.h,
            h_exp: h_exp.into(),
        })
    }
}

impl ChallengeInput for Signature {
    fn consume(&self, builder: &mut ChallengeBuilder) {
        builder.consume(&self.h);
        builder.consume(&self.h_exp);
    }
}

/// A message hidden in a G1 commitment under a [`PublicKey`]; see
/// [`PublicKey::blind_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindedMessage(pub Commitment<G1Projective>);

impl ChallengeInput for BlindedMessage {
    fn consume(&self, builder: &mut ChallengeBuilder) {
        builder.consume(&self.0);
    }
}

/// A signature whose second element is offset by `h^bf`. It has the layout of a [`Signature`]
/// but only verifies after [`unblind`](Self::unblind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindedSignature(Signature);

impl BlindedSignature {
    /// Remove the blinding. A wrong `bf` still produces a value, just not one that verifies.
    pub fn unblind(self, bf: BlindingFactor) -> Signature {
        let Signature { h, h_exp } = self.0;
        Signature {
            h,
            h_exp: (G1Projective::from(h_exp) - h * bf.as_scalar()).into(),
        }
    }

    /// Re-randomize in place; blinding and randomization commute.
    pub fn randomize(&mut self, rng: &mut impl Rng) {
        self.0.randomize(rng);
    }

    /// See [`Signature::is_well_formed`].
    pub fn is_well_formed(&self) -> bool {
        self.0.is_well_formed()
    }
}

impl ChallengeInput for BlindedSignature {
    fn consume(&self, builder: &mut ChallengeBuilder) {
        builder.consume(&self.0);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::rng;
    use rand::rngs::StdRng;

    fn signed() -> (StdRng, KeyPair<3>, Message<3>, Signature) {
        let mut rng = rng();
        let kp = KeyPair::new(&mut rng);
        let msg = Message::random(&mut rng);
        let sig = kp.sign(&mut rng, &msg);
        (rng, kp, msg, sig)
    }

    #[test]
    fn signature_verifies_on_its_message_only() {
        let (mut rng, kp, msg, sig) = signed();
        assert!(kp.public_key().verify(&msg, &sig));
        assert!(!kp.public_key().verify(&Message::random(&mut rng), &sig));
    }

    #[test]
    fn signature_is_bound_to_the_key() {
        let (mut rng, kp, msg, _) = signed();
        let other = KeyPair::new(&mut rng);
        assert!(!kp.public_key().verify(&msg, &other.sign(&mut rng, &msg)));
    }

    #[test]
    fn identity_h_is_refused() {
        let (mut rng, kp, msg, _) = signed();
        let degenerate = Signature {
            h: G1Affine::identity(),
            h_exp: G1Projective::random(&mut rng).into(),
        };
        assert!(!degenerate.is_well_formed());
        assert!(!kp.public_key().verify(&msg, &degenerate));
    }

    #[test]
    fn randomized_signature_still_verifies() {
        let (mut rng, kp, msg, sig) = signed();
        let mut fresh = sig;
        fresh.randomize(&mut rng);
        assert_ne!(fresh, sig);
        assert!(kp.public_key().verify(&msg, &fresh));
    }

    #[test]
    fn blind_issuance_unblinds_to_a_valid_signature() {
        let (mut rng, kp, msg, _) = signed();
        let bf = BlindingFactor::new(&mut rng);
        let request = kp.public_key().blind_message(&msg, bf);
        let issued = kp.blind_sign(&mut rng, &request);

        assert!(kp.public_key().verify(&msg, &issued.unblind(bf)));
        let wrong = BlindingFactor::new(&mut rng);
        assert!(!kp.public_key().verify(&msg, &issued.unblind(wrong)));
    }

    #[test]
    fn blinding_commutes_with_randomization() {
        let (mut rng, kp, msg, sig) = signed();
        let bf = BlindingFactor::new(&mut rng);
        let mut hidden = sig.blind(bf);
        hidden.randomize(&mut rng);
        assert!(kp.public_key().verify(&msg, &hidden.unblind(bf)));
    }

    #[test]
    fn blinded_signature_checks_against_g2_commitment() {
        let (mut rng, kp, msg, sig) = signed();
        let bf = BlindingFactor::new(&mut rng);
        let com = msg.commit(&kp.public_key().to_g2_pedersen_parameters(), bf);

        assert!(kp.public_key().verify_blinded(com, &sig.blind(bf)));
        let mismatched = sig.blind(BlindingFactor::new(&mut rng));
        assert!(!kp.public_key().verify_blinded(com, &mismatched));
    }

    #[test]
    fn keypair_survives_bincode() {
        let (_, kp, _, _) = signed();
        let bytes = bincode::serialize(&kp).unwrap();
        let decoded: KeyPair<3> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(kp, decoded);
    }
}
