//! Hash locks that retire old wallet versions.
//!
//! Each wallet carries a [`RevocationLock`], the SHA3-256 image of a [`RevocationSecret`] held by
//! the customer. Paying reveals the secret of the wallet being replaced; the merchant records it,
//! and a close that later names that lock can be disputed with the stored secret. Finding a
//! secret for somebody else's lock means inverting the hash.
//!
//! Locks are scalars, so the digest has to be a canonical field encoding. A secret therefore
//! carries a one-byte index appended before hashing; generation picks the first index that
//! yields a canonical digest.
use crate::{types::*, Rng, Verification};
use bolt_crypto::{
    pedersen::{Commitment, PedersenParameters},
    BlindingFactor, Message, SerializeElement,
};

use {
    ff::Field,
    serde::{Deserialize, Serialize},
    sha3::{Digest, Sha3_256},
    std::{
        convert::TryFrom,
        hash::{Hash, Hasher},
    },
};

/// Public half of a revocation pair, placed in the wallet state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevocationLock(#[serde(with = "SerializeElement")] Scalar);

/// Private half of a revocation pair. Revealed only when its wallet is replaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawRevocationSecret")]
#[allow(missing_copy_implementations)]
pub struct RevocationSecret {
    #[serde(with = "SerializeElement")]
    secret: Scalar,
    index: u8,
    /// Cached hash of `secret || index`.
    #[serde(skip_serializing)]
    lock: RevocationLock,
}

#[derive(Debug, Deserialize)]
struct RawRevocationSecret {
    #[serde(with = "SerializeElement")]
    secret: Scalar,
    index: u8,
}

fn preimage(secret: &Scalar, index: u8) -> [u8; 33] {
    let mut bytes = [0; 33];
    bytes[..32].copy_from_slice(&secret.to_bytes());
    bytes[32] = index;
    bytes
}

/// `None` if the digest of `secret || index` is not a canonical scalar.
fn derive_lock(secret: &Scalar, index: u8) -> Option<RevocationLock> {
    let mut digest = [0; 32];
    digest.copy_from_slice(Sha3_256::digest(&preimage(secret, index)).as_slice());
    RevocationLock::from_bytes(&digest)
}

impl TryFrom<RawRevocationSecret> for RevocationSecret {
    type Error = String;

    fn try_from(raw: RawRevocationSecret) -> Result<Self, Self::Error> {
        let lock = derive_lock(&raw.secret, raw.index)
            .ok_or_else(|| format!("revocation secret index {} gives no valid lock", raw.index))?;
        Ok(Self {
            secret: raw.secret,
            index: raw.index,
            lock,
        })
    }
}

#[cfg(feature = "sqlite")]
bolt_crypto::impl_sqlx_for_bincode_ty!(RevocationLock);
#[cfg(feature = "sqlite")]
bolt_crypto::impl_sqlx_for_bincode_ty!(RevocationSecret);

/// Hiding commitment to the [`RevocationLock`] of the wallet being replaced, sent with a payment
/// proof. The merchant opens it once the secret is revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationLockCommitment(pub(crate) Commitment<G1Projective>);

/// Opening randomness for a [`RevocationLockCommitment`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RevocationLockBlindingFactor(pub(crate) BlindingFactor);

impl RevocationSecret {
    /// Sample a secret and find an index that gives it a lock.
    pub(crate) fn new(rng: &mut impl Rng) -> Self {
        loop {
            let secret = Scalar::random(&mut *rng);
            // Roughly half of all digests are canonical; running out of indices is negligible.
            let found = (0..=u8::MAX).find_map(|index| {
                derive_lock(&secret, index).map(|lock| Self {
                    secret,
                    index,
                    lock,
                })
            });
            if let Some(pair) = found {
                return pair;
            }
        }
    }

    /// The lock this secret opens.
    pub fn revocation_lock(&self) -> RevocationLock {
        self.lock
    }

    /// `secret || index`, the exact bytes hashed into the lock.
    pub fn as_bytes(&self) -> [u8; 33] {
        preimage(&self.secret, self.index)
    }
}

impl PartialEq for RevocationSecret {
    fn eq(&self, other: &Self) -> bool {
        self.secret == other.secret && self.index == other.index
    }
}

impl Eq for RevocationSecret {}

impl RevocationLock {
    /// Whether `rs` opens this lock.
    pub fn verify(&self, rs: &RevocationSecret) -> Verification {
        Verification::from(*self == rs.revocation_lock())
    }

    /// One-scalar message for committing to the lock.
    pub(crate) fn to_message(self) -> Message<1> {
        Message::from(self.to_scalar())
    }

    pub(crate) fn to_scalar(self) -> Scalar {
        self.0
    }

    /// Little-endian scalar encoding.
    pub fn as_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Inverse of [`as_bytes`](Self::as_bytes); `None` for non-canonical input.
    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        Scalar::from_bytes(bytes).map(Self).into()
    }
}

impl Hash for RevocationLock {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl RevocationLockCommitment {
    /// Accept only if `revocation_lock` opens this commitment with the given blinding factor and
    /// `revocation_secret` is its preimage.
    pub(crate) fn verify_revocation_pair(
        &self,
        parameters: &PedersenParameters<G1Projective, 1>,
        revocation_secret: &RevocationSecret,
        revocation_lock: &RevocationLock,
        revocation_lock_blinding_factor: &RevocationLockBlindingFactor,
    ) -> Verification {
        let opens = self.0.verify_opening(
            parameters,
            revocation_lock_blinding_factor.0,
            &revocation_lock.to_message(),
        );
        Verification::from(opens && revocation_lock.verify(revocation_secret).is_verified())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::rng;
    use std::convert::TryInto;

    #[test]
    fn revlock_is_correct() {
        let rs = RevocationSecret::new(&mut rng());
        let rl = rs.revocation_lock();
        assert!(rl.verify(&rs).is_verified());
    }

    #[test]
    fn revlock_rejects_other_secret() {
        let mut rng = rng();
        let rs = RevocationSecret::new(&mut rng);
        let other = RevocationSecret::new(&mut rng);
        assert_eq!(rs.revocation_lock().verify(&other), Verification::Failed);
    }

    #[test]
    fn revlock_bytes_work() {
        let rs = RevocationSecret::new(&mut rng());
        let rl = rs.revocation_lock();

        let maybe_rl = RevocationLock::from_bytes(&rl.as_bytes());
        assert_eq!(maybe_rl, Some(rl))
    }

    #[test]
    fn revlock_generations_match() {
        let mut rng = rng();
        for _ in 1..1000 {
            let secret = RevocationSecret::new(&mut rng);
            let digested = Sha3_256::digest(&secret.as_bytes());
            let lock = Scalar::from_bytes(&digested[..].try_into().unwrap()).unwrap();

            assert_eq!(lock, secret.revocation_lock().0);
        }
    }

    #[test]
    fn checked_deserialization_works() {
        let scalar_str = "4dd70a569aa77c525dfc72b2dddd640ae1bee82b1430e63588ed71c183038d23";
        let secret =
            Scalar::from_bytes(&hex::decode(scalar_str).unwrap().try_into().unwrap()).unwrap();

        let unchecked_secret = RawRevocationSecret { secret, index: 0 };
        assert!(RevocationSecret::try_from(unchecked_secret).is_err());

        let valid_secret = RawRevocationSecret { secret, index: 1 };
        assert!(RevocationSecret::try_from(valid_secret).is_ok())
    }

    #[test]
    fn secret_survives_serialization_with_its_lock() {
        let rs = RevocationSecret::new(&mut rng());
        let json = serde_json::to_string(&rs).unwrap();
        let decoded: RevocationSecret = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded, rs);
        assert_eq!(decoded.revocation_lock(), rs.revocation_lock());
    }

    #[test]
    fn commitment_opens_only_with_matching_pair() {
        let mut rng = rng();
        let params = PedersenParameters::<G1Projective, 1>::new(&mut rng);
        let rs = RevocationSecret::new(&mut rng);
        let rl = rs.revocation_lock();
        let bf = RevocationLockBlindingFactor(BlindingFactor::new(&mut rng));
        let com = RevocationLockCommitment(rl.to_message().commit(&params, bf.0));

        assert!(com
            .verify_revocation_pair(&params, &rs, &rl, &bf)
            .is_verified());

        let other = RevocationSecret::new(&mut rng);
        assert!(!com
            .verify_revocation_pair(&params, &other, &other.revocation_lock(), &bf)
            .is_verified());
    }
}
