//! Routines for the merchant side of a channel: issuing close and pay tokens on established
//! channels and processing payments.
//!
//! A [`MerchantWallet`] verifies every proof through a [`CryptoBackend`] before it touches its
//! own state, so a rejected request leaves the wallet exactly as it was.

use crate::{
    customer,
    proofs::{PaymentProof, WalletCommitment},
    record::{MemoryRevocationRecord, RevocationRecord},
    revlock::*,
    states::*,
    types::*,
    CryptoBackend, Error, EstablishProof, EstablishProofPublicValues, Nonce, PayProofPublicValues,
    Rng, RevokeToken,
};
use bolt_crypto::{
    pedersen::PedersenParameters, pointcheval_sanders::KeyPair, proofs::RangeConstraintParameters,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    time::{Duration, SystemTime},
};

/// Default window between approving a payment and receiving its revocation.
pub const DEFAULT_PENDING_PAYMENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Keys and parameters used throughout the lifetime of a merchant channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Signing key for pay tokens and close tokens.
    pub(crate) signing_keypair: KeyPair<STATE_LEN>,
    /// Parameters for commitments to revocation locks.
    pub(crate) revocation_commitment_parameters: PedersenParameters<G1Projective, 1>,
    /// Parameters for the balance range constraints.
    pub(crate) range_constraint_parameters: RangeConstraintParameters,
    /// How long an approved payment waits for its revocation before the merchant forgets it.
    pub pending_payment_timeout: Duration,
}

impl Config {
    /// Generate fresh keys and parameters.
    pub fn new(rng: &mut impl Rng) -> Self {
        Self {
            signing_keypair: KeyPair::new(rng),
            revocation_commitment_parameters: PedersenParameters::new(rng),
            range_constraint_parameters: RangeConstraintParameters::new(rng),
            pending_payment_timeout: DEFAULT_PENDING_PAYMENT_TIMEOUT,
        }
    }

    /// Set how long approved payments wait for revocation.
    pub fn with_pending_payment_timeout(self, pending_payment_timeout: Duration) -> Self {
        Self {
            pending_payment_timeout,
            ..self
        }
    }

    /// Extract the public parameters a customer needs.
    pub fn to_customer_config(&self) -> customer::Config {
        customer::Config {
            merchant_public_key: self.signing_keypair.public_key().clone(),
            revocation_commitment_parameters: self.revocation_commitment_parameters.clone(),
            range_constraint_parameters: self.range_constraint_parameters.clone(),
        }
    }
}

/// Where the merchant is in establishing the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MerchantStatus {
    /// Keys exist but no customer has asked to establish.
    Created,
    /// A close token was issued on these commitments; the pay token may follow. No other
    /// commitment will be answered for this channel.
    CloseTokenIssued(WalletCommitment),
    /// The initial pay token was issued; payments can be processed.
    PayTokenIssued,
}

/// A payment that was approved but whose old wallet has not been revoked yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Unrevoked {
    nonce: Nonce,
    revocation_lock_commitment: RevocationLockCommitment,
    state_commitment: StateCommitment,
    expires_at: SystemTime,
}

/// Evidence that a wallet was revoked: its lock and the secret the customer revealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationEvidence {
    /// The revoked lock.
    pub revocation_lock: RevocationLock,
    /// The secret opening it.
    pub revocation_secret: RevocationSecret,
}

/// The merchant's private record of one channel.
#[derive(Debug, Serialize, Deserialize)]
pub struct MerchantWallet<R = MemoryRevocationRecord> {
    name: String,
    deposit: MerchantBalance,
    config: Config,
    channel_id: Option<ChannelId>,
    status: MerchantStatus,
    /// The close token answering the establish request, kept so a retried request gets it back.
    initial_close_token: Option<CloseStateBlindedSignature>,
    spent_nonces: HashSet<Nonce>,
    pending: Vec<Unrevoked>,
    revocations: R,
    close_tokens_issued: u64,
    pay_tokens_issued: u64,
}

impl MerchantWallet {
    /// Create a wallet with fresh keys and an in-memory revocation record.
    pub(crate) fn new(rng: &mut impl Rng, name: &str, deposit: MerchantBalance) -> Self {
        Self {
            name: name.to_string(),
            deposit,
            config: Config::new(rng),
            channel_id: None,
            status: MerchantStatus::Created,
            initial_close_token: None,
            spent_nonces: HashSet::new(),
            pending: Vec::new(),
            revocations: MemoryRevocationRecord::new(),
            close_tokens_issued: 0,
            pay_tokens_issued: 0,
        }
    }
}

impl<R: RevocationRecord> MerchantWallet<R> {
    /// Replace the revocation record, for example with a
    /// [`FileRevocationRecord`](crate::record::FileRevocationRecord).
    ///
    /// Only allowed before any payment was processed.
    pub fn with_revocation_record<S: RevocationRecord>(
        self,
        revocations: S,
    ) -> Result<MerchantWallet<S>, Error> {
        if !self.spent_nonces.is_empty() {
            return Err(Error::OutOfOrder("revocation record replaced after payments started"));
        }
        Ok(MerchantWallet {
            name: self.name,
            deposit: self.deposit,
            config: self.config,
            channel_id: self.channel_id,
            status: self.status,
            initial_close_token: self.initial_close_token,
            spent_nonces: self.spent_nonces,
            pending: self.pending,
            revocations,
            close_tokens_issued: self.close_tokens_issued,
            pay_tokens_issued: self.pay_tokens_issued,
        })
    }

    /// The merchant's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The merchant's initial deposit.
    pub fn deposit(&self) -> MerchantBalance {
        self.deposit
    }

    /// Keys and parameters.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mutable access to the tunable parameters.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// The channel this wallet serves, once a customer has asked to establish it.
    pub fn channel_id(&self) -> Option<ChannelId> {
        self.channel_id
    }

    /// Establishment progress.
    pub fn status(&self) -> MerchantStatus {
        self.status
    }

    /// Number of close tokens issued so far.
    pub fn close_tokens_issued(&self) -> u64 {
        self.close_tokens_issued
    }

    /// Number of pay tokens issued so far.
    pub fn pay_tokens_issued(&self) -> u64 {
        self.pay_tokens_issued
    }

    /// Whether a payment spending this nonce was already accepted.
    pub fn is_nonce_spent(&self, nonce: &Nonce) -> bool {
        self.spent_nonces.contains(nonce)
    }

    /// Number of payments waiting for revocation.
    pub fn pending_payments(&self) -> usize {
        self.pending.len()
    }

    /// The record of revoked wallets.
    pub fn revocations(&self) -> &R {
        &self.revocations
    }

    /// Look up the evidence for a revoked lock.
    pub(crate) fn revocation_evidence(&self, lock: &RevocationLock) -> Option<RevocationEvidence> {
        self.revocations
            .get(lock)
            .map(|secret| RevocationEvidence {
                revocation_lock: *lock,
                revocation_secret: secret.clone(),
            })
    }

    /**
    Respond to a customer request to establish the channel.

    Issues a close token on the close state commitment if the [`EstablishProof`] verifies with
    respect to the public values (channel ID and balances) and the provided commitments.

    Only one initial wallet is ever signed. A repeated request for the same commitments returns
    the token already issued; any other commitment, or another channel ID, is refused.
    */
    pub(crate) fn initialize(
        &mut self,
        backend: &mut impl CryptoBackend,
        public_values: &EstablishProofPublicValues,
        com: &WalletCommitment,
        proof: &EstablishProof,
    ) -> Result<CloseStateBlindedSignature, Error> {
        if let Some(channel_id) = self.channel_id {
            if channel_id != public_values.channel_id {
                return Err(Error::ParameterMismatch("wallet already serves another channel"));
            }
        }
        match (self.status, self.initial_close_token) {
            (MerchantStatus::Created, _) => {}
            (MerchantStatus::CloseTokenIssued(issued), Some(close_token)) if issued == *com => {
                tracing::debug!(channel = %public_values.channel_id, "establish request repeated");
                return Ok(close_token);
            }
            (MerchantStatus::CloseTokenIssued(_), _) => {
                return Err(Error::OutOfOrder(
                    "a close token was already issued on other commitments",
                ))
            }
            (MerchantStatus::PayTokenIssued, _) => {
                return Err(Error::OutOfOrder("channel is already established"))
            }
        }
        if proof.wallet_commitment() != *com {
            return Err(Error::InvalidProof("commitments do not match the establish proof"));
        }
        if !backend
            .verify_establish_proof(&self.config, proof, public_values)
            .is_verified()
        {
            return Err(Error::InvalidProof("establish proof did not verify"));
        }

        let close_token =
            CloseStateBlindedSignature::new(backend, &self.config, &com.close_state_commitment);
        self.channel_id = Some(public_values.channel_id);
        self.status = MerchantStatus::CloseTokenIssued(*com);
        self.initial_close_token = Some(close_token);
        self.close_tokens_issued += 1;
        Ok(close_token)
    }

    /// Issue the initial pay token on the state commitment that received a close token.
    pub(crate) fn activate(
        &mut self,
        backend: &mut impl CryptoBackend,
        state_commitment: &StateCommitment,
    ) -> Result<BlindedPayToken, Error> {
        match self.status {
            MerchantStatus::CloseTokenIssued(issued)
                if issued.state_commitment == *state_commitment =>
            {
                let pay_token = BlindedPayToken::new(backend, &self.config, state_commitment);
                self.status = MerchantStatus::PayTokenIssued;
                self.pay_tokens_issued += 1;
                Ok(pay_token)
            }
            MerchantStatus::CloseTokenIssued(_) => Err(Error::OutOfOrder(
                "no close token was issued on this commitment",
            )),
            _ => Err(Error::OutOfOrder("no close token was issued")),
        }
    }

    /**
    On receiving a payment request, issue a close token on the updated state if the proof is
    valid and the revealed nonce was never spent.

    On success the nonce is spent for good, even if the customer never revokes.
    */
    pub(crate) fn allow_payment(
        &mut self,
        backend: &mut impl CryptoBackend,
        payment: &PaymentProof,
        total: PaymentAmount,
        now: SystemTime,
    ) -> Result<CloseStateBlindedSignature, Error> {
        if self.status != MerchantStatus::PayTokenIssued {
            return Err(Error::OutOfOrder("channel is not established"));
        }
        if self.spent_nonces.contains(&payment.nonce) {
            return Err(Error::RevocationConflict("nonce already spent"));
        }
        let public_values = PayProofPublicValues {
            nonce: payment.nonce,
            amount: total,
        };
        if !backend
            .verify_pay_proof(&self.config, &payment.proof, &public_values)
            .is_verified()
        {
            return Err(Error::InvalidProof("pay proof did not verify"));
        }

        let close_token = CloseStateBlindedSignature::new(
            backend,
            &self.config,
            &payment.proof.close_state_commitment(),
        );
        let _ = self.spent_nonces.insert(payment.nonce);
        self.pending.push(Unrevoked {
            nonce: payment.nonce,
            revocation_lock_commitment: payment.proof.revocation_lock_commitment(),
            state_commitment: payment.proof.state_commitment(),
            expires_at: now + self.config.pending_payment_timeout,
        });
        self.close_tokens_issued += 1;
        Ok(close_token)
    }

    /**
    Complete a payment by recording the revocation of the old wallet, then issuing a pay token
    on the updated state.

    Fails if no approved payment is waiting for this nonce, if the lock was already revoked, or
    if the revocation information does not match the commitment sent with the payment. The
    pay token is only issued once the revocation is stored.
    */
    pub(crate) fn revoke(
        &mut self,
        backend: &mut impl CryptoBackend,
        revoke_token: &RevokeToken,
        now: SystemTime,
    ) -> Result<BlindedPayToken, Error> {
        let position = self
            .pending
            .iter()
            .position(|unrevoked| unrevoked.nonce == revoke_token.nonce)
            .ok_or(Error::RevocationConflict("no payment is waiting for this nonce"))?;
        let unrevoked = self.pending[position];

        if unrevoked.expires_at < now {
            let _ = self.pending.remove(position);
            return Err(Error::RevocationConflict("payment expired before revocation"));
        }
        if self.revocations.contains(&revoke_token.revocation_lock) {
            return Err(Error::RevocationConflict("revocation lock already recorded"));
        }
        if !unrevoked
            .revocation_lock_commitment
            .verify_revocation_pair(
                &self.config.revocation_commitment_parameters,
                &revoke_token.revocation_secret,
                &revoke_token.revocation_lock,
                &revoke_token.revocation_lock_blinding_factor,
            )
            .is_verified()
        {
            return Err(Error::InvalidProof("revocation does not open the lock commitment"));
        }

        self.revocations
            .insert(revoke_token.revocation_secret.clone())?;
        let _ = self.pending.remove(position);
        let pay_token = BlindedPayToken::new(backend, &self.config, &unrevoked.state_commitment);
        self.pay_tokens_issued += 1;
        Ok(pay_token)
    }

    /// Drop approved payments whose revocation did not arrive in time. Returns how many were
    /// dropped. Their nonces stay spent.
    pub fn expire_pending_payments(&mut self, now: SystemTime) -> usize {
        let before = self.pending.len();
        self.pending.retain(|unrevoked| unrevoked.expires_at >= now);
        let expired = before - self.pending.len();
        if expired > 0 {
            tracing::info!(
                merchant = %self.name,
                expired,
                "dropped payments that were never revoked"
            );
        }
        expired
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::rng;

    #[test]
    fn customer_config_matches_merchant_keys() {
        let mut rng = rng();
        let config = Config::new(&mut rng);
        let customer_config = config.to_customer_config();
        assert_eq!(
            &customer_config.merchant_public_key,
            config.signing_keypair.public_key()
        );
        assert_eq!(config.pending_payment_timeout, Duration::from_secs(60));
    }

    #[test]
    fn pay_token_needs_a_close_token_first() {
        let mut rng = rng();
        let mut backend = crate::Bls12Backend::from_seed([9; 32]);
        let deposit = MerchantBalance::try_new(5).unwrap();
        let mut wallet = MerchantWallet::new(&mut rng, "merchant", deposit);
        let com = StateCommitment(wallet.config.signing_keypair.public_key().blind_message(
            &bolt_crypto::Message::random(&mut rng),
            bolt_crypto::BlindingFactor::new(&mut rng),
        ));

        assert!(matches!(
            wallet.activate(&mut backend, &com),
            Err(Error::OutOfOrder(_))
        ));
        assert_eq!(wallet.pay_tokens_issued(), 0);
    }

    #[test]
    fn record_can_only_be_swapped_before_payments() {
        let mut rng = rng();
        let deposit = MerchantBalance::try_new(5).unwrap();
        let mut wallet = MerchantWallet::new(&mut rng, "merchant", deposit);
        let _ = wallet.spent_nonces.insert(Nonce::new(&mut rng));
        assert!(matches!(
            wallet.with_revocation_record(MemoryRevocationRecord::new()),
            Err(Error::OutOfOrder(_))
        ));
    }
}
