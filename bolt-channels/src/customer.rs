/*!
Routines for the customer side of a channel: establishing it, making payments on it, and closing
it.

## Establish

The customer commits to the initial wallet and proves the commitments are correctly formed
relative to the agreed balances, entering [`WalletStatus::ProofGenerated`]. On receiving a valid
close token they enter [`WalletStatus::CloseTokenVerified`], and on receiving a valid pay token
the wallet becomes [`WalletStatus::Ready`].

## Pay

Payments have three phases. The customer begins in the `Ready` state.

First, the customer _starts_ the payment with an agreed amount. This produces a payment proof
and a new wallet in [`WalletStatus::Started`]; the current wallet moves to
[`WalletStatus::PaymentInFlight`] and cannot start another payment.

On receiving a close token for the new wallet, the customer _locks_ the channel. The new wallet
replaces the current one in [`WalletStatus::Locked`] and the old one is revoked; at this point the
customer cannot make another payment.

On receiving a pay token the payment is complete and the wallet is `Ready` again.

## Close

The customer can close from any wallet that carries a verified close signature and has not
been revoked: after the close token was verified during Establish, while `Ready`, while a payment
is in flight (on the previous balances), or while `Locked` (on the updated balances).
*/

use crate::{
    close::CustomerCloseMessage,
    proofs::{BlindingFactors, PaymentProof, WalletCommitment},
    revlock::RevocationLock,
    states::*,
    types::*,
    Error, EstablishProof, Nonce, PayProof, Rng, RevokeToken,
};
use bolt_crypto::{
    pedersen::PedersenParameters, pointcheval_sanders::PublicKey,
    proofs::RangeConstraintParameters,
};
use serde::{Deserialize, Serialize};

/// Public keys and parameters of the merchant, used throughout the lifetime of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub(crate) merchant_public_key: PublicKey<STATE_LEN>,
    pub(crate) revocation_commitment_parameters: PedersenParameters<G1Projective, 1>,
    pub(crate) range_constraint_parameters: RangeConstraintParameters,
}

impl Config {
    /// The key the merchant signs close tokens and pay tokens with.
    pub fn merchant_public_key(&self) -> &PublicKey<STATE_LEN> {
        &self.merchant_public_key
    }
}

/// Where a customer wallet is in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WalletStatus {
    /// Created at Init; nothing has been sent to the merchant.
    Initialized,
    /// Commitments and an establish proof were generated.
    ProofGenerated,
    /// The initial close token was received and verified.
    CloseTokenVerified,
    /// Holds a valid pay token; a payment may start.
    Ready,
    /// A payment from this wallet was started and has not completed or been aborted.
    PaymentInFlight,
    /// The new wallet of a started payment, waiting for its close token.
    Started,
    /// The new wallet of a payment whose previous wallet has been revoked, waiting for its pay
    /// token.
    Locked,
    /// Superseded by a newer wallet. Can never pay or close again.
    Revoked,
    /// The channel was closed from this wallet.
    Closed,
}

/// Blinding factors of commitments whose signatures have not arrived yet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
enum Openings {
    Establish {
        close_state: CloseStateBlindingFactor,
        pay_token: PayTokenBlindingFactor,
    },
    Pay(BlindingFactors),
}

impl Openings {
    fn close_state(&self) -> CloseStateBlindingFactor {
        match self {
            Openings::Establish { close_state, .. } => *close_state,
            Openings::Pay(bfs) => bfs.for_close_state,
        }
    }

    fn pay_token(&self) -> PayTokenBlindingFactor {
        match self {
            Openings::Establish { pay_token, .. } => *pay_token,
            Openings::Pay(bfs) => bfs.for_pay_token,
        }
    }
}

/// The customer's private record of one version of their channel balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerWallet {
    name: String,
    config: Config,
    state: State,
    version: u64,
    status: WalletStatus,
    openings: Option<Openings>,
    close_state_signature: Option<CloseStateSignature>,
    pay_token: Option<PayToken>,
}

impl CustomerWallet {
    /// Create the initial wallet of a channel.
    pub(crate) fn new(
        rng: &mut impl Rng,
        name: &str,
        config: Config,
        channel_id: ChannelId,
        customer_balance: CustomerBalance,
        merchant_balance: MerchantBalance,
    ) -> Self {
        Self {
            name: name.to_string(),
            config,
            state: State::new(rng, channel_id, customer_balance, merchant_balance),
            version: 0,
            status: WalletStatus::Initialized,
            openings: None,
            close_state_signature: None,
            pay_token: None,
        }
    }

    /// The customer's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Merchant parameters for the channel.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The channel this wallet belongs to.
    pub fn channel_id(&self) -> ChannelId {
        self.state.channel_id()
    }

    /// The customer's balance in this wallet.
    pub fn customer_balance(&self) -> CustomerBalance {
        self.state.customer_balance()
    }

    /// The merchant's balance in this wallet.
    pub fn merchant_balance(&self) -> MerchantBalance {
        self.state.merchant_balance()
    }

    /// Number of completed payments before this wallet.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Protocol status.
    pub fn status(&self) -> WalletStatus {
        self.status
    }

    /// Nonce that identifies this wallet when it is spent.
    pub fn nonce(&self) -> Nonce {
        self.state.nonce()
    }

    /// The lock a close from this wallet is published under.
    pub fn revocation_lock(&self) -> RevocationLock {
        self.state.revocation_lock()
    }

    /// Commit to the initial wallet and prove the commitments are well formed.
    ///
    /// May be repeated until a close token is verified; each call replaces the previous
    /// openings.
    pub(crate) fn establish_proof(
        &mut self,
        rng: &mut impl Rng,
    ) -> Result<(WalletCommitment, EstablishProof), Error> {
        match self.status {
            WalletStatus::Initialized | WalletStatus::ProofGenerated => {}
            _ => return Err(Error::OutOfOrder("wallet is past the establish proof")),
        }
        let (proof, close_state, pay_token) = EstablishProof::new(rng, &self.config, &self.state);
        self.openings = Some(Openings::Establish {
            close_state,
            pay_token,
        });
        self.status = WalletStatus::ProofGenerated;
        Ok((proof.wallet_commitment(), proof))
    }

    /// Unblind a close token and check it signs this wallet's close state.
    fn unblind_close_token(
        &self,
        close_token: CloseStateBlindedSignature,
    ) -> Result<Option<CloseStateSignature>, Error> {
        let openings = self
            .openings
            .ok_or(Error::OutOfOrder("no commitment is outstanding"))?;
        let signature = close_token.unblind(openings.close_state());
        Ok(signature
            .verify(&self.config, &self.state.close_state())
            .is_verified()
            .then(|| signature))
    }

    /// Unblind a pay token and check it signs this wallet's state.
    fn unblind_pay_token(&self, pay_token: BlindedPayToken) -> Result<Option<PayToken>, Error> {
        let openings = self
            .openings
            .ok_or(Error::OutOfOrder("no commitment is outstanding"))?;
        let pay_token = pay_token.unblind(openings.pay_token());
        Ok(pay_token
            .verify(&self.config, &self.state)
            .is_verified()
            .then(|| pay_token))
    }

    /// Check the initial close token. Returns `false`, leaving the wallet unchanged, if it is
    /// not a valid signature on the committed close state.
    pub(crate) fn verify_close_token(
        &mut self,
        close_token: CloseStateBlindedSignature,
    ) -> Result<bool, Error> {
        if self.status != WalletStatus::ProofGenerated {
            return Err(Error::OutOfOrder("no establish proof was generated"));
        }
        match self.unblind_close_token(close_token)? {
            Some(signature) => {
                self.close_state_signature = Some(signature);
                self.status = WalletStatus::CloseTokenVerified;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Check the initial pay token and make the wallet ready for payments.
    pub(crate) fn activate(&mut self, pay_token: BlindedPayToken) -> Result<bool, Error> {
        if self.status != WalletStatus::CloseTokenVerified {
            return Err(Error::OutOfOrder("close token was not verified"));
        }
        self.accept_pay_token(pay_token)
    }

    fn accept_pay_token(&mut self, pay_token: BlindedPayToken) -> Result<bool, Error> {
        match self.unblind_pay_token(pay_token)? {
            Some(pay_token) => {
                self.pay_token = Some(pay_token);
                self.openings = None;
                self.status = WalletStatus::Ready;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /**
    Start a payment of `amount` to the merchant, of which `total` is debited including any
    channel fee.

    Produces the payment request and the new wallet. This wallet moves to
    [`WalletStatus::PaymentInFlight`].
    */
    pub(crate) fn start_payment(
        &mut self,
        rng: &mut impl Rng,
        amount: PaymentAmount,
        total: PaymentAmount,
    ) -> Result<(PaymentProof, CustomerWallet), Error> {
        if self.status != WalletStatus::Ready {
            return Err(Error::OutOfOrder("wallet is not ready to pay"));
        }
        let pay_token = self
            .pay_token
            .ok_or(Error::OutOfOrder("wallet holds no pay token"))?;

        let new_state = self.state.apply_payment(rng, total)?;
        let (proof, blinding_factors) = PayProof::new(
            rng,
            &self.config,
            pay_token,
            &self.state,
            &new_state,
            total,
        )?;

        let new_wallet = CustomerWallet {
            name: self.name.clone(),
            config: self.config.clone(),
            state: new_state,
            version: self.version + 1,
            status: WalletStatus::Started,
            openings: Some(Openings::Pay(blinding_factors)),
            close_state_signature: None,
            pay_token: None,
        };
        self.status = WalletStatus::PaymentInFlight;

        Ok((
            PaymentProof {
                nonce: self.state.nonce(),
                amount,
                proof,
            },
            new_wallet,
        ))
    }

    /**
    Lock the channel: verify the close token on `new`, replace this wallet with `new`, and
    return the revocation of the replaced wallet.

    On success `self` holds the new wallet in [`WalletStatus::Locked`] and `new` holds the
    retired wallet in [`WalletStatus::Revoked`]. On failure neither wallet changes.
    */
    pub(crate) fn lock(
        &mut self,
        new: &mut CustomerWallet,
        close_token: CloseStateBlindedSignature,
    ) -> Result<RevokeToken, Error> {
        if self.status != WalletStatus::PaymentInFlight || new.status != WalletStatus::Started {
            return Err(Error::OutOfOrder("no payment is in flight"));
        }
        if new.channel_id() != self.channel_id() || new.version != self.version + 1 {
            return Err(Error::ParameterMismatch("wallet does not follow the current wallet"));
        }
        let revocation_lock_blinding_factor = match new.openings {
            Some(Openings::Pay(bfs)) => bfs.for_revocation_lock,
            _ => return Err(Error::OutOfOrder("no payment commitments are outstanding")),
        };
        let signature = new
            .unblind_close_token(close_token)?
            .ok_or(Error::InvalidProof("close token does not sign the new wallet"))?;

        let revoke_token = RevokeToken {
            nonce: self.state.nonce(),
            revocation_lock: self.state.revocation_lock(),
            revocation_secret: self.state.revocation_secret().clone(),
            revocation_lock_blinding_factor,
        };

        new.close_state_signature = Some(signature);
        new.status = WalletStatus::Locked;
        std::mem::swap(self, new);
        new.status = WalletStatus::Revoked;
        new.openings = None;
        new.pay_token = None;
        new.close_state_signature = None;
        Ok(revoke_token)
    }

    /// Check the pay token that completes a payment. Returns `false`, leaving the wallet
    /// locked, if the token is invalid.
    pub(crate) fn unlock(&mut self, pay_token: BlindedPayToken) -> Result<bool, Error> {
        if self.status != WalletStatus::Locked {
            return Err(Error::OutOfOrder("wallet is not waiting for a pay token"));
        }
        self.accept_pay_token(pay_token)
    }

    /// Abandon the payment started from this wallet and make it ready again.
    ///
    /// If the merchant already accepted the payment request, the nonce of this wallet is spent
    /// and any further payment from it will be refused; the wallet can still close.
    pub fn abort_payment(&mut self) -> Result<(), Error> {
        if self.status != WalletStatus::PaymentInFlight {
            return Err(Error::OutOfOrder("no payment is in flight"));
        }
        self.status = WalletStatus::Ready;
        tracing::info!(
            customer = %self.name,
            version = self.version,
            "payment aborted"
        );
        Ok(())
    }

    /// Whether the wallet carries a close signature it may still use.
    pub fn can_close(&self) -> bool {
        self.close_state_signature.is_some()
            && matches!(
                self.status,
                WalletStatus::CloseTokenVerified
                    | WalletStatus::Ready
                    | WalletStatus::PaymentInFlight
                    | WalletStatus::Locked
            )
    }

    /// Produce the close message for this wallet and mark it closed.
    pub(crate) fn close(&mut self, rng: &mut impl Rng) -> Result<CustomerCloseMessage, Error> {
        if !self.can_close() {
            return Err(Error::OutOfOrder("wallet cannot close"));
        }
        let mut signature = self
            .close_state_signature
            .ok_or(Error::OutOfOrder("wallet holds no close signature"))?;
        signature.randomize(rng);
        self.status = WalletStatus::Closed;
        Ok(CustomerCloseMessage::new(self.state.close_state(), signature))
    }
}
