/*!
Defines the state of a channel and transformations on that state.

The primary type is a [`State`], which describes one version of a customer wallet. The protocol
turns a state into two outputs for the customer: a [`PayToken`] and a [`CloseStateSignature`].
For each of these outputs, the flow goes as follows:

1. the customer blinds an input,
2. the merchant verifies (in zero knowledge) that the input is correctly formed,
3. the merchant produces a blinded version of the output, and
4. the customer unblinds the output.

To produce a [`PayToken`], the customer blinds the [`State`] with a [`PayTokenBlindingFactor`].
This produces a [`StateCommitment`], which the merchant signs to produce a [`BlindedPayToken`].

To produce a [`CloseStateSignature`], the customer blinds the [`CloseState`] with a
[`CloseStateBlindingFactor`]. This produces a [`CloseStateCommitment`], which the merchant signs
to produce a [`CloseStateBlindedSignature`].

The customer must blind the input and unblind the output with the _same_ blinding factor.
*/

use crate::{
    customer, merchant, revlock::*, types::*, CryptoBackend, Error, Nonce, Rng, Verification,
};
use bolt_crypto::{
    pointcheval_sanders::{BlindedMessage, BlindedSignature, Signature},
    proofs::RANGE_UPPER_BOUND,
    BlindingFactor, Message, SerializeElement,
};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_512};
use std::{
    convert::TryFrom,
    fmt,
    hash::{Hash, Hasher},
};

/// Number of elements in the message representation of a [`State`] or [`CloseState`].
pub(crate) const STATE_LEN: usize = 5;

/// Fixed tag that takes the place of the nonce in a [`CloseState`], so that a signature on a
/// close state can never be mistaken for a pay token.
pub(crate) fn close_tag() -> Scalar {
    Scalar::from(u64::from_be_bytes(*b"\0\0\0close"))
}

/// Channel identifier, binds each payment to a specific channel.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelId(#[serde(with = "SerializeElement")] Scalar);

#[cfg(feature = "sqlite")]
bolt_crypto::impl_sqlx_for_bincode_ty!(ChannelId);

impl ChannelId {
    /// Derive a channel identifier from everything both parties agreed to when the channel was
    /// initialized.
    pub(crate) fn new(
        channel_name: &str,
        merchant_public_key: &[u8],
        customer_id: &[u8; 32],
        customer_deposit: CustomerBalance,
        merchant_deposit: MerchantBalance,
    ) -> Self {
        let mut hasher = Sha3_512::new();
        hasher.update(b"bolt channel id");
        hasher.update(&(channel_name.len() as u64).to_le_bytes());
        hasher.update(channel_name.as_bytes());
        hasher.update(merchant_public_key);
        hasher.update(customer_id);
        hasher.update(&customer_deposit.into_inner().to_le_bytes());
        hasher.update(&merchant_deposit.into_inner().to_le_bytes());

        let mut digest = [0; 64];
        digest.copy_from_slice(&hasher.finalize());
        Self(Scalar::from_bytes_wide(&digest))
    }

    pub(crate) fn to_scalar(self) -> Scalar {
        self.0
    }

    /// Encode the identifier as bytes in little-endian order.
    pub fn as_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

impl Hash for ChannelId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId(")?;
        for byte in self.as_bytes().iter().rev().take(8) {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "..)")
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", base64::encode(self.as_bytes()))
    }
}

/// Channel balance for merchant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u64")]
pub struct MerchantBalance(u64);

impl MerchantBalance {
    /// Construct a merchant balance. Balances must lie in `[0, 2^63)`.
    pub fn try_new(value: u64) -> Result<Self, Error> {
        if value < RANGE_UPPER_BOUND {
            Ok(Self(value))
        } else {
            Err(Error::InvalidAmount(value))
        }
    }

    /// Credit a payment to this balance.
    pub(crate) fn receive(self, amount: PaymentAmount) -> Result<Self, Error> {
        let total = self
            .0
            .checked_add(amount.0)
            .ok_or(Error::InvalidAmount(amount.0))?;
        Self::try_new(total).map_err(|_| Error::InvalidAmount(amount.0))
    }

    pub(crate) fn to_scalar(self) -> Scalar {
        Scalar::from(self.0)
    }

    /// Get the balance as a plain value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

/// Channel balance for customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u64")]
pub struct CustomerBalance(u64);

impl CustomerBalance {
    /// Construct a customer balance. Balances must lie in `[0, 2^63)`.
    pub fn try_new(value: u64) -> Result<Self, Error> {
        if value < RANGE_UPPER_BOUND {
            Ok(Self(value))
        } else {
            Err(Error::InvalidAmount(value))
        }
    }

    /// Debit a payment from this balance.
    pub(crate) fn pay(self, amount: PaymentAmount) -> Result<Self, Error> {
        self.0
            .checked_sub(amount.0)
            .map(Self)
            .ok_or(Error::InsufficientBalance {
                balance: self.0,
                amount: amount.0,
            })
    }

    pub(crate) fn to_scalar(self) -> Scalar {
        Scalar::from(self.0)
    }

    /// Get the balance as a plain value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

/// Amount of a single payment, from the customer to the merchant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u64")]
pub struct PaymentAmount(u64);

impl PaymentAmount {
    /// Construct a payment amount from the customer to the merchant.
    ///
    /// The amount must be non-zero and fit in a channel balance.
    pub fn pay_merchant(amount: u64) -> Result<Self, Error> {
        if amount == 0 || amount >= RANGE_UPPER_BOUND {
            return Err(Error::InvalidAmount(amount));
        }
        Ok(Self(amount))
    }

    /// Add the channel's per-payment fee to this amount.
    pub(crate) fn with_fee(self, fee: u64) -> Result<Self, Error> {
        self.0
            .checked_add(fee)
            .filter(|total| *total < RANGE_UPPER_BOUND)
            .map(Self)
            .ok_or(Error::InvalidAmount(self.0))
    }

    pub(crate) fn to_scalar(self) -> Scalar {
        Scalar::from(self.0)
    }

    /// Get the amount as a plain value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for MerchantBalance {
    type Error = Error;

    fn try_from(value: u64) -> Result<Self, Error> {
        Self::try_new(value)
    }
}

impl TryFrom<u64> for CustomerBalance {
    type Error = Error;

    fn try_from(value: u64) -> Result<Self, Error> {
        Self::try_new(value)
    }
}

impl TryFrom<u64> for PaymentAmount {
    type Error = Error;

    fn try_from(amount: u64) -> Result<Self, Error> {
        Self::pay_merchant(amount)
    }
}

/// Describes the complete state of the channel with the given ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct State {
    channel_id: ChannelId,
    nonce: Nonce,
    revocation_secret: RevocationSecret,
    customer_balance: CustomerBalance,
    merchant_balance: MerchantBalance,
}

/// The closing state associated with a state.
///
/// When signed by the merchant, this can be used by the customer to close the channel.
/// It replaces the nonce from the [`State`] with a fixed tag, so the customer stays unlinkable
/// when closing, even if the merchant aborted during a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CloseState {
    pub(crate) channel_id: ChannelId,
    pub(crate) revocation_lock: RevocationLock,
    pub(crate) customer_balance: CustomerBalance,
    pub(crate) merchant_balance: MerchantBalance,
}

impl State {
    /// Generate a new `State` with the given balances and ID.
    pub(crate) fn new(
        rng: &mut impl Rng,
        channel_id: ChannelId,
        customer_balance: CustomerBalance,
        merchant_balance: MerchantBalance,
    ) -> Self {
        Self {
            channel_id,
            nonce: Nonce::new(rng),
            revocation_secret: RevocationSecret::new(rng),
            customer_balance,
            merchant_balance,
        }
    }

    pub(crate) fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub(crate) fn customer_balance(&self) -> CustomerBalance {
        self.customer_balance
    }

    pub(crate) fn merchant_balance(&self) -> MerchantBalance {
        self.merchant_balance
    }

    pub(crate) fn nonce(&self) -> Nonce {
        self.nonce
    }

    pub(crate) fn revocation_lock(&self) -> RevocationLock {
        self.revocation_secret.revocation_lock()
    }

    pub(crate) fn revocation_secret(&self) -> &RevocationSecret {
        &self.revocation_secret
    }

    /// Get the [`CloseState`] corresponding to this `State`.
    pub(crate) fn close_state(&self) -> CloseState {
        CloseState {
            channel_id: self.channel_id,
            revocation_lock: self.revocation_lock(),
            customer_balance: self.customer_balance,
            merchant_balance: self.merchant_balance,
        }
    }

    /// Apply a payment to the state by moving `amount` from the customer to the merchant and
    /// generating a fresh [`Nonce`] and [`RevocationSecret`].
    pub(crate) fn apply_payment(
        &self,
        rng: &mut impl Rng,
        amount: PaymentAmount,
    ) -> Result<State, Error> {
        Ok(State {
            channel_id: self.channel_id,
            nonce: Nonce::new(rng),
            revocation_secret: RevocationSecret::new(rng),
            customer_balance: self.customer_balance.pay(amount)?,
            merchant_balance: self.merchant_balance.receive(amount)?,
        })
    }

    /// Get the message representation of a State: the tuple
    /// (channel_id, nonce, revocation_lock, customer_balance, merchant_balance).
    pub(crate) fn to_message(&self) -> Message<STATE_LEN> {
        Message::new([
            self.channel_id.to_scalar(),
            self.nonce.to_scalar(),
            self.revocation_lock().to_scalar(),
            self.customer_balance.to_scalar(),
            self.merchant_balance.to_scalar(),
        ])
    }
}

impl CloseState {
    /// Get the message representation of a CloseState.
    pub(crate) fn to_message(&self) -> Message<STATE_LEN> {
        Message::new([
            self.channel_id.to_scalar(),
            close_tag(),
            self.revocation_lock.to_scalar(),
            self.customer_balance.to_scalar(),
            self.merchant_balance.to_scalar(),
        ])
    }
}

/// Commitment to a State: (channel_id, nonce, revocation_lock, customer_balance, merchant_balance).
///
/// Note that there is no direct verification function on `StateCommitment`s. They are
/// used to generate [`BlindedPayToken`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCommitment(pub(crate) BlindedMessage);

/// Commitment to a CloseState and a constant, fixed close tag.
///
/// Note that there is no direct verification function on `CloseStateCommitment`s. They are
/// used to generate [`CloseStateBlindedSignature`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseStateCommitment(pub(crate) BlindedMessage);

/// Signature on a [`CloseState`] and a constant, fixed close tag. Used to close a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CloseStateSignature(Signature);

/// Blinded signature on a close state and a constant, fixed close tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseStateBlindedSignature(BlindedSignature);

/// Blinding factor for a [`CloseStateCommitment`] and corresponding [`CloseStateBlindedSignature`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct CloseStateBlindingFactor(pub(crate) BlindingFactor);

impl CloseStateBlindedSignature {
    /// Produce a [`CloseStateBlindedSignature`] by blindly signing the given
    /// [`CloseStateCommitment`].
    ///
    /// This is typically called by the merchant.
    pub(crate) fn new(
        backend: &mut impl CryptoBackend,
        param: &merchant::Config,
        com: &CloseStateCommitment,
    ) -> Self {
        CloseStateBlindedSignature(backend.blind_sign(&param.signing_keypair, &com.0))
    }

    /// Unblind a [`CloseStateBlindedSignature`] to get an (unblinded) [`CloseStateSignature`]
    /// using the given [`CloseStateBlindingFactor`].
    ///
    /// This is typically called by the customer.
    pub(crate) fn unblind(self, bf: CloseStateBlindingFactor) -> CloseStateSignature {
        CloseStateSignature(self.0.unblind(bf.0))
    }
}

impl CloseStateSignature {
    /// Verify the merchant signature against the given [`CloseState`].
    pub(crate) fn verify(&self, param: &customer::Config, close_state: &CloseState) -> Verification {
        param
            .merchant_public_key
            .verify(&close_state.to_message(), &self.0)
            .into()
    }

    /// Randomize the `CloseStateSignature` in place.
    pub(crate) fn randomize(&mut self, rng: &mut impl Rng) {
        self.0.randomize(rng);
    }
}

/// A `PayToken` allows a customer to initiate a new payment. It is tied to a specific channel
/// [`State`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PayToken(pub(crate) Signature);

/// A blinded pay token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindedPayToken(BlindedSignature);

/// Blinding factor for a [`StateCommitment`] and corresponding [`BlindedPayToken`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct PayTokenBlindingFactor(pub(crate) BlindingFactor);

impl BlindedPayToken {
    /// Produce a [`BlindedPayToken`] by blindly signing the given [`StateCommitment`].
    ///
    /// This is typically called by the merchant.
    pub(crate) fn new(
        backend: &mut impl CryptoBackend,
        param: &merchant::Config,
        com: &StateCommitment,
    ) -> Self {
        BlindedPayToken(backend.blind_sign(&param.signing_keypair, &com.0))
    }

    /// Unblind a [`BlindedPayToken`] to get an (unblinded) [`PayToken`].
    ///
    /// This is typically called by the customer.
    pub(crate) fn unblind(self, bf: PayTokenBlindingFactor) -> PayToken {
        PayToken(self.0.unblind(bf.0))
    }
}

impl PayToken {
    /// Verify a `PayToken` against the given [`State`].
    pub(crate) fn verify(&self, param: &customer::Config, state: &State) -> Verification {
        param
            .merchant_public_key
            .verify(&state.to_message(), &self.0)
            .into()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::rng;

    fn channel_id() -> ChannelId {
        ChannelId::new(
            "test channel",
            b"merchant key",
            &[7; 32],
            CustomerBalance::try_new(100).unwrap(),
            MerchantBalance::try_new(10).unwrap(),
        )
    }

    #[test]
    fn apply_payment_moves_funds() {
        let mut rng = rng();
        let s = State::new(
            &mut rng,
            channel_id(),
            CustomerBalance::try_new(100).unwrap(),
            MerchantBalance::try_new(10).unwrap(),
        );
        let next = s
            .apply_payment(&mut rng, PaymentAmount::pay_merchant(5).unwrap())
            .unwrap();

        assert_eq!(next.customer_balance().into_inner(), 95);
        assert_eq!(next.merchant_balance().into_inner(), 15);
        assert_eq!(next.channel_id(), s.channel_id());
        assert_ne!(next.nonce(), s.nonce());
        assert_ne!(next.revocation_lock(), s.revocation_lock());
    }

    #[test]
    fn apply_payment_refuses_overdraft() {
        let mut rng = rng();
        let s = State::new(
            &mut rng,
            channel_id(),
            CustomerBalance::try_new(4).unwrap(),
            MerchantBalance::try_new(0).unwrap(),
        );
        assert!(matches!(
            s.apply_payment(&mut rng, PaymentAmount::pay_merchant(5).unwrap()),
            Err(Error::InsufficientBalance {
                balance: 4,
                amount: 5
            })
        ));
    }

    #[test]
    fn payment_amounts_are_validated() {
        assert!(matches!(
            PaymentAmount::pay_merchant(0),
            Err(Error::InvalidAmount(0))
        ));
        assert!(PaymentAmount::pay_merchant(RANGE_UPPER_BOUND).is_err());
        assert!(CustomerBalance::try_new(RANGE_UPPER_BOUND).is_err());
        assert!(serde_json::from_str::<PaymentAmount>("0").is_err());
        assert!(serde_json::from_str::<MerchantBalance>(&RANGE_UPPER_BOUND.to_string()).is_err());
        assert_eq!(
            serde_json::from_str::<CustomerBalance>("95").unwrap(),
            CustomerBalance::try_new(95).unwrap()
        );
        assert_eq!(
            PaymentAmount::pay_merchant(5)
                .unwrap()
                .with_fee(2)
                .unwrap()
                .into_inner(),
            7
        );
    }

    #[test]
    fn close_state_differs_from_state_only_in_tag() {
        let mut rng = rng();
        let s = State::new(
            &mut rng,
            channel_id(),
            CustomerBalance::try_new(1).unwrap(),
            MerchantBalance::try_new(2).unwrap(),
        );
        let state_msg = s.to_message();
        let close_msg = s.close_state().to_message();

        assert_eq!(state_msg[0], close_msg[0]);
        assert_ne!(state_msg[1], close_msg[1]);
        assert_eq!(close_msg[1], close_tag());
        assert_eq!(&state_msg[2..], &close_msg[2..]);
    }

    #[test]
    fn channel_ids_bind_every_input() {
        let base = channel_id();
        let other_deposit = ChannelId::new(
            "test channel",
            b"merchant key",
            &[7; 32],
            CustomerBalance::try_new(101).unwrap(),
            MerchantBalance::try_new(10).unwrap(),
        );
        let other_customer = ChannelId::new(
            "test channel",
            b"merchant key",
            &[8; 32],
            CustomerBalance::try_new(100).unwrap(),
            MerchantBalance::try_new(10).unwrap(),
        );
        assert_eq!(base, channel_id());
        assert_ne!(base, other_deposit);
        assert_ne!(base, other_customer);
    }
}
