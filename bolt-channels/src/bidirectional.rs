/*!
The party-facing operations of a bidirectional channel.

An orchestrating caller (an RPC handler, a CLI, a test harness) drives a channel through these
functions in order:

1. [`setup`] creates the public [`ChannelState`].
2. [`init_merchant`] and [`init_customer`] derive each party's wallet and the shared
   [`ChannelToken`].
3. Establish: [`establish_customer_generate_proof`], [`establish_merchant_issue_close_token`],
   [`establish_customer_verify_close_token`], [`establish_merchant_issue_pay_token`] and
   [`establish_customer_final`].
4. Pay, repeated: [`generate_payment_proof`], [`verify_payment_proof`],
   [`generate_revoke_token`], [`verify_revoke_token`] and [`verify_pay_token`].
5. Close: [`customer_close`], checked by anyone with [`verify_close_message`].

Every operation validates its inputs before it mutates anything, and a failed verification
leaves every wallet and record it was given unchanged.
*/
use crate::{
    channel::{ChannelState, ChannelToken, CustomerBinding},
    close::CustomerCloseMessage,
    customer::CustomerWallet,
    merchant::MerchantWallet,
    proofs::{PaymentProof, WalletCommitment},
    record::RevocationRecord,
    CloseToken, CryptoBackend, CustomerBalance, Error, EstablishProof, EstablishProofPublicValues,
    MerchantBalance, PayToken, PaymentAmount, RevokeToken,
};
use rand::RngCore;
use std::time::SystemTime;

pub use crate::close::{verify_close_message, Disputable};

/// Create the public record of a new channel.
pub fn setup(name: &str, third_party_support: bool) -> ChannelState {
    tracing::debug!(channel = name, third_party_support, "channel set up");
    ChannelState::new(name, third_party_support)
}

/// Initialize the merchant: generate keys and parameters, record the merchant's deposit, and
/// produce the channel token the customer will refine.
pub fn init_merchant(
    backend: &mut impl CryptoBackend,
    channel_state: &mut ChannelState,
    deposit_merchant: u64,
    merchant_name: &str,
) -> Result<(ChannelToken, MerchantWallet), Error> {
    let deposit = MerchantBalance::try_new(deposit_merchant)?;
    channel_state.check_open()?;
    if let Some(recorded) = channel_state.merchant_deposit() {
        if recorded != deposit {
            return Err(Error::ParameterMismatch("merchant deposit differs from channel state"));
        }
    }

    let merch_wallet = MerchantWallet::new(backend.rng(), merchant_name, deposit);
    let channel_token = ChannelToken::new(
        channel_state.name(),
        merch_wallet.config().to_customer_config(),
        deposit,
    );
    channel_state.record_merchant_deposit(deposit)?;

    tracing::info!(
        channel = channel_state.name(),
        merchant = merchant_name,
        deposit = deposit_merchant,
        "merchant initialized"
    );
    Ok((channel_token, merch_wallet))
}

/// Initialize the customer: bind the customer's deposit to the channel token, derive the
/// channel id, and create the initial wallet.
pub fn init_customer(
    backend: &mut impl CryptoBackend,
    channel_state: &mut ChannelState,
    channel_token: &mut ChannelToken,
    deposit_customer: u64,
    deposit_merchant: u64,
    customer_name: &str,
) -> Result<CustomerWallet, Error> {
    let customer_deposit = CustomerBalance::try_new(deposit_customer)?;
    let merchant_deposit = MerchantBalance::try_new(deposit_merchant)?;
    channel_state.check_open()?;

    let recorded = channel_state
        .merchant_deposit()
        .ok_or(Error::OutOfOrder("merchant has not initialized"))?;
    if recorded != merchant_deposit || channel_token.merchant_deposit() != merchant_deposit {
        return Err(Error::ParameterMismatch("merchant deposit differs between the parties"));
    }

    let mut customer_id = [0; 32];
    backend.rng().fill_bytes(&mut customer_id);
    let mut refined = channel_token.clone();
    refined.bind_customer(CustomerBinding {
        customer_id,
        deposit: customer_deposit,
    })?;
    let channel_id = refined.channel_id()?;
    if channel_state
        .channel_id()
        .map_or(false, |recorded| recorded != channel_id)
    {
        return Err(Error::ParameterMismatch("channel state is bound to another channel"));
    }

    let cust_wallet = CustomerWallet::new(
        backend.rng(),
        customer_name,
        refined.config().clone(),
        channel_id,
        customer_deposit,
        merchant_deposit,
    );
    channel_state.record_customer(channel_id, customer_deposit)?;
    *channel_token = refined;

    tracing::info!(
        channel = %channel_id,
        customer = customer_name,
        deposit = deposit_customer,
        "customer initialized"
    );
    Ok(cust_wallet)
}

/// Commit to the initial wallet and prove the commitments match the agreed deposits.
pub fn establish_customer_generate_proof(
    backend: &mut impl CryptoBackend,
    channel_token: &ChannelToken,
    cust_wallet: &mut CustomerWallet,
) -> Result<(WalletCommitment, EstablishProof), Error> {
    if channel_token.channel_id()? != cust_wallet.channel_id()
        || channel_token.config() != cust_wallet.config()
    {
        return Err(Error::ParameterMismatch("wallet does not belong to this channel token"));
    }
    let output = cust_wallet.establish_proof(backend.rng())?;
    tracing::debug!(channel = %cust_wallet.channel_id(), "establish proof generated");
    Ok(output)
}

/// Verify the customer's establish proof and issue a close token on the committed close state.
pub fn establish_merchant_issue_close_token<R: RevocationRecord>(
    backend: &mut impl CryptoBackend,
    channel_state: &ChannelState,
    com: &WalletCommitment,
    com_proof: &EstablishProof,
    merch_wallet: &mut MerchantWallet<R>,
) -> Result<CloseToken, Error> {
    channel_state.check_open()?;
    if channel_state.is_established() {
        return Err(Error::OutOfOrder("channel is already established"));
    }
    let (channel_id, customer_balance, merchant_balance) = channel_state.initialized()?;
    if merchant_balance != merch_wallet.deposit() {
        return Err(Error::ParameterMismatch("merchant deposit differs from channel state"));
    }

    let public_values = EstablishProofPublicValues {
        channel_id,
        merchant_balance,
        customer_balance,
    };
    match merch_wallet.initialize(backend, &public_values, com, com_proof) {
        Ok(close_token) => {
            tracing::info!(channel = %channel_id, "close token issued");
            Ok(close_token)
        }
        Err(e) => {
            tracing::warn!(channel = %channel_id, error = %e, "establish request rejected");
            Err(e)
        }
    }
}

/// Issue the initial pay token on the commitment that received the close token.
pub fn establish_merchant_issue_pay_token<R: RevocationRecord>(
    backend: &mut impl CryptoBackend,
    channel_state: &ChannelState,
    com: &WalletCommitment,
    merch_wallet: &mut MerchantWallet<R>,
) -> Result<PayToken, Error> {
    channel_state.check_open()?;
    let (channel_id, _, _) = channel_state.initialized()?;
    if merch_wallet.channel_id() != Some(channel_id) {
        return Err(Error::OutOfOrder("no close token was issued on this channel"));
    }
    let pay_token = merch_wallet.activate(backend, &com.state_commitment)?;
    tracing::info!(channel = %channel_id, "initial pay token issued");
    Ok(pay_token)
}

/// Check the initial close token. `Ok(false)` leaves the wallet waiting for a valid one.
pub fn establish_customer_verify_close_token(
    channel_state: &ChannelState,
    cust_wallet: &mut CustomerWallet,
    close_token: CloseToken,
) -> Result<bool, Error> {
    channel_state.check_open()?;
    let valid = cust_wallet.verify_close_token(close_token)?;
    if !valid {
        tracing::warn!(channel = %cust_wallet.channel_id(), "initial close token is invalid");
    }
    Ok(valid)
}

/// Check the initial pay token and, if it is valid, mark the channel established.
pub fn establish_customer_final(
    channel_state: &mut ChannelState,
    cust_wallet: &mut CustomerWallet,
    pay_token: PayToken,
) -> Result<bool, Error> {
    channel_state.check_open()?;
    if channel_state.is_established() {
        return Err(Error::OutOfOrder("channel is already established"));
    }
    if channel_state.channel_id() != Some(cust_wallet.channel_id()) {
        return Err(Error::ParameterMismatch("wallet does not belong to this channel"));
    }
    if !cust_wallet.activate(pay_token)? {
        tracing::warn!(channel = %cust_wallet.channel_id(), "initial pay token is invalid");
        return Ok(false);
    }
    channel_state.set_established()?;
    tracing::info!(channel = %cust_wallet.channel_id(), "channel established");
    Ok(true)
}

fn check_established(channel_state: &ChannelState) -> Result<(), Error> {
    channel_state.check_open()?;
    if !channel_state.is_established() {
        return Err(Error::OutOfOrder("channel is not established"));
    }
    Ok(())
}

/// Start a payment of `amount` to the merchant. Returns the request for the merchant and the
/// new wallet, which only becomes current once the old one is revoked.
pub fn generate_payment_proof(
    backend: &mut impl CryptoBackend,
    channel_state: &ChannelState,
    cust_wallet: &mut CustomerWallet,
    amount: u64,
) -> Result<(PaymentProof, CustomerWallet), Error> {
    let amount = PaymentAmount::pay_merchant(amount)?;
    check_established(channel_state)?;
    let total = amount.with_fee(channel_state.fee())?;

    let output = cust_wallet.start_payment(backend.rng(), amount, total)?;
    tracing::debug!(
        channel = %cust_wallet.channel_id(),
        version = cust_wallet.version(),
        amount = amount.into_inner(),
        "payment started"
    );
    Ok(output)
}

/// Verify a payment request and issue a close token on the new wallet.
pub fn verify_payment_proof<R: RevocationRecord>(
    backend: &mut impl CryptoBackend,
    channel_state: &ChannelState,
    payment_proof: &PaymentProof,
    merch_wallet: &mut MerchantWallet<R>,
) -> Result<CloseToken, Error> {
    check_established(channel_state)?;
    if merch_wallet.channel_id() != channel_state.channel_id() {
        return Err(Error::ParameterMismatch("merchant wallet does not serve this channel"));
    }
    let total = payment_proof.amount.with_fee(channel_state.fee())?;

    match merch_wallet.allow_payment(backend, payment_proof, total, SystemTime::now()) {
        Ok(close_token) => {
            tracing::info!(
                channel = channel_state.name(),
                amount = payment_proof.amount.into_inner(),
                "payment approved"
            );
            Ok(close_token)
        }
        Err(e) => {
            tracing::warn!(channel = channel_state.name(), error = %e, "payment rejected");
            Err(e)
        }
    }
}

/// Verify the close token on the new wallet, make it current, and revoke the old one.
///
/// On success `cust_wallet` holds the new wallet and `new_cust_wallet` the revoked one.
pub fn generate_revoke_token(
    channel_state: &ChannelState,
    cust_wallet: &mut CustomerWallet,
    new_cust_wallet: &mut CustomerWallet,
    close_token: CloseToken,
) -> Result<RevokeToken, Error> {
    check_established(channel_state)?;
    let revoke_token = cust_wallet.lock(new_cust_wallet, close_token)?;
    tracing::debug!(
        channel = %cust_wallet.channel_id(),
        version = cust_wallet.version(),
        "previous wallet revoked"
    );
    Ok(revoke_token)
}

/// Record the revocation of the old wallet and issue the pay token for the new one.
pub fn verify_revoke_token<R: RevocationRecord>(
    backend: &mut impl CryptoBackend,
    revoke_token: &RevokeToken,
    merch_wallet: &mut MerchantWallet<R>,
) -> Result<PayToken, Error> {
    match merch_wallet.revoke(backend, revoke_token, SystemTime::now()) {
        Ok(pay_token) => {
            tracing::info!(merchant = merch_wallet.name(), "payment completed");
            Ok(pay_token)
        }
        Err(e) => {
            tracing::warn!(merchant = merch_wallet.name(), error = %e, "revocation rejected");
            Err(e)
        }
    }
}

/// Check the pay token that completes a payment. `Ok(false)` leaves the wallet locked.
pub fn verify_pay_token(
    channel_state: &ChannelState,
    cust_wallet: &mut CustomerWallet,
    pay_token: PayToken,
) -> Result<bool, Error> {
    check_established(channel_state)?;
    let valid = cust_wallet.unlock(pay_token)?;
    if valid {
        tracing::debug!(
            channel = %cust_wallet.channel_id(),
            version = cust_wallet.version(),
            "wallet ready"
        );
    } else {
        tracing::warn!(channel = %cust_wallet.channel_id(), "pay token is invalid");
    }
    Ok(valid)
}

/// Close the channel unilaterally from the customer's current wallet.
pub fn customer_close(
    backend: &mut impl CryptoBackend,
    channel_state: &mut ChannelState,
    cust_wallet: &mut CustomerWallet,
) -> Result<CustomerCloseMessage, Error> {
    channel_state.check_open()?;
    if channel_state.channel_id() != Some(cust_wallet.channel_id()) {
        return Err(Error::ParameterMismatch("wallet does not belong to this channel"));
    }
    let msg = cust_wallet.close(backend.rng())?;
    channel_state.set_closed();
    tracing::info!(
        channel = %cust_wallet.channel_id(),
        customer_balance = msg.customer_balance().into_inner(),
        merchant_balance = msg.merchant_balance().into_inner(),
        "customer closed channel"
    );
    Ok(msg)
}
