#![allow(unused)]
use bolt_channels::{
    bidirectional,
    channel::{ChannelState, ChannelToken},
    customer::CustomerWallet,
    merchant::MerchantWallet,
    record::RevocationRecord,
    Bls12Backend, CryptoBackend,
};

pub const CUSTOMER_DEPOSIT: u64 = 100;
pub const MERCHANT_DEPOSIT: u64 = 10;

// Seeded backend for replicable tests. Set RUST_LOG to see the protocol trace.
pub fn backend() -> Bls12Backend {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    Bls12Backend::from_seed(*b"NEVER USE THIS FOR ANYTHING REAL")
}

pub struct Channel<R = bolt_channels::record::MemoryRevocationRecord> {
    pub state: ChannelState,
    pub token: ChannelToken,
    pub customer: CustomerWallet,
    pub merchant: MerchantWallet<R>,
}

/// Set up and initialize a channel, without establishing it.
pub fn initialized(backend: &mut impl CryptoBackend, fee: u64) -> Channel {
    let mut state = bidirectional::setup("test channel", false);
    state.set_channel_fee(fee).unwrap();
    let (mut token, merchant) =
        bidirectional::init_merchant(backend, &mut state, MERCHANT_DEPOSIT, "merchant").unwrap();
    let customer = bidirectional::init_customer(
        backend,
        &mut state,
        &mut token,
        CUSTOMER_DEPOSIT,
        MERCHANT_DEPOSIT,
        "customer",
    )
    .unwrap();
    Channel {
        state,
        token,
        customer,
        merchant,
    }
}

/// Run Establish on an initialized channel.
pub fn establish<R: RevocationRecord>(backend: &mut impl CryptoBackend, channel: &mut Channel<R>) {
    let (com, proof) =
        bidirectional::establish_customer_generate_proof(backend, &channel.token, &mut channel.customer)
            .unwrap();
    let close_token = bidirectional::establish_merchant_issue_close_token(
        backend,
        &channel.state,
        &com,
        &proof,
        &mut channel.merchant,
    )
    .unwrap();
    assert!(bidirectional::establish_customer_verify_close_token(
        &channel.state,
        &mut channel.customer,
        close_token
    )
    .unwrap());
    let pay_token = bidirectional::establish_merchant_issue_pay_token(
        backend,
        &channel.state,
        &com,
        &mut channel.merchant,
    )
    .unwrap();
    assert!(
        bidirectional::establish_customer_final(&mut channel.state, &mut channel.customer, pay_token)
            .unwrap()
    );
}

pub fn established(backend: &mut impl CryptoBackend, fee: u64) -> Channel {
    let mut channel = initialized(backend, fee);
    establish(backend, &mut channel);
    channel
}

/// Run a full payment. Returns the revoked wallet.
pub fn pay<R: RevocationRecord>(
    backend: &mut impl CryptoBackend,
    channel: &mut Channel<R>,
    amount: u64,
) -> CustomerWallet {
    let (payment_proof, mut new_wallet) = bidirectional::generate_payment_proof(
        backend,
        &channel.state,
        &mut channel.customer,
        amount,
    )
    .unwrap();
    let close_token = bidirectional::verify_payment_proof(
        backend,
        &channel.state,
        &payment_proof,
        &mut channel.merchant,
    )
    .unwrap();
    let revoke_token = bidirectional::generate_revoke_token(
        &channel.state,
        &mut channel.customer,
        &mut new_wallet,
        close_token,
    )
    .unwrap();
    let pay_token =
        bidirectional::verify_revoke_token(backend, &revoke_token, &mut channel.merchant).unwrap();
    assert!(bidirectional::verify_pay_token(&channel.state, &mut channel.customer, pay_token).unwrap());
    new_wallet
}
