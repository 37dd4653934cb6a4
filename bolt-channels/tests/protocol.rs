mod test_utils;

use bolt_channels::{
    bidirectional::{self, Disputable},
    customer::WalletStatus,
    merchant::{self, MerchantStatus},
    record::{FileRevocationRecord, RevocationRecord},
    Bls12Backend, CryptoBackend, Error, PayProof, PayProofPublicValues, Verification,
};
use rand::rngs::StdRng;
use std::time::{Duration, SystemTime};
use test_utils::*;

#[test]
fn pay_and_close() {
    let mut backend = backend();
    let mut channel = established(&mut backend, 0);
    assert_eq!(channel.customer.status(), WalletStatus::Ready);
    assert_eq!(channel.merchant.status(), MerchantStatus::PayTokenIssued);

    let _ = pay(&mut backend, &mut channel, 5);
    assert_eq!(channel.customer.customer_balance().into_inner(), 95);
    assert_eq!(channel.customer.merchant_balance().into_inner(), 15);
    assert_eq!(channel.customer.version(), 1);
    assert_eq!(channel.merchant.revocations().len(), 1);

    let _ = pay(&mut backend, &mut channel, 20);
    let close = bidirectional::customer_close(&mut backend, &mut channel.state, &mut channel.customer)
        .unwrap();
    assert_eq!(close.customer_balance().into_inner(), 75);
    assert_eq!(close.merchant_balance().into_inner(), 35);
    assert!(
        bidirectional::verify_close_message(&channel.token, &channel.state, &close).is_verified()
    );
    assert!(channel.state.is_closed());
    assert_eq!(channel.customer.status(), WalletStatus::Closed);

    // Nothing happens on a closed channel.
    assert!(matches!(
        bidirectional::generate_payment_proof(&mut backend, &channel.state, &mut channel.customer, 1),
        Err(Error::OutOfOrder(_))
    ));
}

#[test]
fn close_before_any_payment_returns_deposits() {
    let mut backend = backend();
    let mut channel = established(&mut backend, 0);
    let close = bidirectional::customer_close(&mut backend, &mut channel.state, &mut channel.customer)
        .unwrap();
    assert_eq!(close.customer_balance().into_inner(), CUSTOMER_DEPOSIT);
    assert_eq!(close.merchant_balance().into_inner(), MERCHANT_DEPOSIT);
    assert!(
        bidirectional::verify_close_message(&channel.token, &channel.state, &close).is_verified()
    );
    assert_eq!(channel.merchant.dispute(&close).unwrap(), None);
}

#[test]
fn fee_is_charged_to_the_customer() {
    let mut backend = backend();
    let mut channel = established(&mut backend, 2);
    let _ = pay(&mut backend, &mut channel, 5);
    assert_eq!(channel.customer.customer_balance().into_inner(), 93);
    assert_eq!(channel.customer.merchant_balance().into_inner(), 17);
}

#[test]
fn stale_close_is_disputed() {
    let mut backend = backend();
    let mut channel = established(&mut backend, 0);
    let mut revoked = pay(&mut backend, &mut channel, 5);
    assert_eq!(revoked.status(), WalletStatus::Revoked);
    assert!(!revoked.can_close());

    // A revoked wallet refuses to close.
    let mut channel_state = channel.state.clone();
    assert!(matches!(
        bidirectional::customer_close(&mut backend, &mut channel_state, &mut revoked),
        Err(Error::OutOfOrder(_))
    ));

    // A customer who kept an old copy of the wallet can still produce a close message for it,
    // and the merchant answers with the revealed secret.
    let mut backend = test_utils::backend();
    let mut channel = established(&mut backend, 0);
    let mut stale = channel.customer.clone();
    let _ = pay(&mut backend, &mut channel, 5);

    let mut channel_state = channel.state.clone();
    let close = bidirectional::customer_close(&mut backend, &mut channel_state, &mut stale).unwrap();
    assert!(bidirectional::verify_close_message(&channel.token, &channel_state, &close).is_verified());
    assert_eq!(close.customer_balance().into_inner(), CUSTOMER_DEPOSIT);

    let evidence = channel.merchant.dispute(&close).unwrap().unwrap();
    assert_eq!(evidence.revocation_lock, close.revocation_lock());
    assert!(evidence
        .revocation_lock
        .verify(&evidence.revocation_secret)
        .is_verified());

    // The current wallet closes cleanly.
    let close = bidirectional::customer_close(&mut backend, &mut channel.state, &mut channel.customer)
        .unwrap();
    assert_eq!(channel.merchant.dispute(&close).unwrap(), None);
}

#[test]
fn close_message_for_another_channel_is_rejected() {
    let mut backend = backend();
    let mut first = established(&mut backend, 0);
    let second = established(&mut backend, 0);

    let close =
        bidirectional::customer_close(&mut backend, &mut first.state, &mut first.customer).unwrap();
    assert_eq!(
        bidirectional::verify_close_message(&second.token, &second.state, &close),
        Verification::Failed
    );
    assert!(matches!(
        second.merchant.dispute(&close),
        Err(Error::ParameterMismatch(_))
    ));
}

#[test]
fn establish_steps_must_run_in_order() {
    let mut backend = backend();
    let mut channel = initialized(&mut backend, 0);
    let (com, proof) = bidirectional::establish_customer_generate_proof(
        &mut backend,
        &channel.token,
        &mut channel.customer,
    )
    .unwrap();

    // No close token was issued yet.
    assert!(matches!(
        bidirectional::establish_merchant_issue_pay_token(
            &mut backend,
            &channel.state,
            &com,
            &mut channel.merchant
        ),
        Err(Error::OutOfOrder(_))
    ));

    let close_token = bidirectional::establish_merchant_issue_close_token(
        &mut backend,
        &channel.state,
        &com,
        &proof,
        &mut channel.merchant,
    )
    .unwrap();
    let pay_token = bidirectional::establish_merchant_issue_pay_token(
        &mut backend,
        &channel.state,
        &com,
        &mut channel.merchant,
    )
    .unwrap();

    // The customer has not checked the close token.
    assert!(matches!(
        bidirectional::establish_customer_final(&mut channel.state, &mut channel.customer, pay_token),
        Err(Error::OutOfOrder(_))
    ));
    assert!(!channel.state.is_established());

    assert!(bidirectional::establish_customer_verify_close_token(
        &channel.state,
        &mut channel.customer,
        close_token
    )
    .unwrap());
    assert!(
        bidirectional::establish_customer_final(&mut channel.state, &mut channel.customer, pay_token)
            .unwrap()
    );
    assert!(channel.state.is_established());
}

#[test]
fn only_one_initial_wallet_gets_a_close_token() {
    let mut backend = backend();
    let mut channel = initialized(&mut backend, 0);
    let mut second = channel.customer.clone();
    let (com, proof) = bidirectional::establish_customer_generate_proof(
        &mut backend,
        &channel.token,
        &mut channel.customer,
    )
    .unwrap();
    let (other_com, other_proof) =
        bidirectional::establish_customer_generate_proof(&mut backend, &channel.token, &mut second)
            .unwrap();
    assert_ne!(com, other_com);

    let close_token = bidirectional::establish_merchant_issue_close_token(
        &mut backend,
        &channel.state,
        &com,
        &proof,
        &mut channel.merchant,
    )
    .unwrap();

    // A valid proof on other commitments for the same channel and balances is refused.
    assert!(matches!(
        bidirectional::establish_merchant_issue_close_token(
            &mut backend,
            &channel.state,
            &other_com,
            &other_proof,
            &mut channel.merchant,
        ),
        Err(Error::OutOfOrder(_))
    ));
    assert_eq!(channel.merchant.status(), MerchantStatus::CloseTokenIssued(com));

    // Resending the first request gets the same token back.
    let resent = bidirectional::establish_merchant_issue_close_token(
        &mut backend,
        &channel.state,
        &com,
        &proof,
        &mut channel.merchant,
    )
    .unwrap();
    assert_eq!(resent, close_token);
    assert_eq!(channel.merchant.close_tokens_issued(), 1);

    // The refused wallet can never close, and the accepted one establishes normally.
    assert!(!second.can_close());
    assert!(!bidirectional::establish_customer_verify_close_token(
        &channel.state,
        &mut second,
        close_token
    )
    .unwrap());
    assert!(bidirectional::establish_customer_verify_close_token(
        &channel.state,
        &mut channel.customer,
        close_token
    )
    .unwrap());
    let pay_token = bidirectional::establish_merchant_issue_pay_token(
        &mut backend,
        &channel.state,
        &com,
        &mut channel.merchant,
    )
    .unwrap();
    assert!(
        bidirectional::establish_customer_final(&mut channel.state, &mut channel.customer, pay_token)
            .unwrap()
    );

    // Nor is it answered once the channel is established.
    assert!(matches!(
        bidirectional::establish_merchant_issue_close_token(
            &mut backend,
            &channel.state,
            &other_com,
            &other_proof,
            &mut channel.merchant,
        ),
        Err(Error::OutOfOrder(_))
    ));
}

#[test]
fn establish_proof_for_another_channel_is_rejected() {
    let mut backend = backend();
    let mut channel = initialized(&mut backend, 0);
    let mut other = initialized(&mut backend, 0);
    let (com, proof) = bidirectional::establish_customer_generate_proof(
        &mut backend,
        &other.token,
        &mut other.customer,
    )
    .unwrap();

    // A proof for another channel does not verify under this channel's public values.
    assert!(matches!(
        bidirectional::establish_merchant_issue_close_token(
            &mut backend,
            &channel.state,
            &com,
            &proof,
            &mut channel.merchant,
        ),
        Err(Error::InvalidProof(_))
    ));
    assert_eq!(channel.merchant.status(), MerchantStatus::Created);
}

#[test]
fn mismatched_merchant_deposit_is_fatal() {
    let mut backend = backend();
    let mut state = bidirectional::setup("deposits", false);
    let (mut token, _) =
        bidirectional::init_merchant(&mut backend, &mut state, MERCHANT_DEPOSIT, "merchant").unwrap();
    let err = bidirectional::init_customer(
        &mut backend,
        &mut state,
        &mut token,
        CUSTOMER_DEPOSIT,
        MERCHANT_DEPOSIT + 1,
        "customer",
    )
    .unwrap_err();
    assert!(matches!(err, Error::ParameterMismatch(_)));
    assert!(err.is_fatal());
    assert_eq!(state.channel_id(), None);
    assert_eq!(token.customer(), None);
}

#[test]
fn payments_are_validated() {
    let mut backend = backend();
    let mut channel = established(&mut backend, 0);
    let nonce = channel.customer.nonce();

    assert!(matches!(
        bidirectional::generate_payment_proof(&mut backend, &channel.state, &mut channel.customer, 0),
        Err(Error::InvalidAmount(0))
    ));
    assert!(matches!(
        bidirectional::generate_payment_proof(
            &mut backend,
            &channel.state,
            &mut channel.customer,
            CUSTOMER_DEPOSIT + 1
        ),
        Err(Error::InsufficientBalance {
            balance: CUSTOMER_DEPOSIT,
            amount,
        }) if amount == CUSTOMER_DEPOSIT + 1
    ));
    assert_eq!(channel.customer.status(), WalletStatus::Ready);
    assert_eq!(channel.customer.version(), 0);
    assert_eq!(channel.customer.nonce(), nonce);
    assert_eq!(channel.customer.customer_balance().into_inner(), CUSTOMER_DEPOSIT);

    // The whole balance can be spent.
    let _ = pay(&mut backend, &mut channel, CUSTOMER_DEPOSIT);
    assert_eq!(channel.customer.customer_balance().into_inner(), 0);
    assert!(matches!(
        bidirectional::generate_payment_proof(&mut backend, &channel.state, &mut channel.customer, 1),
        Err(Error::InsufficientBalance { .. })
    ));
}

#[test]
fn revoked_wallet_is_inert() {
    let mut backend = backend();
    let mut channel = established(&mut backend, 0);
    let (payment_proof, mut revoked) = bidirectional::generate_payment_proof(
        &mut backend,
        &channel.state,
        &mut channel.customer,
        5,
    )
    .unwrap();
    let close_token = bidirectional::verify_payment_proof(
        &mut backend,
        &channel.state,
        &payment_proof,
        &mut channel.merchant,
    )
    .unwrap();
    let revoke_token = bidirectional::generate_revoke_token(
        &channel.state,
        &mut channel.customer,
        &mut revoked,
        close_token,
    )
    .unwrap();
    let pay_token =
        bidirectional::verify_revoke_token(&mut backend, &revoke_token, &mut channel.merchant)
            .unwrap();
    assert_eq!(revoked.status(), WalletStatus::Revoked);

    // None of the tokens of the round it was retired in bring it back.
    assert!(matches!(
        bidirectional::verify_pay_token(&channel.state, &mut revoked, pay_token),
        Err(Error::OutOfOrder(_))
    ));
    assert!(matches!(
        bidirectional::establish_customer_verify_close_token(
            &channel.state,
            &mut revoked,
            close_token
        ),
        Err(Error::OutOfOrder(_))
    ));
    assert!(matches!(
        bidirectional::generate_payment_proof(&mut backend, &channel.state, &mut revoked, 1),
        Err(Error::OutOfOrder(_))
    ));
    assert_eq!(revoked.status(), WalletStatus::Revoked);
    assert!(!revoked.can_close());

    // The current wallet is unaffected.
    assert!(
        bidirectional::verify_pay_token(&channel.state, &mut channel.customer, pay_token).unwrap()
    );
    assert_eq!(channel.customer.customer_balance().into_inner(), 95);
}

#[test]
fn payment_before_establish_is_out_of_order() {
    let mut backend = backend();
    let mut channel = initialized(&mut backend, 0);
    assert!(matches!(
        bidirectional::generate_payment_proof(&mut backend, &channel.state, &mut channel.customer, 5),
        Err(Error::OutOfOrder(_))
    ));
}

#[test]
fn aborted_payment_leaves_wallet_usable() {
    let mut backend = backend();
    let mut channel = established(&mut backend, 0);
    let (payment_proof, _) = bidirectional::generate_payment_proof(
        &mut backend,
        &channel.state,
        &mut channel.customer,
        5,
    )
    .unwrap();
    assert_eq!(channel.customer.status(), WalletStatus::PaymentInFlight);

    // A second payment cannot start while one is in flight.
    assert!(matches!(
        bidirectional::generate_payment_proof(&mut backend, &channel.state, &mut channel.customer, 1),
        Err(Error::OutOfOrder(_))
    ));

    channel.customer.abort_payment().unwrap();
    assert_eq!(channel.customer.status(), WalletStatus::Ready);
    assert_eq!(channel.customer.customer_balance().into_inner(), CUSTOMER_DEPOSIT);

    // The merchant never saw the request, so paying again from the same wallet works.
    assert!(!channel.merchant.is_nonce_spent(&payment_proof.nonce));
    let _ = pay(&mut backend, &mut channel, 5);
    assert_eq!(channel.customer.customer_balance().into_inner(), 95);
    assert!(channel.merchant.is_nonce_spent(&payment_proof.nonce));
}

#[test]
fn replayed_payment_proof_is_rejected() {
    let mut backend = backend();
    let mut channel = established(&mut backend, 0);
    let (payment_proof, mut new_wallet) = bidirectional::generate_payment_proof(
        &mut backend,
        &channel.state,
        &mut channel.customer,
        5,
    )
    .unwrap();
    let close_token = bidirectional::verify_payment_proof(
        &mut backend,
        &channel.state,
        &payment_proof,
        &mut channel.merchant,
    )
    .unwrap();
    assert!(channel.merchant.is_nonce_spent(&payment_proof.nonce));

    assert!(matches!(
        bidirectional::verify_payment_proof(
            &mut backend,
            &channel.state,
            &payment_proof,
            &mut channel.merchant
        ),
        Err(Error::RevocationConflict(_))
    ));
    assert_eq!(channel.merchant.pending_payments(), 1);

    let revoke_token = bidirectional::generate_revoke_token(
        &channel.state,
        &mut channel.customer,
        &mut new_wallet,
        close_token,
    )
    .unwrap();
    let pay_token =
        bidirectional::verify_revoke_token(&mut backend, &revoke_token, &mut channel.merchant)
            .unwrap();

    // The same revocation cannot buy a second pay token.
    assert!(matches!(
        bidirectional::verify_revoke_token(&mut backend, &revoke_token, &mut channel.merchant),
        Err(Error::RevocationConflict(_))
    ));
    assert_eq!(channel.merchant.pay_tokens_issued(), 2);

    assert!(
        bidirectional::verify_pay_token(&channel.state, &mut channel.customer, pay_token).unwrap()
    );
}

#[test]
fn tampered_payment_proof_is_rejected() {
    let mut backend = backend();
    let mut channel = established(&mut backend, 0);
    let (mut payment_proof, _) = bidirectional::generate_payment_proof(
        &mut backend,
        &channel.state,
        &mut channel.customer,
        5,
    )
    .unwrap();

    // Claiming a bigger payment than the one proven.
    payment_proof.amount = bolt_channels::PaymentAmount::pay_merchant(50).unwrap();
    assert!(matches!(
        bidirectional::verify_payment_proof(
            &mut backend,
            &channel.state,
            &payment_proof,
            &mut channel.merchant
        ),
        Err(Error::InvalidProof(_))
    ));
    assert!(!channel.merchant.is_nonce_spent(&payment_proof.nonce));
    assert_eq!(channel.merchant.pending_payments(), 0);
}

#[test]
fn revocation_after_timeout_is_rejected() {
    let mut backend = backend();
    let mut channel = established(&mut backend, 0);
    channel.merchant.config_mut().pending_payment_timeout = Duration::from_secs(0);

    let (payment_proof, mut new_wallet) = bidirectional::generate_payment_proof(
        &mut backend,
        &channel.state,
        &mut channel.customer,
        5,
    )
    .unwrap();
    let close_token = bidirectional::verify_payment_proof(
        &mut backend,
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
    std::thread::sleep(Duration::from_millis(5));

    assert!(matches!(
        bidirectional::verify_revoke_token(&mut backend, &revoke_token, &mut channel.merchant),
        Err(Error::RevocationConflict(_))
    ));
    assert_eq!(channel.merchant.pending_payments(), 0);
    assert!(channel.merchant.revocations().is_empty());

    // The customer is locked on the new wallet, which can still close.
    assert_eq!(channel.customer.status(), WalletStatus::Locked);
    assert!(channel.customer.can_close());
}

#[test]
fn pending_payments_expire() {
    let mut backend = backend();
    let mut channel = established(&mut backend, 0);
    let (payment_proof, _) = bidirectional::generate_payment_proof(
        &mut backend,
        &channel.state,
        &mut channel.customer,
        5,
    )
    .unwrap();
    let _ = bidirectional::verify_payment_proof(
        &mut backend,
        &channel.state,
        &payment_proof,
        &mut channel.merchant,
    )
    .unwrap();
    assert_eq!(channel.merchant.pending_payments(), 1);

    assert_eq!(channel.merchant.expire_pending_payments(SystemTime::now()), 0);
    let later = SystemTime::now() + merchant::DEFAULT_PENDING_PAYMENT_TIMEOUT * 2;
    assert_eq!(channel.merchant.expire_pending_payments(later), 1);
    assert_eq!(channel.merchant.pending_payments(), 0);
    assert!(channel.merchant.is_nonce_spent(&payment_proof.nonce));
}

/// Wraps a backend and rejects every pay proof.
struct RejectingBackend(Bls12Backend);

impl CryptoBackend for RejectingBackend {
    type Rng = StdRng;

    fn rng(&mut self) -> &mut StdRng {
        self.0.rng()
    }

    fn verify_pay_proof(
        &self,
        _config: &merchant::Config,
        _proof: &PayProof,
        _public_values: &PayProofPublicValues,
    ) -> Verification {
        Verification::Failed
    }
}

#[test]
fn backend_rejection_leaves_merchant_unchanged() {
    let mut backend = RejectingBackend(backend());
    let mut channel = established(&mut backend, 0);
    let (payment_proof, _) = bidirectional::generate_payment_proof(
        &mut backend,
        &channel.state,
        &mut channel.customer,
        5,
    )
    .unwrap();
    assert!(matches!(
        bidirectional::verify_payment_proof(
            &mut backend,
            &channel.state,
            &payment_proof,
            &mut channel.merchant
        ),
        Err(Error::InvalidProof(_))
    ));
    assert_eq!(channel.merchant.pending_payments(), 0);
    assert_eq!(channel.merchant.close_tokens_issued(), 1);

    // The customer can give up and stay ready.
    channel.customer.abort_payment().unwrap();
    assert_eq!(channel.customer.status(), WalletStatus::Ready);
}

#[test]
fn revocations_persist_to_file() {
    let path = std::env::temp_dir().join(format!("bolt-protocol-{}.rev", rand::random::<u64>()));
    let mut backend = backend();
    let channel = initialized(&mut backend, 0);
    let merchant = channel
        .merchant
        .with_revocation_record(FileRevocationRecord::open(&path).unwrap())
        .unwrap();
    let mut channel = test_utils::Channel {
        state: channel.state,
        token: channel.token,
        customer: channel.customer,
        merchant,
    };
    establish(&mut backend, &mut channel);

    let revoked = pay(&mut backend, &mut channel, 5);
    let _ = pay(&mut backend, &mut channel, 5);

    let reopened = FileRevocationRecord::open(&path).unwrap();
    assert!(reopened.contains(&revoked.revocation_lock()));
    assert!(reopened.get(&revoked.revocation_lock()).is_some());
    assert!(!reopened.contains(&channel.customer.revocation_lock()));

    std::fs::remove_file(&path).unwrap();
}
