//! Closing a channel.
//!
//! A [`CustomerCloseMessage`] carries a close state in the clear together with the merchant's
//! signature on it, so anyone holding the [`ChannelToken`] can check it. The merchant can answer
//! a close on a revoked wallet with the secret the customer revealed when paying; see
//! [`Disputable`].

use crate::{
    channel::{ChannelState, ChannelToken},
    merchant::{MerchantWallet, RevocationEvidence},
    record::RevocationRecord,
    revlock::RevocationLock,
    states::*,
    Error, Verification,
};
use serde::{Deserialize, Serialize};

/// The customer's unilateral close of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerCloseMessage {
    close_state: CloseState,
    closing_signature: CloseStateSignature,
}

impl CustomerCloseMessage {
    pub(crate) fn new(close_state: CloseState, closing_signature: CloseStateSignature) -> Self {
        Self {
            close_state,
            closing_signature,
        }
    }

    /// The channel being closed.
    pub fn channel_id(&self) -> ChannelId {
        self.close_state.channel_id
    }

    /// The lock of the wallet being closed on.
    pub fn revocation_lock(&self) -> RevocationLock {
        self.close_state.revocation_lock
    }

    /// Final customer balance claimed.
    pub fn customer_balance(&self) -> CustomerBalance {
        self.close_state.customer_balance
    }

    /// Final merchant balance claimed.
    pub fn merchant_balance(&self) -> MerchantBalance {
        self.close_state.merchant_balance
    }
}

/// Check a close message against the channel's public records.
///
/// Verifies the merchant's signature on the close state, that the message names this channel,
/// and that the balances add up to the deposits.
pub fn verify_close_message(
    channel_token: &ChannelToken,
    channel_state: &ChannelState,
    msg: &CustomerCloseMessage,
) -> Verification {
    let (channel_id, customer_deposit, merchant_deposit) = match channel_state.initialized() {
        Ok(initialized) => initialized,
        Err(_) => return Verification::Failed,
    };
    let token_matches = channel_token.channel_id().ok() == Some(channel_id);

    let total = customer_deposit.into_inner() + merchant_deposit.into_inner();
    let balances_conserved = msg
        .customer_balance()
        .into_inner()
        .checked_add(msg.merchant_balance().into_inner())
        == Some(total);

    let signature_verifies = msg
        .closing_signature
        .verify(channel_token.config(), &msg.close_state)
        .is_verified();

    Verification::from(
        token_matches && msg.channel_id() == channel_id && balances_conserved && signature_verifies,
    )
}

/// A party able to contest a close that uses a revoked wallet.
///
/// Resolving the dispute on the ledger is outside this crate; implementors only decide whether
/// they hold evidence against the close.
pub trait Disputable {
    /// Return the evidence against `close` if it was made from a revoked wallet, or `None` if
    /// the close is on a wallet that was never revoked.
    fn dispute(&self, close: &CustomerCloseMessage) -> Result<Option<RevocationEvidence>, Error>;
}

impl<R: RevocationRecord> Disputable for MerchantWallet<R> {
    fn dispute(&self, close: &CustomerCloseMessage) -> Result<Option<RevocationEvidence>, Error> {
        if self.channel_id() != Some(close.channel_id()) {
            return Err(Error::ParameterMismatch("close message is for another channel"));
        }
        let evidence = self.revocation_evidence(&close.revocation_lock());
        if evidence.is_some() {
            tracing::warn!(
                merchant = %self.name(),
                channel = %close.channel_id(),
                "customer closed on a revoked wallet"
            );
        }
        Ok(evidence)
    }
}
