//! Mutual exclusion and deadlines around protocol rounds.
//!
//! The protocol functions take `&mut` wallets, so one wallet is never used by two calls at once.
//! A merchant serving many channels keeps each channel behind its own lock in [`ChannelLocks`].
//! A customer drives a payment through a [`PayRound`], which gives up on the round once its
//! deadline passes and puts the wallet back the way it was.

use crate::{
    bidirectional,
    channel::ChannelState,
    customer::{CustomerWallet, WalletStatus},
    proofs::PaymentProof,
    ChannelId, CloseToken, CryptoBackend, Error, PayToken, RevokeToken,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::{Duration, Instant},
};

/// Per-channel locks for state shared across threads.
#[derive(Debug)]
pub struct ChannelLocks<T> {
    channels: RwLock<HashMap<ChannelId, Arc<Mutex<T>>>>,
}

impl<T> Default for ChannelLocks<T> {
    fn default() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> ChannelLocks<T> {
    /// Create an empty set of channels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel. Fails if the channel is already registered.
    pub fn insert(&self, channel_id: ChannelId, value: T) -> Result<(), Error> {
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if channels.contains_key(&channel_id) {
            return Err(Error::ParameterMismatch("channel is already registered"));
        }
        let _ = channels.insert(channel_id, Arc::new(Mutex::new(value)));
        Ok(())
    }

    /// Get the lock of a channel.
    pub fn get(&self, channel_id: &ChannelId) -> Option<Arc<Mutex<T>>> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel_id)
            .cloned()
    }

    /// Run `f` while holding the lock of a channel. Returns `None` if the channel is unknown.
    ///
    /// Other channels stay available while `f` runs.
    pub fn with_channel<U>(&self, channel_id: &ChannelId, f: impl FnOnce(&mut T) -> U) -> Option<U> {
        let channel = self.get(channel_id)?;
        let mut guard = channel.lock().unwrap_or_else(PoisonError::into_inner);
        Some(f(&mut guard))
    }

    /// Unregister a channel, for example after it closed.
    pub fn remove(&self, channel_id: &ChannelId) -> Option<Arc<Mutex<T>>> {
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(channel_id)
    }

    /// Number of registered channels.
    pub fn len(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no channel is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One payment driven by the customer, bounded by a deadline.
///
/// Until the old wallet is revoked, an expired or dropped round returns the wallet to
/// [`WalletStatus::Ready`] and discards the new wallet. Once [`PayRound::lock`] succeeds the
/// revocation is out and cannot be taken back: an expired round then leaves the wallet
/// [`WalletStatus::Locked`], which can still close on the new balances.
#[derive(Debug)]
pub struct PayRound<'a> {
    wallet: &'a mut CustomerWallet,
    new_wallet: Option<CustomerWallet>,
    deadline: Instant,
}

impl<'a> PayRound<'a> {
    /// Start a payment of `amount` that must complete within `timeout`.
    pub fn start(
        backend: &mut impl CryptoBackend,
        channel_state: &ChannelState,
        wallet: &'a mut CustomerWallet,
        amount: u64,
        timeout: Duration,
    ) -> Result<(Self, PaymentProof), Error> {
        let (payment_proof, new_wallet) =
            bidirectional::generate_payment_proof(backend, channel_state, wallet, amount)?;
        Ok((
            Self {
                wallet,
                new_wallet: Some(new_wallet),
                deadline: Instant::now() + timeout,
            },
            payment_proof,
        ))
    }

    /// When the round expires.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    fn check_deadline(&mut self) -> Result<(), Error> {
        if Instant::now() > self.deadline {
            self.abandon();
            return Err(Error::RoundExpired);
        }
        Ok(())
    }

    fn abandon(&mut self) {
        if self.new_wallet.take().is_some() && self.wallet.status() == WalletStatus::PaymentInFlight
        {
            // Only fails when no payment is in flight, which was just checked.
            let _ = self.wallet.abort_payment();
        }
    }

    /// Verify the close token on the new wallet and revoke the old one.
    pub fn lock(
        &mut self,
        channel_state: &ChannelState,
        close_token: CloseToken,
    ) -> Result<RevokeToken, Error> {
        self.check_deadline()?;
        let new_wallet = self
            .new_wallet
            .as_mut()
            .ok_or(Error::OutOfOrder("payment round is already locked"))?;
        let revoke_token =
            bidirectional::generate_revoke_token(channel_state, self.wallet, new_wallet, close_token)?;
        // `new_wallet` now holds the revoked wallet.
        self.new_wallet = None;
        Ok(revoke_token)
    }

    /// Complete the round with the pay token.
    pub fn unlock(
        mut self,
        channel_state: &ChannelState,
        pay_token: PayToken,
    ) -> Result<bool, Error> {
        if self.new_wallet.is_some() {
            return Err(Error::OutOfOrder("payment round is not locked"));
        }
        self.check_deadline()?;
        bidirectional::verify_pay_token(channel_state, self.wallet, pay_token)
    }

    /// Give up on the round.
    pub fn abort(mut self) {
        self.abandon();
    }
}

impl Drop for PayRound<'_> {
    fn drop(&mut self) {
        if self.new_wallet.is_some() {
            tracing::debug!(
                channel = %self.wallet.channel_id(),
                "pay round dropped before the close token arrived"
            );
        }
        self.abandon();
    }
}
