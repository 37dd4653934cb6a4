//! Public records shared by both parties of a channel.

use crate::{customer, states::*, Error};
use serde::{Deserialize, Serialize};

/// Public parameters and status of one channel instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelState {
    name: String,
    third_party_support: bool,
    merchant_deposit: Option<MerchantBalance>,
    customer_deposit: Option<CustomerBalance>,
    channel_id: Option<ChannelId>,
    fee: u64,
    established: bool,
    closed: bool,
}

impl ChannelState {
    /// Create a fresh channel record.
    pub fn new(name: &str, third_party_support: bool) -> Self {
        Self {
            name: name.to_string(),
            third_party_support,
            merchant_deposit: None,
            customer_deposit: None,
            channel_id: None,
            fee: 0,
            established: false,
            closed: false,
        }
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether third-party payments were requested. Recorded but not used by this protocol.
    pub fn third_party_support(&self) -> bool {
        self.third_party_support
    }

    /// The merchant's deposit, once the merchant has initialized.
    pub fn merchant_deposit(&self) -> Option<MerchantBalance> {
        self.merchant_deposit
    }

    /// The customer's deposit, once the customer has initialized.
    pub fn customer_deposit(&self) -> Option<CustomerBalance> {
        self.customer_deposit
    }

    /// The channel identifier, once the customer has initialized.
    pub fn channel_id(&self) -> Option<ChannelId> {
        self.channel_id
    }

    /// Fee the merchant charges on every payment.
    pub fn fee(&self) -> u64 {
        self.fee
    }

    /// Whether Establish has completed.
    pub fn is_established(&self) -> bool {
        self.established
    }

    /// Whether the channel was closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Set the per-payment fee. Only allowed before the channel is established.
    pub fn set_channel_fee(&mut self, fee: u64) -> Result<(), Error> {
        self.check_open()?;
        if self.established {
            return Err(Error::OutOfOrder("fee changed after establishment"));
        }
        self.fee = fee;
        Ok(())
    }

    pub(crate) fn check_open(&self) -> Result<(), Error> {
        if self.closed {
            Err(Error::OutOfOrder("channel is closed"))
        } else {
            Ok(())
        }
    }

    /// The channel id and deposits, or `OutOfOrder` if Init has not completed.
    pub(crate) fn initialized(
        &self,
    ) -> Result<(ChannelId, CustomerBalance, MerchantBalance), Error> {
        match (self.channel_id, self.customer_deposit, self.merchant_deposit) {
            (Some(channel_id), Some(customer_deposit), Some(merchant_deposit)) => {
                Ok((channel_id, customer_deposit, merchant_deposit))
            }
            _ => Err(Error::OutOfOrder("channel is not initialized")),
        }
    }

    pub(crate) fn record_merchant_deposit(&mut self, deposit: MerchantBalance) -> Result<(), Error> {
        self.check_open()?;
        match self.merchant_deposit {
            Some(recorded) if recorded != deposit => {
                Err(Error::ParameterMismatch("merchant deposit differs from channel state"))
            }
            _ => {
                self.merchant_deposit = Some(deposit);
                Ok(())
            }
        }
    }

    pub(crate) fn record_customer(
        &mut self,
        channel_id: ChannelId,
        deposit: CustomerBalance,
    ) -> Result<(), Error> {
        self.check_open()?;
        match self.channel_id {
            Some(recorded) if recorded != channel_id => Err(Error::ParameterMismatch(
                "channel state is bound to another channel",
            )),
            _ => {
                self.channel_id = Some(channel_id);
                self.customer_deposit = Some(deposit);
                Ok(())
            }
        }
    }

    pub(crate) fn set_established(&mut self) -> Result<(), Error> {
        self.check_open()?;
        if self.established {
            return Err(Error::OutOfOrder("channel is already established"));
        }
        self.established = true;
        Ok(())
    }

    pub(crate) fn set_closed(&mut self) {
        self.closed = true;
    }
}

/// The customer's part of a [`ChannelToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerBinding {
    /// Identifier the customer chose for this channel.
    pub customer_id: [u8; 32],
    /// The customer's deposit.
    pub deposit: CustomerBalance,
}

/// Public artifact binding the merchant's parameters and both deposits for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelToken {
    channel_name: String,
    config: customer::Config,
    merchant_deposit: MerchantBalance,
    customer: Option<CustomerBinding>,
}

impl ChannelToken {
    pub(crate) fn new(
        channel_name: &str,
        config: customer::Config,
        merchant_deposit: MerchantBalance,
    ) -> Self {
        Self {
            channel_name: channel_name.to_string(),
            config,
            merchant_deposit,
            customer: None,
        }
    }

    /// Merchant parameters.
    pub fn config(&self) -> &customer::Config {
        &self.config
    }

    /// The merchant's deposit.
    pub fn merchant_deposit(&self) -> MerchantBalance {
        self.merchant_deposit
    }

    /// The customer's part, once the customer has initialized.
    pub fn customer(&self) -> Option<CustomerBinding> {
        self.customer
    }

    /// Add the customer's part. A token can only be bound to one customer.
    pub(crate) fn bind_customer(&mut self, binding: CustomerBinding) -> Result<(), Error> {
        match self.customer {
            Some(bound) if bound != binding => Err(Error::ParameterMismatch(
                "channel token is bound to another customer",
            )),
            _ => {
                self.customer = Some(binding);
                Ok(())
            }
        }
    }

    /// Derive the channel identifier. Both parties compute the same value from the same token.
    pub fn channel_id(&self) -> Result<ChannelId, Error> {
        let binding = self
            .customer
            .ok_or(Error::OutOfOrder("channel token has no customer yet"))?;
        Ok(ChannelId::new(
            &self.channel_name,
            &self.config.merchant_public_key().to_bytes(),
            &binding.customer_id,
            binding.deposit,
            self.merchant_deposit,
        ))
    }
}
