/*!
Messages exchanged between the parties, and their encodings.

Every message is a tagged JSON object, `{"type": ..., "body": ...}`, so a receiver can tell what
it got before decoding the body. Group elements inside a body use their compressed encodings.
Transports that need text without JSON escaping can wrap the JSON in base64.
*/
use crate::{
    channel::ChannelToken,
    close::CustomerCloseMessage,
    proofs::{PaymentProof, WalletCommitment},
    CloseToken, Error, EstablishProof, PayToken, RevokeToken,
};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

/// The customer's request to establish a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstablishRequest {
    /// Commitments to the initial wallet.
    pub commitment: WalletCommitment,
    /// Proof that the commitments hold the agreed opening balances.
    pub proof: EstablishProof,
}

/// A message of the channel protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
#[allow(clippy::large_enum_variant)]
pub enum WireMessage {
    /// Merchant to customer, during Init.
    ChannelToken(ChannelToken),
    /// Customer to merchant, during Establish.
    EstablishRequest(EstablishRequest),
    /// Merchant to customer, during Establish and Pay.
    CloseToken(CloseToken),
    /// Merchant to customer, during Establish and Pay.
    PayToken(PayToken),
    /// Customer to merchant, during Pay.
    PaymentProof(PaymentProof),
    /// Customer to merchant, during Pay.
    RevokeToken(RevokeToken),
    /// Customer to the world, on close.
    CustomerClose(CustomerCloseMessage),
}

impl WireMessage {
    /// The message tag, as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::ChannelToken(_) => "channel_token",
            WireMessage::EstablishRequest(_) => "establish_request",
            WireMessage::CloseToken(_) => "close_token",
            WireMessage::PayToken(_) => "pay_token",
            WireMessage::PaymentProof(_) => "payment_proof",
            WireMessage::RevokeToken(_) => "revoke_token",
            WireMessage::CustomerClose(_) => "customer_close",
        }
    }

    /// Encode as JSON.
    pub fn encode(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON.
    pub fn decode(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encode as base64-wrapped JSON.
    pub fn encode_base64(&self) -> Result<String, Error> {
        Ok(base64::encode(serde_json::to_vec(self)?))
    }

    /// Decode from base64-wrapped JSON.
    pub fn decode_base64(encoded: &str) -> Result<Self, Error> {
        let bytes = base64::decode(encoded.trim())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Decode and require a particular message type.
    pub fn decode_as<T>(json: &str) -> Result<T, Error>
    where
        T: TryFrom<WireMessage, Error = Error>,
    {
        T::try_from(Self::decode(json)?)
    }
}

macro_rules! impl_wire_conversions {
    ($variant:ident, $type:ty, $tag:literal) => {
        impl From<$type> for WireMessage {
            fn from(body: $type) -> Self {
                WireMessage::$variant(body)
            }
        }

        impl TryFrom<WireMessage> for $type {
            type Error = Error;

            fn try_from(msg: WireMessage) -> Result<Self, Self::Error> {
                match msg {
                    WireMessage::$variant(body) => Ok(body),
                    other => Err(Error::UnexpectedMessage {
                        expected: $tag,
                        found: other.kind(),
                    }),
                }
            }
        }
    };
}

impl_wire_conversions!(ChannelToken, ChannelToken, "channel_token");
impl_wire_conversions!(EstablishRequest, EstablishRequest, "establish_request");
impl_wire_conversions!(CloseToken, CloseToken, "close_token");
impl_wire_conversions!(PayToken, PayToken, "pay_token");
impl_wire_conversions!(PaymentProof, PaymentProof, "payment_proof");
impl_wire_conversions!(RevokeToken, RevokeToken, "revoke_token");
impl_wire_conversions!(CustomerClose, CustomerCloseMessage, "customer_close");
