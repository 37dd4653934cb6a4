use thiserror::Error;

/// Errors returned by channel operations.
///
/// Each operation validates every input before it touches any wallet or channel state, so an
/// error never leaves a party half-updated.
#[derive(Debug, Error)]
pub enum Error {
    /// The parties disagree about the channel: deposits, name, or parameters differ. This is
    /// fatal for the channel being set up.
    #[error("channel parameters disagree: {0}")]
    ParameterMismatch(&'static str),
    /// A proof, token, or signature failed to verify. The caller may retry with a correct input.
    #[error("verification failed: {0}")]
    InvalidProof(&'static str),
    /// The payment would take the customer's balance below zero.
    #[error("insufficient balance: cannot pay {amount} from a balance of {balance}")]
    InsufficientBalance {
        /// The customer's balance before the payment.
        balance: u64,
        /// The total debit, including any channel fee.
        amount: u64,
    },
    /// An operation was called in the wrong protocol phase.
    #[error("operation out of order: {0}")]
    OutOfOrder(&'static str),
    /// A revocation refers to a wallet version that was already revoked, already spent, or is not
    /// known to the merchant.
    #[error("revocation conflict: {0}")]
    RevocationConflict(&'static str),
    /// A payment amount was zero or too large to represent in a channel.
    #[error("invalid payment amount {0}")]
    InvalidAmount(u64),
    /// A pay round did not complete before its deadline.
    #[error("pay round expired before completion")]
    RoundExpired,
    /// Reading or writing the revocation record failed.
    #[error("revocation record I/O failed")]
    Io(#[from] std::io::Error),
    /// The revocation record contains an entry that could not be decoded.
    #[error("revocation record is corrupt")]
    Storage(#[from] bincode::Error),
    /// A wire message could not be encoded or decoded.
    #[error("malformed wire message")]
    Wire(#[from] serde_json::Error),
    /// A wire message decoded, but is not the message the protocol expects next.
    #[error("unexpected wire message: expected {expected}, got {found}")]
    UnexpectedMessage {
        /// Tag of the expected message.
        expected: &'static str,
        /// Tag of the received message.
        found: &'static str,
    },
    /// A base64-wrapped wire message could not be decoded.
    #[error("malformed base64 in wire message")]
    WireEncoding(#[from] base64::DecodeError),
}

impl Error {
    /// Whether the channel being set up or used must be abandoned.
    ///
    /// Verification failures and ordering mistakes are recoverable: the caller's state is
    /// unchanged and the operation can be retried with correct input.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ParameterMismatch(_) | Error::Io(_) | Error::Storage(_)
        )
    }
}
