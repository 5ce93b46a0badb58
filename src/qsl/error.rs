use thiserror::Error;

/// Error types that can occur during token issuance and confirmation.
///
/// # Error Categories
///
/// - **Configuration errors**: `WeakSecret`, fatal and raised when the
///   issuer or gate is constructed, never per-request.
/// - **Issuance conflicts**: `AlreadyIssued`, `RecordNotFound`.
/// - **Confirmation failures**: `TokenNotFound`, `InvalidSignature`,
///   `Expired`, `AlreadyUsed`, `Revoked`, `InvalidPin`. None of these
///   mutate token state, and every one of them is also recorded in the
///   audit trail.
/// - **System errors**: `SchemaNotReady`, `StorageError`, `CryptoError`,
///   `TimeError`.
#[derive(Error, Debug)]
pub enum QslError {
    /// The signing secret is missing or shorter than 32 bytes.
    ///
    /// A weak secret makes every signature forgeable, so this is treated
    /// as a fatal startup error: construction of `TokenIssuer` and
    /// `ConfirmationGate` fails before any request is served.
    #[error("Signing secret must be at least 32 bytes (got {length})")]
    WeakSecret {
        /// Length of the rejected secret, in bytes.
        length: usize,
    },

    /// A token has already been issued for this record.
    ///
    /// Each record gets at most one token, ever. Retrying with the same
    /// record id will keep failing; the existing token must be used.
    #[error("Token already issued for this record")]
    AlreadyIssued,

    /// The record a token was requested for does not exist.
    #[error("Record not found")]
    RecordNotFound,

    /// No token matches the presented token string.
    #[error("Token not found")]
    TokenNotFound,

    /// The HMAC signature does not match the (token, record, issuedAt)
    /// binding.
    ///
    /// Deliberately does not reveal which part of the signed payload was
    /// wrong. The attempt, including the offending signature, is captured
    /// in the audit trail for forensics.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token is past its expiry date and can no longer be confirmed.
    ///
    /// Distinct from `InvalidSignature` so callers can show "expired"
    /// rather than "invalid" messaging.
    #[error("Token has expired")]
    Expired,

    /// The token has already been confirmed once.
    ///
    /// This is a conflict, not a retryable error. The original
    /// confirmation timestamp is surfaced so a legitimate recipient is
    /// not confused by their own earlier confirmation.
    #[error("Token already used at {used_at}")]
    AlreadyUsed {
        /// Epoch milliseconds of the original confirmation.
        used_at: i64,
    },

    /// The token was administratively revoked before use.
    #[error("Token has been revoked")]
    Revoked,

    /// The step-up PIN was missing or wrong.
    #[error("Invalid PIN")]
    InvalidPin,

    /// The storage backend's schema is not initialized.
    ///
    /// Surfaced explicitly by the storage collaborator; never inferred
    /// from backend-specific error codes.
    #[error("Storage schema not ready")]
    SchemaNotReady,

    /// A storage operation failed.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// A cryptographic operation failed.
    #[error("Crypto error: {0}")]
    CryptoError(String),

    /// The system clock could not produce a usable timestamp.
    #[error("Clock error: {0}")]
    TimeError(String),
}

impl QslError {
    /// Convenience constructor for backend-specific storage failures.
    pub fn from_storage_message(message: impl Into<String>) -> Self {
        QslError::StorageError(message.into())
    }
}
