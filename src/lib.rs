//! # QSL Confirm
//!
//! A Rust library for paper-mail delivery confirmation of QSL cards
//! using single-use signed tokens.
//!
//! A station operator mails a QSL card carrying a short printed token
//! (and a QR code embedding the confirmation URL). The recipient visits
//! the URL or types the token in by hand; one successful confirmation
//! closes the loop and proves the card arrived. Tokens are bound to
//! their QSO record with an HMAC-SHA256 signature, so a token string
//! alone, guessed or leaked, is worthless without the matching link.
//!
//! ## Features
//!
//! - **Transcribable Tokens**: 10 characters from a restricted alphabet
//!   with no `I` or `O`, displayed in dashed groups (`AB12-CD34-EF`)
//! - **HMAC-SHA256 Binding**: Each token is signed together with its
//!   record id and issuance time; signatures are verified by
//!   recomputation in constant time
//! - **Single Use**: The pending to confirmed transition happens at most
//!   once, enforced by an atomic conditional update in storage
//! - **Optional PIN Step-Up**: A numeric PIN delivered out of band can
//!   be required on top of the signed link
//! - **Audit Trail**: Every issuance, scan, confirmation, and revocation
//!   appends an immutable log entry
//! - **Pluggable Storage**: All persistence lives behind an async trait;
//!   an in-memory backend ships with the crate
//!
//! ## Quick Start
//!
//! ```rust
//! use qsl_confirm::{
//!     ConfirmRequest, ConfirmationGate, Identity, TokenConfig, TokenIssuer,
//!     storage::MemoryStorage,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), qsl_confirm::QslError> {
//! let storage = Arc::new(MemoryStorage::new());
//! let config = TokenConfig::new(
//!     b"a shared secret of at least 32 bytes!!",
//!     "https://qsl.example",
//! );
//!
//! // Issue a token for a logged QSO
//! let issuer = TokenIssuer::new(storage.clone(), config.clone())?;
//! let grant = issuer.issue("qso-1234").await?;
//! println!("print on the card: {}", grant.token);
//!
//! // Later, the recipient confirms via the printed URL
//! let gate = ConfirmationGate::new(storage, config)?;
//! let confirmation = gate
//!     .confirm(ConfirmRequest {
//!         token: grant.token.clone(),
//!         signature: grant.signature.clone(),
//!         identity: Identity {
//!             callsign: Some("DL1ABC".to_string()),
//!             ..Default::default()
//!         },
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("confirmed at {}", confirmation.confirmed_at);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! [`TokenConfig`] can be built in code or loaded from the environment:
//!
//! ```bash
//! export QSL_TOKEN_SECRET="a shared secret of at least 32 bytes!!"
//! export QSL_BASE_URL="https://qsl.example"
//! export QSL_TOKEN_EXPIRY_DAYS=365   # optional
//! export QSL_PIN_LENGTH=6            # optional
//! ```
//!
//! A secret shorter than 32 bytes is rejected when an issuer or gate is
//! constructed, never silently weakened.
//!
//! ## Architecture
//!
//! - **[`TokenIssuer`]**: Mints tokens, one per record, and builds the
//!   confirmation URL
//! - **[`ConfirmationGate`]**: Validates presented tokens and performs
//!   the one-time confirmation
//! - **[`TokenGrant`]**: Everything the caller needs to print a card and
//!   notify the recipient
//! - **[`TokenStorage`]**: The persistence seam; implement it to back
//!   the protocol with your own database
//! - **[`QslError`]**: One variant per distinct failure mode

use serde::{Deserialize, Serialize};

pub mod qsl;

// Re-export commonly used types
pub use qsl::{
    Actor, BatchOutcome, ConfirmRequest, Confirmation, ConfirmationEvent, ConfirmationGate,
    ConfirmationSource, Identity, LogEntry, QslError, TokenConfig, TokenIssuer, TokenPreview,
    TokenRecord, TokenSigner, TokenStorage, TokenUsage,
};
pub use qsl::{codec, storage};

/// Everything produced by a successful issuance.
///
/// This is the caller-facing result of [`TokenIssuer::issue`]: the data
/// needed to print the card, render the QR code, and deliver the PIN.
/// The `token` field is in display form with dash separators; storage
/// keeps the canonical dash-free form internally, and presented tokens
/// are normalized before lookup, so either form round-trips.
///
/// # Example
///
/// ```rust
/// use qsl_confirm::{TokenConfig, TokenIssuer, storage::MemoryStorage};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), qsl_confirm::QslError> {
/// let issuer = TokenIssuer::new(
///     Arc::new(MemoryStorage::new()),
///     TokenConfig::new(b"a shared secret of at least 32 bytes!!", "https://qsl.example"),
/// )?;
/// let grant = issuer.issue("qso-1234").await?;
///
/// assert_eq!(grant.token.len(), 12); // 10 characters plus 2 dashes
/// assert!(grant.confirm_url.contains(&grant.token));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    /// Storage identifier of the token row, for audit trail lookups.
    pub token_id: String,

    /// The record the token was issued against.
    pub record_id: String,

    /// The token in display form (`AB12-CD34-EF`), ready for printing.
    pub token: String,

    /// Truncated HMAC-SHA256 over (token, record id, issuance time),
    /// base64url without padding.
    pub signature: String,

    /// The step-up PIN, when one was requested. Deliver it out of band;
    /// it is never embedded in the confirmation URL.
    pub pin: Option<String>,

    /// Full confirmation URL, the QR code payload.
    pub confirm_url: String,

    /// Issuance time, epoch milliseconds.
    pub issued_at: i64,

    /// Expiry time, epoch milliseconds.
    pub expires_at: Option<i64>,
}

impl From<TokenRecord> for TokenGrant {
    fn from(record: TokenRecord) -> Self {
        let token = record.display_token();
        Self {
            token_id: record.id,
            record_id: record.record_id,
            token,
            signature: record.signature,
            pin: record.pin,
            confirm_url: record.confirm_url,
            issued_at: record.issued_at,
            expires_at: record.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::MemoryStorage;
    use crate::{
        ConfirmRequest, ConfirmationGate, ConfirmationSource, Identity, QslError, TokenConfig,
        TokenIssuer,
    };
    use std::sync::Arc;

    const TEST_SECRET: &[u8] = b"test_secret_key_of_at_least_32_bytes!";

    fn config() -> TokenConfig {
        TokenConfig::new(TEST_SECRET, "https://qsl.example")
    }

    #[tokio::test]
    async fn test_issue_and_confirm_round_trip() {
        let storage = Arc::new(MemoryStorage::new());
        let issuer = TokenIssuer::new(storage.clone(), config()).unwrap();
        let gate = ConfirmationGate::new(storage, config()).unwrap();

        let grant = issuer.issue("qso-1").await.unwrap();

        let confirmation = gate
            .confirm(ConfirmRequest {
                token: grant.token.clone(),
                signature: grant.signature.clone(),
                identity: Identity {
                    callsign: Some("DL1ABC".to_string()),
                    ..Default::default()
                },
                source: ConfirmationSource::Qr,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(confirmation.token, grant.token);

        // One-time use
        let replay = gate
            .confirm(ConfirmRequest {
                token: grant.token.clone(),
                signature: grant.signature.clone(),
                ..Default::default()
            })
            .await;
        assert!(matches!(replay, Err(QslError::AlreadyUsed { .. })));
    }

    #[tokio::test]
    async fn test_tampered_signature_is_rejected() {
        let storage = Arc::new(MemoryStorage::new());
        let issuer = TokenIssuer::new(storage.clone(), config()).unwrap();
        let gate = ConfirmationGate::new(storage, config()).unwrap();

        let grant = issuer.issue("qso-1").await.unwrap();

        let result = gate
            .confirm(ConfirmRequest {
                token: grant.token.clone(),
                signature: "invalid_signature".to_string(),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(QslError::InvalidSignature)));
    }

    #[tokio::test]
    async fn test_grant_carries_printable_forms() {
        let storage = Arc::new(MemoryStorage::new());
        let issuer = TokenIssuer::new(storage, config()).unwrap().with_pin(true);

        let grant = issuer.issue("qso-1").await.unwrap();

        assert_eq!(grant.token.len(), 12);
        assert_eq!(grant.token.matches('-').count(), 2);
        assert!(grant.confirm_url.contains(&grant.token));
        assert!(grant.confirm_url.contains(&grant.signature));
        // PIN travels out of band, never in the URL
        assert!(!grant.confirm_url.contains(grant.pin.as_ref().unwrap()));
    }

    #[tokio::test]
    async fn test_grant_serialization() {
        let storage = Arc::new(MemoryStorage::new());
        let issuer = TokenIssuer::new(storage, config()).unwrap();
        let grant = issuer.issue("qso-1").await.unwrap();

        let json = serde_json::to_string(&grant).unwrap();
        let back: crate::TokenGrant = serde_json::from_str(&json).unwrap();
        assert_eq!(back.token, grant.token);
        assert_eq!(back.signature, grant.signature);
        assert_eq!(back.confirm_url, grant.confirm_url);
    }

    #[tokio::test]
    async fn test_secrets_must_match_across_components() {
        let storage = Arc::new(MemoryStorage::new());
        let issuer = TokenIssuer::new(storage.clone(), config()).unwrap();
        let other = TokenConfig::new(
            b"a_different_secret_also_32_bytes_long!",
            "https://qsl.example",
        );
        let gate = ConfirmationGate::new(storage, other).unwrap();

        let grant = issuer.issue("qso-1").await.unwrap();
        let result = gate
            .confirm(ConfirmRequest {
                token: grant.token.clone(),
                signature: grant.signature.clone(),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(QslError::InvalidSignature)));
    }
}
