//! Data model for issued tokens and their audit trail.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::qsl::codec;

/// How the recipient submitted their confirmation.
///
/// Declared explicitly by the client rather than inferred from transport
/// headers, so the signal is reliable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationSource {
    /// The confirmation URL was opened by scanning the printed QR code.
    Qr,
    /// The token was typed in by hand.
    #[default]
    Manual,
}

/// Lifecycle events recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationEvent {
    /// A token was issued for a record.
    Generated,
    /// The token was presented for inspection or a confirmation attempt
    /// was rejected.
    Scanned,
    /// The one-time confirmation succeeded.
    Confirmed,
    /// The token was administratively invalidated before use.
    Revoked,
}

impl ConfirmationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationEvent::Generated => "generated",
            ConfirmationEvent::Scanned => "scanned",
            ConfirmationEvent::Confirmed => "confirmed",
            ConfirmationEvent::Revoked => "revoked",
        }
    }
}

/// Who the recipient claims to be, supplied at confirmation time.
///
/// All fields are optional; the recipient has no account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Identity {
    /// Amateur radio callsign of the confirming party.
    pub callsign: Option<String>,
    /// Contact email, used when no callsign is given.
    pub email: Option<String>,
    /// Free-form note left with the confirmation.
    pub message: Option<String>,
}

impl Identity {
    /// The value stored as `used_by`: callsign when present, else email.
    pub(crate) fn confirmed_by(&self) -> Option<String> {
        self.callsign.clone().or_else(|| self.email.clone())
    }
}

/// Transport-level metadata about the confirming client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Actor {
    /// Client IP address, if the transport layer supplied one.
    pub ip: Option<String>,
    /// Client user agent string.
    pub user_agent: Option<String>,
}

/// A stored token, one per record, created at most once.
///
/// The `token` field is always the canonical dash-free form; use
/// [`TokenRecord::display_token`] for the human-transcribable rendering.
/// The signature is derived from `(token, record_id, issued_at)` and is
/// only ever validated by recomputation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Storage identifier of this token row.
    pub id: String,
    /// The record (QSO) this token was issued against.
    pub record_id: String,
    /// Canonical token string.
    pub token: String,
    /// Truncated HMAC over (token, record_id, issued_at), base64url.
    pub signature: String,
    /// Optional step-up PIN; presence means confirmation requires it.
    pub pin: Option<String>,
    /// Full confirmation URL embedding token and signature.
    pub confirm_url: String,
    /// Issuance time, epoch milliseconds. Immutable; part of the signed
    /// payload.
    pub issued_at: i64,
    /// Explicit expiry, epoch milliseconds. When `None` the default
    /// lifetime applies.
    pub expires_at: Option<i64>,
    /// One-way flag set by the single successful confirmation.
    pub used: bool,
    /// When the confirmation happened.
    pub used_at: Option<i64>,
    /// Who confirmed (callsign or email).
    pub used_by: Option<String>,
    /// IP address of the confirming client.
    pub used_ip: Option<String>,
    /// User agent of the confirming client.
    pub user_agent: Option<String>,
    /// Declared submission channel.
    pub source: Option<ConfirmationSource>,
    /// Message left by the recipient.
    pub message: Option<String>,
    /// When the token was administratively revoked, if ever.
    pub revoked_at: Option<i64>,
}

impl TokenRecord {
    /// Whether confirmation of this token requires the step-up PIN.
    pub fn requires_pin(&self) -> bool {
        self.pin.is_some()
    }

    /// The token formatted for human transcription (`AB12-CD34-EF`).
    pub fn display_token(&self) -> String {
        codec::format(&self.token)
    }
}

/// The field set written exactly once, by the winning `confirm` call.
#[derive(Debug, Clone)]
pub struct TokenUsage {
    pub used_at: i64,
    pub used_by: Option<String>,
    pub used_ip: Option<String>,
    pub user_agent: Option<String>,
    pub source: ConfirmationSource,
    pub message: Option<String>,
}

/// An append-only audit trail entry linked to a token.
///
/// Entries are never mutated or deleted by this crate; retention is an
/// external concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Entry identifier.
    pub id: String,
    /// The token this entry belongs to.
    pub token_id: String,
    /// Lifecycle event.
    pub event: ConfirmationEvent,
    /// Free-form metadata about the event.
    pub meta: Map<String, Value>,
    /// Client IP, when known.
    pub ip: Option<String>,
    /// Client user agent, when known.
    pub user_agent: Option<String>,
    /// When the event happened, epoch milliseconds.
    pub at: i64,
}

impl LogEntry {
    /// Creates an entry with a fresh identifier and empty metadata.
    pub fn new(token_id: &str, event: ConfirmationEvent, at: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            token_id: token_id.to_string(),
            event,
            meta: Map::new(),
            ip: None,
            user_agent: None,
            at,
        }
    }

    /// Attaches a metadata field.
    pub fn with_meta(mut self, key: &str, value: Value) -> Self {
        self.meta.insert(key.to_string(), value);
        self
    }

    /// Attaches the actor's transport metadata.
    pub fn with_actor(mut self, actor: &Actor) -> Self {
        self.ip = actor.ip.clone();
        self.user_agent = actor.user_agent.clone();
        self
    }
}
