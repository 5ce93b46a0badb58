//! The confirmation state machine.
//!
//! A token has two reachable states, `pending` and `confirmed`, plus an
//! administratively reachable `revoked`. The transition to `confirmed`
//! happens at most once, enforced by the storage layer's conditional
//! update. Check order is fixed: signature first (nothing about the
//! token, not even whether a PIN is required, is revealed until the
//! presenter proves they hold a validly signed link), then expiry, then
//! the used flag, then the PIN.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::qsl::codec;
use crate::qsl::config::TokenConfig;
use crate::qsl::error::QslError;
use crate::qsl::expiry;
use crate::qsl::issuer::TimeProviderFn;
use crate::qsl::record::{
    Actor, ConfirmationEvent, ConfirmationSource, Identity, LogEntry, TokenRecord, TokenUsage,
};
use crate::qsl::signer::TokenSigner;
use crate::qsl::storage::TokenStorage;
use crate::qsl::time_utils;

/// Read-only view of a token returned by [`ConfirmationGate::inspect`].
///
/// Shown on the confirmation page before the recipient commits. Reveals
/// whether a PIN will be required, but never the PIN itself.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPreview {
    /// Token in display form.
    pub token: String,
    /// The record the token confirms.
    pub record_id: String,
    /// Whether the token was already confirmed.
    pub used: bool,
    /// When it was confirmed, if it was.
    pub used_at: Option<i64>,
    /// Whether confirmation will require the out-of-band PIN.
    pub requires_pin: bool,
    /// Explicit expiry, when one is stored.
    pub expires_at: Option<i64>,
}

/// A confirmation attempt, as submitted by the recipient.
#[derive(Debug, Clone, Default)]
pub struct ConfirmRequest {
    /// Token string, display or canonical form.
    pub token: String,
    /// Signature from the confirmation URL.
    pub signature: String,
    /// Step-up PIN attempt, when the token requires one.
    pub pin: Option<String>,
    /// Who is confirming.
    pub identity: Identity,
    /// Transport metadata.
    pub actor: Actor,
    /// Submission channel, declared by the client.
    pub source: ConfirmationSource,
}

/// Result of a successful confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Confirmation {
    /// Token in display form.
    pub token: String,
    /// When the confirmation was recorded, epoch milliseconds.
    pub confirmed_at: i64,
}

/// Validates presented tokens and performs the one-way
/// `pending` to `confirmed` transition.
///
/// Every `inspect` and `confirm` invocation against a known token,
/// whether it succeeds or fails, appends exactly one audit entry; invalid
/// signatures are recorded with the offending signature for forensics.
///
/// # Example
///
/// ```rust
/// use qsl_confirm::{
///     ConfirmRequest, ConfirmationGate, TokenConfig, TokenIssuer,
///     storage::MemoryStorage,
/// };
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), qsl_confirm::QslError> {
/// let storage = Arc::new(MemoryStorage::new());
/// let config = TokenConfig::new(
///     b"an example secret of sufficient length!",
///     "https://qsl.example",
/// );
///
/// let issuer = TokenIssuer::new(storage.clone(), config.clone())?;
/// let grant = issuer.issue("Q-1").await?;
///
/// let gate = ConfirmationGate::new(storage, config)?;
/// let confirmation = gate
///     .confirm(ConfirmRequest {
///         token: grant.token.clone(),
///         signature: grant.signature.clone(),
///         ..Default::default()
///     })
///     .await?;
/// assert_eq!(confirmation.token, grant.token);
/// # Ok(())
/// # }
/// ```
pub struct ConfirmationGate {
    storage: Arc<dyn TokenStorage>,
    signer: TokenSigner,
    config: TokenConfig,
    time_provider: TimeProviderFn,
}

impl ConfirmationGate {
    /// Creates a gate over the given storage and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`QslError::WeakSecret`] for a short secret; like the
    /// issuer, the gate validates configuration once at construction.
    pub fn new(storage: Arc<dyn TokenStorage>, config: TokenConfig) -> Result<Self, QslError> {
        config.validate()?;
        let signer = TokenSigner::new(&config.secret)?;
        Ok(Self {
            storage,
            signer,
            config,
            time_provider: Box::new(time_utils::current_millis),
        })
    }

    /// Sets a custom time provider. The default uses system time.
    pub fn with_time_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Result<i64, QslError> + Send + Sync + 'static,
    {
        self.time_provider = Box::new(provider);
        self
    }

    /// Validates a presented (token, signature) pair without mutating
    /// anything.
    ///
    /// Used when the recipient opens the confirmation page. Appends one
    /// `scanned` audit entry whatever the outcome.
    ///
    /// # Errors
    ///
    /// * [`QslError::TokenNotFound`]: no token matches the string.
    /// * [`QslError::InvalidSignature`]: the binding does not verify;
    ///   the offending signature is captured in the audit entry.
    /// * [`QslError::Expired`]: past the token's lifetime.
    pub async fn inspect(
        &self,
        token: &str,
        signature: &str,
        actor: &Actor,
    ) -> Result<TokenPreview, QslError> {
        let now = (self.time_provider)()?;
        let record = self.load(token).await?;

        self.check_signature(&record, signature, actor, now).await?;

        if self.is_expired(&record, now) {
            self.log_scanned(
                &record,
                actor,
                now,
                &[("error", json!("expired"))],
            )
            .await?;
            return Err(QslError::Expired);
        }

        self.log_scanned(
            &record,
            actor,
            now,
            &[("valid", json!(true))],
        )
        .await?;

        Ok(TokenPreview {
            token: record.display_token(),
            record_id: record.record_id.clone(),
            used: record.used,
            used_at: record.used_at,
            requires_pin: record.requires_pin(),
            expires_at: record.expires_at,
        })
    }

    /// Attempts the one-time confirmation.
    ///
    /// Check order is signature, then expiry, then used, then PIN; the final
    /// transition is a single atomic conditional update, so under
    /// concurrent calls at most one succeeds and every loser receives
    /// [`QslError::AlreadyUsed`] with the original timestamp.
    ///
    /// # Errors
    ///
    /// * [`QslError::TokenNotFound`], [`QslError::InvalidSignature`],
    ///   [`QslError::Expired`]: as for [`inspect`](Self::inspect).
    /// * [`QslError::Revoked`]: the token was administratively
    ///   invalidated.
    /// * [`QslError::AlreadyUsed`]: conflict carrying the original
    ///   `used_at`; the repeat attempt is logged as a duplicate scan,
    ///   never as a second `confirmed` entry.
    /// * [`QslError::InvalidPin`]: the token requires a PIN and the
    ///   attempt was missing or wrong.
    pub async fn confirm(&self, request: ConfirmRequest) -> Result<Confirmation, QslError> {
        let now = (self.time_provider)()?;
        let record = self.load(&request.token).await?;

        self.check_signature(&record, &request.signature, &request.actor, now)
            .await?;

        if self.is_expired(&record, now) {
            self.log_scanned(
                &record,
                &request.actor,
                now,
                &[("error", json!("expired"))],
            )
            .await?;
            return Err(QslError::Expired);
        }

        if record.revoked_at.is_some() {
            self.log_scanned(
                &record,
                &request.actor,
                now,
                &[("error", json!("revoked"))],
            )
            .await?;
            return Err(QslError::Revoked);
        }

        if record.used {
            return self.reject_duplicate(&record, &request.actor, now).await;
        }

        // PIN gate: plain equality. PINs are low-entropy and already
        // gated by the signed token, so constant-time comparison buys
        // nothing here, unlike signatures.
        if let Some(expected) = &record.pin {
            if request.pin.as_deref() != Some(expected.as_str()) {
                self.log_scanned(
                    &record,
                    &request.actor,
                    now,
                    &[("error", json!("invalid pin"))],
                )
                .await?;
                return Err(QslError::InvalidPin);
            }
        }

        let usage = TokenUsage {
            used_at: now,
            used_by: request.identity.confirmed_by(),
            used_ip: request.actor.ip.clone(),
            user_agent: request.actor.user_agent.clone(),
            source: request.source,
            message: request.identity.message.clone(),
        };

        let affected = self.storage.mark_used(&record.id, usage).await?;
        if affected == 0 {
            // Lost a race with a concurrent confirm (or revoke).
            let current = self
                .storage
                .find_by_token(&record.token)
                .await?
                .ok_or(QslError::TokenNotFound)?;
            if current.revoked_at.is_some() {
                self.log_scanned(
                    &current,
                    &request.actor,
                    now,
                    &[("error", json!("revoked"))],
                )
                .await?;
                return Err(QslError::Revoked);
            }
            return self.reject_duplicate(&current, &request.actor, now).await;
        }

        let entry = LogEntry::new(&record.id, ConfirmationEvent::Confirmed, now)
            .with_meta("token", json!(record.display_token()))
            .with_meta("callsign", json!(request.identity.callsign))
            .with_meta("email", json!(request.identity.email))
            .with_meta("message", json!(request.identity.message))
            .with_meta("source", json!(request.source))
            .with_actor(&request.actor);
        self.storage.append_log(entry).await?;

        tracing::debug!(
            record_id = %record.record_id,
            token_id = %record.id,
            "token confirmed"
        );

        Ok(Confirmation {
            token: record.display_token(),
            confirmed_at: now,
        })
    }

    /// Administratively invalidates an unused token.
    ///
    /// A first-class terminal transition: a revoked token can never be
    /// confirmed, and the event is recorded in the audit trail.
    ///
    /// # Errors
    ///
    /// * [`QslError::TokenNotFound`]: the record has no token.
    /// * [`QslError::AlreadyUsed`]: the token was confirmed first;
    ///   revocation cannot rewrite history.
    /// * [`QslError::Revoked`]: already revoked.
    pub async fn revoke(&self, record_id: &str, actor: &Actor) -> Result<(), QslError> {
        let now = (self.time_provider)()?;
        let record = self
            .storage
            .find_by_record(record_id)
            .await?
            .ok_or(QslError::TokenNotFound)?;

        let affected = self.storage.mark_revoked(&record.id, now).await?;
        if affected == 0 {
            let current = self
                .storage
                .find_by_record(record_id)
                .await?
                .ok_or(QslError::TokenNotFound)?;
            if current.used {
                return Err(QslError::AlreadyUsed {
                    used_at: current.used_at.unwrap_or(now),
                });
            }
            return Err(QslError::Revoked);
        }

        let entry = LogEntry::new(&record.id, ConfirmationEvent::Revoked, now)
            .with_meta("record_id", json!(record_id))
            .with_actor(actor);
        self.storage.append_log(entry).await?;

        tracing::debug!(record_id, token_id = %record.id, "token revoked");
        Ok(())
    }

    async fn load(&self, token: &str) -> Result<TokenRecord, QslError> {
        let normalized = codec::normalize(token);
        self.storage
            .find_by_token(&normalized)
            .await?
            .ok_or(QslError::TokenNotFound)
    }

    /// Signature gate shared by inspect and confirm. Failures append a
    /// forensic `scanned` entry carrying the offending signature.
    async fn check_signature(
        &self,
        record: &TokenRecord,
        signature: &str,
        actor: &Actor,
        now: i64,
    ) -> Result<(), QslError> {
        if self
            .signer
            .verify(&record.token, signature, &record.record_id, record.issued_at)
        {
            return Ok(());
        }

        tracing::warn!(
            record_id = %record.record_id,
            token_id = %record.id,
            "rejected confirmation attempt with invalid signature"
        );
        let entry = LogEntry::new(&record.id, ConfirmationEvent::Scanned, now)
            .with_meta("error", json!("invalid signature"))
            .with_meta("signature", json!(signature))
            .with_actor(actor);
        self.storage.append_log(entry).await?;
        Err(QslError::InvalidSignature)
    }

    fn is_expired(&self, record: &TokenRecord, now: i64) -> bool {
        expiry::is_expired(
            record.issued_at,
            record.expires_at,
            now,
            self.config.expiry_days,
        )
    }

    /// Rejects a repeat confirmation. Logged as a duplicate scan so the
    /// original `confirmed` entry stays the only one of its kind.
    async fn reject_duplicate(
        &self,
        record: &TokenRecord,
        actor: &Actor,
        now: i64,
    ) -> Result<Confirmation, QslError> {
        self.log_scanned(
            record,
            actor,
            now,
            &[("duplicate", json!(true))],
        )
        .await?;
        Err(QslError::AlreadyUsed {
            used_at: record.used_at.unwrap_or(now),
        })
    }

    async fn log_scanned(
        &self,
        record: &TokenRecord,
        actor: &Actor,
        now: i64,
        meta: &[(&str, serde_json::Value)],
    ) -> Result<(), QslError> {
        let mut entry =
            LogEntry::new(&record.id, ConfirmationEvent::Scanned, now).with_actor(actor);
        for (key, value) in meta {
            entry = entry.with_meta(key, value.clone());
        }
        self.storage.append_log(entry).await
    }
}
