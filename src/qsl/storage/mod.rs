//! Pluggable storage backends for tokens and their audit trail.
//!
//! The protocol core performs one read and one conditional write per
//! confirmation; everything about how those are persisted lives behind
//! the [`TokenStorage`] trait so a persistence collaborator (SQL,
//! key-value, in-memory) can be swapped in.

use async_trait::async_trait;

use crate::qsl::error::QslError;
use crate::qsl::record::{LogEntry, TokenRecord, TokenUsage};

mod memory;
pub use memory::MemoryStorage;

/// Statistics about a storage backend.
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Number of token rows.
    pub tokens: usize,
    /// Number of audit trail entries.
    pub log_entries: usize,
    /// Backend-specific description.
    pub backend_info: String,
}

/// Abstract storage for tokens and audit log entries.
///
/// # Contract
///
/// Implementations must provide at least read-committed isolation and
/// enforce two uniqueness constraints at the storage layer: one token
/// per `record_id`, and unique token strings. The conditional-update
/// methods ([`mark_used`](TokenStorage::mark_used),
/// [`mark_revoked`](TokenStorage::mark_revoked)) return the number of
/// rows affected; the caller relies on `0` to detect that a concurrent
/// call won the transition. This is what makes "at most one `confirm`
/// succeeds per token" hold without application-level locking.
///
/// A backend whose schema is missing must surface
/// [`QslError::SchemaNotReady`] from [`init`](TokenStorage::init)
/// explicitly rather than leaking a backend-specific error code.
///
/// All methods are async and must be safe under concurrent access.
#[async_trait]
pub trait TokenStorage: Send + Sync {
    /// Optional backend initialization (schema creation, connections).
    async fn init(&self) -> Result<(), QslError> {
        Ok(())
    }

    /// Looks up the token issued for a record, if any.
    async fn find_by_record(&self, record_id: &str) -> Result<Option<TokenRecord>, QslError>;

    /// Looks up a token by its canonical (dash-free uppercase) string.
    async fn find_by_token(&self, token: &str) -> Result<Option<TokenRecord>, QslError>;

    /// Inserts a freshly issued token.
    ///
    /// # Errors
    ///
    /// * [`QslError::AlreadyIssued`] if a token already exists for the
    ///   same `record_id`. Concurrent issuance for one record is
    ///   serialized by this uniqueness constraint.
    async fn insert(&self, record: TokenRecord) -> Result<TokenRecord, QslError>;

    /// Atomically marks a token used, writing the usage fields.
    ///
    /// Semantics of `UPDATE ... SET used = true WHERE id = ? AND used =
    /// false AND revoked_at IS NULL`: returns the affected-row count, so
    /// `0` means the token was already used or revoked and the caller
    /// lost the race. Usage fields are written exactly once and never
    /// overwritten.
    async fn mark_used(&self, token_id: &str, usage: TokenUsage) -> Result<u64, QslError>;

    /// Atomically revokes an unused token. Same affected-rows contract
    /// as [`mark_used`](TokenStorage::mark_used).
    async fn mark_revoked(&self, token_id: &str, at_ms: i64) -> Result<u64, QslError>;

    /// Appends an audit trail entry. Entries are immutable once written.
    async fn append_log(&self, entry: LogEntry) -> Result<(), QslError>;

    /// Returns the audit trail for a token, oldest first.
    async fn logs_for_token(&self, token_id: &str) -> Result<Vec<LogEntry>, QslError>;

    /// Returns statistics about the backend.
    async fn stats(&self) -> Result<StorageStats, QslError>;
}
