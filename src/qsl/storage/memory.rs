//! In-memory storage backend.
//!
//! Backed by `HashMap`s behind a single `tokio::sync::RwLock`; the write
//! lock makes the conditional transitions atomic without any further
//! coordination. Suitable for tests and single-instance deployments;
//! nothing survives a restart.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{StorageStats, TokenStorage};
use crate::qsl::error::QslError;
use crate::qsl::record::{LogEntry, TokenRecord, TokenUsage};

/// In-memory [`TokenStorage`] implementation.
///
/// # Example
///
/// ```rust
/// use qsl_confirm::storage::MemoryStorage;
///
/// let storage = MemoryStorage::new();
/// ```
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    tokens: HashMap<String, TokenRecord>,
    // Uniqueness indexes; values are token ids.
    by_record: HashMap<String, String>,
    by_token: HashMap<String, String>,
    logs: Vec<LogEntry>,
}

impl MemoryStorage {
    /// Creates an empty in-memory storage instance.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStorage for MemoryStorage {
    async fn find_by_record(&self, record_id: &str) -> Result<Option<TokenRecord>, QslError> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_record
            .get(record_id)
            .and_then(|id| inner.tokens.get(id))
            .cloned())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<TokenRecord>, QslError> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_token
            .get(token)
            .and_then(|id| inner.tokens.get(id))
            .cloned())
    }

    async fn insert(&self, record: TokenRecord) -> Result<TokenRecord, QslError> {
        let mut inner = self.inner.write().await;
        if inner.by_record.contains_key(&record.record_id) {
            return Err(QslError::AlreadyIssued);
        }
        if inner.by_token.contains_key(&record.token) {
            return Err(QslError::from_storage_message(
                "token string already exists",
            ));
        }
        inner
            .by_record
            .insert(record.record_id.clone(), record.id.clone());
        inner.by_token.insert(record.token.clone(), record.id.clone());
        inner.tokens.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn mark_used(&self, token_id: &str, usage: TokenUsage) -> Result<u64, QslError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .tokens
            .get_mut(token_id)
            .ok_or(QslError::TokenNotFound)?;
        if record.used || record.revoked_at.is_some() {
            return Ok(0);
        }
        record.used = true;
        record.used_at = Some(usage.used_at);
        record.used_by = usage.used_by;
        record.used_ip = usage.used_ip;
        record.user_agent = usage.user_agent;
        record.source = Some(usage.source);
        record.message = usage.message;
        Ok(1)
    }

    async fn mark_revoked(&self, token_id: &str, at_ms: i64) -> Result<u64, QslError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .tokens
            .get_mut(token_id)
            .ok_or(QslError::TokenNotFound)?;
        if record.used || record.revoked_at.is_some() {
            return Ok(0);
        }
        record.revoked_at = Some(at_ms);
        Ok(1)
    }

    async fn append_log(&self, entry: LogEntry) -> Result<(), QslError> {
        let mut inner = self.inner.write().await;
        inner.logs.push(entry);
        Ok(())
    }

    async fn logs_for_token(&self, token_id: &str) -> Result<Vec<LogEntry>, QslError> {
        let inner = self.inner.read().await;
        Ok(inner
            .logs
            .iter()
            .filter(|entry| entry.token_id == token_id)
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<StorageStats, QslError> {
        let inner = self.inner.read().await;
        Ok(StorageStats {
            tokens: inner.tokens.len(),
            log_entries: inner.logs.len(),
            backend_info: "In-memory HashMap storage".to_string(),
        })
    }
}
