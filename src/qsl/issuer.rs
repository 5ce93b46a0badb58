//! Token issuance.

use std::sync::Arc;

use serde_json::json;

use crate::TokenGrant;
use crate::qsl::codec;
use crate::qsl::config::TokenConfig;
use crate::qsl::error::QslError;
use crate::qsl::expiry;
use crate::qsl::record::{ConfirmationEvent, LogEntry, TokenRecord};
use crate::qsl::signer::TokenSigner;
use crate::qsl::storage::TokenStorage;
use crate::qsl::time_utils;

/// A function that provides the current time in epoch milliseconds.
pub type TimeProviderFn = Box<dyn Fn() -> Result<i64, QslError> + Send + Sync>;

/// A function that generates fresh token strings.
pub type TokenGeneratorFn = Box<dyn Fn() -> String + Send + Sync>;

/// Outcome of one record in a batch issuance run.
#[derive(Debug)]
pub struct BatchOutcome {
    /// The record this outcome belongs to.
    pub record_id: String,
    /// The issued grant, or the per-record failure.
    pub result: Result<TokenGrant, QslError>,
}

/// Mints single-use confirmation tokens, one per record.
///
/// The issuer orchestrates the alphabet codec and the signer: it
/// generates a token, binds it to the record and issuance time via HMAC,
/// optionally attaches a step-up PIN, builds the confirmation URL,
/// persists the result, and appends a `generated` audit entry.
///
/// Time and token generation are injectable for deterministic tests.
///
/// # Example
///
/// ```rust
/// use qsl_confirm::{TokenConfig, TokenIssuer, storage::MemoryStorage};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), qsl_confirm::QslError> {
/// let storage = Arc::new(MemoryStorage::new());
/// let config = TokenConfig::new(
///     b"an example secret of sufficient length!",
///     "https://qsl.example",
/// );
///
/// let issuer = TokenIssuer::new(storage, config)?.with_pin(true);
/// let grant = issuer.issue("Q-1").await?;
///
/// assert!(grant.pin.is_some());
/// assert!(grant.confirm_url.starts_with("https://qsl.example/confirm?"));
/// # Ok(())
/// # }
/// ```
pub struct TokenIssuer {
    storage: Arc<dyn TokenStorage>,
    signer: TokenSigner,
    config: TokenConfig,
    use_pin: bool,
    time_provider: TimeProviderFn,
    token_generator: TokenGeneratorFn,
}

impl TokenIssuer {
    /// Creates an issuer over the given storage and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`QslError::WeakSecret`] if the configured secret is
    /// shorter than 32 bytes. This is the startup-time check; `issue`
    /// never re-validates the secret.
    pub fn new(storage: Arc<dyn TokenStorage>, config: TokenConfig) -> Result<Self, QslError> {
        config.validate()?;
        let signer = TokenSigner::new(&config.secret)?;
        Ok(Self {
            storage,
            signer,
            config,
            use_pin: false,
            time_provider: Box::new(time_utils::current_millis),
            token_generator: Box::new(codec::generate_token),
        })
    }

    /// Enables or disables PIN step-up for newly issued tokens.
    pub fn with_pin(mut self, use_pin: bool) -> Self {
        self.use_pin = use_pin;
        self
    }

    /// Overrides the configured lifetime for subsequently issued tokens.
    pub fn with_expiry_days(mut self, expiry_days: u32) -> Self {
        self.config.expiry_days = expiry_days;
        self
    }

    /// Sets a custom time provider. The default uses system time.
    pub fn with_time_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Result<i64, QslError> + Send + Sync + 'static,
    {
        self.time_provider = Box::new(provider);
        self
    }

    /// Sets a custom token generator. The default draws from the
    /// restricted alphabet via the OS random source.
    pub fn with_token_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.token_generator = Box::new(generator);
        self
    }

    /// Issues a token for a record that has none yet.
    ///
    /// # Errors
    ///
    /// * [`QslError::AlreadyIssued`]: the record already has a token.
    ///   Issuance is one-shot per record; the storage layer's uniqueness
    ///   constraint backs this check under concurrency.
    pub async fn issue(&self, record_id: &str) -> Result<TokenGrant, QslError> {
        if self.storage.find_by_record(record_id).await?.is_some() {
            return Err(QslError::AlreadyIssued);
        }

        let token = codec::normalize(&(self.token_generator)());
        let issued_at = (self.time_provider)()?;
        let signature = self.signer.sign(&token, record_id, issued_at)?;
        let pin = self
            .use_pin
            .then(|| codec::generate_pin(self.config.pin_length));
        let expires_at = expiry::default_expiry(issued_at, self.config.expiry_days);
        let confirm_url = self.confirm_url(&token, &signature);

        let record = TokenRecord {
            id: uuid::Uuid::new_v4().to_string(),
            record_id: record_id.to_string(),
            token,
            signature,
            pin,
            confirm_url,
            issued_at,
            expires_at: Some(expires_at),
            used: false,
            used_at: None,
            used_by: None,
            used_ip: None,
            user_agent: None,
            source: None,
            message: None,
            revoked_at: None,
        };

        let record = self.storage.insert(record).await?;

        let entry = LogEntry::new(&record.id, ConfirmationEvent::Generated, issued_at)
            .with_meta("record_id", json!(record_id));
        self.storage.append_log(entry).await?;

        tracing::debug!(record_id, token_id = %record.id, "issued confirmation token");
        Ok(TokenGrant::from(record))
    }

    /// Issues tokens for many records independently.
    ///
    /// A failure for one record (already issued, storage hiccup) never
    /// aborts the rest; callers receive one [`BatchOutcome`] per input
    /// record, in input order.
    pub async fn issue_batch(&self, record_ids: &[String]) -> Vec<BatchOutcome> {
        let mut outcomes = Vec::with_capacity(record_ids.len());
        for record_id in record_ids {
            let result = self.issue(record_id).await;
            if let Err(error) = &result {
                tracing::warn!(record_id, %error, "batch issuance skipped record");
            }
            outcomes.push(BatchOutcome {
                record_id: record_id.clone(),
                result,
            });
        }
        outcomes
    }

    fn confirm_url(&self, token: &str, signature: &str) -> String {
        format!(
            "{}/confirm?token={}&sig={}",
            self.config.base_url.trim_end_matches('/'),
            codec::format(token),
            signature
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qsl::storage::MemoryStorage;

    const SECRET: &[u8] = b"test_secret_key_of_at_least_32_bytes!";
    const T0: i64 = 1_700_000_000_000;

    fn issuer(storage: Arc<MemoryStorage>) -> TokenIssuer {
        let config = TokenConfig::new(SECRET, "https://qsl.example");
        TokenIssuer::new(storage, config)
            .unwrap()
            .with_time_provider(|| Ok(T0))
    }

    #[test]
    fn test_weak_secret_fails_at_construction() {
        let config = TokenConfig::new(b"short", "https://qsl.example");
        let result = TokenIssuer::new(Arc::new(MemoryStorage::new()), config);
        assert!(matches!(result, Err(QslError::WeakSecret { .. })));
    }

    #[tokio::test]
    async fn test_issue_produces_verifiable_grant() {
        let storage = Arc::new(MemoryStorage::new());
        let issuer = issuer(Arc::clone(&storage));

        let grant = issuer.issue("Q-1").await.unwrap();

        assert_eq!(grant.record_id, "Q-1");
        assert_eq!(grant.issued_at, T0);
        assert_eq!(grant.expires_at, Some(T0 + 365 * 86_400_000));
        assert!(grant.pin.is_none());
        // Display form carries dashes; stored form does not
        assert!(grant.token.contains('-'));

        let stored = storage.find_by_record("Q-1").await.unwrap().unwrap();
        assert!(!stored.token.contains('-'));

        let signer = TokenSigner::new(SECRET).unwrap();
        assert!(signer.verify(&grant.token, &grant.signature, "Q-1", T0));
    }

    #[tokio::test]
    async fn test_issue_is_one_shot_per_record() {
        let storage = Arc::new(MemoryStorage::new());
        let issuer = issuer(storage);

        issuer.issue("Q-1").await.unwrap();
        let second = issuer.issue("Q-1").await;
        assert!(matches!(second, Err(QslError::AlreadyIssued)));
    }

    #[tokio::test]
    async fn test_issue_with_pin() {
        let storage = Arc::new(MemoryStorage::new());
        let issuer = issuer(storage).with_pin(true);

        let grant = issuer.issue("Q-1").await.unwrap();
        let pin = grant.pin.unwrap();
        assert_eq!(pin.len(), 6);
        assert!(pin.bytes().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_confirm_url_embeds_display_token_and_signature() {
        let storage = Arc::new(MemoryStorage::new());
        let issuer = issuer(storage).with_token_generator(|| "AB12CD34EF".to_string());

        let grant = issuer.issue("Q-1").await.unwrap();
        assert_eq!(
            grant.confirm_url,
            format!(
                "https://qsl.example/confirm?token=AB12-CD34-EF&sig={}",
                grant.signature
            )
        );
    }

    #[tokio::test]
    async fn test_issue_appends_generated_log_entry() {
        let storage = Arc::new(MemoryStorage::new());
        let issuer = issuer(Arc::clone(&storage));

        let grant = issuer.issue("Q-1").await.unwrap();
        let logs = storage.logs_for_token(&grant.token_id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].event, ConfirmationEvent::Generated);
        assert_eq!(logs[0].meta["record_id"], json!("Q-1"));
    }

    #[tokio::test]
    async fn test_batch_issuance_is_independent_per_record() {
        let storage = Arc::new(MemoryStorage::new());
        let issuer = issuer(storage);

        // Q-2 already has a token; the rest of the batch must still run
        issuer.issue("Q-2").await.unwrap();

        let ids: Vec<String> = ["Q-1", "Q-2", "Q-3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let outcomes = issuer.issue_batch(&ids).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].result.is_ok());
        assert!(matches!(
            outcomes[1].result,
            Err(QslError::AlreadyIssued)
        ));
        assert!(outcomes[2].result.is_ok());
        assert_eq!(outcomes[1].record_id, "Q-2");
    }

    #[tokio::test]
    async fn test_expiry_honors_configured_days() {
        let storage = Arc::new(MemoryStorage::new());
        let config = TokenConfig::new(SECRET, "https://qsl.example").with_expiry_days(30);
        let issuer = TokenIssuer::new(storage, config)
            .unwrap()
            .with_time_provider(|| Ok(T0));

        let grant = issuer.issue("Q-1").await.unwrap();
        assert_eq!(grant.expires_at, Some(T0 + 30 * 86_400_000));
    }

    #[tokio::test]
    async fn test_issuer_expiry_override() {
        let storage = Arc::new(MemoryStorage::new());
        let issuer = issuer(storage).with_expiry_days(7);

        let grant = issuer.issue("Q-1").await.unwrap();
        assert_eq!(grant.expires_at, Some(T0 + 7 * 86_400_000));
    }
}
