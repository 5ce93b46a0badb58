use std::fmt;

use crate::qsl::codec::DEFAULT_PIN_LENGTH;
use crate::qsl::error::QslError;
use crate::qsl::expiry::DEFAULT_EXPIRY_DAYS;
use crate::qsl::signer::MIN_SECRET_LENGTH;

/// Configuration for token issuance and confirmation.
///
/// All shared state the protocol needs (the server secret, the public
/// base URL for confirmation links, and lifetime/PIN defaults) lives in
/// this struct and is injected into [`crate::TokenIssuer`] and
/// [`crate::ConfirmationGate`] constructors. There are no hidden
/// singletons.
///
/// # Environment Variables
///
/// [`TokenConfig::from_env`] reads:
/// - `QSL_TOKEN_SECRET`: signing secret, required, at least 32 bytes
/// - `QSL_BASE_URL`: confirmation link base (default: `http://localhost:3000`)
/// - `QSL_TOKEN_EXPIRY_DAYS`: default token lifetime in days (default: 365)
/// - `QSL_PIN_LENGTH`: generated PIN length (default: 6)
///
/// # Example
///
/// ```rust
/// use qsl_confirm::TokenConfig;
///
/// let config = TokenConfig::new(
///     b"an example secret of sufficient length!",
///     "https://qsl.example",
/// );
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone)]
pub struct TokenConfig {
    /// Server-held signing secret, at least 32 bytes.
    pub secret: Vec<u8>,
    /// Base URL that confirmation links are built against.
    pub base_url: String,
    /// Default token lifetime in days, applied when a token has no
    /// explicit expiry.
    pub expiry_days: u32,
    /// Length of generated step-up PINs.
    pub pin_length: usize,
}

impl TokenConfig {
    /// Creates a configuration with the default lifetime and PIN length.
    pub fn new(secret: &[u8], base_url: impl Into<String>) -> Self {
        Self {
            secret: secret.to_vec(),
            base_url: base_url.into(),
            expiry_days: DEFAULT_EXPIRY_DAYS,
            pin_length: DEFAULT_PIN_LENGTH,
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`QslError::WeakSecret`] if `QSL_TOKEN_SECRET` is absent
    /// or shorter than 32 bytes. This is meant to be called once at
    /// process start so that a bad secret is a fatal startup error.
    pub fn from_env() -> Result<Self, QslError> {
        let secret = std::env::var("QSL_TOKEN_SECRET").unwrap_or_default();
        let config = Self {
            secret: secret.into_bytes(),
            base_url: std::env::var("QSL_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            expiry_days: std::env::var("QSL_TOKEN_EXPIRY_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_EXPIRY_DAYS),
            pin_length: std::env::var("QSL_PIN_LENGTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PIN_LENGTH),
        };
        config.validate()?;
        Ok(config)
    }

    /// Sets a non-default token lifetime.
    pub fn with_expiry_days(mut self, expiry_days: u32) -> Self {
        self.expiry_days = expiry_days;
        self
    }

    /// Sets a non-default PIN length.
    pub fn with_pin_length(mut self, pin_length: usize) -> Self {
        self.pin_length = pin_length;
        self
    }

    /// Validates the fatal preconditions of this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`QslError::WeakSecret`] for a missing or short secret.
    pub fn validate(&self) -> Result<(), QslError> {
        if self.secret.len() < MIN_SECRET_LENGTH {
            return Err(QslError::WeakSecret {
                length: self.secret.len(),
            });
        }
        Ok(())
    }

    /// Returns warnings for settings that are valid but questionable.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.expiry_days == 0 {
            warnings.push("Zero-day lifetime makes every token expire immediately".to_string());
        }
        if self.expiry_days > 3650 {
            warnings.push(
                "Very long token lifetime (> 10 years) increases replay exposure".to_string(),
            );
        }
        if self.pin_length < 4 {
            warnings.push("PIN shorter than 4 digits offers little step-up value".to_string());
        }
        if self.base_url.is_empty() {
            warnings.push("Empty base URL produces unusable confirmation links".to_string());
        }

        warnings
    }
}

// Manual Debug so the secret never lands in logs.
impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &format!("<{} bytes>", self.secret.len()))
            .field("base_url", &self.base_url)
            .field("expiry_days", &self.expiry_days)
            .field("pin_length", &self.pin_length)
            .finish()
    }
}
