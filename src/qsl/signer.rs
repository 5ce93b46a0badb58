//! HMAC binding of a token to its record and issuance time.
//!
//! The signature is what makes a token tamper-evident without a trusted
//! channel: it covers the normalized token string, the record identifier,
//! and the issuance timestamp, so none of the three can be swapped out
//! without invalidating it. There is no separate signature store to
//! desynchronize; recomputing is the only verification method.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::qsl::codec;
use crate::qsl::error::QslError;

type HmacSha256 = Hmac<Sha256>;

/// Minimum acceptable secret length in bytes.
pub const MIN_SECRET_LENGTH: usize = 32;

/// Signatures are the digest truncated to this many bytes, base64url-encoded.
pub const SIGNATURE_LENGTH: usize = 12;

/// Computes and verifies the HMAC binding of (token, recordId, issuedAt).
///
/// The signed payload is `normalizedToken|recordId|issuedAtMillis`; the
/// HMAC-SHA256 digest is truncated to [`SIGNATURE_LENGTH`] bytes and
/// encoded as URL-safe base64 without padding, short enough to ride in a
/// query parameter.
///
/// # Example
///
/// ```rust
/// use qsl_confirm::TokenSigner;
///
/// let signer = TokenSigner::new(b"an example secret of sufficient length!")?;
/// let sig = signer.sign("AB12-CD34-EF", "Q-1", 1_700_000_000_000)?;
///
/// assert!(signer.verify("AB12-CD34-EF", &sig, "Q-1", 1_700_000_000_000));
/// assert!(!signer.verify("AB12-CD34-EF", &sig, "Q-2", 1_700_000_000_000));
/// # Ok::<(), qsl_confirm::QslError>(())
/// ```
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    /// Creates a signer over the given server secret.
    ///
    /// # Errors
    ///
    /// Returns [`QslError::WeakSecret`] if the secret is shorter than
    /// [`MIN_SECRET_LENGTH`] bytes. Callers are expected to construct the
    /// signer once at startup so that a bad secret is fatal there, not at
    /// sign time.
    pub fn new(secret: &[u8]) -> Result<Self, QslError> {
        if secret.len() < MIN_SECRET_LENGTH {
            return Err(QslError::WeakSecret {
                length: secret.len(),
            });
        }
        Ok(Self {
            secret: secret.to_vec(),
        })
    }

    /// Signs the (token, record, issuedAt) triple.
    ///
    /// The token may be given in display or canonical form; it is
    /// normalized before signing, so both produce the same signature.
    pub fn sign(
        &self,
        token: &str,
        record_id: &str,
        issued_at_ms: i64,
    ) -> Result<String, QslError> {
        let mac = self.mac_for(token, record_id, issued_at_ms)?;
        let digest = mac.finalize().into_bytes();
        Ok(URL_SAFE_NO_PAD.encode(&digest[..SIGNATURE_LENGTH]))
    }

    /// Verifies a signature against the same triple it should have been
    /// computed over.
    ///
    /// Undecodable base64 and length mismatches are reported as "not
    /// equal" before the constant-time comparison runs, so neither leaks
    /// an early-exit timing signal about the expected digest. The byte
    /// comparison itself is constant-time.
    pub fn verify(&self, token: &str, signature: &str, record_id: &str, issued_at_ms: i64) -> bool {
        let Ok(provided) = URL_SAFE_NO_PAD.decode(signature) else {
            return false;
        };
        if provided.len() != SIGNATURE_LENGTH {
            return false;
        }
        let Ok(mac) = self.mac_for(token, record_id, issued_at_ms) else {
            return false;
        };
        mac.verify_truncated_left(&provided).is_ok()
    }

    fn mac_for(
        &self,
        token: &str,
        record_id: &str,
        issued_at_ms: i64,
    ) -> Result<HmacSha256, QslError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| QslError::CryptoError(format!("Invalid HMAC key: {e}")))?;
        let payload = format!(
            "{}|{}|{}",
            codec::normalize(token),
            record_id,
            issued_at_ms
        );
        mac.update(payload.as_bytes());
        Ok(mac)
    }
}
