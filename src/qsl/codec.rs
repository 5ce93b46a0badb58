//! Human-writable token alphabet and secure generation.
//!
//! Tokens are meant to be copied by hand from a printed card, so the
//! alphabet excludes the visually ambiguous `I` and `O` (easily confused
//! with `1` and `0`). The canonical form is dash-free uppercase; the
//! display form inserts a dash every four characters purely for
//! transcription comfort.

use rand::Rng;
use rand::rngs::OsRng;

/// Characters a token may contain: digits plus uppercase letters, minus `I` and `O`.
pub const TOKEN_ALPHABET: &[u8] = b"0123456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Canonical token length in characters.
pub const TOKEN_LENGTH: usize = 10;

/// Default length for numeric step-up PINs.
pub const DEFAULT_PIN_LENGTH: usize = 6;

/// Display segments are this many characters wide.
const SEGMENT_SIZE: usize = 4;

const PIN_ALPHABET: &[u8] = b"0123456789";

/// Generates a fresh token in canonical (dash-free) form.
///
/// Draws [`TOKEN_LENGTH`] characters from [`TOKEN_ALPHABET`] using the
/// operating system's cryptographically secure random source.
///
/// # Example
///
/// ```rust
/// let token = qsl_confirm::codec::generate_token();
/// assert_eq!(token.len(), qsl_confirm::codec::TOKEN_LENGTH);
/// ```
pub fn generate_token() -> String {
    from_alphabet(TOKEN_ALPHABET, TOKEN_LENGTH)
}

/// Generates a digits-only PIN of the given length from a secure random source.
///
/// The PIN is a secondary secret delivered out-of-band (printed on the
/// mailed card), never embedded in the confirmation URL.
pub fn generate_pin(length: usize) -> String {
    from_alphabet(PIN_ALPHABET, length)
}

fn from_alphabet(alphabet: &[u8], length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

/// Normalizes user input to canonical token form.
///
/// Strips dash separators and upper-cases the rest. Idempotent, and
/// lossless with respect to [`format`]: `normalize(format(t)) == normalize(t)`.
pub fn normalize(input: &str) -> String {
    input
        .chars()
        .filter(|c| *c != '-')
        .collect::<String>()
        .to_uppercase()
}

/// Formats a token for human transcription: 4-character segments joined by `-`.
///
/// # Example
///
/// ```rust
/// assert_eq!(qsl_confirm::codec::format("AB12CD34EF"), "AB12-CD34-EF");
/// ```
pub fn format(token: &str) -> String {
    let normalized = normalize(token);
    let chars: Vec<char> = normalized.chars().collect();
    chars
        .chunks(SEGMENT_SIZE)
        .map(|segment| segment.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}
