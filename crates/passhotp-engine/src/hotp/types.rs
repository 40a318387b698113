//! Core types for the HOTP engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Digit count used when none is configured.
pub const DEFAULT_DIGITS: u8 = 6;

/// Look-ahead window used when none is configured.
pub const DEFAULT_WINDOW: u64 = 50;

/// Largest digit count whose modulus fits the 31-bit truncated value.
pub const MAX_DIGITS: u8 = 9;

/// Largest look-ahead window a configuration may request. Each rejected
/// code costs `window + 1` HMAC computations.
pub const MAX_WINDOW: u64 = 1_000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Algorithm
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Hash algorithm used for the HMAC.
///
/// Serialized as `SHA1`, `SHA256` or `SHA512`; deserialization also accepts
/// the spellings handled by [`FromStr`](std::str::FromStr), such as
/// `sha-256` or `HMAC-SHA512`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum Algorithm {
    #[default]
    Sha1,
    Sha256,
    Sha512,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri_name())
    }
}

impl std::str::FromStr for Algorithm {
    type Err = HotpError;

    /// Case-insensitive; an `HMAC` prefix and `-`/`_` separators are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.strip_prefix("HMAC").unwrap_or(&normalized) {
            "SHA1" => Ok(Self::Sha1),
            "SHA256" => Ok(Self::Sha256),
            "SHA512" => Ok(Self::Sha512),
            _ => Err(HotpError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

impl TryFrom<String> for Algorithm {
    type Error = HotpError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl Algorithm {
    /// Name used in `otpauth://` parameters.
    pub fn uri_name(&self) -> &'static str {
        match self {
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha512 => "SHA512",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Parameters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Code shape shared by generator and verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotpParams {
    /// Number of decimal digits in a code.
    pub digits: u8,
    pub algorithm: Algorithm,
}

impl Default for HotpParams {
    fn default() -> Self {
        Self {
            digits: DEFAULT_DIGITS,
            algorithm: Algorithm::Sha1,
        }
    }
}

impl HotpParams {
    /// Builder: set digit count.
    pub fn with_digits(mut self, digits: u8) -> Self {
        self.digits = digits;
        self
    }

    /// Builder: set algorithm.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Reject digit counts the truncation step cannot produce.
    pub fn validate(&self) -> Result<(), HotpError> {
        if self.digits == 0 || self.digits > MAX_DIGITS {
            return Err(HotpError::InvalidDigits(self.digits));
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Secret key
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Shared secret bytes. Wiped from memory on drop and never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    /// Decode a base-32 secret (with or without spaces/dashes, case-insensitive).
    pub fn from_base32(b32: &str) -> Result<Self, HotpError> {
        let cleaned = b32.replace([' ', '-'], "").to_uppercase();
        let padded = pad_base32(&cleaned);
        let bytes = base32::decode(base32::Alphabet::Rfc4648 { padding: true }, &padded)
            .or_else(|| base32::decode(base32::Alphabet::Rfc4648 { padding: false }, &cleaned))
            .ok_or(HotpError::InvalidBase32)?;
        if bytes.is_empty() {
            return Err(HotpError::InvalidKey);
        }
        Ok(Self(bytes))
    }

    /// Generate `byte_length` random bytes from the OS CSPRNG.
    pub fn generate(byte_length: usize) -> Self {
        use rand::RngCore;
        let mut buf = vec![0u8; byte_length];
        rand::rngs::OsRng.fill_bytes(&mut buf);
        Self(buf)
    }

    /// Encode to base-32 (no padding, uppercase).
    pub fn to_base32(&self) -> String {
        base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for SecretKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Pad a base-32 string to a multiple of 8 with '='.
fn pad_base32(s: &str) -> String {
    let remainder = s.len() % 8;
    if remainder == 0 {
        s.to_string()
    } else {
        format!("{}{}", s, "=".repeat(8 - remainder))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Verification result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Outcome of checking a candidate code against a counter and window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verification {
    NoMatch,
    /// `delta` is the zero-based offset from the stored counter, `0..=window`.
    Matched { delta: u64 },
}

impl Verification {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }

    pub fn delta(&self) -> Option<u64> {
        match self {
            Self::Matched { delta } => Some(*delta),
            Self::NoMatch => None,
        }
    }

    /// Counter to persist after this result: `counter + delta + 1`.
    ///
    /// `None` for `NoMatch`, or when the next value would not fit in a `u64`.
    pub fn next_counter(&self, counter: u64) -> Option<u64> {
        self.delta()?.checked_add(counter)?.checked_add(1)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Error type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Engine errors. All are configuration problems, not bad user input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum HotpError {
    /// The secret is empty or otherwise unusable as an HMAC key.
    #[error("invalid HOTP key")]
    InvalidKey,

    #[error("unsupported digit count {0} (expected 1..=9)")]
    InvalidDigits(u8),

    #[error("invalid base-32 secret")]
    InvalidBase32,

    #[error("unsupported HMAC algorithm {0:?}")]
    UnsupportedAlgorithm(String),
}
