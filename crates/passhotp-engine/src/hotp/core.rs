//! Core HOTP generation and verification (RFC 4226).
//!
//! The stored counter is the *next expected* value: verification searches
//! `counter ..= counter + window`, and after a match at `delta` the caller
//! persists `counter + delta + 1`.

use crate::hotp::types::*;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Raw HMAC-OTP (RFC 4226 §5.3)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compute HMAC(key, message) using the specified algorithm.
fn compute_hmac(key: &[u8], data: &[u8], algo: Algorithm) -> Result<Vec<u8>, HotpError> {
    let digest = match algo {
        Algorithm::Sha1 => {
            let mut mac = Hmac::<Sha1>::new_from_slice(key).map_err(|_| HotpError::InvalidKey)?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        Algorithm::Sha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(|_| HotpError::InvalidKey)?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        Algorithm::Sha512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(key).map_err(|_| HotpError::InvalidKey)?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
    };
    Ok(digest)
}

/// Dynamic truncation per RFC 4226 §5.3.
fn truncate(hmac_result: &[u8], digits: u8) -> String {
    let offset = (hmac_result[hmac_result.len() - 1] & 0x0f) as usize;
    let binary = ((hmac_result[offset] as u32 & 0x7f) << 24)
        | ((hmac_result[offset + 1] as u32) << 16)
        | ((hmac_result[offset + 2] as u32) << 8)
        | (hmac_result[offset + 3] as u32);
    let modulus = 10u32.pow(digits as u32);
    format!("{:0>width$}", binary % modulus, width = digits as usize)
}

/// HOTP for already-validated inputs.
fn hotp_raw(key: &[u8], counter: u64, params: HotpParams) -> Result<String, HotpError> {
    let hmac_result = compute_hmac(key, &counter.to_be_bytes(), params.algorithm)?;
    Ok(truncate(&hmac_result, params.digits))
}

fn check_inputs(secret: &[u8], params: &HotpParams) -> Result<(), HotpError> {
    if secret.is_empty() {
        return Err(HotpError::InvalidKey);
    }
    params.validate()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Generation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Generate a 6-digit HMAC-SHA1 code for `counter`.
pub fn generate(secret: &[u8], counter: u64) -> Result<String, HotpError> {
    generate_with(secret, counter, HotpParams::default())
}

/// Generate a code with explicit digit count and algorithm.
pub fn generate_with(secret: &[u8], counter: u64, params: HotpParams) -> Result<String, HotpError> {
    check_inputs(secret, &params)?;
    hotp_raw(secret, counter, params)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Verification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Verify `candidate` against `counter ..= counter + window` with default params.
pub fn verify(
    candidate: &str,
    secret: &[u8],
    counter: u64,
    window: u64,
) -> Result<Verification, HotpError> {
    verify_with(candidate, secret, counter, window, HotpParams::default())
}

/// Verify with explicit digit count and algorithm.
///
/// The smallest matching offset wins. Malformed candidates (wrong length,
/// non-digit characters, empty) are a plain `NoMatch`. Counter positions
/// past `u64::MAX` are not searched.
pub fn verify_with(
    candidate: &str,
    secret: &[u8],
    counter: u64,
    window: u64,
    params: HotpParams,
) -> Result<Verification, HotpError> {
    check_inputs(secret, &params)?;

    if candidate.len() != params.digits as usize || !candidate.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(Verification::NoMatch);
    }

    for delta in 0..=window {
        let Some(position) = counter.checked_add(delta) else {
            break;
        };
        let generated = hotp_raw(secret, position, params)?;
        if bool::from(generated.as_bytes().ct_eq(candidate.as_bytes())) {
            return Ok(Verification::Matched { delta });
        }
    }

    Ok(Verification::NoMatch)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Provisioning
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build an `otpauth://hotp/...` key URI for enrolling a token.
pub fn key_uri(
    label: &str,
    issuer: Option<&str>,
    secret: &SecretKey,
    counter: u64,
    params: HotpParams,
) -> String {
    let path = match issuer {
        Some(iss) if !iss.is_empty() => format!("{}:{}", url_encode(iss), url_encode(label)),
        _ => url_encode(label),
    };

    let mut query = vec![format!("secret={}", secret.to_base32())];
    if let Some(iss) = issuer.filter(|i| !i.is_empty()) {
        query.push(format!("issuer={}", url_encode(iss)));
    }
    if params.algorithm != Algorithm::Sha1 {
        query.push(format!("algorithm={}", params.algorithm.uri_name()));
    }
    if params.digits != DEFAULT_DIGITS {
        query.push(format!("digits={}", params.digits));
    }
    query.push(format!("counter={}", counter));

    format!("otpauth://hotp/{}?{}", path, query.join("&"))
}

fn url_encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
