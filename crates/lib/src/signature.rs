//! Webhook signature verification: base64(HMAC-SHA256(channel secret, raw body)).
//!
//! The platform sends the signature in the `x-line-signature` header. Verification
//! is pure and never errors; any mismatch (including a missing header) is `false`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the request signature.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// Compute the signature the platform would send for `body`.
pub fn sign(body: &[u8], secret: &[u8]) -> String {
    // HMAC accepts keys of any length, so this cannot fail.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return String::new();
    };
    mac.update(body);
    STANDARD.encode(mac.finalize().into_bytes())
}

/// True if `provided` is the signature of `body` under `secret`.
///
/// The provided value is decoded and checked with `verify_slice`, which compares
/// in constant time. The standard engine rejects non-canonical base64, so this
/// accepts exactly the strings `sign` produces.
pub fn verify(body: &[u8], secret: &[u8], provided: &str) -> bool {
    if provided.is_empty() {
        return false;
    }
    let Ok(expected) = STANDARD.decode(provided.as_bytes()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
