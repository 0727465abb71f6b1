//! HMAC-SHA256 integrity digests for the `HashSHA256` header.
//!
//! Digests are always computed over the uncompressed body, on both sides of
//! the wire, regardless of transport compression.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn keyed_mac(key: &str) -> HmacSha256 {
    // HMAC-SHA256 accepts keys of any length.
    HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC key length")
}

/// Lowercase hex HMAC-SHA256 digest of `payload` under the shared secret.
pub fn sign(key: &str, payload: &[u8]) -> String {
    let mut mac = keyed_mac(key);
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a received hex digest against `payload`.
pub fn verify(key: &str, payload: &[u8], digest: &str) -> bool {
    let Ok(received) = hex::decode(digest) else {
        return false;
    };
    let mut mac = keyed_mac(key);
    mac.update(payload);
    mac.verify_slice(&received).is_ok()
}
