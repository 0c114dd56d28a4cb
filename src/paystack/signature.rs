//! Paystack webhook signature verification.
//!
//! Paystack signs each delivery by computing HMAC-SHA512 over the raw
//! request body with the account's secret key and sends the lowercase hex
//! digest in the `x-paystack-signature` header. The header is the bare
//! digest: no timestamp, no versioned scheme.
//!
//! Verification consumes the exact bytes received on the wire. Parsing and
//! re-serializing the body first would change whitespace and key order and
//! break the digest, so the raw bytes are threaded here untouched.

use hmac::{Hmac, Mac};
use sha2::Sha512;

use super::config::RouterConfig;

type HmacSha512 = Hmac<Sha512>;

/// Verifies `x-paystack-signature` headers against raw request bodies.
///
/// [`verify`](Self::verify) never fails with an error: a malformed header,
/// an absent secret, or a digest mismatch is simply `false`, and the
/// dispatcher turns that into a rejected delivery.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
}

impl SignatureVerifier {
    /// Create a verifier using the configured Paystack secret key.
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            secret: config.paystack_secret().as_bytes().to_vec(),
        }
    }

    /// Create a verifier from a raw secret.
    pub fn from_secret(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    /// Check a signature header against the raw body bytes.
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> bool {
        if self.secret.is_empty() || signature_header.is_empty() {
            return false;
        }
        let expected = self.sign(payload);
        constant_time_eq(signature_header, &expected)
    }

    /// Hex HMAC-SHA512 digest of `payload` under the configured secret.
    ///
    /// Exposed so tests and delivery simulators can produce valid headers.
    #[doc(hidden)]
    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac =
            HmacSha512::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
