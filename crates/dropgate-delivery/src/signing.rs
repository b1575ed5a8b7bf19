//! HMAC-SHA256 request signing.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{DeliveryError, DeliveryResult};

type HmacSha256 = Hmac<Sha256>;

/// Lower-case hex HMAC-SHA256 of `message` keyed by `key`.
///
/// # Errors
///
/// Returns [`DeliveryError::Config`] if the key is rejected by the MAC.
pub fn hmac_sha256_hex(key: &[u8], message: &[u8]) -> DeliveryResult<String> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| DeliveryError::Config {
        field: "secret",
        reason: "signing key rejected",
    })?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Signature over `"{timestamp}.{body}"` keyed by the tenant secret.
///
/// # Errors
///
/// See [`hmac_sha256_hex`].
pub fn sign(secret: &str, timestamp: u64, body: &str) -> DeliveryResult<String> {
    let message = format!("{timestamp}.{body}");
    hmac_sha256_hex(secret.as_bytes(), message.as_bytes())
}
