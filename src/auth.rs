//! Challenge-response signing for the local socket handshake.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::errors::BridgeError;

type HmacSha256 = Hmac<Sha256>;

/// Signs a remote nonce with the shared secret.
///
/// The secret is base64-decoded and used as the HMAC-SHA256 key; the digest
/// is returned base64-encoded.
pub fn sign_challenge(secret: Option<&str>, nonce: &str) -> Result<String, BridgeError> {
    let secret = secret
        .map(str::trim)
        .filter(|secret| !secret.is_empty())
        .ok_or(BridgeError::SecretNotConfigured)?;

    let key = STANDARD
        .decode(secret)
        .map_err(|err| BridgeError::invalid_secret(format!("secret is not valid base64: {err}")))?;
    if key.is_empty() {
        return Err(BridgeError::invalid_secret("decoded secret is empty"));
    }

    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|err| BridgeError::invalid_secret(format!("unusable hmac key: {err}")))?;
    mac.update(nonce.as_bytes());

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
