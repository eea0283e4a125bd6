//! Request signing for Binance USDⓈ-M futures

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::common::errors::{BotError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the API key on signed and keyed endpoints
pub const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// HMAC-SHA256 of `payload` keyed by `secret`, hex encoded
///
/// `payload` is the exact url-encoded query string (or form body) sent to
/// the exchange, including `timestamp` and `recvWindow`.
pub fn sign_payload(secret: &str, payload: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| BotError::Authentication(format!("Failed to create HMAC: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Build a signed query string from request parameters
///
/// Appends `recvWindow` and `timestamp`, then the `signature` of everything
/// before it.
pub fn signed_query(
    secret: &str,
    params: &[(&str, String)],
    recv_window_ms: u64,
    timestamp_ms: i64,
) -> Result<String> {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.append_pair("recvWindow", &recv_window_ms.to_string());
    serializer.append_pair("timestamp", &timestamp_ms.to_string());
    let query = serializer.finish();

    let signature = sign_payload(secret, &query)?;
    Ok(format!("{}&signature={}", query, signature))
}
