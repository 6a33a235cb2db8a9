//! Request signing for Binance signed endpoints

use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::form_urlencoded;

use crate::common::errors::{DcaError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the API key on every signed request
pub const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// HMAC-SHA256 of the query string, hex encoded
///
/// # Arguments
/// * `secret` - API secret, used as raw bytes
/// * `query` - The exact url-encoded query string that will be sent
pub fn sign_query(secret: &str, query: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| DcaError::Authentication(format!("Failed to create HMAC: {}", e)))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Build a signed query string
///
/// Appends `recvWindow` and `timestamp` to `params`, then the `signature`
/// computed over everything before it.
pub fn signed_query(
    secret: &str,
    params: &[(&str, String)],
    timestamp_ms: i64,
    recv_window_ms: u64,
) -> Result<String> {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.append_pair("recvWindow", &recv_window_ms.to_string());
    serializer.append_pair("timestamp", &timestamp_ms.to_string());
    let query = serializer.finish();

    let signature = sign_query(secret, &query)?;
    Ok(format!("{}&signature={}", query, signature))
}
