//! SigV4 presigning of the AWS IoT WebSocket URL.
//!
//! AWS IoT authenticates WebSocket clients through query-string SigV4
//! parameters on `GET /mqtt`. The session token is appended after the
//! signature and is not part of the signed query.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use cogniot_protocol::Credentials;

use crate::error::{TransportError, TransportResult};

type HmacSha256 = Hmac<Sha256>;

/// SigV4 service name for the IoT device gateway.
pub const SERVICE: &str = "iotdevicegateway";

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const CANONICAL_URI: &str = "/mqtt";

/// Build a presigned `wss://` URL for `authority` signed at `now`.
pub fn presign_url(
    authority: &str,
    region: &str,
    credentials: &Credentials,
    now: DateTime<Utc>,
) -> TransportResult<String> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = now.format("%Y%m%d").to_string();
    let scope = format!("{date_stamp}/{region}/{SERVICE}/aws4_request");

    // Parameters in canonical (sorted) order.
    let query = format!(
        "X-Amz-Algorithm={ALGORITHM}&X-Amz-Credential={}&X-Amz-Date={amz_date}&X-Amz-SignedHeaders=host",
        urlencoding::encode(&format!("{}/{scope}", credentials.access_key_id)),
    );

    let canonical_request = format!(
        "GET\n{CANONICAL_URI}\n{query}\nhost:{authority}\n\nhost\n{}",
        sha256_hex(b"")
    );
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        sha256_hex(canonical_request.as_bytes())
    );

    let key = signing_key(&credentials.secret_key, &date_stamp, region, SERVICE)?;
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

    let mut url = format!("wss://{authority}{CANONICAL_URI}?{query}&X-Amz-Signature={signature}");
    if !credentials.session_token.is_empty() {
        url.push_str("&X-Amz-Security-Token=");
        url.push_str(&urlencoding::encode(&credentials.session_token));
    }
    Ok(url)
}

/// Derive the SigV4 signing key for one day, region and service.
pub fn signing_key(
    secret_key: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> TransportResult<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> TransportResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| TransportError::Signing(format!("invalid HMAC key: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
