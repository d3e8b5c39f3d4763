use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-platform-signature";

pub const EVENT_INVENTORY_UPDATED: &str = "inventory.updated";
pub const EVENT_ORDER_COMPLETED: &str = "order.completed";

/// Inbound webhook payload. The object id is a pointer to what to check,
/// never the value to apply: handlers re-fetch authoritative state.
#[derive(Debug, Deserialize)]
pub struct PlatformEventPayload {
    #[serde(rename = "type")]
    pub event_type: String,
    pub object_id: String,
}

/// Computes the signature the platform is expected to send: HMAC-SHA256
/// over the raw payload bytes, base64-encoded.
pub fn sign_payload(payload: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload);
    BASE64.encode(mac.finalize().into_bytes())
}

/// Verifies a webhook delivery against the shared secret. Must be called
/// before the payload is parsed or acted on.
pub fn verify_signature(payload: &[u8], provided: &str, secret: &str) -> bool {
    let expected = sign_payload(payload, secret);
    constant_time_eq(expected.as_bytes(), provided.trim().as_bytes())
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}
