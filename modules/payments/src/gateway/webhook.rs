//! Webhook signature verification.
//!
//! The gateway signs each delivery with
//! `gateway-signature: t=<unix-seconds>,v1=<hex hmac-sha256>` over
//! `"{t}.{raw_body}"`. Verification rejects stale timestamps (replay
//! protection) and compares digests in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

use super::error::GatewayError;

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_TOLERANCE_SECS: i64 = 300;

pub fn verify_webhook_signature(
    raw_body: &str,
    signature: &str,
    webhook_secret: &str,
    tolerance: Option<i64>,
) -> Result<(), GatewayError> {
    let tolerance = tolerance.unwrap_or(DEFAULT_TOLERANCE_SECS);

    let mut timestamp = None;
    let mut received_signature = None;
    for part in signature.split(',') {
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(v) = part.strip_prefix("v1=") {
            received_signature = Some(v);
        }
    }

    let timestamp = timestamp.ok_or(GatewayError::WebhookVerificationFailed)?;
    let received_signature = received_signature.ok_or(GatewayError::WebhookVerificationFailed)?;

    let webhook_time = timestamp
        .parse::<i64>()
        .map_err(|_| GatewayError::WebhookVerificationFailed)?;

    let current_time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| GatewayError::WebhookVerificationFailed)?
        .as_secs() as i64;

    if (current_time - webhook_time).abs() > tolerance {
        return Err(GatewayError::WebhookVerificationFailed);
    }

    let signed_payload = format!("{timestamp}.{raw_body}");

    let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes())
        .map_err(|_| GatewayError::WebhookVerificationFailed)?;
    mac.update(signed_payload.as_bytes());
    let expected = mac.finalize().into_bytes();

    let received =
        hex::decode(received_signature).map_err(|_| GatewayError::WebhookVerificationFailed)?;

    if received.len() != expected.len() {
        return Err(GatewayError::WebhookVerificationFailed);
    }

    // Constant-time comparison
    let mut diff = 0u8;
    for (a, b) in received.iter().zip(expected.iter()) {
        diff |= a ^ b;
    }

    if diff == 0 {
        Ok(())
    } else {
        Err(GatewayError::WebhookVerificationFailed)
    }
}

/// Produce a `t=..,v1=..` header value for a body. Used by tests and the
/// local webhook replay tool; the real gateway signs on its side.
pub fn sign_payload(raw_body: &str, webhook_secret: &str, timestamp: i64) -> String {
    let signed_payload = format!("{timestamp}.{raw_body}");
    let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes()).expect("hmac key");
    mac.update(signed_payload.as_bytes());
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    #[test]
    fn accepts_freshly_signed_body() {
        let secret = "whsec_local_test";
        let body = r#"{"event_type":"checkout.completed","checkout_id":"chk_1"}"#;
        let header = sign_payload(body, secret, now());

        assert!(verify_webhook_signature(body, &header, secret, Some(300)).is_ok());
    }

    #[test]
    fn rejects_tampered_body() {
        let secret = "whsec_local_test";
        let body = r#"{"event_type":"checkout.completed","checkout_id":"chk_1"}"#;
        let header = sign_payload(body, secret, now());

        let tampered = body.replace("chk_1", "chk_2");
        assert!(verify_webhook_signature(&tampered, &header, secret, Some(300)).is_err());
    }

    #[test]
    fn rejects_wrong_secret() {
        let body = r#"{"event_type":"checkout.completed"}"#;
        let header = sign_payload(body, "whsec_a", now());

        assert!(verify_webhook_signature(body, &header, "whsec_b", Some(300)).is_err());
    }

    #[test]
    fn rejects_stale_timestamp() {
        let secret = "whsec_local_test";
        let body = r#"{"event_type":"checkout.completed"}"#;
        let header = sign_payload(body, secret, now() - 3600);

        assert!(verify_webhook_signature(body, &header, secret, Some(300)).is_err());
    }

    #[test]
    fn rejects_malformed_header() {
        let secret = "whsec_local_test";
        let body = "{}";

        for header in ["", "t=abc,v1=00", "v1=00", "t=123"] {
            assert!(
                verify_webhook_signature(body, header, secret, Some(300)).is_err(),
                "header {header:?} should fail"
            );
        }
    }
}
