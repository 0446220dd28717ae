//! Callback payloads and their signatures.
//!
//! The body of every callback is the canonical JSON rendering of a [`CallbackPayload`]: keys sorted, no whitespace.
//! The signature is the hex-encoded HMAC-SHA256 of exactly those bytes, keyed with the shared callback secret.
//! Recipients verify a callback with [`verify_callback`], which also rejects deliveries whose timestamp falls outside
//! the freshness window.
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use recon_common::{Amount, Secret};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::db_types::{EntryId, OrderId, OrderStatusType, PaymentOrder};

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Webhook-Timestamp";
pub const DEFAULT_FRESHNESS_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

/// Whether the order was paid. Expired orders are reported as `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub order_id: OrderId,
    /// The amount the order asked for
    pub amount: Amount,
    pub currency: String,
    pub status: PaymentOutcome,
    /// The amount of the ledger entry that paid for the order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_amount: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_entry_id: Option<EntryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<DateTime<Utc>>,
}

impl CallbackPayload {
    /// Builds the payload for a settled order. Matched orders are reported as `success`, expired orders as `failed`.
    ///
    /// Returns `None` for pending and cancelled orders, and for a matched order with no match timestamp.
    pub fn for_order(order: &PaymentOrder) -> Option<Self> {
        let (status, matched_at, expired_at) = match order.status {
            OrderStatusType::Matched => (PaymentOutcome::Success, Some(order.matched_at?), None),
            OrderStatusType::Expired => (PaymentOutcome::Failed, None, Some(order.expire_at)),
            OrderStatusType::Pending | OrderStatusType::Cancelled => return None,
        };
        Some(Self {
            order_id: order.order_id.clone(),
            amount: order.amount,
            currency: order.currency.clone(),
            status,
            paid_amount: order.matched_amount,
            matched_entry_id: order.matched_entry_id.clone(),
            matched_at,
            expired_at,
        })
    }

    /// The exact bytes that are sent and signed.
    pub fn canonical_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        // Converting to a Value first sorts the object keys.
        let value = serde_json::to_value(self)?;
        serde_json::to_vec(&value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("The callback secret cannot be used as an HMAC key. {0}")]
    InvalidKey(String),
    #[error("The signature or timestamp is malformed. {0}")]
    Malformed(String),
    #[error("The signature does not match the body")]
    Mismatch,
    #[error("The callback timestamp {timestamp} is outside the {window}s freshness window")]
    Stale { timestamp: i64, window: i64 },
}

fn keyed_mac(secret: &Secret) -> Result<HmacSha256, SignatureError> {
    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| SignatureError::InvalidKey(e.to_string()))
}

/// Hex-encoded HMAC-SHA256 of `body`.
pub fn sign_payload(secret: &Secret, body: &[u8]) -> Result<String, SignatureError> {
    let mut mac = keyed_mac(secret)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks a received callback. The signature comparison is constant-time. The timestamp is the unix time in seconds
/// sent in the timestamp header; it must lie within `freshness` of `now`.
pub fn verify_callback(
    secret: &Secret,
    body: &[u8],
    signature: &str,
    timestamp: &str,
    now: DateTime<Utc>,
    freshness: Duration,
) -> Result<(), SignatureError> {
    let timestamp = timestamp
        .trim()
        .parse::<i64>()
        .map_err(|e| SignatureError::Malformed(format!("Invalid timestamp '{timestamp}'. {e}")))?;
    let window = freshness.num_seconds();
    let skew = now.timestamp().checked_sub(timestamp).and_then(i64::checked_abs);
    if skew.map_or(true, |skew| skew > window) {
        return Err(SignatureError::Stale { timestamp, window });
    }
    let expected = hex::decode(signature.trim())
        .map_err(|e| SignatureError::Malformed(format!("The signature is not valid hex. {e}")))?;
    let mut mac = keyed_mac(secret)?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    fn payload() -> CallbackPayload {
        CallbackPayload {
            order_id: OrderId::from("ORDER123456"),
            amount: "88.02".parse().unwrap(),
            currency: "USDT".into(),
            status: PaymentOutcome::Success,
            paid_amount: Some("88.0195".parse().unwrap()),
            matched_entry_id: Some(EntryId::from("bill-77")),
            matched_at: Some(match_time()),
            expired_at: None,
        }
    }

    fn match_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 1, 12, 5, 30).unwrap()
    }

    #[test]
    fn canonical_json_is_sorted_and_compact() {
        let body = payload().canonical_json().unwrap();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            r#"{"amount":"88.02","currency":"USDT","matched_at":"2024-11-01T12:05:30Z","matched_entry_id":"bill-77","order_id":"ORDER123456","paid_amount":"88.0195","status":"success"}"#
        );
    }

    #[test]
    fn expired_payloads_report_a_failed_payment() {
        let expired = CallbackPayload {
            status: PaymentOutcome::Failed,
            paid_amount: None,
            matched_entry_id: None,
            matched_at: None,
            expired_at: Some(match_time()),
            ..payload()
        };
        let body = expired.canonical_json().unwrap();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            r#"{"amount":"88.02","currency":"USDT","expired_at":"2024-11-01T12:05:30Z","order_id":"ORDER123456","status":"failed"}"#
        );
    }

    #[test]
    fn signature_round_trip() {
        let secret = Secret::from("shared-secret");
        let body = payload().canonical_json().unwrap();
        let sig = sign_payload(&secret, &body).unwrap();
        assert_eq!(sig.len(), 64);
        assert_eq!(sign_payload(&secret, &body).unwrap(), sig);
        let now = match_time();
        let ts = now.timestamp().to_string();
        let window = Duration::seconds(DEFAULT_FRESHNESS_SECS);
        assert!(verify_callback(&secret, &body, &sig, &ts, now, window).is_ok());
    }

    #[test]
    fn any_mutation_invalidates_the_signature() {
        let secret = Secret::from("shared-secret");
        let body = payload().canonical_json().unwrap();
        let sig = sign_payload(&secret, &body).unwrap();
        let now = match_time();
        let ts = now.timestamp().to_string();
        let window = Duration::seconds(DEFAULT_FRESHNESS_SECS);
        for i in 0..body.len() {
            let mut tampered = body.clone();
            tampered[i] ^= 0x01;
            assert_eq!(verify_callback(&secret, &tampered, &sig, &ts, now, window), Err(SignatureError::Mismatch));
        }
        let other = Secret::from("another-secret");
        assert_eq!(verify_callback(&other, &body, &sig, &ts, now, window), Err(SignatureError::Mismatch));
    }

    #[test]
    fn stale_and_malformed_callbacks_are_rejected() {
        let secret = Secret::from("shared-secret");
        let body = payload().canonical_json().unwrap();
        let sig = sign_payload(&secret, &body).unwrap();
        let now = match_time();
        let window = Duration::seconds(DEFAULT_FRESHNESS_SECS);
        let old = (now.timestamp() - 301).to_string();
        assert!(matches!(verify_callback(&secret, &body, &sig, &old, now, window), Err(SignatureError::Stale { .. })));
        let ts = now.timestamp().to_string();
        assert!(matches!(
            verify_callback(&secret, &body, "not-hex", &ts, now, window),
            Err(SignatureError::Malformed(_))
        ));
        assert!(matches!(
            verify_callback(&secret, &body, &sig, "yesterday", now, window),
            Err(SignatureError::Malformed(_))
        ));
    }

    #[test]
    fn extreme_timestamps_are_stale_rather_than_overflowing() {
        let secret = Secret::from("shared-secret");
        let body = payload().canonical_json().unwrap();
        let sig = sign_payload(&secret, &body).unwrap();
        let now = match_time();
        let window = Duration::seconds(DEFAULT_FRESHNESS_SECS);
        for ts in [i64::MIN.to_string(), i64::MAX.to_string(), (i64::MIN + 1).to_string()] {
            let result = verify_callback(&secret, &body, &sig, &ts, now, window);
            assert!(matches!(result, Err(SignatureError::Stale { .. })), "{ts}: {result:?}");
        }
        let edge = (now.timestamp() + DEFAULT_FRESHNESS_SECS).to_string();
        assert!(verify_callback(&secret, &body, &sig, &edge, now, window).is_ok());
    }
}
