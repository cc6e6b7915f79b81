//! Minimal Stripe REST client: checkout sessions and webhook verification

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;

use crate::config::StripeConfig;
use crate::services::session::hex;

const API_BASE: &str = "https://api.stripe.com";
/// Reject webhook deliveries signed more than five minutes ago
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Stripe API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("invalid webhook signature")]
    InvalidSignature,
    #[error("webhook timestamp outside tolerance")]
    StaleSignature,
    #[error("malformed event: {0}")]
    MalformedEvent(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct CheckoutParams {
    pub price_id: String,
    pub user_id: i64,
    pub plan_code: String,
    pub customer_email: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

/// The envelope of every webhook delivery
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: serde_json::Value,
}

#[derive(Clone)]
pub struct StripeClient {
    secret_key: String,
    webhook_secret: String,
    base_url: String,
    http: Client,
}

impl StripeClient {
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
            base_url: API_BASE.to_string(),
            http: Client::new(),
        }
    }

    pub async fn create_checkout_session(
        &self,
        params: &CheckoutParams,
    ) -> Result<CheckoutSession, StripeError> {
        let user_id = params.user_id.to_string();
        let form = [
            ("mode", "subscription"),
            ("line_items[0][price]", params.price_id.as_str()),
            ("line_items[0][quantity]", "1"),
            ("success_url", params.success_url.as_str()),
            ("cancel_url", params.cancel_url.as_str()),
            ("client_reference_id", user_id.as_str()),
            ("customer_email", params.customer_email.as_str()),
            ("metadata[plan_code]", params.plan_code.as_str()),
            ("subscription_data[metadata][user_id]", user_id.as_str()),
            ("subscription_data[metadata][plan_code]", params.plan_code.as_str()),
        ];

        let resp = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await?;
            return Err(StripeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.json().await?)
    }

    /// Verify the `Stripe-Signature` header and parse the event
    pub fn construct_event(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> Result<WebhookEvent, StripeError> {
        verify_signature(payload, signature_header, &self.webhook_secret, now)?;
        Ok(serde_json::from_slice(payload)?)
    }
}

fn signed_mac(secret: &str, timestamp: &str, payload: &[u8]) -> Result<Hmac<Sha256>, StripeError> {
    let mut mac = <Hmac<Sha256>>::new_from_slice(secret.as_bytes())
        .map_err(|_| StripeError::InvalidSignature)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Check a `t=<unix>,v1=<hex hmac>[,v1=...]` header against the payload
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), StripeError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", t)) => timestamp = Some(t),
            Some(("v1", sig)) => signatures.push(sig),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(StripeError::InvalidSignature)?;
    let signed_at: i64 = timestamp.parse().map_err(|_| StripeError::InvalidSignature)?;

    let valid = signatures.iter().filter_map(|s| hex::decode(s)).any(|expected| {
        signed_mac(secret, timestamp, payload)
            .map(|mac| mac.verify_slice(&expected).is_ok())
            .unwrap_or(false)
    });
    if !valid {
        return Err(StripeError::InvalidSignature);
    }

    if (now - signed_at).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(StripeError::StaleSignature);
    }
    Ok(())
}

/// Build a header the way Stripe does; used to sign test deliveries
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let t = timestamp.to_string();
    let sig = signed_mac(secret, &t, payload)
        .map(|mac| hex::encode(&mac.finalize().into_bytes()))
        .unwrap_or_default();
    format!("t={t},v1={sig}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const PAYLOAD: &[u8] = br#"{"id":"evt_1","type":"invoice.payment_failed","data":{"object":{"subscription":"sub_1"}}}"#;

    #[test]
    fn test_valid_signature_accepted() {
        let header = sign_payload(PAYLOAD, SECRET, 1_700_000_000);
        assert!(verify_signature(PAYLOAD, &header, SECRET, 1_700_000_010).is_ok());
    }

    #[test]
    fn test_bad_signature_rejected() {
        let header = sign_payload(PAYLOAD, "whsec_other", 1_700_000_000);
        assert!(matches!(
            verify_signature(PAYLOAD, &header, SECRET, 1_700_000_000),
            Err(StripeError::InvalidSignature)
        ));

        let tampered = br#"{"id":"evt_1","type":"invoice.paid"}"#;
        let header = sign_payload(PAYLOAD, SECRET, 1_700_000_000);
        assert!(verify_signature(tampered, &header, SECRET, 1_700_000_000).is_err());

        assert!(verify_signature(PAYLOAD, "garbage", SECRET, 0).is_err());
        assert!(verify_signature(PAYLOAD, "t=1,v1=zz", SECRET, 1).is_err());
    }

    #[test]
    fn test_stale_signature_rejected() {
        let header = sign_payload(PAYLOAD, SECRET, 1_700_000_000);
        assert!(matches!(
            verify_signature(PAYLOAD, &header, SECRET, 1_700_000_000 + SIGNATURE_TOLERANCE_SECS + 1),
            Err(StripeError::StaleSignature)
        ));
    }

    #[test]
    fn test_any_v1_may_match() {
        let good = sign_payload(PAYLOAD, SECRET, 1_700_000_000);
        let sig = good.split_once(",v1=").unwrap().1;
        let header = format!("t=1700000000,v1={},v1={}", "00".repeat(32), sig);
        assert!(verify_signature(PAYLOAD, &header, SECRET, 1_700_000_000).is_ok());
    }

    #[test]
    fn test_construct_event_parses() {
        let client = StripeClient::new(&StripeConfig {
            secret_key: "sk_test".into(),
            webhook_secret: SECRET.into(),
        });
        let header = sign_payload(PAYLOAD, SECRET, 1_700_000_000);
        let event = client.construct_event(PAYLOAD, &header, 1_700_000_000).unwrap();
        assert_eq!(event.event_type, "invoice.payment_failed");
        assert_eq!(event.data.object["subscription"], "sub_1");
    }
}
