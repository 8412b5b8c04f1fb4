//! Payment gateway bridge: intent creation over the gateway's REST API and
//! HMAC-SHA256 verification of its payment callbacks. The gateway itself is
//! a black box; this module only implements the wire contract.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::{
    config::PaymentConfig,
    error::{AppError, AppResult},
};

#[derive(Clone)]
pub struct PaymentGateway {
    base_url: Option<String>,
    key_id: String,
    key_secret: String,
    pub currency: String,
    http: reqwest::Client,
}

impl PaymentGateway {
    pub fn new(config: &PaymentConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
            currency: config.currency.clone(),
            http: reqwest::Client::new(),
        }
    }

    /// Create a payment intent for `amount` minor units and return the
    /// gateway's order reference. Without a configured base URL a local
    /// reference is minted instead, which keeps dev setups working while the
    /// signature check below still applies.
    pub async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> AppResult<String> {
        let Some(base_url) = &self.base_url else {
            return Ok(format!("pg_{}", Uuid::new_v4().simple()));
        };

        let amount = amount.to_string();
        let resp: serde_json::Value = self
            .http
            .post(format!("{base_url}/v1/orders"))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .form(&[
                ("amount", amount.as_str()),
                ("currency", currency),
                ("receipt", receipt),
            ])
            .send()
            .await
            .map_err(|err| AppError::Gateway(format!("intent request failed: {err}")))?
            .json()
            .await
            .map_err(|err| AppError::Gateway(format!("invalid intent response: {err}")))?;

        resp["id"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| AppError::Gateway("intent response missing order id".into()))
    }

    /// Verify a payment callback signature: hex-encoded HMAC-SHA256 over
    /// `"{gateway_order_id}|{payment_id}"` keyed by the shared secret.
    /// Comparison is constant-time via `Mac::verify_slice`.
    pub fn verify_signature(
        &self,
        gateway_order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> bool {
        let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(self.key_secret.as_bytes()) else {
            return false;
        };
        mac.update(format!("{gateway_order_id}|{payment_id}").as_bytes());

        match hex::decode(signature) {
            Ok(sig) => mac.verify_slice(&sig).is_ok(),
            Err(_) => false,
        }
    }
}
