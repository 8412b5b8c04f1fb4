use axum_rental_api::config::PaymentConfig;
use axum_rental_api::payment::PaymentGateway;
use hmac::{Hmac, Mac};
use sha2::Sha256;

const SECRET: &str = "test-payment-secret";

fn gateway() -> PaymentGateway {
    PaymentGateway::new(&PaymentConfig {
        base_url: None,
        key_id: "pg_test".into(),
        key_secret: SECRET.into(),
        currency: "USD".into(),
    })
}

fn sign(gateway_order_id: &str, payment_id: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).expect("hmac key");
    mac.update(format!("{gateway_order_id}|{payment_id}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[test]
fn valid_signature_is_accepted() {
    let gw = gateway();
    let signature = sign("pg_abc123", "pay_42");
    assert!(gw.verify_signature("pg_abc123", "pay_42", &signature));
}

#[test]
fn tampered_payment_id_is_rejected() {
    let gw = gateway();
    let signature = sign("pg_abc123", "pay_42");
    assert!(!gw.verify_signature("pg_abc123", "pay_43", &signature));
    assert!(!gw.verify_signature("pg_other", "pay_42", &signature));
}

#[test]
fn malformed_signature_is_rejected() {
    let gw = gateway();
    assert!(!gw.verify_signature("pg_abc123", "pay_42", "not-hex"));
    assert!(!gw.verify_signature("pg_abc123", "pay_42", ""));
    assert!(!gw.verify_signature("pg_abc123", "pay_42", "deadbeef"));
}

#[tokio::test]
async fn local_mode_mints_intent_references() {
    let gw = gateway();
    let id = gw
        .create_intent(4900, "USD", "ORD-test")
        .await
        .expect("local intent");
    assert!(id.starts_with("pg_"));

    let other = gw.create_intent(4900, "USD", "ORD-test").await.unwrap();
    assert_ne!(id, other);
}
