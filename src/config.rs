use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub payment: PaymentConfig,
}

/// Payment gateway credentials. When `base_url` is unset the bridge runs in
/// local mode and mints its own intent references (dev/test setups).
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub base_url: Option<String>,
    pub key_id: String,
    pub key_secret: String,
    pub currency: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let jwt_secret = env::var("JWT_SECRET")?;

        let payment = PaymentConfig {
            base_url: env::var("PAYMENT_BASE_URL").ok().filter(|u| !u.is_empty()),
            key_id: env::var("PAYMENT_KEY_ID").unwrap_or_else(|_| "pg_test".to_string()),
            key_secret: env::var("PAYMENT_KEY_SECRET")
                .unwrap_or_else(|_| "dev-payment-secret".to_string()),
            currency: env::var("PAYMENT_CURRENCY").unwrap_or_else(|_| "USD".to_string()),
        };

        Ok(Self {
            port,
            database_url,
            host,
            jwt_secret,
            payment,
        })
    }
}
