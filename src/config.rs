//! Environment-driven configuration.

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub webhook_secret: String,
    pub razorpay_key_id: String,
    pub razorpay_key_secret: String,
    pub razorpay_url: String,
    pub nats_url: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")?,
            port: std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(8083),
            webhook_secret: std::env::var("WEBHOOK_SECRET")?,
            razorpay_key_id: std::env::var("RAZORPAY_KEY_ID").unwrap_or_default(),
            razorpay_key_secret: std::env::var("RAZORPAY_KEY_SECRET").unwrap_or_default(),
            razorpay_url: std::env::var("RAZORPAY_URL")
                .unwrap_or_else(|_| "https://api.razorpay.com".into()),
            nats_url: std::env::var("NATS_URL").ok(),
        })
    }
}
