//! Glowcart service binary.

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use glowcart::api::{self, AppState};
use glowcart::config::Config;
use glowcart::gateway::RazorpayClient;
use glowcart::services::EventPublisher;
use glowcart::store::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, events disabled");
                None
            }
        },
        None => None,
    };

    let gateway = Arc::new(RazorpayClient::new(
        config.razorpay_url.clone(),
        config.razorpay_key_id.clone(),
        config.razorpay_key_secret.clone(),
    ));
    let state = AppState::new(
        Arc::new(PgStore::new(db)),
        gateway,
        config.webhook_secret.clone(),
        EventPublisher::new(nats),
    );
    let app = api::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("glowcart listening on {addr}");
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}
