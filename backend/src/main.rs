use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use voter_server::{app, config::Config, db, sms::SmsGateway, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    info!("🚀 Starting Voter Management Server...");

    let config = Config::from_env()?;

    info!("📦 Connecting to database...");
    let pool = db::connect(&config).await?;
    info!("✅ Database connected successfully");

    db::migrate(&pool).await?;
    info!("✅ Database schema up to date");

    db::seed_default_admin(&pool).await?;

    let sms = SmsGateway::from_config(&config).context("failed to build SMS gateway client")?;
    if sms.is_simulated() {
        info!("📨 SMS_GATEWAY_URL not set, SMS delivery is simulated");
    }

    let addr = SocketAddr::new(config.host, config.port);
    let state = Arc::new(AppState {
        db: pool,
        config,
        sms,
    });

    let app = app(state);

    info!("🌐 Server listening on http://{}", addr);
    info!("📊 Health check: http://{}/api/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
