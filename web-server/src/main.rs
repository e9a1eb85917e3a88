use std::net::SocketAddr;
use std::sync::Arc;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ssn_filings::{
    api::create_router,
    clock::{SharedClock, SystemClock},
    database::{DatabaseConfig, DatabaseManager},
    AppConfig, Backends, Services,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "ssn_filings=info,ssn_filings_web_server=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting SSN filings web server");

    let config = AppConfig::from_env()?;
    info!(
        "SSN environment: {} (mock: {})",
        config.authority.environment, config.authority.mock_enabled
    );

    // Database connection
    let backends = match &config.database_url {
        Some(url) => {
            let db = DatabaseManager::new(DatabaseConfig::new(url.clone())).await?;
            db.test_connection().await?;
            db.run_migrations().await?;
            Backends::postgres(&db)
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory storage (data is lost on restart)");
            Backends::in_memory()
        }
    };

    let clock: SharedClock = Arc::new(SystemClock);
    let services = Services::build(&config, backends, clock)?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(services).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
