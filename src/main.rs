use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hitcount::api::{self, AppState};
use hitcount::config::{AuthMode, Config, DatabaseBackend};
use hitcount::storage::{PostgresStorage, SqliteStorage, Storage};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize storage
    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.database.url);
            Arc::new(SqliteStorage::new(&config.database.url, config.database.max_connections).await?)
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage");
            Arc::new(
                PostgresStorage::new(&config.database.url, config.database.max_connections).await?,
            )
        }
    };

    info!("Initializing database...");
    storage.init().await?;
    info!("Database initialized successfully");

    match config.auth.mode {
        AuthMode::None => info!("Authentication disabled, all visitors are anonymous"),
        AuthMode::Header => info!("Reading visitor identity from trusted proxy headers"),
        AuthMode::Jwt => info!("Reading visitor identity from HS256 bearer tokens"),
    }

    let hitcount = &config.hitcount;
    info!(
        hits_per_ip_limit = hitcount.hits_per_ip_limit,
        exclude_user_groups = ?hitcount.exclude_user_groups,
        keep_hit_active_secs = hitcount.keep_hit_active_secs,
        "Hit counting rules"
    );

    let state = Arc::new(AppState::new(Arc::clone(&storage), &config)?);
    let router = api::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Hit counter listening on http://{}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
