//! LiteMaaS API server

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use litemaas_api::{logging, routes, state, AppState, Config};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing("info,litemaas_api=debug,tower_http=info");

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        bind_address = %config.bind_address,
        litellm_url = %config.litellm.base_url,
        litellm_mock = config.litellm.mock_mode,
        dev_login = config.enable_dev_login,
        "Starting LiteMaaS API"
    );

    let pool = match config.database_url.as_deref() {
        Some(database_url) => {
            // Migrations get their own connection with a long acquire timeout
            let migration_pool = litemaas_shared::create_migration_pool(database_url)
                .await
                .context("Failed to connect to database for migrations")?;
            litemaas_shared::run_migrations(&migration_pool)
                .await
                .context("Failed to run migrations")?;
            migration_pool.close().await;

            litemaas_shared::create_pool(database_url, config.database_max_connections)
                .await
                .context("Failed to connect to database")?
        }
        None => {
            tracing::warn!(
                "DATABASE_URL not set; running in mock mode with in-memory usage analytics only"
            );
            state::detached_pool()
        }
    };

    let cors = cors_layer(&config.cors_origins);
    let bind_address = config.bind_address.clone();
    let state = AppState::new(pool, config).context("Failed to build LiteLLM client")?;

    // Keep the in-memory limiter from growing without bound
    let limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            limiter.cleanup().await;
        }
    });

    let app = routes::create_router(state)
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    tracing::info!(address = %bind_address, "Server started successfully");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::CONTENT_DISPOSITION, header::RETRY_AFTER])
        .allow_credentials(true)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
