//! AdReel API server binary.

use std::net::SocketAddr;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use adreel_api::{create_router, metrics, ApiConfig, AppState, ExpirySweeper};

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    let env_filter = match "adreel=info".parse() {
        Ok(directive) => env_filter.add_directive(directive),
        Err(_) => env_filter,
    };

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Required by rustls 0.23+ before any TLS client is built
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("Failed to install rustls crypto provider");
        std::process::exit(1);
    }

    init_tracing();
    info!("Starting adreel-api");

    let config = ApiConfig::from_env();
    info!(
        "API config: host={}, port={}, store={:?}, environment={}",
        config.host, config.port, config.store_backend, config.environment
    );
    if config.admin_api_key.is_none() {
        warn!("ADMIN_API_KEY is not set, admin routes will refuse every request");
    }

    let mut state = match AppState::new(config.clone()).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create application state: {}", e);
            std::process::exit(1);
        }
    };

    if config.metrics_enabled {
        match metrics::init_metrics() {
            Ok(handle) => {
                info!("Prometheus metrics enabled at /metrics");
                state = state.with_metrics(handle);
            }
            Err(e) => warn!("Metrics disabled, recorder install failed: {}", e),
        }
    }

    let sweeper = if config.enable_expiry_sweeper {
        let sweeper = ExpirySweeper::new(state.stores.sessions.clone());
        Some(tokio::spawn(async move { sweeper.run().await }))
    } else {
        info!("Session expiry sweeper is disabled");
        None
    };

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
