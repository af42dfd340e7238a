//! Campaign progress tracker entry point.
//!
//! Starts a background refresher that periodically reads every tracked
//! campaign's deadline, goal and balance over JSON-RPC and reconciles the
//! cached progress in SQLite.  Simultaneously exposes a small Axum REST API
//! for the frontend.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use progress_tracker::api::{self, ApiState};
use progress_tracker::config::Config;
use progress_tracker::db::{self, SqliteStore};
use progress_tracker::oracle::{HttpPriceOracle, PriceBook};
use progress_tracker::refresher::{self, RefresherState};
use progress_tracker::rpc::RpcChainReader;
use progress_tracker::ProgressStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    let pool = db::init_pool(&config.database_url).await?;

    // HTTP client shared by the chain reader and the price oracle.
    let client = Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()?;

    let oracle = HttpPriceOracle::new(
        client.clone(),
        &config.price_api_url,
        &config.native_price_id,
        &config.stable_price_id,
    );
    let store = Arc::new(ProgressStore::new(
        SqliteStore::new(pool),
        PriceBook::new(oracle, config.fallback_prices),
    ));
    let chain = RpcChainReader::new(
        client,
        &config.rpc_url,
        &config.contract_methods,
        config.rpc_max_attempts,
    );

    // ─── Background refresher ─────────────────────────────
    let shutdown = CancellationToken::new();
    let refresher_state = Arc::new(RefresherState {
        store: Arc::clone(&store),
        chain: chain.clone(),
        campaigns: config.campaigns.clone(),
        interval: Duration::from_secs(config.refresh_interval_secs),
    });
    let refresher_task = tokio::spawn(refresher::run(refresher_state, shutdown.clone()));

    // ─── REST API ─────────────────────────────────────────
    let app = api::router(Arc::new(ApiState { store, chain }))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    shutdown.cancel();
    refresher_task.await?;
    Ok(())
}
