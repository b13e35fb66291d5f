mod api;
mod config;
mod db;
mod error;
mod fetcher;
mod rates;
mod state;
mod types;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::config::{Config, ProviderKind};
use crate::db::CounterStore;
use crate::error::Result;
use crate::fetcher::build_provider;
use crate::rates::RateService;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Counter store (lazy; a missing database is fallback mode) ---
    let counters = CounterStore::from_url(cfg.database_url.as_deref());
    if counters.is_configured() {
        if let Err(e) = counters.ensure_schema().await {
            warn!("Counter schema setup failed, will retry per request: {e}");
        }
    }

    // --- Rate proxy ---
    if cfg.rate_provider == ProviderKind::ExchangeRateApi && cfg.erate_api_key.is_none() {
        warn!("ERATE_API_KEY not set: rate refreshes will fail until it is configured");
    }
    let latency = Arc::new(LatencyStats::new());
    let rates = RateService::new(
        build_provider(&cfg, Arc::clone(&latency))?,
        Duration::from_secs(cfg.rate_cache_ttl_secs),
        cfg.default_start_rate,
    );
    info!(
        provider = %cfg.rate_provider,
        ttl_secs = cfg.rate_cache_ttl_secs,
        policy = ?cfg.failure_policy,
        "Rate proxy ready"
    );

    // --- HTTP API server ---
    let api_state = ApiState {
        counters,
        rates: Arc::new(rates),
        health: Arc::new(HealthState::new()),
        latency,
        failure_policy: cfg.failure_policy,
        counter_fallback: cfg.counter_fallback,
        fallback_start_rate: cfg.fallback_start_rate,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
