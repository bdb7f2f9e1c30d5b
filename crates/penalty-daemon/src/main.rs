//! penalty-daemon entry point.
//!
//! Thin: loads configuration, sets up tracing, builds the service, wires
//! middleware, and starts the HTTP server. Route handlers live in
//! `routes.rs`; service wiring lives in `state.rs`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use penalty_config::{
    load_layered_yaml, report_unused_keys, resolve_endpoints, ServiceConfig, UnusedKeyPolicy,
};
use penalty_daemon::{routes, state};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn, Level};

const DEFAULT_CONFIG_PATHS: &str = "config/base.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let paths = std::env::var("PENALTY_CONFIG_PATHS")
        .unwrap_or_else(|_| DEFAULT_CONFIG_PATHS.to_string());
    let path_list: Vec<&str> = paths
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    let loaded = load_layered_yaml(&path_list).context("config load failed")?;

    let unused = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for key in &unused.unused_leaf_pointers {
        warn!(key = %key, "config key is not read by anything");
    }

    let cfg = ServiceConfig::from_json(&loaded.config_json)?;
    let endpoints = resolve_endpoints(&cfg, |name| std::env::var(name).ok())?;
    info!(
        config_hash = %loaded.config_hash,
        backend = ?cfg.store_backend,
        endpoints = ?endpoints,
        "configuration loaded"
    );

    let service = state::build_service(&cfg, &endpoints).await?;
    let shared = Arc::new(state::AppState::new(Arc::new(service), loaded.config_hash));

    let app = routes::build_router(shared).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let addr: SocketAddr = cfg
        .bind_addr
        .parse()
        .with_context(|| format!("daemon.bind_addr {:?} is not a socket address", cfg.bind_addr))?;
    info!("penalty-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler failed; shutting down");
    }
    info!("shutdown requested");
}
