//! Shared runtime state for penalty-daemon, and the wiring that builds the
//! [`PenaltyService`] from configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use penalty_config::{ResolvedEndpoints, ServiceConfig, StoreBackend};
use penalty_engine::{BasicValidator, NotifyTopics, PageLimits, PenaltyService, ServiceDeps};
use penalty_schemas::{PenaltyGroup, PenaltyRecord};
use penalty_store::{BestEffortBatchWriter, ItemStore, MemoryStore, PgItemStore};
use penalty_upstream::{
    http_client, HttpNotificationSink, HttpPaymentOracle, HttpTokenDecoder, LogOnlySink,
    NotificationSink,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PenaltyService>,
    pub build: BuildInfo,
    /// Hash of the merged configuration the process booted with.
    pub config_hash: String,
}

impl AppState {
    pub fn new(service: Arc<PenaltyService>, config_hash: impl Into<String>) -> Self {
        Self {
            service,
            build: BuildInfo {
                service: "penalty-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            config_hash: config_hash.into(),
        }
    }
}

type Stores = (
    Arc<dyn ItemStore<PenaltyRecord>>,
    Arc<dyn ItemStore<PenaltyGroup>>,
);

async fn open_stores(cfg: &ServiceConfig, endpoints: &ResolvedEndpoints) -> Result<Stores> {
    match cfg.store_backend {
        StoreBackend::Memory => {
            warn!("store.backend=memory: records do not survive a restart");
            let documents: Arc<dyn ItemStore<PenaltyRecord>> = Arc::new(MemoryStore::new());
            let groups: Arc<dyn ItemStore<PenaltyGroup>> = Arc::new(MemoryStore::new());
            Ok((documents, groups))
        }
        StoreBackend::Postgres => {
            let url = endpoints
                .database_url
                .as_deref()
                .context("postgres backend selected without a database url")?;
            let pool = penalty_store::connect(url, cfg.max_connections).await?;
            penalty_store::migrate(&pool).await?;
            info!(max_connections = cfg.max_connections, "postgres store ready");
            let documents: Arc<dyn ItemStore<PenaltyRecord>> =
                Arc::new(PgItemStore::new(pool.clone()));
            let groups: Arc<dyn ItemStore<PenaltyGroup>> = Arc::new(PgItemStore::new(pool));
            Ok((documents, groups))
        }
    }
}

/// Build the service from configuration. The oracle and decoder are
/// required; without a sink URL notifications are logged and dropped.
pub async fn build_service(
    cfg: &ServiceConfig,
    endpoints: &ResolvedEndpoints,
) -> Result<PenaltyService> {
    let (documents, groups) = open_stores(cfg, endpoints).await?;

    let http = http_client(Duration::from_millis(cfg.upstream_timeout_ms))
        .context("failed to build http client")?;
    let oracle_url = endpoints
        .oracle_url
        .clone()
        .with_context(|| format!("env var {} must name the payment oracle", cfg.oracle_url_env))?;
    let decoder_url = endpoints
        .decoder_url
        .clone()
        .with_context(|| format!("env var {} must name the token decoder", cfg.decoder_url_env))?;
    let sink: Arc<dyn NotificationSink> = match endpoints.sink_url.clone() {
        Some(url) => Arc::new(HttpNotificationSink::new(http.clone(), url)),
        None => {
            warn!(env = %cfg.sink_url_env, "no notification sink configured; logging only");
            Arc::new(LogOnlySink)
        }
    };

    let batch_writer = Arc::new(BestEffortBatchWriter::new(
        Arc::clone(&groups),
        Arc::clone(&documents),
    ));

    Ok(PenaltyService::new(ServiceDeps {
        documents,
        groups,
        batch_writer,
        oracle: Arc::new(HttpPaymentOracle::new(http.clone(), oracle_url)),
        decoder: Arc::new(HttpTokenDecoder::new(http, decoder_url)),
        sink,
        topics: NotifyTopics {
            document: cfg.topics.document.clone(),
            group: cfg.topics.group.clone(),
        },
        validator: Arc::new(BasicValidator),
        limits: PageLimits {
            default_limit: cfg.default_page_limit,
            max_limit: cfg.max_page_limit,
        },
    }))
}
