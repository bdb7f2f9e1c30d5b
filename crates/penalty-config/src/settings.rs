//! Typed service settings extracted from the merged config tree.
//!
//! Every key has a default, so an empty document is a valid (memory-backed,
//! upstream-less) development config. URLs and the database DSN are never
//! written in YAML: the YAML names the env var, [`resolve_endpoints`] reads it.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres,
}

impl StoreBackend {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "memory" => Ok(StoreBackend::Memory),
            "postgres" => Ok(StoreBackend::Postgres),
            other => bail!("CONFIG_INVALID /store/backend: unknown backend {other:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationTopics {
    pub document: String,
    pub group: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub store_backend: StoreBackend,
    pub database_url_env: String,
    pub max_connections: u32,
    pub oracle_url_env: String,
    pub decoder_url_env: String,
    pub sink_url_env: String,
    pub upstream_timeout_ms: u64,
    pub topics: NotificationTopics,
    pub default_page_limit: usize,
    pub max_page_limit: usize,
}

impl ServiceConfig {
    pub fn from_json(v: &Value) -> Result<Self> {
        let cfg = Self {
            bind_addr: str_or(v, "/daemon/bind_addr", "127.0.0.1:8898"),
            store_backend: StoreBackend::parse(&str_or(v, "/store/backend", "memory"))?,
            database_url_env: str_or(v, "/store/database_url_env", "PENALTY_DATABASE_URL"),
            max_connections: int_or(v, "/store/max_connections", 10u32)?,
            oracle_url_env: str_or(v, "/upstream/oracle_url_env", "PENALTY_ORACLE_URL"),
            decoder_url_env: str_or(v, "/upstream/decoder_url_env", "PENALTY_DECODER_URL"),
            sink_url_env: str_or(v, "/upstream/sink_url_env", "PENALTY_SINK_URL"),
            upstream_timeout_ms: u64_or(v, "/upstream/timeout_ms", 5_000)?,
            topics: NotificationTopics {
                document: str_or(v, "/notifications/document_topic", "penalty-payments"),
                group: str_or(v, "/notifications/group_topic", "penalty-group-payments"),
            },
            default_page_limit: int_or(v, "/pagination/default_limit", 100usize)?,
            max_page_limit: int_or(v, "/pagination/max_limit", 1_000usize)?,
        };

        if cfg.default_page_limit == 0 || cfg.default_page_limit > cfg.max_page_limit {
            bail!(
                "CONFIG_INVALID /pagination: default_limit={} must be in 1..={}",
                cfg.default_page_limit,
                cfg.max_page_limit
            );
        }
        Ok(cfg)
    }
}

fn str_or(v: &Value, ptr: &str, default: &str) -> String {
    v.pointer(ptr)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn u64_or(v: &Value, ptr: &str, default: u64) -> Result<u64> {
    match v.pointer(ptr) {
        None | Some(Value::Null) => Ok(default),
        Some(x) => x
            .as_u64()
            .with_context(|| format!("CONFIG_INVALID {ptr}: expected a non-negative integer")),
    }
}

/// `u64_or` narrowed to `T`; out-of-range values are rejected, not truncated.
fn int_or<T: TryFrom<u64>>(v: &Value, ptr: &str, default: T) -> Result<T> {
    match v.pointer(ptr) {
        None | Some(Value::Null) => Ok(default),
        Some(_) => {
            let wide = u64_or(v, ptr, 0)?;
            T::try_from(wide)
                .map_err(|_| anyhow!("CONFIG_INVALID {ptr}: {wide} is out of range"))
        }
    }
}

// ---------------------------------------------------------------------------
// Endpoint resolution
// ---------------------------------------------------------------------------

/// Upstream endpoints and DSN read from the environment. Values are redacted
/// in `Debug` output; URLs can carry credentials.
#[derive(Clone)]
pub struct ResolvedEndpoints {
    pub database_url: Option<String>,
    pub oracle_url: Option<String>,
    pub decoder_url: Option<String>,
    pub sink_url: Option<String>,
}

impl std::fmt::Debug for ResolvedEndpoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |o: &Option<String>| o.as_ref().map(|_| "<REDACTED>");
        f.debug_struct("ResolvedEndpoints")
            .field("database_url", &redact(&self.database_url))
            .field("oracle_url", &redact(&self.oracle_url))
            .field("decoder_url", &redact(&self.decoder_url))
            .field("sink_url", &redact(&self.sink_url))
            .finish()
    }
}

/// Read every env var named by `cfg` through `lookup` (normally `std::env::var`).
///
/// The postgres backend requires its DSN; upstream URLs are optional here and
/// the daemon decides what a missing one means.
pub fn resolve_endpoints<F>(cfg: &ServiceConfig, lookup: F) -> Result<ResolvedEndpoints>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    let resolved = ResolvedEndpoints {
        database_url: read(&cfg.database_url_env),
        oracle_url: read(&cfg.oracle_url_env),
        decoder_url: read(&cfg.decoder_url_env),
        sink_url: read(&cfg.sink_url_env),
    };

    if cfg.store_backend == StoreBackend::Postgres && resolved.database_url.is_none() {
        bail!(
            "SECRET_MISSING: store.backend=postgres requires env var {}",
            cfg.database_url_env
        );
    }
    Ok(resolved)
}
