use serde::{Deserialize, Serialize};
use shardline::StoreId;
use std::path::Path;

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_max_retries() -> u32 {
    1
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_recovery_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEndpoint {
    pub store_id: StoreId,
    pub addr: String, // e.g., "http://10.0.1.2:20001"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub client_id: String,
    pub stores: Vec<StoreEndpoint>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Extra attempts after a transport failure or timeout.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,
}

impl StoreConfig {
    pub fn new(client_id: impl Into<String>, stores: Vec<StoreEndpoint>) -> Self {
        Self {
            client_id: client_id.into(),
            stores,
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
        }
    }

    /// Load store configuration from {dir}/stores.json, or build it from
    /// `SHARDLINE_*` env vars.
    pub fn load_or_default(dir: &Path) -> Self {
        let stores_json = dir.join("stores.json");

        if stores_json.exists() {
            match std::fs::read_to_string(&stores_json) {
                Ok(content) => match serde_json::from_str::<StoreConfig>(&content) {
                    Ok(config) => {
                        tracing::info!(
                            "Loaded store config: client_id={}, stores={}",
                            config.client_id,
                            config.stores.len()
                        );
                        return config;
                    }
                    Err(e) => {
                        tracing::error!("Failed to parse stores.json: {}, using env", e);
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to read stores.json: {}, using env", e);
                }
            }
        }

        let client_id = std::env::var("SHARDLINE_CLIENT_ID").unwrap_or_else(|_| {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string())
        });

        // Comma-separated "store_id=addr" pairs, e.g. "1=http://a:20001,2=http://b:20001".
        let stores = std::env::var("SHARDLINE_STORES")
            .unwrap_or_default()
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .filter_map(|entry| {
                let mut parts = entry.splitn(2, '=');
                let id = parts.next()?.trim();
                let addr = parts.next()?.trim();
                match id.parse::<StoreId>() {
                    Ok(store_id) if !addr.is_empty() => Some(StoreEndpoint {
                        store_id,
                        addr: addr.trim_end_matches('/').to_string(),
                    }),
                    _ => {
                        tracing::warn!("Ignoring malformed SHARDLINE_STORES entry: {}", entry);
                        None
                    }
                }
            })
            .collect::<Vec<_>>();

        let mut config = StoreConfig::new(client_id, stores);
        if let Ok(raw) = std::env::var("SHARDLINE_RPC_TIMEOUT_MS") {
            match raw.parse() {
                Ok(ms) => config.request_timeout_ms = ms,
                Err(_) => tracing::warn!("Ignoring invalid SHARDLINE_RPC_TIMEOUT_MS: {}", raw),
            }
        }

        tracing::info!(
            "No stores.json found, loaded {} store(s) from env: client_id={}",
            config.stores.len(),
            config.client_id
        );
        config
    }
}
