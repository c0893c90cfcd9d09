use super::circuit_breaker::{CircuitBreaker, CircuitState};
use super::client::StoreClient;
use super::config::StoreConfig;
use super::types::StoreHealthStatus;
use dashmap::DashMap;
use shardline::{
    Region, RemoteErrorKind, Result, RpcCallback, ShardlineError, StoreChannel, StoreId,
    StoreRequest, StoreResponse,
};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::runtime::Handle;

/// Invokes the wrapped callback exactly once: with the call's result, or
/// with a transport error if the call is dropped before finishing.
struct CompletionGuard {
    done: Option<RpcCallback>,
    store_id: StoreId,
}

impl CompletionGuard {
    fn complete(mut self, result: Result<StoreResponse>) {
        if let Some(done) = self.done.take() {
            done(result);
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if let Some(done) = self.done.take() {
            done(Err(ShardlineError::remote(
                RemoteErrorKind::Transport,
                format!("request to store {} was abandoned", self.store_id),
            )));
        }
    }
}

/// [`StoreChannel`] over HTTP. Each call runs as its own task on the tokio
/// runtime the channel was built in.
pub struct HttpStoreChannel {
    config: StoreConfig,
    stores: DashMap<StoreId, Arc<StoreClient>>,
    runtime: Handle,
}

impl HttpStoreChannel {
    /// Build a channel bound to the current tokio runtime.
    pub fn new(config: StoreConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            ShardlineError::Config(format!("store channel needs a tokio runtime: {}", e))
        })?;
        Ok(Self::with_runtime(config, runtime))
    }

    pub fn with_runtime(config: StoreConfig, runtime: Handle) -> Self {
        let stores = DashMap::new();
        for endpoint in &config.stores {
            stores.insert(
                endpoint.store_id,
                Arc::new(StoreClient::new(
                    endpoint.store_id,
                    endpoint.addr.clone(),
                    Duration::from_millis(config.request_timeout_ms),
                    CircuitBreaker::new(
                        config.failure_threshold,
                        Duration::from_secs(config.recovery_timeout_secs),
                    ),
                )),
            );
        }
        tracing::info!(
            "[STORE] channel for client {} with {} store(s)",
            config.client_id,
            stores.len()
        );
        Self {
            config,
            stores,
            runtime,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.config.client_id
    }

    pub fn store_count(&self) -> usize {
        self.stores.len()
    }

    pub fn store(&self, store_id: StoreId) -> Option<Arc<StoreClient>> {
        self.stores.get(&store_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Health of every configured store, in configuration order.
    pub fn store_statuses(&self) -> Vec<StoreHealthStatus> {
        let now_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        self.config
            .stores
            .iter()
            .filter_map(|endpoint| {
                let client = self.store(endpoint.store_id)?;
                let last_ts = client.last_success_timestamp();
                let (secs_ago, status) = if last_ts == 0 {
                    (None, "never_contacted")
                } else {
                    let ago = now_secs.saturating_sub(last_ts);
                    let status = match client.circuit_breaker().state() {
                        CircuitState::Open => "circuit_open",
                        _ if ago < 60 => "healthy",
                        _ if ago < 300 => "stale",
                        _ => "unhealthy",
                    };
                    (Some(ago), status)
                };
                Some(StoreHealthStatus {
                    store_id: endpoint.store_id,
                    addr: endpoint.addr.clone(),
                    last_success_secs_ago: secs_ago,
                    status: status.to_string(),
                })
            })
            .collect()
    }
}

impl StoreChannel for HttpStoreChannel {
    fn send(&self, region: Arc<Region>, request: StoreRequest, done: RpcCallback) {
        let guard = CompletionGuard {
            done: Some(done),
            store_id: region.store_id,
        };

        let Some(client) = self.store(region.store_id) else {
            guard.complete(Err(ShardlineError::remote(
                RemoteErrorKind::Transport,
                format!(
                    "no address configured for store {} (region {})",
                    region.store_id, region.id
                ),
            )));
            return;
        };

        if !client.circuit_breaker().try_acquire() {
            tracing::debug!(
                "[STORE {}] skipping {} to region {} (circuit open)",
                region.store_id,
                request.method(),
                region.id
            );
            guard.complete(Err(ShardlineError::remote(
                RemoteErrorKind::Transport,
                format!("store {} circuit open", region.store_id),
            )));
            return;
        }

        let max_retries = self.config.max_retries;
        let backoff = Duration::from_millis(self.config.retry_backoff_ms);
        self.runtime.spawn(async move {
            let mut attempt = 0;
            let result = loop {
                match client.call(&request).await {
                    Err(e) if e.is_retryable() && attempt < max_retries => {
                        if !client.circuit_breaker().try_acquire() {
                            tracing::debug!(
                                "[STORE {}] not retrying {} to region {} (circuit open)",
                                client.store_id(),
                                request.method(),
                                region.id
                            );
                            break Err(e);
                        }
                        attempt += 1;
                        tracing::warn!(
                            "[STORE {}] {} to region {} failed (retry {} in {:?}): {}",
                            client.store_id(),
                            request.method(),
                            region.id,
                            attempt,
                            backoff,
                            e
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    other => break other,
                }
            };
            if let Err(e) = &result {
                tracing::debug!(
                    "[STORE {}] {} to region {} failed: {}",
                    client.store_id(),
                    request.method(),
                    region.id,
                    e
                );
            }
            guard.complete(result);
        });
    }
}
