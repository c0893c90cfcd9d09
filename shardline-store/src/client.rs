use super::circuit_breaker::CircuitBreaker;
use super::types::RpcErrorBody;
use shardline::{RemoteErrorKind, Result, ShardlineError, StoreId, StoreRequest, StoreResponse};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// HTTP client for a single store.
pub struct StoreClient {
    store_id: StoreId,
    base_url: String,
    http_client: reqwest::Client,
    last_success: AtomicU64, // Unix timestamp in seconds
    circuit_breaker: CircuitBreaker,
}

impl StoreClient {
    pub fn new(
        store_id: StoreId,
        base_url: String,
        request_timeout: Duration,
        circuit_breaker: CircuitBreaker,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            store_id,
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
            last_success: AtomicU64::new(0),
            circuit_breaker,
        }
    }

    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn last_success_timestamp(&self) -> u64 {
        self.last_success.load(Ordering::Relaxed)
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    fn mark_success(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.last_success.store(now, Ordering::Relaxed);
        self.circuit_breaker.record_success();
    }

    fn mark_transport_failure(&self) {
        if self.circuit_breaker.record_failure() {
            tracing::warn!(
                "[STORE {}] circuit opened after {} consecutive failures",
                self.store_id,
                self.circuit_breaker.consecutive_failures()
            );
        }
    }

    /// Send one request. Region-level failures come back as
    /// [`ShardlineError::Remote`] with the store's errno; they count as a
    /// live store for the circuit breaker.
    pub async fn call(&self, request: &StoreRequest) -> Result<StoreResponse> {
        let url = format!("{}/rpc/{}", self.base_url, request.method());
        let region_id = request.context().region_id;

        let response = match self.http_client.post(&url).json(request).send().await {
            Ok(response) => response,
            Err(e) => {
                self.mark_transport_failure();
                let kind = if e.is_timeout() {
                    RemoteErrorKind::Timeout
                } else {
                    RemoteErrorKind::Transport
                };
                return Err(ShardlineError::remote(
                    kind,
                    format!("store {} region {}: {}", self.store_id, region_id, e),
                ));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return match serde_json::from_str::<RpcErrorBody>(&body) {
                Ok(err) => {
                    self.mark_success();
                    Err(ShardlineError::remote(err.errno, err.message))
                }
                Err(_) => {
                    if status.is_server_error() {
                        self.mark_transport_failure();
                    } else {
                        self.mark_success();
                    }
                    Err(ShardlineError::remote(
                        RemoteErrorKind::Server,
                        format!(
                            "store {} region {} returned {}: {}",
                            self.store_id, region_id, status, body
                        ),
                    ))
                }
            };
        }

        self.mark_success();
        response.json::<StoreResponse>().await.map_err(|e| {
            ShardlineError::remote(
                RemoteErrorKind::Server,
                format!(
                    "failed to parse {} response from store {}: {}",
                    request.method(),
                    self.store_id,
                    e
                ),
            )
        })
    }
}
