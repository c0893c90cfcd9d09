use serde::{Deserialize, Serialize};
use shardline::{RemoteErrorKind, StoreId};

/// Body of a non-2xx store response that carries a region-level error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    pub errno: RemoteErrorKind,
    #[serde(default)]
    pub message: String,
}

/// Health of one configured store, from its last success and breaker state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreHealthStatus {
    pub store_id: StoreId,
    pub addr: String,
    /// Seconds since the last successful call. None = never contacted.
    pub last_success_secs_ago: Option<u64>,
    /// "healthy" (<60s), "stale" (60-300s), "unhealthy" (>300s),
    /// "circuit_open", "never_contacted"
    pub status: String,
}
