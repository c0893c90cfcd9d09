use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure kind reported by a store for a single region call.
///
/// This doubles as the wire `errno` in store error bodies, so the serde names
/// are part of the contract with the store side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// Disk-resident index on the region has not finished loading.
    NoDataLoaded,
    EpochMismatch,
    RegionNotFound,
    NotLeader,
    Transport,
    Timeout,
    Server,
}

impl RemoteErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteErrorKind::NoDataLoaded => "no_data_loaded",
            RemoteErrorKind::EpochMismatch => "epoch_mismatch",
            RemoteErrorKind::RegionNotFound => "region_not_found",
            RemoteErrorKind::NotLeader => "not_leader",
            RemoteErrorKind::Transport => "transport",
            RemoteErrorKind::Timeout => "timeout",
            RemoteErrorKind::Server => "server",
        }
    }
}

impl std::fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShardlineError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Index not found: {0}")]
    IndexNotFound(i64),

    #[error("Routing failure: {0}")]
    RoutingFailure(String),

    #[error("Remote failure ({kind}): {message}")]
    Remote {
        kind: RemoteErrorKind,
        message: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),
}

pub type Result<T> = std::result::Result<T, ShardlineError>;

impl From<std::io::Error> for ShardlineError {
    fn from(e: std::io::Error) -> Self {
        ShardlineError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for ShardlineError {
    fn from(e: serde_json::Error) -> Self {
        ShardlineError::Json(e.to_string())
    }
}

impl ShardlineError {
    pub fn remote(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        ShardlineError::Remote {
            kind,
            message: message.into(),
        }
    }

    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            ShardlineError::Remote { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// True for the recoverable "index has no data loaded" condition.
    pub fn is_no_data(&self) -> bool {
        self.remote_kind() == Some(RemoteErrorKind::NoDataLoaded)
    }

    /// Transport-level failures that are worth one more attempt against the
    /// same store. Region-level errors need fresh routing and are not retried here.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.remote_kind(),
            Some(RemoteErrorKind::Transport) | Some(RemoteErrorKind::Timeout)
        )
    }
}
