//! HTTP/JSON store channel for the shardline engine.
//!
//! Every region request becomes `POST {store}/rpc/{method}` with the tagged
//! [`StoreRequest`](shardline::StoreRequest) as body. Each store gets its own
//! HTTP client and circuit breaker.

pub mod channel;
pub mod circuit_breaker;
pub mod client;
pub mod config;
pub mod types;

pub use channel::HttpStoreChannel;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use client::StoreClient;
pub use config::{StoreConfig, StoreEndpoint};
pub use types::{RpcErrorBody, StoreHealthStatus};
