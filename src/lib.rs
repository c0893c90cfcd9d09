//! Client-side scatter-gather engine for range-partitioned vector and
//! document indexes.
//!
//! A logical operation is split into per-partition or per-region requests,
//! dispatched through a [`StoreChannel`], and gathered back into one result
//! and one status. See [`task`] for the engine and [`Client`] for the
//! high-level entry points.

pub mod client;
pub mod codec;
pub mod config;
pub mod document;
pub mod error;
pub mod filter;
pub mod index;
pub mod logging;
pub mod region;
pub mod rpc;
pub mod task;
pub mod types;
pub mod vector;

pub use client::{Client, ClientContext};
pub use config::TopologyConfig;
pub use document::DocumentBatchQueryTask;
pub use error::{RemoteErrorKind, Result, ShardlineError};
pub use index::{IndexCache, IndexDescriptor, IndexType, VectorIndexType};
pub use region::{KeyRange, RangeRouter, Region, RegionEpoch, RegionRouter};
pub use rpc::{RpcCallback, StoreChannel, StoreRequest, StoreResponse};
pub use task::{execute, resume, DoneCallback, ScatterTask, TaskOutcome};
pub use types::*;
pub use vector::{SearchParam, VectorSearchPartTask, VectorSearchTask, VectorUpsertTask};
