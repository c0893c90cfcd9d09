//! Requests exchanged with stores and the channel that carries them.
//!
//! The engine never talks to the network directly: it hands a
//! [`StoreRequest`] and a target [`Region`] to a [`StoreChannel`], which
//! calls back exactly once with the response or a failure.

use crate::error::{Result, ShardlineError};
use crate::region::{Region, RegionEpoch};
use crate::types::{DocId, DocWithId, RegionId, VectorWithDistance, VectorWithId};
use crate::vector::params::VectorSearchParameter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Region binding carried by every request: which region it was routed to
/// and the epoch the client saw at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcContext {
    pub region_id: RegionId,
    pub epoch: RegionEpoch,
}

impl RpcContext {
    pub fn for_region(region: &Region) -> Self {
        Self {
            region_id: region.id,
            epoch: region.epoch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSearchRequest {
    pub context: RpcContext,
    pub parameter: VectorSearchParameter,
    /// Query vectors; ids are not sent.
    pub vector_with_ids: Vec<VectorWithId>,
}

/// Candidates for one query vector, at the same position as the query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorSearchBatchResult {
    pub vector_with_distances: Vec<VectorWithDistance>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorSearchResponse {
    pub batch_results: Vec<VectorSearchBatchResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorAddRequest {
    pub context: RpcContext,
    pub vectors: Vec<VectorWithId>,
    pub is_update: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorAddResponse {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentBatchQueryRequest {
    pub context: RpcContext,
    pub document_ids: Vec<DocId>,
    pub without_scalar_data: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected_keys: Vec<String>,
}

/// Documents at the same positions as the requested ids; a non-positive id
/// marks a document that was not found.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentBatchQueryResponse {
    pub documents: Vec<DocWithId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "request")]
pub enum StoreRequest {
    VectorSearch(VectorSearchRequest),
    VectorAdd(VectorAddRequest),
    DocumentBatchQuery(DocumentBatchQueryRequest),
}

impl StoreRequest {
    pub fn method(&self) -> &'static str {
        match self {
            StoreRequest::VectorSearch(_) => VectorSearchRequest::METHOD,
            StoreRequest::VectorAdd(_) => VectorAddRequest::METHOD,
            StoreRequest::DocumentBatchQuery(_) => DocumentBatchQueryRequest::METHOD,
        }
    }

    pub fn context(&self) -> &RpcContext {
        match self {
            StoreRequest::VectorSearch(r) => &r.context,
            StoreRequest::VectorAdd(r) => &r.context,
            StoreRequest::DocumentBatchQuery(r) => &r.context,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "response")]
pub enum StoreResponse {
    VectorSearch(VectorSearchResponse),
    VectorAdd(VectorAddResponse),
    DocumentBatchQuery(DocumentBatchQueryResponse),
}

impl StoreResponse {
    pub fn method(&self) -> &'static str {
        match self {
            StoreResponse::VectorSearch(_) => VectorSearchRequest::METHOD,
            StoreResponse::VectorAdd(_) => VectorAddRequest::METHOD,
            StoreResponse::DocumentBatchQuery(_) => DocumentBatchQueryRequest::METHOD,
        }
    }
}

pub type RpcCallback = Box<dyn FnOnce(Result<StoreResponse>) + Send + 'static>;

/// Asynchronous request delivery to one region.
///
/// `send` must not block on the network and must invoke `done` exactly once,
/// on any thread, including when delivery fails.
pub trait StoreChannel: Send + Sync {
    fn send(&self, region: Arc<Region>, request: StoreRequest, done: RpcCallback);
}

/// A typed request/response pair carried over a [`StoreChannel`].
pub trait Rpc: Sized {
    type Response: Send + 'static;
    const METHOD: &'static str;

    fn into_request(self) -> StoreRequest;
    fn unwrap_response(response: StoreResponse) -> Option<Self::Response>;
}

impl Rpc for VectorSearchRequest {
    type Response = VectorSearchResponse;
    const METHOD: &'static str = "VectorSearch";

    fn into_request(self) -> StoreRequest {
        StoreRequest::VectorSearch(self)
    }

    fn unwrap_response(response: StoreResponse) -> Option<Self::Response> {
        match response {
            StoreResponse::VectorSearch(r) => Some(r),
            _ => None,
        }
    }
}

impl Rpc for VectorAddRequest {
    type Response = VectorAddResponse;
    const METHOD: &'static str = "VectorAdd";

    fn into_request(self) -> StoreRequest {
        StoreRequest::VectorAdd(self)
    }

    fn unwrap_response(response: StoreResponse) -> Option<Self::Response> {
        match response {
            StoreResponse::VectorAdd(r) => Some(r),
            _ => None,
        }
    }
}

impl Rpc for DocumentBatchQueryRequest {
    type Response = DocumentBatchQueryResponse;
    const METHOD: &'static str = "DocumentBatchQuery";

    fn into_request(self) -> StoreRequest {
        StoreRequest::DocumentBatchQuery(self)
    }

    fn unwrap_response(response: StoreResponse) -> Option<Self::Response> {
        match response {
            StoreResponse::DocumentBatchQuery(r) => Some(r),
            _ => None,
        }
    }
}

/// Send a typed request and decode the typed response. A response of the
/// wrong method is reported as an internal error.
pub fn call<R, F>(channel: &dyn StoreChannel, region: Arc<Region>, request: R, done: F)
where
    R: Rpc + 'static,
    F: FnOnce(Result<R::Response>) + Send + 'static,
{
    let region_id = region.id;
    channel.send(
        region,
        request.into_request(),
        Box::new(move |outcome| {
            let typed = outcome.and_then(|response| {
                let method = response.method();
                R::unwrap_response(response).ok_or_else(|| {
                    ShardlineError::Internal(format!(
                        "region {} answered {} with a {} response",
                        region_id,
                        R::METHOD,
                        method
                    ))
                })
            });
            done(typed);
        }),
    );
}
