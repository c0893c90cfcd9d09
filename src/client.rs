use crate::config::TopologyConfig;
use crate::document::DocumentBatchQueryTask;
use crate::error::Result;
use crate::index::IndexCache;
use crate::region::RegionRouter;
use crate::rpc::StoreChannel;
use crate::task::execute;
use crate::types::{DocQueryParam, DocWithId, IndexId, SearchResult, VectorWithId};
use crate::vector::{SearchParam, VectorSearchTask, VectorUpsertTask};
use std::sync::Arc;

/// Collaborators every task dispatches through.
#[derive(Clone)]
pub struct ClientContext {
    pub router: Arc<dyn RegionRouter>,
    pub channel: Arc<dyn StoreChannel>,
}

impl ClientContext {
    pub fn new(router: Arc<dyn RegionRouter>, channel: Arc<dyn StoreChannel>) -> Self {
        Self { router, channel }
    }
}

/// Entry point for applications: resolves index ids, builds tasks and runs
/// them to completion.
///
/// The `new_*` constructors return tasks for callers that want to drive
/// `init`/`do_async` themselves, e.g. to retry an upsert round.
#[derive(Clone)]
pub struct Client {
    ctx: ClientContext,
    indexes: Arc<IndexCache>,
}

impl Client {
    pub fn new(router: Arc<dyn RegionRouter>, channel: Arc<dyn StoreChannel>) -> Self {
        Self {
            ctx: ClientContext::new(router, channel),
            indexes: Arc::new(IndexCache::new()),
        }
    }

    pub fn with_index_cache(ctx: ClientContext, indexes: Arc<IndexCache>) -> Self {
        Self { ctx, indexes }
    }

    /// Client over the regions and indexes described by `topology`.
    pub fn from_topology(topology: &TopologyConfig, channel: Arc<dyn StoreChannel>) -> Result<Self> {
        let (router, indexes) = topology.build()?;
        Ok(Self::with_index_cache(
            ClientContext::new(Arc::new(router), channel),
            Arc::new(indexes),
        ))
    }

    pub fn context(&self) -> &ClientContext {
        &self.ctx
    }

    pub fn indexes(&self) -> &IndexCache {
        &self.indexes
    }

    pub fn new_vector_search(
        &self,
        index_id: IndexId,
        param: SearchParam,
        queries: Vec<VectorWithId>,
    ) -> Result<Arc<VectorSearchTask>> {
        let index = self.indexes.get(index_id)?;
        Ok(VectorSearchTask::new(self.ctx.clone(), index, param, queries))
    }

    pub fn new_vector_upsert(
        &self,
        index_id: IndexId,
        vectors: Vec<VectorWithId>,
    ) -> Result<Arc<VectorUpsertTask>> {
        let index = self.indexes.get(index_id)?;
        Ok(VectorUpsertTask::new(self.ctx.clone(), index, vectors))
    }

    pub fn new_document_batch_query(
        &self,
        index_id: IndexId,
        param: DocQueryParam,
    ) -> Result<Arc<DocumentBatchQueryTask>> {
        let index = self.indexes.get(index_id)?;
        Ok(DocumentBatchQueryTask::new(self.ctx.clone(), index, param))
    }

    /// Search `queries` across every partition of `index_id`.
    ///
    /// An error drops whatever the healthy partitions returned. Callers that
    /// want those partial results should build the task with
    /// [`Client::new_vector_search`] and run it with [`execute`], which hands
    /// back the status and the merged output together.
    pub async fn vector_search(
        &self,
        index_id: IndexId,
        param: SearchParam,
        queries: Vec<VectorWithId>,
    ) -> Result<Vec<SearchResult>> {
        let task = self.new_vector_search(index_id, param, queries)?;
        execute(&task).await.into_result()
    }

    /// Write `vectors`. On error, use [`Client::new_vector_upsert`] instead
    /// to see which ids are still pending and retry them.
    pub async fn vector_upsert(&self, index_id: IndexId, vectors: Vec<VectorWithId>) -> Result<()> {
        let task = self.new_vector_upsert(index_id, vectors)?;
        execute(&task).await.into_result()
    }

    /// Look up documents by id. Documents found before an error are
    /// discarded here; [`Client::new_document_batch_query`] plus [`execute`]
    /// keeps them.
    pub async fn document_batch_query(
        &self,
        index_id: IndexId,
        param: DocQueryParam,
    ) -> Result<Vec<DocWithId>> {
        let task = self.new_document_batch_query(index_id, param)?;
        execute(&task).await.into_result()
    }
}
