use crate::client::ClientContext;
use crate::error::{Result, ShardlineError};
use crate::index::{IndexDescriptor, IndexType};
use crate::region::Region;
use crate::rpc::{self, DocumentBatchQueryRequest, DocumentBatchQueryResponse, RpcContext};
use crate::task::{reject_overlapping, DoneCallback, DoneSlot, Gather, ScatterTask};
use crate::types::{DocId, DocQueryParam, DocWithId, RegionId};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Default)]
struct QueryState {
    pending: BTreeSet<DocId>,
    docs: Vec<DocWithId>,
}

/// Looks up documents by id, one request per owning region. Documents come
/// back in arrival order; ids the stores do not know are left out.
pub struct DocumentBatchQueryTask {
    ctx: ClientContext,
    index: Arc<IndexDescriptor>,
    param: DocQueryParam,
    gather: Gather<QueryState>,
    done: DoneSlot<Vec<DocWithId>>,
}

impl DocumentBatchQueryTask {
    pub fn new(ctx: ClientContext, index: Arc<IndexDescriptor>, param: DocQueryParam) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            index,
            param,
            gather: Gather::new(QueryState::default()),
            done: DoneSlot::new(),
        })
    }

    pub fn pending_ids(&self) -> Vec<DocId> {
        self.gather.read().data.pending.iter().copied().collect()
    }

    fn build_request(&self, region: &Region, document_ids: Vec<DocId>) -> DocumentBatchQueryRequest {
        DocumentBatchQueryRequest {
            context: RpcContext::for_region(region),
            document_ids,
            without_scalar_data: !self.param.with_scalar_data,
            selected_keys: if self.param.with_scalar_data {
                self.param.selected_keys.clone()
            } else {
                Vec::new()
            },
        }
    }

    fn on_region_done(
        &self,
        region_id: RegionId,
        requested: Vec<DocId>,
        outcome: Result<DocumentBatchQueryResponse>,
    ) {
        if let Err(e) = &outcome {
            tracing::warn!(
                "[{}] query on region {} failed for {} ids: {}",
                self.name(),
                region_id,
                requested.len(),
                e
            );
        }
        let drained = self.gather.complete(outcome, |state, response| {
            let returned = response.documents.len();
            state
                .docs
                .extend(response.documents.into_iter().filter(|d| d.id > 0));
            for id in &requested {
                state.pending.remove(id);
            }
            if returned != requested.len() {
                return Err(ShardlineError::Internal(format!(
                    "region {} returned {} documents for {} ids",
                    region_id,
                    returned,
                    requested.len()
                )));
            }
            Ok(())
        });
        if drained {
            self.finish();
        }
    }

    fn finish(&self) {
        let (status, docs) = {
            let state = self.gather.read();
            (state.status.to_result(), state.data.docs.clone())
        };
        self.done.fire(status, docs);
    }
}

impl ScatterTask for DocumentBatchQueryTask {
    type Output = Vec<DocWithId>;

    fn name(&self) -> String {
        format!("DOC_QUERY idx={}", self.index.id())
    }

    fn init(&self) -> Result<()> {
        if self.index.index_type() != IndexType::Document {
            return Err(ShardlineError::InvalidArgument(format!(
                "index {} is not a document index",
                self.index.id()
            )));
        }
        if self.param.doc_ids.is_empty() {
            return Err(ShardlineError::InvalidArgument("no document ids to query".into()));
        }

        let mut ids = BTreeSet::new();
        for &id in &self.param.doc_ids {
            if id <= 0 {
                return Err(ShardlineError::InvalidArgument(format!(
                    "invalid document id: {}",
                    id
                )));
            }
            if !ids.insert(id) {
                return Err(ShardlineError::InvalidArgument(format!(
                    "duplicate document id: {}",
                    id
                )));
            }
        }

        let mut state = self.gather.write();
        state.data.pending = ids;
        state.data.docs.clear();
        Ok(())
    }

    fn do_async(self: &Arc<Self>, done: DoneCallback<Self::Output>) {
        if let Err(done) = self.done.arm(done) {
            reject_overlapping(&self.name(), done);
            return;
        }

        let pending = {
            let mut state = self.gather.write();
            state.status.clear();
            state.data.pending.clone()
        };
        if pending.is_empty() {
            self.finish();
            return;
        }

        let mut groups: IndexMap<RegionId, (Arc<Region>, Vec<DocId>)> = IndexMap::new();
        for id in pending {
            match self.ctx.router.region_owning(&self.index.id_to_range_key(id)) {
                Ok(region) => groups
                    .entry(region.id)
                    .or_insert_with(|| (Arc::clone(&region), Vec::new()))
                    .1
                    .push(id),
                Err(e) => {
                    tracing::warn!("[{}] region lookup for doc {} failed: {}", self.name(), id, e);
                    self.gather.write().status.record(e.clone());
                    let docs = self.gather.read().data.docs.clone();
                    self.done.fire(Err(e), docs);
                    return;
                }
            }
        }

        tracing::debug!("[{}] dispatching to {} regions", self.name(), groups.len());
        self.gather.begin_round(groups.len());
        for (region_id, (region, ids)) in groups {
            let request = self.build_request(&region, ids.clone());
            let this = Arc::clone(self);
            rpc::call(self.ctx.channel.as_ref(), region, request, move |outcome| {
                this.on_region_done(region_id, ids, outcome)
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{KeyRange, RangeRouter};
    use crate::rpc::{RpcCallback, StoreChannel, StoreRequest};

    struct Unreachable;

    impl StoreChannel for Unreachable {
        fn send(&self, _region: Arc<Region>, _request: StoreRequest, _done: RpcCallback) {
            panic!("nothing should be dispatched");
        }
    }

    fn task(ids: Vec<DocId>, with_scalar_data: bool) -> Arc<DocumentBatchQueryTask> {
        let index = IndexDescriptor::range_partitioned(9, "docs", IndexType::Document, &[], &[90])
            .unwrap();
        let ctx = ClientContext::new(Arc::new(RangeRouter::new()), Arc::new(Unreachable));
        DocumentBatchQueryTask::new(
            ctx,
            Arc::new(index),
            DocQueryParam {
                doc_ids: ids,
                with_scalar_data,
                selected_keys: vec!["title".into()],
            },
        )
    }

    #[test]
    fn init_rejects_bad_ids() {
        assert!(matches!(task(vec![], false).init(), Err(ShardlineError::InvalidArgument(_))));
        assert!(matches!(task(vec![1, 0], false).init(), Err(ShardlineError::InvalidArgument(_))));
        assert!(matches!(task(vec![1, -4], false).init(), Err(ShardlineError::InvalidArgument(_))));
        assert!(matches!(task(vec![3, 3], false).init(), Err(ShardlineError::InvalidArgument(_))));
        assert!(task(vec![5, 2, 9], false).init().is_ok());
    }

    #[test]
    fn selected_keys_only_sent_with_scalar_data() {
        let region = Region::new(1, KeyRange::new(vec![], vec![]), 1);

        let without = task(vec![1], false).build_request(&region, vec![1]);
        assert!(without.without_scalar_data);
        assert!(without.selected_keys.is_empty());

        let with = task(vec![1], true).build_request(&region, vec![1]);
        assert!(!with.without_scalar_data);
        assert_eq!(with.selected_keys, vec!["title".to_string()]);
    }

    #[test]
    fn routing_failure_dispatches_nothing() {
        let task = task(vec![1, 2], false);
        task.init().unwrap();
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen2 = Arc::clone(&seen);
        task.do_async(Box::new(move |status, docs| {
            *seen2.lock().unwrap() = Some((status, docs));
        }));
        let (status, docs) = seen.lock().unwrap().take().unwrap();
        assert!(matches!(status, Err(ShardlineError::RoutingFailure(_))));
        assert!(docs.is_empty());
        assert_eq!(task.pending_ids(), vec![1, 2]);
    }
}
