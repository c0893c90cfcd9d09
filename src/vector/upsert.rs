use crate::client::ClientContext;
use crate::error::{Result, ShardlineError};
use crate::index::IndexDescriptor;
use crate::region::Region;
use crate::rpc::{self, RpcContext, VectorAddRequest, VectorAddResponse};
use crate::task::{reject_overlapping, DoneCallback, DoneSlot, Gather, ScatterTask};
use crate::types::{RegionId, VectorId, VectorWithId};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Default)]
struct UpsertState {
    /// Vector id to its position in the request.
    pending: IndexMap<VectorId, usize>,
}

/// Writes a batch of vectors, one add request per owning region.
///
/// Ids leave the pending set only when the request that carried them
/// succeeds, so a failed round can be retried with another `do_async`.
pub struct VectorUpsertTask {
    ctx: ClientContext,
    index: Arc<IndexDescriptor>,
    vectors: Vec<VectorWithId>,
    gather: Gather<UpsertState>,
    done: DoneSlot<()>,
}

impl VectorUpsertTask {
    pub fn new(ctx: ClientContext, index: Arc<IndexDescriptor>, vectors: Vec<VectorWithId>) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            index,
            vectors,
            gather: Gather::new(UpsertState::default()),
            done: DoneSlot::new(),
        })
    }

    /// Ids not yet confirmed by their region, in request order.
    pub fn pending_ids(&self) -> Vec<VectorId> {
        self.gather.read().data.pending.keys().copied().collect()
    }

    fn group_by_region(
        &self,
        pending: &[(VectorId, usize)],
    ) -> Result<IndexMap<RegionId, (Arc<Region>, Vec<usize>)>> {
        let mut groups: IndexMap<RegionId, (Arc<Region>, Vec<usize>)> = IndexMap::new();
        for &(id, position) in pending {
            let region = self.ctx.router.region_owning(&self.index.id_to_range_key(id))?;
            groups
                .entry(region.id)
                .or_insert_with(|| (Arc::clone(&region), Vec::new()))
                .1
                .push(position);
        }
        Ok(groups)
    }

    fn on_region_done(&self, region_id: RegionId, ids: Vec<VectorId>, outcome: Result<VectorAddResponse>) {
        if let Err(e) = &outcome {
            tracing::warn!(
                "[{}] add to region {} failed for {} vectors: {}",
                self.name(),
                region_id,
                ids.len(),
                e
            );
        }
        let drained = self.gather.complete(outcome, |state, _| {
            let confirmed: HashSet<VectorId> = ids.into_iter().collect();
            state.pending.retain(|id, _| !confirmed.contains(id));
            Ok(())
        });
        if drained {
            let status = self.gather.status();
            tracing::debug!(
                "[{}] round finished, {} still pending",
                self.name(),
                self.gather.read().data.pending.len()
            );
            self.done.fire(status, ());
        }
    }
}

impl ScatterTask for VectorUpsertTask {
    type Output = ();

    fn name(&self) -> String {
        format!("UPSERT idx={}", self.index.id())
    }

    fn init(&self) -> Result<()> {
        if self.vectors.is_empty() {
            return Err(ShardlineError::InvalidArgument("no vectors to upsert".into()));
        }
        if self.index.vector_index_type().is_none() {
            return Err(ShardlineError::InvalidArgument(format!(
                "index {} is not a vector index",
                self.index.id()
            )));
        }

        let mut seen = HashSet::with_capacity(self.vectors.len());
        for v in &self.vectors {
            if v.id <= 0 {
                return Err(ShardlineError::InvalidArgument(format!(
                    "vector id must be positive, got {}",
                    v.id
                )));
            }
            if !seen.insert(v.id) {
                return Err(ShardlineError::InvalidArgument(format!(
                    "duplicate vector id {}",
                    v.id
                )));
            }
            if let Some(dimension) = self.index.dimension() {
                if v.vector.dimension != dimension {
                    return Err(ShardlineError::InvalidArgument(format!(
                        "vector {} has dimension {}, index expects {}",
                        v.id, v.vector.dimension, dimension
                    )));
                }
            }
        }

        let mut state = self.gather.write();
        state.data.pending = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, v)| (v.id, position))
            .collect();
        Ok(())
    }

    fn do_async(self: &Arc<Self>, done: DoneCallback<Self::Output>) {
        if let Err(done) = self.done.arm(done) {
            reject_overlapping(&self.name(), done);
            return;
        }

        let pending: Vec<(VectorId, usize)> = {
            let mut state = self.gather.write();
            state.status.clear();
            state.data.pending.iter().map(|(&id, &pos)| (id, pos)).collect()
        };
        if pending.is_empty() {
            self.done.fire(Ok(()), ());
            return;
        }

        let groups = match self.group_by_region(&pending) {
            Ok(groups) => groups,
            Err(e) => {
                tracing::warn!("[{}] region lookup failed: {}", self.name(), e);
                self.gather.write().status.record(e.clone());
                self.done.fire(Err(e), ());
                return;
            }
        };

        tracing::debug!(
            "[{}] dispatching {} vectors to {} regions",
            self.name(),
            pending.len(),
            groups.len()
        );
        self.gather.begin_round(groups.len());
        for (region_id, (region, positions)) in groups {
            let vectors: Vec<VectorWithId> =
                positions.iter().map(|&p| self.vectors[p].clone()).collect();
            let ids = vectors.iter().map(|v| v.id).collect();
            let request = VectorAddRequest {
                context: RpcContext::for_region(&region),
                vectors,
                is_update: true,
            };
            let this = Arc::clone(self);
            rpc::call(self.ctx.channel.as_ref(), region, request, move |outcome| {
                this.on_region_done(region_id, ids, outcome)
            });
        }
    }
}
