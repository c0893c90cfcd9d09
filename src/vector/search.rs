//! Vector search: partition fan-out, region fan-out per partition, and the
//! brute-force re-query of regions whose disk-resident index has no data.

use super::merge::{self, CandidateMap};
use super::params::{SearchParam, VectorSearchParameter};
use crate::client::ClientContext;
use crate::error::{Result, ShardlineError};
use crate::index::IndexDescriptor;
use crate::region::Region;
use crate::rpc::{self, RpcContext, VectorSearchRequest, VectorSearchResponse};
use crate::task::{reject_overlapping, DoneCallback, DoneSlot, Gather, ScatterTask};
use crate::types::{PartitionId, SearchResult, VectorWithId};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Default)]
struct SearchState {
    parameter: Option<Arc<VectorSearchParameter>>,
    pending_parts: BTreeSet<PartitionId>,
    candidates: CandidateMap,
}

/// Searches every partition of a vector index for the nearest neighbours of
/// a batch of query vectors.
pub struct VectorSearchTask {
    ctx: ClientContext,
    index: Arc<IndexDescriptor>,
    param: SearchParam,
    queries: Arc<Vec<VectorWithId>>,
    gather: Gather<SearchState>,
    done: DoneSlot<Vec<SearchResult>>,
}

impl VectorSearchTask {
    pub fn new(
        ctx: ClientContext,
        index: Arc<IndexDescriptor>,
        param: SearchParam,
        queries: Vec<VectorWithId>,
    ) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            index,
            param,
            queries: Arc::new(queries),
            gather: Gather::new(SearchState::default()),
            done: DoneSlot::new(),
        })
    }

    /// Partitions that have not answered successfully yet.
    pub fn pending_partitions(&self) -> Vec<PartitionId> {
        self.gather.read().data.pending_parts.iter().copied().collect()
    }

    /// Wire parameters resolved by `init`.
    pub fn parameter(&self) -> Option<Arc<VectorSearchParameter>> {
        self.gather.read().data.parameter.clone()
    }

    fn on_part_done(&self, part_id: PartitionId, status: Result<()>, candidates: CandidateMap) {
        if let Err(e) = &status {
            tracing::warn!("[{}] partition {} failed: {}", self.name(), part_id, e);
        }
        let drained = self.gather.complete(status.map(|()| candidates), |state, candidates| {
            merge::append_candidates(&mut state.candidates, candidates);
            state.pending_parts.remove(&part_id);
            Ok(())
        });
        if drained {
            self.finish();
        }
    }

    fn finish(&self) {
        let (status, results) = {
            let state = self.gather.read();
            let results = merge::build_results(
                &self.queries,
                &state.data.candidates,
                self.param.topk,
                self.param.enable_range_search,
            );
            (state.status.to_result(), results)
        };
        tracing::debug!(
            "[{}] finished: {} queries, status {:?}",
            self.name(),
            results.len(),
            status
        );
        self.done.fire(status, results);
    }
}

impl ScatterTask for VectorSearchTask {
    type Output = Vec<SearchResult>;

    fn name(&self) -> String {
        format!("SEARCH idx={}", self.index.id())
    }

    fn init(&self) -> Result<()> {
        if self.queries.is_empty() {
            return Err(ShardlineError::InvalidArgument(
                "no query vectors to search".into(),
            ));
        }
        let index_type = self.index.vector_index_type().ok_or_else(|| {
            ShardlineError::InvalidArgument(format!(
                "index {} is not a vector index",
                self.index.id()
            ))
        })?;
        let parameter =
            VectorSearchParameter::build(&self.param, index_type, self.index.scalar_schema())?;

        let mut state = self.gather.write();
        state.data.parameter = Some(Arc::new(parameter));
        state.data.pending_parts = self.index.partition_ids();
        state.data.candidates.clear();
        Ok(())
    }

    fn do_async(self: &Arc<Self>, done: DoneCallback<Self::Output>) {
        if let Err(done) = self.done.arm(done) {
            reject_overlapping(&self.name(), done);
            return;
        }

        let (parts, parameter) = {
            let mut state = self.gather.write();
            state.status.clear();
            (state.data.pending_parts.clone(), state.data.parameter.clone())
        };
        let Some(parameter) = parameter else {
            self.done.fire(
                Err(ShardlineError::Internal(format!(
                    "{} dispatched before init",
                    self.name()
                ))),
                Vec::new(),
            );
            return;
        };

        if parts.is_empty() {
            self.finish();
            return;
        }

        tracing::debug!("[{}] dispatching {} partitions", self.name(), parts.len());
        self.gather.begin_round(parts.len());
        for part_id in parts {
            let part = VectorSearchPartTask::new(
                self.ctx.clone(),
                Arc::clone(&self.index),
                part_id,
                Arc::clone(&parameter),
                Arc::clone(&self.queries),
            );
            if let Err(e) = part.init() {
                self.on_part_done(part_id, Err(e), CandidateMap::new());
                continue;
            }
            let this = Arc::clone(self);
            part.do_async(Box::new(move |status, candidates| {
                this.on_part_done(part_id, status, candidates)
            }));
        }
    }
}

/// Progress of a partition search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartPhase {
    #[default]
    Idle,
    Dispatched,
    AwaitingFallback,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Round {
    First,
    Fallback,
}

#[derive(Default)]
struct PartState {
    phase: PartPhase,
    no_data_regions: Vec<Arc<Region>>,
    candidates: CandidateMap,
}

/// Searches one partition: one request per covering region, then one
/// brute-force request per region that reported no data loaded.
pub struct VectorSearchPartTask {
    ctx: ClientContext,
    index: Arc<IndexDescriptor>,
    part_id: PartitionId,
    parameter: Arc<VectorSearchParameter>,
    queries: Arc<Vec<VectorWithId>>,
    gather: Gather<PartState>,
    done: DoneSlot<CandidateMap>,
}

impl VectorSearchPartTask {
    pub fn new(
        ctx: ClientContext,
        index: Arc<IndexDescriptor>,
        part_id: PartitionId,
        parameter: Arc<VectorSearchParameter>,
        queries: Arc<Vec<VectorWithId>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            index,
            part_id,
            parameter,
            queries,
            gather: Gather::new(PartState::default()),
            done: DoneSlot::new(),
        })
    }

    pub fn part_id(&self) -> PartitionId {
        self.part_id
    }

    pub fn phase(&self) -> PartPhase {
        self.gather.read().data.phase
    }

    fn dispatch(self: &Arc<Self>, region: Arc<Region>, parameter: VectorSearchParameter, round: Round) {
        let request = VectorSearchRequest {
            context: RpcContext::for_region(&region),
            parameter,
            vector_with_ids: self.queries.iter().map(VectorWithId::query_copy).collect(),
        };
        let this = Arc::clone(self);
        let target = Arc::clone(&region);
        rpc::call(self.ctx.channel.as_ref(), region, request, move |outcome| {
            this.on_region_done(target, round, outcome)
        });
    }

    fn on_region_done(
        self: &Arc<Self>,
        region: Arc<Region>,
        round: Round,
        outcome: Result<VectorSearchResponse>,
    ) {
        let query_count = self.queries.len();
        let drained = match outcome {
            Err(e) if round == Round::First && e.is_no_data() => {
                tracing::info!("[{}] region {} has no data loaded", self.name(), region.id);
                self.gather.complete(Ok(region), |state, region| {
                    state.no_data_regions.push(region);
                    Ok(())
                })
            }
            Err(e) => {
                tracing::warn!(
                    "[{}] search on region {} failed: {}",
                    self.name(),
                    region.id,
                    e
                );
                self.gather
                    .complete::<VectorSearchResponse>(Err(e), |_, _| Ok(()))
            }
            Ok(response) => self.gather.complete(Ok(response), |state, response| {
                merge::append_batches(&mut state.candidates, response.batch_results, query_count)
            }),
        };

        if drained {
            match round {
                Round::First => self.after_first_round(),
                Round::Fallback => self.finish(),
            }
        }
    }

    fn after_first_round(self: &Arc<Self>) {
        let fallback = {
            let mut state = self.gather.write();
            if !state.status.is_ok() || state.data.no_data_regions.is_empty() {
                None
            } else {
                state.data.phase = PartPhase::AwaitingFallback;
                Some(state.data.no_data_regions.clone())
            }
        };

        let Some(regions) = fallback else {
            self.finish();
            return;
        };

        tracing::info!(
            "[{}] retrying {} regions by brute force",
            self.name(),
            regions.len()
        );
        let parameter = self.parameter.for_brute_force();
        self.gather.begin_round(regions.len());
        for region in regions {
            self.dispatch(region, parameter.clone(), Round::Fallback);
        }
    }

    fn finish(&self) {
        let (status, candidates) = {
            let mut state = self.gather.write();
            state.data.phase = PartPhase::Done;
            (
                state.status.to_result(),
                std::mem::take(&mut state.data.candidates),
            )
        };
        self.done.fire(status, candidates);
    }
}

impl ScatterTask for VectorSearchPartTask {
    type Output = CandidateMap;

    fn name(&self) -> String {
        format!("SEARCH idx={} part={}", self.index.id(), self.part_id)
    }

    fn init(&self) -> Result<()> {
        if self.index.partition_range(self.part_id).is_none() {
            return Err(ShardlineError::InvalidArgument(format!(
                "index {} has no partition {}",
                self.index.id(),
                self.part_id
            )));
        }
        Ok(())
    }

    fn do_async(self: &Arc<Self>, done: DoneCallback<Self::Output>) {
        if let Err(done) = self.done.arm(done) {
            reject_overlapping(&self.name(), done);
            return;
        }

        let regions = match self.index.partition_range(self.part_id) {
            Some(range) => self.ctx.router.regions_covering_range(&range.start, &range.end),
            None => Err(ShardlineError::InvalidArgument(format!(
                "index {} has no partition {}",
                self.index.id(),
                self.part_id
            ))),
        };
        let regions = match regions {
            Ok(regions) => regions,
            Err(e) => {
                tracing::warn!("[{}] region lookup failed: {}", self.name(), e);
                self.done.fire(Err(e), CandidateMap::new());
                return;
            }
        };

        {
            let mut state = self.gather.write();
            state.status.clear();
            state.data = PartState {
                phase: PartPhase::Dispatched,
                ..PartState::default()
            };
        }

        if regions.is_empty() {
            self.finish();
            return;
        }

        tracing::debug!("[{}] dispatching {} regions", self.name(), regions.len());
        self.gather.begin_round(regions.len());
        for region in regions {
            self.dispatch(region, (*self.parameter).clone(), Round::First);
        }
    }
}
