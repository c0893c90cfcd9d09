#![allow(dead_code)]

use rand::Rng;
use shardline::codec::{self, CLIENT_RAW_PREFIX};
use shardline::rpc::{
    DocumentBatchQueryResponse, VectorAddResponse, VectorSearchBatchResult, VectorSearchResponse,
};
use shardline::task::DoneCallback;
use shardline::{
    ClientContext, DocValue, DocWithId, Document, IndexDescriptor, IndexType, KeyRange,
    MetricType, PartitionId, RangeRouter, Region, RegionId, RegionRouter, RemoteErrorKind,
    Result, RpcCallback, ShardlineError, StoreChannel, StoreRequest, StoreResponse, Vector,
    VectorIndexType, VectorWithDistance, VectorWithId,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How a [`ScriptedChannel`] delivers completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// On the caller's thread, before `send` returns.
    Inline,
    /// On a fresh thread after a short random delay.
    Threaded,
    /// Held until the test releases it.
    Deferred,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub region_id: RegionId,
    pub request: StoreRequest,
}

type Responder = Box<dyn Fn(&Region, &StoreRequest) -> Result<StoreResponse> + Send + Sync>;

struct Held {
    region_id: RegionId,
    result: Result<StoreResponse>,
    done: RpcCallback,
}

/// In-memory store channel answering from a closure.
pub struct ScriptedChannel {
    delivery: Delivery,
    responder: Responder,
    calls: Mutex<Vec<RecordedCall>>,
    held: Mutex<Vec<Held>>,
}

impl ScriptedChannel {
    pub fn new(
        delivery: Delivery,
        responder: impl Fn(&Region, &StoreRequest) -> Result<StoreResponse> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            delivery,
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, region_id: RegionId) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.region_id == region_id)
            .collect()
    }

    pub fn held(&self) -> usize {
        self.held.lock().unwrap().len()
    }

    /// Release the oldest held completion for `region_id`.
    pub fn release(&self, region_id: RegionId) -> bool {
        let held = {
            let mut held = self.held.lock().unwrap();
            match held.iter().position(|h| h.region_id == region_id) {
                Some(i) => held.remove(i),
                None => return false,
            }
        };
        (held.done)(held.result);
        true
    }

    /// Release held completions one region at a time, in `order`.
    pub fn release_in_order(&self, order: &[RegionId]) {
        for &region_id in order {
            assert!(self.release(region_id), "nothing held for region {}", region_id);
        }
    }

    pub fn release_all(&self) {
        loop {
            let next = {
                let mut held = self.held.lock().unwrap();
                if held.is_empty() {
                    return;
                }
                held.remove(0)
            };
            (next.done)(next.result);
        }
    }
}

impl StoreChannel for ScriptedChannel {
    fn send(&self, region: Arc<Region>, request: StoreRequest, done: RpcCallback) {
        let result = (self.responder)(&region, &request);
        self.calls.lock().unwrap().push(RecordedCall {
            region_id: region.id,
            request,
        });

        match self.delivery {
            Delivery::Inline => done(result),
            Delivery::Threaded => {
                let delay = rand::thread_rng().gen_range(0..3);
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(delay));
                    done(result);
                });
            }
            Delivery::Deferred => self.held.lock().unwrap().push(Held {
                region_id: region.id,
                result,
                done,
            }),
        }
    }
}

pub fn context(router: Arc<dyn RegionRouter>, channel: Arc<dyn StoreChannel>) -> ClientContext {
    ClientContext::new(router, channel)
}

pub fn vector_index(
    id: i64,
    index_type: VectorIndexType,
    separator_ids: &[i64],
    partition_ids: &[PartitionId],
) -> Arc<IndexDescriptor> {
    Arc::new(
        IndexDescriptor::range_partitioned(
            id,
            "vectors",
            IndexType::Vector(index_type),
            separator_ids,
            partition_ids,
        )
        .unwrap(),
    )
}

pub fn document_index(id: i64, separator_ids: &[i64], partition_ids: &[PartitionId]) -> Arc<IndexDescriptor> {
    Arc::new(
        IndexDescriptor::range_partitioned(id, "docs", IndexType::Document, separator_ids, partition_ids)
            .unwrap(),
    )
}

/// Regions covering partition `part_id` of `index`, split before each id in
/// `split_at`. Region ids start at `first_region_id`; store id is the region id.
pub fn partition_regions(
    index: &IndexDescriptor,
    part_id: PartitionId,
    split_at: &[i64],
    first_region_id: RegionId,
) -> Vec<Region> {
    let range = index.partition_range(part_id).unwrap();
    let mut bounds = vec![range.start.clone()];
    bounds.extend(
        split_at
            .iter()
            .map(|&id| codec::encode_item_key(CLIENT_RAW_PREFIX, part_id, id)),
    );
    bounds.push(range.end.clone());

    bounds
        .windows(2)
        .enumerate()
        .map(|(i, w)| {
            let region_id = first_region_id + i as RegionId;
            Region::new(region_id, KeyRange::new(w[0].clone(), w[1].clone()), region_id)
        })
        .collect()
}

pub fn router(regions: Vec<Region>) -> Arc<RangeRouter> {
    Arc::new(RangeRouter::from_regions(regions).unwrap())
}

pub fn query(values: &[f32]) -> VectorWithId {
    VectorWithId::new(0, Vector::float(values.to_vec()))
}

pub fn candidate(id: i64, distance: f32) -> VectorWithDistance {
    VectorWithDistance {
        vector_data: VectorWithId::new(id, Vector::float(vec![id as f32])),
        distance,
        metric_type: MetricType::L2,
    }
}

/// Search response with one batch per query; batch `i` lists `(id, distance)`.
pub fn search_response(batches: &[&[(i64, f32)]]) -> StoreResponse {
    StoreResponse::VectorSearch(VectorSearchResponse {
        batch_results: batches
            .iter()
            .map(|batch| VectorSearchBatchResult {
                vector_with_distances: batch.iter().map(|&(id, d)| candidate(id, d)).collect(),
            })
            .collect(),
    })
}

pub fn add_ok() -> StoreResponse {
    StoreResponse::VectorAdd(VectorAddResponse {})
}

pub fn document(id: i64) -> DocWithId {
    let mut doc = Document::default();
    doc.fields.insert("title".into(), DocValue::String(format!("doc-{}", id)));
    DocWithId { id, doc }
}

pub fn documents_response(docs: Vec<DocWithId>) -> StoreResponse {
    StoreResponse::DocumentBatchQuery(DocumentBatchQueryResponse { documents: docs })
}

pub fn no_data() -> ShardlineError {
    ShardlineError::remote(RemoteErrorKind::NoDataLoaded, "diskann index has no data")
}

pub fn server_error(message: &str) -> ShardlineError {
    ShardlineError::remote(RemoteErrorKind::Server, message)
}

/// Completion slot for driving `do_async` by hand.
pub struct Captured<O> {
    slot: Arc<Mutex<Vec<(Result<()>, O)>>>,
}

impl<O: Send + 'static> Captured<O> {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn callback(&self) -> DoneCallback<O> {
        let slot = Arc::clone(&self.slot);
        Box::new(move |status, output| slot.lock().unwrap().push((status, output)))
    }

    pub fn fired(&self) -> usize {
        self.slot.lock().unwrap().len()
    }

    /// The single completion delivered so far.
    pub fn take(&self) -> (Result<()>, O) {
        let mut slot = self.slot.lock().unwrap();
        assert_eq!(slot.len(), 1, "expected exactly one completion");
        slot.remove(0)
    }
}
