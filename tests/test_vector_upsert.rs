mod common;

use common::*;
use shardline::rpc::VectorAddRequest;
use shardline::task::ScatterTask;
use shardline::{
    IndexDescriptor, IndexType, Region, ShardlineError, StoreRequest, Vector, VectorIndexType,
    VectorUpsertTask, VectorWithId,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn add_request(request: &StoreRequest) -> &VectorAddRequest {
    match request {
        StoreRequest::VectorAdd(r) => r,
        other => panic!("unexpected request {:?}", other),
    }
}

fn vectors(ids: &[i64]) -> Vec<VectorWithId> {
    ids.iter()
        .map(|&id| VectorWithId::new(id, Vector::float(vec![id as f32, 0.5])))
        .collect()
}

fn sent_ids(request: &StoreRequest) -> Vec<i64> {
    add_request(request).vectors.iter().map(|v| v.id).collect()
}

#[test]
fn failed_region_keeps_its_ids_for_the_next_round() {
    let index = vector_index(10, VectorIndexType::Hnsw, &[], &[70]);
    let regions = partition_regions(&index, 70, &[1000], 1);
    let region2 = regions[1].clone();
    let router = router(regions);

    let failing = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&failing);
    let channel = ScriptedChannel::new(Delivery::Inline, move |region: &Region, _: &StoreRequest| {
        if region.id == 2 && flag.load(Ordering::SeqCst) {
            return Err(server_error("raft log full"));
        }
        Ok(add_ok())
    });

    let task = VectorUpsertTask::new(
        context(router.clone(), channel.clone()),
        index,
        vectors(&[1, 1001, 2, 1002, 3]),
    );
    task.init().unwrap();
    assert_eq!(task.pending_ids(), vec![1, 1001, 2, 1002, 3]);

    // Round 1: region 1 accepts, region 2 fails.
    let round = Captured::new();
    task.do_async(round.callback());
    let (status, ()) = round.take();
    assert!(status.is_err());
    assert_eq!(task.pending_ids(), vec![1001, 1002]);
    assert_eq!(sent_ids(&channel.calls_to(1)[0].request), vec![1, 2, 3]);
    assert_eq!(channel.calls().len(), 2);

    // Round 2: region 2 is gone from the routing table.
    router.remove(2).unwrap();
    let round = Captured::new();
    task.do_async(round.callback());
    let (status, ()) = round.take();
    assert!(matches!(status, Err(ShardlineError::RoutingFailure(_))));
    assert_eq!(channel.calls().len(), 2);
    assert_eq!(task.pending_ids(), vec![1001, 1002]);

    // Round 3: region 2 is back and healthy; only the leftovers are sent.
    router.upsert(region2).unwrap();
    failing.store(false, Ordering::SeqCst);
    let round = Captured::new();
    task.do_async(round.callback());
    let (status, ()) = round.take();
    status.unwrap();
    assert!(task.pending_ids().is_empty());

    let calls = channel.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[2].region_id, 2);
    assert_eq!(sent_ids(&calls[2].request), vec![1001, 1002]);
    assert!(add_request(&calls[2].request).is_update);

    // Nothing left: completes at once without dispatch.
    let round = Captured::new();
    task.do_async(round.callback());
    round.take().0.unwrap();
    assert_eq!(channel.calls().len(), 3);
}

#[test]
fn partly_unroutable_batch_dispatches_nothing() {
    let index = vector_index(14, VectorIndexType::Hnsw, &[], &[70]);
    let regions = partition_regions(&index, 70, &[1000], 1);
    let region2 = regions[1].clone();
    let router = router(regions);
    let channel = ScriptedChannel::new(Delivery::Inline, |_: &Region, _: &StoreRequest| Ok(add_ok()));

    let task = VectorUpsertTask::new(
        context(router.clone(), channel.clone()),
        index,
        vectors(&[1, 1001, 2, 1002, 3]),
    );
    task.init().unwrap();

    // Three ids still route to region 1; the two owned by region 2 do not.
    router.remove(2).unwrap();
    let round = Captured::new();
    task.do_async(round.callback());
    let (status, ()) = round.take();
    assert!(matches!(status, Err(ShardlineError::RoutingFailure(_))));
    assert!(channel.calls().is_empty());
    assert_eq!(task.pending_ids(), vec![1, 1001, 2, 1002, 3]);

    router.upsert(region2).unwrap();
    let round = Captured::new();
    task.do_async(round.callback());
    round.take().0.unwrap();
    assert!(task.pending_ids().is_empty());
    assert_eq!(sent_ids(&channel.calls_to(1)[0].request), vec![1, 2, 3]);
    assert_eq!(sent_ids(&channel.calls_to(2)[0].request), vec![1001, 1002]);
    assert_eq!(channel.calls().len(), 2);
}

#[test]
fn vectors_are_grouped_per_owning_region() {
    let index = vector_index(11, VectorIndexType::IvfFlat, &[500], &[70, 71]);
    let mut regions = partition_regions(&index, 70, &[100], 1);
    regions.extend(partition_regions(&index, 71, &[], 3));
    let channel = ScriptedChannel::new(Delivery::Threaded, |_: &Region, _: &StoreRequest| Ok(add_ok()));

    let task = VectorUpsertTask::new(
        context(router(regions), channel.clone()),
        index,
        vectors(&[600, 5, 150, 700, 6]),
    );
    task.init().unwrap();
    let round = Captured::new();
    task.do_async(round.callback());
    while round.fired() == 0 {
        std::thread::yield_now();
    }
    round.take().0.unwrap();

    assert_eq!(sent_ids(&channel.calls_to(1)[0].request), vec![5, 6]);
    assert_eq!(sent_ids(&channel.calls_to(2)[0].request), vec![150]);
    assert_eq!(sent_ids(&channel.calls_to(3)[0].request), vec![600, 700]);
    for call in channel.calls() {
        assert_eq!(add_request(&call.request).context.region_id, call.region_id);
    }
}

#[test]
fn init_validates_the_batch() {
    let index = Arc::new(
        IndexDescriptor::range_partitioned(12, "dim2", IndexType::Vector(VectorIndexType::Flat), &[], &[70])
            .unwrap()
            .with_dimension(2),
    );
    let channel = ScriptedChannel::new(Delivery::Inline, |_: &Region, _: &StoreRequest| Ok(add_ok()));
    let router = router(partition_regions(&index, 70, &[], 1));
    let upsert = |batch: Vec<VectorWithId>| {
        VectorUpsertTask::new(context(router.clone(), channel.clone()), Arc::clone(&index), batch)
            .init()
    };

    assert!(upsert(vectors(&[1, 2])).is_ok());
    assert!(matches!(upsert(vec![]), Err(ShardlineError::InvalidArgument(_))));
    assert!(matches!(upsert(vectors(&[1, 0])), Err(ShardlineError::InvalidArgument(_))));
    assert!(matches!(upsert(vectors(&[-4])), Err(ShardlineError::InvalidArgument(_))));
    assert!(matches!(upsert(vectors(&[7, 8, 7])), Err(ShardlineError::InvalidArgument(_))));

    let wrong_dimension = vec![VectorWithId::new(1, Vector::float(vec![1.0, 2.0, 3.0]))];
    let err = upsert(wrong_dimension).unwrap_err();
    assert!(err.to_string().contains("dimension 3"));

    let docs = document_index(13, &[], &[90]);
    let task = VectorUpsertTask::new(context(router.clone(), channel.clone()), docs, vectors(&[1]));
    assert!(matches!(task.init(), Err(ShardlineError::InvalidArgument(_))));

    assert!(channel.calls().is_empty());
}
