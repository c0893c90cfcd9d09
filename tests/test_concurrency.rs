mod common;

use common::*;
use shardline::task::ScatterTask;
use shardline::{
    Region, SearchParam, ShardlineError, StoreRequest, VectorIndexType, VectorSearchTask,
};
use std::sync::Arc;
use std::time::Duration;

const PARTITIONS: i64 = 8;
const QUERIES: usize = 4;

/// Eight partitions of ids 0..8000, three regions each. Region ids are
/// `part * 10 + 1..=3`.
fn wide_index() -> (Arc<shardline::IndexDescriptor>, Arc<shardline::RangeRouter>) {
    let separators: Vec<i64> = (1..PARTITIONS).map(|p| p * 1000).collect();
    let parts: Vec<i64> = (0..PARTITIONS).map(|p| 100 + p).collect();
    let index = vector_index(30, VectorIndexType::IvfPq, &separators, &parts);

    let mut regions = Vec::new();
    for (i, &part) in parts.iter().enumerate() {
        let base = i as i64 * 1000;
        regions.extend(partition_regions(
            &index,
            part,
            &[base + 300, base + 600],
            i as i64 * 10 + 1,
        ));
    }
    (index, router(regions))
}

/// Every region returns one candidate per query; the distance encodes the
/// region so the global order is known up front.
fn scatter_store(region: &Region, _: &StoreRequest) -> shardline::Result<shardline::StoreResponse> {
    let batches: Vec<Vec<(i64, f32)>> = (0..QUERIES)
        .map(|q| vec![(region.id, region.id as f32 + q as f32 / 10.0)])
        .collect();
    let borrowed: Vec<&[(i64, f32)]> = batches.iter().map(Vec::as_slice).collect();
    Ok(search_response(&borrowed))
}

fn wait_for(captured: &Captured<Vec<shardline::SearchResult>>) {
    while captured.fired() == 0 {
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn threaded_completions_finalize_exactly_once() {
    let (index, router) = wide_index();
    let channel = ScriptedChannel::new(Delivery::Threaded, scatter_store);
    let queries: Vec<_> = (0..QUERIES).map(|q| query(&[q as f32])).collect();

    let mut expected: Vec<i64> = (0..PARTITIONS)
        .flat_map(|p| (1..=3).map(move |r| p * 10 + r))
        .collect();
    expected.sort_unstable();

    for _ in 0..20 {
        let task = VectorSearchTask::new(
            context(router.clone(), channel.clone()),
            Arc::clone(&index),
            SearchParam::default(),
            queries.clone(),
        );
        task.init().unwrap();
        let captured = Captured::new();
        task.do_async(captured.callback());
        wait_for(&captured);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(captured.fired(), 1);

        let (status, results) = captured.take();
        status.unwrap();
        assert_eq!(results.len(), QUERIES);
        for result in &results {
            let ids: Vec<i64> = result.vector_datas.iter().map(|c| c.vector_data.id).collect();
            assert_eq!(ids, expected);
        }
        assert!(task.pending_partitions().is_empty());
    }
    assert_eq!(channel.calls().len(), 20 * 24);
}

#[test]
fn tasks_on_many_threads_share_one_channel() {
    let (index, router) = wide_index();
    let channel = ScriptedChannel::new(Delivery::Threaded, scatter_store);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let ctx = context(router.clone(), channel.clone());
            let index = Arc::clone(&index);
            std::thread::spawn(move || {
                let task = VectorSearchTask::new(
                    ctx,
                    index,
                    SearchParam::default().with_topk(5),
                    vec![query(&[t as f32])],
                );
                task.init().unwrap();
                let captured = Captured::new();
                task.do_async(captured.callback());
                wait_for(&captured);
                let (status, results) = captured.take();
                status.unwrap();
                results[0]
                    .vector_datas
                    .iter()
                    .map(|c| c.vector_data.id)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), vec![1, 2, 3, 11, 12]);
    }
}

#[test]
fn overlapping_round_is_rejected() {
    let (index, router) = wide_index();
    let channel = ScriptedChannel::new(Delivery::Deferred, scatter_store);
    let task = VectorSearchTask::new(
        context(router, channel.clone()),
        index,
        SearchParam::default(),
        vec![query(&[1.0])],
    );
    task.init().unwrap();

    let first = Captured::new();
    task.do_async(first.callback());
    let second = Captured::new();
    task.do_async(second.callback());

    let (status, results) = second.take();
    assert!(matches!(status, Err(ShardlineError::Internal(_))));
    assert!(results.is_empty());
    assert_eq!(first.fired(), 0);
    assert_eq!(channel.held(), 24);

    channel.release_all();
    let (status, results) = first.take();
    status.unwrap();
    assert_eq!(results[0].vector_datas.len(), 24);
}
