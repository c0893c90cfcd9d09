mod common;

use common::*;
use shardline::{
    Client, DocQueryParam, Region, SearchParam, ShardlineError, StoreRequest, TopologyConfig,
    Vector, VectorWithId,
};

// Index 7: partitions 70 (ids < 1000) and 71. Index 9: partition 90.
// Region 1 holds partition 70; region 2 everything from partition 71 on.
const TOPOLOGY: &str = r#"{
    "indexes": [
        {
            "id": 7,
            "name": "embeddings",
            "index_type": {"kind": "vector", "vector_index_type": "hnsw"},
            "dimension": 4,
            "separator_ids": [1000],
            "partition_ids": [70, 71]
        },
        {
            "id": 9,
            "name": "docs",
            "index_type": {"kind": "document"},
            "partition_ids": [90]
        }
    ],
    "regions": [
        {"id": 1, "start_key": "77", "end_key": "778000000000000047", "store_id": 1},
        {"id": 2, "start_key": "778000000000000047", "store_id": 2}
    ]
}"#;

fn store(region: &Region, request: &StoreRequest) -> shardline::Result<shardline::StoreResponse> {
    Ok(match request {
        StoreRequest::VectorSearch(_) => {
            search_response(&[&[(region.id * 100, region.id as f32)]])
        }
        StoreRequest::VectorAdd(_) => add_ok(),
        StoreRequest::DocumentBatchQuery(r) => {
            documents_response(r.document_ids.iter().map(|&id| document(id)).collect())
        }
    })
}

fn client(channel: std::sync::Arc<ScriptedChannel>) -> Client {
    let topology: TopologyConfig = serde_json::from_str(TOPOLOGY).unwrap();
    Client::from_topology(&topology, channel).unwrap()
}

fn embedding(id: i64) -> VectorWithId {
    VectorWithId::new(id, Vector::float(vec![id as f32, 1.0, 2.0, 3.0]))
}

#[tokio::test]
async fn search_covers_every_partition() {
    let channel = ScriptedChannel::new(Delivery::Threaded, store);
    let client = client(channel.clone());

    let results = client
        .vector_search(7, SearchParam::default().with_topk(5), vec![embedding(0)])
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    let ids: Vec<i64> = results[0].vector_datas.iter().map(|c| c.vector_data.id).collect();
    assert_eq!(ids, vec![100, 200]);
    assert_eq!(channel.calls().len(), 2);
}

#[tokio::test]
async fn upsert_and_lookup_through_client() {
    let channel = ScriptedChannel::new(Delivery::Threaded, store);
    let client = client(channel.clone());

    client
        .vector_upsert(7, vec![embedding(5), embedding(2000)])
        .await
        .unwrap();
    assert_eq!(channel.calls_to(1).len(), 1);
    assert_eq!(channel.calls_to(2).len(), 1);

    let docs = client
        .document_batch_query(
            9,
            DocQueryParam {
                doc_ids: vec![3, 4],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(channel.calls_to(2).len(), 2);
}

#[tokio::test]
async fn unknown_index_is_reported() {
    let channel = ScriptedChannel::new(Delivery::Inline, store);
    let client = client(channel.clone());

    let err = client
        .vector_search(99, SearchParam::default(), vec![embedding(0)])
        .await
        .unwrap_err();
    assert_eq!(err, ShardlineError::IndexNotFound(99));
    assert!(channel.calls().is_empty());
}

#[tokio::test]
async fn init_failure_is_returned_without_dispatch() {
    let channel = ScriptedChannel::new(Delivery::Inline, store);
    let client = client(channel.clone());

    let err = client
        .vector_upsert(7, vec![VectorWithId::new(1, Vector::float(vec![1.0]))])
        .await
        .unwrap_err();
    assert!(matches!(err, ShardlineError::InvalidArgument(_)));

    let task = client
        .new_document_batch_query(7, DocQueryParam { doc_ids: vec![1], ..Default::default() })
        .unwrap();
    let outcome = shardline::execute(&task).await;
    assert!(!outcome.is_ok());
    assert!(outcome.output.is_empty());
    assert!(channel.calls().is_empty());
}

#[tokio::test]
async fn resume_retries_only_what_is_pending() {
    let channel = ScriptedChannel::new(Delivery::Inline, |region: &Region, request: &StoreRequest| {
        if region.id == 2 {
            return Err(server_error("busy"));
        }
        store(region, request)
    });
    let client = client(channel.clone());

    let task = client.new_vector_upsert(7, vec![embedding(1), embedding(1500)]).unwrap();
    let first = shardline::execute(&task).await;
    assert!(!first.is_ok());
    assert_eq!(task.pending_ids(), vec![1500]);

    let second = shardline::resume(&task).await;
    assert!(!second.is_ok());
    assert_eq!(channel.calls_to(1).len(), 1);
    assert_eq!(channel.calls_to(2).len(), 2);
}

#[tokio::test]
async fn execute_keeps_partial_search_results() {
    let channel = ScriptedChannel::new(Delivery::Inline, |region: &Region, request: &StoreRequest| {
        if region.id == 2 {
            return Err(server_error("compacting"));
        }
        store(region, request)
    });
    let client = client(channel.clone());

    let err = client
        .vector_search(7, SearchParam::default(), vec![embedding(0)])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("compacting"));

    let task = client
        .new_vector_search(7, SearchParam::default(), vec![embedding(0)])
        .unwrap();
    let outcome = shardline::execute(&task).await;
    assert!(!outcome.is_ok());
    let ids: Vec<i64> = outcome.output[0]
        .vector_datas
        .iter()
        .map(|c| c.vector_data.id)
        .collect();
    assert_eq!(ids, vec![100]);
    assert_eq!(task.pending_partitions(), vec![71]);
}
