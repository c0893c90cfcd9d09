//! Candidate bookkeeping for vector search.
//!
//! Candidates are kept per query position in arrival order while regions
//! answer. Sorting and top-k happen once, when a search finalizes.

use crate::error::{Result, ShardlineError};
use crate::rpc::VectorSearchBatchResult;
use crate::types::{SearchResult, VectorWithDistance, VectorWithId};
use std::collections::BTreeMap;

/// Query position to the candidates gathered for it so far.
pub type CandidateMap = BTreeMap<usize, Vec<VectorWithDistance>>;

/// Append a region's batch results: batch `i` belongs to query `i`.
///
/// A batch count different from `query_count` is an internal error. The
/// batches that map to a real query are merged anyway.
pub fn append_batches(
    target: &mut CandidateMap,
    batches: Vec<VectorSearchBatchResult>,
    query_count: usize,
) -> Result<()> {
    let received = batches.len();
    for (position, batch) in batches.into_iter().take(query_count).enumerate() {
        target
            .entry(position)
            .or_default()
            .extend(batch.vector_with_distances);
    }
    if received != query_count {
        return Err(ShardlineError::Internal(format!(
            "search response carried {} batch results for {} query vectors",
            received, query_count
        )));
    }
    Ok(())
}

/// Move every candidate list of `source` to the end of the matching list in
/// `target`.
pub fn append_candidates(target: &mut CandidateMap, source: CandidateMap) {
    for (position, mut candidates) in source {
        target.entry(position).or_default().append(&mut candidates);
    }
}

/// Stable ascending sort by distance; equal distances keep arrival order.
pub fn sort_by_distance(candidates: &mut [VectorWithDistance]) {
    candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
}

/// Build one [`SearchResult`] per query, in query order, from the gathered
/// candidates. `topk` truncates only when range search is off and it is
/// non-zero.
pub fn build_results(
    queries: &[VectorWithId],
    candidates: &CandidateMap,
    topk: usize,
    enable_range_search: bool,
) -> Vec<SearchResult> {
    queries
        .iter()
        .enumerate()
        .map(|(position, query)| {
            let mut vector_datas = candidates.get(&position).cloned().unwrap_or_default();
            sort_by_distance(&mut vector_datas);
            if !enable_range_search && topk > 0 {
                vector_datas.truncate(topk);
            }
            SearchResult {
                id: query.query_copy(),
                vector_datas,
            }
        })
        .collect()
}
