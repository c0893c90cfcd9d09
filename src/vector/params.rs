//! Search parameters: the caller-facing [`SearchParam`] and the
//! [`VectorSearchParameter`] sent to every region.

use crate::error::Result;
use crate::filter::{EncodedFilter, FilterExpr};
use crate::index::{ScalarSchema, VectorIndexType};
use crate::types::VectorId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_BEAMWIDTH: i32 = 2;

/// Index-type specific knobs a caller may set in [`SearchParam::extra_params`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchExtraParamType {
    Nprobe,
    ParallelOnQueries,
    RecallNum,
    EfSearch,
}

/// Where a filter's predicate is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterSource {
    Scalar,
    Table,
    VectorId,
}

/// Whether filtering happens before or after the ANN scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    QueryPre,
    QueryPost,
}

/// Search options as the caller states them.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParam {
    /// Candidates kept per query; `0` keeps everything the regions return.
    pub topk: usize,
    pub with_vector_data: bool,
    pub with_scalar_data: bool,
    pub selected_keys: Vec<String>,
    pub with_table_data: bool,
    /// Range search returns every candidate within `radius` and disables top-k.
    pub enable_range_search: bool,
    pub radius: f32,
    pub filter_source: Option<FilterSource>,
    pub filter_type: Option<FilterType>,
    pub vector_ids: Vec<VectorId>,
    pub is_negation: bool,
    pub is_sorted: bool,
    pub use_brute_force: bool,
    pub extra_params: HashMap<SearchExtraParamType, i32>,
    pub beamwidth: i32,
    /// JSON filter expression, see [`crate::filter`].
    pub filter_expr: Option<String>,
}

impl Default for SearchParam {
    fn default() -> Self {
        Self {
            topk: 0,
            with_vector_data: true,
            with_scalar_data: false,
            selected_keys: Vec::new(),
            with_table_data: false,
            enable_range_search: false,
            radius: 0.0,
            filter_source: None,
            filter_type: None,
            vector_ids: Vec::new(),
            is_negation: false,
            is_sorted: false,
            use_brute_force: false,
            extra_params: HashMap::new(),
            beamwidth: DEFAULT_BEAMWIDTH,
            filter_expr: None,
        }
    }
}

impl SearchParam {
    pub fn with_topk(mut self, topk: usize) -> Self {
        self.topk = topk;
        self
    }

    pub fn with_extra(mut self, key: SearchExtraParamType, value: i32) -> Self {
        self.extra_params.insert(key, value);
        self
    }

    pub fn with_filter_expr(mut self, expr: impl Into<String>) -> Self {
        self.filter_expr = Some(expr.into());
        self
    }

    fn extra(&self, key: SearchExtraParamType) -> Option<i32> {
        self.extra_params.get(&key).copied()
    }
}

/// Per-index-type search knobs on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexSearchParam {
    Flat {
        parallel_on_queries: Option<i32>,
    },
    IvfFlat {
        nprobe: Option<i32>,
        parallel_on_queries: Option<i32>,
    },
    IvfPq {
        nprobe: Option<i32>,
        parallel_on_queries: Option<i32>,
        recall_num: Option<i32>,
    },
    Hnsw {
        ef_search: Option<i32>,
    },
    DiskAnn {
        beamwidth: i32,
    },
    BinaryFlat {
        parallel_on_queries: Option<i32>,
    },
    BinaryIvfFlat {
        nprobe: Option<i32>,
        parallel_on_queries: Option<i32>,
    },
}

/// Search parameters as sent to a region.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorSearchParameter {
    pub top_n: usize,
    pub without_vector_data: bool,
    pub without_scalar_data: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected_keys: Vec<String>,
    pub without_table_data: bool,
    pub enable_range_search: bool,
    pub radius: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_param: Option<IndexSearchParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_filter: Option<FilterSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_filter_type: Option<FilterType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vector_ids: Vec<VectorId>,
    pub is_negation: bool,
    pub is_sorted: bool,
    pub use_brute_force: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coprocessor: Option<EncodedFilter>,
}

impl VectorSearchParameter {
    /// Translate caller options for an index of type `index_type`. A filter
    /// expression is parsed and checked against `schema` when one exists.
    pub fn build(
        param: &SearchParam,
        index_type: VectorIndexType,
        schema: Option<&ScalarSchema>,
    ) -> Result<Self> {
        let coprocessor = match &param.filter_expr {
            Some(json) if !json.trim().is_empty() => {
                Some(FilterExpr::parse(json)?.encode(schema)?)
            }
            _ => None,
        };

        Ok(Self {
            top_n: param.topk,
            without_vector_data: !param.with_vector_data,
            without_scalar_data: !param.with_scalar_data,
            selected_keys: if param.with_scalar_data {
                param.selected_keys.clone()
            } else {
                Vec::new()
            },
            without_table_data: !param.with_table_data,
            enable_range_search: param.enable_range_search,
            radius: param.radius,
            index_param: index_search_param(param, index_type),
            vector_filter: param.filter_source,
            vector_filter_type: param.filter_type,
            vector_ids: param.vector_ids.clone(),
            is_negation: param.is_negation,
            is_sorted: param.is_sorted,
            use_brute_force: param.use_brute_force,
            coprocessor,
        })
    }

    /// Variant for re-querying a region whose disk-resident index has no
    /// data loaded: DiskANN knobs removed, brute force forced on.
    pub fn for_brute_force(&self) -> Self {
        let mut param = self.clone();
        if matches!(param.index_param, Some(IndexSearchParam::DiskAnn { .. })) {
            param.index_param = None;
        }
        param.use_brute_force = true;
        param
    }
}

fn index_search_param(param: &SearchParam, index_type: VectorIndexType) -> Option<IndexSearchParam> {
    use SearchExtraParamType::*;

    match index_type {
        VectorIndexType::Flat => Some(IndexSearchParam::Flat {
            parallel_on_queries: param.extra(ParallelOnQueries),
        }),
        VectorIndexType::IvfFlat => Some(IndexSearchParam::IvfFlat {
            nprobe: param.extra(Nprobe),
            parallel_on_queries: param.extra(ParallelOnQueries),
        }),
        VectorIndexType::IvfPq => Some(IndexSearchParam::IvfPq {
            nprobe: param.extra(Nprobe),
            parallel_on_queries: param.extra(ParallelOnQueries),
            recall_num: param.extra(RecallNum),
        }),
        VectorIndexType::Hnsw => Some(IndexSearchParam::Hnsw {
            ef_search: param.extra(EfSearch),
        }),
        VectorIndexType::DiskAnn => Some(IndexSearchParam::DiskAnn {
            beamwidth: param.beamwidth,
        }),
        VectorIndexType::BinaryFlat => Some(IndexSearchParam::BinaryFlat {
            parallel_on_queries: param.extra(ParallelOnQueries),
        }),
        VectorIndexType::BinaryIvfFlat => Some(IndexSearchParam::BinaryIvfFlat {
            nprobe: param.extra(Nprobe),
            parallel_on_queries: param.extra(ParallelOnQueries),
        }),
        VectorIndexType::BruteForce => None,
    }
}
