use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Index identifier as assigned by the coordinator.
pub type IndexId = i64;
/// Partition identifier; doubles as the key prefix of the partition's range.
pub type PartitionId = i64;
pub type RegionId = i64;
pub type StoreId = i64;
/// Vector identifier. Must be positive for writes.
pub type VectorId = i64;
/// Document identifier. Must be positive.
pub type DocId = i64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    #[default]
    Float,
    Uint8,
    Int8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    #[default]
    None,
    L2,
    InnerProduct,
    Cosine,
    Hamming,
}

/// A dense vector. Float vectors use `float_values`, binary vectors use
/// `binary_values`; `dimension` is the logical dimension in both cases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    pub dimension: usize,
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub float_values: Vec<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binary_values: Vec<u8>,
}

impl Vector {
    pub fn float(values: Vec<f32>) -> Self {
        Self {
            dimension: values.len(),
            value_type: ValueType::Float,
            float_values: values,
            binary_values: Vec::new(),
        }
    }

    pub fn binary(dimension: usize, values: Vec<u8>) -> Self {
        Self {
            dimension,
            value_type: ValueType::Uint8,
            float_values: Vec::new(),
            binary_values: values,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarFieldType {
    Bool,
    Int64,
    Double,
    String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarField {
    Bool(bool),
    Int64(i64),
    Double(f64),
    String(String),
}

impl ScalarField {
    pub fn field_type(&self) -> ScalarFieldType {
        match self {
            ScalarField::Bool(_) => ScalarFieldType::Bool,
            ScalarField::Int64(_) => ScalarFieldType::Int64,
            ScalarField::Double(_) => ScalarFieldType::Double,
            ScalarField::String(_) => ScalarFieldType::String,
        }
    }
}

/// A typed scalar attribute attached to a vector. Multi-valued attributes
/// carry several fields of the same type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarValue {
    pub field_type: ScalarFieldType,
    pub fields: Vec<ScalarField>,
}

impl ScalarValue {
    pub fn single(field: ScalarField) -> Self {
        Self {
            field_type: field.field_type(),
            fields: vec![field],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorWithId {
    pub id: VectorId,
    pub vector: Vector,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub scalar_data: HashMap<String, ScalarValue>,
}

impl VectorWithId {
    pub fn new(id: VectorId, vector: Vector) -> Self {
        Self {
            id,
            vector,
            scalar_data: HashMap::new(),
        }
    }

    /// Copy of the vector payload without id or scalar data, as sent in search
    /// requests and echoed back in search results.
    pub fn query_copy(&self) -> Self {
        Self {
            id: 0,
            vector: self.vector.clone(),
            scalar_data: HashMap::new(),
        }
    }
}

/// A candidate returned by a region, already scored against one query vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorWithDistance {
    pub vector_data: VectorWithId,
    pub distance: f32,
    #[serde(default)]
    pub metric_type: MetricType,
}

/// Final per-query output of a vector search: the query vector and its
/// candidates sorted by ascending distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: VectorWithId,
    pub vector_datas: Vec<VectorWithDistance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocValue {
    Int64(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub fields: HashMap<String, DocValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocWithId {
    pub id: DocId,
    pub doc: Document,
}

/// Options for a document batch lookup.
#[derive(Debug, Clone, Default)]
pub struct DocQueryParam {
    pub doc_ids: Vec<DocId>,
    pub with_scalar_data: bool,
    /// Only honoured when `with_scalar_data` is set.
    pub selected_keys: Vec<String>,
}
