//! Index descriptors: the read-only facts a task needs about an index.

use crate::codec::{self, CLIENT_RAW_PREFIX};
use crate::error::{Result, ShardlineError};
use crate::region::KeyRange;
use crate::types::{IndexId, PartitionId, ScalarFieldType};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorIndexType {
    Flat,
    IvfFlat,
    IvfPq,
    Hnsw,
    DiskAnn,
    BruteForce,
    BinaryFlat,
    BinaryIvfFlat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "vector_index_type")]
pub enum IndexType {
    Vector(VectorIndexType),
    Document,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalarColumn {
    pub key: String,
    pub field_type: ScalarFieldType,
    /// Whether the store keeps a speed-up structure for this column.
    #[serde(default)]
    pub speed_up: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalarSchema {
    pub columns: Vec<ScalarColumn>,
}

impl ScalarSchema {
    pub fn column(&self, key: &str) -> Option<&ScalarColumn> {
        self.columns.iter().find(|c| c.key == key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub id: PartitionId,
    /// Smallest item id routed to this partition; `None` for the first one.
    pub start_id: Option<i64>,
    pub range: KeyRange,
}

/// Read-only description of a range-partitioned index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDescriptor {
    id: IndexId,
    name: String,
    index_type: IndexType,
    dimension: Option<usize>,
    partitions: Vec<Partition>,
    scalar_schema: Option<ScalarSchema>,
}

impl IndexDescriptor {
    /// Build a descriptor from a range partition rule.
    ///
    /// `n` separator ids split the id space into `n + 1` partitions, one per
    /// entry of `partition_ids`. Partition `i` owns ids from separator `i - 1`
    /// (or the beginning) up to the next partition's key prefix.
    pub fn range_partitioned(
        id: IndexId,
        name: impl Into<String>,
        index_type: IndexType,
        separator_ids: &[i64],
        partition_ids: &[PartitionId],
    ) -> Result<Self> {
        if partition_ids.len() != separator_ids.len() + 1 {
            return Err(ShardlineError::InvalidArgument(format!(
                "{} separator ids need {} partition ids, got {}",
                separator_ids.len(),
                separator_ids.len() + 1,
                partition_ids.len()
            )));
        }
        if separator_ids.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ShardlineError::InvalidArgument(
                "separator ids must be strictly increasing".into(),
            ));
        }
        let unique: BTreeSet<_> = partition_ids.iter().collect();
        if unique.len() != partition_ids.len() {
            return Err(ShardlineError::InvalidArgument(
                "partition ids must be unique".into(),
            ));
        }

        if let Some(&bad) = partition_ids.iter().find(|&&p| p <= 0 || p == PartitionId::MAX) {
            return Err(ShardlineError::InvalidArgument(format!(
                "partition id {} out of range",
                bad
            )));
        }

        let partitions = partition_ids
            .iter()
            .enumerate()
            .map(|(i, &part_id)| {
                let start_id = if i == 0 {
                    None
                } else {
                    Some(separator_ids[i - 1])
                };
                let start = match start_id {
                    None => codec::encode_partition_key(CLIENT_RAW_PREFIX, part_id),
                    Some(sep) => codec::encode_item_key(CLIENT_RAW_PREFIX, part_id, sep),
                };
                // part_id < PartitionId::MAX, checked above
                let end = codec::encode_partition_key(CLIENT_RAW_PREFIX, part_id + 1);
                Partition {
                    id: part_id,
                    start_id,
                    range: KeyRange::new(start, end),
                }
            })
            .collect();

        Ok(Self {
            id,
            name: name.into(),
            index_type,
            dimension: None,
            partitions,
            scalar_schema: None,
        })
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    pub fn with_scalar_schema(mut self, schema: ScalarSchema) -> Self {
        self.scalar_schema = Some(schema);
        self
    }

    pub fn id(&self) -> IndexId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    /// Vector index type, or `None` for document indexes.
    pub fn vector_index_type(&self) -> Option<VectorIndexType> {
        match self.index_type {
            IndexType::Vector(t) => Some(t),
            IndexType::Document => None,
        }
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn partition_ids(&self) -> BTreeSet<PartitionId> {
        self.partitions.iter().map(|p| p.id).collect()
    }

    pub fn partition_range(&self, part_id: PartitionId) -> Option<&KeyRange> {
        self.partitions
            .iter()
            .find(|p| p.id == part_id)
            .map(|p| &p.range)
    }

    pub fn has_scalar_schema(&self) -> bool {
        self.scalar_schema.is_some()
    }

    pub fn scalar_schema(&self) -> Option<&ScalarSchema> {
        self.scalar_schema.as_ref()
    }

    /// Partition owning `item_id`: the last partition whose start id is at
    /// or below it.
    pub fn partition_for_id(&self, item_id: i64) -> PartitionId {
        self.partitions
            .iter()
            .rev()
            .find(|p| p.start_id.map_or(true, |start| start <= item_id))
            .map(|p| p.id)
            .unwrap_or(self.partitions[0].id)
    }

    /// Range key of a vector or document id, used for region lookup.
    pub fn id_to_range_key(&self, item_id: i64) -> Vec<u8> {
        codec::encode_item_key(CLIENT_RAW_PREFIX, self.partition_for_id(item_id), item_id)
    }
}

/// Resolves index ids to descriptors. Shared by every task a client builds.
#[derive(Default)]
pub struct IndexCache {
    indexes: DashMap<IndexId, Arc<IndexDescriptor>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, descriptor: IndexDescriptor) -> Arc<IndexDescriptor> {
        let descriptor = Arc::new(descriptor);
        self.indexes.insert(descriptor.id(), Arc::clone(&descriptor));
        descriptor
    }

    pub fn get(&self, index_id: IndexId) -> Result<Arc<IndexDescriptor>> {
        self.indexes
            .get(&index_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(ShardlineError::IndexNotFound(index_id))
    }

    pub fn remove(&self, index_id: IndexId) -> Option<Arc<IndexDescriptor>> {
        self.indexes.remove(&index_id).map(|(_, d)| d)
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}
