use crate::error::{Result, ShardlineError};
use crate::index::{IndexCache, IndexDescriptor, IndexType, ScalarSchema};
use crate::region::{KeyRange, RangeRouter, Region, RegionEpoch};
use crate::types::{IndexId, PartitionId, RegionId, StoreId};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Static description of indexes and regions, the input to a [`RangeRouter`]
/// and an [`IndexCache`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyConfig {
    #[serde(default)]
    pub indexes: Vec<IndexConfig>,
    #[serde(default)]
    pub regions: Vec<RegionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub id: IndexId,
    pub name: String,
    pub index_type: IndexType,
    #[serde(default)]
    pub dimension: Option<usize>,
    #[serde(default)]
    pub separator_ids: Vec<i64>,
    pub partition_ids: Vec<PartitionId>,
    #[serde(default)]
    pub scalar_schema: Option<ScalarSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    pub id: RegionId,
    #[serde(default)]
    pub epoch: RegionEpoch,
    /// Hex-encoded start key.
    pub start_key: String,
    /// Hex-encoded end key; empty for unbounded.
    #[serde(default)]
    pub end_key: String,
    pub store_id: StoreId,
}

impl IndexConfig {
    pub fn descriptor(&self) -> Result<IndexDescriptor> {
        let mut descriptor = IndexDescriptor::range_partitioned(
            self.id,
            self.name.clone(),
            self.index_type,
            &self.separator_ids,
            &self.partition_ids,
        )?;
        if let Some(dimension) = self.dimension {
            descriptor = descriptor.with_dimension(dimension);
        }
        if let Some(schema) = &self.scalar_schema {
            descriptor = descriptor.with_scalar_schema(schema.clone());
        }
        Ok(descriptor)
    }
}

impl RegionConfig {
    pub fn region(&self) -> Result<Region> {
        let decode = |what: &str, key: &str| {
            hex::decode(key).map_err(|e| {
                ShardlineError::Config(format!("region {} {} is not hex: {}", self.id, what, e))
            })
        };
        let range = KeyRange::new(decode("start_key", &self.start_key)?, decode("end_key", &self.end_key)?);
        Ok(Region::new(self.id, range, self.store_id).with_epoch(self.epoch))
    }
}

impl TopologyConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load topology from {dir}/topology.json or return an empty topology.
    pub fn load_or_default(dir: &Path) -> Self {
        let topology_json = dir.join("topology.json");

        if topology_json.exists() {
            match Self::load(&topology_json) {
                Ok(config) => {
                    tracing::info!(
                        "Loaded topology: indexes={}, regions={}",
                        config.indexes.len(),
                        config.regions.len()
                    );
                    return config;
                }
                Err(e) => {
                    tracing::error!("Failed to load topology.json: {}, using empty topology", e);
                }
            }
        } else {
            tracing::info!("No topology.json in {}, using empty topology", dir.display());
        }

        TopologyConfig::default()
    }

    /// Router over the configured regions and a cache of the configured
    /// indexes.
    pub fn build(&self) -> Result<(RangeRouter, IndexCache)> {
        let regions = self
            .regions
            .iter()
            .map(RegionConfig::region)
            .collect::<Result<Vec<_>>>()?;
        let router = RangeRouter::from_regions(regions)?;

        let cache = IndexCache::new();
        for index in &self.indexes {
            cache.insert(index.descriptor()?);
        }
        Ok((router, cache))
    }
}
