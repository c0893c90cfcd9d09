//! Region topology: regions, their key ranges, and routing keys to regions.

use crate::error::{Result, ShardlineError};
use crate::types::{RegionId, StoreId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Half-open key range `[start, end)`. An empty `end` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyRange {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
}

impl KeyRange {
    pub fn new(start: Vec<u8>, end: Vec<u8>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && (self.end.is_empty() || key < self.end.as_slice())
    }

    pub fn is_valid(&self) -> bool {
        self.end.is_empty() || self.start < self.end
    }
}

impl std::fmt::Display for KeyRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", hex::encode(&self.start), hex::encode(&self.end))
    }
}

/// Addressing epoch of a region. Bumped by the store on split/merge
/// (`version`) and on membership change (`conf_version`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionEpoch {
    pub conf_version: u64,
    pub version: u64,
}

/// A serving unit owning one contiguous key range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub epoch: RegionEpoch,
    pub range: KeyRange,
    /// Store currently leading this region.
    pub store_id: StoreId,
}

impl Region {
    pub fn new(id: RegionId, range: KeyRange, store_id: StoreId) -> Self {
        Self {
            id,
            epoch: RegionEpoch::default(),
            range,
            store_id,
        }
    }

    pub fn with_epoch(mut self, epoch: RegionEpoch) -> Self {
        self.epoch = epoch;
        self
    }
}

/// Resolves keys and key ranges to owning regions.
///
/// Implementations are shared across tasks and called from arbitrary
/// threads without any task lock held.
pub trait RegionRouter: Send + Sync {
    /// Regions covering `[start, end)` in key order. Fails if any part of the
    /// range is currently unowned.
    fn regions_covering_range(&self, start: &[u8], end: &[u8]) -> Result<Vec<Arc<Region>>>;

    /// Region owning `key`.
    fn region_owning(&self, key: &[u8]) -> Result<Arc<Region>>;
}

/// In-memory router over a sorted map of region start keys.
#[derive(Default)]
pub struct RangeRouter {
    regions: RwLock<BTreeMap<Vec<u8>, Arc<Region>>>,
}

impl RangeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_regions(regions: impl IntoIterator<Item = Region>) -> Result<Self> {
        let router = Self::new();
        for region in regions {
            router.upsert(region)?;
        }
        Ok(router)
    }

    /// Insert or replace a region. Any existing region whose range overlaps
    /// the new one is evicted, the way a split or merge supersedes stale entries.
    pub fn upsert(&self, region: Region) -> Result<()> {
        if !region.range.is_valid() {
            return Err(ShardlineError::InvalidArgument(format!(
                "region {} has invalid range {}",
                region.id, region.range
            )));
        }
        let mut regions = self
            .regions
            .write()
            .map_err(|_| ShardlineError::Internal("region map lock poisoned".into()))?;

        let overlapping: Vec<Vec<u8>> = regions
            .values()
            .filter(|r| r.id == region.id || ranges_overlap(&r.range, &region.range))
            .map(|r| r.range.start.clone())
            .collect();
        for start in overlapping {
            if let Some(stale) = regions.remove(&start) {
                tracing::debug!(
                    "[ROUTER] evicted region {} {} (superseded by region {})",
                    stale.id,
                    stale.range,
                    region.id
                );
            }
        }

        regions.insert(region.range.start.clone(), Arc::new(region));
        Ok(())
    }

    pub fn remove(&self, region_id: RegionId) -> Option<Arc<Region>> {
        let mut regions = self.regions.write().ok()?;
        let start = regions
            .values()
            .find(|r| r.id == region_id)
            .map(|r| r.range.start.clone())?;
        regions.remove(&start)
    }

    pub fn len(&self) -> usize {
        self.regions.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn ranges_overlap(a: &KeyRange, b: &KeyRange) -> bool {
    let a_before_b_ends = b.end.is_empty() || a.start < b.end;
    let b_before_a_ends = a.end.is_empty() || b.start < a.end;
    a_before_b_ends && b_before_a_ends
}

impl RegionRouter for RangeRouter {
    fn regions_covering_range(&self, start: &[u8], end: &[u8]) -> Result<Vec<Arc<Region>>> {
        let regions = self
            .regions
            .read()
            .map_err(|_| ShardlineError::Internal("region map lock poisoned".into()))?;

        let mut covering = Vec::new();
        let mut cursor = start.to_vec();
        loop {
            let region = regions
                .range(..=cursor.clone())
                .next_back()
                .map(|(_, r)| r)
                .filter(|r| r.range.contains(&cursor))
                .ok_or_else(|| {
                    ShardlineError::RoutingFailure(format!(
                        "no region owns key {} while scanning {}",
                        hex::encode(&cursor),
                        KeyRange::new(start.to_vec(), end.to_vec())
                    ))
                })?;
            covering.push(Arc::clone(region));

            let region_end = &region.range.end;
            if region_end.is_empty() || (!end.is_empty() && region_end.as_slice() >= end) {
                break;
            }
            cursor = region_end.clone();
        }
        Ok(covering)
    }

    fn region_owning(&self, key: &[u8]) -> Result<Arc<Region>> {
        let regions = self
            .regions
            .read()
            .map_err(|_| ShardlineError::Internal("region map lock poisoned".into()))?;
        regions
            .range(..=key.to_vec())
            .next_back()
            .map(|(_, r)| r)
            .filter(|r| r.range.contains(key))
            .cloned()
            .ok_or_else(|| {
                ShardlineError::RoutingFailure(format!("no region owns key {}", hex::encode(key)))
            })
    }
}
