//! Region directory: static lookup of region identity and remote metadata.

use crate::part::Part;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Opaque, stable key identifying one region within a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(u32);

impl RegionId {
    /// Sentinel for "not found".
    pub const INVALID: RegionId = RegionId(u32::MAX);

    pub fn is_valid(self) -> bool {
        self != RegionId::INVALID
    }

    pub(crate) fn from_index(index: usize) -> RegionId {
        RegionId(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Static lookup of region identity and remote metadata.
pub trait RegionDirectory: Send + Sync {
    /// Region for a name, or `RegionId::INVALID` if unknown.
    fn find(&self, name: &str) -> RegionId;

    /// File-name stem of a region.
    fn name(&self, region: RegionId) -> Option<&str>;

    /// Remote artifact size in bytes; 0 means the part does not exist for
    /// this region.
    fn remote_size(&self, region: RegionId, part: Part) -> u64;

    /// The currently active data version.
    fn active_version(&self) -> i64;

    /// Number of regions in the directory.
    fn region_count(&self) -> usize;
}

/// One region entry in the TOML catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogRegion {
    pub name: String,
    pub base_bytes: u64,
    #[serde(default)]
    pub aux_bytes: u64,
}

/// TOML-backed region catalog:
///
/// ```toml
/// version = 20260801
///
/// [[region]]
/// name = "uruguay"
/// base_bytes = 5242880
/// aux_bytes = 1048576
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RegionCatalog {
    version: i64,
    #[serde(rename = "region", default)]
    regions: Vec<CatalogRegion>,
}

impl RegionCatalog {
    pub fn new(version: i64, regions: Vec<CatalogRegion>) -> RegionCatalog {
        RegionCatalog { version, regions }
    }

    /// Loads and parses a catalog file.
    pub fn load(path: &Path) -> Result<RegionCatalog> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog: {}", path.display()))?;
        let catalog: RegionCatalog = toml::from_str(&data)
            .with_context(|| format!("failed to parse catalog: {}", path.display()))?;
        Ok(catalog)
    }

    pub fn regions(&self) -> &[CatalogRegion] {
        &self.regions
    }
}

impl RegionDirectory for RegionCatalog {
    fn find(&self, name: &str) -> RegionId {
        self.regions
            .iter()
            .position(|r| r.name == name)
            .map_or(RegionId::INVALID, RegionId::from_index)
    }

    fn name(&self, region: RegionId) -> Option<&str> {
        self.regions.get(region.index()).map(|r| r.name.as_str())
    }

    fn remote_size(&self, region: RegionId, part: Part) -> u64 {
        let Some(entry) = self.regions.get(region.index()) else {
            return 0;
        };
        match part {
            Part::Base => entry.base_bytes,
            Part::Auxiliary => entry.aux_bytes,
        }
    }

    fn active_version(&self) -> i64 {
        self.version
    }

    fn region_count(&self) -> usize {
        self.regions.len()
    }
}
