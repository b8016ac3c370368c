//! JSON seed file parsing.
//!
//! Entries without an id or a name are dropped, and a non-positive pack size
//! is treated as 1. A later entry with a repeated id replaces the earlier one.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    models::{Resource, ResourceId},
    money::Money,
};

use super::Catalog;

/// One entry of the catalog seed file.
///
/// Every field but `id` may be missing; [`catalog_from_seeds`] decides what
/// survives.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceSeed {
    /// Resource id; entries with `id <= 0` are skipped.
    pub id: i64,
    /// Display name; entries without one are skipped.
    #[serde(default)]
    pub name: String,
    /// Icon glyph.
    #[serde(default)]
    pub icon: String,
    /// Encyclopedia blurb.
    #[serde(default)]
    pub description: String,
    /// Pack price in thousandths.
    #[serde(default)]
    pub price: Money,
    /// Units per pack; non-positive values become 1.
    #[serde(default)]
    pub pack_size: i64,
}

/// Outcome of building a catalog from seeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Entries that made it into the catalog.
    pub loaded: usize,
    /// Entries dropped for a missing id or name.
    pub skipped: usize,
    /// Entries whose id repeated an earlier one.
    pub replaced: usize,
    /// Loaded entries with a non-positive price.
    pub untradeable: usize,
}

/// Read and parse a JSON seed file.
pub fn load_seed_file(path: impl AsRef<Path>) -> Result<(Catalog, SeedReport)> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let seeds: Vec<ResourceSeed> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let (catalog, report) = catalog_from_seeds(seeds);
    info!(
        path = %path.display(),
        loaded = report.loaded,
        skipped = report.skipped,
        replaced = report.replaced,
        "catalog loaded"
    );
    Ok((catalog, report))
}

/// Apply the seed rules and build the catalog.
pub fn catalog_from_seeds(seeds: impl IntoIterator<Item = ResourceSeed>) -> (Catalog, SeedReport) {
    let mut report = SeedReport::default();
    let mut resources: Vec<Resource> = Vec::new();

    for seed in seeds {
        let name = seed.name.trim();
        if seed.id <= 0 || name.is_empty() {
            warn!(id = seed.id, "skipping resource seed without id or name");
            report.skipped += 1;
            continue;
        }

        let pack_size = u64::try_from(seed.pack_size)
            .ok()
            .filter(|size| *size > 0)
            .unwrap_or(1);
        if !seed.price.is_positive() {
            warn!(id = seed.id, price = %seed.price, "resource has a non-positive price and cannot be traded");
            report.untradeable += 1;
        }

        let resource = Resource {
            id: ResourceId(seed.id),
            name: name.to_string(),
            icon: seed.icon,
            description: seed.description,
            price: seed.price,
            pack_size,
        };
        match resources.iter_mut().find(|existing| existing.id == resource.id) {
            Some(existing) => {
                *existing = resource;
                report.replaced += 1;
            }
            None => {
                resources.push(resource);
                report.loaded += 1;
            }
        }
    }

    (Catalog::new(resources), report)
}
