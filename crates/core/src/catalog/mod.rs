//! Read-only resource catalog.

pub mod loader;

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    models::{Resource, ResourceId},
    trading::TradeError,
};

pub use loader::{load_seed_file, ResourceSeed, SeedReport};

/// Immutable set of tradeable resources, shared by cloning the `Arc`.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    resources: Arc<BTreeMap<ResourceId, Resource>>,
}

impl Catalog {
    /// Build a catalog; a later entry replaces an earlier one with the same id.
    pub fn new(resources: impl IntoIterator<Item = Resource>) -> Self {
        let resources = resources
            .into_iter()
            .map(|resource| (resource.id, resource))
            .collect();
        Self {
            resources: Arc::new(resources),
        }
    }

    /// Look up a resource by id.
    pub fn get(&self, id: ResourceId) -> Result<&Resource, TradeError> {
        self.resources
            .get(&id)
            .ok_or(TradeError::ResourceNotFound(id))
    }

    /// Resources ordered by name, for listings.
    pub fn by_name(&self) -> Vec<&Resource> {
        let mut resources: Vec<_> = self.resources.values().collect();
        resources.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        resources
    }

    /// Number of resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// True when the catalog holds nothing.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
