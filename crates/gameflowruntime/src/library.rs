use gameflowcore::{AssetId, FlowAsset};
use indexmap::IndexMap;
use std::sync::Arc;

/// Compiled templates by name. Subgraph nodes resolve their asset here.
#[derive(Default, Clone)]
pub struct AssetLibrary {
    assets: IndexMap<String, Arc<FlowAsset>>,
}

impl AssetLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the asset registered under its name.
    pub fn insert(&mut self, asset: FlowAsset) -> Arc<FlowAsset> {
        self.insert_shared(Arc::new(asset))
    }

    pub fn insert_shared(&mut self, asset: Arc<FlowAsset>) -> Arc<FlowAsset> {
        if let Some(previous) = self.assets.insert(asset.name().to_string(), asset.clone()) {
            tracing::debug!("Replaced flow asset '{}' ({})", previous.name(), previous.id());
        }
        asset
    }

    pub fn get(&self, name: &str) -> Option<Arc<FlowAsset>> {
        self.assets.get(name).cloned()
    }

    pub fn get_by_id(&self, id: AssetId) -> Option<Arc<FlowAsset>> {
        self.assets.values().find(|asset| asset.id() == id).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.assets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
