use crate::compiler::{compile_document, CompiledGraph};
use crate::library::AssetLibrary;
use crate::registry::NodeRegistry;
use crate::subsystem::FlowSubsystem;
use gameflowcore::{FlowAsset, GraphDocument, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub const DEFAULT_MAX_CASCADE_DEPTH: usize = 1024;

/// Compiles graph documents against a node registry and hands out
/// subsystems that run them.
pub struct FlowRuntime {
    registry: Arc<NodeRegistry>,
    library: AssetLibrary,
    config: RuntimeConfig,
}

impl FlowRuntime {
    /// Create a new runtime with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_registry(Arc::new(NodeRegistry::new()), config)
    }

    /// Create a new runtime with a pre-configured registry
    pub fn with_registry(registry: Arc<NodeRegistry>, config: RuntimeConfig) -> Self {
        Self {
            registry,
            library: AssetLibrary::new(),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn library(&self) -> &AssetLibrary {
        &self.library
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Compile without registering the result. The report carries every
    /// finding, errors included.
    pub fn compile(&self, document: &GraphDocument) -> Result<CompiledGraph> {
        compile_document(document, &self.registry, &self.library)
    }

    /// Compile, reject graphs with validation errors and register the asset
    /// so later documents can nest it.
    pub fn load(&mut self, document: &GraphDocument) -> Result<Arc<FlowAsset>> {
        let asset = self.compile(document)?.into_result()?;
        tracing::info!("Loaded flow asset '{}' ({} nodes)", asset.name(), asset.node_count());
        Ok(self.library.insert(asset))
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<Arc<FlowAsset>> {
        let json = std::fs::read_to_string(path)?;
        let document = GraphDocument::from_json(&json)?;
        self.load(&document)
    }

    /// A fresh world with its own services and instance registry.
    pub fn create_subsystem(&self) -> FlowSubsystem {
        FlowSubsystem::new(self.config.clone())
    }
}

impl Default for FlowRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub event_buffer_size: usize,
    /// Nested activations allowed in one synchronous cascade.
    pub max_cascade_depth: usize,
    /// Listener dispatch rounds per pump before the rest waits for the next tick.
    pub max_dispatch_rounds: usize,
}

impl RuntimeConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
            max_cascade_depth: DEFAULT_MAX_CASCADE_DEPTH,
            max_dispatch_rounds: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: RuntimeConfig = serde_json::from_str(r#"{"max_cascade_depth": 16}"#).unwrap();
        assert_eq!(config.max_cascade_depth, 16);
        assert_eq!(config.event_buffer_size, RuntimeConfig::default().event_buffer_size);
    }
}
