use gameflowcore::{Config, FlowNode, GraphError, NodeCategory};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Type name placeholders are created under when a node type cannot be
/// instantiated.
pub const PLACEHOLDER_NODE_TYPE: &str = "core.dummy";

/// Factory trait for creating node instances
pub trait NodeFactory: Send + Sync {
    /// Create a new instance of the node with given configuration
    fn create(&self, config: &Config) -> Result<Box<dyn FlowNode>, GraphError>;

    /// Get node type identifier
    fn node_type(&self) -> &str;

    /// Optional: Get node metadata (description, pins, lifecycle status)
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::default()
    }
}

/// Lifecycle of a node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TypeStatus {
    #[default]
    Active,
    /// Still runs; validation warns.
    Deprecated,
    /// Cannot be placed; validation fails.
    Abstract,
    /// No longer supported; validation fails.
    Removed,
}

impl TypeStatus {
    pub fn is_instantiable(self) -> bool {
        matches!(self, TypeStatus::Active | TypeStatus::Deprecated)
    }
}

/// Metadata about a node type
#[derive(Debug, Clone, Serialize)]
pub struct NodeMetadata {
    pub description: String,
    pub category: NodeCategory,
    pub status: TypeStatus,
    /// Suggested type for deprecated or removed ones.
    pub replacement: Option<String>,
    pub inputs: Vec<PortDefinition>,
    pub outputs: Vec<PortDefinition>,
    pub can_add_inputs: bool,
    pub can_add_outputs: bool,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: NodeCategory::Default,
            status: TypeStatus::Active,
            replacement: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            can_add_inputs: false,
            can_add_outputs: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PortDefinition {
    pub name: String,
    pub description: String,
}

impl PortDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Registry of available node types
pub struct NodeRegistry {
    factories: HashMap<String, Arc<dyn NodeFactory>>,
    status_overrides: HashMap<String, TypeStatus>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            status_overrides: HashMap::new(),
        }
    }

    /// Register a node factory
    pub fn register(&mut self, factory: Arc<dyn NodeFactory>) {
        let node_type = factory.node_type().to_string();
        tracing::info!("Registering node type: {}", node_type);
        self.factories.insert(node_type, factory);
    }

    /// Create a node instance from a node type and config.
    ///
    /// Status is not checked here; compilation decides what to do with
    /// abstract and removed types.
    pub fn create_node(
        &self,
        node_type: &str,
        config: &Config,
    ) -> Result<Box<dyn FlowNode>, GraphError> {
        let factory = self
            .factories
            .get(node_type)
            .ok_or_else(|| GraphError::UnknownNodeType(node_type.to_string()))?;

        factory.create(config).map_err(|e| match e {
            GraphError::Configuration(message) => {
                GraphError::Configuration(format!("{}: {}", node_type, message))
            }
            other => other,
        })
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.factories.contains_key(node_type)
    }

    /// Get all registered node types, sorted
    pub fn list_node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Get metadata for a node type
    pub fn get_metadata(&self, node_type: &str) -> Option<NodeMetadata> {
        self.factories.get(node_type).map(|f| {
            let mut metadata = f.metadata();
            if let Some(status) = self.status_overrides.get(node_type) {
                metadata.status = *status;
            }
            metadata
        })
    }

    /// `None` for types nobody registered.
    pub fn status(&self, node_type: &str) -> Option<TypeStatus> {
        self.get_metadata(node_type).map(|m| m.status)
    }

    /// Override the status a factory declares, e.g. to retire a type.
    pub fn set_status(&mut self, node_type: impl Into<String>, status: TypeStatus) {
        let node_type = node_type.into();
        tracing::info!("Node type {} marked {:?}", node_type, status);
        self.status_overrides.insert(node_type, status);
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
