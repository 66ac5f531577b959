use crate::{AssetId, Config, EditorMetadata, NodeId, Position, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_singleton() -> bool {
    true
}

/// Persisted topology of a flow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub id: AssetId,
    pub name: String,
    #[serde(default = "default_singleton")]
    pub singleton: bool,
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    /// Entry name → Input node
    #[serde(default)]
    pub custom_inputs: IndexMap<String, NodeId>,
    /// Exit name → Output node
    #[serde(default)]
    pub custom_outputs: IndexMap<String, NodeId>,
}

impl GraphDocument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            singleton: true,
            nodes: Vec::new(),
            connections: Vec::new(),
            custom_inputs: IndexMap::new(),
            custom_outputs: IndexMap::new(),
        }
    }

    pub fn add_node(&mut self, node: NodeSpec) -> NodeId {
        let id = node.id;
        self.nodes.push(node);
        id
    }

    pub fn connect(
        &mut self,
        from_node: NodeId,
        from_pin: impl Into<String>,
        to_node: NodeId,
        to_pin: impl Into<String>,
    ) {
        self.connections.push(Connection {
            from_node,
            from_pin: from_pin.into(),
            to_node,
            to_pin: to_pin.into(),
        });
    }

    pub fn add_entry_point(&mut self, name: impl Into<String>, node: NodeId) {
        self.custom_inputs.insert(name.into(), node);
    }

    pub fn add_exit_point(&mut self, name: impl Into<String>, node: NodeId) {
        self.custom_outputs.insert(name.into(), node);
    }

    pub fn find_node(&self, id: NodeId) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// One node as stored in a graph document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub config: Config,
    /// Empty means the node kind's default pins.
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EditorMetadata>,
}

impl NodeSpec {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            node_type: node_type.into(),
            name: None,
            config: Config::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            metadata: None,
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_pins<I, O>(mut self, inputs: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.metadata
            .get_or_insert_with(EditorMetadata::default)
            .position = Some(Position { x, y });
        self
    }
}

/// Connection between an output pin and an input pin
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub from_node: NodeId,
    pub from_pin: String,
    pub to_node: NodeId,
    pub to_pin: String,
}
