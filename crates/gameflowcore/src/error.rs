use crate::{NodeId, PinDirection};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Pin error: {0}")]
    Pin(#[from] PinError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Subgraph error: {0}")]
    Subgraph(#[from] SubgraphError),

    #[error("Unknown entry point: {0}")]
    UnknownEntryPoint(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Reasons a connection attempt is rejected. The graph is left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Pin name is empty")]
    EmptyPinName,

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Pin '{pin}' ({direction:?}) not declared on node {node}")]
    PinNotFound {
        node: NodeId,
        pin: String,
        direction: PinDirection,
    },

    #[error("A node cannot connect to itself")]
    SelfConnection,

    #[error("Pins must have opposite directions")]
    SameDirection,

    #[error("Pin '{pin}' on node {node} is already connected")]
    AlreadyConnected { node: NodeId, pin: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PinError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Pin '{0}' not found")]
    NotFound(String),

    #[error("Pin '{0}' already exists")]
    AlreadyExists(String),

    #[error("Pin name is empty")]
    EmptyName,

    #[error("Node does not accept additional {0:?} pins")]
    NotExtendable(PinDirection),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(NodeId),

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Entry point '{0}' must map to an Input node")]
    InvalidEntryPoint(String),

    #[error("Exit point '{0}' must map to an Output node")]
    InvalidExitPoint(String),

    #[error("Invalid node configuration: {0}")]
    Configuration(String),

    #[error("Graph failed validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubgraphError {
    #[error("Subgraph recursion not allowed: '{0}' references its owning asset")]
    Recursion(String),

    #[error("Node {0} is not a subgraph node")]
    NotASubgraph(NodeId),

    #[error("Subgraph asset not found: {0}")]
    AssetNotFound(String),
}
