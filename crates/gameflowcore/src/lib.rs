//! Core abstractions for the game flow engine
//!
//! This crate provides the graph model (pins, nodes, assets), the node
//! trait and its execution context, and the services latent nodes talk to.
//! Execution itself lives in `gameflowruntime`.

mod asset;
mod document;
mod error;
pub mod events;
mod listener;
mod node;
mod pin;
mod services;
mod tags;
mod timer;
mod topology;
mod value;

pub use asset::{AssetId, EditorMetadata, FlowAsset, InstanceId, NodeEntry, Position};
pub use document::{Connection, GraphDocument, NodeSpec};
pub use error::{ConnectionError, FlowError, GraphError, PinError, SubgraphError};
pub use events::*;
pub use listener::ListenerRegistry;
pub use node::{AsAny, FlowNode, NodeAction, NodeCategory, NodeContext, NodeId};
pub use pin::{NodePins, PinDirection, PinLayout, PinLink, PinRef};
pub use services::{
    Dispatch, ExternalEvent, FlowServices, ListenerId, ListenerService, Subscriber, TimerHandle,
    TimerService,
};
pub use tags::{MatchType, TagSet};
pub use timer::{TimerManager, MAX_CATCH_UP_FIRES};
pub use topology::RejectedWire;
pub use value::{Config, Value};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
