//! Standard node library
//!
//! Built-in nodes for game flow graphs: entry and exit points, joins,
//! sequencing, timers, subgraphs and world listeners.

mod debug;
mod dummy;
mod flow;
mod io;
mod logic;
mod subgraph;
mod time;
mod world;

pub use debug::{LogLevel, LogNode, LOG_NODE_TYPE};
pub use dummy::DummyNode;
pub use flow::{DoNNode, SequenceNode, DO_N_NODE_TYPE, SEQUENCE_NODE_TYPE};
pub use io::{InputNode, OutputNode, INPUT_NODE_TYPE, OUTPUT_NODE_TYPE};
pub use logic::{AndNode, OrNode, AND_NODE_TYPE, OR_NODE_TYPE};
pub use subgraph::{SubgraphNode, SUBGRAPH_NODE_TYPE};
pub use time::{TimerNode, TIMER_NODE_TYPE};
pub use world::{
    ListenerEventNode, ListenerQuery, ListenerTrigger, NotifyListenersNode,
    NOTIFY_LISTENERS_TYPE, ON_LISTENER_NOTIFY_TYPE, ON_LISTENER_REGISTERED_TYPE,
    ON_LISTENER_UNREGISTERED_TYPE,
};

use gameflowcore::{FlowAsset, GraphError, NodeId};
use gameflowruntime::NodeRegistry;
use std::sync::Arc;

/// Register all standard nodes with a registry
pub fn register_all(registry: &mut NodeRegistry) {
    registry.register(Arc::new(dummy::DummyNodeFactory));
    registry.register(Arc::new(io::InputNodeFactory));
    registry.register(Arc::new(io::OutputNodeFactory));
    registry.register(Arc::new(logic::AndNodeFactory));
    registry.register(Arc::new(logic::OrNodeFactory));
    registry.register(Arc::new(flow::SequenceNodeFactory));
    registry.register(Arc::new(flow::DoNNodeFactory));
    registry.register(Arc::new(time::TimerNodeFactory));
    registry.register(Arc::new(debug::LogNodeFactory));
    registry.register(Arc::new(subgraph::SubgraphNodeFactory));
    registry.register(Arc::new(world::NotifyListenersNodeFactory));
    for trigger in [
        ListenerTrigger::Registered,
        ListenerTrigger::Unregistered,
        ListenerTrigger::Notified,
    ] {
        registry.register(Arc::new(world::ListenerEventNodeFactory::new(trigger)));
    }
}

/// A registry holding every standard node.
pub fn standard_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    register_all(&mut registry);
    registry
}

/// A new asset with a `Start` entry point and a `Finish` exit point.
#[derive(Debug)]
pub struct AssetScaffold {
    pub asset: FlowAsset,
    pub start: NodeId,
    pub finish: NodeId,
}

pub fn scaffold(name: impl Into<String>) -> Result<AssetScaffold, GraphError> {
    let mut asset = FlowAsset::new(name);
    let start = asset.add_node(Box::new(InputNode));
    let finish = asset.add_node(Box::new(OutputNode));
    asset.add_entry_point("Start", start)?;
    asset.add_exit_point("Finish", finish)?;
    Ok(AssetScaffold {
        asset,
        start,
        finish,
    })
}

/// Next free numeric pin name: one past the highest numeric name, or `start`.
pub(crate) fn next_numbered_pin(existing: &[String], start: u32) -> String {
    existing
        .iter()
        .filter_map(|name| name.parse::<u32>().ok())
        .max()
        .map_or(start, |highest| highest + 1)
        .to_string()
}
