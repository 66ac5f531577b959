//! The flow graph asset: node table, named entry/exit points and the
//! symmetric pin connection model.

use crate::document::{Connection, GraphDocument, NodeSpec};
use crate::error::{ConnectionError, GraphError, PinError, SubgraphError};
use crate::{FlowNode, NodeCategory, NodeId, NodePins, PinDirection, PinLink, PinRef, Result};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub type AssetId = Uuid;
pub type InstanceId = Uuid;

/// Node position in the visual editor
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// Design-time data. Never read by the executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditorMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default)]
    pub opened: bool,
}

/// A node owned by an asset: its pins, its behavior and editor data.
pub struct NodeEntry {
    id: NodeId,
    type_name: String,
    name: Option<String>,
    pub(crate) pins: NodePins,
    behavior: Box<dyn FlowNode>,
    pub metadata: Option<EditorMetadata>,
}

impl NodeEntry {
    fn new(id: NodeId, type_name: String, mut behavior: Box<dyn FlowNode>) -> Self {
        let pins = NodePins::from_layout(behavior.default_pins());
        behavior.sync_pins(&pins);
        Self {
            id,
            type_name,
            name: None,
            pins,
            behavior,
            metadata: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Registered type name. A placeholder keeps the name it replaced.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn pins(&self) -> &NodePins {
        &self.pins
    }

    pub fn behavior(&self) -> &(dyn FlowNode + 'static) {
        self.behavior.as_ref()
    }

    pub fn behavior_mut(&mut self) -> &mut (dyn FlowNode + 'static) {
        self.behavior.as_mut()
    }

    /// Borrow pins and behavior at the same time, as the executor needs.
    pub fn split_mut(&mut self) -> (&NodePins, &mut (dyn FlowNode + 'static)) {
        (&self.pins, self.behavior.as_mut())
    }

    pub fn category(&self) -> NodeCategory {
        self.behavior.category()
    }
}

impl std::fmt::Debug for NodeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeEntry")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("pins", &self.pins)
            .finish_non_exhaustive()
    }
}

/// A flow graph: the template designers author, and the deep copy every
/// running instance executes.
pub struct FlowAsset {
    pub(crate) id: AssetId,
    pub(crate) name: String,
    pub(crate) singleton: bool,
    pub(crate) archetype: Option<AssetId>,
    pub(crate) nodes: IndexMap<NodeId, NodeEntry>,
    pub(crate) custom_inputs: IndexMap<String, NodeId>,
    pub(crate) custom_outputs: IndexMap<String, NodeId>,
    pub(crate) orphans: IndexSet<NodeId>,
}

impl FlowAsset {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), name)
    }

    pub fn with_id(id: AssetId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            singleton: true,
            archetype: None,
            nodes: IndexMap::new(),
            custom_inputs: IndexMap::new(),
            custom_outputs: IndexMap::new(),
            orphans: IndexSet::new(),
        }
    }

    pub fn id(&self) -> AssetId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// At most one running instance per context.
    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    pub fn set_singleton(&mut self, singleton: bool) {
        self.singleton = singleton;
    }

    /// Template this asset was copied from, if it is an instance.
    pub fn archetype(&self) -> Option<AssetId> {
        self.archetype
    }

    /// Identity shared by a template and all of its copies.
    pub fn template_id(&self) -> AssetId {
        self.archetype.unwrap_or(self.id)
    }

    // ---- nodes ----

    pub fn add_node(&mut self, behavior: Box<dyn FlowNode>) -> NodeId {
        let id = Uuid::new_v4();
        let type_name = behavior.node_type().to_string();
        self.nodes.insert(id, NodeEntry::new(id, type_name, behavior));
        id
    }

    /// Insert a node under a fixed id, as loading a document does.
    pub fn add_node_with_id(
        &mut self,
        id: NodeId,
        type_name: impl Into<String>,
        behavior: Box<dyn FlowNode>,
    ) -> std::result::Result<NodeId, GraphError> {
        if id.is_nil() || self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateNode(id));
        }
        self.nodes.insert(id, NodeEntry::new(id, type_name.into(), behavior));
        Ok(id)
    }

    /// Remove a node, its connections on both sides and any entry/exit
    /// point mapped to it.
    pub fn remove_node(&mut self, id: NodeId) -> Option<Box<dyn FlowNode>> {
        self.disconnect_all(id);
        let entry = self.nodes.shift_remove(&id)?;
        self.custom_inputs.retain(|_, node| *node != id);
        self.custom_outputs.retain(|_, node| *node != id);
        self.orphans.shift_remove(&id);
        tracing::debug!("Removed node {} ({})", id, entry.type_name);
        Some(entry.behavior)
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeEntry> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeEntry> {
        self.nodes.get_mut(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeEntry> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn set_node_name(&mut self, id: NodeId, name: impl Into<String>) -> bool {
        match self.nodes.get_mut(&id) {
            Some(entry) => {
                entry.name = Some(name.into());
                true
            }
            None => false,
        }
    }

    /// Nodes with no connected input, other than Input nodes, as of the last
    /// compilation.
    pub fn orphans(&self) -> &IndexSet<NodeId> {
        &self.orphans
    }

    pub fn is_orphan(&self, id: NodeId) -> bool {
        self.orphans.contains(&id)
    }

    // ---- connections ----

    /// Link an output pin to an input pin on another node.
    ///
    /// Pins hold a single link: a pin that is already connected drops its
    /// old peer first.
    pub fn connect(&mut self, a: &PinRef, b: &PinRef) -> std::result::Result<(), ConnectionError> {
        if a.pin.is_empty() || b.pin.is_empty() {
            return Err(ConnectionError::EmptyPinName);
        }
        if a.node == b.node {
            return Err(ConnectionError::SelfConnection);
        }
        if a.direction == b.direction {
            return Err(ConnectionError::SameDirection);
        }
        for pin in [a, b] {
            let entry = self
                .nodes
                .get(&pin.node)
                .ok_or(ConnectionError::NodeNotFound(pin.node))?;
            if !entry.pins.has_pin(pin.direction, &pin.pin) {
                return Err(ConnectionError::PinNotFound {
                    node: pin.node,
                    pin: pin.pin.clone(),
                    direction: pin.direction,
                });
            }
        }

        let (output, input) = match a.direction {
            PinDirection::Output => (a, b),
            PinDirection::Input => (b, a),
        };
        self.disconnect(output);
        self.disconnect(input);

        if let Some(entry) = self.nodes.get_mut(&output.node) {
            entry.pins.set_link(
                PinDirection::Output,
                &output.pin,
                PinLink::new(input.pin.clone(), input.node),
            );
        }
        if let Some(entry) = self.nodes.get_mut(&input.node) {
            entry.pins.set_link(
                PinDirection::Input,
                &input.pin,
                PinLink::new(output.pin.clone(), output.node),
            );
        }
        tracing::debug!(
            "Connected {}:{} -> {}:{}",
            output.node,
            output.pin,
            input.node,
            input.pin
        );
        Ok(())
    }

    /// Break the link on `pin` and on its peer. Returns false when there was none.
    pub fn disconnect(&mut self, pin: &PinRef) -> bool {
        let Some(entry) = self.nodes.get_mut(&pin.node) else {
            return false;
        };
        let Some(link) = entry.pins.take_link(pin.direction, &pin.pin) else {
            return false;
        };
        if let Some(peer) = self.nodes.get_mut(&link.node) {
            let points_back = peer
                .pins
                .link(pin.direction.opposite(), &link.pin)
                .is_some_and(|back| back.node == pin.node && back.pin == pin.pin);
            if points_back {
                peer.pins.take_link(pin.direction.opposite(), &link.pin);
            }
        }
        true
    }

    fn disconnect_all(&mut self, node: NodeId) {
        let Some(entry) = self.nodes.get(&node) else {
            return;
        };
        let linked: Vec<PinRef> = entry
            .pins
            .input_links()
            .map(|(pin, _)| PinRef::input(node, pin.clone()))
            .chain(
                entry
                    .pins
                    .output_links()
                    .map(|(pin, _)| PinRef::output(node, pin.clone())),
            )
            .collect();
        for pin in &linked {
            self.disconnect(pin);
        }
    }

    // ---- pins ----

    /// Rename a pin, carrying its connection over on both sides.
    pub fn rename_pin(
        &mut self,
        node: NodeId,
        direction: PinDirection,
        old: &str,
        new: &str,
    ) -> std::result::Result<(), PinError> {
        if new.is_empty() {
            return Err(PinError::EmptyName);
        }
        let entry = self.nodes.get_mut(&node).ok_or(PinError::NodeNotFound(node))?;
        if !entry.pins.has_pin(direction, old) {
            return Err(PinError::NotFound(old.to_string()));
        }
        if old == new {
            return Ok(());
        }
        if entry.pins.has_pin(direction, new) {
            return Err(PinError::AlreadyExists(new.to_string()));
        }

        entry.pins.rename(direction, old, new);
        let link = entry.pins.link(direction, new).cloned();
        let NodeEntry { pins, behavior, .. } = entry;
        behavior.sync_pins(pins);

        if let Some(link) = link {
            if let Some(peer) = self.nodes.get_mut(&link.node) {
                peer.pins
                    .set_link(direction.opposite(), &link.pin, PinLink::new(new, node));
            }
        }
        Ok(())
    }

    /// Add a dynamic pin. Without a name the node kind generates one.
    pub fn add_pin(
        &mut self,
        node: NodeId,
        direction: PinDirection,
        name: Option<&str>,
    ) -> std::result::Result<String, PinError> {
        let entry = self.nodes.get_mut(&node).ok_or(PinError::NodeNotFound(node))?;
        if !entry.pins.can_add(direction) {
            return Err(PinError::NotExtendable(direction));
        }
        let name = match name {
            Some(name) => name.to_string(),
            None => entry.behavior.generate_pin_name(direction, &entry.pins),
        };
        if name.is_empty() {
            return Err(PinError::EmptyName);
        }
        if entry.pins.has_pin(direction, &name) {
            return Err(PinError::AlreadyExists(name));
        }
        entry.pins.push_name(direction, name.clone());
        let NodeEntry { pins, behavior, .. } = entry;
        behavior.sync_pins(pins);
        Ok(name)
    }

    /// Remove a pin and its connection on both sides.
    pub fn remove_pin(
        &mut self,
        node: NodeId,
        direction: PinDirection,
        name: &str,
    ) -> std::result::Result<(), PinError> {
        let entry = self.nodes.get(&node).ok_or(PinError::NodeNotFound(node))?;
        if !entry.pins.has_pin(direction, name) {
            return Err(PinError::NotFound(name.to_string()));
        }
        self.disconnect(&PinRef {
            node,
            pin: name.to_string(),
            direction,
        });
        if let Some(entry) = self.nodes.get_mut(&node) {
            entry.pins.remove_name(direction, name);
            let NodeEntry { pins, behavior, .. } = entry;
            behavior.sync_pins(pins);
        }
        Ok(())
    }

    /// Replace a node's pin lists. Every existing connection is dropped.
    pub fn set_pins(
        &mut self,
        node: NodeId,
        inputs: Vec<String>,
        outputs: Vec<String>,
    ) -> std::result::Result<(), PinError> {
        if !self.nodes.contains_key(&node) {
            return Err(PinError::NodeNotFound(node));
        }
        if inputs.iter().chain(outputs.iter()).any(String::is_empty) {
            return Err(PinError::EmptyName);
        }
        self.disconnect_all(node);
        if let Some(entry) = self.nodes.get_mut(&node) {
            entry.pins.replace_names(dedup(inputs), dedup(outputs));
            let NodeEntry { pins, behavior, .. } = entry;
            behavior.sync_pins(pins);
        }
        Ok(())
    }

    // ---- entry and exit points ----

    pub fn add_entry_point(
        &mut self,
        name: impl Into<String>,
        node: NodeId,
    ) -> std::result::Result<(), GraphError> {
        let name = name.into();
        let entry = self.nodes.get(&node).ok_or(GraphError::NodeNotFound(node))?;
        if name.is_empty() || entry.category() != NodeCategory::Input {
            return Err(GraphError::InvalidEntryPoint(name));
        }
        self.custom_inputs.insert(name, node);
        Ok(())
    }

    pub fn add_exit_point(
        &mut self,
        name: impl Into<String>,
        node: NodeId,
    ) -> std::result::Result<(), GraphError> {
        let name = name.into();
        let entry = self.nodes.get(&node).ok_or(GraphError::NodeNotFound(node))?;
        if name.is_empty() || entry.category() != NodeCategory::Output {
            return Err(GraphError::InvalidExitPoint(name));
        }
        self.custom_outputs.insert(name, node);
        Ok(())
    }

    pub fn remove_entry_point(&mut self, name: &str) -> Option<NodeId> {
        self.custom_inputs.shift_remove(name)
    }

    pub fn remove_exit_point(&mut self, name: &str) -> Option<NodeId> {
        self.custom_outputs.shift_remove(name)
    }

    pub fn entry_point(&self, name: &str) -> Option<NodeId> {
        self.custom_inputs.get(name).copied()
    }

    pub fn exit_point(&self, name: &str) -> Option<NodeId> {
        self.custom_outputs.get(name).copied()
    }

    /// Exit name an Output node is registered under.
    pub fn exit_name(&self, node: NodeId) -> Option<&str> {
        self.custom_outputs
            .iter()
            .find(|(_, id)| **id == node)
            .map(|(name, _)| name.as_str())
    }

    pub fn entry_points(&self) -> &IndexMap<String, NodeId> {
        &self.custom_inputs
    }

    pub fn exit_points(&self) -> &IndexMap<String, NodeId> {
        &self.custom_outputs
    }

    // ---- subgraphs ----

    /// Bind `template` to a subgraph node and regenerate its pins from the
    /// template's entry and exit points.
    ///
    /// Fails without touching the node when the template is this asset or
    /// nests it at any depth.
    pub fn bind_subgraph(&mut self, node: NodeId, template: Arc<FlowAsset>) -> Result<()> {
        let entry = self.nodes.get(&node).ok_or(GraphError::NodeNotFound(node))?;
        if !entry.behavior.is_subgraph() {
            return Err(SubgraphError::NotASubgraph(node).into());
        }
        if self.is_nested_in(&template) {
            tracing::error!(
                "Subgraph node {} in '{}' cannot reference '{}': recursion",
                node,
                self.name,
                template.name
            );
            return Err(SubgraphError::Recursion(template.name.clone()).into());
        }

        let inputs: Vec<String> = template.custom_inputs.keys().cloned().collect();
        let outputs: Vec<String> = template.custom_outputs.keys().cloned().collect();
        if let Some(entry) = self.nodes.get_mut(&node) {
            entry.behavior.bind_nested_asset(template);
        }
        self.set_pins(node, inputs, outputs)?;
        Ok(())
    }

    fn is_same_asset(&self, other: &FlowAsset) -> bool {
        self.template_id() == other.template_id()
    }

    /// True when `candidate` is this asset or contains it through subgraphs.
    pub fn is_nested_in(&self, candidate: &FlowAsset) -> bool {
        self.is_same_asset(candidate)
            || candidate
                .nodes
                .values()
                .filter_map(|entry| entry.behavior.nested_asset())
                .any(|nested| self.is_nested_in(nested))
    }

    // ---- copies and export ----

    /// Copy every node under a new id and remap all links through the
    /// old → new table. The copy gets a fresh asset id and records this
    /// asset as its archetype.
    pub fn deep_clone(&self) -> (FlowAsset, HashMap<NodeId, NodeId>) {
        let remap: HashMap<NodeId, NodeId> = self
            .nodes
            .keys()
            .map(|old| (*old, Uuid::new_v4()))
            .collect();
        let lookup = |old: NodeId| remap.get(&old).copied();

        let mut copy = FlowAsset::with_id(Uuid::new_v4(), self.name.clone());
        copy.singleton = self.singleton;
        copy.archetype = Some(self.template_id());

        for (old, entry) in &self.nodes {
            let Some(new) = lookup(*old) else { continue };
            let mut pins = entry.pins.clone();
            pins.remap_links(lookup);
            copy.nodes.insert(
                new,
                NodeEntry {
                    id: new,
                    type_name: entry.type_name.clone(),
                    name: entry.name.clone(),
                    pins,
                    behavior: entry.behavior.clone_node(),
                    metadata: entry.metadata.clone(),
                },
            );
        }
        copy.custom_inputs = remap_map(&self.custom_inputs, lookup);
        copy.custom_outputs = remap_map(&self.custom_outputs, lookup);
        copy.orphans = self.orphans.iter().filter_map(|id| lookup(*id)).collect();
        (copy, remap)
    }

    /// Every resolved output link, in node and pin order.
    pub fn wires(&self) -> Vec<Connection> {
        self.nodes
            .values()
            .flat_map(|entry| {
                entry.pins.output_links().filter(|(_, link)| link.is_valid()).map(
                    move |(pin, link)| Connection {
                        from_node: entry.id,
                        from_pin: pin.clone(),
                        to_node: link.node,
                        to_pin: link.pin.clone(),
                    },
                )
            })
            .collect()
    }

    pub fn to_document(&self) -> GraphDocument {
        GraphDocument {
            id: self.id,
            name: self.name.clone(),
            singleton: self.singleton,
            nodes: self
                .nodes
                .values()
                .map(|entry| NodeSpec {
                    id: entry.id,
                    node_type: entry.type_name.clone(),
                    name: entry.name.clone(),
                    config: entry.behavior.config(),
                    inputs: entry.pins.inputs().to_vec(),
                    outputs: entry.pins.outputs().to_vec(),
                    metadata: entry.metadata.clone(),
                })
                .collect(),
            connections: self.wires(),
            custom_inputs: self.custom_inputs.clone(),
            custom_outputs: self.custom_outputs.clone(),
        }
    }
}

impl std::fmt::Debug for FlowAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowAsset")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .field("custom_inputs", &self.custom_inputs)
            .field("custom_outputs", &self.custom_outputs)
            .finish()
    }
}

fn remap_map(
    map: &IndexMap<String, NodeId>,
    lookup: impl Fn(NodeId) -> Option<NodeId>,
) -> IndexMap<String, NodeId> {
    map.iter()
        .filter_map(|(name, id)| lookup(*id).map(|new| (name.clone(), new)))
        .collect()
}

fn dedup(names: Vec<String>) -> Vec<String> {
    let unique: IndexSet<String> = names.into_iter().collect();
    unique.into_iter().collect()
}
