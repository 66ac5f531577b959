//! Execution pins and the per-node connection tables.

use crate::NodeId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinDirection {
    Input,
    Output,
}

impl PinDirection {
    pub fn opposite(self) -> Self {
        match self {
            PinDirection::Input => PinDirection::Output,
            PinDirection::Output => PinDirection::Input,
        }
    }
}

/// The other end of a connection: a pin name on another node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PinLink {
    pub pin: String,
    pub node: NodeId,
}

impl PinLink {
    pub fn new(pin: impl Into<String>, node: NodeId) -> Self {
        Self {
            pin: pin.into(),
            node,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.pin.is_empty() && !self.node.is_nil()
    }
}

/// Address of a pin inside a graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PinRef {
    pub node: NodeId,
    pub pin: String,
    pub direction: PinDirection,
}

impl PinRef {
    pub fn input(node: NodeId, pin: impl Into<String>) -> Self {
        Self {
            node,
            pin: pin.into(),
            direction: PinDirection::Input,
        }
    }

    pub fn output(node: NodeId, pin: impl Into<String>) -> Self {
        Self {
            node,
            pin: pin.into(),
            direction: PinDirection::Output,
        }
    }
}

/// Default pin set a node kind is constructed with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinLayout {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub can_add_input: bool,
    pub can_add_output: bool,
}

impl PinLayout {
    pub fn new<I, O>(inputs: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
            can_add_input: false,
            can_add_output: false,
        }
    }

    pub fn extendable_inputs(mut self) -> Self {
        self.can_add_input = true;
        self
    }

    pub fn extendable_outputs(mut self) -> Self {
        self.can_add_output = true;
        self
    }
}

/// Pin names and resolved connections of one node.
///
/// Pin name lists keep insertion order, which is the order a sequence-like
/// node fires its outputs in. Each pin holds at most one link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePins {
    inputs: Vec<String>,
    outputs: Vec<String>,
    input_links: IndexMap<String, PinLink>,
    output_links: IndexMap<String, PinLink>,
    can_add_input: bool,
    can_add_output: bool,
}

impl NodePins {
    pub fn from_layout(layout: PinLayout) -> Self {
        Self {
            inputs: layout.inputs,
            outputs: layout.outputs,
            input_links: IndexMap::new(),
            output_links: IndexMap::new(),
            can_add_input: layout.can_add_input,
            can_add_output: layout.can_add_output,
        }
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn names(&self, direction: PinDirection) -> &[String] {
        match direction {
            PinDirection::Input => &self.inputs,
            PinDirection::Output => &self.outputs,
        }
    }

    pub fn has_pin(&self, direction: PinDirection, name: &str) -> bool {
        self.names(direction).iter().any(|p| p == name)
    }

    pub fn can_add_input(&self) -> bool {
        self.can_add_input
    }

    pub fn can_add_output(&self) -> bool {
        self.can_add_output
    }

    pub fn can_add(&self, direction: PinDirection) -> bool {
        match direction {
            PinDirection::Input => self.can_add_input,
            PinDirection::Output => self.can_add_output,
        }
    }

    /// The output a plain node proceeds to when it finishes.
    pub fn default_output(&self) -> Option<&str> {
        self.outputs.first().map(String::as_str)
    }

    /// Resolved `(pin, node)` pair behind an output pin.
    pub fn output_link(&self, pin: &str) -> Option<&PinLink> {
        self.output_links.get(pin).filter(|link| link.is_valid())
    }

    pub fn input_link(&self, pin: &str) -> Option<&PinLink> {
        self.input_links.get(pin).filter(|link| link.is_valid())
    }

    pub fn link(&self, direction: PinDirection, pin: &str) -> Option<&PinLink> {
        match direction {
            PinDirection::Input => self.input_link(pin),
            PinDirection::Output => self.output_link(pin),
        }
    }

    pub fn output_links(&self) -> impl Iterator<Item = (&String, &PinLink)> {
        self.output_links.iter()
    }

    pub fn input_links(&self) -> impl Iterator<Item = (&String, &PinLink)> {
        self.input_links.iter()
    }

    /// True when no input pin carries a connection.
    pub fn has_connected_inputs(&self) -> bool {
        self.input_links.values().any(PinLink::is_valid)
    }

    pub(crate) fn set_link(&mut self, direction: PinDirection, pin: &str, link: PinLink) -> Option<PinLink> {
        self.links_mut(direction).insert(pin.to_string(), link)
    }

    pub(crate) fn take_link(&mut self, direction: PinDirection, pin: &str) -> Option<PinLink> {
        self.links_mut(direction).shift_remove(pin)
    }

    pub(crate) fn clear_links(&mut self) {
        self.input_links.clear();
        self.output_links.clear();
    }

    pub(crate) fn push_name(&mut self, direction: PinDirection, name: String) {
        match direction {
            PinDirection::Input => self.inputs.push(name),
            PinDirection::Output => self.outputs.push(name),
        }
    }

    pub(crate) fn remove_name(&mut self, direction: PinDirection, name: &str) -> bool {
        let names = match direction {
            PinDirection::Input => &mut self.inputs,
            PinDirection::Output => &mut self.outputs,
        };
        let before = names.len();
        names.retain(|n| n != name);
        names.len() != before
    }

    pub(crate) fn rename(&mut self, direction: PinDirection, old: &str, new: &str) {
        let names = match direction {
            PinDirection::Input => &mut self.inputs,
            PinDirection::Output => &mut self.outputs,
        };
        if let Some(slot) = names.iter_mut().find(|n| n.as_str() == old) {
            *slot = new.to_string();
        }
        let links = self.links_mut(direction);
        if let Some(index) = links.get_index_of(old) {
            if let Some(link) = links.shift_remove(old) {
                links.shift_insert(index, new.to_string(), link);
            }
        }
    }

    pub(crate) fn replace_names(&mut self, inputs: Vec<String>, outputs: Vec<String>) {
        self.inputs = inputs;
        self.outputs = outputs;
        self.clear_links();
    }

    /// Rewrite every link target through `remap`, dropping links whose
    /// node has no counterpart.
    pub(crate) fn remap_links(&mut self, remap: impl Fn(NodeId) -> Option<NodeId>) {
        for links in [&mut self.input_links, &mut self.output_links] {
            links.retain(|_, link| match remap(link.node) {
                Some(node) => {
                    link.node = node;
                    true
                }
                None => false,
            });
        }
    }

    fn links_mut(&mut self, direction: PinDirection) -> &mut IndexMap<String, PinLink> {
        match direction {
            PinDirection::Input => &mut self.input_links,
            PinDirection::Output => &mut self.output_links,
        }
    }
}
