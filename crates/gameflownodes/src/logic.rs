//! Joins: AND waits for every input, OR passes any input straight through.

use crate::next_numbered_pin;
use gameflowcore::{
    Config, FlowNode, GraphError, NodeCategory, NodeContext, NodePins, PinDirection, PinLayout,
};
use gameflowruntime::{NodeFactory, NodeMetadata, PortDefinition};
use indexmap::IndexMap;

pub const AND_NODE_TYPE: &str = "logic.and";
pub const OR_NODE_TYPE: &str = "logic.or";

const OUT: &str = "Out";

/// Fires `Out` once every numbered input has been triggered, then resets.
#[derive(Debug, Default, Clone)]
pub struct AndNode {
    /// One flag per numbered input, in pin order.
    flags: IndexMap<String, bool>,
}

impl AndNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activated_count(&self) -> usize {
        self.flags.values().filter(|set| **set).count()
    }

    pub fn input_count(&self) -> usize {
        self.flags.len()
    }

    fn reset(&mut self) {
        self.flags.values_mut().for_each(|set| *set = false);
    }
}

impl FlowNode for AndNode {
    fn node_type(&self) -> &str {
        AND_NODE_TYPE
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Conditional
    }

    fn default_pins(&self) -> PinLayout {
        PinLayout::new(["1", "2"], [OUT]).extendable_inputs()
    }

    fn execute(&mut self, pin: &str, ctx: &mut NodeContext<'_>) {
        let flag = match pin.parse::<u32>() {
            Ok(_) => self.flags.get_mut(pin),
            Err(_) => None,
        };
        let Some(flag) = flag else {
            tracing::debug!("AND node {} ignores pin '{}'", ctx.node_id(), pin);
            // Leave the active set unless a join is in progress.
            ctx.finish(self.activated_count() == 0);
            return;
        };
        if *flag {
            return;
        }
        *flag = true;

        if self.activated_count() == self.flags.len() {
            self.reset();
            ctx.finish_execute(OUT, true);
        }
    }

    fn on_finish_execute(&mut self, _ctx: &mut NodeContext<'_>) {
        self.reset();
    }

    fn sync_pins(&mut self, pins: &NodePins) {
        let previous = std::mem::take(&mut self.flags);
        self.flags = pins
            .inputs()
            .iter()
            .map(|name| (name.clone(), previous.get(name).copied().unwrap_or(false)))
            .collect();
    }

    fn generate_pin_name(&self, direction: PinDirection, pins: &NodePins) -> String {
        next_numbered_pin(pins.names(direction), 1)
    }

    fn clone_node(&self) -> Box<dyn FlowNode> {
        let mut copy = self.clone();
        copy.reset();
        Box::new(copy)
    }

    fn breaks_cascade(&self) -> bool {
        true
    }

    fn debug_info(&self) -> Option<String> {
        Some(format!("{}/{} inputs", self.activated_count(), self.flags.len()))
    }
}

/// Fires `Out` for every input trigger. Keeps no state.
#[derive(Debug, Default, Clone)]
pub struct OrNode;

impl FlowNode for OrNode {
    fn node_type(&self) -> &str {
        OR_NODE_TYPE
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Conditional
    }

    fn default_pins(&self) -> PinLayout {
        PinLayout::new(["1", "2"], [OUT]).extendable_inputs()
    }

    fn execute(&mut self, _pin: &str, ctx: &mut NodeContext<'_>) {
        ctx.finish_execute(OUT, true);
    }

    fn generate_pin_name(&self, direction: PinDirection, pins: &NodePins) -> String {
        next_numbered_pin(pins.names(direction), 1)
    }

    fn clone_node(&self) -> Box<dyn FlowNode> {
        Box::new(OrNode)
    }
}

pub struct AndNodeFactory;

impl NodeFactory for AndNodeFactory {
    fn create(&self, _config: &Config) -> Result<Box<dyn FlowNode>, GraphError> {
        Ok(Box::new(AndNode::new()))
    }

    fn node_type(&self) -> &str {
        AND_NODE_TYPE
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Fires once every input has been triggered".to_string(),
            category: NodeCategory::Conditional,
            inputs: vec![
                PortDefinition::new("1", "Join input"),
                PortDefinition::new("2", "Join input"),
            ],
            outputs: vec![PortDefinition::new(OUT, "All inputs triggered")],
            can_add_inputs: true,
            ..Default::default()
        }
    }
}

pub struct OrNodeFactory;

impl NodeFactory for OrNodeFactory {
    fn create(&self, _config: &Config) -> Result<Box<dyn FlowNode>, GraphError> {
        Ok(Box::new(OrNode))
    }

    fn node_type(&self) -> &str {
        OR_NODE_TYPE
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Fires whenever any input is triggered".to_string(),
            category: NodeCategory::Conditional,
            inputs: vec![
                PortDefinition::new("1", "Any input"),
                PortDefinition::new("2", "Any input"),
            ],
            outputs: vec![PortDefinition::new(OUT, "Fires per trigger")],
            can_add_inputs: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gameflowcore::{FlowAsset, FlowServices, NodeAction, NodeId};

    fn fire(asset: &mut FlowAsset, node: NodeId, pin: &str) -> Vec<NodeAction> {
        let instance = asset.id();
        let services = FlowServices::default();
        let entry = asset.node_mut(node).unwrap();
        let (pins, behavior) = entry.split_mut();
        let mut ctx = NodeContext::new(instance, node, pins, &services);
        behavior.execute(pin, &mut ctx);
        ctx.into_actions()
    }

    fn out() -> NodeAction {
        NodeAction::Finish {
            output: Some(OUT.to_string()),
            terminate: true,
        }
    }

    #[test]
    fn test_and_fires_once_all_inputs_seen() {
        let mut asset = FlowAsset::new("join");
        let and = asset.add_node(Box::new(AndNode::new()));
        assert_eq!(asset.add_pin(and, PinDirection::Input, None).unwrap(), "3");

        assert!(fire(&mut asset, and, "1").is_empty());
        assert!(fire(&mut asset, and, "1").is_empty());
        assert!(fire(&mut asset, and, "3").is_empty());
        assert_eq!(fire(&mut asset, and, "2"), vec![out()]);

        let node = asset.node(and).unwrap().behavior().downcast_ref::<AndNode>().unwrap();
        assert_eq!(node.activated_count(), 0);
        assert_eq!(node.input_count(), 3);

        // Fresh round after the reset.
        assert!(fire(&mut asset, and, "2").is_empty());
    }

    #[test]
    fn test_and_ignores_non_numeric_pins() {
        let mut asset = FlowAsset::new("join");
        let and = asset.add_node(Box::new(AndNode::new()));

        assert_eq!(
            fire(&mut asset, and, "Reset"),
            vec![NodeAction::Finish {
                output: None,
                terminate: true
            }]
        );
        fire(&mut asset, and, "1");
        assert_eq!(
            fire(&mut asset, and, "7"),
            vec![NodeAction::Finish {
                output: None,
                terminate: false
            }]
        );
    }

    #[test]
    fn test_and_keeps_flags_when_pins_change() {
        let mut asset = FlowAsset::new("join");
        let and = asset.add_node(Box::new(AndNode::new()));
        fire(&mut asset, and, "1");
        asset.add_pin(and, PinDirection::Input, None).unwrap();

        let node = asset.node(and).unwrap().behavior().downcast_ref::<AndNode>().unwrap();
        assert_eq!(node.debug_info().as_deref(), Some("1/3 inputs"));
    }

    #[test]
    fn test_or_fires_per_trigger() {
        let mut asset = FlowAsset::new("any");
        let or = asset.add_node(Box::new(OrNode));

        assert_eq!(fire(&mut asset, or, "1"), vec![out()]);
        assert_eq!(fire(&mut asset, or, "1"), vec![out()]);
        assert_eq!(fire(&mut asset, or, "2"), vec![out()]);
    }
}
