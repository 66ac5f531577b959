use gameflowcore::{Config, FlowNode, GraphError, NodeCategory, NodeContext, PinLayout};
use gameflowruntime::{NodeFactory, NodeMetadata, PortDefinition};

pub const INPUT_NODE_TYPE: &str = "core.input";
pub const OUTPUT_NODE_TYPE: &str = "core.output";

/// Entry point of a graph. Triggers `Out` when its entry name is executed.
#[derive(Debug, Default, Clone)]
pub struct InputNode;

impl FlowNode for InputNode {
    fn node_type(&self) -> &str {
        INPUT_NODE_TYPE
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Input
    }

    fn default_pins(&self) -> PinLayout {
        PinLayout::new(Vec::<String>::new(), ["Out"])
    }

    fn clone_node(&self) -> Box<dyn FlowNode> {
        Box::new(InputNode)
    }
}

/// Exit point of a graph. Reaching it terminates the owning instance.
#[derive(Debug, Default, Clone)]
pub struct OutputNode;

impl FlowNode for OutputNode {
    fn node_type(&self) -> &str {
        OUTPUT_NODE_TYPE
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Output
    }

    fn default_pins(&self) -> PinLayout {
        PinLayout::new(["Exec"], Vec::<String>::new())
    }

    fn execute(&mut self, _pin: &str, ctx: &mut NodeContext<'_>) {
        ctx.terminate_execution();
    }

    fn clone_node(&self) -> Box<dyn FlowNode> {
        Box::new(OutputNode)
    }
}

pub struct InputNodeFactory;

impl NodeFactory for InputNodeFactory {
    fn create(&self, _config: &Config) -> Result<Box<dyn FlowNode>, GraphError> {
        Ok(Box::new(InputNode))
    }

    fn node_type(&self) -> &str {
        INPUT_NODE_TYPE
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Entry point triggered by name".to_string(),
            category: NodeCategory::Input,
            outputs: vec![PortDefinition::new("Out", "Fires when the entry is executed")],
            ..Default::default()
        }
    }
}

pub struct OutputNodeFactory;

impl NodeFactory for OutputNodeFactory {
    fn create(&self, _config: &Config) -> Result<Box<dyn FlowNode>, GraphError> {
        Ok(Box::new(OutputNode))
    }

    fn node_type(&self) -> &str {
        OUTPUT_NODE_TYPE
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Exit point; finishes the graph".to_string(),
            category: NodeCategory::Output,
            inputs: vec![PortDefinition::new("Exec", "Terminates the instance")],
            ..Default::default()
        }
    }
}
