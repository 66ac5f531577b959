use gameflowcore::{Config, FlowNode, GraphError, NodeContext, PinLayout};
use gameflowruntime::{NodeFactory, NodeMetadata, TypeStatus, PLACEHOLDER_NODE_TYPE};

/// Stand-in for a node whose type could not be instantiated.
///
/// Keeps whatever pins the document declared so the topology survives a
/// round trip. Executing it fails the instance.
#[derive(Debug, Default, Clone)]
pub struct DummyNode {
    config: Config,
}

impl DummyNode {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl FlowNode for DummyNode {
    fn node_type(&self) -> &str {
        PLACEHOLDER_NODE_TYPE
    }

    fn default_pins(&self) -> PinLayout {
        PinLayout::default().extendable_inputs().extendable_outputs()
    }

    fn execute(&mut self, pin: &str, ctx: &mut NodeContext<'_>) {
        let message = format!(
            "Placeholder node {} executed on pin '{}'; replace it with a valid node",
            ctx.node_id(),
            pin
        );
        tracing::error!("{}", message);
        ctx.error(message.clone());
        ctx.fail(message);
    }

    fn config(&self) -> Config {
        self.config.clone()
    }

    fn clone_node(&self) -> Box<dyn FlowNode> {
        Box::new(self.clone())
    }
}

pub struct DummyNodeFactory;

impl NodeFactory for DummyNodeFactory {
    fn create(&self, config: &Config) -> Result<Box<dyn FlowNode>, GraphError> {
        Ok(Box::new(DummyNode::new(config.clone())))
    }

    fn node_type(&self) -> &str {
        PLACEHOLDER_NODE_TYPE
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Placeholder for invalid node types".to_string(),
            status: TypeStatus::Abstract,
            can_add_inputs: true,
            can_add_outputs: true,
            ..Default::default()
        }
    }
}
