use crate::next_numbered_pin;
use gameflowcore::{
    Config, FlowNode, GraphError, NodeCategory, NodeContext, NodePins, PinDirection, PinLayout,
    Value,
};
use gameflowruntime::{NodeFactory, NodeMetadata, PortDefinition};

pub const SEQUENCE_NODE_TYPE: &str = "flow.sequence";
pub const DO_N_NODE_TYPE: &str = "flow.do_n";

/// Fires every output in pin order. Each branch runs to completion before
/// the next one starts.
#[derive(Debug, Default, Clone)]
pub struct SequenceNode;

impl FlowNode for SequenceNode {
    fn node_type(&self) -> &str {
        SEQUENCE_NODE_TYPE
    }

    fn default_pins(&self) -> PinLayout {
        PinLayout::new(["Exec"], ["0", "1"]).extendable_outputs()
    }

    fn execute(&mut self, _pin: &str, ctx: &mut NodeContext<'_>) {
        let outputs = ctx.pins().outputs().to_vec();
        for output in outputs {
            ctx.trigger_output(output);
        }
        ctx.finish(true);
    }

    fn generate_pin_name(&self, direction: PinDirection, pins: &NodePins) -> String {
        next_numbered_pin(pins.names(direction), 0)
    }

    fn clone_node(&self) -> Box<dyn FlowNode> {
        Box::new(SequenceNode)
    }
}

/// Lets `Enter` through to `Exit` at most `n` times until `Reset`.
#[derive(Debug, Clone)]
pub struct DoNNode {
    n: u32,
    count: u32,
}

impl DoNNode {
    pub fn new(n: u32) -> Self {
        Self { n, count: 0 }
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

impl FlowNode for DoNNode {
    fn node_type(&self) -> &str {
        DO_N_NODE_TYPE
    }

    fn default_pins(&self) -> PinLayout {
        PinLayout::new(["Enter", "Reset"], ["Exit"])
    }

    fn execute(&mut self, pin: &str, ctx: &mut NodeContext<'_>) {
        match pin {
            "Enter" if self.count < self.n => {
                self.count += 1;
                ctx.finish_execute("Exit", true);
            }
            "Reset" => {
                self.count = 0;
                ctx.finish(true);
            }
            _ => ctx.finish(true),
        }
    }

    fn config(&self) -> Config {
        Config::from([("n".to_string(), Value::from(self.n))])
    }

    fn clone_node(&self) -> Box<dyn FlowNode> {
        Box::new(DoNNode::new(self.n))
    }

    fn debug_info(&self) -> Option<String> {
        Some(format!("{}/{}", self.count, self.n))
    }
}

pub struct SequenceNodeFactory;

impl NodeFactory for SequenceNodeFactory {
    fn create(&self, _config: &Config) -> Result<Box<dyn FlowNode>, GraphError> {
        Ok(Box::new(SequenceNode))
    }

    fn node_type(&self) -> &str {
        SEQUENCE_NODE_TYPE
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Fires every output in order".to_string(),
            inputs: vec![PortDefinition::new("Exec", "Start the sequence")],
            outputs: vec![
                PortDefinition::new("0", "First branch"),
                PortDefinition::new("1", "Second branch"),
            ],
            can_add_outputs: true,
            ..Default::default()
        }
    }
}

pub struct DoNNodeFactory;

impl NodeFactory for DoNNodeFactory {
    fn create(&self, config: &Config) -> Result<Box<dyn FlowNode>, GraphError> {
        let n = match config.get("n") {
            None => 1,
            Some(value) => value.as_u32().ok_or_else(|| {
                GraphError::Configuration("'n' must be a non-negative whole number".to_string())
            })?,
        };
        Ok(Box::new(DoNNode::new(n)))
    }

    fn node_type(&self) -> &str {
        DO_N_NODE_TYPE
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Passes Enter through to Exit at most N times".to_string(),
            category: NodeCategory::Default,
            inputs: vec![
                PortDefinition::new("Enter", "Counts and fires Exit while under N"),
                PortDefinition::new("Reset", "Zero the counter"),
            ],
            outputs: vec![PortDefinition::new("Exit", "Fires on the first N entries")],
            ..Default::default()
        }
    }
}
