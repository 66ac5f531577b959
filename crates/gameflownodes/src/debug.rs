use gameflowcore::{Config, FlowNode, GraphError, NodeCategory, NodeContext, PinLayout, Value};
use gameflowruntime::{NodeFactory, NodeMetadata, PortDefinition};

pub const LOG_NODE_TYPE: &str = "debug.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

/// Simple debug node that logs a message and passes execution through
#[derive(Debug, Clone)]
pub struct LogNode {
    message: String,
    level: LogLevel,
}

impl LogNode {
    pub fn new(message: impl Into<String>, level: LogLevel) -> Self {
        Self {
            message: message.into(),
            level,
        }
    }
}

impl FlowNode for LogNode {
    fn node_type(&self) -> &str {
        LOG_NODE_TYPE
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Debug
    }

    fn default_pins(&self) -> PinLayout {
        PinLayout::new(["Exec"], ["Out"])
    }

    fn execute(&mut self, _pin: &str, ctx: &mut NodeContext<'_>) {
        let message = format!("DEBUG: {}", self.message);
        match self.level {
            LogLevel::Info => {
                tracing::info!(node = %ctx.node_id(), "{}", message);
                ctx.info(message);
            }
            LogLevel::Warning => {
                tracing::warn!(node = %ctx.node_id(), "{}", message);
                ctx.warn(message);
            }
            LogLevel::Error => {
                tracing::error!(node = %ctx.node_id(), "{}", message);
                ctx.error(message);
            }
        }
        ctx.finish_execute("Out", true);
    }

    fn config(&self) -> Config {
        Config::from([
            ("message".to_string(), Value::from(self.message.as_str())),
            ("level".to_string(), Value::from(self.level.as_str())),
        ])
    }

    fn clone_node(&self) -> Box<dyn FlowNode> {
        Box::new(self.clone())
    }
}

pub struct LogNodeFactory;

impl NodeFactory for LogNodeFactory {
    fn create(&self, config: &Config) -> Result<Box<dyn FlowNode>, GraphError> {
        let message = config
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("(no message)");
        let level = match config.get("level").and_then(Value::as_str) {
            None | Some("info") => LogLevel::Info,
            Some("warning") | Some("warn") => LogLevel::Warning,
            Some("error") => LogLevel::Error,
            Some(other) => {
                return Err(GraphError::Configuration(format!(
                    "unknown log level '{}'",
                    other
                )))
            }
        };
        Ok(Box::new(LogNode::new(message, level)))
    }

    fn node_type(&self) -> &str {
        LOG_NODE_TYPE
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Logs a message for debugging".to_string(),
            category: NodeCategory::Debug,
            inputs: vec![PortDefinition::new("Exec", "Log the message")],
            outputs: vec![PortDefinition::new("Out", "Fires after logging")],
            ..Default::default()
        }
    }
}
