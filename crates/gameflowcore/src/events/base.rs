use crate::{AssetId, InstanceId, NodeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Why an instance stopped executing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason")]
pub enum FinishReason {
    /// An Output node registered under this exit name was reached.
    Exit { name: String },
    /// An Output node not registered as an exit point was reached.
    Terminated,
    /// Stopped from outside while nodes were still active.
    Cancelled,
    /// A node failed safely (dummy node, depth guard).
    Failed { message: String },
}

/// Events emitted while graph instances execute
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    InstanceStarted {
        instance_id: InstanceId,
        template_id: AssetId,
        entry_point: String,
        timestamp: DateTime<Utc>,
    },
    NodeActivated {
        instance_id: InstanceId,
        node_id: NodeId,
        node_type: String,
        pin: String,
        timestamp: DateTime<Utc>,
    },
    NodeFinished {
        instance_id: InstanceId,
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    InstanceFinished {
        instance_id: InstanceId,
        reason: FinishReason,
        timestamp: DateTime<Utc>,
    },
    NodeEvent {
        instance_id: InstanceId,
        node_id: NodeId,
        event: NodeEvent,
        timestamp: DateTime<Utc>,
    },
}

/// Messages a node publishes about itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum NodeEvent {
    Info { message: String },
    Warning { message: String },
    Error { message: String },
}

/// Event emitter handed to a node while it runs
#[derive(Clone)]
pub struct EventEmitter {
    instance_id: InstanceId,
    node_id: NodeId,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(
        instance_id: InstanceId,
        node_id: NodeId,
        sender: broadcast::Sender<ExecutionEvent>,
    ) -> Self {
        Self {
            instance_id,
            node_id,
            sender,
        }
    }

    /// Emit a node-specific event
    pub fn emit(&self, event: NodeEvent) {
        let _ = self.sender.send(ExecutionEvent::NodeEvent {
            instance_id: self.instance_id,
            node_id: self.node_id,
            event,
            timestamp: Utc::now(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Info {
            message: message.into(),
        });
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Warning {
            message: message.into(),
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Error {
            message: message.into(),
        });
    }
}

/// In-process broadcast of execution events.
///
/// Sending never blocks and never fails the cascade: with no subscriber
/// the event is dropped.
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, instance_id: InstanceId, node_id: NodeId) -> EventEmitter {
        EventEmitter::new(instance_id, node_id, self.sender.clone())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
