use crate::events::EventEmitter;
use crate::services::{Dispatch, ExternalEvent, FlowServices, ListenerService, Subscriber, TimerService};
use crate::{Config, FlowAsset, InstanceId, NodePins, PinDirection, PinLayout};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use uuid::Uuid;

pub type NodeId = Uuid;

/// Editor grouping of node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NodeCategory {
    #[default]
    Default,
    Input,
    Output,
    Conditional,
    Debug,
    Latent,
    Event,
}

/// Upcast helper so callers can downcast a `dyn FlowNode` to its concrete kind.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Core trait that every executable node implements.
///
/// A node never drives its successors itself. It records what should happen
/// next on the [`NodeContext`] (`finish_execute`, `trigger_output`,
/// `terminate_execution`) and the owning instance applies those actions, in
/// order, once the call returns.
pub trait FlowNode: AsAny + Send + Sync {
    /// Unique type identifier (e.g., "logic.and", "time.timer")
    fn node_type(&self) -> &str;

    fn category(&self) -> NodeCategory {
        NodeCategory::Default
    }

    /// Pins a freshly created node of this kind carries.
    fn default_pins(&self) -> PinLayout {
        PinLayout::new(["In"], ["Out"])
    }

    /// Called when `pin` received an execution signal.
    fn execute(&mut self, _pin: &str, ctx: &mut NodeContext<'_>) {
        match ctx.pins().default_output().map(str::to_string) {
            Some(output) => ctx.finish_execute(output, true),
            None => ctx.finish(true),
        }
    }

    /// Runs when the node leaves the active set, including forced termination.
    fn on_finish_execute(&mut self, _ctx: &mut NodeContext<'_>) {}

    /// Callback from an engine service this node subscribed to.
    fn on_event(&mut self, _event: &ExternalEvent, _ctx: &mut NodeContext<'_>) {}

    /// Offer a dispatch addressed to a nested instance. Returns true when consumed.
    fn forward_event(&mut self, _dispatch: &Dispatch, _ctx: &mut NodeContext<'_>) -> bool {
        false
    }

    /// The pin set changed (pin added, removed, renamed or regenerated).
    fn sync_pins(&mut self, _pins: &NodePins) {}

    fn generate_pin_name(&self, direction: PinDirection, pins: &NodePins) -> String {
        let prefix = match direction {
            PinDirection::Input => "NewInputPin",
            PinDirection::Output => "NewOutputPin",
        };
        let mut index = pins.names(direction).len();
        loop {
            let candidate = format!("{prefix}{index}");
            if !pins.has_pin(direction, &candidate) {
                return candidate;
            }
            index += 1;
        }
    }

    /// Configuration this node was built from, written back on export.
    fn config(&self) -> Config {
        Config::new()
    }

    /// Fresh copy for a new instance. Runtime state is not carried over.
    fn clone_node(&self) -> Box<dyn FlowNode>;

    /// Joins and latent nodes end a synchronous cascade.
    fn breaks_cascade(&self) -> bool {
        false
    }

    fn is_subgraph(&self) -> bool {
        false
    }

    /// Name of the asset a subgraph node wants bound.
    fn asset_reference(&self) -> Option<&str> {
        None
    }

    fn nested_asset(&self) -> Option<&Arc<FlowAsset>> {
        None
    }

    fn bind_nested_asset(&mut self, _template: Arc<FlowAsset>) {}

    fn debug_info(&self) -> Option<String> {
        None
    }
}

impl dyn FlowNode {
    pub fn downcast_ref<T: FlowNode>(&self) -> Option<&T> {
        AsAny::as_any(self).downcast_ref::<T>()
    }

    pub fn downcast_mut<T: FlowNode>(&mut self) -> Option<&mut T> {
        AsAny::as_any_mut(self).downcast_mut::<T>()
    }
}

/// What a node asked for during one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeAction {
    /// Leave through `output` (if any); `terminate` removes the node from the
    /// active set before the successor runs.
    Finish { output: Option<String>, terminate: bool },
    /// Stop the whole owning instance.
    TerminateExecution,
    /// Stop the owning instance and report a failure.
    Fail(String),
}

/// Execution context passed to a node for the duration of one call
pub struct NodeContext<'a> {
    instance_id: InstanceId,
    node_id: NodeId,
    pins: &'a NodePins,
    services: &'a FlowServices,
    actions: Vec<NodeAction>,
}

impl<'a> NodeContext<'a> {
    pub fn new(
        instance_id: InstanceId,
        node_id: NodeId,
        pins: &'a NodePins,
        services: &'a FlowServices,
    ) -> Self {
        Self {
            instance_id,
            node_id,
            pins,
            services,
            actions: Vec::new(),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// Address services deliver this node's callbacks to.
    pub fn subscriber(&self) -> Subscriber {
        Subscriber::new(self.instance_id, self.node_id)
    }

    pub fn pins(&self) -> &NodePins {
        self.pins
    }

    pub fn services(&self) -> &FlowServices {
        self.services
    }

    pub fn timers(&self) -> &dyn TimerService {
        self.services.timers.as_ref()
    }

    pub fn listeners(&self) -> &dyn ListenerService {
        self.services.listeners.as_ref()
    }

    pub fn emitter(&self) -> EventEmitter {
        self.services.events.create_emitter(self.instance_id, self.node_id)
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emitter().info(message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emitter().warn(message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emitter().error(message);
    }

    pub fn finish_execute(&mut self, output: impl Into<String>, terminate: bool) {
        self.actions.push(NodeAction::Finish {
            output: Some(output.into()),
            terminate,
        });
    }

    /// Fire an output and stay active.
    pub fn trigger_output(&mut self, output: impl Into<String>) {
        self.finish_execute(output, false);
    }

    /// Finish without leaving through any output.
    pub fn finish(&mut self, terminate: bool) {
        self.actions.push(NodeAction::Finish {
            output: None,
            terminate,
        });
    }

    pub fn terminate_execution(&mut self) {
        self.actions.push(NodeAction::TerminateExecution);
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.actions.push(NodeAction::Fail(message.into()));
    }

    pub fn actions(&self) -> &[NodeAction] {
        &self.actions
    }

    pub fn into_actions(self) -> Vec<NodeAction> {
        self.actions
    }
}
