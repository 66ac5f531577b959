use crate::runtime::DEFAULT_MAX_CASCADE_DEPTH;
use chrono::Utc;
use gameflowcore::{
    AssetId, Dispatch, ExecutionEvent, ExternalEvent, FinishReason, FlowAsset, FlowError,
    FlowServices, InstanceId, NodeAction, NodeContext, NodeId, Result,
};
use indexmap::IndexSet;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Lifecycle of one run of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InstanceState {
    /// Created, never executed.
    Idle,
    Running,
    Finished,
}

/// Finish notification, delivered once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowFinished {
    pub instance_id: InstanceId,
    pub template_id: AssetId,
    pub reason: FinishReason,
}

type FinishHandler = Box<dyn FnMut(&FlowFinished) + Send + Sync>;

/// A running copy of a flow asset.
///
/// Execution is synchronous and depth first: `execute` returns once every
/// branch it started has either reached a latent node, stalled on an
/// unconnected output or terminated the instance. Latent nodes resume
/// through [`FlowInstance::dispatch_event`].
pub struct FlowInstance {
    id: InstanceId,
    template: Arc<FlowAsset>,
    asset: FlowAsset,
    remap: HashMap<NodeId, NodeId>,
    active: IndexSet<NodeId>,
    state: InstanceState,
    services: FlowServices,
    finish_handlers: Vec<FinishHandler>,
    finish_reason: Option<FinishReason>,
    depth: usize,
    max_depth: usize,
}

impl FlowInstance {
    /// Deep copy `template` into a new instance bound to `services`.
    pub fn new(template: Arc<FlowAsset>, services: FlowServices) -> Self {
        let (asset, remap) = template.deep_clone();
        tracing::debug!("Created instance {} of '{}'", asset.id(), template.name());
        Self {
            id: asset.id(),
            template,
            asset,
            remap,
            active: IndexSet::new(),
            state: InstanceState::Idle,
            services,
            finish_handlers: Vec::new(),
            finish_reason: None,
            depth: 0,
            max_depth: DEFAULT_MAX_CASCADE_DEPTH,
        }
    }

    pub fn with_max_cascade_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn template(&self) -> &Arc<FlowAsset> {
        &self.template
    }

    pub fn template_id(&self) -> AssetId {
        self.template.template_id()
    }

    /// The instance's own copy of the graph.
    pub fn asset(&self) -> &FlowAsset {
        &self.asset
    }

    pub fn services(&self) -> &FlowServices {
        &self.services
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == InstanceState::Running
    }

    pub fn is_finished(&self) -> bool {
        self.state == InstanceState::Finished
    }

    /// Why the last run ended.
    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.finish_reason.as_ref()
    }

    pub fn take_finish_reason(&mut self) -> Option<FinishReason> {
        self.finish_reason.take()
    }

    /// Map a template node id to this instance's copy of it.
    pub fn node_for_template(&self, template_node: NodeId) -> Option<NodeId> {
        self.remap.get(&template_node).copied()
    }

    pub fn active_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.active.iter().copied()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, node: NodeId) -> bool {
        self.active.contains(&node)
    }

    /// Debug lines for every active node that reports any.
    pub fn debug_info(&self) -> Vec<(NodeId, String)> {
        self.active
            .iter()
            .filter_map(|id| {
                let entry = self.asset.node(*id)?;
                let info = entry.behavior().debug_info()?;
                Some((*id, format!("{}: {}", entry.type_name(), info)))
            })
            .collect()
    }

    pub fn on_finish(&mut self, handler: impl FnMut(&FlowFinished) + Send + Sync + 'static) {
        self.finish_handlers.push(Box::new(handler));
    }

    /// Trigger the Input node registered under `entry`.
    ///
    /// Executing a finished instance starts a new run.
    pub fn execute(&mut self, entry: &str) -> Result<()> {
        let node = self
            .asset
            .entry_point(entry)
            .ok_or_else(|| FlowError::UnknownEntryPoint(entry.to_string()))?;

        if self.state != InstanceState::Running {
            self.state = InstanceState::Running;
            self.finish_reason = None;
            tracing::info!(
                "Starting instance {} of '{}' at '{}'",
                self.id,
                self.template.name(),
                entry
            );
            self.services.events.emit(ExecutionEvent::InstanceStarted {
                instance_id: self.id,
                template_id: self.template_id(),
                entry_point: entry.to_string(),
                timestamp: Utc::now(),
            });
        }

        self.add_active_node(node);
        self.run_node(node, entry);
        Ok(())
    }

    /// Mark a node active. Returns false for unknown or already active nodes.
    pub fn add_active_node(&mut self, node: NodeId) -> bool {
        if !self.asset.contains_node(node) {
            return false;
        }
        let added = self.active.insert(node);
        if added {
            tracing::trace!("Node {} active in {}", node, self.id);
        }
        added
    }

    /// Remove a node from the active set and run its finish hook.
    pub fn remove_active_node(&mut self, node: NodeId) -> bool {
        if !self.active.shift_remove(&node) {
            return false;
        }
        self.run_finish_hook(node);
        true
    }

    /// Stop the run as if an unregistered Output node was reached.
    pub fn terminate_execution(&mut self) {
        self.finish_run(FinishReason::Terminated);
    }

    /// Stop a run from outside. Active nodes get their finish hook and the
    /// instance's timers and listener subscriptions are released.
    pub fn cancel(&mut self) {
        self.finish_run(FinishReason::Cancelled);
    }

    /// Deliver a service callback.
    ///
    /// Dispatches addressed to this instance are consumed even when the
    /// target is no longer active. Others are offered to active nodes that
    /// host nested instances.
    pub fn dispatch_event(&mut self, dispatch: &Dispatch) -> bool {
        let target = dispatch.target;
        if target.instance == self.id {
            if self.is_running() && self.active.contains(&target.node) {
                self.deliver(target.node, &dispatch.event);
            } else {
                tracing::debug!(
                    "Dropping {:?} for inactive node {} in {}",
                    dispatch.event,
                    target.node,
                    self.id
                );
            }
            return true;
        }

        if !self.is_running() {
            return false;
        }
        let candidates: Vec<NodeId> = self.active.iter().copied().collect();
        for node in candidates {
            if !self.is_running() || !self.active.contains(&node) {
                continue;
            }
            let Some(entry) = self.asset.node_mut(node) else {
                continue;
            };
            let (pins, behavior) = entry.split_mut();
            let mut ctx = NodeContext::new(self.id, node, pins, &self.services);
            if behavior.forward_event(dispatch, &mut ctx) {
                let actions = ctx.into_actions();
                self.apply_nested(node, actions);
                return true;
            }
        }
        false
    }

    fn run_node(&mut self, node: NodeId, pin: &str) {
        if !self.is_running() {
            return;
        }
        if self.depth >= self.max_depth {
            tracing::error!(
                "Cascade depth {} exceeded at node {} in {}",
                self.max_depth,
                node,
                self.id
            );
            self.finish_run(FinishReason::Failed {
                message: format!("cascade depth {} exceeded", self.max_depth),
            });
            return;
        }
        let Some(type_name) = self.asset.node(node).map(|e| e.type_name().to_string()) else {
            return;
        };
        tracing::debug!("Executing {} ({}) on pin '{}'", node, type_name, pin);
        self.services.events.emit(ExecutionEvent::NodeActivated {
            instance_id: self.id,
            node_id: node,
            node_type: type_name,
            pin: pin.to_string(),
            timestamp: Utc::now(),
        });

        let Some(entry) = self.asset.node_mut(node) else {
            return;
        };
        let (pins, behavior) = entry.split_mut();
        let mut ctx = NodeContext::new(self.id, node, pins, &self.services);
        behavior.execute(pin, &mut ctx);
        let actions = ctx.into_actions();
        self.apply_nested(node, actions);
    }

    fn deliver(&mut self, node: NodeId, event: &ExternalEvent) {
        let Some(entry) = self.asset.node_mut(node) else {
            return;
        };
        let (pins, behavior) = entry.split_mut();
        let mut ctx = NodeContext::new(self.id, node, pins, &self.services);
        behavior.on_event(event, &mut ctx);
        let actions = ctx.into_actions();
        self.apply_nested(node, actions);
    }

    fn apply_nested(&mut self, node: NodeId, actions: Vec<NodeAction>) {
        self.depth += 1;
        self.apply_actions(node, actions);
        self.depth -= 1;
    }

    /// Apply a node's requests in order. Once the run is over the rest is dropped.
    fn apply_actions(&mut self, node: NodeId, actions: Vec<NodeAction>) {
        for action in actions {
            if !self.is_running() {
                break;
            }
            match action {
                NodeAction::Finish { output, terminate } => {
                    self.finish_node(node, output.as_deref(), terminate)
                }
                NodeAction::TerminateExecution => {
                    let reason = match self.asset.exit_name(node) {
                        Some(name) => FinishReason::Exit {
                            name: name.to_string(),
                        },
                        None => FinishReason::Terminated,
                    };
                    self.finish_run(reason);
                }
                NodeAction::Fail(message) => self.finish_run(FinishReason::Failed { message }),
            }
        }
    }

    fn finish_node(&mut self, node: NodeId, output: Option<&str>, terminate: bool) {
        let next = output.and_then(|pin| {
            let link = self.asset.node(node)?.pins().output_link(pin).cloned();
            if link.is_none() {
                tracing::trace!("Output '{}' of {} is not connected", pin, node);
            }
            link
        });

        if terminate {
            self.remove_active_node(node);
        }
        if let Some(link) = next {
            if self.is_running() {
                self.add_active_node(link.node);
                self.run_node(link.node, &link.pin);
            }
        }
    }

    fn run_finish_hook(&mut self, node: NodeId) {
        if let Some(entry) = self.asset.node_mut(node) {
            let (pins, behavior) = entry.split_mut();
            let mut ctx = NodeContext::new(self.id, node, pins, &self.services);
            behavior.on_finish_execute(&mut ctx);
            if !ctx.actions().is_empty() {
                tracing::debug!("Ignoring actions requested by finish hook of {}", node);
            }
        }
        self.services.events.emit(ExecutionEvent::NodeFinished {
            instance_id: self.id,
            node_id: node,
            timestamp: Utc::now(),
        });
    }

    fn finish_run(&mut self, reason: FinishReason) {
        if !self.is_running() {
            return;
        }
        self.state = InstanceState::Finished;

        let remaining: Vec<NodeId> = self.active.drain(..).collect();
        for node in remaining {
            self.run_finish_hook(node);
        }
        self.services.release_instance(self.id);

        match &reason {
            FinishReason::Failed { message } => {
                tracing::error!("Instance {} failed: {}", self.id, message)
            }
            FinishReason::Cancelled => tracing::warn!("Instance {} cancelled", self.id),
            _ => tracing::info!("Instance {} finished: {:?}", self.id, reason),
        }
        self.services.events.emit(ExecutionEvent::InstanceFinished {
            instance_id: self.id,
            reason: reason.clone(),
            timestamp: Utc::now(),
        });

        let finished = FlowFinished {
            instance_id: self.id,
            template_id: self.template_id(),
            reason: reason.clone(),
        };
        self.finish_reason = Some(reason);
        for handler in self.finish_handlers.iter_mut() {
            handler(&finished);
        }
    }
}

impl std::fmt::Debug for FlowInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowInstance")
            .field("id", &self.id)
            .field("template", &self.template.name())
            .field("state", &self.state)
            .field("active", &self.active)
            .finish()
    }
}
