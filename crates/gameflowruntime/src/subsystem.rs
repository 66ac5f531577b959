use crate::executor::{FlowFinished, FlowInstance};
use crate::runtime::RuntimeConfig;
use gameflowcore::{
    AssetId, Dispatch, ExecutionEvent, FlowAsset, FlowError, FlowServices, InstanceId,
    ListenerId, MatchType, Result, TagSet,
};
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Owns the running instances of one world and routes service callbacks
/// to them.
///
/// Every call that can trigger graph execution delivers the callbacks it
/// caused before returning, then drops instances that finished.
pub struct FlowSubsystem {
    config: RuntimeConfig,
    services: FlowServices,
    instances: IndexMap<InstanceId, FlowInstance>,
    finished: Vec<FlowFinished>,
}

impl FlowSubsystem {
    pub fn new(config: RuntimeConfig) -> Self {
        let services = FlowServices::new(config.event_buffer_size);
        Self::with_services(config, services)
    }

    pub fn with_services(config: RuntimeConfig, services: FlowServices) -> Self {
        Self {
            config,
            services,
            instances: IndexMap::new(),
            finished: Vec::new(),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn services(&self) -> &FlowServices {
        &self.services
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.services.events.subscribe()
    }

    /// Create an instance of `template`, or return the running one when the
    /// template is a singleton.
    pub fn register_instance(&mut self, template: &Arc<FlowAsset>) -> InstanceId {
        if template.is_singleton() {
            if let Some(existing) = self.running_flow_by_template(template.template_id()) {
                tracing::warn!(
                    "'{}' is a singleton and already running as {}",
                    template.name(),
                    existing
                );
                return existing;
            }
        }

        let instance = FlowInstance::new(template.clone(), self.services.clone())
            .with_max_cascade_depth(self.config.max_cascade_depth);
        let id = instance.id();
        tracing::info!("Registered instance {} of '{}'", id, template.name());
        self.instances.insert(id, instance);
        id
    }

    /// Drop an instance. A running one is cancelled first.
    pub fn unregister_instance(&mut self, id: InstanceId) -> bool {
        let Some(mut instance) = self.instances.shift_remove(&id) else {
            return false;
        };
        if instance.is_running() {
            instance.cancel();
        }
        self.record_finished(&mut instance);
        tracing::info!("Unregistered instance {}", id);
        true
    }

    /// Register (or reuse) an instance of `template` and trigger `entry`.
    pub fn execute(&mut self, template: &Arc<FlowAsset>, entry: &str) -> Result<InstanceId> {
        let id = self.register_instance(template);
        let result = match self.instances.get_mut(&id) {
            Some(instance) => instance.execute(entry),
            None => Err(FlowError::Execution(format!("instance {} vanished", id))),
        };
        if result.is_err() && self.instances.get(&id).is_some_and(|i| !i.is_running()) {
            self.instances.shift_remove(&id);
        }
        result?;
        self.settle();
        Ok(id)
    }

    /// Trigger another entry point on a registered instance.
    pub fn execute_instance(&mut self, id: InstanceId, entry: &str) -> Result<()> {
        let instance = self
            .instances
            .get_mut(&id)
            .ok_or_else(|| FlowError::Execution(format!("no instance {}", id)))?;
        instance.execute(entry)?;
        self.settle();
        Ok(())
    }

    pub fn instance(&self, id: InstanceId) -> Option<&FlowInstance> {
        self.instances.get(&id)
    }

    pub fn instance_mut(&mut self, id: InstanceId) -> Option<&mut FlowInstance> {
        self.instances.get_mut(&id)
    }

    /// Registered instances, oldest first.
    pub fn running_flows(&self) -> Vec<InstanceId> {
        self.instances.keys().copied().collect()
    }

    pub fn running_flow_by_template(&self, template: AssetId) -> Option<InstanceId> {
        self.instances
            .values()
            .find(|instance| instance.template_id() == template)
            .map(FlowInstance::id)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Finish notifications collected since the last call.
    pub fn take_finished(&mut self) -> Vec<FlowFinished> {
        std::mem::take(&mut self.finished)
    }

    /// Advance the timer clock and deliver what fired.
    pub fn tick(&mut self, delta: Duration) -> usize {
        let fired = self.services.timers.advance(delta);
        let count = fired.len();
        for dispatch in &fired {
            self.deliver(dispatch);
        }
        count + self.settle()
    }

    /// Cancel everything still running.
    pub fn shutdown(&mut self) {
        let ids: Vec<InstanceId> = self.instances.keys().copied().collect();
        for id in ids {
            self.unregister_instance(id);
        }
    }

    // ---- listener components ----

    pub fn register_listener(&mut self, tags: TagSet) -> ListenerId {
        let id = self.services.listeners.register_listener(tags);
        self.settle();
        id
    }

    pub fn unregister_listener(&mut self, listener: ListenerId) -> bool {
        let removed = self.services.listeners.unregister_listener(listener);
        self.settle();
        removed
    }

    pub fn add_listener_tag(&mut self, listener: ListenerId, tag: &str) -> bool {
        let added = self.services.listeners.add_tag(listener, tag);
        self.settle();
        added
    }

    pub fn remove_listener_tag(&mut self, listener: ListenerId, tag: &str) -> bool {
        let removed = self.services.listeners.remove_tag(listener, tag);
        self.settle();
        removed
    }

    /// A listener component signals the graphs listening to it.
    pub fn notify_from_listener(&mut self, listener: ListenerId) -> bool {
        let known = self.services.listeners.notify_from_listener(listener);
        self.settle();
        known
    }

    /// Send a tagged notification to matching listener components.
    pub fn notify_listeners(&mut self, tags: &TagSet, match_type: MatchType) -> Vec<ListenerId> {
        self.services.listeners.notify_listeners(tags, match_type)
    }

    /// Notifications a listener component received from graphs.
    pub fn take_received(&self, listener: ListenerId) -> Vec<TagSet> {
        self.services.listeners.take_received(listener)
    }

    /// Deliver queued listener callbacks and reap finished instances.
    /// Returns the number of callbacks delivered.
    pub fn pump(&mut self) -> usize {
        self.settle()
    }

    fn settle(&mut self) -> usize {
        let mut delivered = 0;
        for _ in 0..self.config.max_dispatch_rounds.max(1) {
            let batch = self.services.listeners.drain_dispatches();
            if batch.is_empty() {
                self.reap();
                return delivered;
            }
            for dispatch in &batch {
                self.deliver(dispatch);
            }
            delivered += batch.len();
        }
        tracing::warn!(
            "Listener callbacks still pending after {} rounds",
            self.config.max_dispatch_rounds
        );
        self.reap();
        delivered
    }

    fn deliver(&mut self, dispatch: &Dispatch) -> bool {
        if let Some(instance) = self.instances.get_mut(&dispatch.target.instance) {
            return instance.dispatch_event(dispatch);
        }
        // Nested instances live inside subgraph nodes.
        for instance in self.instances.values_mut() {
            if instance.dispatch_event(dispatch) {
                return true;
            }
        }
        tracing::debug!("No instance accepted {:?}", dispatch);
        false
    }

    fn reap(&mut self) {
        let done: Vec<InstanceId> = self
            .instances
            .values()
            .filter(|instance| instance.is_finished())
            .map(FlowInstance::id)
            .collect();
        for id in done {
            if let Some(mut instance) = self.instances.shift_remove(&id) {
                self.record_finished(&mut instance);
                tracing::debug!("Reaped finished instance {}", id);
            }
        }
    }

    fn record_finished(&mut self, instance: &mut FlowInstance) {
        if let Some(reason) = instance.take_finish_reason() {
            self.finished.push(FlowFinished {
                instance_id: instance.id(),
                template_id: instance.template_id(),
                reason,
            });
        }
    }
}

impl Drop for FlowSubsystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}
