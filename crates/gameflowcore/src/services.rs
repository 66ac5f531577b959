//! Engine services consumed by latent nodes.
//!
//! Services never call back into a graph directly. They queue [`Dispatch`]
//! records which the owner of the instances (the subsystem) delivers after
//! the current cascade has returned, so external triggers are always
//! serialized.

use crate::{EventBus, InstanceId, ListenerRegistry, NodeId, TagSet, TimerManager};
use crate::tags::MatchType;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub type ListenerId = Uuid;

/// Handle to a timer owned by the [`TimerService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerHandle(pub u64);

/// The node a service delivers callbacks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscriber {
    pub instance: InstanceId,
    pub node: NodeId,
}

impl Subscriber {
    pub fn new(instance: InstanceId, node: NodeId) -> Self {
        Self { instance, node }
    }
}

/// Callback payloads delivered to latent nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalEvent {
    TimerFired(TimerHandle),
    ListenerRegistered { listener: ListenerId, tags: TagSet },
    ListenerUnregistered { listener: ListenerId, tags: TagSet },
    TagAdded { listener: ListenerId, tag: String, tags: TagSet },
    TagRemoved { listener: ListenerId, tag: String, tags: TagSet },
    /// A listener component a node listens to sent a notification.
    ListenerNotified { listener: ListenerId, tags: TagSet },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub target: Subscriber,
    pub event: ExternalEvent,
}

/// Scheduled callbacks for latent nodes.
pub trait TimerService: Send + Sync {
    fn set_timer(&self, owner: Subscriber, duration: Duration, repeating: bool) -> TimerHandle;

    fn pause_timer(&self, handle: TimerHandle);

    fn unpause_timer(&self, handle: TimerHandle);

    fn clear_timer(&self, handle: TimerHandle);

    /// Set, not paused, not yet expired.
    fn is_timer_active(&self, handle: TimerHandle) -> bool;

    fn is_timer_paused(&self, handle: TimerHandle) -> bool;

    /// Time accumulated towards the next expiry.
    fn elapsed(&self, handle: TimerHandle) -> Option<Duration>;

    /// Drop every timer owned by an instance.
    fn clear_instance(&self, instance: InstanceId);

    /// Advance the clock and return the expiries, oldest first.
    fn advance(&self, delta: Duration) -> Vec<Dispatch>;
}

/// Registry of tagged listener components.
pub trait ListenerService: Send + Sync {
    fn register_listener(&self, tags: TagSet) -> ListenerId;

    fn unregister_listener(&self, listener: ListenerId) -> bool;

    fn add_tag(&self, listener: ListenerId, tag: &str) -> bool;

    fn remove_tag(&self, listener: ListenerId, tag: &str) -> bool;

    fn listener_tags(&self, listener: ListenerId) -> Option<TagSet>;

    fn listeners_by_tags(&self, query: &TagSet, match_type: MatchType) -> Vec<ListenerId>;

    /// Receive registration and tag-change notifications.
    fn subscribe(&self, subscriber: Subscriber);

    /// Drop every subscription held by `subscriber`, including per-listener ones.
    fn unsubscribe(&self, subscriber: Subscriber);

    /// Receive the notifications a single listener component sends.
    fn listen_to(&self, listener: ListenerId, subscriber: Subscriber);

    fn stop_listening_to(&self, listener: ListenerId, subscriber: Subscriber);

    /// Graph → components. Returns the listeners reached.
    fn notify_listeners(&self, query: &TagSet, match_type: MatchType) -> Vec<ListenerId>;

    /// Component → graph: fan out to nodes listening to `listener`.
    fn notify_from_listener(&self, listener: ListenerId) -> bool;

    /// Notifications a component received from graphs, oldest first.
    fn take_received(&self, listener: ListenerId) -> Vec<TagSet>;

    fn release_instance(&self, instance: InstanceId);

    fn drain_dispatches(&self) -> Vec<Dispatch>;
}

/// Services shared by every instance of one world.
#[derive(Clone)]
pub struct FlowServices {
    pub timers: Arc<dyn TimerService>,
    pub listeners: Arc<dyn ListenerService>,
    pub events: Arc<EventBus>,
}

impl FlowServices {
    pub fn new(event_buffer_size: usize) -> Self {
        Self {
            timers: Arc::new(TimerManager::new()),
            listeners: Arc::new(ListenerRegistry::new()),
            events: Arc::new(EventBus::new(event_buffer_size)),
        }
    }

    pub fn with_timers(mut self, timers: Arc<dyn TimerService>) -> Self {
        self.timers = timers;
        self
    }

    pub fn with_listeners(mut self, listeners: Arc<dyn ListenerService>) -> Self {
        self.listeners = listeners;
        self
    }

    /// Release everything an instance still holds.
    pub fn release_instance(&self, instance: InstanceId) {
        self.timers.clear_instance(instance);
        self.listeners.release_instance(instance);
    }
}

impl Default for FlowServices {
    fn default() -> Self {
        Self::new(1024)
    }
}
