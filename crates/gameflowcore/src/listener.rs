//! In-memory registry of tagged listener components.

use crate::services::{Dispatch, ExternalEvent, ListenerId, ListenerService, Subscriber};
use crate::tags::{MatchType, TagSet};
use crate::InstanceId;
use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use uuid::Uuid;

#[derive(Debug, Default)]
struct ListenerComponent {
    tags: TagSet,
    /// Nodes listening to this component's own notifications.
    audience: IndexSet<Subscriber>,
    received: Vec<TagSet>,
}

#[derive(Default)]
struct RegistryState {
    listeners: IndexMap<ListenerId, ListenerComponent>,
    subscribers: IndexSet<Subscriber>,
    pending: Vec<Dispatch>,
}

impl RegistryState {
    fn broadcast(&mut self, event: ExternalEvent) {
        for subscriber in &self.subscribers {
            self.pending.push(Dispatch {
                target: *subscriber,
                event: event.clone(),
            });
        }
    }
}

#[derive(Default)]
pub struct ListenerRegistry {
    state: Mutex<RegistryState>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }
}

impl ListenerService for ListenerRegistry {
    fn register_listener(&self, tags: TagSet) -> ListenerId {
        let id = Uuid::new_v4();
        let mut state = self.state.lock();
        state.listeners.insert(
            id,
            ListenerComponent {
                tags: tags.clone(),
                ..Default::default()
            },
        );
        state.broadcast(ExternalEvent::ListenerRegistered { listener: id, tags });
        tracing::debug!("Listener {} registered", id);
        id
    }

    fn unregister_listener(&self, listener: ListenerId) -> bool {
        let mut state = self.state.lock();
        match state.listeners.shift_remove(&listener) {
            Some(component) => {
                state.broadcast(ExternalEvent::ListenerUnregistered {
                    listener,
                    tags: component.tags,
                });
                tracing::debug!("Listener {} unregistered", listener);
                true
            }
            None => false,
        }
    }

    fn add_tag(&self, listener: ListenerId, tag: &str) -> bool {
        let mut state = self.state.lock();
        let Some(component) = state.listeners.get_mut(&listener) else {
            return false;
        };
        if !component.tags.insert(tag) {
            return false;
        }
        let tags = component.tags.clone();
        state.broadcast(ExternalEvent::TagAdded {
            listener,
            tag: tag.to_string(),
            tags,
        });
        true
    }

    fn remove_tag(&self, listener: ListenerId, tag: &str) -> bool {
        let mut state = self.state.lock();
        let Some(component) = state.listeners.get_mut(&listener) else {
            return false;
        };
        if !component.tags.remove(tag) {
            return false;
        }
        let tags = component.tags.clone();
        state.broadcast(ExternalEvent::TagRemoved {
            listener,
            tag: tag.to_string(),
            tags,
        });
        true
    }

    fn listener_tags(&self, listener: ListenerId) -> Option<TagSet> {
        self.state.lock().listeners.get(&listener).map(|c| c.tags.clone())
    }

    fn listeners_by_tags(&self, query: &TagSet, match_type: MatchType) -> Vec<ListenerId> {
        self.state
            .lock()
            .listeners
            .iter()
            .filter(|(_, component)| component.tags.matches(query, match_type, false))
            .map(|(id, _)| *id)
            .collect()
    }

    fn subscribe(&self, subscriber: Subscriber) {
        self.state.lock().subscribers.insert(subscriber);
    }

    fn unsubscribe(&self, subscriber: Subscriber) {
        let mut state = self.state.lock();
        state.subscribers.shift_remove(&subscriber);
        for component in state.listeners.values_mut() {
            component.audience.shift_remove(&subscriber);
        }
    }

    fn listen_to(&self, listener: ListenerId, subscriber: Subscriber) {
        if let Some(component) = self.state.lock().listeners.get_mut(&listener) {
            component.audience.insert(subscriber);
        }
    }

    fn stop_listening_to(&self, listener: ListenerId, subscriber: Subscriber) {
        if let Some(component) = self.state.lock().listeners.get_mut(&listener) {
            component.audience.shift_remove(&subscriber);
        }
    }

    fn notify_listeners(&self, query: &TagSet, match_type: MatchType) -> Vec<ListenerId> {
        let mut state = self.state.lock();
        let mut reached = Vec::new();
        for (id, component) in state.listeners.iter_mut() {
            if component.tags.matches(query, match_type, false) {
                component.received.push(query.clone());
                reached.push(*id);
            }
        }
        reached
    }

    fn notify_from_listener(&self, listener: ListenerId) -> bool {
        let mut state = self.state.lock();
        let Some(component) = state.listeners.get(&listener) else {
            return false;
        };
        let tags = component.tags.clone();
        let audience: Vec<Subscriber> = component.audience.iter().copied().collect();
        for subscriber in audience {
            state.pending.push(Dispatch {
                target: subscriber,
                event: ExternalEvent::ListenerNotified {
                    listener,
                    tags: tags.clone(),
                },
            });
        }
        true
    }

    fn take_received(&self, listener: ListenerId) -> Vec<TagSet> {
        self.state
            .lock()
            .listeners
            .get_mut(&listener)
            .map(|component| std::mem::take(&mut component.received))
            .unwrap_or_default()
    }

    fn release_instance(&self, instance: InstanceId) {
        let mut state = self.state.lock();
        state.subscribers.retain(|s| s.instance != instance);
        for component in state.listeners.values_mut() {
            component.audience.retain(|s| s.instance != instance);
        }
        state.pending.retain(|d| d.target.instance != instance);
    }

    fn drain_dispatches(&self) -> Vec<Dispatch> {
        std::mem::take(&mut self.state.lock().pending)
    }
}
