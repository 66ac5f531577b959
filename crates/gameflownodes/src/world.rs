//! Nodes that talk to the world's tagged listener components.

use gameflowcore::{
    Config, ExternalEvent, FlowNode, GraphError, ListenerId, MatchType, NodeCategory,
    NodeContext, PinLayout, TagSet, Value,
};
use gameflowruntime::{NodeFactory, NodeMetadata, PortDefinition};
use indexmap::IndexSet;

pub const ON_LISTENER_REGISTERED_TYPE: &str = "world.on_listener_registered";
pub const ON_LISTENER_UNREGISTERED_TYPE: &str = "world.on_listener_unregistered";
pub const ON_LISTENER_NOTIFY_TYPE: &str = "world.on_listener_notify";
pub const NOTIFY_LISTENERS_TYPE: &str = "world.notify_listeners";

const TRIGGER_EVENT: &str = "Trigger Event";

/// Which listener event a [`ListenerEventNode`] reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerTrigger {
    /// A matching component appeared, or gained the tags to match.
    Registered,
    /// A matching component went away, or lost the tags to match.
    Unregistered,
    /// A matching component sent a notification to the graph.
    Notified,
}

impl ListenerTrigger {
    pub fn node_type(&self) -> &'static str {
        match self {
            ListenerTrigger::Registered => ON_LISTENER_REGISTERED_TYPE,
            ListenerTrigger::Unregistered => ON_LISTENER_UNREGISTERED_TYPE,
            ListenerTrigger::Notified => ON_LISTENER_NOTIFY_TYPE,
        }
    }
}

/// Query shared by listener nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListenerQuery {
    pub tags: TagSet,
    pub match_type: MatchType,
    pub exact: bool,
}

impl ListenerQuery {
    pub fn matches(&self, tags: &TagSet) -> bool {
        tags.matches(&self.tags, self.match_type, self.exact)
    }

    fn from_config(config: &Config) -> Result<Self, GraphError> {
        let tags = match config.get("listener_tags") {
            None | Some(Value::Null) => TagSet::new(),
            Some(Value::String(tag)) => std::iter::once(tag.clone()).collect(),
            Some(value @ Value::Array(_)) => value.as_string_list().unwrap_or_default().into_iter().collect(),
            Some(_) => {
                return Err(GraphError::Configuration(
                    "'listener_tags' must be a tag or a list of tags".to_string(),
                ))
            }
        };
        let match_type = match config.get("match_type").and_then(Value::as_str) {
            None | Some("All") => MatchType::All,
            Some("Any") => MatchType::Any,
            Some(other) => {
                return Err(GraphError::Configuration(format!(
                    "unknown match_type '{}' (expected All or Any)",
                    other
                )))
            }
        };
        let exact = config.get("exact").and_then(Value::as_bool).unwrap_or(false);
        Ok(Self {
            tags,
            match_type,
            exact,
        })
    }

    fn to_config(&self, config: &mut Config) {
        let tags: Vec<Value> = self.tags.iter().map(Value::from).collect();
        config.insert("listener_tags".to_string(), Value::from(tags));
        let match_type = match self.match_type {
            MatchType::All => "All",
            MatchType::Any => "Any",
        };
        config.insert("match_type".to_string(), Value::from(match_type));
        config.insert("exact".to_string(), Value::from(self.exact));
    }
}

/// Waits for listener events matching a tag query.
///
/// Every match fires `Trigger Event`. With a non-zero `limit` the node
/// fires `Completed` and leaves once that many matches were seen.
#[derive(Debug, Clone)]
pub struct ListenerEventNode {
    trigger: ListenerTrigger,
    query: ListenerQuery,
    limit: u32,
    count: u32,
    listening: bool,
    watched: IndexSet<ListenerId>,
}

impl ListenerEventNode {
    pub fn new(trigger: ListenerTrigger, query: ListenerQuery, limit: u32) -> Self {
        Self {
            trigger,
            query,
            limit,
            count: 0,
            listening: false,
            watched: IndexSet::new(),
        }
    }

    pub fn trigger(&self) -> ListenerTrigger {
        self.trigger
    }

    pub fn trigger_count(&self) -> u32 {
        self.count
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    fn start(&mut self, ctx: &mut NodeContext<'_>) {
        self.count = 0;
        if !self.listening {
            ctx.listeners().subscribe(ctx.subscriber());
            self.listening = true;
        }

        let existing: Vec<ListenerId> = ctx
            .listeners()
            .listeners_by_tags(&self.query.tags, self.query.match_type)
            .into_iter()
            .filter(|id| {
                ctx.listeners()
                    .listener_tags(*id)
                    .is_some_and(|tags| self.query.matches(&tags))
            })
            .collect();
        tracing::debug!(
            "{} node {} listening; {} matching listeners present",
            self.trigger.node_type(),
            ctx.node_id(),
            existing.len()
        );

        for listener in existing {
            match self.trigger {
                ListenerTrigger::Registered => {
                    if self.fire(ctx) {
                        return;
                    }
                }
                ListenerTrigger::Notified => self.watch(listener, ctx),
                ListenerTrigger::Unregistered => {}
            }
        }
    }

    fn watch(&mut self, listener: ListenerId, ctx: &NodeContext<'_>) {
        if self.watched.insert(listener) {
            ctx.listeners().listen_to(listener, ctx.subscriber());
        }
    }

    fn forget(&mut self, listener: ListenerId, ctx: &NodeContext<'_>) {
        if self.watched.shift_remove(&listener) {
            ctx.listeners().stop_listening_to(listener, ctx.subscriber());
        }
    }

    /// Count a match. Returns true once the limit was reached.
    fn fire(&mut self, ctx: &mut NodeContext<'_>) -> bool {
        self.count += 1;
        ctx.trigger_output(TRIGGER_EVENT);
        if self.limit > 0 && self.count >= self.limit {
            ctx.finish_execute("Completed", true);
            self.listening = false;
            return true;
        }
        false
    }

    fn reset(&mut self, ctx: &NodeContext<'_>) {
        // Reaching the limit stops listening before the finish hook runs.
        ctx.listeners().unsubscribe(ctx.subscriber());
        self.listening = false;
        self.watched.clear();
        self.count = 0;
    }
}

impl FlowNode for ListenerEventNode {
    fn node_type(&self) -> &str {
        self.trigger.node_type()
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Event
    }

    fn default_pins(&self) -> PinLayout {
        PinLayout::new(["Start", "Stop"], [TRIGGER_EVENT, "Completed", "Stopped"])
    }

    fn execute(&mut self, pin: &str, ctx: &mut NodeContext<'_>) {
        match pin {
            "Start" => self.start(ctx),
            "Stop" => ctx.finish_execute("Stopped", true),
            other => {
                tracing::warn!("Listener node {} has no input '{}'", ctx.node_id(), other);
            }
        }
    }

    fn on_event(&mut self, event: &ExternalEvent, ctx: &mut NodeContext<'_>) {
        if !self.listening {
            return;
        }
        match (self.trigger, event) {
            (ListenerTrigger::Registered, ExternalEvent::ListenerRegistered { tags, .. })
            | (ListenerTrigger::Unregistered, ExternalEvent::ListenerUnregistered { tags, .. }) => {
                if self.query.matches(tags) {
                    self.fire(ctx);
                }
            }
            (ListenerTrigger::Registered, ExternalEvent::TagAdded { tag, tags, .. }) => {
                let mut before = tags.clone();
                before.remove(tag);
                if self.query.matches(tags) && !self.query.matches(&before) {
                    self.fire(ctx);
                }
            }
            (ListenerTrigger::Unregistered, ExternalEvent::TagRemoved { tag, tags, .. }) => {
                let mut before = tags.clone();
                before.insert(tag.clone());
                if self.query.matches(&before) && !self.query.matches(tags) {
                    self.fire(ctx);
                }
            }
            (
                ListenerTrigger::Notified,
                ExternalEvent::ListenerRegistered { listener, tags }
                | ExternalEvent::TagAdded { listener, tags, .. },
            ) => {
                if self.query.matches(tags) {
                    self.watch(*listener, ctx);
                }
            }
            (ListenerTrigger::Notified, ExternalEvent::TagRemoved { listener, tags, .. }) => {
                if !self.query.matches(tags) {
                    self.forget(*listener, ctx);
                }
            }
            (ListenerTrigger::Notified, ExternalEvent::ListenerUnregistered { listener, .. }) => {
                self.watched.shift_remove(listener);
            }
            (ListenerTrigger::Notified, ExternalEvent::ListenerNotified { listener, tags }) => {
                if self.watched.contains(listener) && self.query.matches(tags) {
                    self.fire(ctx);
                }
            }
            _ => {}
        }
    }

    fn on_finish_execute(&mut self, ctx: &mut NodeContext<'_>) {
        self.reset(ctx);
    }

    fn config(&self) -> Config {
        let mut config = Config::new();
        self.query.to_config(&mut config);
        config.insert("limit".to_string(), Value::from(self.limit));
        config
    }

    fn clone_node(&self) -> Box<dyn FlowNode> {
        Box::new(ListenerEventNode::new(self.trigger, self.query.clone(), self.limit))
    }

    fn breaks_cascade(&self) -> bool {
        true
    }

    fn debug_info(&self) -> Option<String> {
        let limit = if self.limit == 0 {
            "unlimited".to_string()
        } else {
            self.limit.to_string()
        };
        Some(format!("triggered {}/{}", self.count, limit))
    }
}

/// Sends a notification to every listener matching its query, then leaves.
#[derive(Debug, Clone, Default)]
pub struct NotifyListenersNode {
    query: ListenerQuery,
}

impl NotifyListenersNode {
    pub fn new(query: ListenerQuery) -> Self {
        Self { query }
    }
}

impl FlowNode for NotifyListenersNode {
    fn node_type(&self) -> &str {
        NOTIFY_LISTENERS_TYPE
    }

    fn default_pins(&self) -> PinLayout {
        PinLayout::new(["Exec"], ["Out"])
    }

    fn execute(&mut self, _pin: &str, ctx: &mut NodeContext<'_>) {
        let reached = ctx
            .listeners()
            .notify_listeners(&self.query.tags, self.query.match_type);
        tracing::debug!("Node {} notified {} listeners", ctx.node_id(), reached.len());
        ctx.finish_execute("Out", true);
    }

    fn config(&self) -> Config {
        let mut config = Config::new();
        self.query.to_config(&mut config);
        config
    }

    fn clone_node(&self) -> Box<dyn FlowNode> {
        Box::new(self.clone())
    }
}

pub struct ListenerEventNodeFactory {
    trigger: ListenerTrigger,
}

impl ListenerEventNodeFactory {
    pub fn new(trigger: ListenerTrigger) -> Self {
        Self { trigger }
    }
}

impl NodeFactory for ListenerEventNodeFactory {
    fn create(&self, config: &Config) -> Result<Box<dyn FlowNode>, GraphError> {
        let query = ListenerQuery::from_config(config)?;
        let limit = match config.get("limit") {
            None => 0,
            Some(value) => value.as_u32().ok_or_else(|| {
                GraphError::Configuration("'limit' must be a non-negative whole number".to_string())
            })?,
        };
        Ok(Box::new(ListenerEventNode::new(self.trigger, query, limit)))
    }

    fn node_type(&self) -> &str {
        self.trigger.node_type()
    }

    fn metadata(&self) -> NodeMetadata {
        let description = match self.trigger {
            ListenerTrigger::Registered => "Fires when a matching listener appears",
            ListenerTrigger::Unregistered => "Fires when a matching listener goes away",
            ListenerTrigger::Notified => "Fires when a matching listener notifies the graph",
        };
        NodeMetadata {
            description: description.to_string(),
            category: NodeCategory::Event,
            inputs: vec![
                PortDefinition::new("Start", "Begin listening"),
                PortDefinition::new("Stop", "Stop listening and fire Stopped"),
            ],
            outputs: vec![
                PortDefinition::new(TRIGGER_EVENT, "A matching event was seen"),
                PortDefinition::new("Completed", "The trigger limit was reached"),
                PortDefinition::new("Stopped", "Stop was triggered"),
            ],
            ..Default::default()
        }
    }
}

pub struct NotifyListenersNodeFactory;

impl NodeFactory for NotifyListenersNodeFactory {
    fn create(&self, config: &Config) -> Result<Box<dyn FlowNode>, GraphError> {
        Ok(Box::new(NotifyListenersNode::new(ListenerQuery::from_config(config)?)))
    }

    fn node_type(&self) -> &str {
        NOTIFY_LISTENERS_TYPE
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Notifies every listener matching the tag query".to_string(),
            inputs: vec![PortDefinition::new("Exec", "Send the notification")],
            outputs: vec![PortDefinition::new("Out", "Fires after notifying")],
            ..Default::default()
        }
    }
}
