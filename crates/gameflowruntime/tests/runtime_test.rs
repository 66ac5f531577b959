// crates/gameflowruntime/tests/runtime_test.rs

use gameflowcore::{
    Config, ExecutionEvent, FinishReason, FlowAsset, FlowError, FlowNode, GraphDocument,
    GraphError, NodeCategory, NodeContext, NodeSpec, PinLayout, PinRef,
};
use gameflowruntime::{
    FlowInstance, FlowRuntime, FlowSubsystem, NodeFactory, NodeMetadata, NodeRegistry,
    RuntimeConfig, TypeStatus,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Initialize tracing for tests
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("debug"))
        )
        .with_test_writer()
        .try_init();
}

struct Entry;

impl FlowNode for Entry {
    fn node_type(&self) -> &str {
        "test.entry"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Input
    }

    fn default_pins(&self) -> PinLayout {
        PinLayout::new(Vec::<String>::new(), ["Out"])
    }

    fn clone_node(&self) -> Box<dyn FlowNode> {
        Box::new(Entry)
    }
}

struct Exit;

impl FlowNode for Exit {
    fn node_type(&self) -> &str {
        "test.exit"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Output
    }

    fn default_pins(&self) -> PinLayout {
        PinLayout::new(["Exec"], Vec::<String>::new())
    }

    fn execute(&mut self, _pin: &str, ctx: &mut NodeContext<'_>) {
        ctx.terminate_execution();
    }

    fn clone_node(&self) -> Box<dyn FlowNode> {
        Box::new(Exit)
    }
}

/// Stays active until the instance ends.
#[derive(Default)]
struct Hold {
    finished: Arc<Mutex<u32>>,
}

impl FlowNode for Hold {
    fn node_type(&self) -> &str {
        "test.hold"
    }

    fn execute(&mut self, _pin: &str, _ctx: &mut NodeContext<'_>) {}

    fn on_finish_execute(&mut self, _ctx: &mut NodeContext<'_>) {
        *self.finished.lock() += 1;
    }

    fn clone_node(&self) -> Box<dyn FlowNode> {
        Box::new(Hold {
            finished: self.finished.clone(),
        })
    }
}

/// Builds nodes of one type with a fixed constructor.
struct Simple {
    node_type: &'static str,
    make: fn() -> Box<dyn FlowNode>,
}

impl NodeFactory for Simple {
    fn create(&self, config: &Config) -> Result<Box<dyn FlowNode>, GraphError> {
        if config.contains_key("broken") {
            return Err(GraphError::Configuration("broken is not allowed".to_string()));
        }
        Ok((self.make)())
    }

    fn node_type(&self) -> &str {
        self.node_type
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: format!("{} for tests", self.node_type),
            ..Default::default()
        }
    }
}

fn registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry.register(Arc::new(Simple {
        node_type: "test.entry",
        make: || Box::new(Entry),
    }));
    registry.register(Arc::new(Simple {
        node_type: "test.exit",
        make: || Box::new(Exit),
    }));
    registry.register(Arc::new(Simple {
        node_type: "test.hold",
        make: || Box::new(Hold::default()),
    }));
    registry
}

/// Start -> Hold, with an unconnected "Done" exit.
fn holding_asset(name: &str, finished: &Arc<Mutex<u32>>) -> Arc<FlowAsset> {
    let mut asset = FlowAsset::new(name);
    let start = asset.add_node(Box::new(Entry));
    let hold = asset.add_node(Box::new(Hold {
        finished: finished.clone(),
    }));
    let done = asset.add_node(Box::new(Exit));
    asset.add_entry_point("Start", start).unwrap();
    asset.add_exit_point("Done", done).unwrap();
    asset
        .connect(&PinRef::output(start, "Out"), &PinRef::input(hold, "In"))
        .unwrap();
    Arc::new(asset)
}

#[test]
fn test_registry_lists_and_overrides_status() {
    let mut registry = registry();
    assert_eq!(
        registry.list_node_types(),
        vec!["test.entry", "test.exit", "test.hold"]
    );
    assert_eq!(registry.status("test.hold"), Some(TypeStatus::Active));
    assert_eq!(registry.status("test.nothing"), None);

    registry.set_status("test.hold", TypeStatus::Deprecated);
    let metadata = registry.get_metadata("test.hold").unwrap();
    assert_eq!(metadata.status, TypeStatus::Deprecated);
    assert_eq!(metadata.description, "test.hold for tests");
    assert!(TypeStatus::Deprecated.is_instantiable());
    assert!(!TypeStatus::Abstract.is_instantiable());
}

#[test]
fn test_registry_errors_name_the_type() {
    let registry = registry();
    let err = registry
        .create_node("test.nothing", &Config::new())
        .err()
        .unwrap();
    assert_eq!(err, GraphError::UnknownNodeType("test.nothing".to_string()));

    let mut config = Config::new();
    config.insert("broken".to_string(), true.into());
    let err = registry.create_node("test.hold", &config).err().unwrap();
    assert_eq!(
        err,
        GraphError::Configuration("test.hold: broken is not allowed".to_string())
    );
}

#[test]
fn test_load_rejects_graphs_with_errors() {
    init_tracing();
    let mut runtime = FlowRuntime::with_registry(Arc::new(registry()), RuntimeConfig::default());

    let mut doc = GraphDocument::new("exits");
    let start = doc.add_node(NodeSpec::new("test.entry"));
    let hold = doc.add_node(NodeSpec::new("test.hold"));
    doc.add_entry_point("Start", start);
    doc.add_exit_point("Finish", hold);
    doc.connect(start, "Out", hold, "In");

    let compiled = runtime.compile(&doc).unwrap();
    assert!(compiled.report.has_errors());
    assert!(compiled.asset.exit_point("Finish").is_none());

    let err = runtime.load(&doc).unwrap_err();
    assert!(matches!(err, FlowError::Graph(GraphError::Validation(_))));
    assert!(runtime.library().is_empty());

    doc.custom_outputs.clear();
    let asset = runtime.load(&doc).unwrap();
    assert_eq!(runtime.library().get("exits").unwrap().id(), asset.id());
    assert_eq!(runtime.library().get_by_id(doc.id).unwrap().name(), "exits");
}

#[test]
fn test_library_replaces_assets_by_name() {
    let mut runtime = FlowRuntime::with_registry(Arc::new(registry()), RuntimeConfig::default());
    let mut doc = GraphDocument::new("shared");
    let start = doc.add_node(NodeSpec::new("test.entry"));
    doc.add_entry_point("Start", start);

    let first = runtime.load(&doc).unwrap();
    doc.id = GraphDocument::new("shared").id;
    let second = runtime.load(&doc).unwrap();

    assert_eq!(runtime.library().len(), 1);
    assert_ne!(first.id(), second.id());
    assert_eq!(runtime.library().get("shared").unwrap().id(), second.id());
    assert_eq!(runtime.library().names().collect::<Vec<_>>(), vec!["shared"]);
}

#[test]
fn test_finish_handlers_fire_once_per_run() {
    init_tracing();
    let finished = Arc::new(Mutex::new(0));
    let asset = holding_asset("handlers", &finished);
    let reasons: Arc<Mutex<Vec<FinishReason>>> = Arc::default();

    let mut instance = FlowInstance::new(asset, Default::default());
    let seen = reasons.clone();
    instance.on_finish(move |f| seen.lock().push(f.reason.clone()));

    instance.execute("Start").unwrap();
    assert_eq!(instance.active_count(), 1);
    instance.cancel();
    instance.cancel();
    instance.terminate_execution();

    assert_eq!(*reasons.lock(), vec![FinishReason::Cancelled]);
    assert_eq!(*finished.lock(), 1);
    assert_eq!(instance.active_count(), 0);
    assert!(instance.is_finished());

    // A finished instance can run again.
    instance.execute("Start").unwrap();
    assert!(instance.is_running());
    instance.terminate_execution();
    assert_eq!(
        *reasons.lock(),
        vec![FinishReason::Cancelled, FinishReason::Terminated]
    );
}

#[test]
fn test_unknown_entry_leaves_nothing_registered() {
    let finished = Arc::new(Mutex::new(0));
    let asset = holding_asset("entries", &finished);
    let mut subsystem = FlowSubsystem::new(RuntimeConfig::default());

    let err = subsystem.execute(&asset, "Nowhere").unwrap_err();
    assert!(matches!(err, FlowError::UnknownEntryPoint(_)));
    assert_eq!(subsystem.instance_count(), 0);
}

#[test]
fn test_shutdown_cancels_and_reports_every_instance() {
    init_tracing();
    let finished = Arc::new(Mutex::new(0));
    let asset = holding_asset("shutdown", &finished);
    let mut subsystem = FlowSubsystem::new(RuntimeConfig::default());
    let mut events = subsystem.subscribe_events();

    let id = subsystem.execute(&asset, "Start").unwrap();
    assert_eq!(subsystem.running_flows(), vec![id]);
    assert_eq!(subsystem.running_flow_by_template(asset.id()), Some(id));

    subsystem.shutdown();
    assert_eq!(subsystem.instance_count(), 0);
    assert_eq!(*finished.lock(), 1);

    let results = subsystem.take_finished();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].instance_id, id);
    assert_eq!(results[0].template_id, asset.id());
    assert_eq!(results[0].reason, FinishReason::Cancelled);
    assert!(subsystem.take_finished().is_empty());

    let mut started = false;
    let mut cancelled = false;
    while let Ok(event) = events.try_recv() {
        match event {
            ExecutionEvent::InstanceStarted { instance_id, .. } => started |= instance_id == id,
            ExecutionEvent::InstanceFinished { reason, .. } => {
                cancelled |= reason == FinishReason::Cancelled
            }
            _ => {}
        }
    }
    assert!(started);
    assert!(cancelled);
}
