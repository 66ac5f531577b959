// crates/gameflownodes/tests/execution_test.rs

use gameflowcore::{
    ExecutionEvent, FinishReason, FlowAsset, FlowNode, FlowServices, GraphDocument,
    ListenerRegistry, MatchType, NodeContext, NodeId, NodeSpec, PinDirection, PinRef, TagSet,
    TimerManager, Value,
};
use gameflownodes::{
    scaffold, standard_registry, AndNode, AssetScaffold, InputNode, ListenerEventNode,
    ListenerQuery, ListenerTrigger, OrNode, SequenceNode, SubgraphNode, TimerNode,
};
use gameflowruntime::{FlowInstance, FlowRuntime, FlowSubsystem, RuntimeConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

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

type Log = Arc<Mutex<Vec<String>>>;

/// Records its label and passes execution on.
struct Recorder {
    label: String,
    log: Log,
}

impl Recorder {
    fn boxed(label: &str, log: &Log) -> Box<dyn FlowNode> {
        Box::new(Recorder {
            label: label.to_string(),
            log: log.clone(),
        })
    }
}

impl FlowNode for Recorder {
    fn node_type(&self) -> &str {
        "test.recorder"
    }

    fn execute(&mut self, _pin: &str, ctx: &mut NodeContext<'_>) {
        self.log.lock().push(self.label.clone());
        ctx.finish_execute("Out", true);
    }

    fn clone_node(&self) -> Box<dyn FlowNode> {
        Box::new(Recorder {
            label: self.label.clone(),
            log: self.log.clone(),
        })
    }
}

fn wire(asset: &mut FlowAsset, from: NodeId, output: &str, to: NodeId, input: &str) {
    asset
        .connect(&PinRef::output(from, output), &PinRef::input(to, input))
        .unwrap();
}

fn labels(log: &Log) -> Vec<String> {
    log.lock().clone()
}

fn exit(name: &str) -> FinishReason {
    FinishReason::Exit {
        name: name.to_string(),
    }
}

#[test]
fn test_sequence_runs_each_branch_to_completion() {
    init_tracing();
    let log = Log::default();
    let AssetScaffold {
        mut asset, start, ..
    } = scaffold("sequence").unwrap();

    let seq = asset.add_node(Box::new(SequenceNode));
    assert_eq!(asset.add_pin(seq, PinDirection::Output, None).unwrap(), "2");
    let a = asset.add_node(Recorder::boxed("a", &log));
    let a2 = asset.add_node(Recorder::boxed("a2", &log));
    let b = asset.add_node(Recorder::boxed("b", &log));
    let c = asset.add_node(Recorder::boxed("c", &log));

    wire(&mut asset, start, "Out", seq, "Exec");
    wire(&mut asset, seq, "0", a, "In");
    wire(&mut asset, a, "Out", a2, "In");
    wire(&mut asset, seq, "1", b, "In");
    wire(&mut asset, seq, "2", c, "In");

    let mut instance = FlowInstance::new(Arc::new(asset), FlowServices::default());
    instance.execute("Start").unwrap();

    assert_eq!(labels(&log), vec!["a", "a2", "b", "c"]);
    assert!(instance.is_running());
    assert_eq!(instance.active_count(), 0);
}

#[test]
fn test_termination_collapses_active_set_and_finishes_once() {
    init_tracing();
    let AssetScaffold {
        mut asset,
        start,
        finish,
    } = scaffold("terminate").unwrap();

    let seq = asset.add_node(Box::new(SequenceNode));
    let and = asset.add_node(Box::new(AndNode::new()));
    wire(&mut asset, start, "Out", seq, "Exec");
    wire(&mut asset, seq, "0", and, "1");
    wire(&mut asset, seq, "1", finish, "Exec");

    let services = FlowServices::default();
    let mut events = services.events.subscribe();
    let mut instance = FlowInstance::new(Arc::new(asset), services);

    let calls = Arc::new(Mutex::new(Vec::new()));
    let seen = calls.clone();
    instance.on_finish(move |finished| seen.lock().push(finished.reason.clone()));

    instance.execute("Start").unwrap();

    assert!(instance.is_finished());
    assert_eq!(instance.active_count(), 0);
    assert_eq!(*calls.lock(), vec![exit("Finish")]);
    assert_eq!(instance.finish_reason(), Some(&exit("Finish")));

    // The pending join was reset by its finish hook.
    let join = instance.node_for_template(and).unwrap();
    let node = instance.asset().node(join).unwrap().behavior();
    assert_eq!(node.downcast_ref::<AndNode>().unwrap().activated_count(), 0);

    let mut finished_events = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ExecutionEvent::InstanceFinished { .. }) {
            finished_events += 1;
        }
    }
    assert_eq!(finished_events, 1);

    // Terminating again is a no-op.
    instance.terminate_execution();
    assert_eq!(calls.lock().len(), 1);
}

#[test]
fn test_unregistered_output_reports_terminated() {
    let mut asset = FlowAsset::new("plain");
    let start = asset.add_node(Box::new(InputNode));
    let end = asset.add_node(Box::new(gameflownodes::OutputNode));
    asset.add_entry_point("Start", start).unwrap();
    wire(&mut asset, start, "Out", end, "Exec");

    let mut instance = FlowInstance::new(Arc::new(asset), FlowServices::default());
    instance.execute("Start").unwrap();
    assert_eq!(instance.finish_reason(), Some(&FinishReason::Terminated));
}

#[test]
fn test_unknown_entry_point_is_rejected() {
    let AssetScaffold { asset, .. } = scaffold("entries").unwrap();
    let mut instance = FlowInstance::new(Arc::new(asset), FlowServices::default());
    assert!(instance.execute("Nope").is_err());
    assert!(!instance.is_running());
}

#[test]
fn test_singleton_registration_is_idempotent() {
    init_tracing();
    let AssetScaffold { asset, .. } = scaffold("singleton").unwrap();
    let template = Arc::new(asset);
    let mut subsystem = FlowSubsystem::new(RuntimeConfig::default());

    let first = subsystem.register_instance(&template);
    let second = subsystem.register_instance(&template);
    assert_eq!(first, second);
    assert_eq!(subsystem.instance_count(), 1);

    let AssetScaffold { mut asset, .. } = scaffold("multi").unwrap();
    asset.set_singleton(false);
    let multi = Arc::new(asset);
    let a = subsystem.register_instance(&multi);
    let b = subsystem.register_instance(&multi);
    assert_ne!(a, b);
    assert_eq!(subsystem.instance_count(), 3);
}

#[test]
fn test_singleton_registration_across_threads() {
    let AssetScaffold { asset, .. } = scaffold("shared").unwrap();
    let template = Arc::new(asset);
    let subsystem = Arc::new(Mutex::new(FlowSubsystem::new(RuntimeConfig::default())));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let subsystem = subsystem.clone();
            let template = template.clone();
            std::thread::spawn(move || subsystem.lock().register_instance(&template))
        })
        .collect();
    let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(subsystem.lock().instance_count(), 1);
}

fn timer_graph(log: &Log) -> (FlowAsset, NodeId) {
    let AssetScaffold {
        mut asset,
        start,
        finish,
    } = scaffold("timer").unwrap();
    let timer = asset.add_node(Box::new(TimerNode::new(1.0, 0.25, false)));
    let step = asset.add_node(Recorder::boxed("step", log));
    let pause = asset.add_node(Box::new(InputNode));
    let resume = asset.add_node(Box::new(InputNode));
    asset.add_entry_point("Pause", pause).unwrap();
    asset.add_entry_point("Resume", resume).unwrap();

    wire(&mut asset, start, "Out", timer, "Start");
    wire(&mut asset, pause, "Out", timer, "Stop");
    wire(&mut asset, resume, "Out", timer, "Resume");
    wire(&mut asset, timer, "Step", step, "In");
    wire(&mut asset, timer, "Completed", finish, "Exec");
    (asset, timer)
}

#[test]
fn test_timer_steps_then_completes() {
    init_tracing();
    let log = Log::default();
    let (asset, _) = timer_graph(&log);
    let template = Arc::new(asset);
    let mut subsystem = FlowSubsystem::new(RuntimeConfig::default());

    let id = subsystem.execute(&template, "Start").unwrap();
    assert!(subsystem.instance(id).is_some());

    subsystem.tick(Duration::from_millis(500));
    assert_eq!(labels(&log).len(), 2);
    assert!(subsystem.instance(id).is_some());

    subsystem.tick(Duration::from_millis(600));
    assert_eq!(labels(&log).len(), 4);
    assert!(subsystem.instance(id).is_none());

    let finished = subsystem.take_finished();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].instance_id, id);
    assert_eq!(finished[0].reason, exit("Finish"));
}

#[test]
fn test_timer_stop_pauses_until_resume() {
    init_tracing();
    let log = Log::default();
    let (asset, _) = timer_graph(&log);
    let template = Arc::new(asset);
    let mut subsystem = FlowSubsystem::new(RuntimeConfig::default());

    let id = subsystem.execute(&template, "Start").unwrap();
    subsystem.tick(Duration::from_millis(400));
    subsystem.execute_instance(id, "Pause").unwrap();

    subsystem.tick(Duration::from_secs(5));
    assert_eq!(labels(&log).len(), 1);
    assert!(subsystem.instance(id).is_some());

    subsystem.execute_instance(id, "Resume").unwrap();
    subsystem.tick(Duration::from_millis(700));
    assert!(subsystem.instance(id).is_none());
    assert_eq!(subsystem.take_finished()[0].reason, exit("Finish"));
}

#[test]
fn test_cancel_releases_timers() {
    init_tracing();
    let log = Log::default();
    let (asset, timer) = timer_graph(&log);
    let template = Arc::new(asset);

    let timers = Arc::new(TimerManager::new());
    let services = FlowServices::default().with_timers(timers.clone());
    let mut subsystem = FlowSubsystem::with_services(RuntimeConfig::default(), services);

    let id = subsystem.execute(&template, "Start").unwrap();
    let instance = subsystem.instance(id).unwrap();
    assert!(instance.is_active(instance.node_for_template(timer).unwrap()));
    assert_eq!(timers.len(), 2);

    assert!(subsystem.unregister_instance(id));
    assert!(timers.is_empty());
    assert_eq!(subsystem.take_finished()[0].reason, FinishReason::Cancelled);
}

#[test]
fn test_timer_skip_fires_skipped_and_never_completes() {
    init_tracing();
    let log = Log::default();
    let AssetScaffold {
        mut asset,
        start,
        finish,
    } = scaffold("skip").unwrap();
    let timer = asset.add_node(Box::new(TimerNode::new(1.0, 0.25, false)));
    let skip = asset.add_node(Box::new(InputNode));
    let skipped = asset.add_node(Recorder::boxed("skipped", &log));
    asset.add_entry_point("Skip", skip).unwrap();
    wire(&mut asset, start, "Out", timer, "Start");
    wire(&mut asset, skip, "Out", timer, "Skip");
    wire(&mut asset, timer, "Skipped", skipped, "In");
    wire(&mut asset, timer, "Completed", finish, "Exec");

    let timers = Arc::new(TimerManager::new());
    let services = FlowServices::default().with_timers(timers.clone());
    let mut subsystem = FlowSubsystem::with_services(RuntimeConfig::default(), services);

    let id = subsystem.execute(&Arc::new(asset), "Start").unwrap();
    subsystem.tick(Duration::from_millis(100));
    assert_eq!(timers.len(), 2);

    subsystem.execute_instance(id, "Skip").unwrap();
    assert_eq!(labels(&log), vec!["skipped"]);
    assert!(timers.is_empty());
    let instance = subsystem.instance(id).unwrap();
    assert!(!instance.is_active(instance.node_for_template(timer).unwrap()));

    subsystem.tick(Duration::from_secs(2));
    assert_eq!(labels(&log), vec!["skipped"]);
    assert!(subsystem.instance(id).is_some());
    assert!(subsystem.take_finished().is_empty());
}

#[test]
fn test_timer_with_huge_duration_stays_pending() {
    let AssetScaffold {
        mut asset,
        start,
        finish,
    } = scaffold("forever").unwrap();
    let timer = asset.add_node(Box::new(TimerNode::new(1e30, 0.0, false)));
    wire(&mut asset, start, "Out", timer, "Start");
    wire(&mut asset, timer, "Completed", finish, "Exec");

    let timers = Arc::new(TimerManager::new());
    let services = FlowServices::default().with_timers(timers.clone());
    let mut subsystem = FlowSubsystem::with_services(RuntimeConfig::default(), services);

    let id = subsystem.execute(&Arc::new(asset), "Start").unwrap();
    subsystem.tick(Duration::from_millis(16));
    subsystem.tick(Duration::from_secs(3600));

    assert!(subsystem.instance(id).is_some());
    assert_eq!(timers.len(), 1);
    assert!(subsystem.take_finished().is_empty());
}

#[test]
fn test_cascade_depth_guard_fails_the_run() {
    init_tracing();
    let AssetScaffold {
        mut asset, start, ..
    } = scaffold("loop").unwrap();
    let first = asset.add_node(Box::new(OrNode));
    let second = asset.add_node(Box::new(OrNode));
    wire(&mut asset, start, "Out", first, "1");
    wire(&mut asset, first, "Out", second, "1");
    wire(&mut asset, second, "Out", first, "2");

    let config = RuntimeConfig {
        max_cascade_depth: 16,
        ..Default::default()
    };
    let mut subsystem = FlowSubsystem::new(config);
    subsystem.execute(&Arc::new(asset), "Start").unwrap();

    let finished = subsystem.take_finished();
    assert_eq!(finished.len(), 1);
    assert!(matches!(finished[0].reason, FinishReason::Failed { .. }));
    assert_eq!(subsystem.instance_count(), 0);
}

fn tags(items: &[&str]) -> TagSet {
    items.iter().copied().collect()
}

fn listener_graph(trigger: ListenerTrigger, query: &[&str], limit: u32, log: &Log) -> FlowAsset {
    let AssetScaffold {
        mut asset,
        start,
        finish,
    } = scaffold("listener").unwrap();
    let query = ListenerQuery {
        tags: tags(query),
        match_type: MatchType::All,
        exact: false,
    };
    let listen = asset.add_node(Box::new(ListenerEventNode::new(trigger, query, limit)));
    let hit = asset.add_node(Recorder::boxed("hit", log));
    wire(&mut asset, start, "Out", listen, "Start");
    wire(&mut asset, listen, "Trigger Event", hit, "In");
    wire(&mut asset, listen, "Completed", finish, "Exec");
    asset
}

#[test]
fn test_registered_listener_trigger_counts_to_limit() {
    init_tracing();
    let log = Log::default();
    let template = Arc::new(listener_graph(ListenerTrigger::Registered, &["Enemy"], 2, &log));
    let mut subsystem = FlowSubsystem::new(RuntimeConfig::default());
    let id = subsystem.execute(&template, "Start").unwrap();

    subsystem.register_listener(tags(&["Enemy.Boss"]));
    assert_eq!(labels(&log).len(), 1);

    let door = subsystem.register_listener(tags(&["Door"]));
    assert_eq!(labels(&log).len(), 1);

    // Gaining the tag counts as a new match.
    subsystem.add_listener_tag(door, "Enemy");
    assert_eq!(labels(&log).len(), 2);
    assert!(subsystem.instance(id).is_none());
    assert_eq!(subsystem.take_finished()[0].reason, exit("Finish"));

    // Subscriptions were dropped with the instance.
    subsystem.register_listener(tags(&["Enemy"]));
    assert_eq!(labels(&log).len(), 2);
}

#[test]
fn test_listener_releases_subscription_at_limit() {
    init_tracing();
    let log = Log::default();
    let AssetScaffold {
        mut asset, start, ..
    } = scaffold("limited").unwrap();
    let query = ListenerQuery {
        tags: tags(&["Enemy"]),
        match_type: MatchType::All,
        exact: false,
    };
    let listen = asset.add_node(Box::new(ListenerEventNode::new(
        ListenerTrigger::Registered,
        query,
        1,
    )));
    let hit = asset.add_node(Recorder::boxed("hit", &log));
    wire(&mut asset, start, "Out", listen, "Start");
    wire(&mut asset, listen, "Trigger Event", hit, "In");

    let registry = Arc::new(ListenerRegistry::new());
    let services = FlowServices::default().with_listeners(registry.clone());
    let mut subsystem = FlowSubsystem::with_services(RuntimeConfig::default(), services);
    let id = subsystem.execute(&Arc::new(asset), "Start").unwrap();
    assert_eq!(registry.subscriber_count(), 1);

    subsystem.register_listener(tags(&["Enemy"]));
    assert_eq!(labels(&log), vec!["hit"]);
    let instance = subsystem.instance(id).unwrap();
    assert!(instance.is_running());
    assert!(!instance.is_active(instance.node_for_template(listen).unwrap()));
    assert_eq!(registry.subscriber_count(), 0);

    subsystem.register_listener(tags(&["Enemy"]));
    assert_eq!(labels(&log), vec!["hit"]);
}

#[test]
fn test_unregistered_listener_trigger() {
    let log = Log::default();
    let template = Arc::new(listener_graph(ListenerTrigger::Unregistered, &["Door"], 0, &log));
    let mut subsystem = FlowSubsystem::new(RuntimeConfig::default());
    let door = subsystem.register_listener(tags(&["Door", "Locked"]));
    let id = subsystem.execute(&template, "Start").unwrap();

    subsystem.remove_listener_tag(door, "Locked");
    assert!(labels(&log).is_empty());
    subsystem.remove_listener_tag(door, "Door");
    assert_eq!(labels(&log).len(), 1);

    let chest = subsystem.register_listener(tags(&["Door"]));
    subsystem.unregister_listener(chest);
    assert_eq!(labels(&log).len(), 2);
    assert!(subsystem.instance(id).is_some());
}

#[test]
fn test_notify_listener_trigger_fires_for_watched_components() {
    init_tracing();
    let log = Log::default();
    let template = Arc::new(listener_graph(ListenerTrigger::Notified, &["Door"], 0, &log));
    let mut subsystem = FlowSubsystem::new(RuntimeConfig::default());

    let door = subsystem.register_listener(tags(&["Door"]));
    let enemy = subsystem.register_listener(tags(&["Enemy"]));
    subsystem.execute(&template, "Start").unwrap();

    assert!(subsystem.notify_from_listener(door));
    assert_eq!(labels(&log).len(), 1);
    subsystem.notify_from_listener(enemy);
    assert_eq!(labels(&log).len(), 1);

    // Components registered after Start are watched too.
    let gate = subsystem.register_listener(tags(&["Door.Gate"]));
    subsystem.notify_from_listener(gate);
    assert_eq!(labels(&log).len(), 2);
}

#[test]
fn test_notify_listeners_node_reaches_matching_components() {
    let mut doc = GraphDocument::new("notify");
    let start = doc.add_node(NodeSpec::new("core.input"));
    let notify = doc.add_node(
        NodeSpec::new("world.notify_listeners")
            .with_config("listener_tags", vec![Value::from("Player")])
            .with_config("match_type", "Any"),
    );
    let finish = doc.add_node(NodeSpec::new("core.output"));
    doc.add_entry_point("Start", start);
    doc.add_exit_point("Finish", finish);
    doc.connect(start, "Out", notify, "Exec");
    doc.connect(notify, "Out", finish, "Exec");

    let mut runtime = FlowRuntime::with_registry(Arc::new(standard_registry()), RuntimeConfig::default());
    let template = runtime.load(&doc).unwrap();
    let mut subsystem = runtime.create_subsystem();
    let player = subsystem.register_listener(tags(&["Player"]));
    let npc = subsystem.register_listener(tags(&["Npc"]));

    subsystem.execute(&template, "Start").unwrap();
    assert_eq!(subsystem.take_received(player), vec![tags(&["Player"])]);
    assert!(subsystem.take_received(npc).is_empty());
    assert_eq!(subsystem.take_finished()[0].reason, exit("Finish"));
}

#[test]
fn test_subgraph_leaves_through_nested_exit() {
    init_tracing();
    let mut runtime = FlowRuntime::with_registry(Arc::new(standard_registry()), RuntimeConfig::default());

    let mut inner = GraphDocument::new("Inner");
    let start = inner.add_node(NodeSpec::new("core.input"));
    let timer = inner.add_node(NodeSpec::new("time.timer").with_config("time", 0.5));
    let done = inner.add_node(NodeSpec::new("core.output"));
    inner.add_entry_point("Begin", start);
    inner.add_exit_point("Done", done);
    inner.connect(start, "Out", timer, "Start");
    inner.connect(timer, "Completed", done, "Exec");
    runtime.load(&inner).unwrap();

    let mut outer = GraphDocument::new("Outer");
    let start = outer.add_node(NodeSpec::new("core.input"));
    let sub = outer.add_node(NodeSpec::new("core.subgraph").with_config("asset", "Inner"));
    let finish = outer.add_node(NodeSpec::new("core.output"));
    outer.add_entry_point("Start", start);
    outer.add_exit_point("Finish", finish);
    outer.connect(start, "Out", sub, "Begin");
    outer.connect(sub, "Done", finish, "Exec");
    let template = runtime.load(&outer).unwrap();

    let pins = template.node(sub).unwrap().pins();
    assert_eq!(pins.inputs().to_vec(), vec!["Begin".to_string()]);
    assert_eq!(pins.outputs().to_vec(), vec!["Done".to_string()]);

    let mut subsystem = runtime.create_subsystem();
    let id = subsystem.execute(&template, "Start").unwrap();
    {
        let instance = subsystem.instance(id).unwrap();
        let node = instance.node_for_template(sub).unwrap();
        let behavior = instance.asset().node(node).unwrap().behavior();
        let subgraph = behavior.downcast_ref::<SubgraphNode>().unwrap();
        assert!(subgraph.inner().unwrap().is_running());
    }

    subsystem.tick(Duration::from_millis(600));
    assert!(subsystem.instance(id).is_none());
    assert_eq!(subsystem.take_finished()[0].reason, exit("Finish"));
}

#[test]
fn test_cancelling_outer_cancels_nested_run() {
    let mut runtime = FlowRuntime::with_registry(Arc::new(standard_registry()), RuntimeConfig::default());

    let mut inner = GraphDocument::new("Wait");
    let start = inner.add_node(NodeSpec::new("core.input"));
    let timer = inner.add_node(NodeSpec::new("time.timer").with_config("time", 10.0));
    inner.add_entry_point("Start", start);
    inner.connect(start, "Out", timer, "Start");
    runtime.load(&inner).unwrap();

    let mut outer = GraphDocument::new("Host");
    let start = outer.add_node(NodeSpec::new("core.input"));
    let sub = outer.add_node(NodeSpec::new("core.subgraph").with_config("asset", "Wait"));
    outer.add_entry_point("Start", start);
    outer.connect(start, "Out", sub, "Start");
    let template = runtime.load(&outer).unwrap();

    let timers = Arc::new(TimerManager::new());
    let services = FlowServices::default().with_timers(timers.clone());
    let mut subsystem = FlowSubsystem::with_services(RuntimeConfig::default(), services);
    let id = subsystem.execute(&template, "Start").unwrap();
    assert_eq!(timers.len(), 1);

    subsystem.unregister_instance(id);
    assert!(timers.is_empty());
}
