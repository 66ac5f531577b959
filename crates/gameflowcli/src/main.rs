// crates/gameflowcli/src/main.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gameflowcore::{ExecutionEvent, FinishReason, GraphDocument, NodeEvent, NodeSpec};
use gameflowruntime::{FlowRuntime, NodeRegistry, RuntimeConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gameflow")]
#[command(about = "Game Flow graph CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a flow graph file
    Run {
        /// Path to the graph JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Graphs the main file nests as subgraphs, loaded first
        #[arg(short, long)]
        library: Vec<PathBuf>,

        /// Entry point to trigger
        #[arg(short, long, default_value = "Start")]
        entry: String,

        /// Runtime configuration JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Tick length in milliseconds
        #[arg(long, default_value_t = 100)]
        tick_ms: u64,

        /// Give up after this many seconds of ticking
        #[arg(long, default_value_t = 60)]
        timeout: u64,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a flow graph file
    Validate {
        /// Path to the graph JSON file
        file: PathBuf,

        /// Graphs the file nests as subgraphs
        #[arg(short, long)]
        library: Vec<PathBuf>,
    },

    /// List available node types
    Nodes,

    /// Create a new example flow graph
    Init {
        /// Output file path
        #[arg(short, long, default_value = "flow.json")]
        output: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

fn standard_runtime(config: RuntimeConfig) -> FlowRuntime {
    let mut registry = NodeRegistry::new();
    gameflownodes::register_all(&mut registry);
    FlowRuntime::with_registry(Arc::new(registry), config)
}

fn load_library(runtime: &mut FlowRuntime, library: &[PathBuf]) -> Result<()> {
    for path in library {
        let asset = runtime
            .load_file(path)
            .with_context(|| format!("loading subgraph {}", path.display()))?;
        println!("📚 Loaded subgraph '{}'", asset.name());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            library,
            entry,
            config,
            tick_ms,
            timeout,
            verbose,
        } => {
            init_logging(verbose);
            let config = match config {
                Some(path) => RuntimeConfig::from_json_file(&path)
                    .with_context(|| format!("reading config {}", path.display()))?,
                None => RuntimeConfig::default(),
            };
            run_flow(file, library, entry, config, tick_ms, timeout).await?;
        }

        Commands::Validate { file, library } => {
            init_logging(false);
            validate_flow(file, library)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_flow(output)?;
        }
    }

    Ok(())
}

async fn run_flow(
    file: PathBuf,
    library: Vec<PathBuf>,
    entry: String,
    config: RuntimeConfig,
    tick_ms: u64,
    timeout: u64,
) -> Result<()> {
    println!("🚀 Loading flow graph from: {}", file.display());

    let mut runtime = standard_runtime(config);
    load_library(&mut runtime, &library)?;

    let json = std::fs::read_to_string(&file)?;
    let document = GraphDocument::from_json(&json)?;
    println!("📋 Flow graph: {}", document.name);
    println!("   Nodes: {}", document.nodes.len());
    println!("   Connections: {}", document.connections.len());
    println!();

    let template = runtime.load(&document)?;
    let mut subsystem = runtime.create_subsystem();

    // Subscribe to events for real-time output
    let mut events = subsystem.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::InstanceStarted { entry_point, .. } => {
                    println!("▶️  Instance started at '{}'", entry_point);
                }
                ExecutionEvent::NodeActivated {
                    node_id,
                    node_type,
                    pin,
                    ..
                } => {
                    println!("  ⚡ {} ({}) <- {}", node_id, node_type, pin);
                }
                ExecutionEvent::NodeFinished { node_id, .. } => {
                    println!("  ✅ Node {} finished", node_id);
                }
                ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
                    NodeEvent::Info { message } => println!("     ℹ️  [{}] {}", node_id, message),
                    NodeEvent::Warning { message } => {
                        println!("     ⚠️  [{}] {}", node_id, message)
                    }
                    NodeEvent::Error { message } => println!("     ❌ [{}] {}", node_id, message),
                },
                ExecutionEvent::InstanceFinished { reason, .. } => {
                    println!("🏁 Instance finished: {:?}", reason);
                }
            }
        }
    });

    let id = subsystem.execute(&template, &entry)?;

    let tick = Duration::from_millis(tick_ms.max(1));
    let deadline = Duration::from_secs(timeout);
    let mut elapsed = Duration::ZERO;
    let mut interval = tokio::time::interval(tick);
    while subsystem.instance_count() > 0 {
        if elapsed >= deadline {
            println!("⏱️  Timed out after {:?}; cancelling", deadline);
            subsystem.shutdown();
            break;
        }
        interval.tick().await;
        subsystem.tick(tick);
        elapsed += tick;
    }

    // Wait for events to finish printing
    tokio::time::sleep(Duration::from_millis(100)).await;
    event_task.abort();

    println!();
    println!("📊 Execution Summary:");
    println!("   Instance ID: {}", id);
    println!("   Simulated time: {:?}", elapsed);
    let finished = subsystem.take_finished();
    let Some(result) = finished.iter().find(|f| f.instance_id == id) else {
        bail!("instance {} did not report a result", id);
    };
    match &result.reason {
        FinishReason::Exit { name } => println!("✨ Finished through exit '{}'", name),
        FinishReason::Terminated => println!("✨ Finished (unnamed output)"),
        FinishReason::Cancelled => println!("🛑 Cancelled"),
        FinishReason::Failed { message } => bail!("flow failed: {}", message),
    }

    Ok(())
}

fn validate_flow(file: PathBuf, library: Vec<PathBuf>) -> Result<()> {
    println!("🔍 Validating flow graph: {}", file.display());

    let mut runtime = standard_runtime(RuntimeConfig::default());
    load_library(&mut runtime, &library)?;

    let json = std::fs::read_to_string(&file)?;
    let document = GraphDocument::from_json(&json)?;
    let compiled = runtime.compile(&document)?;

    println!("   Name: {}", document.name);
    println!("   Nodes: {}", document.nodes.len());
    println!("   Connections: {}", compiled.asset.wires().len());
    println!("   Entry points: {:?}", compiled.asset.entry_points().keys().collect::<Vec<_>>());
    println!("   Exit points: {:?}", compiled.asset.exit_points().keys().collect::<Vec<_>>());
    if !compiled.asset.orphans().is_empty() {
        println!("   Orphans: {}", compiled.asset.orphans().len());
    }
    for warning in &compiled.report.warnings {
        println!("   ⚠️  {}", warning);
    }
    for error in &compiled.report.errors {
        println!("   ❌ {}", error);
    }

    if compiled.report.has_errors() {
        bail!("{} validation error(s)", compiled.report.errors.len());
    }
    println!("✅ Flow graph is valid");
    Ok(())
}

fn list_nodes() {
    println!("📦 Available Node Types:");
    println!();

    let mut registry = NodeRegistry::new();
    gameflownodes::register_all(&mut registry);

    for node_type in registry.list_node_types() {
        if let Some(metadata) = registry.get_metadata(&node_type) {
            println!(
                "  • {} ({:?}, {:?})",
                node_type, metadata.category, metadata.status
            );
            println!("    {}", metadata.description);
            let inputs: Vec<&str> = metadata.inputs.iter().map(|p| p.name.as_str()).collect();
            let outputs: Vec<&str> = metadata.outputs.iter().map(|p| p.name.as_str()).collect();
            if !inputs.is_empty() || !outputs.is_empty() {
                println!("    in: {:?}  out: {:?}", inputs, outputs);
            }
        } else {
            println!("  • {}", node_type);
        }
    }
}

fn create_example_flow(output: PathBuf) -> Result<()> {
    let mut document = GraphDocument::new("Example Door Flow");

    let start = document.add_node(NodeSpec::new("core.input").with_position(0.0, 100.0));
    let log = document.add_node(
        NodeSpec::new("debug.log")
            .with_name("Announce")
            .with_config("message", "Waiting for the door")
            .with_position(150.0, 100.0),
    );
    let timer = document.add_node(
        NodeSpec::new("time.timer")
            .with_name("Countdown")
            .with_config("time", 2.0)
            .with_config("step_time", 0.5)
            .with_position(300.0, 100.0),
    );
    let tick = document.add_node(
        NodeSpec::new("debug.log")
            .with_name("Tick")
            .with_config("message", "tick")
            .with_position(450.0, 200.0),
    );
    let finish = document.add_node(NodeSpec::new("core.output").with_position(450.0, 100.0));

    document.add_entry_point("Start", start);
    document.add_exit_point("Finish", finish);
    document.connect(start, "Out", log, "Exec");
    document.connect(log, "Out", timer, "Start");
    document.connect(timer, "Step", tick, "Exec");
    document.connect(timer, "Completed", finish, "Exec");

    std::fs::write(&output, document.to_json()?)?;

    println!("✨ Created example flow graph: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  gameflow run --file {}", output.display());

    Ok(())
}
