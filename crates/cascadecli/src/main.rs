use anyhow::{Context, Result};
use cascadecore::{Edge, Graph, Node, NodeCategory, Value};
use cascaderuntime::{execution_order, ExecutionController, ExecutorRegistry};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "cascade")]
#[command(about = "Cascade workflow engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow graph file
    Run {
        /// Path to graph JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Initial inputs as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a graph file (references and acyclicity)
    Validate {
        /// Path to graph JSON file
        file: PathBuf,
    },

    /// Write an example graph file
    Init {
        /// Output file path
        #[arg(short, long, default_value = "graph.json")]
        output: PathBuf,
    },
}

/// On-disk graph shape. Kept separate from `Graph` so construction always
/// goes through the validating constructor.
#[derive(Serialize, Deserialize)]
struct GraphFile {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

fn load_graph(file: &PathBuf) -> Result<Graph> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let parsed: GraphFile = serde_json::from_str(&raw).context("parsing graph file")?;
    Graph::new(parsed.nodes, parsed.edges).context("invalid graph")
}

fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(arr) => {
            Value::Array(arr.into_iter().map(json_to_value).collect())
        }
        serde_json::Value::Object(obj) => {
            let map: HashMap<String, Value> =
                obj.into_iter().map(|(k, v)| (k, json_to_value(v))).collect();
            Value::Object(map)
        }
    }
}

fn parse_inputs(input: Option<String>) -> Result<HashMap<String, Value>> {
    let Some(raw) = input else {
        return Ok(HashMap::new());
    };
    let parsed: serde_json::Value = serde_json::from_str(&raw).context("parsing --input")?;
    match parsed {
        serde_json::Value::Object(obj) => Ok(obj
            .into_iter()
            .map(|(k, v)| (k, json_to_value(v)))
            .collect()),
        _ => anyhow::bail!("--input must be a JSON object"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            input,
            verbose,
        } => {
            let level = if verbose { "debug" } else { "info" };
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
                )
                .init();
            run_graph(file, input).await?;
        }

        Commands::Validate { file } => {
            validate_graph(file)?;
        }

        Commands::Init { output } => {
            write_example_graph(output)?;
        }
    }

    Ok(())
}

async fn run_graph(file: PathBuf, input: Option<String>) -> Result<()> {
    let graph = load_graph(&file)?;
    let inputs = parse_inputs(input)?;

    let mut registry = ExecutorRegistry::new();
    cascadenodes::register_all(&mut registry);
    let controller = ExecutionController::new(graph, Arc::new(registry));

    let mut rx = controller.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(snapshot) = rx.recv().await {
            for state in snapshot.node_states.values() {
                tracing::debug!(node_id = %state.node_id, status = ?state.status, "node state");
            }
            if snapshot.status.is_terminal() {
                break;
            }
        }
    });

    let result = controller.start(inputs).await;
    let _ = printer.await;

    match result {
        Ok(summary) => {
            println!(
                "execution {} finished: {}/{} nodes completed",
                summary.execution_id, summary.completed_nodes, summary.total_nodes
            );
            if let Some(ctx) = controller.context().await {
                println!("{}", serde_json::to_string_pretty(&ctx.variables)?);
            }
            Ok(())
        }
        Err(err) => {
            if let Some(ctx) = controller.context().await {
                for e in &ctx.errors {
                    eprintln!("node '{}' error: {}", e.node_id, e.message);
                }
            }
            Err(err.into())
        }
    }
}

fn validate_graph(file: PathBuf) -> Result<()> {
    let graph = load_graph(&file)?;
    let order = execution_order(&graph).context("graph cannot be scheduled")?;
    println!("graph is valid; execution order: {}", order.join(" -> "));
    Ok(())
}

fn write_example_graph(output: PathBuf) -> Result<()> {
    let example = GraphFile {
        nodes: vec![
            Node::new("fetch", NodeCategory::Data)
                .with_label("Fetch records")
                .with_config("count", 3i64),
            Node::new("enrich", NodeCategory::Processing).with_label("Enrich records"),
            Node::new("deliver", NodeCategory::Output)
                .with_label("Deliver")
                .with_config("destination", "stdout"),
        ],
        edges: vec![
            Edge::new("e1", "fetch", "enrich"),
            Edge::new("e2", "enrich", "deliver"),
        ],
    };
    std::fs::write(&output, serde_json::to_string_pretty(&example)?)?;
    println!("wrote example graph to {}", output.display());
    Ok(())
}
