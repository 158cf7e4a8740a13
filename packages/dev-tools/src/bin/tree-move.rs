//! Tree Move Developer Binary
//!
//! Loads a forest snapshot, applies one move (or insert) through the real
//! move engine and prints the result as JSON. Useful for reproducing a
//! reported move against a copy of production rows.
//!
//! # Usage
//!
//! ```bash
//! # Move node "b" before node "d" in a JSON snapshot
//! tree-move --snapshot forest.json move b --right d
//!
//! # Same move against a libsql database file, printing the tree afterwards
//! tree-move --db ./data/tree.db move b --parent a --show
//!
//! # Render every tree of a snapshot
//! tree-move --snapshot forest.json show
//! ```
//!
//! # Environment Variables
//!
//! - `NESTABLE_CONFIG`: Path to a JSON `TreeConfig` (defaults apply otherwise)
//! - `RUST_LOG`: Logging level (e.g., "info", "debug", "trace")
//!
//! A snapshot is a JSON array of rows:
//! `[{"id": "root", "treeId": "t", "lft": 1, "rgt": 4, "depth": 0, "name": "Root"}, ...]`

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use nestable_core::db::{InMemoryTreeStore, LibsqlTreeStore, TreeStore};
use nestable_core::models::{validate_forest, NewTreeNode, TreeNode};
use nestable_core::services::{MoveEngine, MovePositioning, RootFilter, TreeService};
use nestable_core::TreeConfig;

#[derive(Parser, Debug)]
#[command(name = "tree-move")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON array of nested-set rows to load
    #[arg(short, long, global = true)]
    snapshot: Option<PathBuf>,

    /// libsql database file; snapshot rows are inserted into it when both are given
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// JSON engine configuration
    #[arg(long, env = "NESTABLE_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Move a node and print `{"updated": ...}`
    Move {
        node_id: String,
        #[command(flatten)]
        position: PositionArgs,
        /// Print the resulting tree as well
        #[arg(long)]
        show: bool,
    },
    /// Insert a new leaf and print its row
    Insert {
        name: String,
        #[arg(long)]
        id: Option<String>,
        #[command(flatten)]
        position: PositionArgs,
    },
    /// Print every tree as nested records
    Show,
}

#[derive(clap::Args, Debug)]
struct PositionArgs {
    /// Place immediately after this node
    #[arg(long)]
    left: Option<String>,
    /// Place immediately before this node
    #[arg(long)]
    right: Option<String>,
    /// Place as first child of this node
    #[arg(long)]
    parent: Option<String>,
}

impl From<PositionArgs> for MovePositioning {
    fn from(args: PositionArgs) -> Self {
        MovePositioning {
            left_id: args.left,
            right_id: args.right,
            parent_id: args.parent,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => TreeConfig::default(),
    };
    let snapshot = match &cli.snapshot {
        Some(path) => load_snapshot(path)?,
        None => Vec::new(),
    };

    let store: std::sync::Arc<dyn TreeStore> = match &cli.db {
        Some(path) => {
            tracing::info!("Database: {}", path.display());
            let store = LibsqlTreeStore::new(path.clone(), config.columns.clone()).await?;
            if !snapshot.is_empty() {
                store.seed(&snapshot).await?;
            }
            std::sync::Arc::new(store)
        }
        None => {
            if cli.snapshot.is_none() {
                anyhow::bail!("either --snapshot or --db is required");
            }
            std::sync::Arc::new(InMemoryTreeStore::with_nodes(snapshot))
        }
    };

    let engine = MoveEngine::builder()
        .with_shared_store(store)
        .with_config(config)
        .build()?;
    let service = TreeService::new(engine);

    match cli.command {
        Command::Move {
            node_id,
            position,
            show,
        } => {
            let response = service.move_node(&node_id, position.into()).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            if show {
                print_forest(&service).await?;
            }
        }
        Command::Insert { name, id, position } => {
            let new_node = match id {
                Some(id) => NewTreeNode::with_id(id, name),
                None => NewTreeNode::new(name),
            };
            let node = service.insert_node(new_node, position.into()).await?;
            println!("{}", serde_json::to_string_pretty(&node)?);
        }
        Command::Show => print_forest(&service).await?,
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<TreeConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    TreeConfig::from_json_str(&raw).map_err(|e| anyhow::anyhow!(e))
}

fn load_snapshot(path: &Path) -> anyhow::Result<Vec<TreeNode>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let nodes: Vec<TreeNode> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid snapshot {}", path.display()))?;
    validate_forest(&nodes).with_context(|| format!("Inconsistent snapshot {}", path.display()))?;

    tracing::info!("Loaded {} rows from {}", nodes.len(), path.display());
    Ok(nodes)
}

async fn print_forest(service: &TreeService) -> anyhow::Result<()> {
    let records = service.present(&RootFilter::TopLevel).await?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}
