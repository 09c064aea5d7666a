use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::Result;

use crate::core::Engine;

#[derive(Parser)]
#[command(name = "calltrace")]
#[command(about = "Proves whether a dependency function is reachable from your code")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search for a call chain from application code to a dependency function
    Trace {
        /// Checked-out source tree to analyze (vendored dependencies included)
        #[arg(short, long)]
        source: PathBuf,

        /// Directory holding the module manifest (defaults to the source tree)
        #[arg(short, long)]
        manifest: Option<PathBuf>,

        /// Pre-captured dependency edge list, instead of running the
        /// ecosystem's graph tool
        #[arg(long)]
        graph_file: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(long)]
        format: Option<String>,

        /// Queries of the form "package,function"
        #[arg(required = true)]
        queries: Vec<String>,
    },

    /// Extract and dump the inverted package-dependency graph
    Graph {
        /// Directory holding the module manifest
        #[arg(short, long, default_value = ".")]
        manifest: PathBuf,

        /// Pre-captured dependency edge list, instead of running the
        /// ecosystem's graph tool
        #[arg(long)]
        graph_file: Option<PathBuf>,

        /// Write the graph to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    pub async fn execute(self, mut engine: Engine) -> Result<()> {
        match self.command {
            Commands::Trace { source, manifest, graph_file, format, queries } => {
                engine.trace(source, manifest, graph_file, queries, format).await
            }
            Commands::Graph { manifest, graph_file, output } => {
                engine.graph(manifest, graph_file, output).await
            }
        }
    }
}
