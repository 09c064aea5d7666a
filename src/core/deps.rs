use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use crate::error::{CalltraceError, Result};
use super::dependency_graph::DependencyGraph;
use super::languages::Ecosystem;

/// Extracts the raw package-dependency edge list from a build ecosystem's
/// own tooling. One implementation per ecosystem.
pub struct DependencyExtractor {
    ecosystem: Ecosystem,
}

/// Fixed registry lookup, resolved once at session start.
pub fn extractor_for(ecosystem: Ecosystem) -> DependencyExtractor {
    DependencyExtractor { ecosystem }
}

impl DependencyExtractor {
    /// Run the ecosystem's module-graph tool against a manifest directory
    /// and build the inverted graph. Any failure here is fatal to the
    /// session: without the graph there is nothing to search.
    pub async fn extract(&self, manifest_dir: &Path) -> Result<DependencyGraph> {
        let raw = match self.ecosystem {
            Ecosystem::Go => self.go_mod_graph(manifest_dir).await?,
        };
        Self::graph_from_edge_text(&raw)
    }

    /// Build the graph from pre-captured edge text (a `--graph-file`), so a
    /// session does not require the ecosystem toolchain on PATH.
    pub fn graph_from_edge_text(text: &str) -> Result<DependencyGraph> {
        let (edges, root) = DependencyGraph::parse_edge_list(text).ok_or_else(|| {
            CalltraceError::GraphUnavailable("edge list is empty".to_string())
        })?;
        debug!("Parsed {} dependency edges, root package {}", edges.len(), root);
        Ok(DependencyGraph::from_edges(&edges, &root))
    }

    async fn go_mod_graph(&self, manifest_dir: &Path) -> Result<String> {
        let modfile: PathBuf = manifest_dir.join("go.mod");
        let output = Command::new("go")
            .arg("mod")
            .arg("graph")
            .arg("-modfile")
            .arg(&modfile)
            .current_dir(manifest_dir)
            .output()
            .await
            .map_err(|e| {
                CalltraceError::GraphUnavailable(format!("failed to invoke go: {}", e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CalltraceError::GraphUnavailable(format!(
                "go mod graph exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
