use std::path::{Path, PathBuf};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::CalltraceError;
use super::deps::{extractor_for, DependencyExtractor};
use super::dependency_graph::DependencyGraph;
use super::languages::{analyzer_for, Ecosystem};
use super::loader::CorpusLoader;
use super::search::{ChainHop, SearchEngine, SearchQuery};
use super::source_unit::Language;

/// One query's answer, in the shape the JSON output format serializes.
#[derive(Debug, Serialize)]
pub struct TraceReport {
    pub query: String,
    pub package: String,
    pub function: String,
    pub found: bool,
    pub steps: usize,
    pub generated_at: DateTime<Utc>,
    pub chain: Vec<ChainHop>,
}

/// Main orchestration engine: wires the loader, the dependency extractor
/// and the search engine together for one invocation.
pub struct Engine {
    config: Config,
}

impl Engine {
    pub async fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;
        debug!("Loaded configuration: {:?}", config);
        Ok(Self { config })
    }

    /// Answer one or more reachability queries against a source tree. All
    /// queries share one session, so exclusion lists and search progress
    /// carry over between them.
    pub async fn trace(
        &mut self,
        source: PathBuf,
        manifest: Option<PathBuf>,
        graph_file: Option<PathBuf>,
        queries: Vec<String>,
        format: Option<String>,
    ) -> Result<()> {
        let ecosystem: Ecosystem = self.config.analysis.ecosystem.parse()?;
        let analyzer = analyzer_for(ecosystem);
        let language = match ecosystem {
            Ecosystem::Go => Language::Go,
        };

        info!("Loading {} sources from {}", analyzer.language_name(), source.display());
        let loader = CorpusLoader::new(language, &self.config.source);
        let corpus = loader.load(&source)?;
        if corpus.is_empty() {
            return Err(CalltraceError::Input(format!(
                "no {} sources found under {}",
                analyzer.language_name(),
                source.display()
            ))
            .into());
        }
        info!("Corpus ready: {} declarations", corpus.declaration_count());

        let graph = self
            .acquire_graph(ecosystem, manifest.as_deref().unwrap_or(&source), graph_file)
            .await?;
        info!(
            "Dependency graph ready: {} packages, root {}",
            graph.packages().count(),
            graph.root_package()
        );

        let mut engine = SearchEngine::new(
            analyzer.as_ref(),
            &corpus,
            graph,
            self.config.analysis.max_steps,
        );

        let format = format.unwrap_or_else(|| self.config.output.format.clone());
        for raw in &queries {
            let query = SearchQuery::parse(raw)?;
            info!("Searching for callers of {} in {}", query.function, query.package);
            let outcome = engine.search(&query)?;

            match format.as_str() {
                "json" => {
                    let report = TraceReport {
                        query: raw.clone(),
                        package: query.package.clone(),
                        function: query.function.clone(),
                        found: outcome.found,
                        steps: outcome.steps,
                        generated_at: Utc::now(),
                        chain: engine.outcome_hops(&outcome),
                    };
                    println!("{}", serde_json::to_string_pretty(&report).map_err(CalltraceError::from)?);
                }
                _ => {
                    if outcome.found {
                        println!(
                            "{} in {} is reachable from {}:",
                            query.function,
                            query.package,
                            engine.graph().root_package()
                        );
                    } else {
                        println!(
                            "{} in {} is not reachable from application code",
                            query.function, query.package
                        );
                    }
                    println!("{}", engine.render_outcome(&outcome));
                }
            }
        }

        Ok(())
    }

    /// Extract the inverted dependency graph and dump it as JSON, either to
    /// stdout or to a file.
    pub async fn graph(
        &mut self,
        manifest: PathBuf,
        graph_file: Option<PathBuf>,
        output: Option<PathBuf>,
    ) -> Result<()> {
        let ecosystem: Ecosystem = self.config.analysis.ecosystem.parse()?;
        let graph = self.acquire_graph(ecosystem, &manifest, graph_file).await?;

        let rendered = serde_json::to_string_pretty(&graph).map_err(CalltraceError::from)?;
        match output {
            Some(path) => {
                std::fs::write(&path, rendered).map_err(CalltraceError::from)?;
                info!("Wrote dependency graph to {}", path.display());
            }
            None => println!("{}", rendered),
        }
        Ok(())
    }

    /// Either parse a pre-captured edge list or shell out to the
    /// ecosystem's own graph tool.
    async fn acquire_graph(
        &self,
        ecosystem: Ecosystem,
        manifest_dir: &Path,
        graph_file: Option<PathBuf>,
    ) -> Result<DependencyGraph> {
        match graph_file {
            Some(path) => {
                debug!("Reading dependency edges from {}", path.display());
                let text = std::fs::read_to_string(&path).map_err(CalltraceError::from)?;
                Ok(DependencyExtractor::graph_from_edge_text(&text)?)
            }
            None => Ok(extractor_for(ecosystem).extract(manifest_dir).await?),
        }
    }
}
