use std::collections::HashMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{CalltraceError, Result};
use super::dependency_graph::{DependencyGraph, ROOT_SENTINEL};
use super::languages::{LanguageAnalyzer, LocalIndex, TypeTable};
use super::source_unit::{unit_key, Corpus, SourceUnit};

/// A parsed reachability query: which function, in which package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub package: String,
    pub function: String,
}

impl SearchQuery {
    /// Parse the `"package,function"` request form. A third comma-joined
    /// field (a call-expression shape used by deeper variants) is dropped
    /// here as a normalization step.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut fields = raw.split(',').map(str::trim);
        match (fields.next(), fields.next()) {
            (Some(package), Some(function)) if !package.is_empty() && !function.is_empty() => {
                Ok(Self {
                    package: package.to_string(),
                    function: function.to_string(),
                })
            }
            _ => Err(CalltraceError::Input(format!(
                "query must be \"package,function\", got \"{}\"",
                raw
            ))),
        }
    }
}

/// Search machine states. `Found` and `Exhausted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchState {
    Searching,
    Backtracking,
    Found,
    Exhausted,
}

/// One hop of a discovered call chain, for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ChainHop {
    pub package: String,
    pub function: String,
    pub source_path: String,
    pub depth: usize,
}

/// Result of one reachability search: the ordered chain (index 0 is the
/// queried function; on success the last element lives in the root
/// package) and whether the root was reached.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub chain: Vec<SourceUnit>,
    pub found: bool,
    pub steps: usize,
}

/// Depth-first search over an implicit call graph whose edges are
/// discovered lazily: materializing the full call graph up front would be
/// prohibitively expensive, so candidate callers are validated one at a
/// time against the reversed package-dependency graph.
///
/// One engine instance owns all mutable search state (exclusion lists and
/// the last-visited-index cache); concurrent queries against the same
/// instance are not supported.
pub struct SearchEngine<'a> {
    analyzer: &'a dyn LanguageAnalyzer,
    corpus: &'a Corpus,
    graph: DependencyGraph,
    types: TypeTable,
    locals: LocalIndex,
    /// (function unit key, package) -> index into the parent list a prior
    /// search reached, so resumed searches skip already-scanned parents.
    progress: HashMap<(String, String), usize>,
    max_steps: usize,
}

impl<'a> SearchEngine<'a> {
    pub fn new(
        analyzer: &'a dyn LanguageAnalyzer,
        corpus: &'a Corpus,
        graph: DependencyGraph,
        max_steps: usize,
    ) -> Self {
        let types = analyzer.parse_type_declarations(corpus);
        let locals = analyzer.index_local_variables(corpus);
        debug!(
            "Session indexes ready: {} type records, {} function scopes",
            types.len(),
            locals.len()
        );
        Self {
            analyzer,
            corpus,
            graph,
            types,
            locals,
            progress: HashMap::new(),
            max_steps,
        }
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Answer one reachability query. `Ok` with `found = false` is the
    /// normal unreachable outcome; `Err(Input)` means the query named a
    /// package or function the session does not know.
    pub fn search(&mut self, query: &SearchQuery) -> Result<SearchOutcome> {
        let resolved = self.resolve_package(&query.package)?;
        debug!("Resolved query package {} to {}", query.package, resolved);

        let initial = self.find_initial_function(&query.function, &resolved)?;
        let mut chain = vec![initial];
        let mut current_package = resolved;
        let mut state = SearchState::Searching;
        let mut steps = 0usize;

        loop {
            match state {
                SearchState::Searching => {
                    steps += 1;
                    if steps > self.max_steps {
                        warn!("Search step bound ({}) reached, giving up", self.max_steps);
                        state = SearchState::Exhausted;
                        continue;
                    }
                    let current = chain
                        .last()
                        .cloned()
                        .expect("chain never empties while searching");
                    match self.find_caller(&current, &current_package)? {
                        Some(caller) => {
                            if let Ok(name) = self.analyzer.function_name(&caller) {
                                // Once proven, a caller is never re-offered as a
                                // fresh candidate for this callee package.
                                let key = unit_key(&name, &caller.source_path);
                                self.graph.record_exclusion(&current_package, &key);
                                debug!(
                                    "Hop {}: {} in {}",
                                    chain.len(),
                                    name,
                                    caller.source_path
                                );
                            }
                            let reached_root = self.analyzer.is_root_package(&caller);
                            if let Some(package) = self.graph_package_for(&caller) {
                                current_package = package;
                            }
                            chain.push(caller);
                            if reached_root {
                                state = SearchState::Found;
                            }
                        }
                        None => state = SearchState::Backtracking,
                    }
                }
                SearchState::Backtracking => {
                    if chain.len() <= 1 {
                        state = SearchState::Exhausted;
                        continue;
                    }
                    let popped = chain.pop().expect("checked above");
                    if let Ok(name) = self.analyzer.function_name(&popped) {
                        let key = unit_key(&name, &popped.source_path);
                        let package = self
                            .graph_package_for(&popped)
                            .unwrap_or_else(|| current_package.clone());
                        debug!("Dead end, backtracking past {} in {}", name, package);
                        self.graph.record_exclusion(&package, &key);
                    }
                    let top = chain.last().expect("chain is non-empty");
                    if let Some(package) = self.graph_package_for(top) {
                        current_package = package;
                    }
                    state = SearchState::Searching;
                }
                SearchState::Found => {
                    return Ok(SearchOutcome {
                        chain,
                        found: true,
                        steps,
                    });
                }
                SearchState::Exhausted => {
                    return Ok(SearchOutcome {
                        chain,
                        found: false,
                        steps,
                    });
                }
            }
        }
    }

    /// Render each hop as `(package, function, depth)`.
    pub fn render_outcome(&self, outcome: &SearchOutcome) -> String {
        let mut lines = Vec::new();
        for hop in self.outcome_hops(outcome) {
            lines.push(format!("({}, {}, {})", hop.package, hop.function, hop.depth));
        }
        lines.join("\n")
    }

    pub fn outcome_hops(&self, outcome: &SearchOutcome) -> Vec<ChainHop> {
        outcome
            .chain
            .iter()
            .enumerate()
            .map(|(depth, unit)| ChainHop {
                package: self
                    .graph_package_for(unit)
                    .or_else(|| self.analyzer.package_names(unit).into_iter().next())
                    .unwrap_or_default(),
                function: self
                    .analyzer
                    .function_name(unit)
                    .unwrap_or_else(|_| "<unparseable>".to_string()),
                source_path: unit.source_path.clone(),
                depth,
            })
            .collect()
    }

    /// Resolve the query package against the graph's known package set: an
    /// exact (case-insensitive) name wins outright; otherwise the
    /// lexicographically first substring match, so resolution is stable
    /// across runs.
    fn resolve_package(&self, requested: &str) -> Result<String> {
        let wanted = requested.to_lowercase();
        if let Some(exact) = self.graph.packages().find(|p| p.to_lowercase() == wanted) {
            return Ok(exact.to_string());
        }
        let mut matches: Vec<&str> = self
            .graph
            .packages()
            .filter(|p| p.to_lowercase().contains(&wanted))
            .collect();
        matches.sort_unstable();
        matches.first().map(|p| p.to_string()).ok_or_else(|| {
            CalltraceError::Input(format!(
                "package \"{}\" is not in the dependency graph",
                requested
            ))
        })
    }

    /// Locate the queried function's unit by case-insensitive name match
    /// within the resolved package.
    fn find_initial_function(&self, function: &str, package: &str) -> Result<SourceUnit> {
        let root_mode = self.graph.is_root(package);
        for unit in self.package_functions(package, root_mode, false) {
            if let Ok(name) = self.analyzer.function_name(unit) {
                if name.eq_ignore_ascii_case(function) {
                    return Ok(unit.clone());
                }
            }
        }
        Err(CalltraceError::Input(format!(
            "no function \"{}\" found in package \"{}\"",
            function, package
        )))
    }

    /// Who, among functions in packages that depend on `current`'s package,
    /// actually calls it? First positive match wins; progress through the
    /// parent list is cached for resumption.
    fn find_caller(
        &mut self,
        current: &SourceUnit,
        current_package: &str,
    ) -> Result<Option<SourceUnit>> {
        let callee_name = match self.analyzer.function_name(current) {
            Ok(name) => name,
            Err(err) => {
                warn!("Cannot derive callee name: {}", err);
                return Ok(None);
            }
        };
        let callee_key = unit_key(&callee_name, &current.source_path);
        let call_marker = format!("{}(", callee_name);

        // Parent packages of every candidate package name, deduplicated in
        // enumeration order.
        let mut parents: Vec<String> = Vec::new();
        let mut candidate_packages = self.analyzer.package_names(current);
        candidate_packages.push(current_package.to_string());
        for package in candidate_packages {
            for parent in self.graph.parents_of(&package) {
                if !parents.contains(parent) {
                    parents.push(parent.clone());
                }
            }
        }

        let progress_key = (callee_key.clone(), current_package.to_string());
        let resume_from = *self.progress.get(&progress_key).unwrap_or(&0);

        for (idx, parent) in parents.iter().enumerate().skip(resume_from) {
            let root_mode = parent == ROOT_SENTINEL || self.graph.is_root(parent);
            let candidates: Vec<SourceUnit> = self
                .package_functions(parent, root_mode, true)
                .filter(|unit| unit.content.contains(&call_marker))
                .filter(|unit| {
                    let key = match self.analyzer.function_name(unit) {
                        Ok(name) => unit_key(&name, &unit.source_path),
                        Err(_) => return false,
                    };
                    key != callee_key
                        && !self.graph.is_excluded(parent, &key)
                        && !self.graph.is_excluded(current_package, &key)
                })
                .cloned()
                .collect();

            for candidate in candidates {
                match self.analyzer.resolves_call(
                    &candidate,
                    &callee_name,
                    current_package,
                    self.corpus,
                    &self.types,
                    &self.locals,
                ) {
                    Ok(true) => {
                        self.progress.insert(progress_key, idx);
                        return Ok(Some(candidate));
                    }
                    Ok(false) => {}
                    Err(CalltraceError::MalformedSource(msg)) => {
                        warn!("Skipping malformed candidate {}: {}", candidate.source_path, msg);
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        self.progress.insert(progress_key, parents.len());
        Ok(None)
    }

    /// Functions belonging to one package. Outside the root package only
    /// exported functions under the third-party dir qualify; the root
    /// application package has no export visibility constraint.
    fn package_functions(
        &self,
        package: &str,
        root_mode: bool,
        require_export: bool,
    ) -> impl Iterator<Item = &SourceUnit> + '_ {
        let analyzer = self.analyzer;
        let package = package.to_string();
        self.corpus
            .declarations()
            .filter(move |unit| {
                analyzer.is_function(unit)
                    && analyzer.is_searchable_file(unit)
                    && analyzer.file_extensions().contains(&unit.extension())
                    && if root_mode {
                        analyzer.is_root_package(unit)
                    } else {
                        unit.source_path.starts_with(analyzer.third_party_dir())
                            && (!require_export || analyzer.is_exported(unit).unwrap_or(false))
                            && analyzer.package_name(unit, &package).is_some()
                    }
            })
    }

    /// The graph package a unit's path resolves to, preferring candidate
    /// names the graph actually knows.
    fn graph_package_for(&self, unit: &SourceUnit) -> Option<String> {
        let names = self.analyzer.package_names(unit);
        for name in &names {
            if self.graph.contains(name) {
                return Some(name.clone());
            }
        }
        if self.analyzer.is_root_package(unit) {
            return Some(self.graph.root_package().to_string());
        }
        names.into_iter().next()
    }
}
