//! Language-specific analyzers for the reachability engine
//!
//! Each supported language gets its own module implementing a consistent
//! lexical-analysis contract: function identity, type layouts, local
//! variable bindings and call-site resolution.

mod go;

pub use go::GoAnalyzer;

use std::collections::HashMap;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::{CalltraceError, Result};
use super::source_unit::{Corpus, SourceUnit};

/// Closed set of build ecosystems the tool understands. Resolved once at
/// session start into a concrete analyzer and graph extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ecosystem {
    Go,
}

impl FromStr for Ecosystem {
    type Err = CalltraceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "go" | "golang" => Ok(Ecosystem::Go),
            other => Err(CalltraceError::Config(format!(
                "unsupported ecosystem: {}",
                other
            ))),
        }
    }
}

/// Fixed registry lookup: one analyzer instance per ecosystem.
pub fn analyzer_for(ecosystem: Ecosystem) -> Box<dyn LanguageAnalyzer> {
    match ecosystem {
        Ecosystem::Go => Box::new(GoAnalyzer::new()),
    }
}

/// Kind qualifier a type record is keyed under. Interfaces and structs may
/// share bare names across packages, so the key is composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    Struct,
    Interface,
    Alias,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeKey {
    pub kind: TypeKind,
    pub name: String,
}

/// One type/struct/interface declaration: where it lives and its field (or
/// method) list as `(name, declared type)` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRecord {
    pub source_path: String,
    pub kind: TypeKind,
    pub fields: Vec<(String, String)>,
}

/// All type declarations of a session, built once up front.
pub type TypeTable = HashMap<TypeKey, TypeRecord>;

/// How a local variable's type was established. Anything short of an
/// explicit declaration is an approximation, not full dataflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeHint {
    /// `var x T`, or a parameter/receiver position (the declared type text
    /// rides along in the binding's value).
    Declared(String),
    Parameter,
    /// Short-declaration (`:=`): type only recoverable from the initializer.
    ImplicitFromAssignment,
    /// Plain re-assignment: weakest evidence.
    ImplicitFromUsage,
}

/// Per-variable binding inside one function scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalBinding {
    pub hint: TypeHint,
    /// Initializer expression, or the declared type text for parameters.
    pub value: String,
}

/// Local-variable bindings for every function in the corpus, keyed by
/// `name@source_path`.
pub type LocalIndex = HashMap<String, HashMap<String, LocalBinding>>;

/// Capability set every per-language analyzer must implement. The search
/// engine only ever talks to this trait.
pub trait LanguageAnalyzer: Send + Sync {
    fn language_name(&self) -> &str;

    /// File extensions the analyzer handles, dot included.
    fn file_extensions(&self) -> &[&str];

    /// Reserved directory third-party package sources live under.
    fn third_party_dir(&self) -> &str;

    /// Whether the unit's file should take part in searches at all
    /// (test files are skipped).
    fn is_searchable_file(&self, unit: &SourceUnit) -> bool;

    fn is_function(&self, unit: &SourceUnit) -> bool;

    fn is_type_declaration(&self, unit: &SourceUnit) -> bool;

    /// Extract the declared name from a function unit. Fails with
    /// `MalformedSource` when no parameter-list delimiter can be found.
    fn function_name(&self, unit: &SourceUnit) -> Result<String>;

    /// Receiver type for methods, when the language has receivers.
    fn receiver_type(&self, _unit: &SourceUnit) -> Option<String> {
        None
    }

    fn is_exported(&self, unit: &SourceUnit) -> Result<bool>;

    /// 1-2 candidate fully-qualified package names inferred from the path.
    fn package_names(&self, unit: &SourceUnit) -> Vec<String>;

    /// Exact-match lookup of `candidate` within `package_names`.
    fn package_name(&self, unit: &SourceUnit, candidate: &str) -> Option<String> {
        let wanted = candidate.to_lowercase();
        self.package_names(unit)
            .into_iter()
            .find(|p| p.to_lowercase() == wanted)
            .map(|p| p.to_lowercase())
    }

    /// True unless the unit's path is rooted under the third-party dir.
    fn is_root_package(&self, unit: &SourceUnit) -> bool;

    /// Single pass over the corpus building the type table.
    fn parse_type_declarations(&self, corpus: &Corpus) -> TypeTable;

    /// Line-oriented scan of every function building the local-variable
    /// index. Units with unparseable headers are skipped and logged.
    fn index_local_variables(&self, corpus: &Corpus) -> LocalIndex;

    /// The central semantic check: does `caller`'s body contain a call
    /// expression that resolves to `callee_name` in `callee_package`?
    fn resolves_call(
        &self,
        caller: &SourceUnit,
        callee_name: &str,
        callee_package: &str,
        corpus: &Corpus,
        types: &TypeTable,
        locals: &LocalIndex,
    ) -> Result<bool>;
}
