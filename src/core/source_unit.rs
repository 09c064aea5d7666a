use std::collections::HashMap;
use serde::{Deserialize, Serialize};

/// What a source unit's text represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitKind {
    /// One complete function, method or type declaration.
    FunctionOrType,
    /// The whole (unsimplified) file, kept for import and package-line lookups.
    FullFile,
}

/// Source language a unit was segmented from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    Go,
}

/// The atomic artifact the analyzer and search engine operate on: a text
/// fragment tagged with provenance. Immutable once produced by the loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUnit {
    /// Raw text of the fragment.
    pub content: String,

    /// Path relative to the walk root, forward-slash separated.
    pub source_path: String,

    /// Fragment kind (declaration vs full file).
    pub kind: UnitKind,

    /// Language the unit was segmented from.
    pub language: Language,
}

impl SourceUnit {
    pub fn new(
        content: impl Into<String>,
        source_path: impl Into<String>,
        kind: UnitKind,
        language: Language,
    ) -> Self {
        Self {
            content: content.into(),
            source_path: source_path.into(),
            kind,
            language,
        }
    }

    /// File extension of the unit's source path, dot included.
    pub fn extension(&self) -> &str {
        match self.source_path.rfind('.') {
            Some(idx) => &self.source_path[idx..],
            None => "",
        }
    }
}

/// All source units of one analysis session, with the derived views the
/// analyzer needs: declaration units and a path-to-full-text map.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    units: Vec<SourceUnit>,
    full_file_index: HashMap<String, usize>,
}

impl Corpus {
    pub fn new(units: Vec<SourceUnit>) -> Self {
        let mut full_file_index = HashMap::new();
        for (idx, unit) in units.iter().enumerate() {
            if unit.kind == UnitKind::FullFile {
                full_file_index.insert(unit.source_path.clone(), idx);
            }
        }
        Self { units, full_file_index }
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Declaration units (function/method/type fragments).
    pub fn declarations(&self) -> impl Iterator<Item = &SourceUnit> {
        self.units.iter().filter(|u| u.kind == UnitKind::FunctionOrType)
    }

    /// Full text of a file, when the loader produced a FullFile unit for it.
    pub fn full_file(&self, source_path: &str) -> Option<&str> {
        self.full_file_index
            .get(source_path)
            .map(|idx| self.units[*idx].content.as_str())
    }

    pub fn declaration_count(&self) -> usize {
        self.declarations().count()
    }
}

/// Composite key a declaration unit is tracked under across the session:
/// the local-variable index and the exclusion lists both use it.
pub fn unit_key(name: &str, source_path: &str) -> String {
    format!("{}@{}", name, source_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_file_lookup_ignores_declaration_units() {
        let corpus = Corpus::new(vec![
            SourceUnit::new("func A() {}", "pkg/a/a.go", UnitKind::FunctionOrType, Language::Go),
            SourceUnit::new("package a\n\nfunc A() {}", "pkg/a/a.go", UnitKind::FullFile, Language::Go),
        ]);

        assert_eq!(corpus.declaration_count(), 1);
        assert!(corpus.full_file("pkg/a/a.go").unwrap().starts_with("package a"));
        assert!(corpus.full_file("pkg/a/missing.go").is_none());
    }

    #[test]
    fn extension_of_unit_path() {
        let unit = SourceUnit::new("", "vendor/x/y/z.go", UnitKind::FullFile, Language::Go);
        assert_eq!(unit.extension(), ".go");
    }
}
