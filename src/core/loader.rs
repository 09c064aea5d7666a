use std::path::Path;
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::SourceConfig;
use crate::error::{CalltraceError, Result};
use super::source_unit::{Corpus, Language, SourceUnit, UnitKind};

/// Walks a checked-out source tree and segments each file into the units
/// the analyzer consumes: one full-file unit plus one unit per top-level
/// declaration. Repository acquisition happens before this; the loader only
/// ever sees a directory on disk.
pub struct CorpusLoader {
    language: Language,
    include: Vec<String>,
    exclude: Vec<String>,
    max_file_size: usize,
}

impl CorpusLoader {
    pub fn new(language: Language, config: &SourceConfig) -> Self {
        Self {
            language,
            include: config.include.clone(),
            exclude: config.exclude.clone(),
            max_file_size: config.max_file_size,
        }
    }

    /// Load every matching file under `root` into a corpus. Unreadable or
    /// oversized files are skipped with a warning, never fatal.
    pub fn load(&self, root: &Path) -> Result<Corpus> {
        let mut overrides = OverrideBuilder::new(root);
        for pattern in &self.include {
            overrides
                .add(pattern)
                .map_err(|e| CalltraceError::Config(format!("bad include pattern: {}", e)))?;
        }
        for pattern in &self.exclude {
            overrides
                .add(&format!("!{}", pattern))
                .map_err(|e| CalltraceError::Config(format!("bad exclude pattern: {}", e)))?;
        }
        let overrides = overrides
            .build()
            .map_err(|e| CalltraceError::Config(format!("bad glob patterns: {}", e)))?;

        let mut units = Vec::new();
        let mut fingerprint = Sha256::new();
        let mut file_count = 0usize;

        for entry in WalkBuilder::new(root).overrides(overrides).build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable directory entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }

            let path = entry.path();
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            if metadata.len() as usize > self.max_file_size {
                warn!(
                    "Skipping {} ({} bytes exceeds limit)",
                    path.display(),
                    metadata.len()
                );
                continue;
            }

            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };

            let relative = path
                .strip_prefix(root)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");

            fingerprint.update(Sha256::digest(content.as_bytes()));
            file_count += 1;

            for declaration in segment_declarations(&content) {
                units.push(SourceUnit::new(
                    declaration,
                    relative.clone(),
                    UnitKind::FunctionOrType,
                    self.language,
                ));
            }
            units.push(SourceUnit::new(
                content,
                relative,
                UnitKind::FullFile,
                self.language,
            ));
        }

        debug!(
            "Loaded {} files into {} units (corpus fingerprint {:x})",
            file_count,
            units.len(),
            fingerprint.finalize()
        );
        Ok(Corpus::new(units))
    }
}

/// Slice out every top-level `func` and `type` declaration by brace
/// matching: from the header line through the brace that closes the body.
/// Bodiless declarations end at the line break.
fn segment_declarations(content: &str) -> Vec<String> {
    let mut declarations = Vec::new();
    let mut offset = 0;

    while offset < content.len() {
        let rest = &content[offset..];
        let line_end = rest.find('\n').map(|i| offset + i).unwrap_or(content.len());
        let line = &content[offset..line_end];

        if line.starts_with("func ")
            || line.starts_with("func(")
            || line.starts_with("type ")
        {
            let decl_end = declaration_end(content, offset, line_end);
            declarations.push(content[offset..decl_end].trim_end().to_string());
            offset = decl_end;
        } else {
            offset = line_end + 1;
        }
    }
    declarations
}

/// End offset of the declaration starting at `start`. Counts braces from
/// the first opener; a declaration whose header line carries no brace and
/// no continuation ends with its line.
fn declaration_end(content: &str, start: usize, header_end: usize) -> usize {
    let header = &content[start..header_end];

    // Parenthesized `type (...)` blocks close on their parenthesis.
    if header.trim_end().ends_with('(') {
        let mut depth = 0usize;
        for (idx, byte) in content.as_bytes().iter().enumerate().skip(start) {
            match byte {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return idx + 1;
                    }
                }
                _ => {}
            }
        }
        return content.len();
    }

    let open = match header.find('{') {
        Some(idx) => start + idx,
        None => {
            // Single-line alias or bodiless declaration. The file may end
            // without a trailing newline.
            return (header_end + 1).min(content.len());
        }
    };

    let mut depth = 0usize;
    for (idx, byte) in content.as_bytes().iter().enumerate().skip(open) {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return idx + 1;
                }
            }
            _ => {}
        }
    }
    content.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;
    use std::fs;

    const SAMPLE: &str = "package leaf\n\nimport \"fmt\"\n\ntype Stream struct {\n\tsorted bool\n}\n\nfunc Target(q float64) float64 {\n\tif q > 1 {\n\t\treturn 1\n\t}\n\treturn q\n}\n\nfunc (s *Stream) Flush() {\n\tfmt.Println(s)\n}\n";

    #[test]
    fn segments_functions_methods_and_types() {
        let declarations = segment_declarations(SAMPLE);
        assert_eq!(declarations.len(), 3);
        assert!(declarations[0].starts_with("type Stream struct"));
        assert!(declarations[1].starts_with("func Target"));
        assert!(declarations[1].ends_with('}'));
        assert!(declarations[1].contains("return q"));
        assert!(declarations[2].starts_with("func (s *Stream) Flush"));
    }

    #[test]
    fn segments_single_line_alias() {
        let declarations = segment_declarations("package a\n\ntype Samples = []Sample\n");
        assert_eq!(declarations, vec!["type Samples = []Sample".to_string()]);
    }

    #[test]
    fn segments_bodiless_declaration_at_eof_without_newline() {
        let declarations = segment_declarations("package a\ntype Samples = []Sample");
        assert_eq!(declarations, vec!["type Samples = []Sample".to_string()]);

        let declarations = segment_declarations("package a\nfunc Stub()");
        assert_eq!(declarations, vec!["func Stub()".to_string()]);
    }

    #[test]
    fn loads_directory_into_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("vendor/github.com/acme/leaf");
        fs::create_dir_all(&pkg_dir).unwrap();
        fs::write(pkg_dir.join("stream.go"), SAMPLE).unwrap();
        fs::write(pkg_dir.join("stream_test.go"), "package leaf\n\nfunc TestTarget(t *T) {}\n").unwrap();
        fs::write(pkg_dir.join("notes.txt"), "not go").unwrap();

        let config = SourceConfig::default();
        let loader = CorpusLoader::new(Language::Go, &config);
        let corpus = loader.load(dir.path()).unwrap();

        // Test files and non-Go files are excluded by the default globs.
        assert_eq!(corpus.declaration_count(), 3);
        assert!(corpus
            .full_file("vendor/github.com/acme/leaf/stream.go")
            .is_some());
        assert!(corpus
            .full_file("vendor/github.com/acme/leaf/stream_test.go")
            .is_none());
    }

    #[test]
    fn oversized_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("big.go"), SAMPLE).unwrap();

        let config = SourceConfig {
            max_file_size: 8,
            ..SourceConfig::default()
        };
        let loader = CorpusLoader::new(Language::Go, &config);
        let corpus = loader.load(dir.path()).unwrap();
        assert!(corpus.is_empty());
    }
}
