use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CalltraceError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source tree loading configuration
    pub source: SourceConfig,

    /// Search and analysis settings
    pub analysis: AnalysisConfig,

    /// Output settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Glob patterns for files to load
    pub include: Vec<String>,

    /// Glob patterns for files to skip
    pub exclude: Vec<String>,

    /// Maximum file size to load (in bytes)
    pub max_file_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Build ecosystem of the analyzed tree ("go")
    pub ecosystem: String,

    /// Upper bound on search iterations before a query is abandoned
    pub max_steps: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format ("text" or "json")
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            analysis: AnalysisConfig {
                ecosystem: "go".to_string(),
                max_steps: 10_000,
            },
            output: OutputConfig {
                format: "text".to_string(),
            },
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            include: vec!["**/*.go".to_string()],
            exclude: vec!["**/*_test.go".to_string(), "**/testdata/**".to_string()],
            max_file_size: 1024 * 1024, // 1MB
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| CalltraceError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CalltraceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)
                } else {
                    Ok(Self::default())
                }
            }
            None => {
                // Try common config file locations
                let candidates = [
                    "Calltrace.toml",
                    "calltrace.toml",
                    ".calltrace.toml",
                ];

                for candidate in &candidates {
                    if Path::new(candidate).exists() {
                        return Self::load(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_go_sources() {
        let config = Config::default();
        assert_eq!(config.analysis.ecosystem, "go");
        assert_eq!(config.analysis.max_steps, 10_000);
        assert!(config.source.include.contains(&"**/*.go".to_string()));
        assert!(config.source.exclude.contains(&"**/*_test.go".to_string()));
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Calltrace.toml");

        let mut config = Config::default();
        config.analysis.max_steps = 250;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.analysis.max_steps, 250);
        assert_eq!(loaded.output.format, "text");
    }

    #[test]
    fn missing_explicit_path_falls_back_to_default() {
        let loaded = Config::load_or_default(Some("/nonexistent/Calltrace.toml")).unwrap();
        assert_eq!(loaded.analysis.max_steps, 10_000);
    }
}
