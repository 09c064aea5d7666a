use thiserror::Error;

/// Main error type for Calltrace operations
#[derive(Error, Debug)]
pub enum CalltraceError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The query names a package or function the corpus does not contain.
    #[error("Input error: {0}")]
    Input(String),

    /// A declaration header could not be parsed into a name/signature.
    /// Offending units are skipped and logged, never fatal to a search.
    #[error("Malformed source: {0}")]
    MalformedSource(String),

    /// Dependency-graph extraction failed. Fatal: no search can start
    /// without the inverted package graph.
    #[error("Dependency graph unavailable: {0}")]
    GraphUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CalltraceError>;
