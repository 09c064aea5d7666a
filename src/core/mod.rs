mod engine;
mod dependency_graph;
mod deps;
mod loader;
mod search;
mod source_unit;

// Language-specific analyzers
mod languages;

// Export the main engine
pub use engine::Engine;
