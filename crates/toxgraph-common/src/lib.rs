//! toxgraph-common — Shared configuration, errors, and cache paths used across all toxgraph crates.

pub mod error;
pub mod config;
pub mod cache;

// Re-export commonly used types
pub use config::{Config, DatasetConfig, ModelSection, InferenceConfig, CustomModelConfig};
pub use error::{ToxgraphError, Result};
