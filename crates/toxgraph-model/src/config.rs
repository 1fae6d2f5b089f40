//! Configuration for loading pretrained models.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use toxgraph_common::cache::cache_subdir;
use toxgraph_common::ModelSection;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Use GPU if available (default: false)
    pub use_gpu: bool,

    /// Directory for downloaded weights (default: `<cache>/toxgraph/pretrained`)
    pub cache_dir: Option<PathBuf>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            use_gpu: false,
            cache_dir: None,
        }
    }
}

impl LoaderConfig {
    pub fn cpu() -> Self {
        Self::default()
    }

    pub fn gpu() -> Self {
        Self {
            use_gpu: true,
            ..Default::default()
        }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn weights_dir(&self) -> PathBuf {
        cache_subdir(self.cache_dir.as_deref(), "pretrained")
    }
}

impl From<&ModelSection> for LoaderConfig {
    fn from(section: &ModelSection) -> Self {
        Self {
            use_gpu: section.use_gpu,
            cache_dir: section.cache_dir.clone(),
        }
    }
}
