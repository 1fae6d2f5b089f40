//! Configuration loading for toxgraph.
//!
//! Reads `toxgraph.toml` from the current directory or the path in the
//! `TOXGRAPH_CONFIG` env var. YAML is accepted when the path ends in
//! `.yaml`/`.yml`. Every field has a default, and the defaults reproduce the
//! stock run: Tox21, bigraph without self loops, canonical atom features,
//! `GCN_Tox21`, sample 0, CPU.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, ToxgraphError};

/// Env var naming an explicit config file.
pub const CONFIG_ENV: &str = "TOXGRAPH_CONFIG";

/// Config file looked up in the working directory when the env var is unset.
pub const DEFAULT_CONFIG_FILE: &str = "toxgraph.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub inference: InferenceConfig,
}

// ── Dataset ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Benchmark name (only "tox21" ships with toxgraph)
    #[serde(default = "default_dataset_name")]
    pub name: String,

    /// Download URL for the gzipped CSV
    #[serde(default = "default_dataset_url")]
    pub url: String,

    /// Local CSV (plain or .gz) used instead of downloading
    pub path: Option<PathBuf>,

    /// Cache directory override
    pub cache_dir: Option<PathBuf>,

    /// Graph construction strategy: "bigraph" or "complete"
    #[serde(default = "default_graph")]
    pub graph: String,

    /// Add a self loop to every atom
    #[serde(default)]
    pub self_loop: bool,

    /// Attach canonical bond features under "e"
    #[serde(default)]
    pub bond_features: bool,
}

fn default_dataset_name() -> String { "tox21".to_string() }
fn default_dataset_url()  -> String { "https://data.dgl.ai/dataset/tox21.csv.gz".to_string() }
fn default_graph()        -> String { "bigraph".to_string() }

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            name: default_dataset_name(),
            url: default_dataset_url(),
            path: None,
            cache_dir: None,
            graph: default_graph(),
            self_loop: false,
            bond_features: false,
        }
    }
}

// ── Model ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSection {
    /// Registry identifier of the pretrained model
    #[serde(default = "default_model_name")]
    pub name: String,

    /// Use GPU if available
    #[serde(default)]
    pub use_gpu: bool,

    /// Cache directory override for downloaded weights
    pub cache_dir: Option<PathBuf>,

    /// Extra registry entries
    #[serde(default)]
    pub custom: Vec<CustomModelConfig>,
}

fn default_model_name() -> String { "GCN_Tox21".to_string() }

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            use_gpu: false,
            cache_dir: None,
            custom: vec![],
        }
    }
}

/// A user-registered pretrained model.
///
/// Exactly one of `url`, `repo` (with `file`), or `path` names the weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomModelConfig {
    pub name: String,

    /// "gcn" or "gat"
    pub architecture: String,

    pub url: Option<String>,

    /// Hugging Face Hub repository id
    pub repo: Option<String>,

    /// File inside `repo`
    pub file: Option<String>,

    pub path: Option<PathBuf>,

    #[serde(default = "default_in_feats")]
    pub in_feats: usize,

    pub hidden_feats: Vec<usize>,

    /// Attention heads per layer (GAT only)
    #[serde(default)]
    pub num_heads: Vec<usize>,

    #[serde(default = "default_classifier_hidden")]
    pub classifier_hidden_feats: usize,

    pub n_tasks: usize,
}

fn default_in_feats()          -> usize { 74 }
fn default_classifier_hidden() -> usize { 64 }

// ── Inference ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Dataset index fed to `predict`
    #[serde(default)]
    pub sample_index: usize,

    /// Batch size for `evaluate`
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize { 128 }

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            sample_index: 0,
            batch_size: default_batch_size(),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// Checks `TOXGRAPH_CONFIG` first, then `toxgraph.toml` in the current
    /// directory. A missing default file yields the defaults; a missing file
    /// named by the env var is an error.
    pub fn load() -> Result<Self> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) => {
                let path = PathBuf::from(path);
                if !path.exists() {
                    return Err(ToxgraphError::Config(format!(
                        "{} points to a missing file: {}",
                        CONFIG_ENV,
                        path.display()
                    )));
                }
                Self::from_path(&path)
            }
            Err(_) => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_path(path)
                } else {
                    info!("No {} found, using built-in defaults", DEFAULT_CONFIG_FILE);
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load configuration from an explicit file.
    pub fn from_path(path: &Path) -> Result<Self> {
        debug!("Reading config from {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);

        let config: Config = if is_yaml {
            serde_yaml::from_str(&content)?
        } else {
            toml::from_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no collaborator can honour.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.dataset.graph.as_str(), "bigraph" | "complete") {
            return Err(ToxgraphError::Config(format!(
                "unknown graph construction '{}' (expected bigraph or complete)",
                self.dataset.graph
            )));
        }
        if self.inference.batch_size == 0 {
            return Err(ToxgraphError::Config("inference.batch_size must be > 0".to_string()));
        }
        for custom in &self.model.custom {
            let sources = [custom.url.is_some(), custom.repo.is_some(), custom.path.is_some()]
                .iter()
                .filter(|s| **s)
                .count();
            if sources != 1 {
                return Err(ToxgraphError::Config(format!(
                    "custom model '{}' must set exactly one of url, repo, path",
                    custom.name
                )));
            }
            if custom.repo.is_some() && custom.file.is_none() {
                return Err(ToxgraphError::Config(format!(
                    "custom model '{}' sets repo without file",
                    custom.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults_match_stock_run() {
        let config = Config::default();
        assert_eq!(config.dataset.name, "tox21");
        assert_eq!(config.dataset.graph, "bigraph");
        assert!(!config.dataset.self_loop);
        assert_eq!(config.model.name, "GCN_Tox21");
        assert_eq!(config.inference.sample_index, 0);
        assert!(!config.model.use_gpu);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[model]\nname = \"GAT_Tox21\"\n\n[inference]\nsample_index = 7").unwrap();

        let config = Config::from_path(file.path()).unwrap();
        assert_eq!(config.model.name, "GAT_Tox21");
        assert_eq!(config.inference.sample_index, 7);
        assert_eq!(config.inference.batch_size, 128);
        assert_eq!(config.dataset.url, "https://data.dgl.ai/dataset/tox21.csv.gz");
    }

    #[test]
    fn test_yaml_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "dataset:\n  graph: complete\n  self_loop: true").unwrap();

        let config = Config::from_path(file.path()).unwrap();
        assert_eq!(config.dataset.graph, "complete");
        assert!(config.dataset.self_loop);
    }

    #[test]
    fn test_unknown_graph_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[dataset]\ngraph = \"knn\"").unwrap();

        let err = Config::from_path(file.path()).unwrap_err();
        assert!(matches!(err, ToxgraphError::Config(_)));
    }

    #[test]
    fn test_custom_model_needs_single_source() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[[model.custom]]\nname = \"mine\"\narchitecture = \"gcn\"\nhidden_feats = [32]\nn_tasks = 2\n\
             url = \"https://example.org/w.pth\"\npath = \"/tmp/w.pth\""
        )
        .unwrap();

        assert!(Config::from_path(file.path()).is_err());
    }
}
