//! Named pretrained models: architecture hyper-parameters plus where the
//! weights live.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use toxgraph_common::{CustomModelConfig, ModelSection};

use crate::classifier::{Architecture, GatConfig, GcnConfig};
use crate::error::{ModelError, Result};

pub const GCN_TOX21_URL: &str = "https://data.dgl.ai/pre_trained/gcn_tox21.pth";
pub const GAT_TOX21_URL: &str = "https://data.dgl.ai/pre_trained/gat_tox21.pth";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WeightSource {
    /// Plain HTTP(S) download, cached by file name
    Url(String),
    /// File inside a Hugging Face Hub model repository
    HfHub { repo: String, file: String },
    /// Local checkpoint
    Path(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub architecture: Architecture,
    pub weights: WeightSource,
}

impl TryFrom<&CustomModelConfig> for ModelSpec {
    type Error = ModelError;

    fn try_from(custom: &CustomModelConfig) -> Result<Self> {
        let architecture = match custom.architecture.to_ascii_lowercase().as_str() {
            "gcn" => Architecture::Gcn(GcnConfig {
                in_feats: custom.in_feats,
                hidden_feats: custom.hidden_feats.clone(),
                classifier_hidden_feats: custom.classifier_hidden_feats,
                n_tasks: custom.n_tasks,
                dropout: 0.0,
            }),
            "gat" => Architecture::Gat(GatConfig {
                in_feats: custom.in_feats,
                hidden_feats: custom.hidden_feats.clone(),
                num_heads: custom.num_heads.clone(),
                classifier_hidden_feats: custom.classifier_hidden_feats,
                n_tasks: custom.n_tasks,
                dropout: 0.0,
            }),
            other => {
                return Err(ModelError::InvalidConfig(format!(
                    "model '{}': unknown architecture '{}' (expected gcn or gat)",
                    custom.name, other
                )))
            }
        };

        let weights = match (&custom.url, &custom.repo, &custom.file, &custom.path) {
            (Some(url), None, _, None) => WeightSource::Url(url.clone()),
            (None, Some(repo), Some(file), None) => WeightSource::HfHub {
                repo: repo.clone(),
                file: file.clone(),
            },
            (None, None, _, Some(path)) => WeightSource::Path(path.clone()),
            _ => {
                return Err(ModelError::InvalidConfig(format!(
                    "model '{}' must name exactly one weight source",
                    custom.name
                )))
            }
        };

        Ok(Self {
            name: custom.name.clone(),
            architecture,
            weights,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Registry {
    specs: Vec<ModelSpec>,
}

impl Registry {
    /// The Tox21 models trained by the DGL authors.
    pub fn builtin() -> Self {
        Self {
            specs: vec![
                ModelSpec {
                    name: "GCN_Tox21".to_string(),
                    architecture: Architecture::Gcn(GcnConfig {
                        in_feats: 74,
                        hidden_feats: vec![64, 64],
                        classifier_hidden_feats: 64,
                        n_tasks: 12,
                        dropout: 0.0,
                    }),
                    weights: WeightSource::Url(GCN_TOX21_URL.to_string()),
                },
                ModelSpec {
                    name: "GAT_Tox21".to_string(),
                    architecture: Architecture::Gat(GatConfig {
                        in_feats: 74,
                        hidden_feats: vec![32, 32],
                        num_heads: vec![4, 4],
                        classifier_hidden_feats: 64,
                        n_tasks: 12,
                        dropout: 0.0,
                    }),
                    weights: WeightSource::Url(GAT_TOX21_URL.to_string()),
                },
            ],
        }
    }

    /// Built-in entries plus the `[[model.custom]]` ones from config.
    pub fn from_config(section: &ModelSection) -> Result<Self> {
        let mut registry = Self::builtin();
        for custom in &section.custom {
            registry.register(ModelSpec::try_from(custom)?);
        }
        Ok(registry)
    }

    /// Add an entry, replacing any entry with the same name.
    pub fn register(&mut self, spec: ModelSpec) {
        self.specs.retain(|s| s.name != spec.name);
        self.specs.push(spec);
    }

    pub fn get(&self, name: &str) -> Result<&ModelSpec> {
        self.specs
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ModelError::UnknownModel {
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn specs(&self) -> &[ModelSpec] {
        &self.specs
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn custom(name: &str) -> CustomModelConfig {
        CustomModelConfig {
            name: name.to_string(),
            architecture: "gat".to_string(),
            url: None,
            repo: Some("someone/tox-gat".to_string()),
            file: Some("model.safetensors".to_string()),
            path: None,
            in_feats: 74,
            hidden_feats: vec![16],
            num_heads: vec![2],
            classifier_hidden_feats: 32,
            n_tasks: 3,
        }
    }

    #[test]
    fn test_builtin_entries() {
        let registry = Registry::builtin();
        assert_eq!(registry.names(), vec!["GCN_Tox21", "GAT_Tox21"]);
        let gcn = registry.get("GCN_Tox21").unwrap();
        assert_eq!(gcn.architecture.in_feats(), 74);
        assert_eq!(gcn.architecture.n_tasks(), 12);
        assert_eq!(gcn.weights, WeightSource::Url(GCN_TOX21_URL.to_string()));
    }

    #[test]
    fn test_unknown_name() {
        let err = Registry::builtin().get("GCN_Tox22").unwrap_err();
        match err {
            ModelError::UnknownModel { name, available } => {
                assert_eq!(name, "GCN_Tox22");
                assert!(available.contains("GCN_Tox21"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_custom_entries_from_config() {
        let section = ModelSection {
            custom: vec![custom("tiny_gat")],
            ..ModelSection::default()
        };
        let registry = Registry::from_config(&section).unwrap();
        let spec = registry.get("tiny_gat").unwrap();
        assert_eq!(spec.architecture.kind(), "gat");
        assert_eq!(
            spec.weights,
            WeightSource::HfHub {
                repo: "someone/tox-gat".to_string(),
                file: "model.safetensors".to_string()
            }
        );
    }

    #[test]
    fn test_custom_entry_validation() {
        let mut bad = custom("bad");
        bad.architecture = "mpnn".to_string();
        assert!(matches!(ModelSpec::try_from(&bad), Err(ModelError::InvalidConfig(_))));

        let mut bad = custom("bad");
        bad.path = Some(PathBuf::from("/tmp/w.pth"));
        assert!(matches!(ModelSpec::try_from(&bad), Err(ModelError::InvalidConfig(_))));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = Registry::builtin();
        let mut spec = registry.get("GCN_Tox21").unwrap().clone();
        spec.weights = WeightSource::Path(PathBuf::from("local.pth"));
        registry.register(spec);
        assert_eq!(registry.names().len(), 2);
        assert_eq!(
            registry.get("GCN_Tox21").unwrap().weights,
            WeightSource::Path(PathBuf::from("local.pth"))
        );
    }
}
