//! toxgraph-model: pretrained GCN and GAT classifiers for molecular
//! property prediction.
//!
//! ```no_run
//! # async fn run() -> toxgraph_model::Result<()> {
//! use toxgraph_model::{load_pretrained, LoaderConfig, Registry};
//!
//! let model = load_pretrained("GCN_Tox21", &Registry::builtin(), &LoaderConfig::cpu()).await?;
//! assert_eq!(model.n_tasks(), 12);
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod classifier;
pub mod config;
pub mod error;
pub mod layers;
pub mod metrics;
pub mod ops;
pub mod pretrained;
pub mod readout;
pub mod registry;

pub use checkpoint::CheckpointFormat;
pub use classifier::{
    Architecture, GatClassifier, GatConfig, GcnClassifier, GcnConfig, GnnClassifier, GraphPredictor, Mode,
};
pub use config::LoaderConfig;
pub use error::{ModelError, Result};
pub use metrics::{masked_roc_auc, mean_defined, roc_auc};
pub use pretrained::{fetch_weights, load_from_path, load_pretrained, read_state_dict, select_device};
pub use registry::{ModelSpec, Registry, WeightSource};
