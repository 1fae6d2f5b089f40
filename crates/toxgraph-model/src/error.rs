//! Error types for model loading and inference.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Unknown pretrained model '{name}' (available: {available})")]
    UnknownModel { name: String, available: String },

    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),

    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Model download failed: {0}")]
    Download(String),

    #[error("Hugging Face Hub error: {0}")]
    HfHub(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Graph error: {0}")]
    Graph(#[from] toxgraph_chem::ChemError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<candle_core::Error> for ModelError {
    fn from(e: candle_core::Error) -> Self {
        ModelError::Inference(e.to_string())
    }
}

impl From<hf_hub::api::sync::ApiError> for ModelError {
    fn from(e: hf_hub::api::sync::ApiError) -> Self {
        ModelError::HfHub(e.to_string())
    }
}

impl From<tokio::task::JoinError> for ModelError {
    fn from(e: tokio::task::JoinError) -> Self {
        ModelError::Download(e.to_string())
    }
}
