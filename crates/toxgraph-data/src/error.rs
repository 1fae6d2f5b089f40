//! Error types for dataset loading.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DataError>;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Dataset download failed: {0}")]
    Download(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing column '{0}'")]
    MissingColumn(String),

    #[error("Invalid label '{value}' in row {row}, task {task}")]
    InvalidLabel { row: usize, task: String, value: String },

    #[error("Index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Cannot collate an empty batch")]
    EmptyBatch,

    #[error("Invalid split: {0}")]
    InvalidSplit(String),

    #[error("Chemistry error: {0}")]
    Chem(#[from] toxgraph_chem::ChemError),

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
