//! Error types for SMILES parsing, perception and graph construction.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChemError>;

#[derive(Error, Debug)]
pub enum ChemError {
    #[error("SMILES parse error at position {position}: {reason}")]
    Parse { position: usize, reason: String },

    #[error("Unknown element: {0}")]
    UnknownElement(String),

    #[error("Explicit valence for atom #{atom} {symbol}, {valence}, is greater than permitted")]
    Valence { atom: usize, symbol: String, valence: u32 },

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

impl ChemError {
    pub(crate) fn parse(position: usize, reason: impl Into<String>) -> Self {
        ChemError::Parse { position, reason: reason.into() }
    }
}
