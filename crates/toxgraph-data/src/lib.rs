//! Molecule datasets for toxgraph.
//!
//! Datasets yield `(smiles, graph, label, mask)` samples in a fixed order.
//! Graphs are built once at load time by a [`GraphPipeline`].

pub mod batch;
pub mod csv_dataset;
pub mod error;
pub mod pipeline;
pub mod split;
pub mod tox21;

pub use batch::{collate, Batch, BatchIterator, SampleBatches};
pub use csv_dataset::{MoleculeCsvDataset, Sample};
pub use error::{DataError, Result};
pub use pipeline::GraphPipeline;
pub use split::{consecutive_split, random_split, Split, SplitFractions};
pub use tox21::{Tox21, TOX21_TASKS, TOX21_URL};
