//! Generic CSV-backed molecule dataset.
//!
//! One column holds SMILES; every other column that is not excluded is a
//! binary task. Empty cells are missing labels (label 0, mask 0). Rows whose
//! SMILES cannot be turned into a graph are skipped.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use candle_core::{Device, Tensor};
use flate2::read::GzDecoder;
use tracing::{debug, info, warn};

use toxgraph_chem::MolGraph;

use crate::error::{DataError, Result};
use crate::pipeline::GraphPipeline;

/// One dataset entry.
#[derive(Debug, Clone)]
pub struct Sample {
    pub smiles: String,
    pub graph: MolGraph,
    /// `[n_tasks]` f32, 0.0 where missing
    pub label: Tensor,
    /// `[n_tasks]` f32, 1.0 where a label exists
    pub mask: Tensor,
}

impl Sample {
    pub fn into_parts(self) -> (String, MolGraph, Tensor, Tensor) {
        (self.smiles, self.graph, self.label, self.mask)
    }
}

#[derive(Debug, Clone)]
pub struct MoleculeCsvDataset {
    tasks: Vec<String>,
    smiles: Vec<String>,
    graphs: Vec<MolGraph>,
    labels: Vec<Vec<f32>>,
    masks: Vec<Vec<f32>>,
}

impl MoleculeCsvDataset {
    /// Read a CSV file; `.gz` files are decompressed on the fly.
    pub fn from_path(
        path: &Path,
        smiles_column: &str,
        exclude: &[&str],
        pipeline: &GraphPipeline,
    ) -> Result<Self> {
        debug!("Loading molecule CSV from {:?}", path);
        let file = BufReader::new(File::open(path)?);
        let gzipped = path.extension().map(|e| e == "gz").unwrap_or(false);
        if gzipped {
            Self::from_reader(GzDecoder::new(file), smiles_column, exclude, pipeline)
        } else {
            Self::from_reader(file, smiles_column, exclude, pipeline)
        }
    }

    pub fn from_reader<R: Read>(
        reader: R,
        smiles_column: &str,
        exclude: &[&str],
        pipeline: &GraphPipeline,
    ) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let headers = reader.headers()?.clone();

        let smiles_idx = headers
            .iter()
            .position(|h| h == smiles_column)
            .ok_or_else(|| DataError::MissingColumn(smiles_column.to_string()))?;
        let task_columns: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(i, h)| *i != smiles_idx && !exclude.contains(h))
            .map(|(i, h)| (i, h.to_string()))
            .collect();

        let mut dataset = Self {
            tasks: task_columns.iter().map(|(_, name)| name.clone()).collect(),
            smiles: Vec::new(),
            graphs: Vec::new(),
            labels: Vec::new(),
            masks: Vec::new(),
        };
        let mut skipped = 0usize;

        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let smiles = record.get(smiles_idx).unwrap_or_default().trim();

            let mut label = Vec::with_capacity(task_columns.len());
            let mut mask = Vec::with_capacity(task_columns.len());
            for (col, task) in &task_columns {
                let cell = record.get(*col).unwrap_or_default().trim();
                if cell.is_empty() {
                    label.push(0.0);
                    mask.push(0.0);
                } else {
                    let value: f32 = cell.parse().map_err(|_| DataError::InvalidLabel {
                        row,
                        task: task.clone(),
                        value: cell.to_string(),
                    })?;
                    label.push(value);
                    mask.push(1.0);
                }
            }

            match pipeline.build(smiles) {
                Ok(graph) => {
                    dataset.smiles.push(smiles.to_string());
                    dataset.graphs.push(graph);
                    dataset.labels.push(label);
                    dataset.masks.push(mask);
                }
                Err(e) => {
                    warn!("Skipping row {} ({}): {}", row, smiles, e);
                    skipped += 1;
                }
            }
        }

        info!(
            "Loaded {} molecules with {} tasks ({} skipped)",
            dataset.len(),
            dataset.n_tasks(),
            skipped
        );
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    pub fn tasks(&self) -> &[String] {
        &self.tasks
    }

    pub fn n_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn smiles(&self, index: usize) -> Option<&str> {
        self.smiles.get(index).map(String::as_str)
    }

    pub fn graph(&self, index: usize) -> Option<&MolGraph> {
        self.graphs.get(index)
    }

    /// Sample `index`, with a copy of its graph and CPU label/mask tensors.
    pub fn get(&self, index: usize) -> Result<Sample> {
        let len = self.len();
        let graph = self
            .graphs
            .get(index)
            .ok_or(DataError::IndexOutOfRange { index, len })?;
        let n = self.n_tasks();
        Ok(Sample {
            smiles: self.smiles[index].clone(),
            graph: graph.clone(),
            label: Tensor::from_slice(&self.labels[index], n, &Device::Cpu)?,
            mask: Tensor::from_slice(&self.masks[index], n, &Device::Cpu)?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<Sample>> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    /// Raw label and mask rows, for metrics that do not need tensors.
    pub fn label_rows(&self) -> (&[Vec<f32>], &[Vec<f32>]) {
        (&self.labels, &self.masks)
    }

    /// Per task `negatives / positives` over labelled entries, for weighting
    /// a binary cross-entropy loss. Tasks without positives get 0.
    pub fn task_pos_weights(&self) -> Vec<f32> {
        (0..self.n_tasks())
            .map(|t| {
                let (mut pos, mut labelled) = (0.0f32, 0.0f32);
                for (label, mask) in self.labels.iter().zip(&self.masks) {
                    labelled += mask[t];
                    pos += label[t] * mask[t];
                }
                if pos > 0.0 {
                    (labelled - pos) / pos
                } else {
                    0.0
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const CSV: &str = "\
A,B,mol_id,smiles
1,0,M1,CCO
,1,M2,c1ccccc1
0,,M3,not_a_smiles
1,1,M4,CC(=O)O
";

    fn load() -> MoleculeCsvDataset {
        MoleculeCsvDataset::from_reader(CSV.as_bytes(), "smiles", &["mol_id"], &GraphPipeline::default()).unwrap()
    }

    #[test]
    fn test_tasks_and_skipped_rows() {
        let ds = load();
        assert_eq!(ds.tasks(), &["A".to_string(), "B".to_string()]);
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.smiles(1), Some("c1ccccc1"));
        assert_eq!(ds.smiles(2), Some("CC(=O)O"));
    }

    #[test]
    fn test_missing_labels_are_masked() {
        let ds = load();
        let (smiles, graph, label, mask) = ds.get(1).unwrap().into_parts();
        assert_eq!(smiles, "c1ccccc1");
        assert_eq!(graph.num_nodes(), 6);
        assert_eq!(label.to_vec1::<f32>().unwrap(), vec![0.0, 1.0]);
        assert_eq!(mask.to_vec1::<f32>().unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_out_of_range() {
        let ds = load();
        assert!(matches!(ds.get(3), Err(DataError::IndexOutOfRange { index: 3, len: 3 })));
    }

    #[test]
    fn test_task_pos_weights() {
        let ds = load();
        // A: labelled 1, 1 -> 0 negatives / 2 positives; B: 0, 1, 1
        assert_eq!(ds.task_pos_weights(), vec![0.0, 0.5]);
    }

    #[test]
    fn test_invalid_label_rejected() {
        let csv = "smiles,A\nCCO,maybe\n";
        let err = MoleculeCsvDataset::from_reader(csv.as_bytes(), "smiles", &[], &GraphPipeline::default()).unwrap_err();
        assert!(matches!(err, DataError::InvalidLabel { row: 0, .. }));
    }

    #[test]
    fn test_missing_smiles_column() {
        let csv = "smi,A\nCCO,1\n";
        let err = MoleculeCsvDataset::from_reader(csv.as_bytes(), "smiles", &[], &GraphPipeline::default()).unwrap_err();
        assert!(matches!(err, DataError::MissingColumn(_)));
    }

    #[test]
    fn test_gzip_file() {
        let mut file = tempfile::Builder::new().suffix(".csv.gz").tempfile().unwrap();
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(CSV.as_bytes()).unwrap();
        file.write_all(&encoder.finish().unwrap()).unwrap();
        file.flush().unwrap();

        let ds = MoleculeCsvDataset::from_path(file.path(), "smiles", &["mol_id"], &GraphPipeline::default()).unwrap();
        assert_eq!(ds.len(), 3);
    }
}
