//! Collating samples into mini-batches.

use candle_core::Tensor;

use toxgraph_chem::MolGraph;

use crate::csv_dataset::{MoleculeCsvDataset, Sample};
use crate::error::{DataError, Result};

/// Samples merged into one batched graph with stacked labels and masks.
#[derive(Debug, Clone)]
pub struct Batch {
    pub smiles: Vec<String>,
    pub graph: MolGraph,
    /// `[batch, n_tasks]`
    pub labels: Tensor,
    /// `[batch, n_tasks]`
    pub masks: Tensor,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.smiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.smiles.is_empty()
    }
}

pub fn collate(samples: Vec<Sample>) -> Result<Batch> {
    if samples.is_empty() {
        return Err(DataError::EmptyBatch);
    }
    let graphs: Vec<&MolGraph> = samples.iter().map(|s| &s.graph).collect();
    let graph = MolGraph::batch(&graphs)?;
    let labels: Vec<&Tensor> = samples.iter().map(|s| &s.label).collect();
    let masks: Vec<&Tensor> = samples.iter().map(|s| &s.mask).collect();
    let labels = Tensor::stack(&labels, 0)?;
    let masks = Tensor::stack(&masks, 0)?;

    Ok(Batch {
        smiles: samples.into_iter().map(|s| s.smiles).collect(),
        graph,
        labels,
        masks,
    })
}

/// Groups any iterator into `Vec`s of at most `batch_size` items.
pub struct BatchIterator<T, I>
where
    I: Iterator<Item = T>,
{
    source: I,
    batch_size: usize,
}

impl<T, I> BatchIterator<T, I>
where
    I: Iterator<Item = T>,
{
    pub fn new(source: I, batch_size: usize) -> Self {
        Self {
            source,
            batch_size: batch_size.max(1),
        }
    }
}

impl<T, I> Iterator for BatchIterator<T, I>
where
    I: Iterator<Item = T>,
{
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk: Vec<T> = self.source.by_ref().take(self.batch_size).collect();
        if chunk.is_empty() {
            None
        } else {
            Some(chunk)
        }
    }
}

/// Collated batches over a dataset, in the order of `indices`.
pub struct SampleBatches<'a> {
    dataset: &'a MoleculeCsvDataset,
    indices: BatchIterator<usize, std::vec::IntoIter<usize>>,
}

impl<'a> SampleBatches<'a> {
    /// Every sample, in dataset order.
    pub fn new(dataset: &'a MoleculeCsvDataset, batch_size: usize) -> Self {
        Self::with_indices(dataset, (0..dataset.len()).collect(), batch_size)
    }

    /// A subset (for example one side of a split).
    pub fn with_indices(dataset: &'a MoleculeCsvDataset, indices: Vec<usize>, batch_size: usize) -> Self {
        Self {
            dataset,
            indices: BatchIterator::new(indices.into_iter(), batch_size),
        }
    }
}

impl Iterator for SampleBatches<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.indices.next()?;
        let samples: Result<Vec<Sample>> = chunk.into_iter().map(|i| self.dataset.get(i)).collect();
        Some(samples.and_then(collate))
    }
}
