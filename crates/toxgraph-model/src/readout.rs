//! Graph-level readout: node features → one vector per graph.

use candle_core::Tensor;
use candle_nn::{linear, Linear, Module, VarBuilder};

use toxgraph_chem::GraphTopology;

use crate::error::Result;
use crate::ops::{segment_max, segment_sum};

/// Sum of node features weighted by a learned per-node gate
/// `sigmoid(Linear(h))`.
pub struct WeightAndSum {
    atom_weighting: Linear,
}

impl WeightAndSum {
    pub fn load(in_feats: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            atom_weighting: linear(in_feats, 1, vb.pp("atom_weighting").pp("0"))?,
        })
    }

    /// Per-node gates, `[num_nodes, 1]`.
    pub fn atom_weights(&self, feats: &Tensor) -> Result<Tensor> {
        Ok(candle_nn::ops::sigmoid(&self.atom_weighting.forward(feats)?)?)
    }

    pub fn forward(&self, graph: &GraphTopology, feats: &Tensor) -> Result<Tensor> {
        let weighted = feats.broadcast_mul(&self.atom_weights(feats)?)?;
        segment_sum(graph, &weighted)
    }
}

/// Concatenation of the weighted sum and the elementwise max over each
/// graph's nodes: `[num_graphs, 2 * feats]`.
pub struct SumAndMaxReadout {
    weighted_sum: WeightAndSum,
}

impl SumAndMaxReadout {
    pub fn load(in_feats: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            weighted_sum: WeightAndSum::load(in_feats, vb)?,
        })
    }

    pub fn forward(&self, graph: &GraphTopology, feats: &Tensor) -> Result<Tensor> {
        let sum = self.weighted_sum.forward(graph, feats)?;
        let max = segment_max(graph, feats)?;
        Ok(Tensor::cat(&[&sum, &max], 1)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use std::collections::HashMap;

    #[test]
    fn test_sum_and_max() {
        let mut map = HashMap::new();
        // zero weights: every gate is sigmoid(0) = 0.5
        map.insert("atom_weighting.0.weight".to_string(), Tensor::zeros((1, 2), DType::F32, &Device::Cpu).unwrap());
        map.insert("atom_weighting.0.bias".to_string(), Tensor::zeros(1, DType::F32, &Device::Cpu).unwrap());
        let vb = VarBuilder::from_tensors(map, DType::F32, &Device::Cpu);
        let readout = SumAndMaxReadout::load(2, vb).unwrap();

        let a = GraphTopology::new(2, vec![0, 1], vec![1, 0]).unwrap();
        let b = GraphTopology::new(1, vec![], vec![]).unwrap();
        let g = GraphTopology::batch(&[&a, &b]).unwrap();
        let x = Tensor::new(&[[2f32, 4.], [6., -8.], [1., 1.]], &Device::Cpu).unwrap();

        let out: Vec<Vec<f32>> = readout.forward(&g, &x).unwrap().to_vec2().unwrap();
        assert_eq!(out, vec![vec![4.0, -2.0, 6.0, 4.0], vec![0.5, 0.5, 1.0, 1.0]]);
    }
}
