//! Message passing and segment reductions over a [`GraphTopology`].

use candle_core::{DType, Device, Tensor};

use toxgraph_chem::GraphTopology;

use crate::error::Result;

/// Index tensors of a topology, materialised once per forward pass.
pub struct EdgeIndex {
    pub src: Tensor,
    pub dst: Tensor,
    pub num_nodes: usize,
    pub num_edges: usize,
}

impl EdgeIndex {
    pub fn new(graph: &GraphTopology, device: &Device) -> Result<Self> {
        Ok(Self {
            src: graph.src_tensor(device)?,
            dst: graph.dst_tensor(device)?,
            num_nodes: graph.num_nodes(),
            num_edges: graph.num_edges(),
        })
    }
}

/// Per destination node, the sum of `messages` (one row per edge).
/// Nodes without incoming edges receive zeros.
pub fn scatter_sum(edges: &EdgeIndex, messages: &Tensor) -> Result<Tensor> {
    let mut shape = messages.dims().to_vec();
    shape[0] = edges.num_nodes;
    let out = Tensor::zeros(shape, messages.dtype(), messages.device())?;
    if edges.num_edges == 0 {
        return Ok(out);
    }
    Ok(out.index_add(&edges.dst, messages, 0)?)
}

/// `sum_{u -> v} feats[u]` for every node `v`.
pub fn aggregate_in_neighbors(edges: &EdgeIndex, feats: &Tensor) -> Result<Tensor> {
    if edges.num_edges == 0 {
        return scatter_sum(edges, feats);
    }
    let messages = feats.index_select(&edges.src, 0)?;
    scatter_sum(edges, &messages)
}

/// Softmax of edge `scores` (`[E, H]`) over the incoming edges of each
/// destination node, independently per head.
pub fn edge_softmax(edges: &EdgeIndex, scores: &Tensor) -> Result<Tensor> {
    if edges.num_edges == 0 {
        return Ok(scores.clone());
    }
    let (_, heads) = scores.dims2()?;
    let host: Vec<Vec<f32>> = scores.to_dtype(DType::F32)?.to_vec2()?;
    let dst: Vec<u32> = edges.dst.to_vec1()?;

    let mut max = vec![f32::NEG_INFINITY; edges.num_nodes * heads];
    for (row, d) in host.iter().zip(&dst) {
        for (h, s) in row.iter().enumerate() {
            let slot = &mut max[*d as usize * heads + h];
            *slot = slot.max(*s);
        }
    }
    let max = Tensor::from_vec(max, (edges.num_nodes, heads), scores.device())?
        .to_dtype(scores.dtype())?
        .index_select(&edges.dst, 0)?;

    let exp = (scores - max)?.exp()?;
    let denom = scatter_sum(edges, &exp)?.index_select(&edges.dst, 0)?;
    Ok((exp / denom)?)
}

/// Per-graph sum of node rows.
pub fn segment_sum(graph: &GraphTopology, feats: &Tensor) -> Result<Tensor> {
    let (_, width) = feats.dims2()?;
    let out = Tensor::zeros((graph.num_graphs(), width), feats.dtype(), feats.device())?;
    if graph.num_nodes() == 0 {
        return Ok(out);
    }
    let ids = graph.graph_ids_tensor(feats.device())?;
    Ok(out.index_add(&ids, feats, 0)?)
}

/// Per-graph elementwise max of node rows; graphs without nodes give zeros.
pub fn segment_max(graph: &GraphTopology, feats: &Tensor) -> Result<Tensor> {
    let (_, width) = feats.dims2()?;
    let rows = graph
        .node_offsets()
        .into_iter()
        .zip(graph.batch_num_nodes())
        .map(|(start, &n)| {
            if n == 0 {
                Tensor::zeros((1, width), feats.dtype(), feats.device())
            } else {
                feats.narrow(0, start, n)?.max_keepdim(0)
            }
        })
        .collect::<candle_core::Result<Vec<_>>>()?;
    Ok(Tensor::cat(&rows, 0)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_graph() -> GraphTopology {
        // 0 <-> 1 <-> 2
        GraphTopology::new(3, vec![0, 1, 1, 2], vec![1, 0, 2, 1]).unwrap()
    }

    #[test]
    fn test_aggregate_in_neighbors() {
        let g = path_graph();
        let edges = EdgeIndex::new(&g, &Device::Cpu).unwrap();
        let x = Tensor::new(&[[1f32], [10.], [100.]], &Device::Cpu).unwrap();
        let out: Vec<Vec<f32>> = aggregate_in_neighbors(&edges, &x).unwrap().to_vec2().unwrap();
        assert_eq!(out, vec![vec![10.0], vec![101.0], vec![10.0]]);
    }

    #[test]
    fn test_isolated_nodes_get_zeros() {
        let g = GraphTopology::new(2, vec![], vec![]).unwrap();
        let edges = EdgeIndex::new(&g, &Device::Cpu).unwrap();
        let x = Tensor::ones((2, 3), DType::F32, &Device::Cpu).unwrap();
        let out: Vec<Vec<f32>> = aggregate_in_neighbors(&edges, &x).unwrap().to_vec2().unwrap();
        assert_eq!(out, vec![vec![0.0; 3]; 2]);
    }

    #[test]
    fn test_edge_softmax_normalises_per_destination() {
        let g = path_graph();
        let edges = EdgeIndex::new(&g, &Device::Cpu).unwrap();
        let scores = Tensor::new(&[[0f32, 5.], [1., 5.], [2., 5.], [3., 5.]], &Device::Cpu).unwrap();
        let a: Vec<Vec<f32>> = edge_softmax(&edges, &scores).unwrap().to_vec2().unwrap();

        // node 1 receives edges 0 and 3; nodes 0 and 2 one edge each
        assert!((a[1][0] - 1.0).abs() < 1e-6);
        assert!((a[2][0] - 1.0).abs() < 1e-6);
        assert!((a[0][0] + a[3][0] - 1.0).abs() < 1e-6);
        assert!(a[3][0] > a[0][0]);
        assert!((a[0][1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_segment_reductions() {
        let a = GraphTopology::new(2, vec![], vec![]).unwrap();
        let b = GraphTopology::new(1, vec![], vec![]).unwrap();
        let g = GraphTopology::batch(&[&a, &b]).unwrap();
        let x = Tensor::new(&[[1f32, -1.], [3., -5.], [7., 2.]], &Device::Cpu).unwrap();

        let sum: Vec<Vec<f32>> = segment_sum(&g, &x).unwrap().to_vec2().unwrap();
        assert_eq!(sum, vec![vec![4.0, -6.0], vec![7.0, 2.0]]);
        let max: Vec<Vec<f32>> = segment_max(&g, &x).unwrap().to_vec2().unwrap();
        assert_eq!(max, vec![vec![3.0, -1.0], vec![7.0, 2.0]]);
    }
}
