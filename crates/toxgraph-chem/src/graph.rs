//! Molecular graphs: directed edge lists plus named node and edge tensors.
//!
//! A [`MolGraph`] may hold several molecules after [`MolGraph::batch`];
//! `batch_num_nodes` / `batch_num_edges` record where each one starts.

use std::collections::BTreeMap;

use candle_core::{Device, Tensor};
use tracing::debug;

use crate::error::{ChemError, Result};
use crate::featurizer::{AtomFeaturizer, BondFeaturizer};
use crate::molecule::Molecule;

/// Edge structure of one graph or a batch of disjoint graphs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphTopology {
    src: Vec<u32>,
    dst: Vec<u32>,
    batch_num_nodes: Vec<usize>,
    batch_num_edges: Vec<usize>,
}

impl GraphTopology {
    /// A single graph with `num_nodes` nodes and the given edges.
    pub fn new(num_nodes: usize, src: Vec<u32>, dst: Vec<u32>) -> Result<Self> {
        let num_edges = src.len();
        Self::from_parts(src, dst, vec![num_nodes], vec![num_edges])
    }

    fn from_parts(
        src: Vec<u32>,
        dst: Vec<u32>,
        batch_num_nodes: Vec<usize>,
        batch_num_edges: Vec<usize>,
    ) -> Result<Self> {
        if src.len() != dst.len() {
            return Err(ChemError::Graph(format!(
                "src has {} entries but dst has {}",
                src.len(),
                dst.len()
            )));
        }
        let num_nodes: usize = batch_num_nodes.iter().sum();
        if let Some(bad) = src.iter().chain(dst.iter()).find(|n| **n as usize >= num_nodes) {
            return Err(ChemError::Graph(format!(
                "edge endpoint {} out of range for {} nodes",
                bad, num_nodes
            )));
        }
        if batch_num_edges.iter().sum::<usize>() != src.len() {
            return Err(ChemError::Graph("per-graph edge counts do not add up".to_string()));
        }
        Ok(Self {
            src,
            dst,
            batch_num_nodes,
            batch_num_edges,
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.batch_num_nodes.iter().sum()
    }

    pub fn num_edges(&self) -> usize {
        self.src.len()
    }

    pub fn num_graphs(&self) -> usize {
        self.batch_num_nodes.len()
    }

    pub fn src(&self) -> &[u32] {
        &self.src
    }

    pub fn dst(&self) -> &[u32] {
        &self.dst
    }

    pub fn batch_num_nodes(&self) -> &[usize] {
        &self.batch_num_nodes
    }

    pub fn batch_num_edges(&self) -> &[usize] {
        &self.batch_num_edges
    }

    /// First node index of each graph.
    pub fn node_offsets(&self) -> Vec<usize> {
        self.batch_num_nodes
            .iter()
            .scan(0, |acc, n| {
                let start = *acc;
                *acc += n;
                Some(start)
            })
            .collect()
    }

    /// Graph index of every node.
    pub fn graph_ids(&self) -> Vec<u32> {
        self.batch_num_nodes
            .iter()
            .enumerate()
            .flat_map(|(g, n)| std::iter::repeat(g as u32).take(*n))
            .collect()
    }

    pub fn in_degrees(&self) -> Vec<u32> {
        let mut deg = vec![0u32; self.num_nodes()];
        for d in &self.dst {
            deg[*d as usize] += 1;
        }
        deg
    }

    pub fn src_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::new(self.src.as_slice(), device)?)
    }

    pub fn dst_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::new(self.dst.as_slice(), device)?)
    }

    pub fn graph_ids_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::new(self.graph_ids().as_slice(), device)?)
    }

    /// Disjoint union, shifting every graph's node ids past the previous ones.
    pub fn batch(parts: &[&GraphTopology]) -> Result<Self> {
        let mut src = Vec::new();
        let mut dst = Vec::new();
        let mut batch_num_nodes = Vec::new();
        let mut batch_num_edges = Vec::new();
        let mut offset = 0u32;
        for part in parts {
            src.extend(part.src.iter().map(|s| s + offset));
            dst.extend(part.dst.iter().map(|d| d + offset));
            batch_num_nodes.extend_from_slice(&part.batch_num_nodes);
            batch_num_edges.extend_from_slice(&part.batch_num_edges);
            offset += part.num_nodes() as u32;
        }
        Self::from_parts(src, dst, batch_num_nodes, batch_num_edges)
    }
}

/// A graph with named per-node and per-edge tensors.
#[derive(Debug, Clone)]
pub struct MolGraph {
    topology: GraphTopology,
    ndata: BTreeMap<String, Tensor>,
    edata: BTreeMap<String, Tensor>,
}

impl MolGraph {
    pub fn new(topology: GraphTopology) -> Self {
        Self {
            topology,
            ndata: BTreeMap::new(),
            edata: BTreeMap::new(),
        }
    }

    pub fn topology(&self) -> &GraphTopology {
        &self.topology
    }

    pub fn num_nodes(&self) -> usize {
        self.topology.num_nodes()
    }

    pub fn num_edges(&self) -> usize {
        self.topology.num_edges()
    }

    /// Look up node data without removing it.
    pub fn ndata(&self, key: &str) -> Option<&Tensor> {
        self.ndata.get(key)
    }

    pub fn ndata_mut(&mut self, key: &str) -> Option<&mut Tensor> {
        self.ndata.get_mut(key)
    }

    /// Remove and return node data. Later lookups of `key` return `None`.
    pub fn pop_ndata(&mut self, key: &str) -> Option<Tensor> {
        self.ndata.remove(key)
    }

    pub fn ndata_keys(&self) -> impl Iterator<Item = &str> {
        self.ndata.keys().map(String::as_str)
    }

    /// Attach node data; the first dimension must equal the node count.
    pub fn set_ndata(&mut self, key: impl Into<String>, value: Tensor) -> Result<()> {
        check_rows(&value, self.num_nodes(), "node")?;
        self.ndata.insert(key.into(), value);
        Ok(())
    }

    pub fn edata(&self, key: &str) -> Option<&Tensor> {
        self.edata.get(key)
    }

    pub fn edata_mut(&mut self, key: &str) -> Option<&mut Tensor> {
        self.edata.get_mut(key)
    }

    pub fn pop_edata(&mut self, key: &str) -> Option<Tensor> {
        self.edata.remove(key)
    }

    pub fn edata_keys(&self) -> impl Iterator<Item = &str> {
        self.edata.keys().map(String::as_str)
    }

    /// Attach edge data; the first dimension must equal the edge count.
    pub fn set_edata(&mut self, key: impl Into<String>, value: Tensor) -> Result<()> {
        check_rows(&value, self.num_edges(), "edge")?;
        self.edata.insert(key.into(), value);
        Ok(())
    }

    /// Disjoint union of graphs. Node and edge data present on every part
    /// are concatenated; keys missing from any part are dropped.
    pub fn batch(graphs: &[&MolGraph]) -> Result<Self> {
        if graphs.is_empty() {
            return Err(ChemError::Graph("cannot batch zero graphs".to_string()));
        }
        let topologies: Vec<&GraphTopology> = graphs.iter().map(|g| &g.topology).collect();
        let mut batched = MolGraph::new(GraphTopology::batch(&topologies)?);

        for key in graphs[0].ndata.keys() {
            let parts: Option<Vec<&Tensor>> = graphs.iter().map(|g| g.ndata.get(key)).collect();
            match parts {
                Some(parts) => batched.set_ndata(key.clone(), Tensor::cat(&parts, 0)?)?,
                None => debug!("Dropping node data '{}' absent from some graphs", key),
            }
        }
        for key in graphs[0].edata.keys() {
            let parts: Option<Vec<&Tensor>> = graphs.iter().map(|g| g.edata.get(key)).collect();
            match parts {
                Some(parts) => batched.set_edata(key.clone(), Tensor::cat(&parts, 0)?)?,
                None => debug!("Dropping edge data '{}' absent from some graphs", key),
            }
        }
        Ok(batched)
    }
}

fn check_rows(value: &Tensor, expected: usize, what: &str) -> Result<()> {
    let rows = value.dims().first().copied().unwrap_or(0);
    if rows != expected {
        return Err(ChemError::Graph(format!(
            "{} data has {} rows but the graph has {} {}s",
            what, rows, expected, what
        )));
    }
    Ok(())
}

// ── Constructors ─────────────────────────────────────────────────────────────

/// Strategy for turning a molecule into a graph.
pub trait GraphConstructor: Send + Sync {
    fn name(&self) -> &str;

    /// Build the graph and attach features. Edge features are computed per
    /// bond and repeated for each edge the bond yields; edges that do not
    /// come from a bond get zero rows.
    fn build(
        &self,
        mol: &Molecule,
        node_featurizer: Option<&dyn AtomFeaturizer>,
        edge_featurizer: Option<&dyn BondFeaturizer>,
    ) -> Result<MolGraph>;

    fn build_from_smiles(
        &self,
        smiles: &str,
        node_featurizer: Option<&dyn AtomFeaturizer>,
        edge_featurizer: Option<&dyn BondFeaturizer>,
    ) -> Result<MolGraph> {
        let mol = Molecule::from_smiles(smiles)?;
        self.build(&mol, node_featurizer, edge_featurizer)
    }
}

/// Edge list with the bond (if any) behind each edge.
fn assemble(
    mol: &Molecule,
    edges: Vec<(u32, u32, Option<usize>)>,
    node_featurizer: Option<&dyn AtomFeaturizer>,
    edge_featurizer: Option<&dyn BondFeaturizer>,
) -> Result<MolGraph> {
    let src = edges.iter().map(|e| e.0).collect();
    let dst = edges.iter().map(|e| e.1).collect();
    let mut graph = MolGraph::new(GraphTopology::new(mol.num_atoms(), src, dst)?);

    if let Some(featurizer) = node_featurizer {
        graph.set_ndata(featurizer.field(), featurizer.featurize(mol)?)?;
    }
    if let Some(featurizer) = edge_featurizer {
        let width = featurizer.feat_size();
        let mut data = Vec::with_capacity(edges.len() * width);
        for (_, _, bond) in &edges {
            match bond {
                Some(b) => data.extend(featurizer.featurize_bond(mol, *b)),
                None => data.extend(std::iter::repeat(0.0f32).take(width)),
            }
        }
        if data.len() != edges.len() * width {
            return Err(ChemError::Graph(format!(
                "edge featurizer '{}' produced rows of the wrong width",
                featurizer.field()
            )));
        }
        let feats = Tensor::from_vec(data, (edges.len(), width), &Device::Cpu)?;
        graph.set_edata(featurizer.field(), feats)?;
    }
    Ok(graph)
}

/// Every bond becomes two directed edges, `u -> v` then `v -> u`, in bond
/// order. Self loops, if requested, follow all bond edges.
#[derive(Debug, Clone, Default)]
pub struct BigraphConstructor {
    pub add_self_loop: bool,
}

impl BigraphConstructor {
    pub fn new(add_self_loop: bool) -> Self {
        Self { add_self_loop }
    }
}

impl GraphConstructor for BigraphConstructor {
    fn name(&self) -> &str {
        "bigraph"
    }

    fn build(
        &self,
        mol: &Molecule,
        node_featurizer: Option<&dyn AtomFeaturizer>,
        edge_featurizer: Option<&dyn BondFeaturizer>,
    ) -> Result<MolGraph> {
        let mut edges = Vec::with_capacity(2 * mol.num_bonds() + mol.num_atoms());
        for (i, bond) in mol.bonds().iter().enumerate() {
            let (u, v) = (bond.begin() as u32, bond.end() as u32);
            edges.push((u, v, Some(i)));
            edges.push((v, u, Some(i)));
        }
        if self.add_self_loop {
            edges.extend((0..mol.num_atoms() as u32).map(|n| (n, n, None)));
        }
        assemble(mol, edges, node_featurizer, edge_featurizer)
    }
}

/// Every ordered pair of distinct atoms is an edge, bonded or not.
#[derive(Debug, Clone, Default)]
pub struct CompleteGraphConstructor {
    pub add_self_loop: bool,
}

impl CompleteGraphConstructor {
    pub fn new(add_self_loop: bool) -> Self {
        Self { add_self_loop }
    }
}

impl GraphConstructor for CompleteGraphConstructor {
    fn name(&self) -> &str {
        "complete"
    }

    fn build(
        &self,
        mol: &Molecule,
        node_featurizer: Option<&dyn AtomFeaturizer>,
        edge_featurizer: Option<&dyn BondFeaturizer>,
    ) -> Result<MolGraph> {
        let n = mol.num_atoms();
        let mut bond_index = BTreeMap::new();
        for (i, b) in mol.bonds().iter().enumerate() {
            bond_index.insert((b.begin(), b.end()), i);
            bond_index.insert((b.end(), b.begin()), i);
        }

        let mut edges = Vec::with_capacity(n * n);
        for i in 0..n {
            for j in 0..n {
                if i != j || self.add_self_loop {
                    edges.push((i as u32, j as u32, bond_index.get(&(i, j)).copied()));
                }
            }
        }
        assemble(mol, edges, node_featurizer, edge_featurizer)
    }
}

/// Look up a constructor by its configuration name.
pub fn constructor_by_name(name: &str, add_self_loop: bool) -> Result<Box<dyn GraphConstructor>> {
    match name {
        "bigraph" => Ok(Box::new(BigraphConstructor::new(add_self_loop))),
        "complete" => Ok(Box::new(CompleteGraphConstructor::new(add_self_loop))),
        other => Err(ChemError::Graph(format!("unknown graph construction '{}'", other))),
    }
}

pub fn smiles_to_bigraph(
    smiles: &str,
    add_self_loop: bool,
    node_featurizer: Option<&dyn AtomFeaturizer>,
    edge_featurizer: Option<&dyn BondFeaturizer>,
) -> Result<MolGraph> {
    BigraphConstructor::new(add_self_loop).build_from_smiles(smiles, node_featurizer, edge_featurizer)
}

pub fn smiles_to_complete_graph(
    smiles: &str,
    add_self_loop: bool,
    node_featurizer: Option<&dyn AtomFeaturizer>,
    edge_featurizer: Option<&dyn BondFeaturizer>,
) -> Result<MolGraph> {
    CompleteGraphConstructor::new(add_self_loop).build_from_smiles(smiles, node_featurizer, edge_featurizer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::featurizer::{CanonicalAtomFeaturizer, CanonicalBondFeaturizer};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bigraph_edges() {
        let g = smiles_to_bigraph("CCO", false, None, None).unwrap();
        assert_eq!(g.num_nodes(), 3);
        assert_eq!(g.num_edges(), 4);
        let t = g.topology();
        for pair in t.src().chunks(2).zip(t.dst().chunks(2)) {
            let (s, d) = pair;
            assert_eq!((s[0], d[0]), (d[1], s[1]));
        }
        assert_eq!(t.in_degrees().iter().sum::<u32>(), 4);
    }

    #[test]
    fn test_self_loops_follow_bond_edges() {
        let g = smiles_to_bigraph("CCO", true, None, None).unwrap();
        assert_eq!(g.num_edges(), 7);
        let t = g.topology();
        assert_eq!(&t.src()[4..], &[0, 1, 2]);
        assert_eq!(&t.dst()[4..], &[0, 1, 2]);
    }

    #[test]
    fn test_complete_graph() {
        let g = smiles_to_complete_graph("CCO", false, None, None).unwrap();
        assert_eq!(g.num_edges(), 6);
        let g = smiles_to_complete_graph("CCO", true, None, None).unwrap();
        assert_eq!(g.num_edges(), 9);
    }

    #[test]
    fn test_features_attached() {
        let atoms = CanonicalAtomFeaturizer::new();
        let bonds = CanonicalBondFeaturizer::new();
        let g = smiles_to_bigraph("c1ccccc1O", true, Some(&atoms), Some(&bonds)).unwrap();
        assert_eq!(g.ndata("h").unwrap().dims(), &[7, 74]);
        assert_eq!(g.edata("e").unwrap().dims(), &[2 * 7 + 7, 12]);

        // self-loop edges carry zero bond features
        let e: Vec<Vec<f32>> = g.edata("e").unwrap().to_vec2().unwrap();
        assert!(e[14..].iter().all(|row| row.iter().all(|v| *v == 0.0)));
        // both directions of a bond share a row
        assert_eq!(e[0], e[1]);
    }

    #[test]
    fn test_ndata_lookup_is_not_destructive() {
        let atoms = CanonicalAtomFeaturizer::new();
        let mut g = smiles_to_bigraph("CCO", false, Some(&atoms), None).unwrap();
        assert!(g.ndata("h").is_some());
        assert!(g.ndata("h").is_some());

        let popped = g.pop_ndata("h").unwrap();
        assert_eq!(popped.dims(), &[3, 74]);
        assert!(g.ndata("h").is_none());
        assert!(g.pop_ndata("h").is_none());
    }

    #[test]
    fn test_set_ndata_checks_rows() {
        let mut g = smiles_to_bigraph("CCO", false, None, None).unwrap();
        let wrong = Tensor::zeros((2, 4), candle_core::DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(g.set_ndata("x", wrong), Err(ChemError::Graph(_))));
    }

    #[test]
    fn test_batch_offsets_and_data() {
        let atoms = CanonicalAtomFeaturizer::new();
        let a = smiles_to_bigraph("CCO", false, Some(&atoms), None).unwrap();
        let b = smiles_to_bigraph("CN", false, Some(&atoms), None).unwrap();
        let batched = MolGraph::batch(&[&a, &b]).unwrap();

        let t = batched.topology();
        assert_eq!(t.num_graphs(), 2);
        assert_eq!(t.num_nodes(), 5);
        assert_eq!(t.num_edges(), 6);
        assert_eq!(t.batch_num_nodes(), &[3, 2]);
        assert_eq!(t.node_offsets(), vec![0, 3]);
        assert_eq!(t.graph_ids(), vec![0, 0, 0, 1, 1]);
        assert!(t.src()[4..].iter().all(|s| *s >= 3));
        assert_eq!(batched.ndata("h").unwrap().dims(), &[5, 74]);
    }

    #[test]
    fn test_bad_topology_rejected() {
        assert!(GraphTopology::new(2, vec![0, 1], vec![1]).is_err());
        assert!(GraphTopology::new(2, vec![0, 2], vec![1, 0]).is_err());
        assert!(constructor_by_name("knn", false).is_err());
    }
}
