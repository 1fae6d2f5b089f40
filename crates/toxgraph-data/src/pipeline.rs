//! SMILES → featurized graph pipeline shared by every dataset.

use toxgraph_chem::{
    constructor_by_name, AtomFeaturizer, BigraphConstructor, BondFeaturizer, CanonicalAtomFeaturizer,
    CanonicalBondFeaturizer, GraphConstructor, MolGraph,
};
use toxgraph_common::DatasetConfig;

use crate::error::Result;

/// A graph constructor plus the featurizers it attaches.
pub struct GraphPipeline {
    constructor: Box<dyn GraphConstructor>,
    node_featurizer: Option<Box<dyn AtomFeaturizer>>,
    edge_featurizer: Option<Box<dyn BondFeaturizer>>,
}

impl GraphPipeline {
    pub fn new(constructor: impl GraphConstructor + 'static) -> Self {
        Self {
            constructor: Box::new(constructor),
            node_featurizer: None,
            edge_featurizer: None,
        }
    }

    pub fn with_node_featurizer(mut self, featurizer: impl AtomFeaturizer + 'static) -> Self {
        self.node_featurizer = Some(Box::new(featurizer));
        self
    }

    pub fn with_edge_featurizer(mut self, featurizer: impl BondFeaturizer + 'static) -> Self {
        self.edge_featurizer = Some(Box::new(featurizer));
        self
    }

    /// Pipeline described by the `[dataset]` config section. Canonical atom
    /// features are always attached; bond features only on request.
    pub fn from_config(config: &DatasetConfig) -> Result<Self> {
        let constructor = constructor_by_name(&config.graph, config.self_loop)?;
        let edge_featurizer: Option<Box<dyn BondFeaturizer>> = if config.bond_features {
            Some(Box::new(CanonicalBondFeaturizer::new()))
        } else {
            None
        };
        Ok(Self {
            constructor,
            node_featurizer: Some(Box::new(CanonicalAtomFeaturizer::new())),
            edge_featurizer,
        })
    }

    pub fn constructor_name(&self) -> &str {
        self.constructor.name()
    }

    pub fn node_field(&self) -> Option<&str> {
        self.node_featurizer.as_deref().map(|f| f.field())
    }

    pub fn build(&self, smiles: &str) -> toxgraph_chem::Result<MolGraph> {
        self.constructor
            .build_from_smiles(smiles, self.node_featurizer.as_deref(), self.edge_featurizer.as_deref())
    }
}

impl Default for GraphPipeline {
    /// Bigraph without self loops and canonical atom features under `"h"`.
    fn default() -> Self {
        Self::new(BigraphConstructor::new(false)).with_node_featurizer(CanonicalAtomFeaturizer::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pipeline() {
        let pipeline = GraphPipeline::default();
        assert_eq!(pipeline.constructor_name(), "bigraph");
        assert_eq!(pipeline.node_field(), Some("h"));

        let g = pipeline.build("CCO").unwrap();
        assert_eq!(g.ndata("h").unwrap().dims(), &[3, 74]);
        assert!(g.edata("e").is_none());
    }

    #[test]
    fn test_pipeline_from_config() {
        let config = DatasetConfig {
            graph: "complete".to_string(),
            bond_features: true,
            ..DatasetConfig::default()
        };
        let pipeline = GraphPipeline::from_config(&config).unwrap();
        let g = pipeline.build("CCO").unwrap();
        assert_eq!(g.num_edges(), 6);
        assert_eq!(g.edata("e").unwrap().dims(), &[6, 12]);
    }
}
