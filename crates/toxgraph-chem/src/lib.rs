//! Chemistry toolkit for toxgraph.
//!
//! SMILES parsing, molecule perception, atom/bond featurization and
//! molecule-to-graph construction. Graph tensors are built on the CPU with
//! candle and moved to the model's device by the caller.

pub mod canon;
pub mod element;
pub mod error;
pub mod featurizer;
pub mod graph;
pub mod molecule;
pub mod smiles;

pub use error::{ChemError, Result};
pub use featurizer::{AtomFeaturizer, BondFeaturizer, CanonicalAtomFeaturizer, CanonicalBondFeaturizer};
pub use graph::{
    constructor_by_name, smiles_to_bigraph, smiles_to_complete_graph, BigraphConstructor, CompleteGraphConstructor,
    GraphConstructor, GraphTopology, MolGraph,
};
pub use molecule::{Atom, Bond, BondOrder, BondStereo, Hybridization, Molecule};
