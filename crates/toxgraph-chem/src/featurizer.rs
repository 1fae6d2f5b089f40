//! Atom and bond featurizers.
//!
//! A featurizer turns every atom (or bond) of a [`Molecule`] into a fixed
//! width f32 row, and the rows of one molecule into a `[n, feat_size]`
//! tensor stored under the featurizer's field name.

use candle_core::{Device, Tensor};

use crate::error::{ChemError, Result};
use crate::molecule::{BondOrder, BondStereo, Hybridization, Molecule};

/// Per-atom featurization.
pub trait AtomFeaturizer: Send + Sync {
    /// Node-data key the features are stored under.
    fn field(&self) -> &str;

    fn feat_size(&self) -> usize;

    fn featurize_atom(&self, mol: &Molecule, atom: usize) -> Vec<f32>;

    /// `[num_atoms, feat_size]` on the CPU.
    fn featurize(&self, mol: &Molecule) -> Result<Tensor> {
        let rows = (0..mol.num_atoms()).map(|i| self.featurize_atom(mol, i));
        stack_rows(rows, mol.num_atoms(), self.feat_size())
    }
}

/// Per-bond featurization. One row per bond; graph constructors repeat it
/// for each directed edge the bond produces.
pub trait BondFeaturizer: Send + Sync {
    /// Edge-data key the features are stored under.
    fn field(&self) -> &str;

    fn feat_size(&self) -> usize;

    fn featurize_bond(&self, mol: &Molecule, bond: usize) -> Vec<f32>;

    /// `[num_bonds, feat_size]` on the CPU.
    fn featurize(&self, mol: &Molecule) -> Result<Tensor> {
        let rows = (0..mol.num_bonds()).map(|i| self.featurize_bond(mol, i));
        stack_rows(rows, mol.num_bonds(), self.feat_size())
    }
}

fn stack_rows(rows: impl Iterator<Item = Vec<f32>>, n: usize, width: usize) -> Result<Tensor> {
    let mut data = Vec::with_capacity(n * width);
    for (i, row) in rows.enumerate() {
        if row.len() != width {
            return Err(ChemError::Graph(format!(
                "feature row {} has {} values, expected {}",
                i,
                row.len(),
                width
            )));
        }
        data.extend(row);
    }
    Ok(Tensor::from_vec(data, (n, width), &Device::Cpu)?)
}

/// One-hot encode `value` against `allowable`. Values outside the set
/// encode as all zeros, or as a trailing slot when `encode_unknown` is set.
pub fn one_hot<T: PartialEq>(value: &T, allowable: &[T], encode_unknown: bool) -> Vec<f32> {
    let mut out: Vec<f32> = allowable
        .iter()
        .map(|a| if a == value { 1.0 } else { 0.0 })
        .collect();
    if encode_unknown {
        let known = allowable.iter().any(|a| a == value);
        out.push(if known { 0.0 } else { 1.0 });
    }
    out
}

// ── Canonical atom features ──────────────────────────────────────────────────

pub const CANONICAL_ATOM_SYMBOLS: [&str; 43] = [
    "C", "N", "O", "S", "F", "Si", "P", "Cl", "Br", "Mg", "Na", "Ca", "Fe", "As", "Al", "I", "B", "V", "K", "Tl",
    "Yb", "Sb", "Sn", "Ag", "Pd", "Co", "Se", "Ti", "Zn", "H", "Li", "Ge", "Cu", "Au", "Ni", "Cd", "In", "Mn", "Zr",
    "Cr", "Pt", "Hg", "Pb",
];

const CANONICAL_HYBRIDIZATIONS: [Hybridization; 5] = [
    Hybridization::SP,
    Hybridization::SP2,
    Hybridization::SP3,
    Hybridization::SP3D,
    Hybridization::SP3D2,
];

/// The default 74-wide atom featurization, stored under `"h"`:
///
/// | slice   | feature                          |
/// |---------|----------------------------------|
/// | 0..43   | atom type one-hot                |
/// | 43..54  | degree 0..=10                    |
/// | 54..61  | implicit valence 0..=6           |
/// | 61      | formal charge                    |
/// | 62      | radical electrons                |
/// | 63..68  | hybridization SP..SP3D2          |
/// | 68      | aromatic                         |
/// | 69..74  | total hydrogens 0..=4            |
#[derive(Debug, Clone)]
pub struct CanonicalAtomFeaturizer {
    field: String,
}

impl CanonicalAtomFeaturizer {
    pub const FEAT_SIZE: usize = 74;

    pub fn new() -> Self {
        Self::with_field("h")
    }

    pub fn with_field(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

impl Default for CanonicalAtomFeaturizer {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomFeaturizer for CanonicalAtomFeaturizer {
    fn field(&self) -> &str {
        &self.field
    }

    fn feat_size(&self) -> usize {
        Self::FEAT_SIZE
    }

    fn featurize_atom(&self, mol: &Molecule, atom: usize) -> Vec<f32> {
        let a = mol.atom(atom);
        let mut feats = Vec::with_capacity(Self::FEAT_SIZE);
        feats.extend(one_hot(&a.symbol(), &CANONICAL_ATOM_SYMBOLS, false));
        feats.extend(one_hot(&a.degree(), &(0..=10).collect::<Vec<_>>(), false));
        feats.extend(one_hot(&a.implicit_valence(), &(0..=6).collect::<Vec<_>>(), false));
        feats.push(a.formal_charge() as f32);
        feats.push(a.num_radical_electrons() as f32);
        feats.extend(one_hot(&a.hybridization(), &CANONICAL_HYBRIDIZATIONS, false));
        feats.push(if a.is_aromatic() { 1.0 } else { 0.0 });
        feats.extend(one_hot(&a.total_num_hs(), &(0..=4).collect::<Vec<_>>(), false));
        feats
    }
}

// ── Canonical bond features ──────────────────────────────────────────────────

const CANONICAL_BOND_ORDERS: [BondOrder; 4] = [
    BondOrder::Single,
    BondOrder::Double,
    BondOrder::Triple,
    BondOrder::Aromatic,
];

const CANONICAL_STEREO: [BondStereo; 6] = [
    BondStereo::None,
    BondStereo::Any,
    BondStereo::Z,
    BondStereo::E,
    BondStereo::Cis,
    BondStereo::Trans,
];

/// The default 12-wide bond featurization, stored under `"e"`: bond type
/// one-hot (4), conjugated, in ring, stereo one-hot (6).
#[derive(Debug, Clone)]
pub struct CanonicalBondFeaturizer {
    field: String,
}

impl CanonicalBondFeaturizer {
    pub const FEAT_SIZE: usize = 12;

    pub fn new() -> Self {
        Self::with_field("e")
    }

    pub fn with_field(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

impl Default for CanonicalBondFeaturizer {
    fn default() -> Self {
        Self::new()
    }
}

impl BondFeaturizer for CanonicalBondFeaturizer {
    fn field(&self) -> &str {
        &self.field
    }

    fn feat_size(&self) -> usize {
        Self::FEAT_SIZE
    }

    fn featurize_bond(&self, mol: &Molecule, bond: usize) -> Vec<f32> {
        let b = mol.bond(bond);
        let mut feats = Vec::with_capacity(Self::FEAT_SIZE);
        feats.extend(one_hot(&b.order(), &CANONICAL_BOND_ORDERS, false));
        feats.push(if b.is_conjugated() { 1.0 } else { 0.0 });
        feats.push(if b.is_in_ring() { 1.0 } else { 0.0 });
        feats.extend(one_hot(&b.stereo(), &CANONICAL_STEREO, false));
        feats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn atom_rows(smiles: &str) -> Vec<Vec<f32>> {
        let mol = Molecule::from_smiles(smiles).unwrap();
        CanonicalAtomFeaturizer::new().featurize(&mol).unwrap().to_vec2().unwrap()
    }

    #[test]
    fn test_one_hot() {
        assert_eq!(one_hot(&2, &[1, 2, 3], false), vec![0.0, 1.0, 0.0]);
        assert_eq!(one_hot(&9, &[1, 2, 3], false), vec![0.0, 0.0, 0.0]);
        assert_eq!(one_hot(&9, &[1, 2, 3], true), vec![0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_atom_feature_width() {
        let rows = atom_rows("CC(=O)Oc1ccccc1C(=O)O");
        assert_eq!(rows.len(), 13);
        assert!(rows.iter().all(|r| r.len() == 74));
    }

    #[test]
    fn test_benzene_atom_features() {
        for row in atom_rows("c1ccccc1") {
            assert_eq!(row[0], 1.0); // carbon
            assert_eq!(row[43 + 2], 1.0); // degree 2
            assert_eq!(row[54 + 1], 1.0); // one implicit H
            assert_eq!(row[63 + 1], 1.0); // SP2
            assert_eq!(row[68], 1.0); // aromatic
            assert_eq!(row[69 + 1], 1.0); // one H in total
            assert_eq!(row.iter().sum::<f32>(), 6.0);
        }
    }

    #[test]
    fn test_charge_and_radical_slots() {
        let rows = atom_rows("[NH4+]");
        assert_eq!(rows[0][61], 1.0);
        assert_eq!(rows[0][54], 1.0); // bracket atoms report no implicit valence
        assert_eq!(rows[0][69 + 4], 1.0);

        let rows = atom_rows("[CH3]");
        assert_eq!(rows[0][62], 1.0);
    }

    #[test]
    fn test_unlisted_element_has_empty_type_slot() {
        let rows = atom_rows("[Ba+2]");
        assert!(rows[0][..43].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_bond_features() {
        let mol = Molecule::from_smiles("C=CC").unwrap();
        let feats: Vec<Vec<f32>> = CanonicalBondFeaturizer::new().featurize(&mol).unwrap().to_vec2().unwrap();
        assert_eq!(feats.len(), 2);
        assert!(feats.iter().all(|r| r.len() == 12));
        let double = feats.iter().find(|r| r[1] == 1.0).unwrap();
        assert_eq!(double[4], 0.0); // not conjugated
        assert_eq!(double[5], 0.0); // not in a ring
        assert_eq!(double[6], 1.0); // no stereo

        let mol = Molecule::from_smiles("F/C=C/F").unwrap();
        let feats: Vec<Vec<f32>> = CanonicalBondFeaturizer::new().featurize(&mol).unwrap().to_vec2().unwrap();
        let double = feats.iter().find(|r| r[1] == 1.0).unwrap();
        assert_eq!(double[11], 1.0); // trans
    }
}
