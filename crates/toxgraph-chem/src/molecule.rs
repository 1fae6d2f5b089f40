//! Molecules built from SMILES, with the derived atom and bond properties
//! that featurizers consume.
//!
//! Perception runs once, in [`Molecule::from_smiles`]:
//! 1. plain explicit hydrogens are folded into their heavy neighbour
//! 2. ring bonds are found (every bond that is not a bridge)
//! 3. bond orders are resolved (implicit aromatic bonds only inside rings)
//! 4. implicit hydrogens, explicit valence, valence check, radicals
//! 5. conjugation, hybridization and double-bond stereo
//! 6. atoms are renumbered into canonical order

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::canon;
use crate::element::{self, Element};
use crate::error::{ChemError, Result};
use crate::smiles::{self, BondSymbol, Chirality, ParsedAtom, ParsedBond};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Quadruple,
    Aromatic,
}

impl BondOrder {
    /// Valence consumed on each endpoint, counting aromatic bonds as 1.
    /// The extra aromatic pi contribution is assigned per atom.
    fn sigma_valence(self) -> u32 {
        match self {
            BondOrder::Single | BondOrder::Aromatic => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
            BondOrder::Quadruple => 4,
        }
    }

    pub fn is_multiple(self) -> bool {
        matches!(self, BondOrder::Double | BondOrder::Triple | BondOrder::Quadruple)
    }

    /// Bond order as a number, 1.5 for aromatic.
    pub fn as_f64(self) -> f64 {
        match self {
            BondOrder::Single => 1.0,
            BondOrder::Double => 2.0,
            BondOrder::Triple => 3.0,
            BondOrder::Quadruple => 4.0,
            BondOrder::Aromatic => 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BondStereo {
    #[default]
    None,
    Any,
    Z,
    E,
    Cis,
    Trans,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Hybridization {
    #[default]
    Unspecified,
    S,
    SP,
    SP2,
    SP3,
    SP3D,
    SP3D2,
    Other,
}

impl Hybridization {
    fn from_steric_number(steric: i32) -> Self {
        match steric {
            i32::MIN..=1 => Hybridization::S,
            2 => Hybridization::SP,
            3 => Hybridization::SP2,
            4 => Hybridization::SP3,
            5 => Hybridization::SP3D,
            6 => Hybridization::SP3D2,
            _ => Hybridization::Other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Atom {
    element: &'static Element,
    aromatic: bool,
    formal_charge: i8,
    isotope: Option<u16>,
    chirality: Chirality,
    atom_map: Option<u32>,
    /// Set for bracket atoms: the hydrogen count is exactly what was written.
    no_implicit: bool,
    explicit_hs: u8,
    implicit_hs: u8,
    explicit_valence: u32,
    radical_electrons: u8,
    hybridization: Hybridization,
    degree: u8,
}

impl Atom {
    pub fn element(&self) -> &'static Element {
        self.element
    }

    pub fn symbol(&self) -> &'static str {
        self.element.symbol
    }

    pub fn atomic_number(&self) -> u8 {
        self.element.atomic_number
    }

    pub fn is_aromatic(&self) -> bool {
        self.aromatic
    }

    pub fn formal_charge(&self) -> i8 {
        self.formal_charge
    }

    pub fn isotope(&self) -> Option<u16> {
        self.isotope
    }

    pub fn chirality(&self) -> Chirality {
        self.chirality
    }

    pub fn atom_map(&self) -> Option<u32> {
        self.atom_map
    }

    /// Number of explicit neighbours in the molecule.
    pub fn degree(&self) -> usize {
        self.degree as usize
    }

    /// Implicit hydrogen count (always 0 for bracket atoms).
    pub fn implicit_valence(&self) -> u32 {
        self.implicit_hs as u32
    }

    /// Valence from bonds plus explicitly written hydrogens.
    pub fn explicit_valence(&self) -> u32 {
        self.explicit_valence
    }

    pub fn total_valence(&self) -> u32 {
        self.explicit_valence + self.implicit_hs as u32
    }

    pub fn total_num_hs(&self) -> u32 {
        self.explicit_hs as u32 + self.implicit_hs as u32
    }

    pub fn num_radical_electrons(&self) -> u32 {
        self.radical_electrons as u32
    }

    pub fn hybridization(&self) -> Hybridization {
        self.hybridization
    }

    fn lone_pairs(&self) -> i32 {
        let free = self.element.outer_electrons as i32
            - self.formal_charge as i32
            - self.total_valence() as i32
            - self.radical_electrons as i32;
        (free / 2).max(0)
    }
}

#[derive(Debug, Clone)]
pub struct Bond {
    begin: usize,
    end: usize,
    order: BondOrder,
    in_ring: bool,
    conjugated: bool,
    stereo: BondStereo,
}

impl Bond {
    pub fn begin(&self) -> usize {
        self.begin
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn order(&self) -> BondOrder {
        self.order
    }

    pub fn is_in_ring(&self) -> bool {
        self.in_ring
    }

    pub fn is_conjugated(&self) -> bool {
        self.conjugated
    }

    pub fn stereo(&self) -> BondStereo {
        self.stereo
    }

    /// The endpoint that is not `atom`.
    pub fn other(&self, atom: usize) -> usize {
        if self.begin == atom { self.end } else { self.begin }
    }
}

/// A perceived molecule in canonical atom order.
#[derive(Debug, Clone)]
pub struct Molecule {
    smiles: String,
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    /// Per atom: (neighbour, bond index)
    adjacency: Vec<Vec<(usize, usize)>>,
}

impl Molecule {
    /// Parse and perceive a molecule.
    ///
    /// Fails on malformed SMILES and on atoms whose valence exceeds what
    /// their element (shifted by formal charge) permits.
    pub fn from_smiles(smiles: &str) -> Result<Self> {
        let parsed = smiles::parse(smiles)?;
        let (atoms, bonds) = fold_explicit_hydrogens(parsed.atoms, parsed.bonds);

        let mut mol = Self::assemble(smiles, &atoms, &bonds);
        mol.normalize_nitro();
        mol.assign_hydrogens(&atoms)?;
        mol.assign_conjugation();
        mol.assign_hybridization();
        mol.assign_stereo(&bonds);

        let order = canon::canonical_order(&mol);
        let mol = mol.renumbered(&order);
        trace!("Perceived {}: {} atoms, {} bonds", smiles, mol.num_atoms(), mol.num_bonds());
        Ok(mol)
    }

    pub fn smiles(&self) -> &str {
        &self.smiles
    }

    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn num_bonds(&self) -> usize {
        self.bonds.len()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn atom(&self, idx: usize) -> &Atom {
        &self.atoms[idx]
    }

    pub fn bond(&self, idx: usize) -> &Bond {
        &self.bonds[idx]
    }

    pub fn neighbors(&self, atom: usize) -> impl Iterator<Item = usize> + '_ {
        self.adjacency[atom].iter().map(|(n, _)| *n)
    }

    /// (neighbour, bond index) pairs of an atom.
    pub fn atom_bonds(&self, atom: usize) -> &[(usize, usize)] {
        &self.adjacency[atom]
    }

    pub fn bond_between(&self, a: usize, b: usize) -> Option<&Bond> {
        self.adjacency[a]
            .iter()
            .find(|(n, _)| *n == b)
            .map(|(_, bond)| &self.bonds[*bond])
    }

    pub fn is_atom_in_ring(&self, atom: usize) -> bool {
        self.adjacency[atom].iter().any(|(_, b)| self.bonds[*b].in_ring)
    }

    /// Number of connected fragments (ions and salts give more than one).
    pub fn num_fragments(&self) -> usize {
        let mut seen = vec![false; self.atoms.len()];
        let mut fragments = 0;
        for start in 0..self.atoms.len() {
            if seen[start] {
                continue;
            }
            fragments += 1;
            let mut stack = vec![start];
            seen[start] = true;
            while let Some(u) = stack.pop() {
                for v in self.neighbors(u).collect::<Vec<_>>() {
                    if !seen[v] {
                        seen[v] = true;
                        stack.push(v);
                    }
                }
            }
        }
        fragments
    }

    // ── Perception ───────────────────────────────────────────────────────────

    fn assemble(smiles: &str, parsed_atoms: &[ParsedAtom], parsed_bonds: &[ParsedBond]) -> Self {
        let n = parsed_atoms.len();
        let mut adjacency = vec![Vec::new(); n];
        for (i, b) in parsed_bonds.iter().enumerate() {
            adjacency[b.first].push((b.second, i));
            adjacency[b.second].push((b.first, i));
        }
        let ring = ring_bonds(n, &adjacency, parsed_bonds.len());

        let bonds = parsed_bonds
            .iter()
            .enumerate()
            .map(|(i, b)| {
                let both_aromatic = parsed_atoms[b.first].aromatic && parsed_atoms[b.second].aromatic;
                let order = match b.symbol {
                    BondSymbol::Implicit if both_aromatic && ring[i] => BondOrder::Aromatic,
                    BondSymbol::Implicit | BondSymbol::Single | BondSymbol::Up | BondSymbol::Down => BondOrder::Single,
                    BondSymbol::Double => BondOrder::Double,
                    BondSymbol::Triple => BondOrder::Triple,
                    BondSymbol::Quadruple => BondOrder::Quadruple,
                    BondSymbol::Aromatic => BondOrder::Aromatic,
                };
                Bond {
                    begin: b.first,
                    end: b.second,
                    order,
                    in_ring: ring[i],
                    conjugated: false,
                    stereo: BondStereo::None,
                }
            })
            .collect();

        let atoms = parsed_atoms
            .iter()
            .enumerate()
            .map(|(i, a)| Atom {
                element: a.element,
                aromatic: a.aromatic,
                formal_charge: a.charge,
                isotope: a.isotope,
                chirality: a.chirality,
                atom_map: a.atom_map,
                no_implicit: a.bracket,
                explicit_hs: a.hcount,
                implicit_hs: 0,
                explicit_valence: 0,
                radical_electrons: 0,
                hybridization: Hybridization::Unspecified,
                degree: adjacency[i].len() as u8,
            })
            .collect();

        Self {
            smiles: smiles.to_string(),
            atoms,
            bonds,
            adjacency,
        }
    }

    /// Rewrite pentavalent nitro nitrogens `N(=O)=O` into the
    /// charge-separated `[N+](=O)[O-]`.
    fn normalize_nitro(&mut self) {
        for n in 0..self.atoms.len() {
            let atom = &self.atoms[n];
            if atom.atomic_number() != 7 || atom.formal_charge != 0 || atom.aromatic {
                continue;
            }
            let terminal_oxygens: Vec<(usize, usize)> = self.adjacency[n]
                .iter()
                .copied()
                .filter(|&(o, b)| {
                    self.bonds[b].order == BondOrder::Double
                        && self.atoms[o].atomic_number() == 8
                        && self.atoms[o].formal_charge == 0
                        && self.adjacency[o].len() == 1
                })
                .collect();
            if let [_, (oxygen, bond), ..] = terminal_oxygens[..] {
                self.bonds[bond].order = BondOrder::Single;
                self.atoms[n].formal_charge = 1;
                self.atoms[oxygen].formal_charge = -1;
            }
        }
    }

    fn assign_hydrogens(&mut self, parsed_atoms: &[ParsedAtom]) -> Result<()> {
        for i in 0..self.atoms.len() {
            let sigma: u32 = self.adjacency[i]
                .iter()
                .map(|(_, b)| self.bonds[*b].order.sigma_valence())
                .sum();
            let has_multiple = self.adjacency[i]
                .iter()
                .any(|(_, b)| self.bonds[*b].order.is_multiple());

            let atom = &self.atoms[i];
            let effective = element::isoelectronic(atom.element, atom.formal_charge);

            // Aromatic atoms either contribute one electron to the pi system
            // (one extra unit of valence) or a lone pair (none).
            let pi = if atom.aromatic && !has_multiple {
                if atom.no_implicit {
                    let with_h = sigma + atom.explicit_hs as u32;
                    u32::from(effective.valences.contains(&((with_h + 1) as u8)))
                } else {
                    let lowest = atom.element.valences.first().map(|v| *v as u32).unwrap_or(0);
                    u32::from(sigma + 1 <= lowest)
                }
            } else {
                0
            };

            let explicit_valence = sigma + pi + atom.explicit_hs as u32;
            let implicit_hs = if atom.no_implicit || atom.element.is_valence_free() {
                0
            } else {
                atom.element
                    .next_valence(explicit_valence)
                    .map(|target| target - explicit_valence)
                    .unwrap_or(0)
            };

            let total = explicit_valence + implicit_hs;
            if let Some(max) = effective.max_valence() {
                if total > max {
                    return Err(ChemError::Valence {
                        atom: i,
                        symbol: parsed_symbol(&parsed_atoms[i]),
                        valence: total,
                    });
                }
            }

            let radicals = if atom.no_implicit {
                radical_electrons(atom.element, atom.formal_charge, total)
            } else {
                0
            };

            let atom = &mut self.atoms[i];
            atom.explicit_valence = explicit_valence;
            atom.implicit_hs = implicit_hs as u8;
            atom.radical_electrons = radicals;
        }
        Ok(())
    }

    fn is_unsaturated(&self, atom: usize) -> bool {
        self.adjacency[atom].iter().any(|(_, b)| {
            let order = self.bonds[*b].order;
            order.is_multiple() || order == BondOrder::Aromatic
        })
    }

    /// N, O or S with a lone pair and only single bonds.
    fn is_lone_pair_donor(&self, atom: usize) -> bool {
        let a = &self.atoms[atom];
        matches!(a.atomic_number(), 7 | 8 | 16)
            && !self.is_unsaturated(atom)
            && a.lone_pairs() >= 1
    }

    fn assign_conjugation(&mut self) {
        let unsaturated: Vec<bool> = (0..self.atoms.len()).map(|i| self.is_unsaturated(i)).collect();
        let donor: Vec<bool> = (0..self.atoms.len()).map(|i| self.is_lone_pair_donor(i)).collect();

        let conjugated: Vec<bool> = self
            .bonds
            .iter()
            .enumerate()
            .map(|(idx, bond)| {
                let (a, b) = (bond.begin, bond.end);
                match bond.order {
                    BondOrder::Aromatic => true,
                    BondOrder::Single => {
                        (unsaturated[a] || donor[a]) && (unsaturated[b] || donor[b]) && (unsaturated[a] || unsaturated[b])
                    }
                    order => [a, b].iter().any(|&end| {
                        self.adjacency[end].iter().any(|&(k, other)| {
                            if other == idx {
                                return false;
                            }
                            let other_order = self.bonds[other].order;
                            if other_order == BondOrder::Single {
                                unsaturated[k] || donor[k]
                            } else {
                                // cumulated double bonds are not conjugated
                                !(order == BondOrder::Double && other_order == BondOrder::Double)
                            }
                        })
                    }),
                }
            })
            .collect();

        for (bond, c) in self.bonds.iter_mut().zip(conjugated) {
            bond.conjugated = c;
        }
    }

    fn assign_hybridization(&mut self) {
        let hybridization: Vec<Hybridization> = (0..self.atoms.len())
            .map(|i| {
                let atom = &self.atoms[i];
                if atom.element.is_wildcard() {
                    return Hybridization::Unspecified;
                }
                let total_degree = atom.degree() as i32 + atom.total_num_hs() as i32;
                if atom.element.is_valence_free() {
                    return Hybridization::from_steric_number(total_degree);
                }
                if atom.aromatic {
                    return Hybridization::SP2;
                }

                let lone_pairs = atom.lone_pairs();
                let mut steric = total_degree + lone_pairs;
                if steric == 4
                    && lone_pairs >= 1
                    && self.is_lone_pair_donor(i)
                    && self.neighbors(i).any(|n| self.is_unsaturated(n))
                {
                    // lone pair delocalised into a neighbouring pi system
                    steric = 3;
                }
                Hybridization::from_steric_number(steric)
            })
            .collect();

        for (atom, h) in self.atoms.iter_mut().zip(hybridization) {
            atom.hybridization = h;
        }
    }

    /// Cis/trans of double bonds with a directional bond on each side,
    /// relative to the neighbours that carry the markers.
    fn assign_stereo(&mut self, written: &[ParsedBond]) {
        let direction = |atom: usize, exclude: usize| -> Option<bool> {
            written.iter().enumerate().find_map(|(i, w)| {
                if i == exclude || !w.symbol.is_directional() {
                    return None;
                }
                let other_first = if w.second == atom {
                    true
                } else if w.first == atom {
                    false
                } else {
                    return None;
                };
                Some(other_first == (w.symbol == BondSymbol::Up))
            })
        };

        let stereo: Vec<(usize, BondStereo)> = self
            .bonds
            .iter()
            .enumerate()
            .filter(|(_, b)| b.order == BondOrder::Double)
            .filter_map(|(i, b)| {
                let up_begin = direction(b.begin, i)?;
                let up_end = direction(b.end, i)?;
                Some((i, if up_begin == up_end { BondStereo::Cis } else { BondStereo::Trans }))
            })
            .collect();

        for (i, s) in stereo {
            self.bonds[i].stereo = s;
        }
    }

    /// Reorder atoms so that `order[k]` becomes atom `k`. Bonds are re-keyed
    /// and sorted by their (lower, higher) endpoint pair.
    fn renumbered(self, order: &[usize]) -> Self {
        let mut new_index = vec![0usize; order.len()];
        for (new, &old) in order.iter().enumerate() {
            new_index[old] = new;
        }

        let atoms: Vec<Atom> = order.iter().map(|&old| self.atoms[old].clone()).collect();

        let mut bonds: Vec<Bond> = self
            .bonds
            .into_iter()
            .map(|mut b| {
                let (x, y) = (new_index[b.begin], new_index[b.end]);
                b.begin = x.min(y);
                b.end = x.max(y);
                b
            })
            .collect();
        bonds.sort_by_key(|b| (b.begin, b.end));

        let mut adjacency = vec![Vec::new(); atoms.len()];
        for (i, b) in bonds.iter().enumerate() {
            adjacency[b.begin].push((b.end, i));
            adjacency[b.end].push((b.begin, i));
        }
        for list in adjacency.iter_mut() {
            list.sort_unstable();
        }

        Self {
            smiles: self.smiles,
            atoms,
            bonds,
            adjacency,
        }
    }
}

fn parsed_symbol(atom: &ParsedAtom) -> String {
    if atom.aromatic {
        atom.element.symbol.to_ascii_lowercase()
    } else {
        atom.element.symbol.to_string()
    }
}

/// Radical electrons of a bracket atom from its outer shell, total valence
/// and charge. Valence-free elements never carry radicals.
fn radical_electrons(element: &Element, charge: i8, total_valence: u32) -> u8 {
    if element.is_valence_free() {
        return 0;
    }
    let outer = element.outer_electrons as i32;
    let total = total_valence as i32;
    let charge = charge as i32;
    let base = if element.atomic_number <= 2 { 2 } else { 8 };

    let mut radicals = base - outer - total + charge;
    if radicals < 0 {
        radicals = 0;
        if element.valences.len() > 1 {
            if let Some(v) = element
                .valences
                .iter()
                .map(|v| *v as i32)
                .find(|v| v - total + charge >= 0)
            {
                radicals = v - total + charge;
            }
        }
    }
    let limit = outer - total - charge;
    if limit >= 0 {
        radicals = radicals.min(limit);
    }
    radicals.clamp(0, u8::MAX as i32) as u8
}

/// Remove bracketed hydrogens that carry nothing but a single bond to a heavy
/// atom. Bracket neighbours gain an explicit H; organic-subset neighbours
/// recover it as an implicit H.
fn fold_explicit_hydrogens(mut atoms: Vec<ParsedAtom>, bonds: Vec<ParsedBond>) -> (Vec<ParsedAtom>, Vec<ParsedBond>) {
    let n = atoms.len();
    let mut remove = vec![false; n];

    for i in 0..n {
        let a = &atoms[i];
        let plain_h = a.element.atomic_number == 1
            && a.bracket
            && a.isotope.is_none()
            && a.charge == 0
            && a.hcount == 0
            && a.atom_map.is_none();
        if !plain_h {
            continue;
        }
        let touching: Vec<&ParsedBond> = bonds.iter().filter(|b| b.first == i || b.second == i).collect();
        if touching.len() != 1 {
            continue;
        }
        let bond = touching[0];
        let other = if bond.first == i { bond.second } else { bond.first };
        let single = matches!(
            bond.symbol,
            BondSymbol::Implicit | BondSymbol::Single | BondSymbol::Up | BondSymbol::Down
        );
        if single && atoms[other].element.atomic_number != 1 && !remove[other] {
            remove[i] = true;
        }
    }

    if !remove.iter().any(|r| *r) {
        return (atoms, bonds);
    }

    for b in &bonds {
        for (h, heavy) in [(b.first, b.second), (b.second, b.first)] {
            if remove[h] && atoms[heavy].bracket {
                atoms[heavy].hcount = atoms[heavy].hcount.saturating_add(1);
            }
        }
    }

    let mut new_index = vec![usize::MAX; n];
    let mut kept = Vec::with_capacity(n);
    for (i, a) in atoms.into_iter().enumerate() {
        if !remove[i] {
            new_index[i] = kept.len();
            kept.push(a);
        }
    }
    let bonds = bonds
        .into_iter()
        .filter(|b| !remove[b.first] && !remove[b.second])
        .map(|b| ParsedBond {
            first: new_index[b.first],
            second: new_index[b.second],
            symbol: b.symbol,
        })
        .collect();

    (kept, bonds)
}

/// Bonds that lie on a cycle: everything that is not a bridge.
fn ring_bonds(n: usize, adjacency: &[Vec<(usize, usize)>], num_bonds: usize) -> Vec<bool> {
    const UNSEEN: usize = usize::MAX;
    let mut disc = vec![UNSEEN; n];
    let mut low = vec![0usize; n];
    let mut bridge = vec![false; num_bonds];
    let mut timer = 0;

    for root in 0..n {
        if disc[root] != UNSEEN {
            continue;
        }
        disc[root] = timer;
        low[root] = timer;
        timer += 1;
        // (node, bond used to reach it, next adjacency slot)
        let mut stack: Vec<(usize, Option<usize>, usize)> = vec![(root, None, 0)];

        while let Some(top) = stack.len().checked_sub(1) {
            let (u, parent_bond, next) = stack[top];
            if next < adjacency[u].len() {
                stack[top].2 += 1;
                let (v, bond) = adjacency[u][next];
                if Some(bond) == parent_bond {
                    continue;
                }
                if disc[v] == UNSEEN {
                    disc[v] = timer;
                    low[v] = timer;
                    timer += 1;
                    stack.push((v, Some(bond), 0));
                } else {
                    low[u] = low[u].min(disc[v]);
                }
            } else {
                stack.pop();
                if let (Some(&(p, _, _)), Some(bond)) = (stack.last(), parent_bond) {
                    low[p] = low[p].min(low[u]);
                    if low[u] > disc[p] {
                        bridge[bond] = true;
                    }
                }
            }
        }
    }

    bridge.into_iter().map(|b| !b).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mol(smiles: &str) -> Molecule {
        Molecule::from_smiles(smiles).unwrap()
    }

    fn find(m: &Molecule, symbol: &str) -> usize {
        m.atoms().iter().position(|a| a.symbol() == symbol).unwrap()
    }

    #[test]
    fn test_ethanol_hydrogens() {
        let m = mol("CCO");
        let total_h: u32 = m.atoms().iter().map(|a| a.total_num_hs()).sum();
        assert_eq!(total_h, 6);
        let o = m.atom(find(&m, "O"));
        assert_eq!(o.implicit_valence(), 1);
        assert_eq!(o.hybridization(), Hybridization::SP3);
    }

    #[test]
    fn test_benzene_is_aromatic_ring() {
        let m = mol("c1ccccc1");
        assert!(m.bonds().iter().all(|b| b.order() == BondOrder::Aromatic && b.is_in_ring()));
        assert!(m.bonds().iter().all(|b| b.is_conjugated()));
        for atom in m.atoms() {
            assert_eq!(atom.total_num_hs(), 1);
            assert_eq!(atom.hybridization(), Hybridization::SP2);
        }
    }

    #[test]
    fn test_biphenyl_link_is_single() {
        let m = mol("c1ccccc1-c1ccccc1");
        let single: Vec<&Bond> = m.bonds().iter().filter(|b| b.order() == BondOrder::Single).collect();
        assert_eq!(single.len(), 1);
        assert!(!single[0].is_in_ring());
        assert!(single[0].is_conjugated());

        // the link also comes out single without the explicit '-'
        let m = mol("c1ccccc1c1ccccc1");
        assert_eq!(m.bonds().iter().filter(|b| b.order() == BondOrder::Single).count(), 1);
    }

    #[test]
    fn test_pyridine_and_pyrrole_nitrogens() {
        let m = mol("c1ccncc1");
        assert_eq!(m.atom(find(&m, "N")).total_num_hs(), 0);

        let m = mol("c1cc[nH]c1");
        let n = m.atom(find(&m, "N"));
        assert_eq!(n.total_num_hs(), 1);
        assert_eq!(n.implicit_valence(), 0);
        assert_eq!(n.num_radical_electrons(), 0);
    }

    #[test]
    fn test_bracket_atoms_have_no_implicit_h() {
        let m = mol("[NH4+]");
        let n = m.atom(0);
        assert_eq!(n.total_num_hs(), 4);
        assert_eq!(n.implicit_valence(), 0);
        assert_eq!(n.formal_charge(), 1);
        assert_eq!(n.num_radical_electrons(), 0);
    }

    #[test]
    fn test_radicals() {
        assert_eq!(mol("[CH3]").atom(0).num_radical_electrons(), 1);
        assert_eq!(mol("[O]").atom(0).num_radical_electrons(), 2);
        assert_eq!(mol("[Na+]").atom(0).num_radical_electrons(), 0);
        assert_eq!(mol("[Cl-]").atom(0).num_radical_electrons(), 0);
    }

    #[test]
    fn test_explicit_hydrogens_are_folded() {
        let m = mol("[H]C([H])([H])O");
        assert_eq!(m.num_atoms(), 2);
        let c = m.atom(find(&m, "C"));
        assert_eq!(c.total_num_hs(), 3);
        assert_eq!(c.implicit_valence(), 3);

        // H2 stays as two atoms
        assert_eq!(mol("[H][H]").num_atoms(), 2);
    }

    #[test]
    fn test_hybridization() {
        let m = mol("CC#N");
        assert_eq!(m.atom(find(&m, "N")).hybridization(), Hybridization::SP);

        let m = mol("CC(=O)C");
        let o = find(&m, "O");
        assert_eq!(m.atom(o).hybridization(), Hybridization::SP2);
        let carbonyl = m.neighbors(o).next().unwrap();
        assert_eq!(m.atom(carbonyl).hybridization(), Hybridization::SP2);

        // amide nitrogen is planar
        let m = mol("CC(=O)N");
        assert_eq!(m.atom(find(&m, "N")).hybridization(), Hybridization::SP2);

        // amine nitrogen is not
        let m = mol("CCN");
        assert_eq!(m.atom(find(&m, "N")).hybridization(), Hybridization::SP3);

        let m = mol("[O-][N+](=O)C");
        assert_eq!(m.atom(find(&m, "N")).hybridization(), Hybridization::SP2);
    }

    #[test]
    fn test_conjugation() {
        let m = mol("CC(=O)C");
        assert!(m.bonds().iter().all(|b| !b.is_conjugated()));

        let m = mol("C=CC=C");
        assert!(m.bonds().iter().all(|b| b.is_conjugated()));
    }

    #[test]
    fn test_valence_errors() {
        assert!(matches!(Molecule::from_smiles("C(C)(C)(C)(C)C"), Err(ChemError::Valence { .. })));
        assert!(matches!(Molecule::from_smiles("CN(C)(C)C"), Err(ChemError::Valence { .. })));
        // charged nitrogen may carry four bonds
        assert!(Molecule::from_smiles("C[N+](C)(C)C").is_ok());
        // pentavalent nitro notation is charge-separated
        let m = mol("CN(=O)=O");
        let n = m.atom(find(&m, "N"));
        assert_eq!(n.formal_charge(), 1);
        assert_eq!(n.hybridization(), Hybridization::SP2);
        let charges: i32 = m.atoms().iter().map(|a| a.formal_charge() as i32).sum();
        assert_eq!(charges, 0);
    }

    #[test]
    fn test_double_bond_stereo() {
        let trans = mol("F/C=C/F");
        let db = trans.bonds().iter().find(|b| b.order() == BondOrder::Double).unwrap();
        assert_eq!(db.stereo(), BondStereo::Trans);

        let cis = mol("F/C=C\\F");
        let db = cis.bonds().iter().find(|b| b.order() == BondOrder::Double).unwrap();
        assert_eq!(db.stereo(), BondStereo::Cis);

        let plain = mol("FC=CF");
        assert!(plain.bonds().iter().all(|b| b.stereo() == BondStereo::None));
    }

    #[test]
    fn test_fragments_and_rings() {
        let m = mol("[Na+].[Cl-]");
        assert_eq!(m.num_fragments(), 2);
        assert_eq!(m.num_bonds(), 0);

        let m = mol("C1CC1C");
        assert_eq!(m.bonds().iter().filter(|b| b.is_in_ring()).count(), 3);
        assert_eq!((0..m.num_atoms()).filter(|i| m.is_atom_in_ring(*i)).count(), 3);
    }
}
