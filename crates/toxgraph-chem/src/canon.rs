//! Canonical atom ranking.
//!
//! Atoms start from an invariant tuple and are refined by their sorted
//! neighbour ranks until the partition stops splitting. Remaining ties are
//! broken one at a time (lowest index of the lowest tied class wins) and the
//! refinement is repeated until every rank is distinct.

use crate::molecule::{BondOrder, Molecule};

type Invariant = (u8, u16, usize, u32, i8, bool);

fn invariant(mol: &Molecule, atom: usize) -> Invariant {
    let a = mol.atom(atom);
    (
        a.atomic_number(),
        a.isotope().unwrap_or(0),
        a.degree(),
        a.total_num_hs(),
        a.formal_charge(),
        a.is_aromatic(),
    )
}

fn bond_code(order: BondOrder) -> u8 {
    match order {
        BondOrder::Single => 1,
        BondOrder::Double => 2,
        BondOrder::Triple => 3,
        BondOrder::Quadruple => 4,
        BondOrder::Aromatic => 5,
    }
}

/// Dense ranks (0, 1, 2, ...) of `keys` in sorted order, equal keys sharing a rank.
fn dense_ranks<T: Ord>(keys: &[T]) -> Vec<usize> {
    let mut sorted: Vec<&T> = keys.iter().collect();
    sorted.sort();
    sorted.dedup();
    keys.iter()
        .map(|k| sorted.binary_search(&k).unwrap_or_default())
        .collect()
}

fn distinct(ranks: &[usize]) -> usize {
    ranks.iter().max().map(|m| m + 1).unwrap_or(0)
}

fn refine(mol: &Molecule, ranks: Vec<usize>) -> Vec<usize> {
    let mut current = ranks;
    loop {
        let keys: Vec<(usize, Vec<(usize, u8)>)> = (0..mol.num_atoms())
            .map(|i| {
                let mut around: Vec<(usize, u8)> = mol
                    .atom_bonds(i)
                    .iter()
                    .map(|&(n, b)| (current[n], bond_code(mol.bond(b).order())))
                    .collect();
                around.sort_unstable();
                (current[i], around)
            })
            .collect();
        let next = dense_ranks(&keys);
        if distinct(&next) == distinct(&current) {
            return next;
        }
        current = next;
    }
}

/// One distinct rank per atom.
pub fn canonical_ranks(mol: &Molecule) -> Vec<usize> {
    let n = mol.num_atoms();
    let invariants: Vec<Invariant> = (0..n).map(|i| invariant(mol, i)).collect();
    let mut ranks = refine(mol, dense_ranks(&invariants));

    while distinct(&ranks) < n {
        let mut counts = vec![0usize; n];
        for r in &ranks {
            counts[*r] += 1;
        }
        let Some(tied) = counts.iter().position(|c| *c > 1) else {
            break;
        };
        let Some(pick) = ranks.iter().position(|r| *r == tied) else {
            break;
        };
        let mut split: Vec<usize> = ranks.iter().map(|r| r * 2 + 1).collect();
        split[pick] -= 1;
        ranks = refine(mol, dense_ranks(&split));
    }
    ranks
}

/// Atom indices in canonical order: `order[k]` is the atom ranked `k`.
pub fn canonical_order(mol: &Molecule) -> Vec<usize> {
    let ranks = canonical_ranks(mol);
    let mut order: Vec<usize> = (0..ranks.len()).collect();
    order.sort_by_key(|&atom| ranks[atom]);
    order
}
