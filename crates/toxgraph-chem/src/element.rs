//! Periodic table data needed for valence and hybridization perception.

/// A chemical element.
///
/// `valences` lists the allowed total valences in ascending order. An empty
/// list means the element takes any valence (metals, the `*` wildcard) and is
/// exempt from implicit-hydrogen assignment and valence checks.
#[derive(Debug, PartialEq, Eq)]
pub struct Element {
    pub symbol: &'static str,
    pub atomic_number: u8,
    pub outer_electrons: u8,
    pub valences: &'static [u8],
}

impl Element {
    const fn new(symbol: &'static str, atomic_number: u8, outer_electrons: u8, valences: &'static [u8]) -> Self {
        Self { symbol, atomic_number, outer_electrons, valences }
    }

    /// Lowest allowed valence that is at least `valence`.
    pub fn next_valence(&self, valence: u32) -> Option<u32> {
        self.valences.iter().map(|v| *v as u32).find(|v| *v >= valence)
    }

    pub fn max_valence(&self) -> Option<u32> {
        self.valences.last().map(|v| *v as u32)
    }

    /// Metals and the wildcard: no fixed valence model.
    pub fn is_valence_free(&self) -> bool {
        self.valences.is_empty()
    }

    pub fn is_wildcard(&self) -> bool {
        self.atomic_number == 0
    }
}

// Indexed by atomic number.
static ELEMENTS: &[Element] = &[
    Element::new("*", 0, 0, &[]),
    Element::new("H", 1, 1, &[1]),
    Element::new("He", 2, 2, &[0]),
    Element::new("Li", 3, 1, &[1]),
    Element::new("Be", 4, 2, &[2]),
    Element::new("B", 5, 3, &[3]),
    Element::new("C", 6, 4, &[4]),
    Element::new("N", 7, 5, &[3]),
    Element::new("O", 8, 6, &[2]),
    Element::new("F", 9, 7, &[1]),
    Element::new("Ne", 10, 8, &[0]),
    Element::new("Na", 11, 1, &[1]),
    Element::new("Mg", 12, 2, &[2]),
    Element::new("Al", 13, 3, &[3, 6]),
    Element::new("Si", 14, 4, &[4, 6]),
    Element::new("P", 15, 5, &[3, 5, 7]),
    Element::new("S", 16, 6, &[2, 4, 6]),
    Element::new("Cl", 17, 7, &[1, 3, 5, 7]),
    Element::new("Ar", 18, 8, &[0]),
    Element::new("K", 19, 1, &[1]),
    Element::new("Ca", 20, 2, &[2]),
    Element::new("Sc", 21, 3, &[]),
    Element::new("Ti", 22, 4, &[]),
    Element::new("V", 23, 5, &[]),
    Element::new("Cr", 24, 6, &[]),
    Element::new("Mn", 25, 7, &[]),
    Element::new("Fe", 26, 8, &[]),
    Element::new("Co", 27, 9, &[]),
    Element::new("Ni", 28, 10, &[]),
    Element::new("Cu", 29, 11, &[]),
    Element::new("Zn", 30, 2, &[]),
    Element::new("Ga", 31, 3, &[3]),
    Element::new("Ge", 32, 4, &[4]),
    Element::new("As", 33, 5, &[3, 5, 7]),
    Element::new("Se", 34, 6, &[2, 4, 6]),
    Element::new("Br", 35, 7, &[1, 3, 5, 7]),
    Element::new("Kr", 36, 8, &[0]),
    Element::new("Rb", 37, 1, &[1]),
    Element::new("Sr", 38, 2, &[2]),
    Element::new("Y", 39, 3, &[]),
    Element::new("Zr", 40, 4, &[]),
    Element::new("Nb", 41, 5, &[]),
    Element::new("Mo", 42, 6, &[]),
    Element::new("Tc", 43, 7, &[]),
    Element::new("Ru", 44, 8, &[]),
    Element::new("Rh", 45, 9, &[]),
    Element::new("Pd", 46, 10, &[]),
    Element::new("Ag", 47, 11, &[]),
    Element::new("Cd", 48, 2, &[]),
    Element::new("In", 49, 3, &[3]),
    Element::new("Sn", 50, 4, &[2, 4]),
    Element::new("Sb", 51, 5, &[3, 5, 7]),
    Element::new("Te", 52, 6, &[2, 4, 6]),
    Element::new("I", 53, 7, &[1, 3, 5, 7]),
    Element::new("Xe", 54, 8, &[0]),
    Element::new("Cs", 55, 1, &[1]),
    Element::new("Ba", 56, 2, &[2]),
    Element::new("La", 57, 3, &[]),
    Element::new("Ce", 58, 4, &[]),
    Element::new("Pr", 59, 5, &[]),
    Element::new("Nd", 60, 6, &[]),
    Element::new("Pm", 61, 7, &[]),
    Element::new("Sm", 62, 8, &[]),
    Element::new("Eu", 63, 9, &[]),
    Element::new("Gd", 64, 10, &[]),
    Element::new("Tb", 65, 11, &[]),
    Element::new("Dy", 66, 12, &[]),
    Element::new("Ho", 67, 13, &[]),
    Element::new("Er", 68, 14, &[]),
    Element::new("Tm", 69, 15, &[]),
    Element::new("Yb", 70, 16, &[]),
    Element::new("Lu", 71, 3, &[]),
    Element::new("Hf", 72, 4, &[]),
    Element::new("Ta", 73, 5, &[]),
    Element::new("W", 74, 6, &[]),
    Element::new("Re", 75, 7, &[]),
    Element::new("Os", 76, 8, &[]),
    Element::new("Ir", 77, 9, &[]),
    Element::new("Pt", 78, 10, &[]),
    Element::new("Au", 79, 11, &[]),
    Element::new("Hg", 80, 2, &[]),
    Element::new("Tl", 81, 3, &[1, 3]),
    Element::new("Pb", 82, 4, &[2, 4]),
    Element::new("Bi", 83, 5, &[3, 5]),
    Element::new("Po", 84, 6, &[2, 4, 6]),
    Element::new("At", 85, 7, &[1, 3, 5, 7]),
    Element::new("Rn", 86, 8, &[0]),
    Element::new("Fr", 87, 1, &[1]),
    Element::new("Ra", 88, 2, &[2]),
    Element::new("Ac", 89, 3, &[]),
    Element::new("Th", 90, 4, &[]),
    Element::new("Pa", 91, 5, &[]),
    Element::new("U", 92, 6, &[]),
];

/// Look up an element by its (case-sensitive) symbol.
pub fn by_symbol(symbol: &str) -> Option<&'static Element> {
    ELEMENTS.iter().find(|e| e.symbol == symbol)
}

pub fn by_atomic_number(z: i32) -> Option<&'static Element> {
    usize::try_from(z).ok().and_then(|z| ELEMENTS.get(z))
}

/// The element isoelectronic with `element` at the given formal charge.
///
/// Used for valence rules of charged atoms: N+ behaves like C, O- like F.
/// Valence-free elements and the wildcard are returned unchanged.
pub fn isoelectronic(element: &'static Element, charge: i8) -> &'static Element {
    if element.is_valence_free() || charge == 0 {
        return element;
    }
    match by_atomic_number(element.atomic_number as i32 - charge as i32) {
        Some(shifted) if !shifted.is_wildcard() => shifted,
        _ => element,
    }
}

/// Symbols allowed outside brackets.
pub const ORGANIC_SUBSET: &[&str] = &["B", "C", "N", "O", "P", "S", "F", "Cl", "Br", "I"];

/// Lowercase symbols allowed for aromatic atoms (bracketed or not).
pub const AROMATIC_SYMBOLS: &[&str] = &["b", "c", "n", "o", "p", "s", "se", "as", "te"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_indexed_by_atomic_number() {
        for (i, e) in ELEMENTS.iter().enumerate() {
            assert_eq!(e.atomic_number as usize, i, "{} out of place", e.symbol);
        }
    }

    #[test]
    fn test_isoelectronic_shift() {
        let n = by_symbol("N").unwrap();
        assert_eq!(isoelectronic(n, 1).symbol, "C");
        let o = by_symbol("O").unwrap();
        assert_eq!(isoelectronic(o, -1).symbol, "F");
        let fe = by_symbol("Fe").unwrap();
        assert_eq!(isoelectronic(fe, 3).symbol, "Fe");
    }

    #[test]
    fn test_next_valence() {
        let s = by_symbol("S").unwrap();
        assert_eq!(s.next_valence(3), Some(4));
        assert_eq!(s.next_valence(7), None);
        assert_eq!(s.max_valence(), Some(6));
    }
}
