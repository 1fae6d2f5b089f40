//! SMILES tokenizer and parser.
//!
//! Produces the raw atom and bond lists as written. Hydrogen folding,
//! aromaticity, implicit hydrogens and every other derived property are
//! computed afterwards by [`crate::molecule::Molecule`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::element::{self, Element, AROMATIC_SYMBOLS, ORGANIC_SUBSET};
use crate::error::{ChemError, Result};

/// Tetrahedral chirality tag as written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Chirality {
    #[default]
    Unspecified,
    /// `@`
    CounterClockwise,
    /// `@@`
    Clockwise,
    /// `@TH1`, `@SP2`, `@OH12`, ...
    Other,
}

#[derive(Debug, Clone)]
pub struct ParsedAtom {
    pub element: &'static Element,
    pub aromatic: bool,
    pub bracket: bool,
    pub isotope: Option<u16>,
    /// Hydrogen count inside brackets (always 0 outside).
    pub hcount: u8,
    pub charge: i8,
    pub chirality: Chirality,
    pub atom_map: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondSymbol {
    /// No symbol written between the atoms.
    Implicit,
    Single,
    Double,
    Triple,
    Quadruple,
    Aromatic,
    /// `/`
    Up,
    /// `\`
    Down,
}

impl BondSymbol {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'-' => Some(BondSymbol::Single),
            b'=' => Some(BondSymbol::Double),
            b'#' => Some(BondSymbol::Triple),
            b'$' => Some(BondSymbol::Quadruple),
            b':' => Some(BondSymbol::Aromatic),
            b'/' => Some(BondSymbol::Up),
            b'\\' => Some(BondSymbol::Down),
            _ => None,
        }
    }

    pub fn is_directional(self) -> bool {
        matches!(self, BondSymbol::Up | BondSymbol::Down)
    }
}

/// A bond as written. `first` is the atom that precedes the bond symbol in
/// the string (the ring-opening atom for ring closures).
#[derive(Debug, Clone)]
pub struct ParsedBond {
    pub first: usize,
    pub second: usize,
    pub symbol: BondSymbol,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedSmiles {
    pub atoms: Vec<ParsedAtom>,
    pub bonds: Vec<ParsedBond>,
}

/// Parse a SMILES string into its written atoms and bonds.
pub fn parse(smiles: &str) -> Result<ParsedSmiles> {
    Parser::new(smiles).run()
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    out: ParsedSmiles,
    prev: Option<usize>,
    branches: Vec<(usize, Option<usize>)>,
    pending: Option<(usize, BondSymbol)>,
    rings: HashMap<u16, (usize, Option<BondSymbol>, usize)>,
}

impl<'a> Parser<'a> {
    fn new(smiles: &'a str) -> Self {
        Self {
            input: smiles.trim().as_bytes(),
            pos: 0,
            out: ParsedSmiles::default(),
            prev: None,
            branches: Vec::new(),
            pending: None,
            rings: HashMap::new(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn run(mut self) -> Result<ParsedSmiles> {
        if self.input.is_empty() {
            return Err(ChemError::parse(0, "empty SMILES"));
        }

        while let Some(c) = self.peek() {
            match c {
                b'(' => {
                    if self.prev.is_none() {
                        return Err(ChemError::parse(self.pos, "branch opened before any atom"));
                    }
                    if self.pending.is_some() {
                        return Err(ChemError::parse(self.pos, "bond symbol before '('"));
                    }
                    self.branches.push((self.pos, self.prev));
                    self.pos += 1;
                }
                b')' => {
                    let (_, restored) = self
                        .branches
                        .pop()
                        .ok_or_else(|| ChemError::parse(self.pos, "unmatched ')'"))?;
                    if let Some((at, _)) = self.pending {
                        return Err(ChemError::parse(at, "bond symbol not followed by an atom"));
                    }
                    self.prev = restored;
                    self.pos += 1;
                }
                b'.' => {
                    if let Some((at, _)) = self.pending {
                        return Err(ChemError::parse(at, "bond symbol before '.'"));
                    }
                    self.prev = None;
                    self.pos += 1;
                }
                b'0'..=b'9' | b'%' => self.ring_closure()?,
                b'[' => {
                    let atom = self.bracket_atom()?;
                    self.push_atom(atom)?;
                }
                _ => {
                    if let Some(symbol) = BondSymbol::from_byte(c) {
                        if self.pending.is_some() {
                            return Err(ChemError::parse(self.pos, "two consecutive bond symbols"));
                        }
                        self.pending = Some((self.pos, symbol));
                        self.pos += 1;
                    } else {
                        let atom = self.organic_atom()?;
                        self.push_atom(atom)?;
                    }
                }
            }
        }

        if let Some((at, _)) = self.branches.last() {
            return Err(ChemError::parse(*at, "unclosed branch"));
        }
        if let Some((at, _)) = self.pending {
            return Err(ChemError::parse(at, "trailing bond symbol"));
        }
        if let Some((digit, (_, _, at))) = self.rings.iter().min_by_key(|(_, (_, _, at))| *at) {
            return Err(ChemError::parse(*at, format!("unclosed ring bond {}", digit)));
        }
        if self.out.atoms.is_empty() {
            return Err(ChemError::parse(0, "no atoms"));
        }

        Ok(self.out)
    }

    fn push_atom(&mut self, atom: ParsedAtom) -> Result<()> {
        let idx = self.out.atoms.len();
        self.out.atoms.push(atom);
        let pending = self.pending.take();
        match (self.prev, pending) {
            (Some(prev), pending) => {
                let symbol = pending.map(|(_, s)| s).unwrap_or(BondSymbol::Implicit);
                self.add_bond(prev, idx, symbol)?;
            }
            (None, Some((at, _))) => {
                return Err(ChemError::parse(at, "bond symbol without a preceding atom"));
            }
            (None, None) => {}
        }
        self.prev = Some(idx);
        Ok(())
    }

    fn add_bond(&mut self, first: usize, second: usize, symbol: BondSymbol) -> Result<()> {
        if first == second {
            return Err(ChemError::parse(self.pos, "atom bonded to itself"));
        }
        let duplicate = self.out.bonds.iter().any(|b| {
            (b.first == first && b.second == second) || (b.first == second && b.second == first)
        });
        if duplicate {
            return Err(ChemError::parse(self.pos, "duplicate bond between the same atoms"));
        }
        self.out.bonds.push(ParsedBond { first, second, symbol });
        Ok(())
    }

    fn ring_closure(&mut self) -> Result<()> {
        let start = self.pos;
        let number = if self.peek() == Some(b'%') {
            let (a, b) = (self.peek_at(1), self.peek_at(2));
            match (a, b) {
                (Some(a), Some(b)) if a.is_ascii_digit() && b.is_ascii_digit() => {
                    self.pos += 3;
                    ((a - b'0') as u16) * 10 + (b - b'0') as u16
                }
                _ => return Err(ChemError::parse(start, "'%' must be followed by two digits")),
            }
        } else {
            let d = self.input[self.pos] - b'0';
            self.pos += 1;
            d as u16
        };

        let current = self
            .prev
            .ok_or_else(|| ChemError::parse(start, "ring bond before any atom"))?;
        let symbol = self.pending.take().map(|(_, s)| s);

        match self.rings.remove(&number) {
            Some((opener, open_symbol, _)) => {
                let symbol = match (open_symbol, symbol) {
                    (Some(a), Some(b)) if a != b && !(a.is_directional() && b.is_directional()) => {
                        return Err(ChemError::parse(start, format!("conflicting bond symbols on ring bond {}", number)));
                    }
                    (Some(a), _) => a,
                    (None, Some(b)) => b,
                    (None, None) => BondSymbol::Implicit,
                };
                self.add_bond(opener, current, symbol)?;
            }
            None => {
                self.rings.insert(number, (current, symbol, start));
            }
        }
        Ok(())
    }

    fn organic_atom(&mut self) -> Result<ParsedAtom> {
        let start = self.pos;
        let c = self.input[self.pos];

        if c == b'*' {
            self.pos += 1;
            let e = element::by_atomic_number(0).ok_or_else(|| ChemError::UnknownElement("*".to_string()))?;
            return Ok(plain_atom(e, false));
        }

        // Two-letter organic symbols first.
        if let Some(next) = self.peek_at(1) {
            let two = [c, next];
            if let Ok(sym) = std::str::from_utf8(&two) {
                if sym == "Cl" || sym == "Br" {
                    self.pos += 2;
                    let e = element::by_symbol(sym).ok_or_else(|| ChemError::UnknownElement(sym.to_string()))?;
                    return Ok(plain_atom(e, false));
                }
            }
        }

        let sym = (c as char).to_string();
        if ORGANIC_SUBSET.contains(&sym.as_str()) {
            self.pos += 1;
            let e = element::by_symbol(&sym).ok_or_else(|| ChemError::UnknownElement(sym.clone()))?;
            return Ok(plain_atom(e, false));
        }
        if c.is_ascii_lowercase() && AROMATIC_SYMBOLS.contains(&sym.as_str()) {
            self.pos += 1;
            let upper = sym.to_ascii_uppercase();
            let e = element::by_symbol(&upper).ok_or(ChemError::UnknownElement(upper))?;
            return Ok(plain_atom(e, true));
        }

        Err(ChemError::parse(start, format!("unexpected character '{}'", c as char)))
    }

    fn bracket_atom(&mut self) -> Result<ParsedAtom> {
        let open = self.pos;
        self.pos += 1; // '['

        let isotope = self
            .number()?
            .map(u16::try_from)
            .transpose()
            .map_err(|_| ChemError::parse(open + 1, "isotope out of range"))?;

        let (element, aromatic) = self.bracket_symbol()?;

        let chirality = if self.peek() == Some(b'@') {
            self.pos += 1;
            if self.peek() == Some(b'@') {
                self.pos += 1;
                Chirality::Clockwise
            } else if self.peek().map(|c| c.is_ascii_uppercase() && c != b'H').unwrap_or(false) {
                // @TH1, @AL2, @SP3, @TB10, @OH25
                while self.peek().map(|c| c.is_ascii_uppercase()).unwrap_or(false) {
                    self.pos += 1;
                }
                self.number()?;
                Chirality::Other
            } else {
                Chirality::CounterClockwise
            }
        } else {
            Chirality::Unspecified
        };

        let hcount = if self.peek() == Some(b'H') {
            self.pos += 1;
            let count = self.number()?.unwrap_or(1);
            u8::try_from(count).map_err(|_| ChemError::parse(self.pos, "hydrogen count out of range"))?
        } else {
            0
        };

        let charge = match self.peek() {
            Some(sign @ (b'+' | b'-')) => {
                self.pos += 1;
                let unit: i32 = if sign == b'+' { 1 } else { -1 };
                if let Some(n) = self.number()? {
                    let n = i32::try_from(n).map_err(|_| ChemError::parse(open, "charge out of range"))?;
                    unit * n
                } else {
                    let mut total = unit;
                    while self.peek() == Some(sign) {
                        self.pos += 1;
                        total += unit;
                    }
                    total
                }
            }
            _ => 0,
        };
        let charge = i8::try_from(charge).map_err(|_| ChemError::parse(open, "charge out of range"))?;

        let atom_map = if self.peek() == Some(b':') {
            self.pos += 1;
            Some(self.number()?.ok_or_else(|| ChemError::parse(self.pos, "atom map class must be a number"))?)
        } else {
            None
        };

        if self.peek() != Some(b']') {
            return Err(ChemError::parse(self.pos, "expected ']' to close bracket atom"));
        }
        self.pos += 1;

        Ok(ParsedAtom {
            element,
            aromatic,
            bracket: true,
            isotope,
            hcount,
            charge,
            chirality,
            atom_map,
        })
    }

    fn bracket_symbol(&mut self) -> Result<(&'static Element, bool)> {
        let start = self.pos;
        let c = self.peek().ok_or_else(|| ChemError::parse(start, "unterminated bracket atom"))?;

        if c == b'*' {
            self.pos += 1;
            let e = element::by_atomic_number(0).ok_or_else(|| ChemError::UnknownElement("*".to_string()))?;
            return Ok((e, false));
        }

        if c.is_ascii_lowercase() {
            // Aromatic: try two letters (se, as, te) before one.
            for len in [2usize, 1] {
                if let Some(slice) = self.input.get(self.pos..self.pos + len) {
                    let sym = std::str::from_utf8(slice).unwrap_or("");
                    if AROMATIC_SYMBOLS.contains(&sym) {
                        self.pos += len;
                        let upper = capitalize(sym);
                        let e = element::by_symbol(&upper).ok_or(ChemError::UnknownElement(upper))?;
                        return Ok((e, true));
                    }
                }
            }
            return Err(ChemError::parse(start, "unknown aromatic symbol"));
        }

        if c.is_ascii_uppercase() {
            if let Some(next) = self.peek_at(1).filter(|n| n.is_ascii_lowercase()) {
                let sym = format!("{}{}", c as char, next as char);
                if let Some(e) = element::by_symbol(&sym) {
                    self.pos += 2;
                    return Ok((e, false));
                }
            }
            let sym = (c as char).to_string();
            let e = element::by_symbol(&sym).ok_or(ChemError::UnknownElement(sym))?;
            self.pos += 1;
            return Ok((e, false));
        }

        Err(ChemError::parse(start, format!("unexpected character '{}' in bracket atom", c as char)))
    }

    fn number(&mut self) -> Result<Option<u32>> {
        let start = self.pos;
        while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.pos += 1;
        }
        if self.pos == start {
            return Ok(None);
        }
        std::str::from_utf8(&self.input[start..self.pos])
            .ok()
            .and_then(|digits| digits.parse().ok())
            .map(Some)
            .ok_or_else(|| ChemError::parse(start, "number out of range"))
    }
}

fn plain_atom(element: &'static Element, aromatic: bool) -> ParsedAtom {
    ParsedAtom {
        element,
        aromatic,
        bracket: false,
        isotope: None,
        hcount: 0,
        charge: 0,
        chirality: Chirality::Unspecified,
        atom_map: None,
    }
}

fn capitalize(sym: &str) -> String {
    let mut chars = sym.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_and_branch() {
        let parsed = parse("CC(=O)O").unwrap();
        assert_eq!(parsed.atoms.len(), 4);
        assert_eq!(parsed.bonds.len(), 3);
        assert_eq!(parsed.bonds[1].symbol, BondSymbol::Double);
        assert_eq!((parsed.bonds[2].first, parsed.bonds[2].second), (1, 3));
    }

    #[test]
    fn test_ring_closure() {
        let parsed = parse("c1ccccc1").unwrap();
        assert_eq!(parsed.atoms.len(), 6);
        assert_eq!(parsed.bonds.len(), 6);
        assert!(parsed.atoms.iter().all(|a| a.aromatic));
        let closure = parsed.bonds.last().unwrap();
        assert_eq!((closure.first, closure.second), (0, 5));
    }

    #[test]
    fn test_percent_ring_numbers() {
        let parsed = parse("C%10CC%10").unwrap();
        assert_eq!(parsed.bonds.len(), 3);
    }

    #[test]
    fn test_bracket_atom_fields() {
        let parsed = parse("[13C@@H3+:5]").unwrap();
        let atom = &parsed.atoms[0];
        assert_eq!(atom.isotope, Some(13));
        assert_eq!(atom.element.symbol, "C");
        assert_eq!(atom.hcount, 3);
        assert_eq!(atom.charge, 1);
        assert_eq!(atom.chirality, Chirality::Clockwise);
        assert_eq!(atom.atom_map, Some(5));
    }

    #[test]
    fn test_charges() {
        assert_eq!(parse("[Fe+3]").unwrap().atoms[0].charge, 3);
        assert_eq!(parse("[O--]").unwrap().atoms[0].charge, -2);
        assert_eq!(parse("[NH4+]").unwrap().atoms[0].charge, 1);
    }

    #[test]
    fn test_two_letter_symbols() {
        let parsed = parse("ClCBr.[Na+].[se]1cccc1").unwrap();
        assert_eq!(parsed.atoms[0].element.symbol, "Cl");
        assert_eq!(parsed.atoms[2].element.symbol, "Br");
        assert_eq!(parsed.atoms[3].element.symbol, "Na");
        assert_eq!(parsed.atoms[4].element.symbol, "Se");
        assert!(parsed.atoms[4].aromatic);
        // the dot disconnects fragments
        assert_eq!(parsed.bonds.len(), 2 + 5);
    }

    #[test]
    fn test_directional_bonds() {
        let parsed = parse("F/C=C/F").unwrap();
        assert_eq!(parsed.bonds[0].symbol, BondSymbol::Up);
        assert_eq!(parsed.bonds[2].symbol, BondSymbol::Up);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse(""), Err(ChemError::Parse { .. })));
        assert!(matches!(parse("C(C"), Err(ChemError::Parse { .. })));
        assert!(matches!(parse("CC)"), Err(ChemError::Parse { .. })));
        assert!(matches!(parse("C1CC"), Err(ChemError::Parse { .. })));
        assert!(matches!(parse("C=="), Err(ChemError::Parse { .. })));
        assert!(matches!(parse("C11"), Err(ChemError::Parse { .. })));
        assert!(matches!(parse("CXC"), Err(ChemError::Parse { .. })));
        assert!(matches!(parse("[Xx]"), Err(ChemError::UnknownElement(_))));
    }

    #[test]
    fn test_bracket_numbers_out_of_range() {
        assert_eq!(parse("[65535C]").unwrap().atoms[0].isotope, Some(65535));
        assert!(matches!(parse("[65536C]"), Err(ChemError::Parse { .. })));
        assert!(matches!(parse("[99999999999C]"), Err(ChemError::Parse { .. })));

        assert_eq!(parse("[CH255]").unwrap().atoms[0].hcount, 255);
        assert!(matches!(parse("[CH256]"), Err(ChemError::Parse { .. })));

        assert!(matches!(parse("[C+4294967295]"), Err(ChemError::Parse { .. })));
    }
}
