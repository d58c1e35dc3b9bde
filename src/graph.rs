//! In-memory molecular graph produced by SMILES parsing.
//!
//! A [`MolGraph`] is owned transiently during one augmentation or evaluation
//! call and never persisted.

use compact_str::CompactString;

/// Bond order between two atoms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BondKind {
    Single,
    Double,
    Triple,
    Aromatic,
}

/// A single atom node.
///
/// Bracket atoms keep their full bracket expression so that charge, isotope
/// and chirality survive a render round trip without being interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    /// Uppercase element symbol ("C", "Br", "*").
    pub symbol: CompactString,
    pub aromatic: bool,
    /// Full bracket expression ("[C@@H]") for bracket atoms, None otherwise.
    pub bracket: Option<CompactString>,
}

impl Atom {
    /// The text this atom contributes to a rendered SMILES string.
    pub(crate) fn smiles_text(&self) -> CompactString {
        if let Some(bracket) = &self.bracket {
            bracket.clone()
        } else if self.aromatic {
            CompactString::from(self.symbol.to_lowercase())
        } else {
            self.symbol.clone()
        }
    }
}

/// An undirected bond between atoms `a` and `b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bond {
    pub a: usize,
    pub b: usize,
    pub kind: BondKind,
}

/// Structural graph of one molecule: atoms plus undirected bonds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MolGraph {
    pub atoms: Vec<Atom>,
    pub bonds: Vec<Bond>,
}

impl MolGraph {
    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    /// Adjacency list where each entry is `(neighbor, bond kind, bond index)`.
    pub(crate) fn adjacency(&self) -> Vec<Vec<(usize, BondKind, usize)>> {
        let mut adj = vec![Vec::new(); self.atoms.len()];
        for (e, bond) in self.bonds.iter().enumerate() {
            adj[bond.a].push((bond.b, bond.kind, e));
            adj[bond.b].push((bond.a, bond.kind, e));
        }
        adj
    }

    pub fn degree(&self, atom: usize) -> usize {
        self.bonds
            .iter()
            .filter(|b| b.a == atom || b.b == atom)
            .count()
    }

    /// Renumber atoms so that new atom `i` is old atom `order[i]`.
    ///
    /// `order` must be a permutation of `0..atom_count()`; callers are
    /// expected to validate it first (see `StructureCodec::reorder`).
    pub(crate) fn renumber(&self, order: &[usize]) -> MolGraph {
        debug_assert_eq!(order.len(), self.atoms.len());

        let mut new_index = vec![0usize; self.atoms.len()];
        for (new, &old) in order.iter().enumerate() {
            new_index[old] = new;
        }

        let atoms = order.iter().map(|&old| self.atoms[old].clone()).collect();
        let bonds = self
            .bonds
            .iter()
            .map(|b| Bond {
                a: new_index[b.a],
                b: new_index[b.b],
                kind: b.kind,
            })
            .collect();

        MolGraph { atoms, bonds }
    }
}
