//! SMILES parsing, rendering and atom renumbering.
//!
//! [`StructureCodec`] is the seam between the encoding pipeline and the
//! structure library; [`SmilesCodec`] is the built-in implementation covering
//! the SMILES subset produced by the atom-level token pattern: organic-subset
//! and bracket atoms, bonds, branches, dot-separated components and ring
//! closures. Bracket atoms are kept as opaque text so charge, isotope and
//! chirality survive a round trip without being interpreted.

use compact_str::CompactString;
use fancy_regex::Regex;
use thiserror::Error;

use crate::constants::SMILES_ATOM_PATTERN;
use crate::graph::{Atom, Bond, BondKind, MolGraph};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("empty SMILES input")]
    EmptyInput,

    #[error("unexpected token '{token}' at position {pos}")]
    UnexpectedToken { token: String, pos: usize },

    #[error("bond or ring closure has no preceding atom at position {pos}")]
    DanglingBond { pos: usize },

    #[error("unbalanced '{paren}' in branch structure")]
    UnbalancedBranch { paren: char },

    #[error("ring closure {index} opened but never closed")]
    UnclosedRing { index: u16 },

    #[error("more than 99 ring closures open at once")]
    RingIndexOverflow,

    #[error("atom order of length {got} is not a permutation of 0..{expected}")]
    BadPermutation { got: usize, expected: usize },
}

/// Contract the encoding pipeline requires from a structure library.
///
/// Each operation either succeeds or fails explicitly; no partial results.
pub trait StructureCodec {
    /// Parse a SMILES string into a structural graph.
    fn parse(&self, smiles: &str) -> Result<MolGraph, CodecError>;

    /// Render a graph back to a SMILES string, canonically or in the graph's
    /// current atom order.
    fn render(&self, graph: &MolGraph, canonical: bool) -> Result<String, CodecError>;

    /// Renumber atoms so that new atom `i` is old atom `order[i]`.
    fn reorder(&self, graph: &MolGraph, order: &[usize]) -> Result<MolGraph, CodecError>;
}

/// Built-in SMILES codec.
pub struct SmilesCodec {
    pattern: Regex,
}

impl Default for SmilesCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl SmilesCodec {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(SMILES_ATOM_PATTERN).expect("Invalid SMILES pattern"),
        }
    }
}

impl StructureCodec for SmilesCodec {
    fn parse(&self, smiles: &str) -> Result<MolGraph, CodecError> {
        parse_smiles(smiles, &self.pattern)
    }

    fn render(&self, graph: &MolGraph, canonical: bool) -> Result<String, CodecError> {
        render_smiles(graph, canonical)
    }

    fn reorder(&self, graph: &MolGraph, order: &[usize]) -> Result<MolGraph, CodecError> {
        let n = graph.atom_count();
        if order.len() != n {
            return Err(CodecError::BadPermutation {
                got: order.len(),
                expected: n,
            });
        }
        let mut seen = vec![false; n];
        for &i in order {
            if i >= n || seen[i] {
                return Err(CodecError::BadPermutation {
                    got: order.len(),
                    expected: n,
                });
            }
            seen[i] = true;
        }
        Ok(graph.renumber(order))
    }
}

// ------------------------ Parsing ------------------------

/// Default bond kind between two atoms when no symbol is written.
fn implicit_bond(graph: &MolGraph, a: usize, b: usize) -> BondKind {
    if graph.atoms[a].aromatic && graph.atoms[b].aromatic {
        BondKind::Aromatic
    } else {
        BondKind::Single
    }
}

/// Extract the element symbol and aromaticity from a bracket expression.
fn bracket_element(bracket: &str) -> (CompactString, bool) {
    let inner = bracket.trim_start_matches('[').trim_end_matches(']');
    let body: &str = inner.trim_start_matches(|c: char| c.is_ascii_digit());

    let mut chars = body.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            let aromatic = first.is_ascii_lowercase();
            let mut symbol = String::new();
            symbol.push(first.to_ascii_uppercase());
            // Two-letter elements: uppercase followed by lowercase (Cl, Br, Si ...)
            if first.is_ascii_uppercase() {
                if let Some(second) = chars.next() {
                    if second.is_ascii_lowercase() {
                        symbol.push(second);
                    }
                }
            }
            (CompactString::from(symbol), aromatic)
        }
        _ => (CompactString::from("*"), false),
    }
}

fn parse_smiles(smiles: &str, pattern: &Regex) -> Result<MolGraph, CodecError> {
    let mut graph = MolGraph::default();
    let mut prev: Option<usize> = None;
    let mut branch_stack: Vec<Option<usize>> = Vec::new();
    let mut pending_bond: Option<BondKind> = None;
    // ring number -> (opening atom, bond symbol written at the opening)
    let mut open_rings: Vec<(u16, usize, Option<BondKind>)> = Vec::new();

    let mut expected_pos = 0usize;
    for m in pattern.find_iter(smiles).flatten() {
        if m.start() != expected_pos {
            return Err(CodecError::UnexpectedToken {
                token: smiles[expected_pos..m.start()].to_string(),
                pos: expected_pos,
            });
        }
        expected_pos = m.end();

        let token = m.as_str();
        let pos = m.start();
        match token {
            "(" => branch_stack.push(prev),
            ")" => {
                prev = branch_stack
                    .pop()
                    .ok_or(CodecError::UnbalancedBranch { paren: ')' })?;
            }
            "." => {
                if pending_bond.is_some() {
                    return Err(CodecError::DanglingBond { pos });
                }
                prev = None;
            }
            "-" | "/" | "\\" | "~" => pending_bond = Some(BondKind::Single),
            "=" => pending_bond = Some(BondKind::Double),
            "#" => pending_bond = Some(BondKind::Triple),
            ":" => pending_bond = Some(BondKind::Aromatic),
            _ if token.starts_with('%') || token.chars().all(|c| c.is_ascii_digit()) => {
                let number: u16 = token
                    .trim_start_matches('%')
                    .parse()
                    .map_err(|_| CodecError::UnexpectedToken {
                        token: token.to_string(),
                        pos,
                    })?;
                let here = prev.ok_or(CodecError::DanglingBond { pos })?;
                if let Some(slot) = open_rings.iter().position(|&(n, _, _)| n == number) {
                    let (_, other, open_kind) = open_rings.swap_remove(slot);
                    let kind = pending_bond
                        .take()
                        .or(open_kind)
                        .unwrap_or_else(|| implicit_bond(&graph, other, here));
                    graph.bonds.push(Bond {
                        a: other,
                        b: here,
                        kind,
                    });
                } else {
                    open_rings.push((number, here, pending_bond.take()));
                }
            }
            _ => {
                let atom = if token.starts_with('[') {
                    let (symbol, aromatic) = bracket_element(token);
                    Atom {
                        symbol,
                        aromatic,
                        bracket: Some(CompactString::from(token)),
                    }
                } else if token == "*" {
                    Atom {
                        symbol: CompactString::from("*"),
                        aromatic: false,
                        bracket: None,
                    }
                } else if token.chars().all(|c| c.is_ascii_alphabetic()) {
                    let aromatic = token.chars().all(|c| c.is_ascii_lowercase());
                    Atom {
                        symbol: CompactString::from(token.to_uppercase()),
                        aromatic,
                        bracket: None,
                    }
                } else {
                    return Err(CodecError::UnexpectedToken {
                        token: token.to_string(),
                        pos,
                    });
                };

                graph.atoms.push(atom);
                let here = graph.atoms.len() - 1;
                if let Some(p) = prev {
                    let kind = pending_bond
                        .take()
                        .unwrap_or_else(|| implicit_bond(&graph, p, here));
                    graph.bonds.push(Bond {
                        a: p,
                        b: here,
                        kind,
                    });
                }
                prev = Some(here);
            }
        }
    }

    if expected_pos != smiles.len() {
        return Err(CodecError::UnexpectedToken {
            token: smiles[expected_pos..].to_string(),
            pos: expected_pos,
        });
    }
    if !branch_stack.is_empty() {
        return Err(CodecError::UnbalancedBranch { paren: '(' });
    }
    if pending_bond.is_some() {
        return Err(CodecError::DanglingBond { pos: smiles.len() });
    }
    if let Some(&(number, _, _)) = open_rings.first() {
        return Err(CodecError::UnclosedRing { index: number });
    }
    if graph.atoms.is_empty() {
        return Err(CodecError::EmptyInput);
    }

    Ok(graph)
}

// ------------------------ Canonical ranking ------------------------

/// Map arbitrary ordered keys to dense ranks 0..k.
fn dense_ranks<K: Ord + Clone>(keys: &[K]) -> Vec<usize> {
    let mut sorted: Vec<K> = keys.to_vec();
    sorted.sort();
    sorted.dedup();
    keys.iter()
        .map(|k| sorted.binary_search(k).unwrap())
        .collect()
}

fn class_count(ranks: &[usize]) -> usize {
    ranks.iter().copied().max().map_or(0, |m| m + 1)
}

/// Refine ranks with sorted (bond kind, neighbor rank) signatures until the
/// partition stops splitting.
fn refine(adj: &[Vec<(usize, BondKind, usize)>], mut rank: Vec<usize>) -> Vec<usize> {
    loop {
        let keys: Vec<(usize, Vec<(BondKind, usize)>)> = (0..rank.len())
            .map(|i| {
                let mut neighborhood: Vec<(BondKind, usize)> =
                    adj[i].iter().map(|&(v, kind, _)| (kind, rank[v])).collect();
                neighborhood.sort();
                (rank[i], neighborhood)
            })
            .collect();
        let next = dense_ranks(&keys);
        if class_count(&next) == class_count(&rank) {
            return next;
        }
        rank = next;
    }
}

/// Morgan-style canonical atom ranks.
///
/// Starts from per-atom invariants (element, aromaticity, degree, bracket
/// text), refines by neighborhood, then resolves remaining ties by promoting
/// one member of the lowest tied class and refining again. Atoms left tied
/// after refinement are symmetry-equivalent for the invariants used, so the
/// rendered string does not depend on which member is promoted.
fn canonical_ranks(graph: &MolGraph) -> Vec<usize> {
    let n = graph.atom_count();
    let adj = graph.adjacency();

    let init: Vec<(CompactString, bool, usize, CompactString)> = (0..n)
        .map(|i| {
            let atom = &graph.atoms[i];
            (
                atom.symbol.clone(),
                atom.aromatic,
                adj[i].len(),
                atom.bracket.clone().unwrap_or_default(),
            )
        })
        .collect();

    let mut rank = refine(&adj, dense_ranks(&init));

    while class_count(&rank) < n {
        let tied_rank = (0..class_count(&rank))
            .find(|&r| rank.iter().filter(|&&x| x == r).count() > 1)
            .unwrap();
        let chosen = rank.iter().position(|&x| x == tied_rank).unwrap();
        let keys: Vec<(usize, usize)> = (0..n)
            .map(|i| (rank[i], usize::from(i != chosen)))
            .collect();
        rank = refine(&adj, dense_ranks(&keys));
    }

    rank
}

// ------------------------ Rendering ------------------------

struct Renderer<'g> {
    graph: &'g MolGraph,
    adj: Vec<Vec<(usize, BondKind, usize)>>,
    ring_edge: Vec<bool>,
    ring_digit: Vec<Option<u16>>,
    digit_in_use: [bool; 100],
    visited: Vec<bool>,
    out: String,
}

impl<'g> Renderer<'g> {
    fn new(graph: &'g MolGraph, adj: Vec<Vec<(usize, BondKind, usize)>>) -> Self {
        Self {
            graph,
            adj,
            ring_edge: vec![false; graph.bonds.len()],
            ring_digit: vec![None; graph.bonds.len()],
            digit_in_use: [false; 100],
            visited: vec![false; graph.atom_count()],
            out: String::new(),
        }
    }

    /// Classify bonds into spanning-tree edges and ring-closure edges,
    /// traversing in the same order the writer will.
    fn mark_rings(&mut self, root: usize, seen: &mut [bool], used: &mut [bool]) {
        seen[root] = true;
        let entries = self.adj[root].clone();
        for (v, _, e) in entries {
            if used[e] {
                continue;
            }
            used[e] = true;
            if seen[v] {
                self.ring_edge[e] = true;
            } else {
                self.mark_rings(v, seen, used);
            }
        }
    }

    fn alloc_digit(&mut self) -> Result<u16, CodecError> {
        for d in 1..100u16 {
            if !self.digit_in_use[d as usize] {
                self.digit_in_use[d as usize] = true;
                return Ok(d);
            }
        }
        Err(CodecError::RingIndexOverflow)
    }

    fn push_digit(&mut self, digit: u16) {
        if digit < 10 {
            self.out.push((b'0' + digit as u8) as char);
        } else {
            self.out.push('%');
            self.out.push_str(&digit.to_string());
        }
    }

    /// Write a bond symbol when the bond differs from the implicit default.
    fn push_bond(&mut self, kind: BondKind, a: usize, b: usize) {
        let both_aromatic = self.graph.atoms[a].aromatic && self.graph.atoms[b].aromatic;
        match kind {
            BondKind::Double => self.out.push('='),
            BondKind::Triple => self.out.push('#'),
            BondKind::Single => {
                if both_aromatic {
                    self.out.push('-');
                }
            }
            BondKind::Aromatic => {
                if !both_aromatic {
                    self.out.push(':');
                }
            }
        }
    }

    fn write(&mut self, u: usize) -> Result<(), CodecError> {
        self.visited[u] = true;
        let text = self.graph.atoms[u].smiles_text();
        self.out.push_str(&text);

        let entries = self.adj[u].clone();
        for &(v, kind, e) in &entries {
            if !self.ring_edge[e] {
                continue;
            }
            match self.ring_digit[e] {
                None => {
                    let digit = self.alloc_digit()?;
                    self.ring_digit[e] = Some(digit);
                    self.push_bond(kind, u, v);
                    self.push_digit(digit);
                }
                Some(digit) => {
                    self.push_digit(digit);
                    self.digit_in_use[digit as usize] = false;
                }
            }
        }

        let children: Vec<(usize, BondKind)> = entries
            .iter()
            .filter(|&&(v, _, e)| !self.ring_edge[e] && !self.visited[v])
            .map(|&(v, kind, _)| (v, kind))
            .collect();
        for (i, &(v, kind)) in children.iter().enumerate() {
            let last = i + 1 == children.len();
            if !last {
                self.out.push('(');
            }
            self.push_bond(kind, u, v);
            self.write(v)?;
            if !last {
                self.out.push(')');
            }
        }
        Ok(())
    }
}

fn render_smiles(graph: &MolGraph, canonical: bool) -> Result<String, CodecError> {
    let n = graph.atom_count();
    if n == 0 {
        return Err(CodecError::EmptyInput);
    }

    let key: Vec<usize> = if canonical {
        canonical_ranks(graph)
    } else {
        (0..n).collect()
    };

    let mut adj = graph.adjacency();
    for list in &mut adj {
        list.sort_by_key(|&(v, _, e)| (key[v], e));
    }

    let mut roots: Vec<usize> = (0..n).collect();
    roots.sort_by_key(|&i| key[i]);

    let mut renderer = Renderer::new(graph, adj);

    let mut seen = vec![false; n];
    let mut used = vec![false; graph.bonds.len()];
    for &root in &roots {
        if !seen[root] {
            renderer.mark_rings(root, &mut seen, &mut used);
        }
    }

    let mut first = true;
    for &root in &roots {
        if !renderer.visited[root] {
            if !first {
                renderer.out.push('.');
            }
            renderer.write(root)?;
            first = false;
        }
    }

    Ok(renderer.out)
}
