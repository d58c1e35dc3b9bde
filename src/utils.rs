//! Utility functions for SMILES tokenization.

use compact_str::CompactString;
use fancy_regex::Regex;

/// Tokenize a SMILES string into atom-level tokens.
///
/// Splits a SMILES string into its constituent atoms and tokens using a regex pattern.
/// Handles multi-character atoms (Br, Cl), bracket atoms ([C@@H], [N+]), ring closures,
/// bonds, and stereochemistry markers.
pub(crate) fn atomwise_tokenize(smiles: &str, pattern: &Regex) -> Vec<CompactString> {
    let mut tokens = Vec::new();
    for m in pattern.find_iter(smiles).flatten() {
        tokens.push(CompactString::from(m.as_str()));
    }
    tokens
}
