//! Constants shared across the molecule encoding pipeline.

/// SMILES atom-level tokenization regex pattern
/// Matches:
/// - Bracketed atoms: [C@@H], [nH], [O-], etc.
/// - Two-char elements: Br, Cl (must come before B, C)
/// - Single-char elements: C, N, O, S, P, F, I, B
/// - Aromatic atoms: b, c, n, o, s, p
/// - Bonds: =, #, -, :, ~
/// - Stereochemistry: @, /, \
/// - Branches: (, )
/// - Disconnected: .
/// - Ring numbers: single digit or %XX
/// - Other: +, ?, >, *, $
pub const SMILES_ATOM_PATTERN: &str = r"(\[[^\]]+]|Br?|Cl?|N|O|S|P|F|I|b|c|n|o|s|p|\(|\)|\.|=|#|-|\+|\\|\/|:|~|@|\?|>|\*|\$|\%[0-9]{2}|[0-9])";

/// Special tokens for sequence modeling
pub const PAD_TOKEN: &str = "<pad>";
pub const UNK_TOKEN: &str = "<unk>";
pub const BOS_TOKEN: &str = "<bos>";
pub const EOS_TOKEN: &str = "<eos>";
pub const MASK_TOKEN: &str = "<mask>";

/// Number of special tokens (always reserved at IDs 0-4)
pub const NUM_SPECIAL_TOKENS: u32 = 5;

/// Canonical string reported for decoded molecules that fail to parse.
/// Never matches a real canonical SMILES.
pub const UNKNOWN_SMILES: &str = "Unknown";

/// Default label value for positions excluded from loss computation.
/// Distinct from every vocabulary id and from the pad id.
pub const DEFAULT_LABEL_PAD: i64 = -1;
