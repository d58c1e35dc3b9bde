//! Vocabulary-based SMILES tokenizer for sequence modeling.
//!
//! Tokenization is atom-level (regex pre-tokenization); the vocabulary maps
//! atom strings to ids with five reserved special tokens. Token masking for
//! denoising objectives replaces tokens with `<mask>` at a configurable
//! probability, driven by an injected random source.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ahash::AHashMap;
use compact_str::CompactString;
use fancy_regex::Regex;
use rand::Rng;
use rayon::prelude::*;
use thiserror::Error;

use crate::constants::{
    BOS_TOKEN, EOS_TOKEN, MASK_TOKEN, PAD_TOKEN, SMILES_ATOM_PATTERN, UNK_TOKEN,
};
use crate::utils::atomwise_tokenize;

/// Default probability that a token is replaced by `<mask>` when masking is
/// requested.
pub const DEFAULT_MASK_PROB: f64 = 0.1;

#[derive(Debug, Error)]
pub enum VocabError {
    #[error("cannot read vocabulary file: {0}")]
    Io(#[from] std::io::Error),

    #[error("duplicate token '{token}' in vocabulary file")]
    DuplicateToken { token: String },
}

/// Output of [`SmilesTokenizer::tokenize`].
///
/// `masked_tokens` and `token_masks` are present only when masking was
/// requested. In `token_masks`, `true` marks an active (unmasked, non-pad)
/// position.
#[derive(Debug, Clone)]
pub struct TokenizeOutput {
    pub original_tokens: Vec<Vec<CompactString>>,
    pub masked_tokens: Option<Vec<Vec<CompactString>>>,
    pub token_masks: Option<Vec<Vec<bool>>>,
}

/// An atom-level SMILES tokenizer with a fixed vocabulary.
///
/// Special tokens always occupy IDs 0-4 (PAD, UNK, BOS, EOS, MASK); regular
/// vocabulary entries follow. The vocabulary is read-only after construction.
pub struct SmilesTokenizer {
    token_to_id: AHashMap<CompactString, u32>,
    id_to_token: Vec<CompactString>,
    compiled_pattern: Regex,
    mask_prob: f64,
}

impl Default for SmilesTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SmilesTokenizer {
    /// Create a tokenizer containing only the special tokens.
    pub fn new() -> Self {
        let mut tokenizer = Self {
            token_to_id: AHashMap::new(),
            id_to_token: Vec::new(),
            compiled_pattern: Regex::new(SMILES_ATOM_PATTERN).expect("Invalid SMILES pattern"),
            mask_prob: DEFAULT_MASK_PROB,
        };
        tokenizer.init_special_tokens();
        tokenizer
    }

    /// Create a tokenizer from an iterator of vocabulary tokens.
    ///
    /// Tokens already present (including specials) are skipped.
    pub fn from_vocab<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tokenizer = Self::new();
        for token in tokens {
            tokenizer.add_token(token.as_ref());
        }
        tokenizer
    }

    /// Load a vocabulary from a file with one token per line.
    ///
    /// Blank lines are ignored; a repeated token is an error.
    pub fn load_vocabulary<P: AsRef<Path>>(path: P) -> Result<Self, VocabError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut tokenizer = Self::new();
        for line in reader.lines() {
            let line = line?;
            let token = line.trim();
            if token.is_empty() {
                continue;
            }
            if tokenizer.token_to_id.contains_key(token) {
                return Err(VocabError::DuplicateToken {
                    token: token.to_string(),
                });
            }
            tokenizer.add_token(token);
        }

        log::info!(
            "Loaded vocabulary with {} tokens ({} regular)",
            tokenizer.vocab_size(),
            tokenizer.vocab_size() - Self::num_special_tokens()
        );
        Ok(tokenizer)
    }

    /// Override the masking probability (default 0.1).
    pub fn with_mask_prob(mut self, mask_prob: f64) -> Self {
        self.mask_prob = mask_prob;
        self
    }

    /// Initialize special tokens (PAD=0, UNK=1, BOS=2, EOS=3, MASK=4)
    fn init_special_tokens(&mut self) {
        if self.id_to_token.is_empty() {
            for (id, token) in [PAD_TOKEN, UNK_TOKEN, BOS_TOKEN, EOS_TOKEN, MASK_TOKEN]
                .iter()
                .enumerate()
            {
                let token_str = CompactString::from(*token);
                self.token_to_id.insert(token_str.clone(), id as u32);
                self.id_to_token.push(token_str);
            }
        }
    }

    fn add_token(&mut self, token: &str) -> u32 {
        if let Some(&id) = self.token_to_id.get(token) {
            return id;
        }
        let id = self.id_to_token.len() as u32;
        let token_str = CompactString::from(token);
        self.token_to_id.insert(token_str.clone(), id);
        self.id_to_token.push(token_str);
        id
    }

    pub fn pad_id(&self) -> u32 {
        0
    }

    pub fn unk_id(&self) -> u32 {
        1
    }

    pub fn bos_id(&self) -> u32 {
        2
    }

    pub fn eos_id(&self) -> u32 {
        3
    }

    pub fn mask_id(&self) -> u32 {
        4
    }

    pub fn num_special_tokens() -> u32 {
        crate::constants::NUM_SPECIAL_TOKENS
    }

    /// Total vocabulary size including special tokens.
    pub fn vocab_size(&self) -> u32 {
        self.id_to_token.len() as u32
    }

    fn is_special(&self, token: &str) -> bool {
        matches!(token, PAD_TOKEN | BOS_TOKEN | EOS_TOKEN | MASK_TOKEN)
    }

    /// Tokenize a batch of SMILES strings.
    ///
    /// No begin/end markers are added here; the collator inserts them when it
    /// builds decoder inputs and labels. With `pad=true` every returned row is
    /// padded to the batch maximum with `<pad>` (pad positions are inactive in
    /// `token_masks`). With `mask=true` each token is independently replaced
    /// by `<mask>` with probability `mask_prob`.
    pub fn tokenize<R: Rng>(
        &self,
        smiles: &[String],
        pad: bool,
        mask: bool,
        rng: &mut R,
    ) -> TokenizeOutput {
        let mut original_tokens: Vec<Vec<CompactString>> = smiles
            .iter()
            .map(|s| atomwise_tokenize(s, &self.compiled_pattern))
            .collect();

        let (mut masked_tokens, mut token_masks) = if mask {
            let mut masked = Vec::with_capacity(original_tokens.len());
            let mut masks = Vec::with_capacity(original_tokens.len());
            for tokens in &original_tokens {
                let mut row = Vec::with_capacity(tokens.len());
                let mut row_mask = Vec::with_capacity(tokens.len());
                for token in tokens {
                    if rng.random::<f64>() < self.mask_prob {
                        row.push(CompactString::from(MASK_TOKEN));
                        row_mask.push(false);
                    } else {
                        row.push(token.clone());
                        row_mask.push(true);
                    }
                }
                masked.push(row);
                masks.push(row_mask);
            }
            (Some(masked), Some(masks))
        } else {
            (None, None)
        };

        if pad {
            let pad_length = original_tokens.iter().map(Vec::len).max().unwrap_or(0);
            for row in &mut original_tokens {
                row.resize(pad_length, CompactString::from(PAD_TOKEN));
            }
            if let Some(masked) = &mut masked_tokens {
                for row in masked {
                    row.resize(pad_length, CompactString::from(PAD_TOKEN));
                }
            }
            if let Some(masks) = &mut token_masks {
                for row in masks {
                    row.resize(pad_length, false);
                }
            }
        }

        TokenizeOutput {
            original_tokens,
            masked_tokens,
            token_masks,
        }
    }

    /// Convert token strings to ids; unknown tokens map to the unk id.
    pub fn convert_tokens_to_ids(&self, tokens: &[Vec<CompactString>]) -> Vec<Vec<u32>> {
        tokens
            .par_iter()
            .map(|row| {
                row.iter()
                    .map(|t| self.token_to_id.get(t).copied().unwrap_or(self.unk_id()))
                    .collect()
            })
            .collect()
    }

    /// Convert ids back to token strings; out-of-vocabulary ids map to `<unk>`.
    pub fn ids_to_tokens(&self, ids: &[Vec<u32>]) -> Vec<Vec<CompactString>> {
        ids.par_iter()
            .map(|row| {
                row.iter()
                    .map(|&id| {
                        self.id_to_token
                            .get(id as usize)
                            .cloned()
                            .unwrap_or_else(|| CompactString::from(UNK_TOKEN))
                    })
                    .collect()
            })
            .collect()
    }

    /// Join token rows back into text, dropping pad/bos/eos/mask markers.
    pub fn tokens_to_text(&self, tokens: &[Vec<CompactString>]) -> Vec<String> {
        tokens
            .par_iter()
            .map(|row| {
                let mut text = String::new();
                for token in row {
                    if !self.is_special(token) {
                        text.push_str(token);
                    }
                }
                text
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tokenizer() -> SmilesTokenizer {
        SmilesTokenizer::from_vocab(["C", "O", "N", "c", "1", "(", ")", "=", "Br"])
    }

    #[test]
    fn test_special_token_ids() {
        let tok = SmilesTokenizer::new();
        assert_eq!(tok.vocab_size(), 5);
        assert_eq!(tok.pad_id(), 0);
        assert_eq!(tok.unk_id(), 1);
        assert_eq!(tok.bos_id(), 2);
        assert_eq!(tok.eos_id(), 3);
        assert_eq!(tok.mask_id(), 4);
    }

    #[test]
    fn test_tokenize_without_masking() {
        let tok = tokenizer();
        let mut rng = StdRng::seed_from_u64(7);
        let out = tok.tokenize(&["CCO".to_string()], false, false, &mut rng);
        assert_eq!(out.original_tokens[0].len(), 3);
        assert!(out.masked_tokens.is_none());
        assert!(out.token_masks.is_none());
    }

    #[test]
    fn test_tokenize_with_masking_alignment() {
        let tok = tokenizer().with_mask_prob(0.5);
        let mut rng = StdRng::seed_from_u64(42);
        let batch = vec!["CCOCCOCCO".to_string(), "c1ccccc1".to_string()];
        let out = tok.tokenize(&batch, false, true, &mut rng);
        let masked = out.masked_tokens.unwrap();
        let masks = out.token_masks.unwrap();
        for (row, (masked_row, mask_row)) in
            out.original_tokens.iter().zip(masked.iter().zip(&masks))
        {
            assert_eq!(row.len(), masked_row.len());
            assert_eq!(row.len(), mask_row.len());
            for ((orig, tok_), &active) in row.iter().zip(masked_row).zip(mask_row) {
                if active {
                    assert_eq!(orig, tok_);
                } else {
                    assert_eq!(tok_.as_str(), MASK_TOKEN);
                }
            }
        }
    }

    #[test]
    fn test_tokenize_mask_prob_one_masks_everything() {
        let tok = tokenizer().with_mask_prob(1.0);
        let mut rng = StdRng::seed_from_u64(0);
        let out = tok.tokenize(&["CCO".to_string()], false, true, &mut rng);
        let masks = out.token_masks.unwrap();
        assert!(masks[0].iter().all(|&m| !m));
    }

    #[test]
    fn test_tokenize_with_padding() {
        let tok = tokenizer();
        let mut rng = StdRng::seed_from_u64(1);
        let batch = vec!["C".to_string(), "CCO".to_string()];
        let out = tok.tokenize(&batch, true, false, &mut rng);
        assert_eq!(out.original_tokens[0].len(), 3);
        assert_eq!(out.original_tokens[0][1].as_str(), PAD_TOKEN);
    }

    #[test]
    fn test_convert_tokens_to_ids_unknown_maps_to_unk() {
        let tok = tokenizer();
        let ids = tok.convert_tokens_to_ids(&[vec![
            CompactString::from("C"),
            CompactString::from("Zr"),
        ]]);
        assert_eq!(ids[0][0], 5); // first regular token after the specials
        assert_eq!(ids[0][1], tok.unk_id());
    }

    #[test]
    fn test_ids_round_trip_to_text() {
        let tok = tokenizer();
        let mut rng = StdRng::seed_from_u64(3);
        let out = tok.tokenize(&["CC(=O)N".to_string()], false, false, &mut rng);
        let ids = tok.convert_tokens_to_ids(&out.original_tokens);
        let tokens = tok.ids_to_tokens(&ids);
        let text = tok.tokens_to_text(&tokens);
        assert_eq!(text[0], "CC(=O)N");
    }

    #[test]
    fn test_tokens_to_text_strips_specials() {
        let tok = tokenizer();
        let tokens = vec![vec![
            CompactString::from(BOS_TOKEN),
            CompactString::from("C"),
            CompactString::from("O"),
            CompactString::from(EOS_TOKEN),
            CompactString::from(PAD_TOKEN),
        ]];
        assert_eq!(tok.tokens_to_text(&tokens)[0], "CO");
    }

    #[test]
    fn test_load_vocabulary_rejects_duplicates() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "C\nO\nC").unwrap();
        let result = SmilesTokenizer::load_vocabulary(file.path());
        assert!(matches!(result, Err(VocabError::DuplicateToken { .. })));
    }

    #[test]
    fn test_load_vocabulary() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "C\nO\n\nN").unwrap();
        let tok = SmilesTokenizer::load_vocabulary(file.path()).unwrap();
        assert_eq!(tok.vocab_size(), 8); // 5 specials + 3 tokens
    }
}
