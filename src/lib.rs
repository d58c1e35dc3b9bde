//! Molecule string encoding pipeline for sequence-to-sequence training.
//!
//! This crate prepares SMILES strings for encoder/decoder sequence models
//! and evaluates model output against chemical ground truth:
//!
//! - [`SmilesCodec`] parses SMILES into a structural graph and renders it
//!   back canonically or in the current atom order.
//! - [`SmilesAugmenter`] produces randomized structural variants together
//!   with canonical target strings.
//! - [`SmilesTokenizer`] handles atom-level tokenization, optional token
//!   masking, and id/token/text conversion against a fixed vocabulary.
//! - [`BatchCollator`] assembles padded, masked, label-aligned training
//!   batches.
//! - [`decode_greedy`] / [`sample_molecules`] run the fixed-budget greedy
//!   decoding loop over a [`Seq2SeqModel`] capability.
//! - [`metrics`] scores decoded output at token and whole-molecule level.
//!
//! All components are value types created fresh per batch; only the tokenizer
//! vocabulary and the collation configuration persist, read-only, across
//! calls.

pub mod augment;
pub mod codec;
pub mod collate;
pub mod constants;
pub mod decode;
pub mod graph;
pub mod metrics;
pub mod tokenizer;

mod utils;

pub use augment::SmilesAugmenter;
pub use codec::{CodecError, SmilesCodec, StructureCodec};
pub use collate::{BatchCollator, CollateConfig, CollateOutput, PreparedTokens};
pub use decode::{decode_greedy, prune_decoded, sample_molecules, Seq2SeqModel};
pub use graph::{Atom, Bond, BondKind, MolGraph};
pub use metrics::{calculate_metrics, character_accuracy, molecular_accuracy, EvalMetrics};
pub use tokenizer::{SmilesTokenizer, TokenizeOutput, VocabError};
