//! Token- and molecule-level accuracy evaluation.

use crate::codec::StructureCodec;
use crate::constants::UNKNOWN_SMILES;
use crate::decode::{sample_molecules, Seq2SeqModel};
use crate::tokenizer::SmilesTokenizer;

/// Metric values for one evaluation batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalMetrics {
    pub character_accuracy: f64,
    pub molecular_accuracy: f64,
    pub percent_invalid: f64,
}

fn argmax(logits: &[f32]) -> usize {
    let mut best = 0;
    for (i, &value) in logits.iter().enumerate() {
        if value > logits[best] {
            best = i;
        }
    }
    best
}

/// Character (token) level accuracy.
///
/// Position-wise argmax of `token_logits` compared against `labels`, counted
/// only where `loss_mask` is active (the mask includes the eos position).
/// The batch must contain at least one active position.
pub fn character_accuracy(
    token_logits: &[Vec<Vec<f32>>],
    loss_mask: &[Vec<i64>],
    labels: &[Vec<i64>],
) -> f64 {
    let mut num_correct = 0u64;
    let mut total = 0u64;
    for (item, rows) in token_logits.iter().enumerate() {
        for (pos, logits) in rows.iter().enumerate() {
            if loss_mask[item][pos] == 0 {
                continue;
            }
            total += 1;
            if argmax(logits) as i64 == labels[item][pos] {
                num_correct += 1;
            }
        }
    }
    assert!(total > 0, "no active positions in batch");
    num_correct as f64 / total as f64
}

/// Molecular accuracy (with canonicalization) over already-sampled strings.
///
/// Each sampled string is parsed; failures count as invalid and canonicalize
/// to a sentinel that never matches a target. Valid parses are rendered
/// canonically and compared position-aligned against `target_smiles`.
/// Returns `(molecular_accuracy, percent_invalid)`.
pub fn molecular_accuracy<C: StructureCodec>(
    codec: &C,
    sampled_smiles: &[String],
    target_smiles: &[String],
) -> (f64, f64) {
    let canonical: Vec<String> = sampled_smiles
        .iter()
        .map(|smiles| {
            codec
                .parse(smiles)
                .and_then(|graph| codec.render(&graph, true))
                .unwrap_or_else(|_| UNKNOWN_SMILES.to_string())
        })
        .collect();

    let total = canonical.len();
    let num_invalid = canonical.iter().filter(|s| *s == UNKNOWN_SMILES).count();
    let num_correct = canonical
        .iter()
        .zip(target_smiles)
        .filter(|(sampled, target)| sampled == target)
        .count();

    (
        num_correct as f64 / total as f64,
        num_invalid as f64 / total as f64,
    )
}

/// Calculate character accuracy, molecular accuracy and percent invalid for
/// one validation batch, sampling molecules from the model.
#[allow(clippy::too_many_arguments)]
pub fn calculate_metrics<C: StructureCodec, M: Seq2SeqModel>(
    codec: &C,
    model: &M,
    tokenizer: &SmilesTokenizer,
    token_logits: &[Vec<Vec<f32>>],
    loss_mask: &[Vec<i64>],
    labels: &[Vec<i64>],
    tokens_enc: &[Vec<i64>],
    enc_mask: &[Vec<i64>],
    target_smiles: &[String],
    max_steps: usize,
) -> EvalMetrics {
    let character_accuracy = character_accuracy(token_logits, loss_mask, labels);
    let sampled = sample_molecules(model, tokenizer, tokens_enc, enc_mask, max_steps);
    let (molecular_accuracy, percent_invalid) = molecular_accuracy(codec, &sampled, target_smiles);
    EvalMetrics {
        character_accuracy,
        molecular_accuracy,
        percent_invalid,
    }
}
