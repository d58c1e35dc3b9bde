//! Greedy autoregressive decoding from encoder states.
//!
//! The model is a capability: it encodes the batch once, then is stepped with
//! the growing decoder sequences. Decoding runs for exactly `max_steps`
//! iterations with no early exit, even once every item has emitted an end
//! marker; eos/pad pruning happens per item after the loop. Downstream
//! accuracy computation relies on this fixed behavior.

use crate::tokenizer::SmilesTokenizer;

/// Capability required from the sequence-to-sequence model.
///
/// `step` returns logits for every decoder position,
/// shaped `[batch][position][vocab]`; the vocab dimension may be wider than
/// the tokenizer vocabulary (padded id space).
pub trait Seq2SeqModel {
    type Hidden;

    /// Run the encoder once over the batch.
    fn encode(&self, tokens_enc: &[Vec<i64>], enc_mask: &[Vec<i64>]) -> Self::Hidden;

    /// Run the decoder over the partial sequences.
    fn step(
        &self,
        hidden: &Self::Hidden,
        tokens_dec: &[Vec<u32>],
        dec_mask: &[Vec<bool>],
    ) -> Vec<Vec<Vec<f32>>>;
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

/// Log-softmax value at the argmax position.
fn max_log_prob(logits: &[f32]) -> f32 {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let sum_exp: f32 = logits.iter().map(|&x| (x - max).exp()).sum();
    // log_softmax(max) = max - (max + ln(sum_exp)) = -ln(sum_exp)
    -sum_exp.ln()
}

/// Greedily decode token sequences from encoder inputs.
///
/// Every sequence starts from a single bos id. Each step recomputes the
/// decoder mask as "id is not the pad id" (no pad ids are appended during
/// generation, so the mask stays all-active; the convention is shared with
/// padded training batches), clamps logits at or beyond the vocabulary size
/// to negative infinity so generation never selects padded id space, and
/// appends the argmax of the last position.
///
/// Returns the sequences (including the leading bos) and the final step's
/// per-position maximum log-probabilities.
pub fn decode_greedy<M: Seq2SeqModel>(
    model: &M,
    tokenizer: &SmilesTokenizer,
    tokens_enc: &[Vec<i64>],
    enc_mask: &[Vec<i64>],
    max_steps: usize,
) -> (Vec<Vec<u32>>, Vec<Vec<f32>>) {
    let hidden = model.encode(tokens_enc, enc_mask);

    let pad_id = tokenizer.pad_id();
    let vocab_size = tokenizer.vocab_size() as usize;
    let mut sequences: Vec<Vec<u32>> = vec![vec![tokenizer.bos_id()]; tokens_enc.len()];
    let mut log_probs: Vec<Vec<f32>> = vec![Vec::new(); tokens_enc.len()];

    for _ in 0..max_steps {
        let dec_mask: Vec<Vec<bool>> = sequences
            .iter()
            .map(|seq| seq.iter().map(|&id| id != pad_id).collect())
            .collect();

        let mut token_logits = model.step(&hidden, &sequences, &dec_mask);

        // Never pick ids from the padded vocabulary space.
        for rows in &mut token_logits {
            for position in rows.iter_mut() {
                if position.len() > vocab_size {
                    for logit in &mut position[vocab_size..] {
                        *logit = f32::NEG_INFINITY;
                    }
                }
            }
        }

        for (item, rows) in token_logits.iter().enumerate() {
            log_probs[item] = rows.iter().map(|p| max_log_prob(p)).collect();
            let last = &rows[rows.len() - 1];
            sequences[item].push(argmax(last) as u32);
        }
    }

    (sequences, log_probs)
}

/// Truncate a decoded sequence at the first eos; without an eos, strip pad
/// ids wherever they occur (a degenerate model can emit pads mid-sequence).
pub fn prune_decoded(sequence: &mut Vec<u32>, eos_id: u32, pad_id: u32) {
    if let Some(idx) = sequence.iter().position(|&id| id == eos_id) {
        sequence.truncate(idx);
    } else {
        sequence.retain(|&id| id != pad_id);
    }
}

/// Autoregressively sample SMILES strings from encoder inputs.
pub fn sample_molecules<M: Seq2SeqModel>(
    model: &M,
    tokenizer: &SmilesTokenizer,
    tokens_enc: &[Vec<i64>],
    enc_mask: &[Vec<i64>],
    max_steps: usize,
) -> Vec<String> {
    let (mut sequences, _log_probs) =
        decode_greedy(model, tokenizer, tokens_enc, enc_mask, max_steps);

    for sequence in &mut sequences {
        prune_decoded(sequence, tokenizer.eos_id(), tokenizer.pad_id());
    }

    let tokens = tokenizer.ids_to_tokens(&sequences);
    tokenizer.tokens_to_text(&tokens)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use compact_str::CompactString;

    /// Test model that deterministically replays per-item target sequences:
    /// at step k it puts all probability mass on `targets[item][k]`, or on
    /// the pad id once the target is exhausted.
    pub(crate) struct ReplayModel {
        pub targets: Vec<Vec<u32>>,
        pub logit_width: usize,
    }

    impl Seq2SeqModel for ReplayModel {
        type Hidden = usize;

        fn encode(&self, tokens_enc: &[Vec<i64>], _enc_mask: &[Vec<i64>]) -> usize {
            tokens_enc.len()
        }

        fn step(
            &self,
            _hidden: &usize,
            tokens_dec: &[Vec<u32>],
            _dec_mask: &[Vec<bool>],
        ) -> Vec<Vec<Vec<f32>>> {
            tokens_dec
                .iter()
                .enumerate()
                .map(|(item, seq)| {
                    (0..seq.len())
                        .map(|pos| {
                            let favored =
                                self.targets[item].get(pos).copied().unwrap_or(0) as usize;
                            let mut logits = vec![-10.0f32; self.logit_width];
                            logits[favored] = 10.0;
                            logits
                        })
                        .collect()
                })
                .collect()
        }
    }

    fn tokenizer() -> SmilesTokenizer {
        SmilesTokenizer::from_vocab(["C", "O", "N", "c", "1"])
    }

    fn ids(tok: &SmilesTokenizer, tokens: &[&str]) -> Vec<u32> {
        let rows: Vec<Vec<CompactString>> =
            vec![tokens.iter().map(|&t| CompactString::from(t)).collect()];
        tok.convert_tokens_to_ids(&rows).remove(0)
    }

    #[test]
    fn test_decode_length_is_fixed_budget() {
        let tok = tokenizer();
        let model = ReplayModel {
            targets: vec![ids(&tok, &["C", "C", "O"]), ids(&tok, &["O"])],
            logit_width: tok.vocab_size() as usize,
        };
        let enc = vec![vec![5i64, 5, 6], vec![6i64, 0, 0]];
        let mask = vec![vec![1i64, 1, 1], vec![1i64, 0, 0]];
        let (seqs, _) = decode_greedy(&model, &tok, &enc, &mask, 5);
        // bos + exactly max_steps generated tokens, no early exit.
        assert_eq!(seqs.len(), 2);
        assert!(seqs.iter().all(|s| s.len() == 6));
        assert!(seqs.iter().all(|s| s[0] == tok.bos_id()));
    }

    #[test]
    fn test_decode_replays_targets() {
        let tok = tokenizer();
        let target = ids(&tok, &["C", "C", "O"]);
        let model = ReplayModel {
            targets: vec![target.clone()],
            logit_width: tok.vocab_size() as usize,
        };
        let enc = vec![vec![5i64, 5, 6]];
        let mask = vec![vec![1i64, 1, 1]];
        let (seqs, log_probs) = decode_greedy(&model, &tok, &enc, &mask, 3);
        assert_eq!(&seqs[0][1..], target.as_slice());
        // Log-probabilities are valid (<= 0) for every position.
        assert!(log_probs[0].iter().all(|&lp| lp <= 0.0));
    }

    #[test]
    fn test_decode_never_selects_padded_vocab_space() {
        let tok = tokenizer();
        // Model favors an id beyond vocab_size at every position; the clamp
        // must force selection back into the real vocabulary.
        struct OutOfVocabModel {
            width: usize,
        }
        impl Seq2SeqModel for OutOfVocabModel {
            type Hidden = ();
            fn encode(&self, _t: &[Vec<i64>], _m: &[Vec<i64>]) {}
            fn step(
                &self,
                _h: &(),
                tokens_dec: &[Vec<u32>],
                _m: &[Vec<bool>],
            ) -> Vec<Vec<Vec<f32>>> {
                tokens_dec
                    .iter()
                    .map(|seq| {
                        (0..seq.len())
                            .map(|_| {
                                let mut logits = vec![0.0f32; self.width];
                                let last = self.width - 1;
                                logits[last] = 100.0;
                                logits
                            })
                            .collect()
                    })
                    .collect()
            }
        }
        let model = OutOfVocabModel {
            width: tok.vocab_size() as usize + 4,
        };
        let enc = vec![vec![5i64]];
        let mask = vec![vec![1i64]];
        let (seqs, _) = decode_greedy(&model, &tok, &enc, &mask, 4);
        assert!(seqs[0].iter().all(|&id| id < tok.vocab_size()));
    }

    #[test]
    fn test_prune_truncates_at_first_eos() {
        let tok = tokenizer();
        let mut seq = vec![tok.bos_id(), 5, 6, tok.eos_id(), 5, tok.eos_id()];
        prune_decoded(&mut seq, tok.eos_id(), tok.pad_id());
        assert_eq!(seq, vec![tok.bos_id(), 5, 6]);
        // Idempotent: pruning again changes nothing.
        let before = seq.clone();
        prune_decoded(&mut seq, tok.eos_id(), tok.pad_id());
        assert_eq!(seq, before);
    }

    #[test]
    fn test_prune_strips_mid_sequence_pads_without_eos() {
        let tok = tokenizer();
        let mut seq = vec![tok.bos_id(), 5, tok.pad_id(), 6, tok.pad_id()];
        prune_decoded(&mut seq, tok.eos_id(), tok.pad_id());
        assert_eq!(seq, vec![tok.bos_id(), 5, 6]);
    }

    #[test]
    fn test_sample_molecules_reproduces_input() {
        let tok = tokenizer();
        let mut target = ids(&tok, &["C", "C", "O"]);
        target.push(tok.eos_id());
        let model = ReplayModel {
            targets: vec![target],
            logit_width: tok.vocab_size() as usize,
        };
        let enc = vec![vec![5i64, 5, 6]];
        let mask = vec![vec![1i64, 1, 1]];
        let smiles = sample_molecules(&model, &tok, &enc, &mask, 8);
        assert_eq!(smiles, vec!["CCO"]);
    }
}
