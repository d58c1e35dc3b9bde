//! Batch preparation and collation for encoder/decoder training.
//!
//! [`BatchCollator`] turns a batch of raw SMILES strings into the rectangular
//! id/mask arrays the training loop consumes. Encoder and decoder roles are
//! prepared independently from the same raw batch, so their augmentation
//! draws are independent. Field names of [`CollateOutput`] are a wire
//! contract and must not change.

use compact_str::CompactString;
use rand::Rng;

use crate::augment::SmilesAugmenter;
use crate::codec::{CodecError, StructureCodec};
use crate::constants::DEFAULT_LABEL_PAD;
use crate::tokenizer::SmilesTokenizer;

/// Recognized collation options.
#[derive(Debug, Clone)]
pub struct CollateConfig {
    /// Truncation cap applied when the batch maximum exceeds it.
    pub seq_length: usize,
    pub encoder_augment: bool,
    pub encoder_mask: bool,
    pub decoder_augment: bool,
    pub decoder_mask: bool,
    pub canonicalize_input: bool,
    /// Round pad lengths up to the next multiple of 8 for downstream numeric
    /// alignment.
    pub pad_size_divisible_by_8: bool,
    /// Label value at positions excluded from the loss.
    pub label_pad: i64,
}

impl Default for CollateConfig {
    fn default() -> Self {
        Self {
            seq_length: 512,
            encoder_augment: true,
            encoder_mask: false,
            decoder_augment: false,
            decoder_mask: false,
            canonicalize_input: true,
            pad_size_divisible_by_8: false,
            label_pad: DEFAULT_LABEL_PAD,
        }
    }
}

/// Tokenized, masked, length-checked sequences for one role, before padding.
#[derive(Debug, Clone)]
pub struct PreparedTokens {
    pub tokens: Vec<Vec<CompactString>>,
    /// true = active, false = masked.
    pub mask: Vec<Vec<bool>>,
    pub target_smiles: Vec<String>,
}

/// The final training batch. All id/mask arrays are rectangular.
#[derive(Debug, Clone)]
pub struct CollateOutput {
    pub text_enc: Vec<Vec<i64>>,
    pub enc_mask: Vec<Vec<i64>>,
    pub text_dec: Vec<Vec<i64>>,
    pub dec_mask: Vec<Vec<i64>>,
    pub labels: Vec<Vec<i64>>,
    pub loss_mask: Vec<Vec<i64>>,
    pub target_smiles: Vec<String>,
}

/// Assembles training batches from raw SMILES strings.
pub struct BatchCollator<C> {
    tokenizer: SmilesTokenizer,
    augmenter: SmilesAugmenter<C>,
    config: CollateConfig,
}

impl<C: StructureCodec> BatchCollator<C> {
    pub fn new(tokenizer: SmilesTokenizer, codec: C, config: CollateConfig) -> Self {
        let augmenter = SmilesAugmenter::new(codec, config.canonicalize_input);
        Self {
            tokenizer,
            augmenter,
            config,
        }
    }

    pub fn tokenizer(&self) -> &SmilesTokenizer {
        &self.tokenizer
    }

    pub fn config(&self) -> &CollateConfig {
        &self.config
    }

    /// Prepare tokens for the encoder or decoder role.
    ///
    /// Augmentation is applied per item; tokenization is delegated to the
    /// tokenizer with padding disabled (padding happens later because encoder
    /// and decoder rows get different bos/eos treatment).
    pub fn prepare_tokens<R: Rng>(
        &self,
        batch: &[String],
        augment: bool,
        mask: bool,
        rng: &mut R,
    ) -> Result<PreparedTokens, CodecError> {
        let mut variants = Vec::with_capacity(batch.len());
        let mut targets = Vec::with_capacity(batch.len());
        for smiles in batch {
            let (variant, target) = self.augmenter.augment(smiles, augment, rng)?;
            variants.push(variant);
            targets.push(target);
        }

        let output = self.tokenizer.tokenize(&variants, false, mask, rng);
        let (mut tokens, mut mask_rows) = match (output.masked_tokens, output.token_masks) {
            (Some(tokens), Some(masks)) => (tokens, masks),
            _ => {
                let masks = output
                    .original_tokens
                    .iter()
                    .map(|row| vec![true; row.len()])
                    .collect();
                (output.original_tokens, masks)
            }
        };

        self.check_seq_len(&mut tokens, &mut mask_rows);

        Ok(PreparedTokens {
            tokens,
            mask: mask_rows,
            target_smiles: targets,
        })
    }

    /// Truncate the whole batch to `seq_length` when the batch maximum
    /// exceeds it. Truncation is batch-triggered, not per-item: shapes stay
    /// consistent across rows even for rows under the cap.
    fn check_seq_len(&self, tokens: &mut [Vec<CompactString>], mask: &mut [Vec<bool>]) {
        let seq_len = tokens.iter().map(Vec::len).max().unwrap_or(0);
        if seq_len > self.config.seq_length {
            log::warn!(
                "Batch sequence length {seq_len} exceeds cap {}, truncating all sequences",
                self.config.seq_length
            );
            for row in tokens.iter_mut() {
                row.truncate(self.config.seq_length);
            }
            for row in mask.iter_mut() {
                row.truncate(self.config.seq_length);
            }
        }
    }

    /// Right-pad rows to a uniform length and build the matching active mask
    /// (1 = real token, 0 = pad).
    fn pad_seqs(&self, seqs: Vec<Vec<i64>>, pad_token: i64) -> (Vec<Vec<i64>>, Vec<Vec<i64>>) {
        let mut pad_length = seqs.iter().map(Vec::len).max().unwrap_or(0);
        if self.config.pad_size_divisible_by_8 {
            pad_length = pad_length.div_ceil(8) * 8;
        }

        let mut padded = Vec::with_capacity(seqs.len());
        let mut masks = Vec::with_capacity(seqs.len());
        for seq in seqs {
            let len = seq.len();
            let mut row = seq;
            row.resize(pad_length, pad_token);
            padded.push(row);

            let mut mask = vec![1i64; len];
            mask.resize(pad_length, 0);
            masks.push(mask);
        }
        (padded, masks)
    }

    fn to_i64(ids: Vec<Vec<u32>>) -> Vec<Vec<i64>> {
        ids.into_iter()
            .map(|row| row.into_iter().map(i64::from).collect())
            .collect()
    }

    /// Collate a batch of raw SMILES strings into a training batch.
    ///
    /// The batch must be non-empty. `target_smiles` always comes from the
    /// encoder role; the decoder role's targets are computed and discarded.
    pub fn collate<R: Rng>(
        &self,
        batch: &[String],
        rng: &mut R,
    ) -> Result<CollateOutput, CodecError> {
        let pad_id = i64::from(self.tokenizer.pad_id());

        // Encoder
        let encoder = self.prepare_tokens(
            batch,
            self.config.encoder_augment,
            self.config.encoder_mask,
            rng,
        )?;
        let enc_token_ids = Self::to_i64(self.tokenizer.convert_tokens_to_ids(&encoder.tokens));
        let (text_enc, enc_mask) = self.pad_seqs(enc_token_ids, pad_id);

        // Decoder
        let decoder = self.prepare_tokens(
            batch,
            self.config.decoder_augment,
            self.config.decoder_mask,
            rng,
        )?;
        let dec_token_ids = Self::to_i64(self.tokenizer.convert_tokens_to_ids(&decoder.tokens));

        // Labels get eos appended before bos is prepended to the decoder input.
        let label_ids: Vec<Vec<i64>> = dec_token_ids
            .iter()
            .map(|row| {
                let mut labels = row.clone();
                labels.push(i64::from(self.tokenizer.eos_id()));
                labels
            })
            .collect();
        let dec_input_ids: Vec<Vec<i64>> = dec_token_ids
            .into_iter()
            .map(|row| {
                let mut input = Vec::with_capacity(row.len() + 1);
                input.push(i64::from(self.tokenizer.bos_id()));
                input.extend(row);
                input
            })
            .collect();

        let (text_dec, dec_mask) = self.pad_seqs(dec_input_ids, pad_id);
        let (mut labels, loss_mask) = self.pad_seqs(label_ids, pad_id);

        // Inactive label positions carry the ignore sentinel so the loss can
        // skip them by value.
        for (label_row, mask_row) in labels.iter_mut().zip(&loss_mask) {
            for (label, &active) in label_row.iter_mut().zip(mask_row) {
                if active == 0 {
                    *label = self.config.label_pad;
                }
            }
        }

        Ok(CollateOutput {
            text_enc,
            enc_mask,
            text_dec,
            dec_mask,
            labels,
            loss_mask,
            target_smiles: encoder.target_smiles,
        })
    }
}
