//! Structural augmentation of SMILES strings.
//!
//! Augmentation regularizes a SMILES string by parsing it into a graph and
//! rendering it back, optionally after a uniformly random renumbering of the
//! atoms. The canonical target produced alongside is what evaluation
//! compares decoded molecules against.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::codec::{CodecError, StructureCodec};

/// Produces augmented variants and canonical targets for training batches.
pub struct SmilesAugmenter<C> {
    codec: C,
    canonicalize_input: bool,
}

impl<C: StructureCodec> SmilesAugmenter<C> {
    pub fn new(codec: C, canonicalize_input: bool) -> Self {
        Self {
            codec,
            canonicalize_input,
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Regularize one SMILES string, returning `(variant, canonical_target)`.
    ///
    /// Input strings are assumed parseable; a parse failure propagates as an
    /// error. When `augment` is set the variant is a non-canonical rendering
    /// of a randomly renumbered graph; rendering the renumbered graph can
    /// rarely fail, in which case the canonical form is used instead. Without
    /// `augment` the variant is a non-canonical rendering of the unmodified
    /// graph, which normalizes formatting but keeps the atom order.
    pub fn augment<R: Rng>(
        &self,
        smiles: &str,
        augment: bool,
        rng: &mut R,
    ) -> Result<(String, String), CodecError> {
        let graph = self.codec.parse(smiles)?;
        let canon_smiles = if self.canonicalize_input {
            self.codec.render(&graph, true)?
        } else {
            smiles.to_string()
        };

        let aug_smiles = if augment {
            let mut atom_order: Vec<usize> = (0..graph.atom_count()).collect();
            atom_order.shuffle(rng);
            let aug_graph = self.codec.reorder(&graph, &atom_order)?;

            match self.codec.render(&aug_graph, false) {
                Ok(rendered) => rendered,
                Err(err) => {
                    log::info!(
                        "Could not render SMILES for {smiles} after augmenting ({err}). Forcing canonicalization"
                    );
                    if self.canonicalize_input {
                        canon_smiles.clone()
                    } else {
                        self.codec.render(&graph, true)?
                    }
                }
            }
        } else {
            self.codec.render(&graph, false)?
        };

        assert!(!aug_smiles.is_empty(), "Augmented SMILES string is empty");
        assert!(!canon_smiles.is_empty(), "Canonical SMILES string is empty");
        Ok((aug_smiles, canon_smiles))
    }
}
