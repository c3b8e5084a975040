//! Logit processors: in-place score mutation before token selection.
//!
//! A processor is a stateless pass over the per-row score matrix. Processors
//! compose by sequential application in the order the caller registered
//! them; there is no implicit priority. Further passes (top-k/top-p,
//! temperature, bad-word suppression) implement the same trait.

use std::collections::HashSet;

use crate::sequences::Sequences;

/// Everything a processor may look at for one step: the mutable score
/// matrix plus the read-only sequence state behind it.
pub struct ProcessorContext<'a> {
    scores: &'a mut [f32],
    vocab_size: usize,
    eos_token_id: u32,
    sequences: &'a Sequences,
}

impl<'a> ProcessorContext<'a> {
    /// Wrap one step's score matrix (`batch_beam_size × vocab_size`).
    ///
    /// # Panics
    /// Panics if the score slice does not match the sequence store's row
    /// count times `vocab_size`.
    pub fn new(
        scores: &'a mut [f32],
        vocab_size: usize,
        eos_token_id: u32,
        sequences: &'a Sequences,
    ) -> Self {
        assert_eq!(
            scores.len(),
            sequences.batch_beam_size() * vocab_size,
            "score matrix length {} does not match {} rows × vocab {}",
            scores.len(),
            sequences.batch_beam_size(),
            vocab_size
        );
        Self {
            scores,
            vocab_size,
            eos_token_id,
            sequences,
        }
    }

    /// Number of rows in the score matrix.
    pub fn batch_beam_size(&self) -> usize {
        self.sequences.batch_beam_size()
    }

    /// Current (uniform) stored sequence length.
    pub fn sequence_length(&self) -> usize {
        self.sequences.sequence_length()
    }

    /// The end-of-sequence token id for this run.
    pub fn eos_token_id(&self) -> u32 {
        self.eos_token_id
    }

    /// One row's mutable score slice.
    pub fn row_scores_mut(&mut self, row: usize) -> &mut [f32] {
        &mut self.scores[row * self.vocab_size..(row + 1) * self.vocab_size]
    }

    /// One row's full padded token sequence.
    pub fn sequence(&self, row: usize) -> &[u32] {
        self.sequences.sequence(row)
    }
}

/// A score-mutation pass. Implementations must be pure with respect to the
/// context: same context in, same mutation out.
pub trait LogitProcessor: Send + Sync {
    /// Short name for step logging.
    fn name(&self) -> &'static str;

    /// Mutate the score matrix in place.
    fn process(&self, ctx: &mut ProcessorContext<'_>);
}

/// Suppresses end-of-sequence until the stored length reaches a minimum.
///
/// While below the minimum, the eos score of every row is forced to
/// `f32::MIN` so argmax can never pick it. No-op once the minimum is met.
pub struct MinLength {
    min_length: usize,
}

impl MinLength {
    pub fn new(min_length: usize) -> Self {
        Self { min_length }
    }
}

impl LogitProcessor for MinLength {
    fn name(&self) -> &'static str {
        "min_length"
    }

    fn process(&self, ctx: &mut ProcessorContext<'_>) {
        if ctx.sequence_length() >= self.min_length {
            return;
        }
        let eos = ctx.eos_token_id() as usize;
        for row in 0..ctx.batch_beam_size() {
            ctx.row_scores_mut(row)[eos] = f32::MIN;
        }
    }
}

/// Penalizes every token id already present in a row's sequence.
///
/// Negative scores are multiplied by the penalty, non-negative scores
/// divided, so a penalty above 1.0 always makes a seen token less likely.
/// This assumes a model's scores are consistently signed (all positive or
/// all negative), not a mixture.
pub struct RepetitionPenalty {
    penalty: f32,
}

impl RepetitionPenalty {
    /// # Panics
    /// Panics if `penalty` is not strictly positive.
    pub fn new(penalty: f32) -> Self {
        assert!(penalty > 0.0, "repetition penalty must be > 0, got {}", penalty);
        Self { penalty }
    }
}

impl LogitProcessor for RepetitionPenalty {
    fn name(&self) -> &'static str {
        "repetition_penalty"
    }

    fn process(&self, ctx: &mut ProcessorContext<'_>) {
        let vocab_size = ctx.vocab_size;
        for row in 0..ctx.batch_beam_size() {
            let unique_ids: HashSet<u32> = ctx.sequence(row).iter().copied().collect();
            let scores = ctx.row_scores_mut(row);
            for id in unique_ids {
                let id = id as usize;
                if id >= vocab_size {
                    continue;
                }
                let score = scores[id];
                scores[id] = if score < 0.0 {
                    score * self.penalty
                } else {
                    score / self.penalty
                };
            }
        }
    }
}
