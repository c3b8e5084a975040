//! Fixed-capacity storage for the growing token sequences of one run.
//!
//! One contiguous arena holds every row's tokens in row-major order, sized
//! for the worst case up front so the append path never allocates. Rows
//! advance in lockstep: finished rows keep receiving pad tokens from the
//! engine, so a single shared length is enough.

use tracing::debug;

use crate::error::GenerationError;

/// Flat `batch_beam_size × max_length` token table.
///
/// The backing buffer is twice that footprint; the second half is reserved
/// for the reorder/copy pass beam search needs when hypotheses move between
/// rows. The greedy path only ever touches the first half.
pub struct Sequences {
    buffer: Vec<u32>,
    batch_beam_size: usize,
    max_length: usize,
    current_length: usize,
}

impl Sequences {
    /// Build the store from row-major prompt tokens
    /// (`batch_beam_size × sequence_length`).
    ///
    /// Each row's prompt lands in the first `sequence_length` columns of its
    /// `max_length`-wide slot; the rest stays zero.
    ///
    /// # Panics
    /// Panics if `input_ids` does not contain exactly
    /// `batch_beam_size × sequence_length` tokens, or if
    /// `sequence_length > max_length`.
    pub fn new(
        input_ids: &[u32],
        batch_beam_size: usize,
        sequence_length: usize,
        max_length: usize,
    ) -> Self {
        assert!(
            sequence_length <= max_length,
            "sequence_length {} exceeds max_length {}",
            sequence_length,
            max_length
        );
        assert_eq!(
            input_ids.len(),
            batch_beam_size * sequence_length,
            "input_ids length {} does not match {} rows of {} tokens",
            input_ids.len(),
            batch_beam_size,
            sequence_length
        );

        let mut buffer = vec![0u32; 2 * batch_beam_size * max_length];
        for row in 0..batch_beam_size {
            let src = &input_ids[row * sequence_length..(row + 1) * sequence_length];
            let dst = &mut buffer[row * max_length..row * max_length + sequence_length];
            dst.copy_from_slice(src);
        }

        debug!(batch_beam_size, sequence_length, max_length, "Initialized sequence store");
        Self {
            buffer,
            batch_beam_size,
            max_length,
            current_length: sequence_length,
        }
    }

    /// Append one token per row at the current length column, then advance
    /// the shared length.
    ///
    /// Callers must check termination first: appending once every row is at
    /// `max_length` is an error, not a silent no-op.
    pub fn append(&mut self, next_tokens: &[u32]) -> Result<(), GenerationError> {
        assert_eq!(
            next_tokens.len(),
            self.batch_beam_size,
            "next_tokens length {} does not match row count {}",
            next_tokens.len(),
            self.batch_beam_size
        );
        if self.current_length >= self.max_length {
            return Err(GenerationError::SequenceCapacityExceeded {
                length: self.current_length,
                max_length: self.max_length,
            });
        }

        for (row, &token) in next_tokens.iter().enumerate() {
            self.buffer[row * self.max_length + self.current_length] = token;
        }
        self.current_length += 1;
        Ok(())
    }

    /// The shared current length (rows advance in lockstep).
    pub fn sequence_length(&self) -> usize {
        self.current_length
    }

    /// Number of rows.
    pub fn batch_beam_size(&self) -> usize {
        self.batch_beam_size
    }

    /// Maximum length each row can reach.
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// One row, full `max_length` wide: written tokens followed by zero
    /// padding. Used by processors (repetition scanning) and finalize.
    ///
    /// # Panics
    /// Panics if `row` is out of range.
    pub fn sequence(&self, row: usize) -> &[u32] {
        assert!(
            row < self.batch_beam_size,
            "row {} out of range ({} rows)",
            row,
            self.batch_beam_size
        );
        &self.buffer[row * self.max_length..(row + 1) * self.max_length]
    }
}
