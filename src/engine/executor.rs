//! Contract between the decode loop and the model-execution engine.
//!
//! The forward pass is the one long-latency call per step; the engine treats
//! it as a single synchronous operation and does not retry a failed step.
//! Any inference backend exposing these four operations can be plugged in.

use crate::error::GenerationError;
use crate::tensor::TensorView;

/// External model-execution collaborator.
///
/// Call order per run: `create_inputs` once, then for every decode step
/// after the first, `update_inputs` followed by `run`. The first step runs
/// on the full prompt prepared by `create_inputs`.
pub trait ModelExecutor {
    /// Prepare the input state for the prompt pass (input tensor, attention
    /// mask, whatever the backend needs). `sequence_lengths` holds one
    /// prompt length per row.
    fn create_inputs(&mut self, sequence_lengths: &[i32]) -> Result<(), GenerationError>;

    /// Prepare inputs for an incremental step: the newly chosen token per
    /// row, the next decode position per row, and the current stored length.
    fn update_inputs(
        &mut self,
        next_tokens: &[u32],
        next_positions: &[i32],
        num_beams: usize,
        current_length: usize,
    ) -> Result<(), GenerationError>;

    /// Execute one forward pass. Any internal failure aborts the run.
    fn run(&mut self) -> Result<(), GenerationError>;

    /// The logits of the last `run`, shape `(rows, positions, vocab_size)`.
    /// `positions` is the prompt length on the first call and 1 afterwards.
    /// The view is only valid until the next `run`.
    fn logits(&self) -> TensorView<'_>;
}
