//! Greedy decode-loop state machine.
//!
//! [`GreedySearch`] owns one run's worth of state: the sequence store, the
//! per-step working buffers, the processor pipeline, and the model
//! collaborator. Per step it runs the model, stages the last-position logits
//! into the reusable score buffer, applies processors, argmaxes per row,
//! folds eos hits into pad tokens, and appends — until every row finished or
//! the maximum length is reached. `finalize` copies beam 0 of every batch
//! row into the output buffer.

use std::sync::Arc;

use tracing::{debug, info};

use crate::engine::executor::ModelExecutor;
use crate::engine::processors::{LogitProcessor, ProcessorContext};
use crate::error::GenerationError;
use crate::memory::static_buffer::StaticBuffer;
use crate::memory::DeviceAllocator;
use crate::sequences::Sequences;
use crate::tensor::{byte_size_of, ElementType};

/// Immutable per-run search parameters.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Number of independent prompts in the batch.
    pub batch_size: usize,
    /// Hypotheses per prompt; 1 for greedy search.
    pub num_beams: usize,
    /// Initial prompt length in tokens.
    pub sequence_length: usize,
    /// Maximum total length (prompt plus generated) per row.
    pub max_length: usize,
    /// Vocabulary size of the model's output distribution.
    pub vocab_size: usize,
    /// Token id that terminates a row.
    pub eos_token_id: u32,
    /// Token id emitted by finished rows until the run ends.
    pub pad_token_id: u32,
}

impl SearchParams {
    /// Rows of decode state: `batch_size × num_beams`.
    pub fn batch_beam_size(&self) -> usize {
        self.batch_size * self.num_beams
    }

    /// Check the parameter invariants, including that the worst-case score
    /// matrix size cannot overflow. Runs before any allocation.
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.batch_size == 0 || self.num_beams == 0 || self.vocab_size == 0 {
            return Err(GenerationError::InvalidParams(
                "batch_size, num_beams and vocab_size must be nonzero".to_string(),
            ));
        }
        if self.sequence_length > self.max_length {
            return Err(GenerationError::InvalidParams(format!(
                "sequence_length {} exceeds max_length {}",
                self.sequence_length, self.max_length
            )));
        }
        if self.eos_token_id as usize >= self.vocab_size
            || self.pad_token_id as usize >= self.vocab_size
        {
            return Err(GenerationError::InvalidParams(format!(
                "eos_token_id {} and pad_token_id {} must be within vocab_size {}",
                self.eos_token_id, self.pad_token_id, self.vocab_size
            )));
        }
        let rows = self
            .batch_size
            .checked_mul(self.num_beams)
            .ok_or_else(|| GenerationError::SizeOverflow("batch_beam_size".to_string()))?;
        // Worst case staged per step: rows × max_length × vocab logits.
        byte_size_of(&[rows, self.max_length, self.vocab_size], ElementType::F32)?;
        Ok(())
    }
}

/// Greedy (argmax) search over one batch of prompts.
pub struct GreedySearch<M: ModelExecutor> {
    params: SearchParams,
    model: M,
    processors: Vec<Box<dyn LogitProcessor>>,
    sequences: Sequences,
    /// Reusable staging block for the `batch_beam_size × vocab_size` score
    /// matrix; allocated once at construction, reinterpreted every step.
    scores: StaticBuffer,
    next_tokens: Vec<u32>,
    sequence_lengths: Vec<i32>,
    next_positions: Vec<i32>,
    eos_seen: Vec<bool>,
    output: Vec<u32>,
    first_run: bool,
    done: bool,
}

impl<M: ModelExecutor> GreedySearch<M> {
    /// Build the engine for one run.
    ///
    /// `input_ids` is the row-major `batch_size × sequence_length` prompt;
    /// it is replicated across beams when `num_beams > 1`. All working
    /// buffers are sized for the worst case here; the decode loop itself
    /// never allocates. Calls the executor's `create_inputs` before
    /// returning.
    pub fn new(
        params: SearchParams,
        input_ids: &[u32],
        mut model: M,
        allocator: Arc<dyn DeviceAllocator>,
    ) -> Result<Self, GenerationError> {
        params.validate()?;
        if input_ids.len() != params.batch_size * params.sequence_length {
            return Err(GenerationError::InvalidParams(format!(
                "input_ids length {} does not match batch_size {} × sequence_length {}",
                input_ids.len(),
                params.batch_size,
                params.sequence_length
            )));
        }

        let rows = params.batch_beam_size();
        let expanded = expand_across_beams(input_ids, params.batch_size, params.num_beams);
        let sequences = Sequences::new(&expanded, rows, params.sequence_length, params.max_length);

        // Score rows are inspected on the host by every processor; a
        // device-placed allocator implies staging copies on that path.
        let score_placement = allocator.placement();
        let mut scores = StaticBuffer::new(allocator);
        scores
            .get_or_create(&[rows, params.vocab_size], ElementType::F32)?
            .fill_zero();

        let sequence_lengths = vec![params.sequence_length as i32; rows];
        let next_positions = sequence_lengths.clone();

        model.create_inputs(&sequence_lengths)?;

        // A prompt already at max_length has nothing left to generate.
        let done = params.sequence_length == params.max_length;

        info!(
            batch_size = params.batch_size,
            num_beams = params.num_beams,
            sequence_length = params.sequence_length,
            max_length = params.max_length,
            vocab_size = params.vocab_size,
            score_placement = %score_placement,
            "Search engine initialized"
        );

        Ok(Self {
            output: vec![0u32; params.batch_size * params.max_length],
            next_tokens: vec![0u32; rows],
            eos_seen: vec![false; rows],
            sequence_lengths,
            next_positions,
            params,
            model,
            processors: Vec::new(),
            sequences,
            scores,
            first_run: true,
            done,
        })
    }

    /// Register a processor; passes run in registration order each step.
    pub fn push_processor(&mut self, processor: Box<dyn LogitProcessor>) {
        self.processors.push(processor);
    }

    /// Whether every row finished or the maximum length was reached.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// The run parameters.
    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    /// The sequence store (read-only).
    pub fn sequences(&self) -> &Sequences {
        &self.sequences
    }

    /// One row's mutable score slice for the current step.
    ///
    /// # Panics
    /// Panics if `row` is out of range.
    pub fn scores(&mut self, row: usize) -> Result<&mut [f32], GenerationError> {
        let rows = self.params.batch_beam_size();
        assert!(row < rows, "row {} out of range ({} rows)", row, rows);
        let vocab = self.params.vocab_size;
        let view = self.scores.get_or_create(&[rows, vocab], ElementType::F32)?;
        Ok(&mut view.into_f32_mut()[row * vocab..(row + 1) * vocab])
    }

    /// Run one forward pass and stage the last position's logits per row
    /// into the score buffer.
    ///
    /// The first call runs on the full prompt; later calls pass the newest
    /// tokens and positions through `update_inputs` first. A logits tensor
    /// of the wrong rank, row count, or vocabulary width is fatal.
    pub fn run_model_step(&mut self) -> Result<(), GenerationError> {
        if self.first_run {
            self.first_run = false;
        } else {
            self.model.update_inputs(
                &self.next_tokens,
                &self.next_positions,
                self.params.num_beams,
                self.sequences.sequence_length(),
            )?;
        }
        self.model.run()?;

        let rows = self.params.batch_beam_size();
        let vocab = self.params.vocab_size;
        let logits = self.model.logits();
        let shape = logits.shape();
        if shape.len() != 3 || shape[0] != rows || shape[1] == 0 || shape[2] != vocab {
            let positions = if shape.len() == 3 { shape[1].max(1) } else { 1 };
            return Err(GenerationError::ShapeMismatch {
                expected: vec![rows, positions, vocab],
                actual: shape.to_vec(),
            });
        }
        let input_length = shape[1];
        debug!(step_positions = input_length, "Model step complete");

        // next_token_scores = logits[:, -1, :]
        let dst = self
            .scores
            .get_or_create(&[rows, vocab], ElementType::F32)?
            .into_f32_mut();
        match logits.element_type() {
            ElementType::F32 => {
                let src = logits.as_f32();
                for row in 0..rows {
                    let last = (row * input_length + input_length - 1) * vocab;
                    dst[row * vocab..(row + 1) * vocab].copy_from_slice(&src[last..last + vocab]);
                }
            }
            ElementType::F16 => {
                let src = logits.as_f16_bits();
                for row in 0..rows {
                    let last = (row * input_length + input_length - 1) * vocab;
                    for (d, &bits) in dst[row * vocab..(row + 1) * vocab]
                        .iter_mut()
                        .zip(&src[last..last + vocab])
                    {
                        *d = half::f16::from_bits(bits).to_f32();
                    }
                }
            }
            other => {
                return Err(GenerationError::Execution(format!(
                    "unsupported logits element type {:?}",
                    other
                )));
            }
        }
        Ok(())
    }

    /// Apply the registered processors to the score matrix, in order.
    pub fn apply_processors(&mut self) -> Result<(), GenerationError> {
        if self.processors.is_empty() {
            return Ok(());
        }
        let rows = self.params.batch_beam_size();
        let vocab = self.params.vocab_size;
        let scores = self
            .scores
            .get_or_create(&[rows, vocab], ElementType::F32)?
            .into_f32_mut();
        let mut ctx =
            ProcessorContext::new(scores, vocab, self.params.eos_token_id, &self.sequences);
        for processor in &self.processors {
            debug!(processor = processor.name(), "Applying logit processor");
            processor.process(&mut ctx);
        }
        Ok(())
    }

    /// Pick the argmax token per row; ties break toward the lowest index.
    ///
    /// A row whose best score is non-finite (all-NaN or all negative
    /// infinity) cannot select a token and aborts the run.
    pub fn select_next_tokens(&mut self) -> Result<(), GenerationError> {
        let rows = self.params.batch_beam_size();
        let vocab = self.params.vocab_size;
        let scores = self
            .scores
            .get_or_create(&[rows, vocab], ElementType::F32)?
            .into_f32_mut();
        for row in 0..rows {
            let row_scores = &scores[row * vocab..(row + 1) * vocab];
            let mut best_token = 0u32;
            let mut best_score = f32::NEG_INFINITY;
            for (token, &score) in row_scores.iter().enumerate() {
                if score > best_score {
                    best_score = score;
                    best_token = token as u32;
                }
            }
            if !best_score.is_finite() {
                return Err(GenerationError::MalformedScores { row });
            }
            self.next_tokens[row] = best_token;
        }
        Ok(())
    }

    /// Fold eos hits into the termination flags.
    ///
    /// A row that selected eos, or finished earlier, keeps its flag set and
    /// has its token overwritten with the pad id so fixed-width storage is
    /// never corrupted. Once every row is finished the run is done.
    pub fn update_termination(&mut self) {
        let mut all_finished = true;
        for row in 0..self.next_tokens.len() {
            if self.next_tokens[row] == self.params.eos_token_id || self.eos_seen[row] {
                self.eos_seen[row] = true;
                self.next_tokens[row] = self.params.pad_token_id;
            }
            all_finished &= self.eos_seen[row];
        }
        if all_finished && !self.done {
            debug!("All rows finished");
            self.done = true;
        }
    }

    /// Append the step's tokens (pad-overwritten for finished rows) and
    /// advance lengths and positions. Reaching `max_length` ends the run.
    pub fn append_step(&mut self) -> Result<(), GenerationError> {
        self.sequences.append(&self.next_tokens)?;
        for (length, position) in self
            .sequence_lengths
            .iter_mut()
            .zip(self.next_positions.iter_mut())
        {
            *length += 1;
            *position += 1;
        }
        if self.sequences.sequence_length() == self.params.max_length {
            debug!("Maximum length reached");
            self.done = true;
        }
        Ok(())
    }

    /// One full decode step. Returns `true` when the run is done.
    ///
    /// Tokens computed on the step that turns the done flag are still
    /// appended; the loop simply does not start another step.
    pub fn step(&mut self) -> Result<bool, GenerationError> {
        self.run_model_step()?;
        self.apply_processors()?;
        self.select_next_tokens()?;
        self.update_termination();
        self.append_step()?;
        Ok(self.done)
    }

    /// Drive the loop to completion and finalize.
    pub fn run(&mut self) -> Result<&[u32], GenerationError> {
        while !self.done {
            self.step()?;
        }
        self.finalize();
        Ok(&self.output)
    }

    /// Copy beam 0 of each batch row, full `max_length` wide, into the
    /// output buffer. Idempotent: the sequence store no longer changes.
    pub fn finalize(&mut self) {
        let max_length = self.params.max_length;
        for batch in 0..self.params.batch_size {
            let source = self.sequences.sequence(batch * self.params.num_beams);
            self.output[batch * max_length..(batch + 1) * max_length].copy_from_slice(source);
        }
        info!(
            batch_size = self.params.batch_size,
            final_length = self.sequences.sequence_length(),
            "Search finalized"
        );
    }

    /// The finalized `batch_size × max_length` output, row-major.
    pub fn output(&self) -> &[u32] {
        &self.output
    }

    /// One batch row of the finalized output.
    ///
    /// # Panics
    /// Panics if `batch` is out of range.
    pub fn output_row(&self, batch: usize) -> &[u32] {
        assert!(
            batch < self.params.batch_size,
            "batch {} out of range ({} rows)",
            batch,
            self.params.batch_size
        );
        &self.output[batch * self.params.max_length..(batch + 1) * self.params.max_length]
    }
}

/// Replicate each batch row's prompt `num_beams` times, row-major.
fn expand_across_beams(input_ids: &[u32], batch_size: usize, num_beams: usize) -> Vec<u32> {
    if num_beams == 1 {
        return input_ids.to_vec();
    }
    let sequence_length = input_ids.len() / batch_size;
    let mut expanded = Vec::with_capacity(input_ids.len() * num_beams);
    for batch in 0..batch_size {
        let row = &input_ids[batch * sequence_length..(batch + 1) * sequence_length];
        for _ in 0..num_beams {
            expanded.extend_from_slice(row);
        }
    }
    expanded
}
