//! Decode-loop core for autoregressive token generation.
//!
//! Drives the step-by-step decode loop (run model → extract logits →
//! mutate scores → select tokens → track termination → append) while
//! managing the reusable tensor buffers that back the loop. The model
//! forward pass itself is an external collaborator behind the
//! [`ModelExecutor`] trait; raw memory comes from a [`DeviceAllocator`].

pub mod engine;
pub mod error;
pub mod memory;
pub mod sequences;
pub mod tensor;

pub use engine::executor::ModelExecutor;
pub use engine::processors::{LogitProcessor, MinLength, ProcessorContext, RepetitionPenalty};
pub use engine::search::{GreedySearch, SearchParams};
pub use error::GenerationError;
pub use memory::static_buffer::StaticBuffer;
pub use memory::{DeviceAllocator, HostAllocator, MemoryBlock, MemoryPlacement};
pub use sequences::Sequences;
pub use tensor::{ElementType, TensorView, TensorViewMut};
