//! The decode-loop engine.
//!
//! - [`search`]: [`GreedySearch`](search::GreedySearch), the per-run state
//!   machine driving model steps, token selection, and finalization.
//! - [`processors`]: score-mutation passes applied before selection.
//! - [`executor`]: the [`ModelExecutor`](executor::ModelExecutor) contract
//!   the external forward-pass engine implements.

pub mod executor;
pub mod processors;
pub mod search;

pub use executor::ModelExecutor;
pub use processors::{LogitProcessor, MinLength, ProcessorContext, RepetitionPenalty};
pub use search::{GreedySearch, SearchParams};
