use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Invalid search parameters: {0}")]
    InvalidParams(String),

    #[error("Size computation overflowed: {0}")]
    SizeOverflow(String),

    #[error("Allocation failed: {0}")]
    Allocation(String),

    #[error("Buffer capacity exceeded: requested {requested} bytes, capacity {capacity}")]
    BufferCapacityExceeded { requested: usize, capacity: usize },

    #[error("Sequence capacity exceeded: length {length} already at max_length {max_length}")]
    SequenceCapacityExceeded { length: usize, max_length: usize },

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Model execution failed: {0}")]
    Execution(String),

    #[error("No finite score in row {row}: cannot select a token")]
    MalformedScores { row: usize },
}
