//! Buffer-reuse cache for per-step decode tensors.
//!
//! Decode loops produce the same tensor shapes every step; allocating and
//! freeing them in that hot path is the dominant avoidable overhead. A
//! [`StaticBuffer`] allocates once, on the first request, then serves every
//! later request by reinterpreting a prefix of the same block. It is a reuse
//! cache, not a general allocator: a request larger than the first one is a
//! caller configuration error (size the first request for the run's maximum).

use std::sync::Arc;

use tracing::debug;

use crate::error::GenerationError;
use crate::memory::{DeviceAllocator, MemoryBlock};
use crate::tensor::{byte_size_of, ElementType, TensorViewMut};

/// One reusable memory block serving tensor views of varying shape and type.
pub struct StaticBuffer {
    allocator: Arc<dyn DeviceAllocator>,
    block: Option<MemoryBlock>,
    capacity_bytes: usize,
}

impl StaticBuffer {
    /// Create an empty cache drawing from `allocator`. Nothing is allocated
    /// until the first [`get_or_create`](Self::get_or_create).
    pub fn new(allocator: Arc<dyn DeviceAllocator>) -> Self {
        Self {
            allocator,
            block: None,
            capacity_bytes: 0,
        }
    }

    /// Return a tensor view of `shape`/`elem` backed by the cached block.
    ///
    /// The first call allocates exactly the requested byte size and records
    /// it as the capacity. Later calls may use any shape and element type
    /// whose byte size fits the capacity; the same block is reinterpreted,
    /// never moved or copied. Requests beyond capacity fail with
    /// [`GenerationError::BufferCapacityExceeded`].
    pub fn get_or_create(
        &mut self,
        shape: &[usize],
        elem: ElementType,
    ) -> Result<TensorViewMut<'_>, GenerationError> {
        let bytes = byte_size_of(shape, elem)?;

        if self.block.is_none() {
            debug!(?shape, ?elem, bytes, placement = %self.allocator.placement(), "Allocating static buffer");
            self.block = Some(self.allocator.allocate(bytes)?);
            self.capacity_bytes = bytes;
        } else if bytes > self.capacity_bytes {
            return Err(GenerationError::BufferCapacityExceeded {
                requested: bytes,
                capacity: self.capacity_bytes,
            });
        }

        let block = self.block.as_mut().expect("block allocated above");
        let prefix = &mut block.as_bytes_mut()[..bytes];
        Ok(TensorViewMut::new(shape, elem, prefix))
    }

    /// Capacity in bytes, zero before the first request.
    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }
}
