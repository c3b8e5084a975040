//! Raw memory collaborator contract and host reference implementation.
//!
//! The decode loop never allocates behind the caller's back: every block it
//! needs comes from a [`DeviceAllocator`], which abstracts over host and
//! accelerator memory. Blocks are released exactly once, when the owning
//! [`MemoryBlock`] is dropped.

pub mod static_buffer;

use crate::error::GenerationError;

/// Which memory space an allocator hands out.
///
/// Used to decide whether host-side staging copies are needed before score
/// buffers can be inspected by logit processors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPlacement {
    Host,
    Device,
}

impl std::fmt::Display for MemoryPlacement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryPlacement::Host => write!(f, "host"),
            MemoryPlacement::Device => write!(f, "device"),
        }
    }
}

/// One owned allocation. Dropping the block returns the memory.
///
/// Storage is kept 8-byte aligned so a prefix can be reinterpreted as any
/// [`crate::tensor::ElementType`] without an alignment fault.
#[derive(Debug)]
pub struct MemoryBlock {
    storage: Vec<u64>,
    len: usize,
    placement: MemoryPlacement,
}

impl MemoryBlock {
    /// Create a zeroed block of `byte_count` bytes.
    pub fn zeroed(byte_count: usize, placement: MemoryPlacement) -> Self {
        let words = byte_count.div_ceil(8);
        Self {
            storage: vec![0u64; words],
            len: byte_count,
            placement,
        }
    }

    /// Size of the block in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the block is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Which memory space the block lives in.
    pub fn placement(&self) -> MemoryPlacement {
        self.placement
    }

    /// The block's bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.storage)[..self.len]
    }

    /// The block's bytes, mutably.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut(&mut self.storage)[..self.len]
    }
}

/// Allocation collaborator: hands out raw blocks in one memory space.
///
/// Implementations must return blocks whose storage is at least 8-byte
/// aligned. Freeing is implicit: the returned [`MemoryBlock`] owns its
/// memory and releases it on drop.
pub trait DeviceAllocator: Send + Sync {
    /// Allocate a zeroed block of `byte_count` bytes.
    fn allocate(&self, byte_count: usize) -> Result<MemoryBlock, GenerationError>;

    /// The memory space this allocator serves.
    fn placement(&self) -> MemoryPlacement;
}

/// Host (CPU) allocator. Always available; the default for search state.
#[derive(Debug, Default)]
pub struct HostAllocator;

impl HostAllocator {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceAllocator for HostAllocator {
    fn allocate(&self, byte_count: usize) -> Result<MemoryBlock, GenerationError> {
        Ok(MemoryBlock::zeroed(byte_count, MemoryPlacement::Host))
    }

    fn placement(&self) -> MemoryPlacement {
        MemoryPlacement::Host
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_allocate_zeroed() {
        let alloc = HostAllocator::new();
        let block = alloc.allocate(17).unwrap();
        assert_eq!(block.len(), 17);
        assert_eq!(block.placement(), MemoryPlacement::Host);
        assert!(block.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_block_alignment() {
        let alloc = HostAllocator::new();
        let block = alloc.allocate(64).unwrap();
        // 8-byte alignment makes every supported element cast valid.
        assert_eq!(block.as_bytes().as_ptr() as usize % 8, 0);
    }

    #[test]
    fn test_block_write_read() {
        let mut block = MemoryBlock::zeroed(8, MemoryPlacement::Host);
        block.as_bytes_mut()[3] = 42;
        assert_eq!(block.as_bytes()[3], 42);
    }

    #[test]
    fn test_empty_block() {
        let block = MemoryBlock::zeroed(0, MemoryPlacement::Device);
        assert!(block.is_empty());
        assert_eq!(block.placement(), MemoryPlacement::Device);
    }

    #[test]
    fn test_placement_display() {
        assert_eq!(MemoryPlacement::Host.to_string(), "host");
        assert_eq!(MemoryPlacement::Device.to_string(), "device");
    }
}
