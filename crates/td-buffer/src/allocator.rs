//! Shared pool of fixed-size byte blocks.
//!
//! One [`Allocator`] is shared (via `Arc`) by every sample queue of a
//! playback session. Blocks handed back with [`Allocator::release`] are kept
//! for reuse until [`Allocator::trim`] shrinks the pool toward the target size.

use parking_lot::Mutex;
use td_core::config::BufferConfig;

/// A block of memory obtained from an [`Allocator`].
#[derive(Debug)]
pub struct Allocation {
    data: Box<[u8]>,
}

impl Allocation {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

#[derive(Debug, Default)]
struct PoolState {
    available: Vec<Allocation>,
    allocated_count: usize,
    target_buffer_size: usize,
}

/// Pool of [`Allocation`]s of a single fixed length.
#[derive(Debug)]
pub struct Allocator {
    individual_allocation_length: usize,
    state: Mutex<PoolState>,
}

impl Allocator {
    /// Create an allocator handing out blocks of `individual_allocation_length` bytes.
    pub fn new(individual_allocation_length: usize) -> Self {
        assert!(individual_allocation_length > 0, "allocation length must be positive");
        Self {
            individual_allocation_length,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Create an allocator from the buffer section of the engine config.
    pub fn from_config(config: &BufferConfig) -> Self {
        let allocator = Self::new(config.allocation_length.max(1));
        allocator.set_target_buffer_size(config.target_buffer_bytes);
        allocator
    }

    pub fn individual_allocation_length(&self) -> usize {
        self.individual_allocation_length
    }

    /// Take a block from the pool, creating a new one if the pool is empty.
    pub fn allocate(&self) -> Allocation {
        let mut state = self.state.lock();
        state.allocated_count += 1;
        match state.available.pop() {
            Some(allocation) => allocation,
            None => Allocation {
                data: vec![0u8; self.individual_allocation_length].into_boxed_slice(),
            },
        }
    }

    /// Return a block to the pool.
    pub fn release(&self, allocation: Allocation) {
        self.release_all(std::iter::once(allocation));
    }

    /// Return several blocks to the pool under a single lock.
    pub fn release_all(&self, allocations: impl IntoIterator<Item = Allocation>) {
        let mut state = self.state.lock();
        for allocation in allocations {
            assert_eq!(
                allocation.len(),
                self.individual_allocation_length,
                "released a block from a different allocator"
            );
            assert!(
                state.allocated_count > 0,
                "released more blocks than were allocated"
            );
            state.allocated_count -= 1;
            state.available.push(allocation);
        }
    }

    /// Set the number of bytes the pool tries to stay under after [`trim`](Self::trim).
    pub fn set_target_buffer_size(&self, target_buffer_size: usize) {
        let shrinking = {
            let mut state = self.state.lock();
            let shrinking = target_buffer_size < state.target_buffer_size;
            state.target_buffer_size = target_buffer_size;
            shrinking
        };
        if shrinking {
            self.trim();
        }
    }

    /// Drop pooled blocks until allocated plus pooled blocks fit the target size.
    pub fn trim(&self) {
        let mut state = self.state.lock();
        let target_allocation_count = state
            .target_buffer_size
            .div_ceil(self.individual_allocation_length);
        let target_available_count = target_allocation_count.saturating_sub(state.allocated_count);
        if target_available_count < state.available.len() {
            let dropped = state.available.len() - target_available_count;
            state.available.truncate(target_available_count);
            tracing::debug!(dropped, "trimmed allocator pool");
        }
    }

    /// Bytes currently handed out and not yet released.
    pub fn total_bytes_allocated(&self) -> usize {
        self.state.lock().allocated_count * self.individual_allocation_length
    }

    /// Number of blocks sitting in the pool ready for reuse.
    pub fn available_count(&self) -> usize {
        self.state.lock().available.len()
    }
}
