//! Ring of fixed-size allocation blocks covering a contiguous, monotonically
//! increasing absolute byte range.
//!
//! The queue owns the half-open range `[first_position, total_bytes_written)`.
//! The last node is always the write node: it contains the write frontier and
//! is materialized lazily on the first byte written into it. Released blocks
//! go straight back to the shared [`Allocator`].

use std::collections::VecDeque;
use std::sync::Arc;

use crate::allocator::{Allocation, Allocator};

/// One block of the chain.
#[derive(Debug)]
struct AllocationNode {
    start: u64,
    end: u64,
    allocation: Option<Allocation>,
}

impl AllocationNode {
    fn new(start: u64, length: usize) -> Self {
        Self {
            start,
            end: start + length as u64,
            allocation: None,
        }
    }

    fn translate(&self, absolute: u64) -> usize {
        (absolute - self.start) as usize
    }
}

/// Byte storage for the samples of one track.
#[derive(Debug)]
pub struct SampleDataQueue {
    allocator: Arc<Allocator>,
    allocation_length: usize,
    nodes: VecDeque<AllocationNode>,
    read_position: u64,
    total_bytes_written: u64,
}

impl SampleDataQueue {
    pub fn new(allocator: Arc<Allocator>) -> Self {
        let allocation_length = allocator.individual_allocation_length();
        let mut nodes = VecDeque::new();
        nodes.push_back(AllocationNode::new(0, allocation_length));
        Self {
            allocator,
            allocation_length,
            nodes,
            read_position: 0,
            total_bytes_written: 0,
        }
    }

    /// Release every block and restart the offset space at zero.
    pub fn reset(&mut self) {
        self.release_nodes_from(0);
        self.nodes.clear();
        self.nodes
            .push_back(AllocationNode::new(0, self.allocation_length));
        self.read_position = 0;
        self.total_bytes_written = 0;
    }

    /// Offset of the oldest byte still retained.
    pub fn first_position(&self) -> u64 {
        self.nodes.front().map_or(self.total_bytes_written, |n| n.start)
    }

    /// Offset one past the last byte consumed by [`read_to_slice`](Self::read_to_slice).
    pub fn read_position(&self) -> u64 {
        self.read_position
    }

    /// Offset of the next byte to be appended.
    pub fn total_bytes_written(&self) -> u64 {
        self.total_bytes_written
    }

    /// Move the read cursor back to the oldest retained byte.
    pub fn rewind(&mut self) {
        self.read_position = self.first_position();
    }

    /// Append bytes at the write frontier, materializing blocks as needed.
    pub fn append(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let length = self.allocation_length;
            let Some(node) = self.nodes.back_mut() else {
                unreachable!("allocation chain is never empty");
            };
            let allocation = node
                .allocation
                .get_or_insert_with(|| self.allocator.allocate());
            let offset = (self.total_bytes_written - node.start) as usize;
            let count = data.len().min(length - offset);
            allocation.as_mut_slice()[offset..offset + count].copy_from_slice(&data[..count]);
            data = &data[count..];
            self.total_bytes_written += count as u64;

            if self.total_bytes_written == node.end {
                let next_start = node.end;
                self.nodes
                    .push_back(AllocationNode::new(next_start, length));
            }
        }
    }

    /// Copy `dest.len()` bytes starting at `absolute_position` into `dest`.
    ///
    /// # Panics
    ///
    /// Panics if any requested byte has been released or not yet written.
    pub fn read_to_slice(&mut self, absolute_position: u64, dest: &mut [u8]) {
        let first = self.first_position();
        let end = absolute_position + dest.len() as u64;
        assert!(
            absolute_position >= first,
            "read at {absolute_position} precedes the first retained byte {first}"
        );
        assert!(
            end <= self.total_bytes_written,
            "read to {end} passes the write frontier {}",
            self.total_bytes_written
        );

        let mut position = absolute_position;
        let mut written = 0;
        let mut index = self.node_index(position);
        while written < dest.len() {
            let node = &self.nodes[index];
            let Some(allocation) = node.allocation.as_ref() else {
                unreachable!("node below the write frontier is not materialized");
            };
            let offset = node.translate(position);
            let count = (dest.len() - written).min(self.allocation_length - offset);
            dest[written..written + count]
                .copy_from_slice(&allocation.as_slice()[offset..offset + count]);
            written += count;
            position += count as u64;
            index += 1;
        }
        self.read_position = end;
    }

    /// Release every block that lies wholly before `absolute_position`.
    ///
    /// The read cursor is advanced first if it lags the release point.
    pub fn discard_downstream_to(&mut self, absolute_position: u64) {
        assert!(
            absolute_position <= self.total_bytes_written,
            "discard to {absolute_position} passes the write frontier {}",
            self.total_bytes_written
        );
        if self.read_position < absolute_position {
            self.read_position = absolute_position;
        }

        let mut released = Vec::new();
        while self.nodes.len() > 1 && self.nodes[0].end <= absolute_position {
            if let Some(node) = self.nodes.pop_front() {
                released.extend(node.allocation);
            }
        }
        if !released.is_empty() {
            tracing::debug!(
                blocks = released.len(),
                first_position = self.first_position(),
                "released sample data blocks"
            );
            self.allocator.release_all(released);
        }
    }

    /// Roll the write frontier back to `absolute_position`, releasing any
    /// block that no longer holds a retained byte.
    pub fn discard_upstream_sample_bytes(&mut self, absolute_position: u64) {
        let first = self.first_position();
        assert!(
            absolute_position >= first && absolute_position <= self.total_bytes_written,
            "upstream discard to {absolute_position} outside [{first}, {}]",
            self.total_bytes_written
        );
        self.total_bytes_written = absolute_position;

        let keep = self.node_index(absolute_position) + 1;
        self.release_nodes_from(keep);
        self.nodes.truncate(keep);
        // A write node starting exactly at the frontier holds nothing retained.
        if let Some(back) = self.nodes.back_mut() {
            if back.start == absolute_position {
                if let Some(allocation) = back.allocation.take() {
                    self.allocator.release(allocation);
                }
            }
        }
        if self.read_position > absolute_position {
            self.read_position = absolute_position;
        }
    }

    /// Number of bytes retained between the first retained byte and the write frontier.
    pub fn retained_bytes(&self) -> u64 {
        self.total_bytes_written - self.first_position()
    }

    fn node_index(&self, absolute_position: u64) -> usize {
        ((absolute_position - self.first_position()) / self.allocation_length as u64) as usize
    }

    fn release_nodes_from(&mut self, index: usize) {
        let released: Vec<Allocation> = self
            .nodes
            .iter_mut()
            .skip(index)
            .filter_map(|node| node.allocation.take())
            .collect();
        if !released.is_empty() {
            self.allocator.release_all(released);
        }
    }
}

impl Drop for SampleDataQueue {
    fn drop(&mut self) {
        self.release_nodes_from(0);
    }
}
