//! Region splitting
//!
//! Oversized regions are read in bounded pieces. Pieces are produced in
//! ascending address order, tile the parent exactly, and are each at most
//! `max_size` bytes; only the last one may be shorter.

use std::num::NonZeroU64;

use crate::MemoryRegion;

/// A sub-span of a region, the unit of a single read request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub base: u64,
    pub size: u64,
}

impl Chunk {
    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.size)
    }
}

/// Iterator over the chunks of a `[base, base + size)` span
#[derive(Debug, Clone)]
pub struct Chunks {
    base: u64,
    remaining: u64,
    max_size: u64,
}

impl Chunks {
    pub fn new(base: u64, size: u64, max_size: NonZeroU64) -> Self {
        Self {
            base,
            remaining: size,
            max_size: max_size.get(),
        }
    }
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.remaining == 0 {
            return None;
        }

        let size = self.remaining.min(self.max_size);
        let chunk = Chunk {
            base: self.base,
            size,
        };

        self.remaining -= size;
        self.base = self.base.wrapping_add(size);
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let count = self.remaining.div_ceil(self.max_size);
        let count = usize::try_from(count).unwrap_or(usize::MAX);
        (count, Some(count))
    }
}

impl ExactSizeIterator for Chunks {}

impl std::iter::FusedIterator for Chunks {}

/// Split a region into pieces of at most `max_size` bytes
///
/// A region that already fits comes back as a single chunk. An empty region
/// yields no chunks.
pub fn split(region: &MemoryRegion, max_size: NonZeroU64) -> Vec<Chunk> {
    Chunks::new(region.base, region.size, max_size).collect()
}
