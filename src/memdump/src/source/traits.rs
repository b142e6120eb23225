//! Memory Reader Trait

use crate::{MemoryRegion, Protection, Result};

/// Enumerates and reads the address space of a target process
///
/// Bindings are assumed to serialize requests against the target, so both
/// operations take `&mut self` and the dump pipeline never calls them
/// concurrently. A range the target refuses is reported as
/// [`Error::AccessViolation`](crate::Error::AccessViolation); any other error
/// is a transport or binding failure. Neither is retried by the pipeline.
pub trait MemoryReader {
    /// List regions whose protection satisfies `filter`, in address order
    fn enumerate_regions(&mut self, filter: Protection) -> Result<Vec<MemoryRegion>>;

    /// Read `size` bytes starting at `base`
    fn read_bytes(&mut self, base: u64, size: u64) -> Result<Vec<u8>>;
}

impl<R: MemoryReader + ?Sized> MemoryReader for Box<R> {
    fn enumerate_regions(&mut self, filter: Protection) -> Result<Vec<MemoryRegion>> {
        (**self).enumerate_regions(filter)
    }

    fn read_bytes(&mut self, base: u64, size: u64) -> Result<Vec<u8>> {
        (**self).read_bytes(base, size)
    }
}
