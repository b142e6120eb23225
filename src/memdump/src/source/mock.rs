//! Mock Memory Reader
//!
//! An in-memory reader for testing the dump pipeline.

use crate::{Error, MemoryReader, MemoryRegion, Protection, Result};

/// A mock reader backed by one buffer per region
#[derive(Default)]
pub struct MockReader {
    /// Regions with their backing bytes
    pub regions: Vec<(MemoryRegion, Vec<u8>)>,
    /// Address ranges `[start, end)` that refuse reads
    pub denied: Vec<(u64, u64)>,
    /// Every `(base, size)` read request, in call order
    pub reads: Vec<(u64, u64)>,
}

impl MockReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a region filled with a repeating byte pattern derived from its base
    pub fn with_region(mut self, base: u64, size: usize, protection: Protection) -> Self {
        let data = (0..size).map(|i| (base as usize + i) as u8).collect();
        self.regions
            .push((MemoryRegion::new(base, size as u64, protection), data));
        self
    }

    /// Add a region with explicit contents
    pub fn with_data(mut self, base: u64, data: Vec<u8>, protection: Protection) -> Self {
        self.regions
            .push((MemoryRegion::new(base, data.len() as u64, protection), data));
        self
    }

    /// Make reads overlapping `[start, start + len)` fail
    pub fn deny(mut self, start: u64, len: u64) -> Self {
        self.denied.push((start, start + len));
        self
    }
}

impl MemoryReader for MockReader {
    fn enumerate_regions(&mut self, filter: Protection) -> Result<Vec<MemoryRegion>> {
        let mut regions: Vec<MemoryRegion> = self
            .regions
            .iter()
            .map(|(r, _)| r.clone())
            .filter(|r| r.protection.satisfies(&filter))
            .collect();
        regions.sort_by_key(|r| r.base);
        Ok(regions)
    }

    fn read_bytes(&mut self, base: u64, size: u64) -> Result<Vec<u8>> {
        self.reads.push((base, size));
        let end = base + size;

        if self.denied.iter().any(|&(s, e)| base < e && s < end) {
            return Err(Error::AccessViolation {
                base,
                size,
                reason: "access denied".to_string(),
            });
        }

        let (region, data) = self
            .regions
            .iter()
            .find(|(r, _)| base >= r.base && end <= r.end())
            .ok_or_else(|| Error::AccessViolation {
                base,
                size,
                reason: "unmapped".to_string(),
            })?;

        let offset = (base - region.base) as usize;
        Ok(data[offset..offset + size as usize].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_reader_read_bytes() {
        let mut reader = MockReader::new().with_data(0x1000, b"ABCD".to_vec(), Protection::READ);

        assert_eq!(reader.read_bytes(0x1000, 4).unwrap(), b"ABCD");
        assert_eq!(reader.read_bytes(0x1001, 2).unwrap(), b"BC");
        assert_eq!(reader.reads, vec![(0x1000, 4), (0x1001, 2)]);
    }

    #[test]
    fn test_mock_reader_out_of_bounds() {
        let mut reader = MockReader::new().with_data(0x1000, vec![0; 4], Protection::READ);

        assert!(reader.read_bytes(0x1002, 10).unwrap_err().is_access_violation());
        assert!(reader.read_bytes(0x500, 4).unwrap_err().is_access_violation());
    }

    #[test]
    fn test_mock_reader_denied() {
        let mut reader = MockReader::new()
            .with_region(0x1000, 0x100, Protection::READ)
            .deny(0x1080, 0x10);

        assert!(reader.read_bytes(0x1000, 0x80).is_ok());
        assert!(reader.read_bytes(0x1070, 0x20).is_err());
    }

    #[test]
    fn test_mock_reader_enumerate_filters() {
        let mut reader = MockReader::new()
            .with_region(0x3000, 0x10, Protection::READ)
            .with_region(0x1000, 0x10, Protection::READ_WRITE)
            .with_region(0x2000, 0x10, Protection::READ_EXECUTE);

        let rw = reader.enumerate_regions(Protection::READ_WRITE).unwrap();
        assert_eq!(rw.len(), 1);
        assert_eq!(rw[0].base, 0x1000);

        let r = reader.enumerate_regions(Protection::READ).unwrap();
        let bases: Vec<u64> = r.iter().map(|r| r.base).collect();
        assert_eq!(bases, vec![0x1000, 0x2000, 0x3000]);
    }
}
