//! Memory Region Types
//!
//! Regions as reported by a [`MemoryReader`](crate::MemoryReader) enumerator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Page protection of a region, `rwx` style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Protection {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl Protection {
    pub const READ: Protection = Protection {
        read: true,
        write: false,
        execute: false,
    };

    pub const READ_WRITE: Protection = Protection {
        read: true,
        write: true,
        execute: false,
    };

    pub const READ_EXECUTE: Protection = Protection {
        read: true,
        write: false,
        execute: true,
    };

    /// True if this protection grants every permission `filter` asks for
    pub fn satisfies(&self, filter: &Protection) -> bool {
        (self.read || !filter.read)
            && (self.write || !filter.write)
            && (self.execute || !filter.execute)
    }
}

impl FromStr for Protection {
    type Err = Error;

    /// Parse `r--`, `rw-`, `r-x`, or a /proc maps field like `rw-p`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() < 3 || bytes.len() > 4 {
            return Err(Error::InvalidProtection(s.to_string()));
        }

        let flag = |idx: usize, expected: u8| match bytes[idx] {
            b'-' => Ok(false),
            b if b == expected => Ok(true),
            _ => Err(Error::InvalidProtection(s.to_string())),
        };

        Ok(Protection {
            read: flag(0, b'r')?,
            write: flag(1, b'w')?,
            execute: flag(2, b'x')?,
        })
    }
}

impl fmt::Display for Protection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            if self.read { 'r' } else { '-' },
            if self.write { 'w' } else { '-' },
            if self.execute { 'x' } else { '-' }
        )
    }
}

/// A contiguous span of the target's address space with uniform protection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRegion {
    pub base: u64,
    pub size: u64,
    pub protection: Protection,
}

impl MemoryRegion {
    pub fn new(base: u64, size: u64, protection: Protection) -> Self {
        Self {
            base,
            size,
            protection,
        }
    }

    /// One past the last address, saturating at the top of the address space
    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.size)
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.base && address < self.end()
    }
}
