//! # memdump
//!
//! Chunked memory dumping of a running process, plus post-processing of the
//! resulting dump files.
//!
//! The pipeline has two halves:
//! - Dumping: regions reported by a [`MemoryReader`] are split into bounded
//!   chunks ([`chunk`]), read one leaf at a time and persisted as one file per
//!   leaf ([`writer`]). Failed leaves are recorded, never fatal ([`dump`]).
//! - Post-processing: dump files are scanned for printable runs
//!   ([`strings`]), filtered against deny patterns ([`deny`]) and matched
//!   against categorized regexes ([`findings`]), see [`scan`].
//!
//! ## Example
//!
//! ```no_run
//! use memdump::{DumpConfig, MemoryReader, NoProgress, Protection, ProcessReader};
//!
//! # fn main() -> memdump::Result<()> {
//! let mut reader = ProcessReader::attach("target-app")?;
//! let regions = reader.enumerate_regions("rw-".parse::<Protection>()?)?;
//!
//! let config = DumpConfig::new("dump");
//! let manifest = memdump::dump_regions(&mut reader, &regions, &config, &NoProgress);
//! println!("{} dumped, {} failed", manifest.succeeded(), manifest.failed());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

pub mod chunk;
pub mod deny;
pub mod dump;
pub mod findings;
pub mod progress;
pub mod region;
pub mod scan;
pub mod source;
pub mod strings;
pub mod writer;

#[doc(inline)]
pub use chunk::{split, Chunk, Chunks};
#[doc(inline)]
pub use deny::DenyFilter;
#[doc(inline)]
pub use dump::{dump_regions, DumpConfig, DumpManifest, LeafOutcome, LeafRecord};
#[doc(inline)]
pub use findings::{default_categories, Extractor, Findings, RegexCategory};
#[doc(inline)]
pub use progress::{NoProgress, Progress};
#[doc(inline)]
pub use region::{MemoryRegion, Protection};
#[doc(inline)]
pub use scan::{post_process, PostProcessReport, ScanConfig};
#[doc(inline)]
pub use source::{AgentReader, MemoryReader, ProcessReader};
#[doc(inline)]
pub use strings::{StringMatch, Strings};
#[doc(inline)]
pub use writer::DumpWriter;

/// Default upper bound for a single read request (20 MiB)
pub const DEFAULT_MAX_CHUNK_SIZE: u64 = 20 * 1024 * 1024;

/// Default minimum length of an extracted printable run
pub const DEFAULT_MIN_STRING_LENGTH: usize = 4;

/// Errors from dumping and post-processing
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("access violation reading {size:#x} bytes at {base:#x}: {reason}")]
    AccessViolation { base: u64, size: u64, reason: String },

    #[error("dump file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Invalid protection string: {0:?}")]
    InvalidProtection(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// True when the reader refused the read, as opposed to a local failure
    pub fn is_access_violation(&self) -> bool {
        matches!(self, Error::AccessViolation { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
