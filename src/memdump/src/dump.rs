//! Dump orchestration
//!
//! Drives every enumerated region through splitting, reading and writing.
//! A failed leaf is recorded and the run moves on; nothing short of setup
//! failure stops a dump.

use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::chunk::{Chunk, Chunks};
use crate::{DumpWriter, MemoryReader, MemoryRegion, Progress, Result, DEFAULT_MAX_CHUNK_SIZE};

/// Name of the per-run failure log inside the output directory
pub const VIOLATIONS_FILE: &str = "access_violations.log";

/// Name of the run summary inside the output directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// Settings for one dump run
#[derive(Debug, Clone)]
pub struct DumpConfig {
    pub output_dir: PathBuf,
    pub max_chunk_size: NonZeroU64,
    /// Replace dump files left by an earlier run in the same directory
    pub overwrite: bool,
}

impl DumpConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            max_chunk_size: NonZeroU64::new(DEFAULT_MAX_CHUNK_SIZE)
                .unwrap_or(NonZeroU64::MIN),
            overwrite: false,
        }
    }

    pub fn with_max_chunk_size(mut self, max_chunk_size: NonZeroU64) -> Self {
        self.max_chunk_size = max_chunk_size;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// What happened to one leaf
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LeafOutcome {
    Dumped { file: PathBuf },
    AccessViolation { reason: String },
    /// The reader failed for a reason other than the target refusing access
    ReadFailed { reason: String },
    WriteFailed { reason: String },
}

impl LeafOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LeafOutcome::Dumped { .. })
    }

    fn kind(&self) -> &'static str {
        match self {
            LeafOutcome::Dumped { .. } => "dumped",
            LeafOutcome::AccessViolation { .. } => "access-violation",
            LeafOutcome::ReadFailed { .. } => "read-failed",
            LeafOutcome::WriteFailed { .. } => "write-failed",
        }
    }
}

/// One read/write attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeafRecord {
    /// Index of the parent region in enumeration order
    pub region: usize,
    pub base: u64,
    pub size: u64,
    #[serde(flatten)]
    pub outcome: LeafOutcome,
}

/// Everything a run attempted, in attempt order
#[derive(Debug, Clone, Default, Serialize)]
pub struct DumpManifest {
    pub regions: usize,
    pub leaves: Vec<LeafRecord>,
}

impl DumpManifest {
    pub fn succeeded(&self) -> usize {
        self.leaves.iter().filter(|l| l.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.leaves.len() - self.succeeded()
    }

    /// Leaves that could not be read or written
    pub fn failures(&self) -> impl Iterator<Item = &LeafRecord> {
        self.leaves.iter().filter(|l| !l.outcome.is_success())
    }

    /// Dump files produced by the run
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.leaves.iter().filter_map(|l| match &l.outcome {
            LeafOutcome::Dumped { file } => Some(file.as_path()),
            _ => None,
        })
    }

    /// Write the manifest as JSON into `dir`
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        Ok(path)
    }
}

/// Append-only text log of failed leaves, opened on first failure
struct ViolationLog {
    path: PathBuf,
    file: Option<File>,
}

impl ViolationLog {
    fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(VIOLATIONS_FILE),
            file: None,
        }
    }

    fn record(&mut self, leaf: &LeafRecord, reason: &str) {
        if let Err(e) = self.append(leaf, reason) {
            warn!("Could not append to {}: {}", self.path.display(), e);
        }
    }

    fn append(&mut self, leaf: &LeafRecord, reason: &str) -> std::io::Result<()> {
        if self.file.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            self.file = Some(file);
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };

        let reason = reason.replace(['\n', '\t'], " ");
        writeln!(
            file,
            "{:#018x}\t{:#x}\t{}\t{}",
            leaf.base,
            leaf.size,
            leaf.outcome.kind(),
            reason
        )
    }
}

/// Dump every region through `reader` into `config.output_dir`
///
/// Regions larger than `config.max_chunk_size` are split and each chunk is
/// read on its own, in ascending address order. Each leaf is attempted
/// exactly once. Progress reports `(regions completed, total regions)` after
/// every leaf.
pub fn dump_regions<R: MemoryReader + ?Sized>(
    reader: &mut R,
    regions: &[MemoryRegion],
    config: &DumpConfig,
    progress: &dyn Progress,
) -> DumpManifest {
    let writer = DumpWriter::new(&config.output_dir, config.overwrite);
    let mut violations = ViolationLog::new(&config.output_dir);
    let mut manifest = DumpManifest {
        regions: regions.len(),
        leaves: Vec::new(),
    };

    for (index, region) in regions.iter().enumerate() {
        debug!(
            "Region {}/{}: base {:#x}, size {:#x} ({})",
            index + 1,
            regions.len(),
            region.base,
            region.size,
            region.protection
        );

        // Oversized regions are split, anything else is its own single leaf
        let leaves: Vec<Chunk> = if region.size > config.max_chunk_size.get() {
            debug!("Too big, splitting into chunks of {:#x}", config.max_chunk_size.get());
            Chunks::new(region.base, region.size, config.max_chunk_size).collect()
        } else {
            vec![Chunk {
                base: region.base,
                size: region.size,
            }]
        };

        let last = leaves.len().saturating_sub(1);
        for (i, chunk) in leaves.into_iter().enumerate() {
            let record = dump_leaf(reader, &writer, index, chunk);

            match &record.outcome {
                LeafOutcome::Dumped { file } => debug!("Wrote {}", file.display()),
                LeafOutcome::AccessViolation { reason }
                | LeafOutcome::ReadFailed { reason }
                | LeafOutcome::WriteFailed { reason } => {
                    warn!(
                        "Leaf {:#x} ({:#x} bytes) {}: {}",
                        record.base,
                        record.size,
                        record.outcome.kind(),
                        reason
                    );
                    violations.record(&record, reason);
                }
            }
            manifest.leaves.push(record);

            let completed = if i == last { index + 1 } else { index };
            progress.advance(completed, regions.len());
        }
    }

    progress.finish();
    manifest
}

fn dump_leaf<R: MemoryReader + ?Sized>(
    reader: &mut R,
    writer: &DumpWriter,
    region: usize,
    chunk: Chunk,
) -> LeafRecord {
    let outcome = match reader.read_bytes(chunk.base, chunk.size) {
        Ok(bytes) => match writer.write(chunk.base, &bytes) {
            Ok(file) => LeafOutcome::Dumped { file },
            Err(e) => LeafOutcome::WriteFailed {
                reason: e.to_string(),
            },
        },
        Err(e) if e.is_access_violation() => LeafOutcome::AccessViolation {
            reason: e.to_string(),
        },
        Err(e) => LeafOutcome::ReadFailed {
            reason: e.to_string(),
        },
    };

    LeafRecord {
        region,
        base: chunk.base,
        size: chunk.size,
        outcome,
    }
}
