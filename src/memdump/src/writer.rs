//! Dump file persistence
//!
//! One file per successfully read leaf, named from its base address so that
//! two runs against the same layout produce the same file names.

use std::fs;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

const DUMP_SUFFIX: &str = "_dump.data";
const PARTIAL_SUFFIX: &str = ".part";

/// File name for a leaf starting at `base`
///
/// Zero padded so that lexical order matches address order.
pub fn dump_file_name(base: u64) -> String {
    format!("0x{:016x}{}", base, DUMP_SUFFIX)
}

/// Recover the base address from a dump file name
pub fn parse_dump_file_name(name: &str) -> Option<u64> {
    let hex = name.strip_suffix(DUMP_SUFFIX)?.strip_prefix("0x")?;
    u64::from_str_radix(hex, 16).ok()
}

/// True if `path` names a completed dump file
pub fn is_dump_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(parse_dump_file_name)
        .is_some()
}

/// Writes leaf contents into a flat output directory
#[derive(Debug, Clone)]
pub struct DumpWriter {
    dir: PathBuf,
    overwrite: bool,
}

impl DumpWriter {
    pub fn new(dir: impl Into<PathBuf>, overwrite: bool) -> Self {
        Self {
            dir: dir.into(),
            overwrite,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, base: u64) -> PathBuf {
        self.dir.join(dump_file_name(base))
    }

    /// Persist `bytes` as the dump for `base`
    ///
    /// Bytes go to a `.part` sibling first and are renamed into place, so a
    /// final name never refers to a half-written file. An existing dump is
    /// left alone unless the writer was created with `overwrite`.
    pub fn write(&self, base: u64, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(base);
        if !self.overwrite && path.exists() {
            return Err(Error::AlreadyExists(path));
        }

        let mut partial = path.clone().into_os_string();
        partial.push(PARTIAL_SUFFIX);
        let partial = PathBuf::from(partial);

        if let Err(e) = fs::write(&partial, bytes).and_then(|()| fs::rename(&partial, &path)) {
            let _ = fs::remove_file(&partial);
            return Err(e.into());
        }

        Ok(path)
    }
}
