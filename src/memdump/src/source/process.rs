//! Live Process Memory Reader
//!
//! Reads a local process through `process-memory` and enumerates its regions
//! from `/proc/<pid>/maps`.

use process_memory::{CopyAddress, ProcessHandle, TryIntoProcessHandle};
use std::fs::File;
use std::io::{BufRead, BufReader};
use sysinfo::System;
use tracing::debug;

use crate::{Error, MemoryReader, MemoryRegion, Protection, Result};

/// An attached local process
pub struct ProcessReader {
    pub pid: u32,
    handle: ProcessHandle,
}

impl ProcessReader {
    /// Attach to a process given a PID or a process name
    pub fn attach(target: &str) -> Result<Self> {
        let pid = match target.parse::<u32>() {
            Ok(pid) => pid,
            Err(_) => find_process(target)?,
        };
        Self::attach_pid(pid)
    }

    pub fn attach_pid(pid: u32) -> Result<Self> {
        let handle = (pid as process_memory::Pid)
            .try_into_process_handle()
            .map_err(|e| {
                Error::ProcessNotFound(format!("cannot open process {}: {}", pid, e))
            })?;

        Ok(Self { pid, handle })
    }
}

impl MemoryReader for ProcessReader {
    fn enumerate_regions(&mut self, filter: Protection) -> Result<Vec<MemoryRegion>> {
        let regions = parse_maps(self.pid)?
            .into_iter()
            .filter(|r| r.protection.satisfies(&filter))
            .collect();
        Ok(regions)
    }

    fn read_bytes(&mut self, base: u64, size: u64) -> Result<Vec<u8>> {
        let violation = |reason: String| Error::AccessViolation { base, size, reason };

        let len = usize::try_from(size).map_err(|_| violation("size exceeds usize".into()))?;
        let address =
            usize::try_from(base).map_err(|_| violation("address exceeds usize".into()))?;

        let mut buffer = vec![0u8; len];
        self.handle
            .copy_address(address, &mut buffer)
            .map_err(|e| violation(e.to_string()))?;
        Ok(buffer)
    }
}

/// Find a running process by name, preferring the largest resident one
pub fn find_process(name: &str) -> Result<u32> {
    let mut system = System::new_all();
    system.refresh_all();

    let mut candidates: Vec<(u32, u64)> = system
        .processes()
        .values()
        .filter(|process| {
            let process_name = process.name().to_string_lossy();
            process_name == name || process_name.contains(name)
        })
        .map(|process| (process.pid().as_u32(), process.memory()))
        .collect();

    candidates.sort_by(|a, b| b.1.cmp(&a.1));

    match candidates.first() {
        Some(&(pid, memory)) => {
            debug!(
                "Found process {:?}: PID {} (memory: {} MB, {} candidates)",
                name,
                pid,
                memory / 1_000_000,
                candidates.len()
            );
            Ok(pid)
        }
        None => Err(Error::ProcessNotFound(name.to_string())),
    }
}

/// Parse /proc/pid/maps into regions
pub fn parse_maps(pid: u32) -> Result<Vec<MemoryRegion>> {
    let maps_path = format!("/proc/{}/maps", pid);
    let file = File::open(&maps_path)?;
    parse_maps_from(BufReader::new(file))
}

fn parse_maps_from<R: BufRead>(reader: R) -> Result<Vec<MemoryRegion>> {
    let mut regions = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let mut parts = line.split_whitespace();

        let (Some(range), Some(perms)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Some((start, end)) = range.split_once('-') else {
            continue;
        };
        let (Ok(start), Ok(end)) = (
            u64::from_str_radix(start, 16),
            u64::from_str_radix(end, 16),
        ) else {
            continue;
        };
        let Ok(protection) = perms.parse::<Protection>() else {
            continue;
        };

        if end > start {
            regions.push(MemoryRegion::new(start, end - start, protection));
        }
    }

    Ok(regions)
}
