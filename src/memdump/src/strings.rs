//! Printable string extraction
//!
//! The classic `strings` scan: runs of printable ASCII (0x20..=0x7e plus tab)
//! at least `min_length` long, streamed through a buffered reader so dump
//! files are never loaded whole.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;
use std::sync::Arc;

use crate::Result;

/// A printable run found in a dump file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringMatch {
    pub source: Arc<Path>,
    /// Byte offset of the first character within the source file
    pub offset: u64,
    pub text: String,
}

#[inline]
pub fn is_printable(byte: u8) -> bool {
    matches!(byte, 0x20..=0x7e | b'\t')
}

/// Lazy iterator over the printable runs of a byte stream
///
/// Yields `Err` once if the underlying read fails, then stops.
pub struct Strings<R> {
    reader: R,
    source: Arc<Path>,
    min_length: usize,
    run: Vec<u8>,
    run_start: u64,
    position: u64,
    done: bool,
}

impl Strings<BufReader<File>> {
    /// Open `path` for scanning; each call starts a fresh pass over the file
    pub fn open(path: &Path, min_length: usize) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file), path, min_length))
    }
}

impl<R: BufRead> Strings<R> {
    pub fn new(reader: R, source: &Path, min_length: usize) -> Self {
        Self {
            reader,
            source: Arc::from(source),
            min_length: min_length.max(1),
            run: Vec::new(),
            run_start: 0,
            position: 0,
            done: false,
        }
    }

    fn take_run(&mut self) -> Option<StringMatch> {
        let long_enough = self.run.len() >= self.min_length;
        let run = std::mem::take(&mut self.run);
        if !long_enough {
            return None;
        }

        // Printable bytes are all ASCII, so this never loses data
        let text = String::from_utf8_lossy(&run).into_owned();
        Some(StringMatch {
            source: Arc::clone(&self.source),
            offset: self.run_start,
            text,
        })
    }
}

impl<R: BufRead> Iterator for Strings<R> {
    type Item = Result<StringMatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let buf = match self.reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            };

            if buf.is_empty() {
                // End of stream flushes a trailing run
                self.done = true;
                return self.take_run().map(Ok);
            }

            let mut consumed = 0;
            let mut ended = false;
            for &byte in buf {
                consumed += 1;
                if is_printable(byte) {
                    if self.run.is_empty() {
                        self.run_start = self.position + consumed as u64 - 1;
                    }
                    self.run.push(byte);
                } else if !self.run.is_empty() {
                    ended = true;
                    break;
                }
            }

            self.reader.consume(consumed);
            self.position += consumed as u64;

            if ended {
                if let Some(m) = self.take_run() {
                    return Some(Ok(m));
                }
            }
        }
    }
}

impl<R: BufRead> std::iter::FusedIterator for Strings<R> {}

/// Scan a dump file for printable runs of at least `min_length` bytes
pub fn scan_file(path: &Path, min_length: usize) -> Result<Strings<BufReader<File>>> {
    Strings::open(path, min_length)
}
