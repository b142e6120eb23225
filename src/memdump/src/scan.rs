//! Post-processing of a dump directory
//!
//! Per file: scan printable runs, drop denied ones, feed the rest to the
//! regex extractor. Files are independent and run on the rayon pool; the
//! only shared state is the append-only per-category result sets and the
//! strings output file.

use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{self, BufRead, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::strings::scan_file;
use crate::writer::is_dump_file;
use crate::{
    DenyFilter, Error, Extractor, Findings, Progress, Result, Strings, DEFAULT_MIN_STRING_LENGTH,
};

/// Raw strings output inside the findings directory
pub const STRINGS_FILE: &str = "strings.txt";

/// Settings for one post-processing pass
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub min_length: usize,
    pub findings_dir: PathBuf,
    /// Persist every extracted string (before deny filtering)
    pub persist_strings: bool,
    /// Run the regex categories over the strings that pass the deny filter
    pub extract: bool,
}

impl ScanConfig {
    pub fn new(findings_dir: impl Into<PathBuf>) -> Self {
        Self {
            min_length: DEFAULT_MIN_STRING_LENGTH,
            findings_dir: findings_dir.into(),
            persist_strings: true,
            extract: true,
        }
    }
}

/// Outcome of a post-processing pass
#[derive(Debug, Default)]
pub struct PostProcessReport {
    pub files_scanned: usize,
    /// Files that could not be read, with the reason
    pub failures: Vec<(PathBuf, String)>,
    pub strings_extracted: usize,
    pub strings_denied: usize,
    /// Unique matches per category, empty when extraction was off
    pub findings: Vec<(String, usize)>,
    /// Files written into the findings directory
    pub outputs: Vec<PathBuf>,
}

/// List dump files directly inside `dir`, sorted by name
pub fn dump_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            e.into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed"))
        })?;
        if !entry.file_type().is_dir() && is_dump_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

struct Counters {
    scanned: AtomicUsize,
    extracted: AtomicUsize,
    denied: AtomicUsize,
    done: AtomicUsize,
}

/// Why a dump file did not make it into the results
#[derive(Debug)]
enum FileFailure {
    /// The dump file itself could not be read; the file is skipped
    Input(Error),
    /// A findings output could not be written; the pass is aborted
    Output(Error),
}

fn output_failure(e: impl Into<Error>) -> FileFailure {
    FileFailure::Output(e.into())
}

/// Shared state of one pass, handed to every worker
struct FileScan<'a> {
    config: &'a ScanConfig,
    deny: &'a DenyFilter,
    extractor: &'a Extractor,
    findings: &'a Findings,
    strings_out: Option<&'a Mutex<BufWriter<File>>>,
}

impl FileScan<'_> {
    /// Scan one file; returns `(strings extracted, strings denied)`
    fn scan_path(&self, path: &Path) -> std::result::Result<(usize, usize), FileFailure> {
        let strings = scan_file(path, self.config.min_length).map_err(FileFailure::Input)?;
        self.scan_stream(strings)
    }

    /// Nothing from a file reaches the shared outputs unless the whole file
    /// was read: strings are spooled to an anonymous temp file and matches
    /// collected locally, both published at the end.
    fn scan_stream<R: BufRead>(
        &self,
        strings: Strings<R>,
    ) -> std::result::Result<(usize, usize), FileFailure> {
        let mut spool = match self.strings_out {
            Some(_) => Some(BufWriter::new(
                tempfile::tempfile_in(&self.config.findings_dir).map_err(output_failure)?,
            )),
            None => None,
        };
        let local = self.extractor.findings();
        let mut extracted = 0;
        let mut denied = 0;

        for m in strings {
            let m = m.map_err(FileFailure::Input)?;
            extracted += 1;

            if let Some(spool) = spool.as_mut() {
                writeln!(spool, "{}", m.text).map_err(output_failure)?;
            }
            if !self.config.extract {
                continue;
            }
            if self.deny.passes(&m.text) {
                self.extractor.extract_into(&m.text, &local);
            } else {
                denied += 1;
            }
        }

        if let (Some(spool), Some(out)) = (spool, self.strings_out) {
            append_spool(spool, out).map_err(output_failure)?;
        }
        self.findings.merge(local);

        Ok((extracted, denied))
    }
}

/// Copy a finished spool into the shared strings file
///
/// One lock per file keeps each file's strings contiguous in the output.
fn append_spool(spool: BufWriter<File>, out: &Mutex<BufWriter<File>>) -> io::Result<()> {
    let mut file = spool.into_inner().map_err(|e| e.into_error())?;
    file.seek(SeekFrom::Start(0))?;

    let mut out = out.lock().unwrap_or_else(|e| e.into_inner());
    io::copy(&mut file, &mut *out)?;
    Ok(())
}

/// Run strings, deny filtering and regex extraction over a dump directory
///
/// Only setup problems (bad config, unlistable dump directory, unwritable
/// findings directory or output files) are returned as errors. A dump file
/// that cannot be read is recorded in the report and skipped, and contributes
/// nothing to the outputs.
pub fn post_process(
    dump_dir: &Path,
    config: &ScanConfig,
    deny: &DenyFilter,
    extractor: &Extractor,
    progress: &dyn Progress,
) -> Result<PostProcessReport> {
    if config.min_length == 0 {
        return Err(Error::Config(
            "minimum string length must be at least 1".to_string(),
        ));
    }

    let files = dump_files(dump_dir)?;
    fs::create_dir_all(&config.findings_dir)?;
    info!(
        "Scanning {} dump files in {}",
        files.len(),
        dump_dir.display()
    );

    let strings_path = config.findings_dir.join(STRINGS_FILE);
    let strings_out = if config.persist_strings {
        Some(Mutex::new(BufWriter::new(File::create(&strings_path)?)))
    } else {
        None
    };

    let findings = extractor.findings();
    let scan = FileScan {
        config,
        deny,
        extractor,
        findings: &findings,
        strings_out: strings_out.as_ref(),
    };
    let failures = Mutex::new(Vec::new());
    let output_error = Mutex::new(None);
    let counters = Counters {
        scanned: AtomicUsize::new(0),
        extracted: AtomicUsize::new(0),
        denied: AtomicUsize::new(0),
        done: AtomicUsize::new(0),
    };

    files.par_iter().for_each(|path| {
        match scan.scan_path(path) {
            Ok((extracted, denied)) => {
                counters.scanned.fetch_add(1, Ordering::Relaxed);
                counters.extracted.fetch_add(extracted, Ordering::Relaxed);
                counters.denied.fetch_add(denied, Ordering::Relaxed);
            }
            Err(FileFailure::Input(e)) => {
                warn!("Skipping {}: {}", path.display(), e);
                failures
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push((path.clone(), e.to_string()));
            }
            Err(FileFailure::Output(e)) => {
                warn!("Writing findings for {} failed: {}", path.display(), e);
                let mut first = output_error.lock().unwrap_or_else(|e| e.into_inner());
                if first.is_none() {
                    *first = Some(e);
                }
            }
        }
        let done = counters.done.fetch_add(1, Ordering::Relaxed) + 1;
        progress.advance(done, files.len());
    });
    progress.finish();

    if let Some(e) = output_error.into_inner().unwrap_or_else(|e| e.into_inner()) {
        return Err(e);
    }

    let mut report = PostProcessReport {
        files_scanned: counters.scanned.into_inner(),
        failures: failures.into_inner().unwrap_or_else(|e| e.into_inner()),
        strings_extracted: counters.extracted.into_inner(),
        strings_denied: counters.denied.into_inner(),
        ..Default::default()
    };
    report.failures.sort();

    if let Some(out) = strings_out {
        out.into_inner()
            .unwrap_or_else(|e| e.into_inner())
            .flush()?;
        report.outputs.push(strings_path);
    }

    if config.extract {
        report.outputs.extend(findings.write_to(&config.findings_dir)?);
        report.findings = findings.counts().into_iter().collect();
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::dump_file_name;
    use crate::NoProgress;
    use std::io::{BufReader, Read};

    /// Serves `data` once, then fails every further read
    struct FailsAfter {
        data: &'static [u8],
        served: bool,
    }

    impl Read for FailsAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::other("device went away"));
            }
            self.served = true;
            let n = self.data.len().min(buf.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            Ok(n)
        }
    }

    fn write_dump(dir: &Path, base: u64, data: &[u8]) {
        fs::write(dir.join(dump_file_name(base)), data).unwrap();
    }

    #[test]
    fn test_dump_files_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        write_dump(dir.path(), 0x2000, b"x");
        write_dump(dir.path(), 0x1000, b"x");
        fs::write(dir.path().join("manifest.json"), b"{}").unwrap();
        fs::write(dir.path().join("0x1_dump.data.part"), b"x").unwrap();
        fs::create_dir(dir.path().join("findings")).unwrap();

        let files = dump_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with(dump_file_name(0x1000)));
    }

    #[test]
    fn test_post_process_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        write_dump(
            dir.path(),
            0x1000,
            b"\x00\x00https://api.example.com/login\x00foo https://foo.example.com\x00ab\x00",
        );
        write_dump(dir.path(), 0x2000, b"\x01admin@example.org\x02java.lang.String\x03");

        let findings_dir = dir.path().join("findings");
        let config = ScanConfig::new(&findings_dir);
        let deny = DenyFilter::new(true, vec!["foo".to_string()]).unwrap();
        let extractor = Extractor::with_defaults().unwrap();

        let report = post_process(dir.path(), &config, &deny, &extractor, &NoProgress).unwrap();

        assert_eq!(report.files_scanned, 2);
        assert!(report.failures.is_empty());
        assert_eq!(report.strings_extracted, 4);
        assert_eq!(report.strings_denied, 2);

        let urls = fs::read_to_string(findings_dir.join("urls.txt")).unwrap();
        assert_eq!(urls, "https://api.example.com/login\n");
        let emails = fs::read_to_string(findings_dir.join("emails.txt")).unwrap();
        assert_eq!(emails, "admin@example.org\n");
        assert!(findings_dir.join("jwt.txt").exists());

        let strings = fs::read_to_string(findings_dir.join(STRINGS_FILE)).unwrap();
        assert_eq!(strings.lines().count(), 4);
        assert!(strings.contains("java.lang.String"));

        let urls_count = report.findings.iter().find(|(n, _)| n == "urls").unwrap().1;
        assert_eq!(urls_count, 1);
    }

    #[test]
    fn test_strings_only() {
        let dir = tempfile::tempdir().unwrap();
        write_dump(dir.path(), 0x1000, b"\x00https://example.com\x00");

        let findings_dir = dir.path().join("out");
        let config = ScanConfig {
            extract: false,
            ..ScanConfig::new(&findings_dir)
        };
        let extractor = Extractor::with_defaults().unwrap();
        let report = post_process(
            dir.path(),
            &config,
            &DenyFilter::allow_all(),
            &extractor,
            &NoProgress,
        )
        .unwrap();

        assert_eq!(report.strings_extracted, 1);
        assert!(report.findings.is_empty());
        assert!(findings_dir.join(STRINGS_FILE).exists());
        assert!(!findings_dir.join("urls.txt").exists());
    }

    #[test]
    fn test_duplicate_matches_across_files() {
        let dir = tempfile::tempdir().unwrap();
        for base in [0x1000u64, 0x2000, 0x3000] {
            write_dump(dir.path(), base, b"\x00http://same.example.com\x00");
        }

        let findings_dir = dir.path().join("findings");
        let config = ScanConfig {
            persist_strings: false,
            ..ScanConfig::new(&findings_dir)
        };
        let extractor = Extractor::with_defaults().unwrap();
        let report = post_process(
            dir.path(),
            &config,
            &DenyFilter::allow_all(),
            &extractor,
            &NoProgress,
        )
        .unwrap();

        assert_eq!(report.strings_extracted, 3);
        let urls = fs::read_to_string(findings_dir.join("urls.txt")).unwrap();
        assert_eq!(urls.lines().count(), 1);
        assert!(!findings_dir.join(STRINGS_FILE).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_is_skipped() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        write_dump(dir.path(), 0x1000, b"\x00http://ok.example.com\x00");
        // A dangling symlink named like a dump fails to open
        symlink(
            dir.path().join("missing-target"),
            dir.path().join(dump_file_name(0x2000)),
        )
        .unwrap();

        let findings_dir = dir.path().join("findings");
        let extractor = Extractor::with_defaults().unwrap();
        let report = post_process(
            dir.path(),
            &ScanConfig::new(&findings_dir),
            &DenyFilter::allow_all(),
            &extractor,
            &NoProgress,
        )
        .unwrap();

        assert_eq!(report.files_scanned, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].0.ends_with(dump_file_name(0x2000)));
    }

    #[test]
    fn test_missing_dump_dir_is_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Extractor::with_defaults().unwrap();
        let result = post_process(
            &dir.path().join("nope"),
            &ScanConfig::new(dir.path().join("findings")),
            &DenyFilter::allow_all(),
            &extractor,
            &NoProgress,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_min_length_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScanConfig {
            min_length: 0,
            ..ScanConfig::new(dir.path().join("findings"))
        };
        let extractor = Extractor::with_defaults().unwrap();
        let err = post_process(
            dir.path(),
            &config,
            &DenyFilter::allow_all(),
            &extractor,
            &NoProgress,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_file_failing_partway_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScanConfig::new(dir.path());
        let deny = DenyFilter::allow_all();
        let extractor = Extractor::with_defaults().unwrap();
        let findings = extractor.findings();
        let out = Mutex::new(BufWriter::new(tempfile::tempfile().unwrap()));
        let scan = FileScan {
            config: &config,
            deny: &deny,
            extractor: &extractor,
            findings: &findings,
            strings_out: Some(&out),
        };

        let reader = BufReader::new(FailsAfter {
            data: b"\x00https://leak.example.com\x00",
            served: false,
        });
        let strings = Strings::new(reader, Path::new("0x1000_dump.data"), 4);

        let result = scan.scan_stream(strings);
        assert!(matches!(result, Err(FileFailure::Input(_))));
        assert!(findings.counts().values().all(|&n| n == 0));

        let mut file = out.into_inner().unwrap().into_inner().unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut written = String::new();
        file.read_to_string(&mut written).unwrap();
        assert!(written.is_empty());
    }

    #[test]
    fn test_spool_is_published_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScanConfig::new(dir.path());
        let deny = DenyFilter::allow_all();
        let extractor = Extractor::with_defaults().unwrap();
        let findings = extractor.findings();
        let out = Mutex::new(BufWriter::new(tempfile::tempfile().unwrap()));
        let scan = FileScan {
            config: &config,
            deny: &deny,
            extractor: &extractor,
            findings: &findings,
            strings_out: Some(&out),
        };

        let data: &[u8] = b"\x00https://ok.example.com\x00hello\x00";
        let strings = Strings::new(data, Path::new("0x1000_dump.data"), 4);
        assert_eq!(scan.scan_stream(strings).unwrap(), (2, 0));
        assert_eq!(findings.counts()["urls"], 1);

        let mut file = out.into_inner().unwrap().into_inner().unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut written = String::new();
        file.read_to_string(&mut written).unwrap();
        assert_eq!(written, "https://ok.example.com\nhello\n");
    }

    #[test]
    fn test_output_failure_is_not_blamed_on_dump_file() {
        let dir = tempfile::tempdir().unwrap();
        // Spools live in the findings directory, which is missing here
        let config = ScanConfig::new(dir.path().join("gone"));
        let deny = DenyFilter::allow_all();
        let extractor = Extractor::with_defaults().unwrap();
        let findings = extractor.findings();
        let out = Mutex::new(BufWriter::new(tempfile::tempfile().unwrap()));
        let scan = FileScan {
            config: &config,
            deny: &deny,
            extractor: &extractor,
            findings: &findings,
            strings_out: Some(&out),
        };

        let data: &[u8] = b"\x00hello world\x00";
        let strings = Strings::new(data, Path::new("0x1000_dump.data"), 4);
        assert!(matches!(
            scan.scan_stream(strings),
            Err(FileFailure::Output(_))
        ));
    }
}
