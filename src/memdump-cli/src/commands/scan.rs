//! Post-processing command handlers
//!
//! Shared by `scan` on an existing directory and `dump` right after a run.

use anyhow::{bail, Context, Result};
use memdump::deny::parse_deny_list;
use memdump::{
    DenyFilter, Extractor, PostProcessReport, ScanConfig, DEFAULT_MIN_STRING_LENGTH,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::cli::PostProcessArgs;
use crate::config::Config;
use crate::progress::BarProgress;

/// Name of the default findings directory inside a dump directory
pub const FINDINGS_DIR: &str = "findings";

/// Everything a post-processing pass needs, validated up front
pub struct Plan {
    pub config: ScanConfig,
    pub deny: DenyFilter,
    pub extractor: Extractor,
}

/// Flags that only affect regex extraction, set on a pass that skips it
fn ignored_options(args: &PostProcessArgs) -> Vec<&'static str> {
    if args.regex {
        return Vec::new();
    }
    let mut ignored = Vec::new();
    if args.deny_list {
        ignored.push("--deny-list");
    }
    if args.custom_deny_list.is_some() {
        ignored.push("--custom-deny-list");
    }
    ignored
}

/// Merge command line and saved defaults into a ready-to-run plan
pub fn prepare(dump_dir: &Path, args: &PostProcessArgs, config: &Config) -> Result<Plan> {
    for flag in ignored_options(args) {
        warn!("{} has no effect without --regex", flag);
    }

    let min_length = args
        .min_length
        .or(config.min_length)
        .unwrap_or(DEFAULT_MIN_STRING_LENGTH);
    if min_length == 0 {
        bail!("Minimum string length must be at least 1");
    }

    let findings_dir = args
        .findings
        .clone()
        .unwrap_or_else(|| dump_dir.join(FINDINGS_DIR));

    let scan_config = ScanConfig {
        min_length,
        findings_dir,
        persist_strings: args.strings,
        extract: args.regex,
    };

    let mut custom = config.deny.clone();
    if let Some(list) = &args.custom_deny_list {
        custom.extend(parse_deny_list(list));
    }
    let builtins = args.deny_list || config.deny_builtins.unwrap_or(false);
    let deny = DenyFilter::new(builtins, custom).context("Failed to build deny filter")?;

    let extractor = Extractor::with_defaults().context("Failed to compile regex categories")?;

    Ok(Plan {
        config: scan_config,
        deny,
        extractor,
    })
}

/// Run a prepared plan over `dump_dir`
pub fn run(dump_dir: &Path, plan: &Plan) -> Result<PostProcessReport> {
    let total = memdump::scan::dump_files(dump_dir)
        .with_context(|| format!("Failed to list {}", dump_dir.display()))?
        .len();

    if plan.config.extract {
        info!("Running strings and regex extraction on {} files", total);
    } else {
        info!("Running strings on {} files", total);
    }
    if !plan.deny.is_disabled() {
        info!("Deny filter active ({} custom entries)", plan.deny.custom_entries().len());
    }

    let progress = BarProgress::new(total, "files");
    memdump::post_process(
        dump_dir,
        &plan.config,
        &plan.deny,
        &plan.extractor,
        &progress,
    )
    .context("Post-processing failed")
}

/// Print a post-processing summary to stdout
pub fn print_report(report: &PostProcessReport) {
    println!();
    println!("Files scanned:     {}", report.files_scanned);
    println!("Files failed:      {}", report.failures.len());
    println!("Strings extracted: {}", report.strings_extracted);
    println!("Strings denied:    {}", report.strings_denied);

    for (path, reason) in &report.failures {
        println!("  ! {}: {}", path.display(), reason);
    }

    if !report.findings.is_empty() {
        println!();
        println!("Findings:");
        for (category, count) in &report.findings {
            println!("  {:<16} {}", category, count);
        }
    }

    if let Some(dir) = report.outputs.first().and_then(|p| p.parent()) {
        println!();
        println!("Results saved to {}", dir.display());
    }
}

/// Handle the scan command
pub fn handle(dir: PathBuf, args: PostProcessArgs, config: &Config) -> Result<()> {
    if !dir.is_dir() {
        bail!("Dump directory {} does not exist", dir.display());
    }

    // A bare `scan` means the full pass
    let args = if args.enabled() {
        args
    } else {
        PostProcessArgs {
            strings: true,
            regex: true,
            ..args
        }
    };

    let plan = prepare(&dir, &args, config)?;
    let report = run(&dir, &plan)?;
    print_report(&report);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_prepare_defaults() {
        let plan = prepare(Path::new("dump"), &PostProcessArgs::default(), &Config::default())
            .unwrap();
        assert_eq!(plan.config.min_length, DEFAULT_MIN_STRING_LENGTH);
        assert_eq!(plan.config.findings_dir, Path::new("dump").join(FINDINGS_DIR));
        assert!(plan.deny.is_disabled());
    }

    #[test]
    fn test_prepare_merges_config() {
        let config = Config {
            min_length: Some(8),
            deny: vec!["saved".to_string()],
            deny_builtins: Some(true),
            ..Default::default()
        };
        let args = PostProcessArgs {
            regex: true,
            custom_deny_list: Some("foo, bar".to_string()),
            min_length: Some(5),
            ..Default::default()
        };

        let plan = prepare(Path::new("dump"), &args, &config).unwrap();
        assert_eq!(plan.config.min_length, 5);
        assert!(plan.config.extract);
        assert!(!plan.config.persist_strings);
        assert_eq!(plan.deny.custom_entries(), ["saved", "foo", "bar"]);
        assert!(!plan.deny.passes("java.lang.String"));
    }

    #[test]
    fn test_deny_flags_without_regex_are_reported() {
        let args = PostProcessArgs {
            strings: true,
            deny_list: true,
            custom_deny_list: Some("foo".to_string()),
            ..Default::default()
        };
        assert_eq!(ignored_options(&args), ["--deny-list", "--custom-deny-list"]);

        let args = PostProcessArgs {
            regex: true,
            ..args
        };
        assert!(ignored_options(&args).is_empty());
        assert!(ignored_options(&PostProcessArgs::default()).is_empty());
    }

    #[test]
    fn test_prepare_rejects_zero_length() {
        let args = PostProcessArgs {
            min_length: Some(0),
            ..Default::default()
        };
        assert!(prepare(Path::new("dump"), &args, &Config::default()).is_err());
    }

    #[test]
    fn test_handle_runs_full_pass() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("0x0000000000001000_dump.data"),
            b"\x00https://example.com/a\x00",
        )
        .unwrap();

        handle(dir.path().to_path_buf(), PostProcessArgs::default(), &Config::default()).unwrap();

        let findings = dir.path().join(FINDINGS_DIR);
        assert!(findings.join("strings.txt").exists());
        let urls = fs::read_to_string(findings.join("urls.txt")).unwrap();
        assert_eq!(urls, "https://example.com/a\n");
    }

    #[test]
    fn test_handle_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let result = handle(
            dir.path().join("missing"),
            PostProcessArgs::default(),
            &Config::default(),
        );
        assert!(result.is_err());
    }
}
