//! Dump command handler

use anyhow::{bail, Context, Result};
use memdump::dump::VIOLATIONS_FILE;
use memdump::{
    AgentReader, DumpConfig, DumpManifest, MemoryReader, ProcessReader, Protection,
    DEFAULT_MAX_CHUNK_SIZE,
};
use std::fs;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use super::scan;
use crate::cli::DumpArgs;
use crate::config::Config;
use crate::progress::BarProgress;

/// Output directory used when `-o` is not given
pub const DEFAULT_OUTPUT_DIR: &str = "dump";

/// Pick the output directory
///
/// An explicit directory must already exist; the default one is created.
pub fn resolve_output_dir(out: Option<&Path>, default: &Path) -> Result<PathBuf> {
    match out {
        Some(dir) => {
            if !dir.is_dir() {
                bail!("Output directory {} does not exist", dir.display());
            }
            Ok(dir.to_path_buf())
        }
        None => {
            fs::create_dir_all(default)
                .with_context(|| format!("Failed to create {}", default.display()))?;
            Ok(default.to_path_buf())
        }
    }
}

fn max_chunk_size(args: &DumpArgs, config: &Config) -> Result<NonZeroU64> {
    let size = args
        .max_size
        .or(config.max_chunk_size)
        .unwrap_or(DEFAULT_MAX_CHUNK_SIZE);
    NonZeroU64::new(size).context("Maximum chunk size must be greater than zero")
}

fn open_reader(args: &DumpArgs) -> Result<Box<dyn MemoryReader>> {
    match &args.host {
        Some(host) => {
            info!("Connecting to agent at {} for {}", host, args.process);
            let timeout = Duration::from_secs(args.timeout);
            let reader = AgentReader::connect(host.as_str(), Some(timeout))
                .with_context(|| format!("Failed to connect to agent at {}", host))?;
            Ok(Box::new(reader))
        }
        None => {
            let reader = ProcessReader::attach(&args.process)
                .with_context(|| format!("Can't attach to process {}", args.process))?;
            info!("Attached to {} (pid {})", args.process, reader.pid);
            Ok(Box::new(reader))
        }
    }
}

/// Handle the dump command
pub fn handle(args: DumpArgs, config: &Config) -> Result<()> {
    let out_dir = resolve_output_dir(args.out.as_deref(), Path::new(DEFAULT_OUTPUT_DIR))?;
    let max_size = max_chunk_size(&args, config)?;
    let filter = if args.read_only {
        Protection::READ
    } else {
        Protection::READ_WRITE
    };

    // Bad post-processing options should fail before the target is touched
    let plan = if args.post.enabled() {
        Some(scan::prepare(&out_dir, &args.post, config)?)
    } else {
        None
    };

    let mut reader = open_reader(&args)?;
    let regions = reader
        .enumerate_regions(filter)
        .context("Failed to enumerate memory regions")?;
    info!("Dumping {} regions ({}) into {}", regions.len(), filter, out_dir.display());

    let dump_config = DumpConfig::new(&out_dir)
        .with_max_chunk_size(max_size)
        .with_overwrite(args.force);
    let progress = BarProgress::new(regions.len(), "regions");
    let manifest = memdump::dump_regions(reader.as_mut(), &regions, &dump_config, &progress);

    let manifest_path = manifest
        .save(&out_dir)
        .context("Failed to write dump manifest")?;
    print_summary(&manifest, &out_dir, &manifest_path);

    if let Some(plan) = plan {
        let report = scan::run(&out_dir, &plan)?;
        scan::print_report(&report);
    }

    Ok(())
}

fn print_summary(manifest: &DumpManifest, out_dir: &Path, manifest_path: &Path) {
    println!();
    println!("Regions:       {}", manifest.regions);
    println!("Leaves dumped: {}", manifest.succeeded());
    println!("Leaves failed: {}", manifest.failed());
    println!("Output:        {}", out_dir.display());
    println!("Manifest:      {}", manifest_path.display());
    if manifest.failed() > 0 {
        println!("Violations:    {}", out_dir.join(VIOLATIONS_FILE).display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::PostProcessArgs;

    fn args(max_size: Option<u64>) -> DumpArgs {
        DumpArgs {
            process: "app".to_string(),
            out: None,
            host: None,
            timeout: 30,
            read_only: false,
            max_size,
            force: false,
            post: PostProcessArgs::default(),
        }
    }

    #[test]
    fn test_explicit_output_dir_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(resolve_output_dir(Some(&missing), dir.path()).is_err());
        assert!(!missing.exists());

        let found = resolve_output_dir(Some(dir.path()), Path::new("unused")).unwrap();
        assert_eq!(found, dir.path());
    }

    #[test]
    fn test_default_output_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let default = dir.path().join("dump");
        let found = resolve_output_dir(None, &default).unwrap();
        assert_eq!(found, default);
        assert!(default.is_dir());
    }

    #[test]
    fn test_max_chunk_size_precedence() {
        let config = Config {
            max_chunk_size: Some(4096),
            ..Default::default()
        };
        assert_eq!(max_chunk_size(&args(None), &Config::default()).unwrap().get(), DEFAULT_MAX_CHUNK_SIZE);
        assert_eq!(max_chunk_size(&args(None), &config).unwrap().get(), 4096);
        assert_eq!(max_chunk_size(&args(Some(512)), &config).unwrap().get(), 512);
        assert!(max_chunk_size(&args(Some(0)), &config).is_err());
    }

    #[test]
    fn test_unreachable_agent_is_setup_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut dump_args = args(None);
        dump_args.host = Some(addr.to_string());
        assert!(open_reader(&dump_args).is_err());
    }
}
