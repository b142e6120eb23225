//! Top-level CLI definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use super::scan::PostProcessArgs;

#[derive(Parser)]
#[command(name = "memdump")]
#[command(about = "Dump the readable memory of a running process", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Verbose logging (per region and per leaf)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Dump process memory, optionally post-processing the result
    #[command(visible_alias = "d")]
    Dump(DumpArgs),

    /// Post-process an existing dump directory
    #[command(visible_alias = "s")]
    Scan {
        /// Directory holding the dump files
        dir: PathBuf,

        #[command(flatten)]
        post: PostProcessArgs,
    },

    /// Configure default settings
    #[command(visible_alias = "c")]
    Configure {
        /// Default maximum read size in bytes
        #[arg(long, value_name = "BYTES")]
        max_size: Option<u64>,

        /// Default minimum string length
        #[arg(long)]
        min_length: Option<usize>,

        /// Default custom deny list, comma separated (empty string clears it)
        #[arg(long, value_name = "LIST")]
        deny: Option<String>,

        /// Apply the built-in deny patterns by default
        #[arg(long, value_name = "BOOL")]
        deny_builtins: Option<bool>,

        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[derive(Args)]
pub struct DumpArgs {
    /// Target process name or PID
    pub process: String,

    /// Output directory, must already exist (default: ./dump, created if missing)
    #[arg(short, long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Read through an agent listening on HOST:PORT instead of attaching locally
    #[arg(short = 'H', long, env = "MEMDUMP_HOST")]
    pub host: Option<String>,

    /// Agent response timeout in seconds
    #[arg(long, default_value = "30", requires = "host")]
    pub timeout: u64,

    /// Dump read-only regions too. More data, more errors
    #[arg(short, long)]
    pub read_only: bool,

    /// Maximum size of a single read and dump file, in bytes (default: 20971520)
    #[arg(long, value_name = "BYTES")]
    pub max_size: Option<u64>,

    /// Replace dump files left by an earlier run
    #[arg(short, long)]
    pub force: bool,

    #[command(flatten)]
    pub post: PostProcessArgs,
}
