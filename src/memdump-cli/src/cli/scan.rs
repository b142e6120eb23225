//! Post-processing options shared by `dump` and `scan`

use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Clone, Default)]
pub struct PostProcessArgs {
    /// Run strings on all dump files, saved to <findings>/strings.txt
    #[arg(short, long)]
    pub strings: bool,

    /// Grep the strings for juicy info (implies --strings)
    #[arg(long)]
    pub regex: bool,

    /// Directory for strings and regex findings (default: <dump>/findings)
    #[arg(long, value_name = "DIR")]
    pub findings: Option<PathBuf>,

    /// Deny common runtime noise before regex extraction
    #[arg(long)]
    pub deny_list: bool,

    /// Custom deny list, comma separated (ex: foo,bar,john,doe)
    #[arg(long, value_name = "LIST")]
    pub custom_deny_list: Option<String>,

    /// Minimum length of an extracted string (default: 4)
    #[arg(long)]
    pub min_length: Option<usize>,
}

impl PostProcessArgs {
    /// True if any post-processing was requested
    pub fn enabled(&self) -> bool {
        self.strings || self.regex
    }
}
