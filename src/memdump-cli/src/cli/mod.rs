//! CLI argument definitions for memdump
//!
//! This module contains all clap-derived structs and enums for CLI parsing.

mod app;
mod scan;

pub use app::{Cli, Commands, DumpArgs};
pub use scan::PostProcessArgs;
