mod cli;
mod commands;
mod config;
mod progress;

use anyhow::Result;
use clap::Parser;
use config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::*;

fn init_logging(verbose: bool) {
    let default = if verbose {
        "memdump=debug"
    } else {
        "memdump=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Dump(args) => {
            let config = Config::load()?;
            commands::dump::handle(args, &config)?;
        }

        Commands::Scan { dir, post } => {
            let config = Config::load()?;
            commands::scan::handle(dir, post, &config)?;
        }

        Commands::Configure {
            max_size,
            min_length,
            deny,
            deny_builtins,
            show,
        } => {
            let update = commands::configure::Update {
                max_size,
                min_length,
                deny,
                deny_builtins,
            };
            commands::configure::handle(update, show)?;
        }
    }

    Ok(())
}
