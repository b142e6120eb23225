//! Configuration command handlers
//!
//! Handles the `configure` subcommand for setting up memdump defaults.

use crate::config::Config;
use anyhow::{bail, Result};
use memdump::deny::parse_deny_list;
use memdump::{DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MIN_STRING_LENGTH};

/// Values to store, `None` leaves a setting untouched
#[derive(Debug, Default)]
pub struct Update {
    pub max_size: Option<u64>,
    pub min_length: Option<usize>,
    pub deny: Option<String>,
    pub deny_builtins: Option<bool>,
}

impl Update {
    fn is_empty(&self) -> bool {
        self.max_size.is_none()
            && self.min_length.is_none()
            && self.deny.is_none()
            && self.deny_builtins.is_none()
    }

    /// Apply onto `config`, rejecting values a run could not use
    fn apply(self, config: &mut Config) -> Result<()> {
        if self.max_size == Some(0) {
            bail!("Maximum chunk size must be greater than zero");
        }
        if self.min_length == Some(0) {
            bail!("Minimum string length must be at least 1");
        }

        if let Some(size) = self.max_size {
            config.max_chunk_size = Some(size);
        }
        if let Some(length) = self.min_length {
            config.min_length = Some(length);
        }
        if let Some(list) = self.deny {
            config.deny = parse_deny_list(&list);
        }
        if let Some(enabled) = self.deny_builtins {
            config.deny_builtins = Some(enabled);
        }
        Ok(())
    }
}

/// Handle the configure command
pub fn handle(update: Update, show: bool) -> Result<()> {
    let mut config = Config::load()?;

    if show {
        show_config(&config);
        return Ok(());
    }

    if update.is_empty() {
        show_usage();
        return Ok(());
    }

    update.apply(&mut config)?;
    let path = config.save()?;
    println!("Config saved to: {}", path.display());

    Ok(())
}

/// Display current configuration
fn show_config(config: &Config) {
    println!(
        "Max chunk size: {} bytes",
        config.max_chunk_size.unwrap_or(DEFAULT_MAX_CHUNK_SIZE)
    );
    println!(
        "Min length:     {}",
        config.min_length.unwrap_or(DEFAULT_MIN_STRING_LENGTH)
    );
    println!(
        "Deny builtins:  {}",
        config.deny_builtins.unwrap_or(false)
    );
    if config.deny.is_empty() {
        println!("Deny list:      (none)");
    } else {
        println!("Deny list:      {}", config.deny.join(","));
    }

    if let Ok(path) = Config::config_path() {
        println!("Config file: {}", path.display());
    }
}

/// Show usage help for the configure command
fn show_usage() {
    println!("Usage: memdump configure --max-size BYTES --min-length N");
    println!("       memdump configure --deny foo,bar --deny-builtins true");
    println!("   or: memdump configure --show");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_applies_only_given_values() {
        let mut config = Config {
            max_chunk_size: Some(1024),
            min_length: Some(6),
            ..Default::default()
        };
        let update = Update {
            min_length: Some(10),
            deny: Some(" foo,,bar ".to_string()),
            ..Default::default()
        };
        update.apply(&mut config).unwrap();

        assert_eq!(config.max_chunk_size, Some(1024));
        assert_eq!(config.min_length, Some(10));
        assert_eq!(config.deny, vec!["foo", "bar"]);
        assert!(config.deny_builtins.is_none());
    }

    #[test]
    fn test_update_clears_deny_list() {
        let mut config = Config {
            deny: vec!["old".to_string()],
            ..Default::default()
        };
        let update = Update {
            deny: Some(String::new()),
            ..Default::default()
        };
        update.apply(&mut config).unwrap();
        assert!(config.deny.is_empty());
    }

    #[test]
    fn test_update_rejects_zero() {
        let mut config = Config::default();
        let update = Update {
            max_size: Some(0),
            ..Default::default()
        };
        assert!(update.apply(&mut config).is_err());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_empty_update() {
        assert!(Update::default().is_empty());
    }

    #[test]
    fn test_show_usage_does_not_panic() {
        show_usage();
    }
}
