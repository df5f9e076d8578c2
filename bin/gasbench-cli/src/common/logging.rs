//! Logging configuration for the gasbench CLI.
//!
//! Provides CLI arguments for configuring tracing output with support for:
//! - Verbosity levels via `-v/-vv/-vvv` flags
//! - Custom log filters via `RUST_LOG` environment variable
//! - Log file output via `--log.file` flag
//! - Disabling colors via `--log.no-color` flag

use std::path::PathBuf;

use clap::Parser;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use super::{CliError, Result};

/// Logging configuration arguments.
#[derive(Debug, Clone, Default, Parser)]
pub struct LogArgs {
    /// Increase logging verbosity (-v = error, -vv = warn, -vvv = info, -vvvv = debug, -vvvvv =
    /// trace)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log file path. If specified, logs are written to this file instead of stderr.
    #[arg(long = "log.file", visible_aliases = ["log-file"], global = true)]
    pub log_file: Option<PathBuf>,

    /// Disable colorful console logging. Only applies when logging to stderr (no --log.file).
    #[arg(long = "log.no-color", visible_aliases = ["log-no-color"], global = true)]
    pub log_no_color: bool,
}

impl LogArgs {
    /// The filter selected by `RUST_LOG` or the verbosity flags.
    ///
    /// `RUST_LOG` wins when set; without it and without `-v` nothing is logged.
    pub fn filter(&self) -> EnvFilter {
        if std::env::var("RUST_LOG").is_ok() {
            return EnvFilter::from_default_env();
        }
        match self.level() {
            Some(level) => EnvFilter::new(Self::directives(level)),
            None => EnvFilter::new("off"),
        }
    }

    /// Filter directives enabling `level`. The library and this binary share the `gasbench`
    /// target prefix.
    pub fn directives(level: Level) -> String {
        format!("{}={level}", env!("CARGO_CRATE_NAME"))
    }

    /// Level selected by the verbosity flags.
    pub const fn level(&self) -> Option<Level> {
        match self.verbose {
            0 => None,
            1 => Some(Level::ERROR),
            2 => Some(Level::WARN),
            3 => Some(Level::INFO),
            4 => Some(Level::DEBUG),
            _ => Some(Level::TRACE),
        }
    }

    /// Initialize the tracing subscriber.
    ///
    /// Targets are shown from DEBUG up. With `--log.file` logs go to the file, without colors.
    pub fn init(&self) -> Result<()> {
        let show_target = self.verbose >= 4;
        let installed = if let Some(log_file) = &self.log_file {
            let file = std::fs::File::create(log_file)?;
            fmt()
                .with_env_filter(self.filter())
                .with_target(show_target)
                .with_writer(file)
                .with_ansi(false)
                .try_init()
        } else {
            fmt()
                .with_env_filter(self.filter())
                .with_target(show_target)
                .with_writer(std::io::stderr)
                .with_ansi(!self.log_no_color)
                .try_init()
        };
        installed.map_err(|err| CliError::Logging(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        let level = |verbose| LogArgs { verbose, ..Default::default() }.level();
        assert_eq!(level(0), None);
        assert_eq!(level(2), Some(Level::WARN));
        assert_eq!(level(4), Some(Level::DEBUG));
        assert_eq!(level(9), Some(Level::TRACE));
    }

    #[test]
    fn test_directives_match_cli_events() {
        assert_eq!(LogArgs::directives(Level::INFO), "gasbench=INFO");
        assert!(module_path!().starts_with("gasbench::"));
    }
}
