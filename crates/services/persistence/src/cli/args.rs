//! CLI argument definitions.

use clap::{Parser, Subcommand};

/// Cache-through document persistence for the marketplace
#[derive(Parser, Debug)]
#[command(name = "persistence")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bootstrap the schema and check connectivity to the store and the cache
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::try_parse_from(["persistence", "ping", "-v"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn test_parse_ping() {
        let cli = Cli::try_parse_from(["persistence", "ping"]).unwrap();
        assert!(!cli.verbose);
        assert!(matches!(cli.command, Commands::Ping));
    }

    #[test]
    fn test_rejects_unknown_command() {
        assert!(Cli::try_parse_from(["persistence", "migrate", "up"]).is_err());
    }
}
