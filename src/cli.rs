use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "nexus-registry")]
#[command(author = "NEXUS Team")]
#[command(version = "0.1.0")]
#[command(about = "Module health registry with drift detection and rollback points", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config directory (default.toml, <NEXUS_ENV>.toml)
    #[arg(short, long, default_value = "config", env = "NEXUS_CONFIG_DIR")]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Run the poller and HTTP API until interrupted
    Serve,
    /// Run a single poll and report module health
    Check {
        /// Minimum fraction of healthy modules for a zero exit code
        #[arg(long, default_value = "0.8")]
        min_healthy: f64,
    },
    /// Load and validate configuration
    Validate,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_is_default() {
        let cli = Cli::parse_from(["nexus-registry"]);
        assert_eq!(cli.command(), Commands::Serve);
        assert_eq!(cli.config, PathBuf::from("config"));
    }

    #[test]
    fn test_check_threshold() {
        let cli = Cli::parse_from([
            "nexus-registry",
            "--config",
            "/etc/nexus",
            "check",
            "--min-healthy",
            "0.5",
        ]);
        assert_eq!(cli.command(), Commands::Check { min_healthy: 0.5 });
        assert_eq!(cli.config, PathBuf::from("/etc/nexus"));
    }
}
