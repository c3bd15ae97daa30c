use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "stockpulse")]
#[command(version)]
#[command(about = "Submit and track stock analysis tasks")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run an analysis and wait for its result, resuming an earlier task when possible
    Analyze {
        /// Stock code or company name
        company: String,

        /// Analysis type (defaults to the configured kind)
        #[arg(short, long)]
        kind: Option<String>,

        /// Ignore cached results and saved sessions
        #[arg(long)]
        force_refresh: bool,

        /// Load these result modules once the task completes
        #[arg(short, long = "module")]
        modules: Vec<String>,
    },

    /// Show the backend's progress for a task
    Status { task_id: String },

    /// Inspect or clean the local result cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Manage saved task sessions
    Session {
        #[command(subcommand)]
        action: Option<SessionAction>,
    },

    /// Print version information
    Version,
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Entry count, size and expired entries
    Stats,
    /// Remove expired and unreadable entries
    Sweep,
    /// Remove every cached entry
    Clear,
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// List live sessions
    List,
    /// Show the session for a company
    Show { company: String },
    /// Forget the session for a company
    Clear { company: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_version() {
        let cli = Cli::try_parse_from(["stockpulse", "version"]);
        assert!(cli.is_ok());
        assert!(matches!(cli.unwrap().command, Commands::Version));
    }

    #[test]
    fn test_cli_parse_analyze() {
        let cli = Cli::try_parse_from([
            "stockpulse",
            "analyze",
            "600519",
            "--kind",
            "technical",
            "--force-refresh",
            "--module",
            "market_data",
            "-m",
            "financial_data",
        ])
        .unwrap();
        if let Commands::Analyze {
            company,
            kind,
            force_refresh,
            modules,
        } = cli.command
        {
            assert_eq!(company, "600519");
            assert_eq!(kind.as_deref(), Some("technical"));
            assert!(force_refresh);
            assert_eq!(modules, vec!["market_data", "financial_data"]);
        } else {
            panic!("Expected Analyze command");
        }
    }

    #[test]
    fn test_cli_parse_analyze_defaults() {
        let cli = Cli::try_parse_from(["stockpulse", "analyze", "贵州茅台"]).unwrap();
        if let Commands::Analyze {
            kind,
            force_refresh,
            modules,
            ..
        } = cli.command
        {
            assert!(kind.is_none());
            assert!(!force_refresh);
            assert!(modules.is_empty());
        } else {
            panic!("Expected Analyze command");
        }
    }

    #[test]
    fn test_cli_parse_subcommands() {
        for args in [
            vec!["stockpulse", "status", "t-1"],
            vec!["stockpulse", "cache", "stats"],
            vec!["stockpulse", "cache", "sweep"],
            vec!["stockpulse", "cache", "clear"],
            vec!["stockpulse", "session"],
            vec!["stockpulse", "session", "show", "600519"],
            vec!["stockpulse", "session", "clear", "600519"],
        ] {
            assert!(Cli::try_parse_from(&args).is_ok(), "Failed to parse {:?}", args);
        }
    }

    #[test]
    fn test_cli_rejects_missing_arguments() {
        assert!(Cli::try_parse_from(["stockpulse", "analyze"]).is_err());
        assert!(Cli::try_parse_from(["stockpulse", "cache"]).is_err());
    }
}
