mod cli;
mod commands;

use clap::Parser;
use cli::{CacheAction, Cli, Commands, SessionAction};

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            company,
            kind,
            force_refresh,
            modules,
        } => commands::analyze::run(&company, kind.as_deref(), force_refresh, &modules),
        Commands::Status { task_id } => commands::status::run(&task_id),
        Commands::Cache { action } => match action {
            CacheAction::Stats => commands::cache::run_stats(),
            CacheAction::Sweep => commands::cache::run_sweep(),
            CacheAction::Clear => commands::cache::run_clear(),
        },
        Commands::Session { action } => match action {
            Some(SessionAction::List) | None => commands::session::run_list(),
            Some(SessionAction::Show { company }) => commands::session::run_show(&company),
            Some(SessionAction::Clear { company }) => commands::session::run_clear(&company),
        },
        Commands::Version => commands::version::run(),
    }
}
