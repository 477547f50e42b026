use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use codemarks::cli::CliApp;
use codemarks::cli_types::{Cli, Commands};
use codemarks::CodeMarksConfig;

/// `CODEMARKS_LOG` takes the usual `EnvFilter` directives.
fn init_logging(verbose: bool) {
    let default = if verbose { "codemarks=debug" } else { "codemarks=warn" };
    let filter = EnvFilter::try_from_env("CODEMARKS_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if cli.no_color {
        colored::control::set_override(false);
    }

    let workspace = cli.command.workspace().clone();
    let config = CodeMarksConfig::load(cli.config.as_deref(), &workspace).context("Failed to load configuration")?;
    let app = CliApp::new(config, &workspace, cli.verbose)?;

    match &cli.command {
        Commands::Scan(args) => {
            app.scan(args).await?;
        }
        Commands::List(args) => {
            app.list(args)?;
        }
        Commands::Watch(args) => app.watch(args).await?,
        Commands::Config(_) => app.show_config()?,
    }

    Ok(())
}
