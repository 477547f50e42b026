use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "codemarks")]
#[command(about = "Keep bookmarks in sync with CodeMarks comments in your source tree")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to codemarks.toml in the workspace)
    #[arg(short, long, global = true, env = "CODEMARKS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan the workspace and reconcile markers
    Scan(ScanArgs),
    /// List tracked markers by group
    List(ListArgs),
    /// Rescan whenever files change, until interrupted
    Watch(WatchArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

impl Commands {
    pub fn workspace(&self) -> &PathBuf {
        match self {
            Commands::Scan(args) => &args.path,
            Commands::List(args) => &args.path,
            Commands::Watch(args) => &args.path,
            Commands::Config(args) => &args.path,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// Workspace root
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Ignore the scan cache and re-read every file
    #[arg(short, long)]
    pub force: bool,

    /// Print the scan report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Workspace root
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Only show the group for this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Workspace root
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Debounce window in milliseconds (overrides the config)
    #[arg(long)]
    pub debounce_ms: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Workspace root used to locate codemarks.toml
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_scan() {
        let cli = Cli::parse_from(["codemarks", "scan", "/tmp/ws", "--force", "-v"]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Scan(args) => {
                assert!(args.force);
                assert_eq!(args.path, PathBuf::from("/tmp/ws"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_default_workspace() {
        let cli = Cli::parse_from(["codemarks", "list", "--tag", "api"]);
        assert_eq!(cli.command.workspace(), &PathBuf::from("."));
    }
}
