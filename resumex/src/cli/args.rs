//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Resumex - run commands as sessions you can resume after an interruption
#[derive(Parser, Debug)]
#[command(name = "resumex")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding sessions and logs (default: ~/.resumex)
    #[arg(long, global = true, value_name = "PATH")]
    pub base_dir: Option<PathBuf>,

    /// Show debug diagnostics on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a command with resumable session tracking
    Run {
        /// Command and arguments to run
        #[arg(
            required = true,
            trailing_var_arg = true,
            allow_hyphen_values = true,
            value_name = "COMMAND"
        )]
        command: Vec<String>,
    },

    /// Resume a previously interrupted session
    Resume {
        /// Session ID or unambiguous prefix
        id: String,
    },

    /// List all saved sessions, newest first
    List,

    /// Delete a session and its log
    Delete {
        /// Session ID or unambiguous prefix
        id: String,
    },

    /// List tools with a built-in resume rule
    Rules,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_keeps_command_flags() {
        let cli = Cli::parse_from(["resumex", "run", "wget", "-q", "http://x/file"]);
        match cli.command {
            Commands::Run { command } => assert_eq!(command, ["wget", "-q", "http://x/file"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_base_dir() {
        let cli = Cli::parse_from(["resumex", "list", "--base-dir", "/tmp/rx"]);
        assert_eq!(cli.base_dir, Some(PathBuf::from("/tmp/rx")));
        assert!(matches!(cli.command, Commands::List));
    }

    #[test]
    fn test_run_requires_command() {
        assert!(Cli::try_parse_from(["resumex", "run"]).is_err());
    }
}
