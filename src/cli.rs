use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "teamprops")]
#[command(version)]
#[command(about = "Slack bot that hands out props and keeps a leaderboard")]
pub struct Cli {
    /// Path to the YAML config file.
    #[arg(long, short, global = true, env = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect to Slack and run the bot until interrupted.
    Server {
        /// Slack bot token, overrides the config file and environment.
        #[arg(long, hide_env_values = true)]
        token: Option<String>,
    },
    /// Create or update the database schema and exit.
    Migrate,
    /// Print the current leaderboards.
    Leaderboard {
        #[arg(long, short)]
        limit: Option<usize>,
    },
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn parses_server_with_token() {
        let cli = Cli::try_parse_from([
            "teamprops",
            "server",
            "--config",
            "/etc/teamprops.yaml",
            "--token",
            "xoxb-1",
        ])
        .expect("valid args");

        assert_eq!(cli.config, Some(PathBuf::from("/etc/teamprops.yaml")));
        assert!(matches!(cli.command, Command::Server { token: Some(ref t) } if t == "xoxb-1"));
    }

    #[test]
    fn parses_leaderboard_limit() {
        let cli = Cli::try_parse_from(["teamprops", "leaderboard", "--limit", "5"])
            .expect("valid args");
        assert!(matches!(cli.command, Command::Leaderboard { limit: Some(5) }));
    }

    #[test]
    fn requires_a_subcommand() {
        assert!(Cli::try_parse_from(["teamprops"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
