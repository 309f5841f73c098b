use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::lifecycle::ServerConfig;

#[derive(Debug, Parser)]
#[command(
    name = "docsift",
    about = "Serve named full-text search indices over HTTP"
)]
pub struct Cli {
    /// Directory holding one subdirectory per index
    #[arg(long, env = "DOCSIFT_BASE_DIR", default_value = "index", global = true)]
    pub base_dir: PathBuf,

    /// Address of the public API
    #[arg(
        long,
        env = "DOCSIFT_LISTEN",
        default_value = "0.0.0.0:9089",
        global = true
    )]
    pub listen: SocketAddr,

    /// Address of the admin surface
    #[arg(
        long,
        env = "DOCSIFT_ADMIN_LISTEN",
        default_value = "127.0.0.1:9088",
        global = true
    )]
    pub admin_listen: SocketAddr,

    /// Seconds between an admin shutdown request and exit
    #[arg(long, default_value_t = 10, global = true)]
    pub shutdown_grace: u64,

    /// Seconds open connections may keep running once shutdown starts
    #[arg(long, default_value_t = 5, global = true)]
    pub drain_timeout: u64,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the API and admin servers (the default)
    Serve,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

impl Cli {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            listen: self.listen,
            admin_listen: self.admin_listen,
            shutdown_grace: Duration::from_secs(self.shutdown_grace),
            drain_timeout: Duration::from_secs(self.drain_timeout),
        }
    }
}

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "docsift",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn defaults_serve() {
        let cli = Cli::try_parse_from(["docsift"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, 0);

        let config = cli.server_config();
        assert_eq!(config.shutdown_grace, Duration::from_secs(10));
        assert_eq!(config.drain_timeout, Duration::from_secs(5));
        assert_eq!(config.admin_listen.ip().to_string(), "127.0.0.1");
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "docsift",
            "serve",
            "--base-dir",
            "/tmp/idx",
            "--listen",
            "127.0.0.1:8000",
            "--shutdown-grace",
            "2",
            "--drain-timeout",
            "1",
            "-vv",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Command::Serve)));
        assert_eq!(cli.base_dir, PathBuf::from("/tmp/idx"));
        assert_eq!(cli.listen.port(), 8000);
        let config = cli.server_config();
        assert_eq!(config.shutdown_grace, Duration::from_secs(2));
        assert_eq!(config.drain_timeout, Duration::from_secs(1));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["docsift", "-q", "-v"]).is_err());
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
