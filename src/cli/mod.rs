//! CLI module for pipstream
//!
//! Provides commands:
//! - `serve`: Run the relay HTTP server (default)
//! - `publish`: Append one event to a channel
//! - `doctor`: Check configuration and backend connectivity

use clap::{Parser, Subcommand};

pub mod doctor;
pub mod publish;

/// pipstream event-stream relay CLI
#[derive(Parser, Debug)]
#[command(name = "pipstream")]
#[command(about = "Relays workflow progress logs to server-sent event streams")]
#[command(version)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the server (default)
    Serve,
    /// Append one event to a channel
    Publish(publish::PublishArgs),
    /// Check configuration and backend connectivity
    Doctor,
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Publish(args)) => publish::run(args).await,
        Some(Commands::Doctor) => doctor::run().await,
        Some(Commands::Serve) | None => crate::server::run().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_serve() {
        let cli = Cli::parse_from(["pipstream"]);
        assert!(cli.command.is_none());
        assert!(!cli.log_json);

        let cli = Cli::parse_from(["pipstream", "serve", "--log-json"]);
        assert!(matches!(cli.command, Some(Commands::Serve)));
        assert!(cli.log_json);
    }

    #[test]
    fn test_publish_arguments() {
        let cli = Cli::parse_from([
            "pipstream",
            "publish",
            "--channel",
            "file:abc",
            "--event-type",
            "uploaded",
            "progress=25",
            "message=stored in bucket",
        ]);
        let Some(Commands::Publish(args)) = cli.command else {
            panic!("expected publish");
        };
        assert_eq!(args.channel, "file:abc");
        assert_eq!(args.event_type, "uploaded");
        assert_eq!(args.fields.len(), 2);
    }

    #[test]
    fn test_publish_requires_channel() {
        assert!(Cli::try_parse_from(["pipstream", "publish", "--event-type", "x"]).is_err());
    }
}
