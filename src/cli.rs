use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;

use crate::{config::Config, control::ConnectRequest, record::Record};

/// The command line interface for serial fanout.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a configuration file
    pub config: Option<PathBuf>,

    /// Log level on stdout.
    /// Overridden by `RUST_LOG` if set.
    #[arg(long, default_value_t = Level::INFO)]
    pub log_level: Level,

    /// Also log to daily rotated files in this directory.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Port of the HTTP server, overrides the configuration file.
    #[arg(long)]
    pub http_port: Option<u16>,

    /// Port of the push (websocket) server, overrides the configuration file.
    #[arg(long)]
    pub push_port: Option<u16>,

    /// Directory of static files to serve, overrides the configuration file.
    #[arg(long)]
    pub public_dir: Option<PathBuf>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Apply the overrides given on the command line.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(port) = self.http_port {
            config.http_port = port;
        }

        if let Some(port) = self.push_port {
            config.push_port = port;
        }

        if let Some(dir) = &self.public_dir {
            config.public_dir = dir.clone();
        }

        config
    }
}

/// Commands available in the command line interface.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Examples for user convenience.
    #[clap(subcommand)]
    Examples(Examples),
}

/// Helpful examples for users.
#[derive(Subcommand, Clone, Debug)]
pub enum Examples {
    /// Show an example of a configuration file's contents.
    Config,

    /// Show an example JSON request body for opening a connection.
    ConnectRequest,

    /// Show an example JSON message (from server to viewer) of a new line.
    DataMessage,
}

/// Run a subcommand.
pub fn handle_command(command: Commands) {
    match command {
        Commands::Examples(example) => match example {
            Examples::Config => {
                let serialized = Config::example()
                    .serialize_pretty()
                    .expect("The example config only holds UTF-8 paths");
                println!("{serialized}");
            }
            Examples::ConnectRequest => {
                let serialized = serde_json::to_string_pretty(&ConnectRequest::example())
                    .expect("Should serialize well");
                println!("{serialized}");
            }
            Examples::DataMessage => {
                println!("{}", Record::data("temperature=21.5").serialize());
            }
        },
    }
}
