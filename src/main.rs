use clap::Parser;
use color_eyre::Result;
use serial_fanout::{cli, config::Config, logging, server};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let mut cli = cli::Cli::parse();

    if let Some(command) = cli.command.take() {
        cli::handle_command(command);

        return Ok(());
    }

    logging::init(cli.log_level, cli.log_dir.clone().map(|dir| (cli.log_level, dir))).await;

    let config = if let Some(config_path) = &cli.config {
        debug!(?config_path, "Config from path");
        Config::new_from_path(config_path)?
    } else {
        debug!("Default config");
        Config::default()
    };
    let config = cli.apply(config);

    #[cfg(unix)]
    let mut hangup = signal(SignalKind::hangup())?;

    #[cfg(unix)]
    let hung_up = hangup.recv();

    #[cfg(not(unix))]
    let hung_up = futures::future::pending::<Option<()>>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C, quitting")
        }
        _ = hung_up => {
            info!("Told to hang up, quitting")
        }
        result = server::run_on_ports(config) => {
            error!("Server returned");
            result?;
            return Err(color_eyre::eyre::eyre!("Server stopped unexpectedly"));
        }
    }

    Ok(())
}
