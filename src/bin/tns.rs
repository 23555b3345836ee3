use clap::Parser;
use tns_core::cli::{Cli, CliHandler, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Start);

    // a running node installs its own subscriber from the config file
    if command != Commands::Start {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
            .init();
    }

    let (tx, rx) = tokio::sync::mpsc::channel(1);
    ctrlc::set_handler(move || {
        let _ = tx.blocking_send(());
    })?;

    let handler = CliHandler::new(cli.config, cli.addr);
    handler.run(command, rx).await?;
    Ok(())
}
