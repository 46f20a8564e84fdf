use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use bastion_server::{App, BastionConfig};

#[derive(Parser, Debug)]
#[command(name = "bastion", about = "Resilience layer in front of the agent Registry")]
struct Cli {
    #[arg(short, long, default_value = "bastion.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the service until Ctrl-C (default).
    Run,
    /// Load and validate the configuration, then exit.
    CheckConfig,
    /// Run one reconciliation pass and print the result as JSON.
    Reconcile,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = BastionConfig::load(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::CheckConfig => {
            config.validate()?;
            println!("{}: configuration OK", cli.config.display());
            Ok(())
        }
        Commands::Reconcile => {
            bastion_server::telemetry::init(&config.telemetry);
            let app = App::build(config)?;
            let result = app.reconcile_now().await;
            app.shutdown().await;
            println!("{}", serde_json::to_string_pretty(&result?)?);
            Ok(())
        }
        Commands::Run => {
            bastion_server::telemetry::init(&config.telemetry);
            if !cli.config.exists() {
                info!(path = %cli.config.display(), "config file not found, using defaults");
            }
            App::build(config)?.run_until_shutdown().await;
            Ok(())
        }
    }
}
