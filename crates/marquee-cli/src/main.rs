//! Marquee: publishes files dropped into a WebDAV folder to a signage display.
//!
//! Config is read from `--config`, `MARQUEE_CONFIG` (or `CONFIG_PATH`), or `./config.yaml`.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use marquee_cli::{init_tracing, print_json, shutdown_channel, Services};
use marquee_cms::XiboClient;
use marquee_core::{resolve_config_path, Config};

#[derive(Parser)]
#[command(name = "marquee", version, about = "WebDAV to digital signage publisher")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the source folder and publish new files (default)
    Run {
        /// Run a single polling cycle and exit
        #[arg(long)]
        once: bool,
    },
    /// Check the configuration and both connections, then exit
    Check,
    /// List the displays known to the CMS
    Displays,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.clone());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = match init_tracing(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(config = %config_path.display(), "Loaded configuration");

    let command = cli.command.unwrap_or(Commands::Run { once: false });
    match execute(command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Startup failed");
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Commands, config: &Config) -> anyhow::Result<()> {
    match command {
        Commands::Run { once } => {
            let services = Services::from_config(config)?;
            services.check().await?;

            let mut control = services.control_loop(config);
            if once {
                control.poll_once().await.log_summary();
            } else {
                control = control.with_shutdown(shutdown_channel());
                control.run().await;
            }
        }
        Commands::Check => {
            let services = Services::from_config(config)?;
            let group = services.check().await?;
            println!(
                "OK: display '{}' (id {}) in display group {}",
                group.display_name, group.display_id, group.display_group_id
            );
        }
        Commands::Displays => {
            let client = XiboClient::from_config(config).context("Failed to create CMS client")?;
            let displays = client.displays().await.context("Failed to list displays")?;
            print_json(&displays)?;
        }
    }
    Ok(())
}
