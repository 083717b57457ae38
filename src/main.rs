//! batchzip service binary
//!
//! Loads the YAML configuration, initializes logging, builds the service
//! and serves the API until a termination signal arrives.

use batchzip::config::LoggerConfig;
use batchzip::{api, Config, ZipperService};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config/local/config_local.yaml";

#[derive(Parser, Debug)]
#[command(
    name = "batchzip",
    version,
    about = "HTTP-fronted batch download and zip archival service"
)]
struct Args {
    /// Path to the config file
    #[arg(long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,
}

fn init_tracing(logger: &LoggerConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logger.level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if logger.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.compact().init();
    }
}

#[tokio::main]
async fn main() -> batchzip::Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)?;
    init_tracing(&config.logger);
    tracing::info!(
        project = %config.logger.project,
        config = %args.config.display(),
        "starting batchzip"
    );

    let config = Arc::new(config);
    let service = Arc::new(ZipperService::new(&config)?);

    let mut api_handle = tokio::spawn(api::start_api_server(service.clone(), config));

    tokio::select! {
        // server died on its own (bind failure, fatal accept error)
        result = &mut api_handle => {
            let server_result = match result {
                Ok(server_result) => server_result,
                Err(e) => {
                    tracing::error!(error = %e, "API server task panicked");
                    Ok(())
                }
            };
            service.shutdown().await;
            server_result?;
        }
        _ = batchzip::wait_for_signal() => {
            service.shutdown().await;
            if let Ok(Err(e)) = api_handle.await {
                tracing::warn!(error = %e, "API server exited with error");
            }
        }
    }

    tracing::info!("batchzip stopped");
    Ok(())
}
