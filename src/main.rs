use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use fluid_stream_worker::config::{create_default_config_file, WorkerConfig, CONFIG_FILE_NAME};
use fluid_stream_worker::message::FluidRequest;
use fluid_stream_worker::{request_frames, run_worker};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_WIDTH: u32 = 100;
const DEFAULT_HEIGHT: u32 = 100;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Logs, fatal errors included, go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Worker failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let mut args = std::env::args().skip(1);
    if let Some(command) = args.next() {
        return match command.as_str() {
            "init-config" => {
                let path = args
                    .next()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
                create_default_config_file(&path)
            }
            "request" => {
                let mut number = |name: &str, default: Option<u32>| -> Result<u32> {
                    match (args.next(), default) {
                        (Some(raw), _) => raw
                            .parse()
                            .with_context(|| format!("Invalid {} '{}'", name, raw)),
                        (None, Some(value)) => Ok(value),
                        (None, None) => Err(anyhow!("Missing {}", name)),
                    }
                };
                let request = FluidRequest {
                    frames: number("frame count", None)?,
                    width: number("width", Some(DEFAULT_WIDTH))?,
                    height: number("height", Some(DEFAULT_HEIGHT))?,
                    sources: Vec::new(),
                };
                let config = WorkerConfig::load()?;
                let frames = request_frames(&config, &request).await?;
                info!(frames = frames.len(), "All frames received");
                Ok(())
            }
            other => Err(anyhow!(
                "Unknown command '{}', expected 'init-config [path]' or 'request <frames> [width height]'",
                other
            )),
        };
    }

    let config = WorkerConfig::load()?;
    info!(
        queue = %config.worker.queue,
        missing_reply_to = ?config.worker.missing_reply_to,
        "Starting fluid stream worker"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Ctrl+C received");
    };

    run_worker(&config, shutdown).await?;
    Ok(())
}
