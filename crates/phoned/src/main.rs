use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use phoned::format_diagnostics;
use phoned::Config;
use phoned::Engine;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Mirror MQTT-bridged telephony devices as phone entities
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(default_value = "phoned.toml")]
    config: PathBuf,

    /// Validate the configuration, print diagnostics and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let (config, diagnostics) = match Config::from_file(&args.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if !diagnostics.is_empty() {
        eprint!("{}", format_diagnostics(&diagnostics));
    }

    if args.check {
        println!("{}: configuration is valid", args.config.display());
        return ExitCode::SUCCESS;
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(config.logging.targets())
        .init();

    tracing::info!("phoned {} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!("Loaded config from: {}", args.config.display());

    match run(config).await {
        Ok(()) => {
            tracing::info!("phoned shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let engine = Arc::new(Engine::new());

    let runner = engine.clone();
    let engine_task = tokio::spawn(async move {
        if let Err(e) = runner.run().await {
            tracing::error!("Engine stopped: {}", e);
        }
    });

    let registered = engine.register_integrations_from_config(&config).await;
    if registered == 0 {
        tracing::warn!("No integrations configured, no phones will be available");
    }

    let (api_shutdown_tx, api_shutdown_rx) = tokio::sync::oneshot::channel();
    let api_task = config.api.clone().map(|api| {
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = phoned::api::serve(api.listen, api.port, engine, api_shutdown_rx).await {
                tracing::error!("HTTP API server failed: {}", e);
            }
        })
    });

    tracing::info!("Press Ctrl+C to exit");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("failed to listen for shutdown signal: {}", e))?;
    tracing::info!("Received shutdown signal");

    // API before integrations
    if let Some(task) = api_task {
        let _ = api_shutdown_tx.send(());
        let _ = task.await;
    }

    engine.shutdown().await;
    engine_task.abort();

    Ok(())
}
