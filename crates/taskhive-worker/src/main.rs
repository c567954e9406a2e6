//! TaskHive Worker Daemon

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use taskhive_worker::{json_output, Cli, Worker, WorkerError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for --json events
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if cli.json {
        json_output::enable_json_mode();
    }

    let (config, kind, harness_config) = cli.into_config();
    let binary = harness_config
        .binary
        .clone()
        .unwrap_or_else(|| kind.default_binary().to_string());
    let adapter = kind.build(harness_config);

    if !adapter.is_available().await {
        let err = WorkerError::HarnessUnavailable {
            name: kind.to_string(),
            binary,
        };
        error!(error = %err, "Cannot start worker");
        json_output::emit_error(&err.to_string());
        return Err(err.into());
    }

    info!(
        worker_id = %config.worker_id,
        store = %config.store_path.display(),
        harness = %kind,
        workdir = %config.working_dir.display(),
        once = config.once,
        "Starting TaskHive worker"
    );
    json_output::emit_worker_started(
        config.worker_id.as_str(),
        &config.store_path.display().to_string(),
        kind.as_str(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing current item before exit");
            let _ = shutdown_tx.send(true);
        }
    });

    let worker = Worker::new(config, adapter);
    let summary = worker.run(shutdown_rx).await?;
    json_output::emit_worker_stopped(worker.config().worker_id.as_str(), &summary);

    Ok(())
}
