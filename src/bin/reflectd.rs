//! Reflect Daemon Binary
//!
//! Wires the executor, system monitor and network relay together and runs
//! until interrupted.

use anyhow::{anyhow, Context};
use clap::Parser;
use reflect::cli::DaemonCli;
use reflect::config::{ConfigLoader, ReflectConfig};
use reflect::drive::{DriveResolver, LsblkDriveResolver};
use reflect::executor::Executor;
use reflect::logging::init_logging;
use reflect::monitor::SystemMonitor;
use reflect::registry::Registry;
use reflect::relay::Relay;
use reflect::store::open_store;
use std::sync::Arc;
use tracing::info;

fn main() -> anyhow::Result<()> {
    let cli = DaemonCli::parse();
    let config = load_config(&cli)?;

    init_logging(Some(&config.logging)).context("Failed to initialize logging")?;

    let registry = Arc::new(Registry::default());
    if let Err(errors) = config.validate(&registry) {
        let joined: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        return Err(anyhow!("Invalid configuration: {}", joined.join("; ")));
    }

    let store = open_store(&config.storage).context("Failed to open metadata store")?;
    info!(
        backend = ?config.storage.backend,
        path = %config.storage.path.display(),
        records = store.keys()?.len(),
        "Metadata store opened"
    );
    let resolver: Arc<dyn DriveResolver> = Arc::new(LsblkDriveResolver);

    let executor = Executor::new(
        Arc::clone(&store),
        registry,
        Arc::clone(&resolver),
        config.defaults.clone(),
    );
    let (handle, _executor_thread) = executor.spawn(config.daemon.queue_capacity)?;

    let monitor = SystemMonitor::new(store, resolver, handle.clone(), &config.daemon);
    let _monitor_thread = monitor.spawn(config.daemon.heartbeat())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(async {
        let relay = Relay::bind(&config.daemon.listen_addr, handle).await?;
        relay
            .run(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await
    })?;

    info!("Reflect daemon stopped");
    Ok(())
}

/// Layered config with command line flags on top
fn load_config(cli: &DaemonCli) -> anyhow::Result<ReflectConfig> {
    let mut config = ConfigLoader::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(ref listen) = cli.listen {
        config.daemon.listen_addr = listen.clone();
    }
    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.logging.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.logging.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.logging.file = file.clone();
    }
    Ok(config)
}
