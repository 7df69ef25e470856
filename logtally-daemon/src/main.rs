//! logtally daemon entry point.
//!
//! Parses the command line, loads configuration, initializes logging and
//! hands control to the [`Orchestrator`].

use anyhow::Result;
use clap::Parser;

use logtally_core::config::LogtallyConfig;
use logtally_daemon::cli::DaemonCli;
use logtally_daemon::logging::init_tracing;
use logtally_daemon::orchestrator::Orchestrator;
use logtally_monitor::FileMonitor;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = LogtallyConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config {}: {}", cli.config.display(), e))?;
    cli.apply_overrides(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    init_tracing(&config.general)?;

    if cli.validate {
        return validate_monitors(&config);
    }

    tracing::info!(
        config = %cli.config.display(),
        monitors = config.monitors.len(),
        "logtally-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config)
        .await?
        .with_config_path(&cli.config)
        .with_overrides(cli);
    orchestrator.run().await?;

    tracing::info!("logtally-daemon shut down");
    Ok(())
}

/// Compile every monitor's rules without opening any file.
fn validate_monitors(config: &LogtallyConfig) -> Result<()> {
    let mut failures = 0usize;
    for monitor_config in &config.monitors {
        match FileMonitor::from_config(monitor_config, config.scheduler.default_block_size) {
            Ok(monitor) => tracing::info!(
                monitor = monitor.name(),
                rules = monitor_config.rules.len(),
                "monitor ok"
            ),
            Err(e) => {
                failures += 1;
                tracing::error!(monitor = %monitor_config.name, error = %e, "monitor invalid");
            }
        }
    }

    if failures > 0 {
        return Err(anyhow::anyhow!("{failures} monitor(s) failed validation"));
    }
    tracing::info!(monitors = config.monitors.len(), "configuration valid");
    Ok(())
}
