//! Daemon orchestration -- registry assembly, reload, and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `logtally-daemon`.
//! It loads configuration, builds the [`MonitorRegistry`], starts the query
//! server, and runs the signal loop.
//!
//! # Signals
//!
//! - `SIGHUP`: re-read the configuration file and reconcile the registry
//! - `SIGTERM` / `SIGINT`: graceful shutdown
//!
//! # Shutdown Order
//!
//! 1. Query server (stop accepting queries)
//! 2. Registry (cancel schedules, wait for in-flight cycles, close handles)
//! 3. PID file

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use logtally_core::config::LogtallyConfig;
use logtally_core::metrics as m;
use logtally_monitor::{EngineConfig, MonitorError, MonitorRegistry};

use crate::cli::DaemonCli;
use crate::metrics_server;
use crate::query_server::QueryServer;

/// Outcome of reconciling the registry with a configuration.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Monitors added, updated or replaced.
    pub changed: Vec<String>,
    /// Monitors removed because they are no longer configured.
    pub removed: Vec<String>,
    /// Monitors whose configuration was rejected (existing state kept).
    pub failed: Vec<(String, MonitorError)>,
}

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: LogtallyConfig,
    /// Configuration file re-read on `SIGHUP`, if any.
    config_path: Option<PathBuf>,
    /// Command-line overrides re-applied to every reloaded configuration.
    overrides: Option<DaemonCli>,
    /// Shared monitor registry.
    registry: Arc<MonitorRegistry>,
    /// Signals background tasks to stop.
    shutdown: CancellationToken,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration from `config_path` and build the orchestrator.
    ///
    /// The path is remembered so `SIGHUP` can reload it.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or any
    /// monitor fails to build.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = LogtallyConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Ok(Self::build_from_config(config)
            .await?
            .with_config_path(config_path))
    }

    /// Remember the configuration file re-read on `SIGHUP`.
    #[must_use]
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Keep command-line overrides so a reload does not drop them.
    #[must_use]
    pub fn with_overrides(mut self, cli: DaemonCli) -> Self {
        self.overrides = Some(cli);
        self
    }

    /// Build from an already-loaded configuration.
    ///
    /// Every configured monitor is registered and scheduled. A monitor whose
    /// rules fail to compile aborts the build.
    pub async fn build_from_config(config: LogtallyConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        let engine_config = EngineConfig::from_core(&config.scheduler);
        let registry = Arc::new(
            MonitorRegistry::from_config(&engine_config)
                .map_err(|e| anyhow::anyhow!("failed to build monitor registry: {}", e))?,
        );

        let report = reconcile(&registry, &config).await;
        if let Some((name, err)) = report.failed.into_iter().next() {
            registry.shutdown().await;
            return Err(anyhow::anyhow!("failed to build monitor '{}': {}", name, err));
        }

        tracing::info!(
            monitors = registry.len().await,
            poll_interval_secs = engine_config.poll_interval_secs,
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            config_path: None,
            overrides: None,
            registry,
            shutdown: CancellationToken::new(),
            start_time: Instant::now(),
        })
    }

    /// Start the query server and enter the signal loop.
    ///
    /// Returns after `SIGTERM` or `SIGINT` once everything is shut down.
    pub async fn run(&mut self) -> Result<()> {
        let pid_file = self.pid_file();
        if let Some(path) = &pid_file {
            write_pid_file(path)?;
        }

        let result = self.serve().await;

        self.shutdown().await;
        if let Some(path) = &pid_file {
            remove_pid_file(path);
        }

        result
    }

    async fn serve(&mut self) -> Result<()> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut server_task = if self.config.server.enabled {
            let server = QueryServer::bind(&self.config.server, Arc::clone(&self.registry)).await?;
            Some(spawn_query_server(server, self.shutdown.clone()))
        } else {
            None
        };

        let uptime_task = self
            .config
            .metrics
            .enabled
            .then(|| spawn_uptime_updater(self.start_time, self.shutdown.clone()));

        let mut sighup = signal(SignalKind::hangup())
            .map_err(|e| anyhow::anyhow!("failed to install SIGHUP handler: {}", e))?;
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

        tracing::info!("entering main signal loop");
        let signal_name = loop {
            tokio::select! {
                _ = sighup.recv() => {
                    tracing::info!(signal = "SIGHUP", "reloading configuration");
                    if let Err(e) = self.reload().await {
                        tracing::error!(error = %e, "configuration reload failed, keeping current monitors");
                    }
                }
                _ = sigterm.recv() => break "SIGTERM",
                _ = sigint.recv() => break "SIGINT",
            }
        };
        tracing::info!(signal = signal_name, "shutdown signal received");

        self.shutdown.cancel();
        if let Some(task) = server_task.take() {
            let _ = task.await;
        }
        if let Some(task) = uptime_task {
            let _ = task.await;
        }

        Ok(())
    }

    /// Re-read the configuration file and reconcile the registry.
    ///
    /// Monitors whose new definition is rejected keep running with their
    /// previous definition. Scheduler and server settings only take effect
    /// after a restart.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no configuration file to reload, the file
    /// cannot be loaded, or any monitor definition was rejected.
    pub async fn reload(&mut self) -> Result<ReconcileReport> {
        let result = self.try_reload().await;
        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!(m::DAEMON_CONFIG_RELOADS_TOTAL, m::LABEL_RESULT => outcome).increment(1);
        result
    }

    async fn try_reload(&mut self) -> Result<ReconcileReport> {
        let path = self
            .config_path
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no configuration file to reload"))?;

        let mut config = LogtallyConfig::load(&path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        if let Some(cli) = &self.overrides {
            cli.apply_overrides(&mut config);
            config
                .validate()
                .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
        }
        self.apply_config(config).await
    }

    /// Reconcile the registry with `config` and adopt it as the current configuration.
    ///
    /// # Errors
    ///
    /// Returns an error listing the monitors whose definition was rejected.
    /// Every other monitor is still reconciled.
    pub async fn apply_config(&mut self, config: LogtallyConfig) -> Result<ReconcileReport> {
        if config.scheduler.poll_interval_secs != self.config.scheduler.poll_interval_secs {
            tracing::warn!(
                current = self.config.scheduler.poll_interval_secs,
                requested = config.scheduler.poll_interval_secs,
                "poll interval changes take effect after restart"
            );
        }

        let report = reconcile(&self.registry, &config).await;
        tracing::info!(
            changed = report.changed.len(),
            removed = report.removed.len(),
            failed = report.failed.len(),
            "registry reconciled"
        );

        if report.failed.is_empty() {
            self.config = config;
            return Ok(report);
        }

        let names: Vec<&str> = report.failed.iter().map(|(name, _)| name.as_str()).collect();
        Err(anyhow::anyhow!(
            "rejected monitor definitions: {}",
            names.join(", ")
        ))
    }

    /// Shut down every monitor. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        tracing::info!("stopping all monitors");
        self.registry.shutdown().await;
    }

    /// Shared registry handle (used by the query server and tests).
    pub fn registry(&self) -> Arc<MonitorRegistry> {
        Arc::clone(&self.registry)
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &LogtallyConfig {
        &self.config
    }

    /// Daemon uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn pid_file(&self) -> Option<PathBuf> {
        let path = &self.config.general.pid_file;
        (!path.is_empty()).then(|| PathBuf::from(path))
    }
}

/// Apply every configured monitor and drop the ones no longer configured.
async fn reconcile(registry: &MonitorRegistry, config: &LogtallyConfig) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for monitor in &config.monitors {
        match registry.apply(monitor).await {
            Ok(logtally_monitor::ApplyAction::Unchanged) => {}
            Ok(action) => {
                tracing::debug!(monitor = %monitor.name, action = ?action, "monitor reconciled");
                report.changed.push(monitor.name.clone());
            }
            Err(e) => {
                tracing::error!(monitor = %monitor.name, error = %e, "monitor definition rejected");
                report.failed.push((monitor.name.clone(), e));
            }
        }
    }

    let keep: Vec<String> = config.monitors.iter().map(|m| m.name.clone()).collect();
    report.removed = registry.retain_names(&keep).await;
    report
}

fn spawn_query_server(server: QueryServer, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = server.run(cancel).await {
            tracing::error!(error = %e, "query server stopped with error");
        }
    })
}

/// Spawn a background task that periodically updates the uptime metric.
fn spawn_uptime_updater(start_time: Instant, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(10));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let uptime_secs = start_time.elapsed().as_secs();
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
                }
                () = cancel.cancelled() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}

/// Write the current process PID to a file.
///
/// Used to prevent duplicate daemon instances.
///
/// # Security
///
/// - Uses `create_new(true)` to atomically create file (prevents TOCTOU races)
/// - Verifies the created file is a regular file
/// - Creates parent directory with restrictive permissions (0o700)
///
/// # Errors
///
/// Returns an error if the PID file exists or cannot be written.
pub fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent() {
        use std::os::unix::fs::DirBuilderExt;
        fs::DirBuilder::new()
            .mode(0o700)
            .recursive(true)
            .create(parent)?;
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    if !file.metadata()?.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file",
            path.display()
        ));
    }

    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    writeln!(file, "{pid}")?;

    tracing::info!(pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on daemon shutdown.
///
/// Logs a warning but does not fail if the file cannot be removed.
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file");
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}
