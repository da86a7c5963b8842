//! Startup sequence shared by the binary and its tests.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tdbridge_core::logging::{LogFormat, init_subscriber};
use tdbridge_core::{Engine, set_log_verbosity};
use tdbridge_server::metrics::install_recorder;
use tdbridge_server::{Bridge, BridgeServer, ServerConfig};
use tdbridge_settings::{BridgeSettings, EngineSettings, load_settings_from_path, settings_path};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cli::Cli;

/// Settings file, then environment, then command-line flags.
pub fn resolve_settings(cli: &Cli) -> Result<BridgeSettings> {
    let path = cli.config.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    Ok(settings)
}

/// Set the engine's own log verbosity unless disabled.
///
/// A rejected call aborts startup: an engine that refuses its first command
/// is not usable.
pub fn bootstrap_engine(engine: &dyn Engine, settings: &EngineSettings) -> Result<()> {
    if !settings.set_log_verbosity {
        info!("leaving engine log verbosity unchanged");
        return Ok(());
    }
    set_log_verbosity(engine, settings.log_verbosity_level)
        .context("engine rejected log verbosity bootstrap")?;
    info!(level = settings.log_verbosity_level, "engine log verbosity set");
    Ok(())
}

/// A server that is accepting connections.
pub struct Running {
    /// The server, for shutdown and inspection.
    pub server: BridgeServer,
    /// Bound address.
    pub addr: SocketAddr,
    /// Serving task; finishes after shutdown.
    pub handle: JoinHandle<()>,
}

/// Bootstrap `engine`, then bind and serve.
pub async fn start(
    settings: &BridgeSettings,
    engine: Arc<dyn Engine>,
    metrics: metrics_exporter_prometheus::PrometheusHandle,
) -> Result<Running> {
    bootstrap_engine(engine.as_ref(), &settings.engine)?;

    let bridge = Arc::new(Bridge::new(engine));
    let server = BridgeServer::new(ServerConfig::from(&settings.server), bridge, metrics);
    let (addr, handle) = server.listen().await.context("failed to start server")?;
    Ok(Running { server, addr, handle })
}

/// Run until Ctrl-C, then shut down gracefully.
pub async fn run(cli: Cli, engine: Arc<dyn Engine>) -> Result<()> {
    let settings = resolve_settings(&cli)?;
    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    init_subscriber(&settings.logging.level, format);

    let metrics = install_recorder().context("failed to install metrics recorder")?;
    let running = start(&settings, engine, metrics).await?;
    info!(addr = %running.addr, "tdbridge ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    let coordinator = running.server.shutdown().clone();
    let report = coordinator
        .graceful_shutdown(vec![running.handle], None)
        .await;
    if report.aborted > 0 {
        warn!("server task aborted during shutdown");
    }
    if running.server.connection_count() > 0 {
        warn!(connections = running.server.connection_count(), "connections still open at exit");
    }
    info!("tdbridge stopped");
    Ok(())
}
