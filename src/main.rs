//! OCPP Central System
//!
//! OCPP-J 1.5 / 1.6 WebSocket server for managing EV charging stations.
//! Reads configuration from a TOML file (~/.config/ocpp-central/config.toml,
//! or the path in `OCPP_CONFIG`).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ocpp_central::application::commands::OutboundCommandClient;
use ocpp_central::application::handlers::ActionDispatcher;
use ocpp_central::application::services::{
    ChargePointService, ConnectionSweeper, LifecycleSettings, StationCommandService,
    SweeperConfig,
};
use ocpp_central::application::session::{CloseReason, ConnectionRegistry};
use ocpp_central::application::RequestCorrelator;
use ocpp_central::config::LoggingSection;
use ocpp_central::infrastructure::{
    InMemoryLockManager, InMemoryStorage, StaticAuthorization, StaticTenantResolver,
    ZeroCostPricing,
};
use ocpp_central::shared::ShutdownCoordinator;
use ocpp_central::{default_config_path, AppConfig, Config, OcppServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Load configuration ─────────────────────────────────────
    let config_path = default_config_path();
    let loaded = AppConfig::load(&config_path);
    let app_cfg = loaded.as_ref().ok().cloned().unwrap_or_default();
    init_tracing(&app_cfg.logging);
    match &loaded {
        Ok(_) => info!("Configuration loaded from {}", config_path.display()),
        Err(e) => error!("Failed to load config: {}. Using defaults.", e),
    }

    info!("Starting OCPP Central System...");

    // ── Prometheus exporter (must be installed before any metrics calls) ──
    if app_cfg.metrics.enabled {
        let listen: SocketAddr = app_cfg.metrics.listen.parse()?;
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(listen)
            .install()?;
        info!("📊 Prometheus metrics available on http://{}/metrics", listen);
    }

    // ── Collaborators ──────────────────────────────────────────
    let storage = Arc::new(InMemoryStorage::new());
    let authorization = Arc::new(StaticAuthorization::from_lists(
        app_cfg.authorization.accepted_tags.clone(),
        app_cfg.authorization.blocked_tags.clone(),
    ));
    let pricing = Arc::new(ZeroCostPricing::new(app_cfg.pricing.currency.clone()));
    let tenants = Arc::new(StaticTenantResolver::new(app_cfg.tenants.clone()));
    info!(
        tenants = tenants.len(),
        accepted_tags = app_cfg.authorization.accepted_tags.len(),
        "Reference collaborators initialized"
    );

    // ── Protocol engine ────────────────────────────────────────
    let service = Arc::new(ChargePointService::new(
        storage,
        authorization,
        pricing,
        LifecycleSettings {
            heartbeat_interval: app_cfg.ocpp.heartbeat_interval,
            reassign_connector_zero_meter_values: app_cfg
                .ocpp
                .compat
                .reassign_connector_zero_meter_values,
        },
    ));
    let config = Config::from(&app_cfg);
    let registry = ConnectionRegistry::shared(Arc::new(RequestCorrelator::new()));
    let dispatcher = Arc::new(ActionDispatcher::new(service));
    let commands = Arc::new(StationCommandService::new(
        OutboundCommandClient::from_config(registry.clone(), &config),
        Arc::new(InMemoryLockManager::new()),
    ));
    info!(
        call_timeout_secs = commands.client().timeout().as_secs(),
        "Outbound command client ready"
    );

    // Initialize shutdown coordinator
    let shutdown = ShutdownCoordinator::new(app_cfg.server.shutdown_timeout);
    let shutdown_signal = shutdown.signal();
    shutdown.start_signal_listener();

    let sweeper = ConnectionSweeper::new(
        registry.clone(),
        SweeperConfig {
            check_interval: Duration::from_secs(app_cfg.ocpp.sweep_interval_secs),
            max_idle: Duration::from_secs(app_cfg.ocpp.stale_connection_secs),
        },
    )
    .start(shutdown_signal.clone());

    let server = OcppServer::new(config, registry.clone(), dispatcher, tenants)
        .with_shutdown(shutdown_signal.clone());
    let mut ws_task = tokio::spawn(async move { server.run().await });

    info!("🚀 Server started. Press Ctrl+C to shutdown gracefully.");

    // Wait for shutdown signal or server error
    let server_exited = tokio::select! {
        result = &mut ws_task => {
            report_server_exit(result);
            true
        }
        _ = shutdown_signal.wait() => false,
    };
    shutdown_signal.trigger();

    let completed = shutdown
        .shutdown_with_cleanup(|| async move {
            let closed = registry.close_all(CloseReason::Shutdown);
            info!(closed, "🧹 Closed remaining connections");
            if !server_exited {
                report_server_exit(ws_task.await);
            }
            if let Err(e) = sweeper.await {
                warn!(error = %e, "Connection sweeper task failed");
            }
        })
        .await;

    if !completed {
        warn!("Some connections did not close before the shutdown timeout");
    }
    info!("👋 OCPP Central System shutdown complete");
    Ok(())
}

fn init_tracing(logging: &LoggingSection) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn report_server_exit(result: Result<std::io::Result<()>, JoinError>) {
    match result {
        Ok(Ok(())) => info!("WebSocket server stopped"),
        Ok(Err(e)) => error!("WebSocket server error: {}", e),
        Err(e) => error!("WebSocket server task panicked: {}", e),
    }
}
