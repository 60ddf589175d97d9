//! Stale connection sweeper
//!
//! Closes connections that have not produced any traffic for longer than the
//! configured threshold. The station reconnects on its own if it is alive.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::application::session::SharedConnectionRegistry;
use crate::shared::ShutdownSignal;

/// Configuration for stale connection sweeping
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often to look for idle connections
    pub check_interval: Duration,
    /// Idle time after which a connection is closed
    pub max_idle: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            max_idle: Duration::from_secs(900),
        }
    }
}

pub struct ConnectionSweeper {
    registry: SharedConnectionRegistry,
    config: SweeperConfig,
}

impl ConnectionSweeper {
    pub fn new(registry: SharedConnectionRegistry, config: SweeperConfig) -> Self {
        Self { registry, config }
    }

    /// Run one sweep and return how many connections were closed.
    pub fn sweep(&self) -> usize {
        let max_idle = chrono::Duration::from_std(self.config.max_idle)
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        let closed = self.registry.sweep_stale(max_idle);
        if !closed.is_empty() {
            info!(closed = closed.len(), "🧹 Closed stale connections");
        }
        closed.len()
    }

    /// Start the background task; it stops when `shutdown` fires.
    pub fn start(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                check_interval_secs = self.config.check_interval.as_secs(),
                max_idle_secs = self.config.max_idle.as_secs(),
                "🧹 Connection sweeper started"
            );
            let mut interval = tokio::time::interval(self.config.check_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let closed = self.sweep();
                        debug!(closed, live = self.registry.count(), "Sweep finished");
                    }
                    _ = shutdown.wait() => break,
                }
            }
            info!("🧹 Connection sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::*;
    use crate::application::commands::RequestCorrelator;
    use crate::application::session::{ChargeBoxIdentity, ConnectionRegistry};
    use crate::domain::OcppVersion;

    #[tokio::test]
    async fn sweeper_stops_on_shutdown() {
        let registry = Arc::new(ConnectionRegistry::new(Arc::new(RequestCorrelator::new())));
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = registry.register(
            ChargeBoxIdentity::new("t1", "CP1"),
            OcppVersion::V16,
            None,
            tx,
        );

        let sweeper = ConnectionSweeper::new(
            registry.clone(),
            SweeperConfig {
                check_interval: Duration::from_millis(10),
                max_idle: Duration::from_secs(3600),
            },
        );
        let shutdown = ShutdownSignal::new();
        let task = sweeper.start(shutdown.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_closed());

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn sweep_closes_idle_connections() {
        let registry = Arc::new(ConnectionRegistry::new(Arc::new(RequestCorrelator::new())));
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = registry.register(
            ChargeBoxIdentity::new("t1", "CP1"),
            OcppVersion::V16,
            None,
            tx,
        );

        let sweeper = ConnectionSweeper::new(
            registry.clone(),
            SweeperConfig {
                check_interval: Duration::from_secs(60),
                max_idle: Duration::ZERO,
            },
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sweeper.sweep(), 1);
        assert!(handle.is_closed());
        assert_eq!(registry.count(), 0);
    }
}
