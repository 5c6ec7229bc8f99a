//! Service state management and component initialization

use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::ServiceConfig;
use account_service::{StorageBackend, WalletService};
use game_gateway::{BetAuditLog, BuffaloService, InMemoryAuditLog, PgAuditLog};

/// Service state containing all initialized components
pub struct ServiceState {
    /// Service configuration
    pub config: ServiceConfig,

    /// Ledger boundary
    pub wallet: WalletService,

    /// Buffalo provider adapter
    pub gateway: Arc<BuffaloService>,

    /// Service running state
    pub is_running: Arc<RwLock<bool>>,
}

/// Health summary reported at shutdown and by operators
#[derive(Debug, Clone)]
pub struct ServiceHealth {
    pub is_running: bool,
    pub ledger_reachable: bool,
}

impl ServiceState {
    /// Create a new service state with all components initialized
    pub async fn new(config: ServiceConfig) -> Result<Self> {
        info!("Initializing service components...");

        info!("Initializing ledger ({:?} backend)...", config.ledger.backend);
        let wallet = account_service::connect(&config.ledger)
            .await
            .context("Failed to initialize the ledger")?;

        info!("Initializing bet audit log...");
        let audit: Arc<dyn BetAuditLog> = match config.ledger.backend {
            StorageBackend::Postgres => Arc::new(
                PgAuditLog::connect(&config.ledger.database.url, config.ledger.database.max_connections)
                    .await
                    .context("Failed to initialize the bet audit log")?,
            ),
            StorageBackend::Memory => Arc::new(InMemoryAuditLog::new()),
        };

        let gateway = Arc::new(BuffaloService::new(
            wallet.clone(),
            audit,
            Arc::new(config.gateway.clone()),
        ));
        info!("Buffalo gateway initialized (site prefix {})", config.gateway.site.prefix);

        Ok(Self { config, wallet, gateway, is_running: Arc::new(RwLock::new(false)) })
    }

    /// Serve the REST API until `shutdown` resolves
    pub async fn serve_http(&self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let addr = self.config.gateway.server_addr().context("Invalid server address")?;
        let routes = game_gateway::rest_api::create_routes(self.gateway.clone());

        let (bound, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(addr, shutdown)
            .with_context(|| format!("Failed to bind {}", addr))?;

        *self.is_running.write().await = true;
        info!("REST API listening on {}", bound);
        server.await;
        *self.is_running.write().await = false;

        info!("REST API stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub async fn health_check(&self) -> ServiceHealth {
        let ledger_reachable = match self.wallet.store().health_check().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Ledger health check failed: {}", e);
                false
            }
        };
        ServiceHealth { is_running: self.is_running().await, ledger_reachable }
    }

    /// Release components after the server has stopped
    pub async fn shutdown(&self) -> Result<()> {
        let health = self.health_check().await;
        info!(
            "Shutting down components (running={}, ledger_reachable={})",
            health.is_running, health.ledger_reachable
        );
        *self.is_running.write().await = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use account_service::StorageBackend;

    fn memory_config() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.service.development_mode = true;
        config.ledger.backend = StorageBackend::Memory;
        config.gateway.server.host = "127.0.0.1".to_string();
        config.gateway.server.port = 0;
        config
    }

    #[tokio::test]
    async fn test_memory_state_is_healthy() {
        let state = ServiceState::new(memory_config()).await.unwrap();
        let health = state.health_check().await;
        assert!(health.ledger_reachable);
        assert!(!health.is_running);
    }

    #[tokio::test]
    async fn test_server_stops_on_shutdown_signal() {
        let state = Arc::new(ServiceState::new(memory_config()).await.unwrap());
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let server = {
            let state = state.clone();
            tokio::spawn(async move {
                state
                    .serve_http(async {
                        let _ = stop_rx.await;
                    })
                    .await
            })
        };

        stop_tx.send(()).unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), server).await;
        assert!(result.unwrap().unwrap().is_ok());
        assert!(!state.is_running().await);
    }
}
