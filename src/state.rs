use crate::application::ports::{ConnectivityProbe, RemoteBackend, SyncEventSink};
use crate::application::services::{NetworkMonitor, SyncEngine};
use crate::infrastructure::database::ConnectionPool;
use crate::infrastructure::offline::{
    QueueMaintenanceJob, SqliteConflictLog, SqliteEntityStore, SqliteSyncQueue,
};
use crate::presentation::handlers::SyncHandler;
use crate::shared::circuit_breaker::CircuitBreaker;
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use std::sync::Arc;

/// Wires the whole sync stack together. The host application supplies the
/// backend transport, and optionally a connectivity probe and an event sink
/// for pushing state changes to the UI.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub pool: ConnectionPool,
    pub monitor: Arc<NetworkMonitor>,
    pub engine: Arc<SyncEngine>,
    pub handler: Arc<SyncHandler>,
    pub maintenance: Arc<QueueMaintenanceJob>,
}

impl AppState {
    pub async fn new(
        config: AppConfig,
        backend: Arc<dyn RemoteBackend>,
        probe: Option<Arc<dyn ConnectivityProbe>>,
        sink: Option<Arc<dyn SyncEventSink>>,
    ) -> Result<Self, AppError> {
        config.validate().map_err(AppError::Config)?;

        let pool = ConnectionPool::new(&config.database).await?;
        pool.migrate().await?;

        let queue = Arc::new(
            SqliteSyncQueue::new(pool.pool().clone())
                .with_default_max_retries(config.sync.default_max_retries)
                .with_refresh_created_at_on_coalesce(config.sync.refresh_created_at_on_coalesce),
        );
        let entities = Arc::new(SqliteEntityStore::new(pool.pool().clone()));
        let conflicts = Arc::new(SqliteConflictLog::new(pool.pool().clone()));

        let monitor = Arc::new(NetworkMonitor::new(
            config.monitor.clone(),
            probe,
            sink.clone(),
        ));
        let breaker = Arc::new(CircuitBreaker::new(config.breaker.clone()));

        let engine = Arc::new(SyncEngine::new(
            queue.clone(),
            entities,
            conflicts,
            backend,
            monitor.clone(),
            breaker,
            sink,
            config.sync.clone(),
        ));
        let handler = Arc::new(SyncHandler::new(engine.clone(), monitor.clone()));
        let maintenance = QueueMaintenanceJob::new(queue, &config.sync);

        Ok(Self {
            config,
            pool,
            monitor,
            engine,
            handler,
            maintenance,
        })
    }

    /// Starts the background loops. Maintenance runs once up front so tasks
    /// stranded in flight by the previous process are released immediately.
    pub async fn start(&self) {
        self.maintenance.trigger();
        self.monitor.start().await;
        if self.config.sync.auto_drain {
            self.engine.start().await;
        }
        tracing::info!(auto_drain = self.config.sync.auto_drain, "sync stack started");
    }

    pub async fn shutdown(&self) {
        self.engine.stop().await;
        self.monitor.stop().await;
        self.pool.close().await;
        tracing::info!("sync stack shut down");
    }
}
