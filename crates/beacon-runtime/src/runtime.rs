//! The owned runtime object

use anyhow::{Context, Result};
use beacon_bus::{
    BusEvent, BusTransport, MqttSettings, MqttTransport, ReconnectBackoff, Router, RouterConfig,
};
use beacon_config::{BeaconConfig, BusConfig, PoolSettings, StoreConfig};
use beacon_pool::{PoolConfig, TaskPool};
use beacon_store::{RecordStore, SqliteConfig, SqlitePool};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Store, task pool and router for one process.
///
/// Constructed once at startup and handed to whatever needs it; there is no
/// global instance. Dropping it without [`Runtime::shutdown`] aborts the bus
/// driver and closes the pool, blocking until queued tasks have run. Bus
/// events not yet dispatched are lost and the transport is not disconnected.
pub struct Runtime {
    config: BeaconConfig,
    store: RecordStore,
    pool: Arc<TaskPool>,
    router: Arc<Router>,
    driver: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Open the store and pool and connect to the configured MQTT broker
    pub async fn start(config: BeaconConfig) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let (transport, events) = MqttTransport::connect(mqtt_settings(&config.bus))
            .context("failed to start MQTT transport")?;
        Self::with_transport(config, Arc::new(transport), events).await
    }

    /// Same as [`Runtime::start`] with a caller-supplied transport
    pub async fn with_transport(
        config: BeaconConfig,
        transport: Arc<dyn BusTransport>,
        events: mpsc::Receiver<BusEvent>,
    ) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let sqlite = SqlitePool::new(sqlite_config(&config.store)).with_context(|| {
            format!("failed to open store at {}", config.store.path.display())
        })?;
        let store = RecordStore::new(sqlite);

        let pool = Arc::new(
            TaskPool::open(pool_config(&config.pool)).context("failed to start task pool")?,
        );

        let router = Arc::new(Router::new(
            transport,
            Arc::clone(&pool),
            RouterConfig {
                request_timeout: Duration::from_millis(config.bus.request_timeout_ms),
            },
        ));

        let driver = {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.run(events).await })
        };

        info!(
            db = %config.store.path.display(),
            workers = config.pool.workers,
            "Runtime started"
        );

        Ok(Self {
            config,
            store,
            pool,
            router,
            driver: Some(driver),
        })
    }

    pub fn config(&self) -> &BeaconConfig {
        &self.config
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn pool(&self) -> &Arc<TaskPool> {
        &self.pool
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Close the router, drain the pool and stop the event driver
    pub async fn shutdown(mut self) -> Result<()> {
        self.router.close().await;

        if let Some(driver) = self.driver.take() {
            driver.abort();
            match driver.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    warn!(error = %e, "Bus driver task failed");
                    return Err(e).context("bus driver task failed");
                }
            }
        }

        let stats = self.pool.stats();
        info!(
            completed = stats.completed,
            failed = stats.failed,
            panicked = stats.panicked,
            "Runtime stopped"
        );
        Ok(())
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let Some(driver) = self.driver.take() else {
            return;
        };
        warn!("Runtime dropped without shutdown");
        driver.abort();
        self.pool.close();
    }
}

fn sqlite_config(store: &StoreConfig) -> SqliteConfig {
    SqliteConfig {
        path: store.path.clone(),
        wal_mode: store.wal_mode,
        foreign_keys: store.foreign_keys,
        busy_timeout_ms: store.busy_timeout_ms,
        cache_size: store.cache_size,
        mmap_size: store.mmap_size,
    }
}

fn pool_config(pool: &PoolSettings) -> PoolConfig {
    PoolConfig::with_workers(pool.workers)
        .queue_capacity(pool.queue_capacity)
        .thread_name(pool.thread_name.clone())
}

fn mqtt_settings(bus: &BusConfig) -> MqttSettings {
    let credentials = bus
        .username
        .clone()
        .map(|user| (user, bus.password.clone().unwrap_or_default()));
    MqttSettings {
        host: bus.host.clone(),
        port: bus.port,
        client_id: bus.client_id.clone(),
        keep_alive: Duration::from_secs(bus.keep_alive_secs),
        clean_session: bus.clean_session,
        credentials,
        event_capacity: bus.event_capacity,
        backoff: ReconnectBackoff {
            initial: Duration::from_millis(bus.reconnect_initial_ms),
            max: Duration::from_millis(bus.reconnect_max_ms),
        },
        ..MqttSettings::default()
    }
}
