//! Main application state and service coordination
//!
//! This module contains the AppState that wires the director or the match
//! function together with metrics, health endpoints and background tasks.

use crate::allocator::{
    AgonesAllocatorDirectory, AllocationSelector, DiscoverDirectory, GameServerDirectory,
};
use crate::config::{AllocatorMode, AppConfig};
use crate::director::{AssignmentReporter, Director, WorldRegionProfiles};
use crate::matchfunction::{
    MatchFunctionServer, MatchFunctionService, PlayerCapacityMatchMaker,
};
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector, MetricsService};
use crate::openmatch::{HttpBackendClient, HttpQueryClient, MatchmakingBackend};
use crate::service::health::{DirectorProbe, HealthCheck, ServiceMonitor, ServiceRole};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, info_span, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// The component this process runs
enum Component {
    Director(Arc<Director>),
    MatchFunction(Arc<MatchFunctionServer>),
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    component: Component,

    /// Metrics service for monitoring and health checks
    metrics_service: Arc<MetricsService>,

    monitor: ServiceMonitor,

    /// Cancels the director loop and background tasks
    shutdown_tx: watch::Sender<bool>,

    /// Set once the main component task has returned
    exited_tx: watch::Sender<bool>,

    main_task: Mutex<Option<JoinHandle<()>>>,

    /// Background task handles
    background_tasks: Mutex<Vec<JoinHandle<()>>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Build every component for the given role. Nothing is started yet.
    pub async fn new(config: AppConfig, role: ServiceRole) -> Result<Self, ServiceError> {
        info!("Initializing {} as {}", config.service.name, role);

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let is_running = Arc::new(RwLock::new(false));
        let mut monitor = ServiceMonitor::new(config.service.name.clone(), role, is_running.clone());

        let component = match role {
            ServiceRole::Director => {
                let director = Self::initialize_director(&config, metrics_collector.clone())?;
                monitor = monitor.with_director(DirectorProbe {
                    stats: director.stats(),
                    interval: director.interval(),
                    profiles: director.profiles().len(),
                });
                Component::Director(director)
            }
            ServiceRole::MatchFunction => {
                Component::MatchFunction(Self::initialize_match_function(&config, metrics_collector.clone())?)
            }
        };

        let metrics_service = Self::initialize_metrics(&config, metrics_collector, monitor.clone());
        let (shutdown_tx, _) = watch::channel(false);
        let (exited_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            component,
            metrics_service,
            monitor,
            shutdown_tx,
            exited_tx,
            main_task: Mutex::new(None),
            background_tasks: Mutex::new(Vec::new()),
            is_running,
        })
    }

    /// Start the health endpoints, the main component and background tasks
    pub async fn start(&self) -> Result<(), ServiceError> {
        info!("Starting {} ({})", self.config.service.name, self.monitor.role);

        // Mark as running
        *self.is_running.write().await = true;

        // Start metrics service first
        self.start_metrics_service().await;

        self.start_component().await;

        self.start_background_tasks().await;

        info!("✅ {} started successfully", self.config.service.name);
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of {}", self.config.service.name);

        // Mark as not running
        *self.is_running.write().await = false;
        self.shutdown_tx.send_replace(true);

        if let Component::MatchFunction(server) = &self.component {
            server.stop();
        }

        if let Some(task) = self.main_task.lock().await.take() {
            let timeout = self.config.shutdown_timeout();
            let abort = task.abort_handle();
            match tokio::time::timeout(timeout, task).await {
                Ok(Ok(())) => info!("✅ {} stopped", self.monitor.role),
                Ok(Err(e)) => warn!("{} task ended abnormally: {}", self.monitor.role, e),
                Err(_) => {
                    warn!(
                        "⚠️  {} did not stop within {}s, aborting",
                        self.monitor.role,
                        timeout.as_secs()
                    );
                    abort.abort();
                }
            }
        }

        // Stop background tasks (including metrics service task)
        self.stop_background_tasks().await;

        // Stop metrics service
        info!("Stopping metrics service...");
        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        } else {
            info!("✅ Metrics service stopped");
        }

        if self.monitor.role == ServiceRole::Director {
            info!("Final director statistics: {:?}", self.monitor.director_stats());
        }
        info!("✅ {} shutdown completed", self.config.service.name);

        Ok(())
    }

    /// Resolves once the main component has stopped on its own or after shutdown
    pub async fn wait_for_exit(&self) {
        let mut exited = self.exited_tx.subscribe();
        let _ = exited.wait_for(|done| *done).await;
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn monitor(&self) -> &ServiceMonitor {
        &self.monitor
    }

    /// Get metrics service
    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    pub fn director(&self) -> Option<Arc<Director>> {
        match &self.component {
            Component::Director(director) => Some(director.clone()),
            Component::MatchFunction(_) => None,
        }
    }

    /// Build the directory selected by the configured mode
    pub fn build_directory(config: &AppConfig) -> Result<Arc<dyn GameServerDirectory>, ServiceError> {
        let directory: Arc<dyn GameServerDirectory> = match config.director.mode {
            AllocatorMode::Discover => {
                info!("Using discover directory at {}", config.discover.url);
                Arc::new(DiscoverDirectory::new(&config.discover_config()).map_err(|e| {
                    ServiceError::Initialization {
                        message: format!("Failed to create discover client: {}", e),
                    }
                })?)
            }
            AllocatorMode::Agones => {
                config
                    .agones
                    .validate()
                    .map_err(|e| ServiceError::Configuration {
                        message: e.to_string(),
                    })?;
                info!(
                    "Using Agones allocator at {} (namespace {}, multi-cluster {})",
                    config.agones.base_url(),
                    config.agones.namespace,
                    config.agones.multi_cluster
                );
                Arc::new(AgonesAllocatorDirectory::new(&config.agones).map_err(|e| {
                    ServiceError::Initialization {
                        message: format!("Failed to create Agones allocator client: {}", e),
                    }
                })?)
            }
        };
        Ok(directory)
    }

    fn initialize_director(
        config: &AppConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Arc<Director>, ServiceError> {
        info!("Initializing director components");

        let backend: Arc<dyn MatchmakingBackend> = Arc::new(
            HttpBackendClient::new(config.backend_endpoint(), config.function_config()).map_err(|e| {
                ServiceError::Initialization {
                    message: format!("Failed to create Open Match backend client: {}", e),
                }
            })?,
        );

        let selector = Arc::new(
            AllocationSelector::new(Self::build_directory(config)?)
                .with_metrics(metrics.clone())
                .with_span(info_span!("allocator", mode = %config.director.mode)),
        );
        let reporter = Arc::new(AssignmentReporter::new(backend.clone()).with_metrics(metrics.clone()));

        let director = Director::new(
            config.director_config(),
            &WorldRegionProfiles::new(),
            backend,
            selector,
            reporter,
        )
        .map_err(|e| ServiceError::Configuration {
            message: format!("Failed to create director: {}", e),
        })?
        .with_metrics(metrics);

        info!(
            "Director ready with {} profiles against {}",
            director.profiles().len(),
            config.openmatch.backend_addr
        );
        Ok(Arc::new(director))
    }

    fn initialize_match_function(
        config: &AppConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Arc<MatchFunctionServer>, ServiceError> {
        info!(
            "Initializing match function with player capacity {}",
            config.function.player_capacity
        );

        let query = Arc::new(HttpQueryClient::new(config.query_endpoint()).map_err(|e| {
            ServiceError::Initialization {
                message: format!("Failed to create Open Match query client: {}", e),
            }
        })?);
        let maker = Arc::new(PlayerCapacityMatchMaker::new(config.function.player_capacity));
        let service = Arc::new(MatchFunctionService::new(query, maker).with_metrics(metrics));

        Ok(Arc::new(MatchFunctionServer::new(
            config.match_function_server_config(),
            service,
        )))
    }

    /// Initialize metrics service
    fn initialize_metrics(
        config: &AppConfig,
        metrics_collector: Arc<MetricsCollector>,
        monitor: ServiceMonitor,
    ) -> Arc<MetricsService> {
        info!(
            "Initializing metrics service on port {}",
            config.service.health_port
        );

        let health_config = HealthServerConfig {
            port: config.service.health_port,
            host: "0.0.0.0".to_string(),
        };

        let health_server =
            Arc::new(HealthServer::new(health_config, metrics_collector.clone()).with_monitor(monitor));
        Arc::new(MetricsService::new(metrics_collector, health_server))
    }

    /// Start metrics service
    async fn start_metrics_service(&self) {
        info!("Starting metrics and health endpoints");

        let metrics_service = self.metrics_service.clone();
        let port = self.config.service.health_port;

        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            } else {
                info!("Metrics service task completed");
            }
        });

        self.background_tasks.lock().await.push(metrics_handle);

        // Give the server a moment to start up
        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("✅ Metrics service started on port {}", port);
    }

    async fn start_component(&self) {
        let exited_tx = self.exited_tx.clone();

        let handle = match &self.component {
            Component::Director(director) => {
                let director = director.clone();
                let shutdown = self.shutdown_tx.subscribe();
                tokio::spawn(async move {
                    if let Err(e) = director.run(shutdown).await {
                        error!("Director stopped with error: {:#}", e);
                    }
                    exited_tx.send_replace(true);
                })
            }
            Component::MatchFunction(server) => {
                let server = server.clone();
                tokio::spawn(async move {
                    if let Err(e) = server.start().await {
                        error!("Match function server failed: {:#}", e);
                    }
                    exited_tx.send_replace(true);
                })
            }
        };

        *self.main_task.lock().await = Some(handle);
    }

    /// Start background maintenance tasks
    async fn start_background_tasks(&self) {
        info!("Starting health metrics task (15s interval)...");

        let health_metrics_task = {
            let metrics_collector = self.metrics_service.collector();
            let monitor = self.monitor.clone();
            let mut shutdown = self.shutdown_tx.subscribe();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(15));
                info!("Health metrics task started");

                loop {
                    tokio::select! {
                        biased;
                        _ = crate::director::cancelled(&mut shutdown) => break,
                        _ = interval.tick() => {}
                    }

                    metrics_collector
                        .service()
                        .uptime_seconds
                        .set(monitor.uptime().as_secs() as i64);

                    match HealthCheck::check(&monitor).await {
                        Ok(health) => {
                            metrics_collector.update_health_status(health.status.as_gauge());
                            for check in &health.checks {
                                metrics_collector.update_component_health(
                                    &check.name,
                                    check.status != crate::service::HealthStatus::Unhealthy,
                                );
                            }
                            debug!("Health: {}", health.status);
                        }
                        Err(e) => warn!("Health check failed: {}", e),
                    }

                    if let Some(probe) = monitor.director() {
                        metrics_collector.update_from_director_stats(&monitor.director_stats(), probe.profiles);
                    }
                }

                info!("Health metrics task stopped");
            })
        };

        self.background_tasks.lock().await.push(health_metrics_task);
        info!("Background maintenance tasks started");
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&self) {
        let mut tasks = self.background_tasks.lock().await;
        let task_count = tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);

        for (i, task) in tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_directory_from_default_config() {
        let config = AppConfig::default();
        let directory = AppState::build_directory(&config).unwrap();
        assert_eq!(directory.name(), "discover");
    }

    #[test]
    fn test_agones_mode_without_credentials_is_a_configuration_error() {
        let mut config = AppConfig::default();
        config.director.mode = AllocatorMode::Agones;

        let err = AppState::build_directory(&config).err().expect("must fail");
        assert!(matches!(err, ServiceError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_director_state_exposes_monitor() {
        let mut config = AppConfig::default();
        config.openmatch.backend_addr = "127.0.0.1:1".to_string();

        let state = AppState::new(config, ServiceRole::Director).await.unwrap();
        assert!(!state.is_running().await);
        assert_eq!(state.monitor().role, ServiceRole::Director);
        assert_eq!(state.monitor().director().map(|p| p.profiles), Some(16));
        assert!(state.director().is_some());
    }

    #[tokio::test]
    async fn test_match_function_state_has_no_director() {
        let state = AppState::new(AppConfig::default(), ServiceRole::MatchFunction)
            .await
            .unwrap();
        assert!(state.director().is_none());
        assert!(state.monitor().director().is_none());
    }
}
