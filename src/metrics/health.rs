//! HTTP server for health probes, Prometheus scraping and director statistics

use crate::metrics::collector::MetricsCollector;
use crate::service::health::{HealthCheck, HealthStatus, ServiceMonitor};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

const SERVICE: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");
const NOT_INITIALIZED: &str = "Service not initialized";

/// Address the health server binds to
#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

#[derive(Clone)]
struct ServerState {
    metrics: Arc<MetricsCollector>,
    monitor: Option<ServiceMonitor>,
}

/// Serves `/`, `/health`, `/ready`, `/alive`, `/metrics` and `/stats`
pub struct HealthServer {
    config: HealthServerConfig,
    state: ServerState,
    shutdown_tx: watch::Sender<bool>,
}

impl HealthServer {
    pub fn new(config: HealthServerConfig, metrics_collector: Arc<MetricsCollector>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            state: ServerState {
                metrics: metrics_collector,
                monitor: None,
            },
            shutdown_tx,
        }
    }

    /// Service view behind the probe endpoints; without one every probe reports 503
    pub fn with_monitor(mut self, monitor: ServiceMonitor) -> Self {
        self.state.monitor = Some(monitor);
        self
    }

    /// Bind and serve until `stop` is called
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid health server address")?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind health server to {}", addr))?;

        info!("Health server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, self.create_router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
            })
            .await?;

        info!("Health server stopped");
        Ok(())
    }

    pub fn create_router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler))
            .route("/alive", get(alive_handler))
            .route("/metrics", get(metrics_handler))
            .route("/stats", get(stats_handler))
            .with_state(self.state.clone())
    }

    pub async fn stop(&self) -> Result<()> {
        self.shutdown_tx.send_replace(true);
        Ok(())
    }
}

fn label(status: &HealthStatus) -> &'static str {
    match status {
        HealthStatus::Healthy => "healthy",
        HealthStatus::Degraded => "degraded",
        HealthStatus::Unhealthy => "unhealthy",
    }
}

fn probe_code(status: &HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    }
}

/// Failed checks count as unhealthy
fn settle(result: Result<HealthStatus>, probe: &str) -> HealthStatus {
    result.unwrap_or_else(|e| {
        error!("{} check failed: {:#}", probe, e);
        HealthStatus::Unhealthy
    })
}

async fn root_handler() -> Json<Value> {
    Json(json!({
        "service": SERVICE,
        "version": VERSION,
        "endpoints": ["/health", "/ready", "/alive", "/metrics", "/stats"]
    }))
}

async fn health_handler(State(state): State<ServerState>) -> (StatusCode, Json<Value>) {
    let Some(monitor) = &state.monitor else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "service": SERVICE,
                "version": VERSION,
                "error": NOT_INITIALIZED
            })),
        );
    };

    let status = settle(HealthCheck::liveness_check(monitor).await, "Health");
    (
        probe_code(&status),
        Json(json!({ "status": label(&status), "service": SERVICE, "version": VERSION })),
    )
}

async fn ready_handler(State(state): State<ServerState>) -> (StatusCode, &'static str) {
    let Some(monitor) = &state.monitor else {
        return (StatusCode::SERVICE_UNAVAILABLE, NOT_INITIALIZED);
    };

    match settle(HealthCheck::readiness_check(monitor).await, "Readiness") {
        HealthStatus::Healthy => (StatusCode::OK, "Ready"),
        HealthStatus::Degraded => (StatusCode::OK, "Degraded but ready"),
        HealthStatus::Unhealthy => (StatusCode::SERVICE_UNAVAILABLE, "Not ready"),
    }
}

async fn alive_handler(State(state): State<ServerState>) -> (StatusCode, &'static str) {
    let Some(monitor) = &state.monitor else {
        return (StatusCode::SERVICE_UNAVAILABLE, NOT_INITIALIZED);
    };

    match settle(HealthCheck::liveness_check(monitor).await, "Liveness") {
        HealthStatus::Healthy => (StatusCode::OK, "Alive"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "Not alive"),
    }
}

/// Prometheus text exposition of every registered metric
pub fn encode_metrics(collector: &MetricsCollector) -> Result<String> {
    TextEncoder::new()
        .encode_to_string(&collector.registry().gather())
        .context("Failed to encode metrics")
}

async fn metrics_handler(State(state): State<ServerState>) -> Response {
    match encode_metrics(&state.metrics) {
        Ok(body) => (
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("{:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

async fn stats_handler(State(state): State<ServerState>) -> (StatusCode, Json<Value>) {
    debug!("Stats requested");

    let report = match &state.monitor {
        Some(monitor) => HealthCheck::check(monitor).await,
        None => Err(anyhow::anyhow!(NOT_INITIALIZED)),
    };

    match report {
        Ok(health) => (
            StatusCode::OK,
            Json(json!({
                "service": {
                    "name": health.service,
                    "role": health.role,
                    "version": VERSION,
                    "status": health.status,
                    "uptime": health.stats.uptime_info
                },
                "director": {
                    "profiles": health.stats.profiles,
                    "ticks_completed": health.stats.ticks_completed,
                    "profile_failures": health.stats.profile_failures,
                    "fetch_timeouts": health.stats.fetch_timeouts,
                    "last_tick_at": health.stats.last_tick_at
                },
                "matches": {
                    "fetched": health.stats.matches_fetched,
                    "groups_resolved": health.stats.groups_resolved,
                    "tickets_assigned": health.stats.tickets_assigned
                },
                "components": health.checks,
                "timestamp": chrono::Utc::now()
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "service": { "name": SERVICE, "version": VERSION, "status": "error" },
                "error": e.to_string(),
                "timestamp": chrono::Utc::now()
            })),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::director::DirectorStats;
    use crate::service::health::{DirectorProbe, ServiceRole};
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tokio::sync::RwLock;
    use tower::ServiceExt;

    fn server(monitor: Option<ServiceMonitor>) -> Router {
        let collector = Arc::new(MetricsCollector::new().expect("Failed to create collector"));
        let server = HealthServer::new(HealthServerConfig::default(), collector);
        match monitor {
            Some(monitor) => server.with_monitor(monitor).create_router(),
            None => server.create_router(),
        }
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    fn director_monitor(running: bool, stats: DirectorStats) -> ServiceMonitor {
        ServiceMonitor::new("match-director", ServiceRole::Director, Arc::new(RwLock::new(running)))
            .with_director(DirectorProbe {
                stats: Arc::new(std::sync::RwLock::new(stats)),
                interval: Duration::from_secs(5),
                profiles: 16,
            })
    }

    #[tokio::test]
    async fn test_root_lists_endpoints() {
        let (status, body) = get(server(None), "/").await;
        assert_eq!(status, StatusCode::OK);

        let info: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(info["service"], SERVICE);
        assert_eq!(info["endpoints"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let collector = Arc::new(MetricsCollector::new().expect("Failed to create collector"));
        collector.record_tick(Duration::from_millis(12), 0);
        collector.update_health_status(2);
        assert!(encode_metrics(&collector).unwrap().contains("match_director_"));

        let app = HealthServer::new(HealthServerConfig::default(), collector).create_router();
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("text/plain"));
    }

    #[tokio::test]
    async fn test_probes_without_monitor_are_unavailable() {
        for uri in ["/health", "/ready", "/alive", "/stats"] {
            let (status, _) = get(server(None), uri).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{}", uri);
        }

        let (status, _) = get(server(None), "/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stopped_service_is_not_alive() {
        let monitor = director_monitor(false, DirectorStats::default());

        let (status, body) = get(server(Some(monitor.clone())), "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let health: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["status"], "unhealthy");

        let (status, _) = get(server(Some(monitor)), "/alive").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_stats_endpoint_reports_director_totals() {
        let stats = DirectorStats {
            ticks_completed: 7,
            tickets_assigned: 42,
            last_tick_at: Some(chrono::Utc::now()),
            ..Default::default()
        };
        let monitor = director_monitor(true, stats);

        let (status, _) = get(server(Some(monitor.clone())), "/ready").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = get(server(Some(monitor)), "/stats").await;
        assert_eq!(status, StatusCode::OK);

        let stats: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(stats["director"]["ticks_completed"], 7);
        assert_eq!(stats["matches"]["tickets_assigned"], 42);
        assert_eq!(stats["service"]["role"], "director");
    }
}
