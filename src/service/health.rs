//! Health check endpoints and monitoring
//!
//! Health checks for the director and match function processes, including
//! readiness and liveness probes.

use crate::director::{DirectorStats, SharedDirectorStats};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value exported as `match_director_health_status`
    pub fn as_gauge(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Which process this is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRole {
    Director,
    MatchFunction,
}

impl std::fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceRole::Director => write!(f, "director"),
            ServiceRole::MatchFunction => write!(f, "match_function"),
        }
    }
}

/// What the health checks need to see of a running director
#[derive(Clone)]
pub struct DirectorProbe {
    pub stats: SharedDirectorStats,
    pub interval: Duration,
    pub profiles: usize,
}

/// Shared view of the process used by health checks and the `/stats` endpoint
#[derive(Clone)]
pub struct ServiceMonitor {
    pub service_name: String,
    pub role: ServiceRole,
    pub started_at: DateTime<Utc>,
    is_running: Arc<RwLock<bool>>,
    director: Option<DirectorProbe>,
}

impl ServiceMonitor {
    pub fn new(service_name: impl Into<String>, role: ServiceRole, is_running: Arc<RwLock<bool>>) -> Self {
        Self {
            service_name: service_name.into(),
            role,
            started_at: Utc::now(),
            is_running,
            director: None,
        }
    }

    pub fn with_director(mut self, probe: DirectorProbe) -> Self {
        self.director = Some(probe);
        self
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn director(&self) -> Option<&DirectorProbe> {
        self.director.as_ref()
    }

    /// Copy of the director totals, or defaults for other roles
    pub fn director_stats(&self) -> DirectorStats {
        self.director
            .as_ref()
            .and_then(|probe| probe.stats.read().ok().map(|s| s.clone()))
            .unwrap_or_default()
    }

    pub fn uptime(&self) -> Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or_default()
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    pub role: ServiceRole,
    /// Service version (could be from environment)
    pub version: String,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional error message if unhealthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    pub profiles: usize,
    pub ticks_completed: u64,
    pub matches_fetched: u64,
    pub groups_resolved: u64,
    pub tickets_assigned: u64,
    pub profile_failures: u64,
    pub fetch_timeouts: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    /// Service uptime information
    pub uptime_info: String,
}

/// Slack added to three intervals before a quiet director counts as stalled
const STALL_SLACK: Duration = Duration::from_secs(5);

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(monitor: &ServiceMonitor) -> Result<Self> {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        // Check if service is running
        let service_check = Self::check_service_running(monitor).await;
        if service_check.status != HealthStatus::Healthy {
            overall_status = HealthStatus::Unhealthy;
        }
        checks.push(service_check);

        if monitor.role == ServiceRole::Director {
            let director_check = Self::check_director_progress(monitor);
            if director_check.status == HealthStatus::Unhealthy {
                overall_status = HealthStatus::Unhealthy;
            } else if director_check.status == HealthStatus::Degraded
                && overall_status == HealthStatus::Healthy
            {
                overall_status = HealthStatus::Degraded;
            }
            checks.push(director_check);
        }

        let stats = Self::gather_service_stats(monitor);

        Ok(HealthCheck {
            status: overall_status,
            service: monitor.service_name.clone(),
            role: monitor.role,
            version: std::env::var("SERVICE_VERSION").unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            timestamp: Utc::now(),
            checks,
            stats,
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(monitor: &ServiceMonitor) -> Result<HealthStatus> {
        if monitor.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - running, and for a director, still ticking
    pub async fn readiness_check(monitor: &ServiceMonitor) -> Result<HealthStatus> {
        if !monitor.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        match monitor.role {
            ServiceRole::Director => Ok(Self::check_director_progress(monitor).status),
            ServiceRole::MatchFunction => Ok(HealthStatus::Healthy),
        }
    }

    async fn check_service_running(monitor: &ServiceMonitor) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = if monitor.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// A director that has not completed a tick for three intervals is degraded
    fn check_director_progress(monitor: &ServiceMonitor) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = match monitor.director() {
            None => (
                HealthStatus::Unhealthy,
                Some("Director not initialized".to_string()),
            ),
            Some(probe) => {
                let stats = monitor.director_stats();
                let allowed = probe.interval * 3 + STALL_SLACK;
                let quiet_for = match stats.last_tick_at {
                    Some(at) => (Utc::now() - at).to_std().unwrap_or_default(),
                    None => monitor.uptime(),
                };

                if quiet_for > allowed {
                    debug!("Director quiet for {:?}", quiet_for);
                    (
                        HealthStatus::Degraded,
                        Some(format!("No tick completed in {}s", quiet_for.as_secs())),
                    )
                } else {
                    (HealthStatus::Healthy, None)
                }
            }
        };

        ComponentCheck {
            name: "director".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn gather_service_stats(monitor: &ServiceMonitor) -> ServiceStats {
        let stats = monitor.director_stats();

        ServiceStats {
            profiles: monitor.director().map(|p| p.profiles).unwrap_or(0),
            ticks_completed: stats.ticks_completed,
            matches_fetched: stats.matches_fetched,
            groups_resolved: stats.groups_resolved,
            tickets_assigned: stats.tickets_assigned,
            profile_failures: stats.profile_failures,
            fetch_timeouts: stats.fetch_timeouts,
            last_tick_at: stats.last_tick_at,
            uptime_info: format!("Up {}s as {}", monitor.uptime().as_secs(), monitor.role),
        }
    }
}

/// Convert health check to JSON string
impl HealthCheck {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
