//! Metrics collection using Prometheus
//!
//! Metric groups for the director loop, game server allocation, ticket
//! assignment and the match function, all prefixed `match_director_`.

use crate::allocator::AllocationOutcome;
use crate::director::DirectorStats;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Director loop metrics
    director_metrics: DirectorMetrics,

    /// Game server allocation metrics
    allocation_metrics: AllocationMetrics,

    /// Ticket assignment metrics
    assignment_metrics: AssignmentMetrics,

    /// Match function metrics
    match_function_metrics: MatchFunctionMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Director loop metrics
#[derive(Clone)]
pub struct DirectorMetrics {
    /// Completed ticks
    pub ticks_total: IntCounter,

    /// Wall time of one tick across all profiles
    pub tick_duration_seconds: Histogram,

    /// Profiles that failed within a tick
    pub profiles_failed_last_tick: IntGauge,

    /// Profile pipeline results by status
    pub profile_runs_total: IntCounterVec,

    /// Fetch calls by status
    pub fetches_total: IntCounterVec,

    /// Proposals received from the backend
    pub matches_fetched_total: IntCounter,

    /// Fetch duration
    pub fetch_duration_seconds: HistogramVec,

    /// Profiles the director runs each tick
    pub profiles_configured: IntGauge,

    /// Unix time the last tick completed
    pub last_tick_timestamp_seconds: IntGauge,
}

/// Game server allocation metrics
#[derive(Clone)]
pub struct AllocationMetrics {
    /// Group resolutions by directory and outcome
    pub allocations_total: IntCounterVec,

    /// Directory errors that aborted a batch
    pub allocation_errors_total: IntCounterVec,
}

/// Ticket assignment metrics
#[derive(Clone)]
pub struct AssignmentMetrics {
    /// Tickets accepted by the backend
    pub tickets_assigned_total: IntCounter,

    /// Tickets the backend rejected
    pub assignment_failures_total: IntCounter,
}

/// Match function metrics
#[derive(Clone)]
pub struct MatchFunctionMetrics {
    /// Runs by status
    pub runs_total: IntCounterVec,

    /// Proposals produced
    pub proposals_total: IntCounter,

    /// Run duration
    pub run_duration_seconds: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let director_metrics = DirectorMetrics::new(&registry)?;
        let allocation_metrics = AllocationMetrics::new(&registry)?;
        let assignment_metrics = AssignmentMetrics::new(&registry)?;
        let match_function_metrics = MatchFunctionMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            director_metrics,
            allocation_metrics,
            assignment_metrics,
            match_function_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn director(&self) -> &DirectorMetrics {
        &self.director_metrics
    }

    pub fn allocation(&self) -> &AllocationMetrics {
        &self.allocation_metrics
    }

    pub fn assignment(&self) -> &AssignmentMetrics {
        &self.assignment_metrics
    }

    pub fn match_function(&self) -> &MatchFunctionMetrics {
        &self.match_function_metrics
    }

    /// Refresh gauges from the director's running totals
    pub fn update_from_director_stats(&self, stats: &DirectorStats, profiles: usize) {
        self.director_metrics.profiles_configured.set(profiles as i64);
        if let Some(at) = stats.last_tick_at {
            self.director_metrics.last_tick_timestamp_seconds.set(at.timestamp());
        }
    }

    /// Record one completed tick
    pub fn record_tick(&self, duration: Duration, failed_profiles: usize) {
        self.director_metrics.ticks_total.inc();
        self.director_metrics
            .tick_duration_seconds
            .observe(duration.as_secs_f64());
        self.director_metrics
            .profiles_failed_last_tick
            .set(failed_profiles as i64);
    }

    /// Record one profile pipeline result (`success`, `error`, `timeout`, `cancelled`)
    pub fn record_profile_result(&self, status: &str) {
        self.director_metrics
            .profile_runs_total
            .with_label_values(&[status])
            .inc();
    }

    /// Record one fetch call
    pub fn record_fetch(&self, status: &str, matches: usize, duration: Duration) {
        self.director_metrics
            .fetches_total
            .with_label_values(&[status])
            .inc();
        self.director_metrics
            .matches_fetched_total
            .inc_by(matches as u64);
        self.director_metrics
            .fetch_duration_seconds
            .with_label_values(&[status])
            .observe(duration.as_secs_f64());
    }

    /// Record how one assignment group was resolved
    pub fn record_allocation(&self, directory: &str, outcome: AllocationOutcome) {
        self.allocation_metrics
            .allocations_total
            .with_label_values(&[directory, outcome.as_str()])
            .inc();
    }

    pub fn record_allocation_error(&self, directory: &str) {
        self.allocation_metrics
            .allocation_errors_total
            .with_label_values(&[directory])
            .inc();
    }

    /// Record one reported batch
    pub fn record_assignments(&self, assigned: usize, failed: usize) {
        self.assignment_metrics
            .tickets_assigned_total
            .inc_by(assigned as u64);
        self.assignment_metrics
            .assignment_failures_total
            .inc_by(failed as u64);
    }

    /// Record a successful match function run
    pub fn record_match_function_run(&self, proposals: usize, duration: Duration) {
        self.match_function_metrics
            .runs_total
            .with_label_values(&["success"])
            .inc();
        self.match_function_metrics
            .proposals_total
            .inc_by(proposals as u64);
        self.match_function_metrics
            .run_duration_seconds
            .observe(duration.as_secs_f64());
    }

    pub fn record_match_function_error(&self) {
        self.match_function_metrics
            .runs_total
            .with_label_values(&["error"])
            .inc();
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("match_director_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "match_director_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("match_director_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            component_health,
        })
    }
}

impl DirectorMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let ticks_total = IntCounter::new("match_director_ticks_total", "Completed director ticks")?;
        registry.register(Box::new(ticks_total.clone()))?;

        let tick_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "match_director_tick_duration_seconds",
                "Director tick duration",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;
        registry.register(Box::new(tick_duration_seconds.clone()))?;

        let profiles_failed_last_tick = IntGauge::new(
            "match_director_profiles_failed_last_tick",
            "Profiles that failed in the most recent tick",
        )?;
        registry.register(Box::new(profiles_failed_last_tick.clone()))?;

        let profile_runs_total = IntCounterVec::new(
            Opts::new(
                "match_director_profile_runs_total",
                "Profile pipeline runs by status",
            ),
            &["status"],
        )?;
        registry.register(Box::new(profile_runs_total.clone()))?;

        let fetches_total = IntCounterVec::new(
            Opts::new("match_director_fetches_total", "Match fetches by status"),
            &["status"],
        )?;
        registry.register(Box::new(fetches_total.clone()))?;

        let matches_fetched_total = IntCounter::new(
            "match_director_matches_fetched_total",
            "Match proposals fetched",
        )?;
        registry.register(Box::new(matches_fetched_total.clone()))?;

        let fetch_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "match_director_fetch_duration_seconds",
                "Match fetch duration",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["status"],
        )?;
        registry.register(Box::new(fetch_duration_seconds.clone()))?;

        let profiles_configured = IntGauge::new(
            "match_director_profiles_configured",
            "Profiles run on every tick",
        )?;
        registry.register(Box::new(profiles_configured.clone()))?;

        let last_tick_timestamp_seconds = IntGauge::new(
            "match_director_last_tick_timestamp_seconds",
            "Unix time of the last completed tick",
        )?;
        registry.register(Box::new(last_tick_timestamp_seconds.clone()))?;

        Ok(Self {
            ticks_total,
            tick_duration_seconds,
            profiles_failed_last_tick,
            profile_runs_total,
            fetches_total,
            matches_fetched_total,
            fetch_duration_seconds,
            profiles_configured,
            last_tick_timestamp_seconds,
        })
    }
}

impl AllocationMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let allocations_total = IntCounterVec::new(
            Opts::new(
                "match_director_allocations_total",
                "Assignment group resolutions by directory and outcome",
            ),
            &["directory", "outcome"],
        )?;
        registry.register(Box::new(allocations_total.clone()))?;

        let allocation_errors_total = IntCounterVec::new(
            Opts::new(
                "match_director_allocation_errors_total",
                "Directory errors that aborted allocation",
            ),
            &["directory"],
        )?;
        registry.register(Box::new(allocation_errors_total.clone()))?;

        Ok(Self {
            allocations_total,
            allocation_errors_total,
        })
    }
}

impl AssignmentMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let tickets_assigned_total = IntCounter::new(
            "match_director_tickets_assigned_total",
            "Tickets assigned to game servers",
        )?;
        registry.register(Box::new(tickets_assigned_total.clone()))?;

        let assignment_failures_total = IntCounter::new(
            "match_director_assignment_failures_total",
            "Tickets the backend failed to assign",
        )?;
        registry.register(Box::new(assignment_failures_total.clone()))?;

        Ok(Self {
            tickets_assigned_total,
            assignment_failures_total,
        })
    }
}

impl MatchFunctionMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let runs_total = IntCounterVec::new(
            Opts::new("match_director_match_function_runs_total", "Match function runs"),
            &["status"],
        )?;
        registry.register(Box::new(runs_total.clone()))?;

        let proposals_total = IntCounter::new(
            "match_director_match_function_proposals_total",
            "Proposals produced by the match function",
        )?;
        registry.register(Box::new(proposals_total.clone()))?;

        let run_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "match_director_match_function_duration_seconds",
                "Match function run duration",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;
        registry.register(Box::new(run_duration_seconds.clone()))?;

        Ok(Self {
            runs_total,
            proposals_total,
            run_duration_seconds,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}
