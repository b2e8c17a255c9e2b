//! The director loop: fetch, allocate and assign for every profile on a fixed interval
//!
//! Each tick spawns one pipeline task per profile and joins them all before
//! the timer is re-armed, so ticks never overlap. Pipeline failures are
//! logged and counted; only cancellation ends the loop.

use super::profiles::ProfileGenerator;
use super::reporter::{AssignmentReporter, ReportOutcome};
use crate::allocator::AllocationSelector;
use crate::error::{MatchmakingError, Result};
use crate::extensions::SelectionFilter;
use crate::metrics::MetricsCollector;
use crate::openmatch::MatchmakingBackend;
use crate::types::{AssignmentGroup, Match, Profile};
use crate::utils::{format_duration, parse_duration};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

/// Timing settings for the director
#[derive(Debug, Clone)]
pub struct DirectorConfig {
    /// Tick interval as written in configuration, e.g. `5s`
    pub interval: String,
    /// Upper bound for one profile's fetch
    pub fetch_timeout: Duration,
    /// Wait after cancellation before returning
    pub grace_period: Duration,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            interval: "5s".to_string(),
            fetch_timeout: Duration::from_secs(1),
            grace_period: Duration::from_secs(1),
        }
    }
}

/// Running totals since the director started
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectorStats {
    pub ticks_started: u64,
    pub ticks_completed: u64,
    pub profile_runs: u64,
    pub profile_failures: u64,
    pub fetch_timeouts: u64,
    pub matches_fetched: u64,
    pub groups_resolved: u64,
    pub tickets_assigned: u64,
    pub assignment_failures: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_tick_duration_ms: u64,
}

pub type SharedDirectorStats = Arc<RwLock<DirectorStats>>;

/// Result of one profile's pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub matches: usize,
    pub groups_resolved: usize,
    pub report: Option<ReportOutcome>,
}

/// Result of one tick across all profiles
#[derive(Debug, Clone, Default)]
pub struct TickSummary {
    pub profiles: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub matches: usize,
    pub tickets_assigned: usize,
    pub duration: Duration,
}

/// Aborts the wrapped task when dropped
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Resolves once cancellation is requested. A dropped sender counts as cancellation.
pub async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Everything one profile's fetch-allocate-assign run needs; cheap to clone
#[derive(Clone)]
struct ProfilePipeline {
    backend: Arc<dyn MatchmakingBackend>,
    selector: Arc<AllocationSelector>,
    reporter: Arc<AssignmentReporter>,
    fetch_timeout: Duration,
    metrics: Option<Arc<MetricsCollector>>,
    stats: SharedDirectorStats,
}

impl ProfilePipeline {
    async fn run(&self, profile: &Profile, mut shutdown: watch::Receiver<bool>) -> Result<PipelineOutcome> {
        tokio::select! {
            biased;
            _ = cancelled(&mut shutdown) => Err(MatchmakingError::Cancelled {
                operation: format!("pipeline for profile '{}'", profile.name),
            }
            .into()),
            result = self.execute(profile) => result,
        }
    }

    async fn execute(&self, profile: &Profile) -> Result<PipelineOutcome> {
        let matches = self.fetch(profile).await?;
        self.update_stats(|s| s.matches_fetched += matches.len() as u64);

        if matches.is_empty() {
            debug!("No matches fetched for profile '{}'", profile.name);
            return Ok(PipelineOutcome::default());
        }

        let mut groups = matches
            .iter()
            .map(|m| group_for_match(m, profile))
            .collect::<Result<Vec<_>>>()?;

        self.selector.allocate(&mut groups).await?;
        let groups_resolved = groups.iter().filter(|g| g.is_resolved()).count();
        self.update_stats(|s| s.groups_resolved += groups_resolved as u64);

        let report = match self.reporter.report(groups).await {
            Ok(outcome) => {
                self.update_stats(|s| {
                    s.tickets_assigned += outcome.tickets_assigned as u64;
                    s.assignment_failures += outcome.failures.len() as u64;
                });
                Some(outcome)
            }
            Err(e) if matches!(
                MatchmakingError::find(&e),
                Some(MatchmakingError::NoResolvedAssignments)
            ) =>
            {
                debug!(
                    "Profile '{}': {} matches, no game server could take them",
                    profile.name,
                    matches.len()
                );
                None
            }
            Err(e) => return Err(e),
        };

        Ok(PipelineOutcome {
            matches: matches.len(),
            groups_resolved,
            report,
        })
    }

    /// Drain the profile's proposal stream in a background task bounded by the fetch timeout
    async fn fetch(&self, profile: &Profile) -> Result<Vec<Match>> {
        let started = Instant::now();
        let backend = self.backend.clone();
        let request = profile.clone();

        let handle = tokio::spawn(async move {
            let mut stream = backend.fetch_matches(&request).await?;
            let mut matches = Vec::new();
            while let Some(next) = stream.next().await {
                matches.push(next?);
            }
            Ok::<_, anyhow::Error>(matches)
        });
        let _guard = AbortOnDrop(handle.abort_handle());

        let result = match tokio::time::timeout(self.fetch_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(MatchmakingError::InternalError {
                message: format!("fetch task failed: {}", join_error),
            }
            .into()),
            Err(_) => {
                self.update_stats(|s| s.fetch_timeouts += 1);
                Err(MatchmakingError::FetchTimeout {
                    profile: profile.name.clone(),
                    timeout_ms: self.fetch_timeout.as_millis() as u64,
                }
                .into())
            }
        };

        if let Some(metrics) = &self.metrics {
            let status = match &result {
                Ok(_) => "success",
                Err(e) => match MatchmakingError::find(e) {
                    Some(MatchmakingError::FetchTimeout { .. }) => "timeout",
                    _ => "error",
                },
            };
            let count = result.as_ref().map(Vec::len).unwrap_or(0);
            metrics.record_fetch(status, count, started.elapsed());
        }

        result
    }

    fn update_stats(&self, update: impl FnOnce(&mut DirectorStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }
}

/// Unresolved group for a match. The match's own filter wins; proposals without
/// one fall back to the profile's filter.
fn group_for_match(m: &Match, profile: &Profile) -> Result<AssignmentGroup> {
    let extensions = if SelectionFilter::from_extensions(&m.extensions)?.is_some() {
        m.extensions.clone()
    } else {
        profile.extensions.clone()
    };
    Ok(AssignmentGroup::for_match(m, extensions))
}

pub struct Director {
    interval: Duration,
    grace_period: Duration,
    profiles: Vec<Profile>,
    pipeline: ProfilePipeline,
    span: Span,
}

impl Director {
    /// Parse the interval and generate the profile set. Both failures are fatal.
    pub fn new(
        config: DirectorConfig,
        generator: &dyn ProfileGenerator,
        backend: Arc<dyn MatchmakingBackend>,
        selector: Arc<AllocationSelector>,
        reporter: Arc<AssignmentReporter>,
    ) -> Result<Self> {
        let interval = parse_duration(&config.interval)?;
        if interval.is_zero() {
            return Err(MatchmakingError::InvalidInterval {
                value: config.interval.clone(),
                reason: "interval must be greater than zero".to_string(),
            }
            .into());
        }

        let profiles = generator.generate().map_err(|e| MatchmakingError::InternalError {
            message: format!("failed to generate profiles: {:#}", e),
        })?;

        Ok(Self {
            interval,
            grace_period: config.grace_period,
            profiles,
            pipeline: ProfilePipeline {
                backend,
                selector,
                reporter,
                fetch_timeout: config.fetch_timeout,
                metrics: None,
                stats: Arc::new(RwLock::new(DirectorStats::default())),
            },
            span: info_span!("director"),
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.pipeline.metrics = Some(metrics);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// Shared handle to the running totals
    pub fn stats(&self) -> SharedDirectorStats {
        self.pipeline.stats.clone()
    }

    /// Tick until cancelled, then wait out the grace period and return `Ok(())`.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        self.run_inner(shutdown).instrument(self.span.clone()).await
    }

    async fn run_inner(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            "Director started: {} profiles every {}, fetch timeout {}",
            self.profiles.len(),
            format_duration(self.interval),
            format_duration(self.pipeline.fetch_timeout)
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }

            if *shutdown.borrow() {
                break;
            }

            let summary = self.tick(&shutdown).await;
            debug!(
                "Tick finished in {:?}: {}/{} profiles ok, {} matches, {} tickets assigned",
                summary.duration, summary.succeeded, summary.profiles, summary.matches, summary.tickets_assigned
            );
        }

        info!(
            "Director stopping, waiting {} for in-flight work",
            format_duration(self.grace_period)
        );
        tokio::time::sleep(self.grace_period).await;
        info!("Director stopped");
        Ok(())
    }

    /// Run every profile's pipeline concurrently and wait for all of them
    pub async fn tick(&self, shutdown: &watch::Receiver<bool>) -> TickSummary {
        let started = Instant::now();
        self.pipeline.update_stats(|s| s.ticks_started += 1);

        let handles: Vec<_> = self
            .profiles
            .iter()
            .cloned()
            .map(|profile| {
                let pipeline = self.pipeline.clone();
                let shutdown = shutdown.clone();
                let span = info_span!("profile", name = %profile.name);
                tokio::spawn(
                    async move {
                        let result = pipeline.run(&profile, shutdown).await;
                        (profile.name, result)
                    }
                    .instrument(span),
                )
            })
            .collect();

        let mut summary = TickSummary {
            profiles: handles.len(),
            ..Default::default()
        };

        for joined in join_all(handles).await {
            match joined {
                Ok((_, Ok(outcome))) => {
                    summary.succeeded += 1;
                    summary.matches += outcome.matches;
                    if let Some(report) = &outcome.report {
                        summary.tickets_assigned += report.tickets_assigned;
                    }
                    self.record_profile("success");
                }
                Ok((name, Err(e))) => {
                    summary.failed += 1;
                    log_pipeline_error(&name, &e);
                    self.record_profile(status_for(&e));
                }
                Err(join_error) => {
                    summary.failed += 1;
                    error!("Profile pipeline task failed: {}", join_error);
                    self.record_profile("error");
                }
            }
        }

        summary.duration = started.elapsed();
        self.pipeline.update_stats(|s| {
            s.ticks_completed += 1;
            s.profile_runs += summary.profiles as u64;
            s.profile_failures += summary.failed as u64;
            s.last_tick_at = Some(Utc::now());
            s.last_tick_duration_ms = summary.duration.as_millis() as u64;
        });
        if let Some(metrics) = &self.pipeline.metrics {
            metrics.record_tick(summary.duration, summary.failed);
        }

        summary
    }

    fn record_profile(&self, status: &str) {
        if let Some(metrics) = &self.pipeline.metrics {
            metrics.record_profile_result(status);
        }
    }
}

fn status_for(e: &anyhow::Error) -> &'static str {
    match MatchmakingError::find(e) {
        Some(MatchmakingError::Cancelled { .. }) => "cancelled",
        Some(MatchmakingError::FetchTimeout { .. }) => "timeout",
        _ => "error",
    }
}

fn log_pipeline_error(profile: &str, e: &anyhow::Error) {
    match MatchmakingError::find(e) {
        Some(domain) if domain.is_soft() => debug!("Profile '{}': {}", profile, e),
        Some(MatchmakingError::FetchTimeout { .. }) => warn!("Profile '{}': {}", profile, e),
        _ => error!("Profile '{}' failed: {:#}", profile, e),
    }
}
