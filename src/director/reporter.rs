//! Reports resolved assignments back to the matchmaking backend

use crate::error::{MatchmakingError, Result};
use crate::metrics::MetricsCollector;
use crate::openmatch::MatchmakingBackend;
use crate::types::{AssignmentFailure, AssignmentGroup};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument, Span};

/// What happened to one reported batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportOutcome {
    /// Groups sent to the backend
    pub groups_reported: usize,
    /// Tickets the backend accepted
    pub tickets_assigned: usize,
    /// Tickets the backend rejected
    pub failures: Vec<AssignmentFailure>,
}

impl ReportOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Aggregate error describing every failed ticket, if any failed
    pub fn failure_error(&self) -> Option<MatchmakingError> {
        if self.failures.is_empty() {
            return None;
        }
        let summary = self
            .failures
            .iter()
            .map(|f| format!("ticketID {}: {}", f.ticket_id, f.cause))
            .collect::<Vec<_>>()
            .join(", ");
        Some(MatchmakingError::AssignmentFailures {
            count: self.failures.len(),
            summary,
        })
    }
}

pub struct AssignmentReporter {
    backend: Arc<dyn MatchmakingBackend>,
    metrics: Option<Arc<MetricsCollector>>,
    span: Span,
}

impl AssignmentReporter {
    pub fn new(backend: Arc<dyn MatchmakingBackend>) -> Self {
        Self {
            backend,
            metrics: None,
            span: info_span!("reporter"),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Report every group that has a connection.
    ///
    /// Takes the groups by value so a batch cannot be reported twice. Returns
    /// `NoResolvedAssignments` when nothing is left after dropping unresolved
    /// groups. Per-ticket failures do not fail the call; they are returned in
    /// the outcome for the caller to log.
    pub async fn report(&self, groups: Vec<AssignmentGroup>) -> Result<ReportOutcome> {
        self.report_inner(groups).instrument(self.span.clone()).await
    }

    async fn report_inner(&self, groups: Vec<AssignmentGroup>) -> Result<ReportOutcome> {
        let total = groups.len();
        let resolved = cleanup_unresolved(groups);

        if resolved.is_empty() {
            debug!("None of {} groups has a connection, nothing to report", total);
            return Err(MatchmakingError::NoResolvedAssignments.into());
        }

        let groups_reported = resolved.len();
        let tickets: usize = resolved.iter().map(|g| g.ticket_ids.len()).sum();

        let failures = self.backend.assign_tickets(resolved).await?;
        let outcome = ReportOutcome {
            groups_reported,
            tickets_assigned: tickets.saturating_sub(failures.len()),
            failures,
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_assignments(outcome.tickets_assigned, outcome.failures.len());
        }

        match outcome.failure_error() {
            Some(error) => warn!("{}", error),
            None => info!(
                "Reported {} assignments covering {} tickets ({} groups unresolved)",
                groups_reported,
                tickets,
                total - groups_reported
            ),
        }

        Ok(outcome)
    }
}

/// Drop groups whose connection was never set
pub fn cleanup_unresolved(groups: Vec<AssignmentGroup>) -> Vec<AssignmentGroup> {
    groups.into_iter().filter(AssignmentGroup::is_resolved).collect()
}
