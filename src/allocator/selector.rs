//! First-fit selection of game servers for assignment groups

use super::directory::{DirectoryError, GameServerDirectory};
use crate::error::{MatchmakingError, Result};
use crate::extensions::SelectionFilter;
use crate::metrics::MetricsCollector;
use crate::types::{AssignmentGroup, GameServer};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument, Span};

/// Outcome of resolving one group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationOutcome {
    Assigned,
    NoCapacity,
    NotFound,
    NoAvailable,
}

impl AllocationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationOutcome::Assigned => "assigned",
            AllocationOutcome::NoCapacity => "no_capacity",
            AllocationOutcome::NotFound => "not_found",
            AllocationOutcome::NoAvailable => "no_available",
        }
    }
}

/// Resolves assignment groups to game server connections.
///
/// Holds only shared read-only handles, so one selector can serve any number
/// of concurrent batches.
pub struct AllocationSelector {
    directory: Arc<dyn GameServerDirectory>,
    metrics: Option<Arc<MetricsCollector>>,
    span: Span,
}

impl AllocationSelector {
    pub fn new(directory: Arc<dyn GameServerDirectory>) -> Self {
        Self {
            directory,
            metrics: None,
            span: info_span!("allocator"),
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

    /// Write a connection onto every group a suitable server can be found for.
    ///
    /// All groups are validated before the directory is queried; a malformed
    /// group aborts the batch. Directory misses leave the group unresolved.
    /// Any other directory error aborts and propagates; groups resolved
    /// before it keep their connections.
    pub async fn allocate(&self, groups: &mut [AssignmentGroup]) -> Result<()> {
        self.allocate_inner(groups).instrument(self.span.clone()).await
    }

    async fn allocate_inner(&self, groups: &mut [AssignmentGroup]) -> Result<()> {
        let filters = groups
            .iter()
            .enumerate()
            .map(|(i, group)| validate_group(i, group))
            .collect::<Result<Vec<_>>>()?;

        for (group, filter) in groups.iter_mut().zip(filters) {
            let outcome = match self.directory.list_game_servers(&filter).await {
                Ok(candidates) => self.assign_first_fit(group, &candidates),
                Err(DirectoryError::NotFound { filter }) => {
                    debug!("No game servers found for filter {}", filter);
                    AllocationOutcome::NotFound
                }
                Err(DirectoryError::NoAvailableGameServer) => {
                    debug!("{}", DirectoryError::NoAvailableGameServer);
                    AllocationOutcome::NoAvailable
                }
                Err(e) => {
                    warn!(
                        "Directory '{}' failed for filter {}: {}",
                        self.directory.name(),
                        filter.to_query_string(),
                        e
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_allocation_error(self.directory.name());
                    }
                    return Err(e.into());
                }
            };

            if let Some(metrics) = &self.metrics {
                metrics.record_allocation(self.directory.name(), outcome);
            }
        }

        Ok(())
    }

    fn assign_first_fit(&self, group: &mut AssignmentGroup, candidates: &[GameServer]) -> AllocationOutcome {
        let ticket_count = group.ticket_ids.len();

        let chosen = candidates
            .iter()
            .find(|gs| gs.has_capacity(ticket_count) && !gs.connection().is_empty());

        match (chosen, group.assignment.as_mut()) {
            (Some(gs), Some(assignment)) => {
                assignment.connection = gs.connection();
                let (capacity, count) = gs.player_counts();
                info!(
                    "Game server '{}' connection {} assigned to {} tickets (players {}/{})",
                    gs.name, assignment.connection, ticket_count, count, capacity
                );
                AllocationOutcome::Assigned
            }
            _ => {
                debug!(
                    "None of {} candidates can take {} tickets",
                    candidates.len(),
                    ticket_count
                );
                AllocationOutcome::NoCapacity
            }
        }
    }
}

fn validate_group(index: usize, group: &AssignmentGroup) -> Result<SelectionFilter> {
    if group.ticket_ids.is_empty() {
        return Err(invalid(index, "no ticket ids"));
    }
    let assignment = group
        .assignment
        .as_ref()
        .ok_or_else(|| invalid(index, "missing assignment"))?;

    match SelectionFilter::from_extensions(&assignment.extensions) {
        Ok(Some(filter)) => Ok(filter),
        Ok(None) => Err(invalid(index, "missing filter extension")),
        Err(e) => Err(invalid(index, &format!("unreadable filter extension: {}", e))),
    }
}

fn invalid(index: usize, reason: &str) -> anyhow::Error {
    MatchmakingError::InvalidAssignmentGroup {
        reason: format!("group {}: {}", index, reason),
    }
    .into()
}
