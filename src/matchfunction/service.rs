//! Match function service: query a profile's pools and turn them into proposals

use super::packer::pack;
use crate::error::Result;
use crate::metrics::MetricsCollector;
use crate::openmatch::{query_pools, QueryService};
use crate::types::{Match, PoolTickets, Profile};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument, Span};

/// Strategy for turning pool tickets into matches
pub trait MatchMaker: Send + Sync {
    fn make_matches(&self, profile: &Profile, pools: &PoolTickets) -> Result<Vec<Match>>;
}

/// Packs a fixed number of players per pool into each match
#[derive(Debug, Clone)]
pub struct PlayerCapacityMatchMaker {
    capacity: i64,
}

impl PlayerCapacityMatchMaker {
    pub fn new(capacity: i64) -> Self {
        Self { capacity }
    }

    pub fn capacity(&self) -> i64 {
        self.capacity
    }
}

impl Default for PlayerCapacityMatchMaker {
    fn default() -> Self {
        Self::new(10)
    }
}

impl MatchMaker for PlayerCapacityMatchMaker {
    fn make_matches(&self, profile: &Profile, pools: &PoolTickets) -> Result<Vec<Match>> {
        pack(self.capacity, Some(&profile.name), Some(pools))
    }
}

pub struct MatchFunctionService {
    query: Arc<dyn QueryService>,
    maker: Arc<dyn MatchMaker>,
    metrics: Option<Arc<MetricsCollector>>,
    span: Span,
}

impl MatchFunctionService {
    pub fn new(query: Arc<dyn QueryService>, maker: Arc<dyn MatchMaker>) -> Self {
        Self {
            query,
            maker,
            metrics: None,
            span: info_span!("match_function"),
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

    /// Produce proposals for a profile. Every proposal inherits the profile's
    /// extensions so the director can recover the selection filter.
    pub async fn run(&self, profile: &Profile) -> Result<Vec<Match>> {
        let started = Instant::now();
        let result = self.run_inner(profile).instrument(self.span.clone()).await;

        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(proposals) => {
                    metrics.record_match_function_run(proposals.len(), started.elapsed())
                }
                Err(_) => metrics.record_match_function_error(),
            }
        }

        result
    }

    async fn run_inner(&self, profile: &Profile) -> Result<Vec<Match>> {
        let pools = query_pools(self.query.as_ref(), &profile.pools).await?;
        let ticket_count: usize = pools.values().map(Vec::len).sum();

        let mut proposals = match self.maker.make_matches(profile, &pools) {
            Ok(proposals) => proposals,
            Err(e) => {
                warn!("Failed to make matches for profile '{}': {}", profile.name, e);
                return Err(e);
            }
        };

        for proposal in &mut proposals {
            proposal.extensions = profile.extensions.clone();
        }

        info!(
            "Profile '{}': {} pools, {} tickets, {} proposals",
            profile.name,
            pools.len(),
            ticket_count,
            proposals.len()
        );

        Ok(proposals)
    }
}
