//! Open Match backend client: fetch match proposals and assign tickets

use super::connection::{ensure_success, OpenMatchEndpoint};
use super::messages::{
    AssignTicketsRequest, AssignTicketsResponse, FetchMatchesRequest, FetchMatchesResponse,
    FunctionConfig, ASSIGN_TICKETS_PATH, FETCH_MATCHES_PATH,
};
use super::stream::{decode_response, ResultStream};
use crate::error::{MatchmakingError, Result};
use crate::types::{AssignmentFailure, AssignmentGroup, Match, Profile};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Stream of match proposals for one profile
pub type MatchStream = ResultStream<Match>;

/// Trait for the matchmaking backend the director talks to
#[async_trait]
pub trait MatchmakingBackend: Send + Sync {
    /// Start fetching proposals for a profile. The returned stream ends when the
    /// backend has no more proposals for this call.
    async fn fetch_matches(&self, profile: &Profile) -> Result<MatchStream>;

    /// Report resolved assignments; returns per-ticket failures.
    async fn assign_tickets(&self, groups: Vec<AssignmentGroup>) -> Result<Vec<AssignmentFailure>>;
}

/// Backend client speaking the Open Match JSON gateway
pub struct HttpBackendClient {
    endpoint: OpenMatchEndpoint,
    client: Client,
    function: FunctionConfig,
}

impl HttpBackendClient {
    pub fn new(endpoint: OpenMatchEndpoint, function: FunctionConfig) -> Result<Self> {
        let client = endpoint.build_client()?;
        Ok(Self {
            endpoint,
            client,
            function,
        })
    }

    pub fn function(&self) -> &FunctionConfig {
        &self.function
    }
}

#[async_trait]
impl MatchmakingBackend for HttpBackendClient {
    async fn fetch_matches(&self, profile: &Profile) -> Result<MatchStream> {
        let request = FetchMatchesRequest {
            config: self.function.clone(),
            profile: profile.clone(),
        };

        debug!(
            "Fetching matches for profile '{}' via {}:{}",
            profile.name, self.function.host, self.function.port
        );

        let response = self
            .client
            .post(self.endpoint.url(FETCH_MATCHES_PATH))
            .json(&request)
            .send()
            .await?;
        let response = ensure_success(response, "fetch matches").await?;

        let stream = decode_response::<FetchMatchesResponse>(response)
            .map(|frame| frame.map(|r| r.matched))
            .boxed();
        Ok(stream)
    }

    async fn assign_tickets(&self, groups: Vec<AssignmentGroup>) -> Result<Vec<AssignmentFailure>> {
        let request = AssignTicketsRequest {
            assignments: groups,
        };

        let response = self
            .client
            .post(self.endpoint.url(ASSIGN_TICKETS_PATH))
            .timeout(self.endpoint.request_timeout())
            .json(&request)
            .send()
            .await?;
        let response = ensure_success(response, "assign tickets").await?;

        let body: AssignTicketsResponse = response.json().await?;
        Ok(body.failures)
    }
}

/// In-memory backend for tests and local runs
#[derive(Debug, Default)]
pub struct MockMatchmakingBackend {
    matches: Mutex<HashMap<String, Vec<Match>>>,
    fetch_error: Mutex<Option<String>>,
    fetch_delay: Mutex<Option<Duration>>,
    assign_error: Mutex<Option<String>>,
    failing_tickets: Mutex<Vec<String>>,
    fetch_calls: Mutex<Vec<String>>,
    assigned: Mutex<Vec<AssignmentGroup>>,
}

impl MockMatchmakingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue proposals returned for a profile on every fetch
    pub fn with_matches(self, profile: &str, matches: Vec<Match>) -> Self {
        if let Ok(mut map) = self.matches.lock() {
            map.insert(profile.to_string(), matches);
        }
        self
    }

    pub fn with_fetch_error(self, message: &str) -> Self {
        if let Ok(mut e) = self.fetch_error.lock() {
            *e = Some(message.to_string());
        }
        self
    }

    /// Delay each proposal stream before it yields anything
    pub fn with_fetch_delay(self, delay: Duration) -> Self {
        if let Ok(mut d) = self.fetch_delay.lock() {
            *d = Some(delay);
        }
        self
    }

    pub fn with_assign_error(self, message: &str) -> Self {
        if let Ok(mut e) = self.assign_error.lock() {
            *e = Some(message.to_string());
        }
        self
    }

    /// Tickets the backend will report as not found
    pub fn with_failing_tickets(self, tickets: &[&str]) -> Self {
        if let Ok(mut t) = self.failing_tickets.lock() {
            t.extend(tickets.iter().map(|s| s.to_string()));
        }
        self
    }

    /// Profile names passed to `fetch_matches`, in call order
    pub fn fetch_calls(&self) -> Vec<String> {
        self.fetch_calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Every group passed to `assign_tickets`
    pub fn assigned_groups(&self) -> Vec<AssignmentGroup> {
        self.assigned
            .lock()
            .map(|groups| groups.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MatchmakingBackend for MockMatchmakingBackend {
    async fn fetch_matches(&self, profile: &Profile) -> Result<MatchStream> {
        if let Ok(mut calls) = self.fetch_calls.lock() {
            calls.push(profile.name.clone());
        }

        let fetch_error = self.fetch_error.lock().ok().and_then(|e| e.clone());
        if let Some(message) = fetch_error {
            return Err(MatchmakingError::RemoteStream { message }.into());
        }

        let matches = self
            .matches
            .lock()
            .ok()
            .and_then(|m| m.get(&profile.name).cloned())
            .unwrap_or_default();
        let delay = self.fetch_delay.lock().ok().and_then(|d| *d);

        let items = tokio_stream::iter(matches.into_iter().map(Ok));
        match delay {
            Some(delay) => Ok(futures::stream::once(async move {
                tokio::time::sleep(delay).await;
                items
            })
            .flatten()
            .boxed()),
            None => Ok(items.boxed()),
        }
    }

    async fn assign_tickets(&self, groups: Vec<AssignmentGroup>) -> Result<Vec<AssignmentFailure>> {
        let assign_error = self.assign_error.lock().ok().and_then(|e| e.clone());
        if let Some(message) = assign_error {
            return Err(MatchmakingError::RemoteStream { message }.into());
        }

        let failing = self
            .failing_tickets
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default();

        let failures = groups
            .iter()
            .flat_map(|g| g.ticket_ids.iter())
            .filter(|id| failing.contains(id))
            .map(|id| AssignmentFailure {
                ticket_id: id.clone(),
                cause: "TICKET_NOT_FOUND".to_string(),
            })
            .collect();

        if let Ok(mut assigned) = self.assigned.lock() {
            assigned.extend(groups);
        }

        Ok(failures)
    }
}
