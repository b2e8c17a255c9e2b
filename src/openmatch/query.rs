//! Open Match query service client used by the match function

use super::connection::{ensure_success, OpenMatchEndpoint};
use super::messages::{QueryTicketsRequest, QueryTicketsResponse, QUERY_TICKETS_PATH};
use super::stream::decode_response;
use crate::error::Result;
use crate::types::{Pool, PoolTickets, Ticket};
use async_trait::async_trait;
use futures::future::try_join_all;
use futures::TryStreamExt;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

#[async_trait]
pub trait QueryService: Send + Sync {
    /// All tickets currently matching a pool
    async fn query_tickets(&self, pool: &Pool) -> Result<Vec<Ticket>>;
}

/// Query every pool concurrently and key the results by pool name
pub async fn query_pools(query: &dyn QueryService, pools: &[Pool]) -> Result<PoolTickets> {
    let results = try_join_all(pools.iter().map(|pool| async move {
        let tickets = query.query_tickets(pool).await?;
        Ok::<_, anyhow::Error>((pool.name.clone(), tickets))
    }))
    .await?;

    Ok(results.into_iter().collect())
}

pub struct HttpQueryClient {
    endpoint: OpenMatchEndpoint,
    client: Client,
}

impl HttpQueryClient {
    pub fn new(endpoint: OpenMatchEndpoint) -> Result<Self> {
        let client = endpoint.build_client()?;
        Ok(Self { endpoint, client })
    }
}

#[async_trait]
impl QueryService for HttpQueryClient {
    async fn query_tickets(&self, pool: &Pool) -> Result<Vec<Ticket>> {
        let request = QueryTicketsRequest { pool: pool.clone() };

        let response = self
            .client
            .post(self.endpoint.url(QUERY_TICKETS_PATH))
            .timeout(self.endpoint.request_timeout())
            .json(&request)
            .send()
            .await?;
        let response = ensure_success(response, "query tickets").await?;

        let pages: Vec<QueryTicketsResponse> = decode_response(response).try_collect().await?;
        let tickets: Vec<Ticket> = pages.into_iter().flat_map(|page| page.tickets).collect();

        debug!("Pool '{}' returned {} tickets", pool.name, tickets.len());
        Ok(tickets)
    }
}

/// Query service backed by fixed tickets per pool name
#[derive(Debug, Default)]
pub struct StaticQueryService {
    tickets: Mutex<HashMap<String, Vec<Ticket>>>,
}

impl StaticQueryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(self, pool: &str, tickets: Vec<Ticket>) -> Self {
        if let Ok(mut map) = self.tickets.lock() {
            map.insert(pool.to_string(), tickets);
        }
        self
    }
}

#[async_trait]
impl QueryService for StaticQueryService {
    async fn query_tickets(&self, pool: &Pool) -> Result<Vec<Ticket>> {
        Ok(self
            .tickets
            .lock()
            .ok()
            .and_then(|map| map.get(&pool.name).cloned())
            .unwrap_or_default())
    }
}
