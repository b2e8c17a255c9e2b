//! Open Match frontend client, used by the player simulator

use super::connection::{ensure_success, OpenMatchEndpoint};
use super::messages::{CreateTicketRequest, CREATE_TICKET_PATH};
use crate::error::Result;
use crate::types::Ticket;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Mutex;

#[async_trait]
pub trait FrontendService: Send + Sync {
    /// Create a ticket; the returned ticket carries the id assigned by Open Match
    async fn create_ticket(&self, ticket: Ticket) -> Result<Ticket>;
}

pub struct HttpFrontendClient {
    endpoint: OpenMatchEndpoint,
    client: Client,
}

impl HttpFrontendClient {
    pub fn new(endpoint: OpenMatchEndpoint) -> Result<Self> {
        let client = endpoint.build_client()?;
        Ok(Self { endpoint, client })
    }
}

#[async_trait]
impl FrontendService for HttpFrontendClient {
    async fn create_ticket(&self, ticket: Ticket) -> Result<Ticket> {
        let response = self
            .client
            .post(self.endpoint.url(CREATE_TICKET_PATH))
            .timeout(self.endpoint.request_timeout())
            .json(&CreateTicketRequest { ticket })
            .send()
            .await?;
        let response = ensure_success(response, "create ticket").await?;

        Ok(response.json().await?)
    }
}

/// Frontend that assigns sequential ids and remembers every ticket
#[derive(Debug, Default)]
pub struct MockFrontendService {
    created: Mutex<Vec<Ticket>>,
}

impl MockFrontendService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_tickets(&self) -> Vec<Ticket> {
        self.created
            .lock()
            .map(|tickets| tickets.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl FrontendService for MockFrontendService {
    async fn create_ticket(&self, mut ticket: Ticket) -> Result<Ticket> {
        if let Ok(mut created) = self.created.lock() {
            ticket.id = format!("ticket-{}", created.len() + 1);
            created.push(ticket.clone());
        }
        Ok(ticket)
    }
}
