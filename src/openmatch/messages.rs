//! Request and response bodies of the Open Match v1 JSON gateway

use crate::types::{AssignmentFailure, AssignmentGroup, Match, Pool, Profile, Ticket};
use serde::{Deserialize, Serialize};

pub const FETCH_MATCHES_PATH: &str = "/v1/backendservice/matches:fetch";
pub const ASSIGN_TICKETS_PATH: &str = "/v1/backendservice/tickets:assign";
pub const QUERY_TICKETS_PATH: &str = "/v1/queryservice/tickets:query";
pub const CREATE_TICKET_PATH: &str = "/v1/frontendservice/tickets";
pub const RUN_MATCH_FUNCTION_PATH: &str = "/v1/matchfunction:run";

/// How the backend should call the match function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FunctionType {
    Grpc,
    Rest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionConfig {
    pub host: String,
    pub port: u16,
    #[serde(rename = "type")]
    pub function_type: FunctionType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchMatchesRequest {
    pub config: FunctionConfig,
    pub profile: Profile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchMatchesResponse {
    #[serde(rename = "match")]
    pub matched: Match,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignTicketsRequest {
    pub assignments: Vec<AssignmentGroup>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignTicketsResponse {
    #[serde(default)]
    pub failures: Vec<AssignmentFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryTicketsRequest {
    pub pool: Pool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryTicketsResponse {
    #[serde(default)]
    pub tickets: Vec<Ticket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTicketRequest {
    pub ticket: Ticket,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub profile: Profile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    pub proposal: Match,
}

/// One line of a streamed gateway response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamFrame<T> {
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StreamError>,
}

impl<T> StreamFrame<T> {
    pub fn result(result: T) -> Self {
        Self {
            result: Some(result),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>, http_code: u16) -> Self {
        Self {
            result: None,
            error: Some(StreamError {
                grpc_code: 0,
                http_code,
                message: message.into(),
                http_status: String::new(),
            }),
        }
    }
}

/// Error frame emitted by the gateway when a stream fails mid-way
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamError {
    #[serde(default)]
    pub grpc_code: i32,
    #[serde(default)]
    pub http_code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub http_status: String,
}
