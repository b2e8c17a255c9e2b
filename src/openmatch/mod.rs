//! Open Match integration over the JSON gateway
//!
//! This module handles the backend, query and frontend HTTP clients, the
//! message bodies they exchange and decoding of streamed responses.

pub mod backend;
pub mod connection;
pub mod frontend;
pub mod messages;
pub mod query;
pub mod stream;

pub use backend::{HttpBackendClient, MatchStream, MatchmakingBackend, MockMatchmakingBackend};
pub use connection::OpenMatchEndpoint;
pub use frontend::{FrontendService, HttpFrontendClient, MockFrontendService};
pub use messages::{FunctionConfig, FunctionType};
pub use query::{query_pools, HttpQueryClient, QueryService, StaticQueryService};
