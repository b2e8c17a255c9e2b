//! Directory backed by the discover HTTP API (`GET /api/v1/gameservers`)

use super::directory::{DirectoryError, GameServerDirectory};
use crate::error::{MatchmakingError, Result};
use crate::extensions::SelectionFilter;
use crate::types::GameServer;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const GAME_SERVERS_PATH: &str = "/api/v1/gameservers";

#[derive(Debug, Clone)]
pub struct DiscoverConfig {
    pub url: String,
    pub timeout_ms: u64,
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8081".to_string(),
            timeout_ms: 5000,
        }
    }
}

/// The API answers with a list, or a single object when exactly one server matches
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GameServersResponse {
    List(Vec<GameServer>),
    Single(Box<GameServer>),
}

impl From<GameServersResponse> for Vec<GameServer> {
    fn from(response: GameServersResponse) -> Self {
        match response {
            GameServersResponse::List(list) => list,
            GameServersResponse::Single(gs) => vec![*gs],
        }
    }
}

pub struct DiscoverDirectory {
    base_url: String,
    client: Client,
}

impl DiscoverDirectory {
    pub fn new(config: &DiscoverConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| MatchmakingError::ConfigurationError {
                message: format!("Failed to build discover client: {}", e),
            })?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Full request URL for a filter
    pub fn request_url(&self, filter: &SelectionFilter) -> String {
        let query = filter.to_query_string();
        if query.is_empty() {
            format!("{}{}", self.base_url, GAME_SERVERS_PATH)
        } else {
            format!("{}{}?{}", self.base_url, GAME_SERVERS_PATH, query)
        }
    }
}

/// Parse a discover response body
pub fn parse_game_servers(body: &[u8]) -> std::result::Result<Vec<GameServer>, DirectoryError> {
    serde_json::from_slice::<GameServersResponse>(body)
        .map(Into::into)
        .map_err(|e| DirectoryError::InvalidResponse {
            message: e.to_string(),
        })
}

#[async_trait]
impl GameServerDirectory for DiscoverDirectory {
    async fn list_game_servers(
        &self,
        filter: &SelectionFilter,
    ) -> std::result::Result<Vec<GameServer>, DirectoryError> {
        let url = self.request_url(filter);
        debug!("Listing game servers: {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound {
                filter: filter.to_query_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Transport {
                message: format!("status {}: {}", status, body.trim()),
            });
        }

        let body = response.bytes().await?;
        parse_game_servers(&body)
    }

    fn name(&self) -> &'static str {
        "discover"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn filter() -> SelectionFilter {
        SelectionFilter::new()
            .with_label("region", "us-east-1")
            .with_field("status.state", "Ready")
    }

    fn directory(url: &str) -> DiscoverDirectory {
        DiscoverDirectory::new(&DiscoverConfig {
            url: url.to_string(),
            timeout_ms: 2000,
        })
        .unwrap()
    }

    #[test]
    fn test_request_url() {
        let dir = directory("http://discover:8081/");
        assert_eq!(
            dir.request_url(&filter()),
            "http://discover:8081/api/v1/gameservers?fields=status.state%3DReady&labels=region%3Dus-east-1"
        );
        assert_eq!(
            dir.request_url(&SelectionFilter::new()),
            "http://discover:8081/api/v1/gameservers"
        );
    }

    #[test]
    fn test_parse_list_and_single() {
        let list = parse_game_servers(br#"[{"name":"a"},{"name":"b"}]"#).unwrap();
        assert_eq!(list.len(), 2);

        let single = parse_game_servers(br#"{"name":"solo","status":{"address":"1.2.3.4"}}"#).unwrap();
        assert_eq!(single[0].name, "solo");

        assert!(matches!(
            parse_game_servers(b"\"nope\""),
            Err(DirectoryError::InvalidResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_game_servers_sends_filter() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", GAME_SERVERS_PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("fields".into(), "status.state=Ready".into()),
                Matcher::UrlEncoded("labels".into(), "region=us-east-1".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"[{"name":"gs-1","status":{"state":"Ready","address":"10.0.0.5","players":{"count":1,"capacity":10}}}]"#,
            )
            .create_async()
            .await;

        let servers = directory(&server.url())
            .list_game_servers(&filter())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].player_counts(), (10, 1));
    }

    #[tokio::test]
    async fn test_not_found_maps_to_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", GAME_SERVERS_PATH)
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let result = directory(&server.url()).list_game_servers(&filter()).await;
        assert!(matches!(result, Err(DirectoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_server_error_is_transport() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", GAME_SERVERS_PATH)
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let result = directory(&server.url()).list_game_servers(&filter()).await;
        match result {
            Err(DirectoryError::Transport { message }) => assert!(message.contains("boom")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
