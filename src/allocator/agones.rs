//! Directory backed by the Agones allocator service over mutual TLS
//!
//! Each lookup performs a real allocation: the allocator reserves one server
//! matching the filter labels and answers with its address and ports.

use super::directory::{DirectoryError, GameServerDirectory};
use crate::error::{MatchmakingError, Result};
use crate::extensions::SelectionFilter;
use crate::types::{GameServer, GameServerPort, GameServerStatus};
use async_trait::async_trait;
use reqwest::{Certificate, Client, Identity, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub const ALLOCATION_PATH: &str = "/gameserverallocation";

/// Message the allocator returns when nothing matches the selectors
pub const NO_AVAILABLE_GAME_SERVER_MESSAGE: &str = "there is no available GameServer to allocate";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgonesAllocatorConfig {
    pub key_file: String,
    pub cert_file: String,
    #[serde(default)]
    pub ca_cert_file: String,
    pub host: String,
    pub port: u16,
    pub namespace: String,
    #[serde(default)]
    pub multi_cluster: bool,
}

impl AgonesAllocatorConfig {
    /// Collects every problem instead of stopping at the first one
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.key_file.trim().is_empty() {
            problems.push("the private key file for the client certificate is invalid");
        }
        if self.cert_file.trim().is_empty() {
            problems.push("the public key file for the client certificate is invalid");
        }
        if self.host.trim().is_empty() {
            problems.push("the Allocator Service host is invalid");
        }
        if self.port == 0 {
            problems.push("the Allocator Service port is invalid");
        }
        if self.namespace.trim().is_empty() {
            problems.push("the Allocator Service namespace is invalid");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(MatchmakingError::ConfigurationError {
                message: problems.join("; "),
            }
            .into())
        }
    }

    pub fn base_url(&self) -> String {
        format!("https://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationRequest {
    pub namespace: String,
    pub game_server_selectors: Vec<GameServerSelector>,
    pub multi_cluster_setting: MultiClusterSetting,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameServerSelector {
    pub match_labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiClusterSetting {
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationResponse {
    #[serde(default)]
    pub game_server_name: String,
    #[serde(default)]
    pub ports: Vec<AllocationPort>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub node_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllocationPort {
    #[serde(default)]
    pub name: String,
    pub port: u16,
}

#[derive(Debug, Default, Deserialize)]
struct AllocationErrorBody {
    #[serde(default)]
    message: String,
}

impl From<AllocationResponse> for GameServer {
    /// The allocator does not report player tracking, so the snapshot is untracked.
    /// Without ports the address is dropped and the candidate is not usable.
    fn from(response: AllocationResponse) -> Self {
        let address = if response.ports.is_empty() {
            String::new()
        } else {
            response.address
        };

        GameServer {
            name: response.game_server_name,
            status: GameServerStatus {
                state: "Allocated".to_string(),
                address,
                ports: response
                    .ports
                    .into_iter()
                    .map(|p| GameServerPort {
                        name: p.name,
                        port: p.port,
                    })
                    .collect(),
                players: None,
            },
            ..Default::default()
        }
    }
}

pub struct AgonesAllocatorDirectory {
    base_url: String,
    namespace: String,
    multi_cluster: bool,
    client: Client,
}

impl AgonesAllocatorDirectory {
    /// Validate the config and load the client credentials. Unreadable files fail here.
    pub fn new(config: &AgonesAllocatorConfig) -> Result<Self> {
        config.validate()?;

        let cert = read_pem(&config.cert_file)?;
        let key = read_pem(&config.key_file)?;
        let identity = Identity::from_pem(&[cert, key].concat()).map_err(|e| {
            MatchmakingError::ConfigurationError {
                message: format!("invalid client certificate or key: {}", e),
            }
        })?;

        let mut builder = Client::builder()
            .use_rustls_tls()
            .identity(identity)
            .timeout(Duration::from_secs(10));

        if !config.ca_cert_file.trim().is_empty() {
            let ca = read_pem(&config.ca_cert_file)?;
            let ca = Certificate::from_pem(&ca).map_err(|e| MatchmakingError::ConfigurationError {
                message: format!("only PEM format is accepted for server CA: {}", e),
            })?;
            builder = builder.add_root_certificate(ca);
        }

        let client = builder
            .build()
            .map_err(|e| MatchmakingError::ConfigurationError {
                message: format!("Failed to build allocator client: {}", e),
            })?;

        info!(
            "Agones allocator client ready for {} (namespace '{}', multicluster {})",
            config.base_url(),
            config.namespace,
            config.multi_cluster
        );

        Ok(Self::with_client(
            config.base_url(),
            config.namespace.clone(),
            config.multi_cluster,
            client,
        ))
    }

    /// Use a prepared client, e.g. a plain HTTP one in tests
    pub fn with_client(base_url: String, namespace: String, multi_cluster: bool, client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            namespace,
            multi_cluster,
            client,
        }
    }

    pub fn allocation_request(&self, filter: &SelectionFilter) -> AllocationRequest {
        AllocationRequest {
            namespace: self.namespace.clone(),
            game_server_selectors: vec![GameServerSelector {
                match_labels: filter.labels.clone(),
            }],
            multi_cluster_setting: MultiClusterSetting {
                enabled: self.multi_cluster,
            },
        }
    }
}

fn read_pem(path: &str) -> Result<Vec<u8>> {
    std::fs::read(Path::new(path)).map_err(|e| {
        MatchmakingError::ConfigurationError {
            message: format!("failed to read {}: {}", path, e),
        }
        .into()
    })
}

#[async_trait]
impl GameServerDirectory for AgonesAllocatorDirectory {
    async fn list_game_servers(
        &self,
        filter: &SelectionFilter,
    ) -> std::result::Result<Vec<GameServer>, DirectoryError> {
        let request = self.allocation_request(filter);
        debug!("Requesting allocation with labels {:?}", request.game_server_selectors);

        let response = self
            .client
            .post(format!("{}{}", self.base_url, ALLOCATION_PATH))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<AllocationErrorBody>(&body)
                .map(|b| b.message)
                .unwrap_or_else(|_| body.trim().to_string());

            if message == NO_AVAILABLE_GAME_SERVER_MESSAGE {
                return Err(DirectoryError::NoAvailableGameServer);
            }
            if status == StatusCode::NOT_FOUND {
                return Err(DirectoryError::NotFound {
                    filter: filter.to_query_string(),
                });
            }
            return Err(DirectoryError::Transport {
                message: format!("status {}: {}", status, message),
            });
        }

        let allocation: AllocationResponse = response.json().await?;
        debug!(
            "Allocated game server '{}' on node '{}'",
            allocation.game_server_name, allocation.node_name
        );
        Ok(vec![allocation.into()])
    }

    fn name(&self) -> &'static str {
        "agones"
    }
}
