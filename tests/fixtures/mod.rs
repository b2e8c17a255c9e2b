//! Test fixtures and in-memory collaborators for integration testing

use async_trait::async_trait;
use futures::StreamExt;
use match_director::allocator::{DirectoryError, GameServerDirectory};
use match_director::error::Result;
use match_director::extensions::{build_extensions, Extension, SelectionFilter};
use match_director::matchfunction::MatchFunctionService;
use match_director::openmatch::{MatchStream, MatchmakingBackend};
use match_director::types::{
    AssignmentFailure, AssignmentGroup, GameServer, GameServerPort, GameServerStatus,
    PlayerStatus, Pool, Profile, SearchFields, StringEqualsFilter, Ticket,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Backend that answers fetches by running the match function in-process,
/// the way Open Match calls it for the director.
pub struct LoopbackBackend {
    function: Arc<MatchFunctionService>,
    assigned: Mutex<Vec<AssignmentGroup>>,
}

impl LoopbackBackend {
    pub fn new(function: Arc<MatchFunctionService>) -> Self {
        Self {
            function,
            assigned: Mutex::new(Vec::new()),
        }
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
impl MatchmakingBackend for LoopbackBackend {
    async fn fetch_matches(&self, profile: &Profile) -> Result<MatchStream> {
        let proposals = self.function.run(profile).await?;
        Ok(futures::stream::iter(proposals.into_iter().map(Ok)).boxed())
    }

    async fn assign_tickets(&self, groups: Vec<AssignmentGroup>) -> Result<Vec<AssignmentFailure>> {
        if let Ok(mut assigned) = self.assigned.lock() {
            assigned.extend(groups);
        }
        Ok(Vec::new())
    }
}

/// Fixed fleet of game servers matched against selection filters
#[derive(Debug, Default)]
pub struct FleetDirectory {
    servers: Vec<GameServer>,
    queries: Mutex<Vec<SelectionFilter>>,
}

impl FleetDirectory {
    pub fn new(servers: Vec<GameServer>) -> Self {
        Self {
            servers,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<SelectionFilter> {
        self.queries
            .lock()
            .map(|q| q.clone())
            .unwrap_or_default()
    }

    fn matches(server: &GameServer, filter: &SelectionFilter) -> bool {
        let labels_match = filter
            .labels
            .iter()
            .all(|(k, v)| server.labels.get(k) == Some(v));
        let fields_match = filter.fields.iter().all(|(k, v)| match k.as_str() {
            "status.state" => &server.status.state == v,
            _ => false,
        });
        labels_match && fields_match
    }
}

#[async_trait]
impl GameServerDirectory for FleetDirectory {
    async fn list_game_servers(
        &self,
        filter: &SelectionFilter,
    ) -> std::result::Result<Vec<GameServer>, DirectoryError> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(filter.clone());
        }

        let found: Vec<GameServer> = self
            .servers
            .iter()
            .filter(|gs| Self::matches(gs, filter))
            .cloned()
            .collect();

        if found.is_empty() {
            return Err(DirectoryError::NotFound {
                filter: filter.to_query_string(),
            });
        }
        Ok(found)
    }

    fn name(&self) -> &'static str {
        "fleet"
    }
}

/// Filter selecting ready servers for a world and region
pub fn world_filter(world: &str, region: &str) -> SelectionFilter {
    SelectionFilter::new()
        .with_label("region", region)
        .with_label("world", world)
        .with_field("status.state", "Ready")
}

/// Single-pool profile carrying a world and region filter
pub fn world_profile(world: &str, region: &str) -> Profile {
    Profile {
        name: format!("world_based_profile_{}_{}", world, region),
        pools: vec![Pool {
            name: format!("pool_mode_{}", world),
            string_equals_filters: vec![StringEqualsFilter {
                string_arg: "world".to_string(),
                value: world.to_string(),
            }],
            ..Default::default()
        }],
        extensions: build_extensions([Extension::Filter(world_filter(world, region))])
            .expect("filter encodes"),
    }
}

/// `count` tickets with ids `{prefix}-{n}` for a world
pub fn tickets(prefix: &str, world: &str, count: usize) -> Vec<Ticket> {
    (0..count)
        .map(|n| Ticket {
            id: format!("{}-{}", prefix, n),
            search_fields: Some(SearchFields {
                string_args: HashMap::from([("world".to_string(), world.to_string())]),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect()
}

/// Ready game server labelled with a world and region
pub fn ready_server(
    name: &str,
    world: &str,
    region: &str,
    address: &str,
    port: u16,
    players: Option<(i64, i64)>,
) -> GameServer {
    GameServer {
        uid: format!("uid-{}", name),
        name: name.to_string(),
        namespace: "default".to_string(),
        labels: BTreeMap::from([
            ("world".to_string(), world.to_string()),
            ("region".to_string(), region.to_string()),
        ]),
        status: GameServerStatus {
            state: "Ready".to_string(),
            address: address.to_string(),
            ports: vec![GameServerPort {
                name: "default".to_string(),
                port,
            }],
            players: players.map(|(capacity, count)| PlayerStatus {
                count,
                capacity,
                ids: Vec::new(),
            }),
        },
        ..Default::default()
    }
}
