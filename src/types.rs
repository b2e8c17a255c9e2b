//! Common types used throughout the matchmaking director
//!
//! These mirror the Open Match v1 JSON gateway shapes (snake_case field names)
//! and the Agones GameServer snapshot returned by the discover API.

use crate::extensions::Extensions;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Unique identifier for tickets
pub type TicketId = String;

/// Tickets returned for each pool of a profile, keyed by pool name
pub type PoolTickets = BTreeMap<String, Vec<Ticket>>;

/// Searchable attributes of a ticket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFields {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub double_args: HashMap<String, f64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub string_args: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// A player's matchmaking request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    #[serde(default)]
    pub id: TicketId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_fields: Option<SearchFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment: Option<Assignment>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: Extensions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoubleRangeFilter {
    pub double_arg: String,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringEqualsFilter {
    pub string_arg: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPresentFilter {
    pub tag: String,
}

/// A named query over the ticket index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub double_range_filters: Vec<DoubleRangeFilter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub string_equals_filters: Vec<StringEqualsFilter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag_present_filters: Vec<TagPresentFilter>,
}

/// Matchmaking profile: a set of pools plus the selection filter extension
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub pools: Vec<Pool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: Extensions,
}

/// A group of tickets proposed to play together
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub match_id: String,
    #[serde(default)]
    pub match_profile: String,
    #[serde(default)]
    pub match_function: String,
    #[serde(default)]
    pub tickets: Vec<Ticket>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: Extensions,
}

impl Match {
    pub fn ticket_ids(&self) -> Vec<TicketId> {
        self.tickets.iter().map(|t| t.id.clone()).collect()
    }
}

/// Where a group of tickets should connect
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(default)]
    pub connection: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: Extensions,
}

/// Tickets that share one assignment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignmentGroup {
    pub ticket_ids: Vec<TicketId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment: Option<Assignment>,
}

impl AssignmentGroup {
    /// Build an unresolved group for a match, carrying the given extensions.
    pub fn for_match(m: &Match, extensions: Extensions) -> Self {
        Self {
            ticket_ids: m.ticket_ids(),
            assignment: Some(Assignment {
                connection: String::new(),
                extensions,
            }),
        }
    }

    /// The connection chosen for this group, or an empty string when unresolved
    pub fn connection(&self) -> &str {
        self.assignment
            .as_ref()
            .map(|a| a.connection.as_str())
            .unwrap_or("")
    }

    pub fn is_resolved(&self) -> bool {
        !self.connection().is_empty()
    }
}

/// Per-ticket failure reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentFailure {
    pub ticket_id: TicketId,
    #[serde(default)]
    pub cause: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameServerPort {
    #[serde(default)]
    pub name: String,
    pub port: u16,
}

/// Player tracking for a game server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStatus {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub capacity: i64,
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameServerStatus {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<GameServerPort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub players: Option<PlayerStatus>,
}

/// Snapshot of a game server as listed by a directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameServer {
    #[serde(default)]
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub resource_version: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub status: GameServerStatus,
}

impl GameServer {
    /// (capacity, count); zero when the server does not track players
    pub fn player_counts(&self) -> (i64, i64) {
        self.status
            .players
            .as_ref()
            .map(|p| (p.capacity, p.count))
            .unwrap_or((0, 0))
    }

    /// Whether `ticket_count` more players fit on this server.
    ///
    /// Servers without player tracking (capacity and count both zero) always fit.
    pub fn has_capacity(&self, ticket_count: usize) -> bool {
        match self.player_counts() {
            (0, 0) => true,
            (capacity, count) => capacity.saturating_sub(count) >= ticket_count as i64,
        }
    }

    /// Connection string players should use, empty when the server has no address
    pub fn connection(&self) -> String {
        let address = self.status.address.trim();
        if address.is_empty() {
            return String::new();
        }
        match self.status.ports.first() {
            Some(port) if !address.contains(':') => format!("{}:{}", address, port.port),
            _ => address.to_string(),
        }
    }
}
