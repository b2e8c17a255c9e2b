//! Player simulator
//!
//! Creates a batch of players on a fixed interval and opens one matchmaking
//! ticket per player on the Open Match frontend.

use crate::director::{cancelled, REGIONS, WORLDS};
use crate::error::{MatchmakingError, Result};
use crate::openmatch::FrontendService;
use crate::types::{SearchFields, Ticket};
use crate::utils::{format_duration, parse_duration};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, Instrument, Span};
use uuid::Uuid;

/// Tag every simulated ticket carries so session pools pick it up
pub const SESSION_TAG: &str = "mode.session";

const SKILL_LEVELS: [i64; 5] = [1, 2, 3, 4, 5];
const LATENCIES: [i64; 4] = [20, 30, 50, 100];

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Time between batches, e.g. `5s`
    pub interval: String,
    /// Players created per batch
    pub players_pool: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            interval: "5s".to_string(),
            players_pool: 10,
        }
    }
}

/// A simulated player and the ticket opened for it
#[derive(Debug, Clone)]
pub struct Player {
    pub uid: String,
    pub ticket: Ticket,
}

impl Player {
    /// New player with random region, world, skill and latency
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let region = REGIONS.choose(rng).copied().unwrap_or(REGIONS[0]);
        let world = WORLDS.choose(rng).copied().unwrap_or(WORLDS[0]);
        let skill = SKILL_LEVELS.choose(rng).copied().unwrap_or(SKILL_LEVELS[0]);
        let latency = LATENCIES.choose(rng).copied().unwrap_or(LATENCIES[0]);

        let string_args = HashMap::from([
            ("region".to_string(), region.to_string()),
            ("world".to_string(), world.to_string()),
            ("skill".to_string(), skill.to_string()),
            ("latency".to_string(), latency.to_string()),
        ]);
        let double_args = HashMap::from([
            ("skill".to_string(), skill as f64),
            ("latency".to_string(), latency as f64),
        ]);

        Self {
            uid: Uuid::new_v4().to_string(),
            ticket: Ticket {
                search_fields: Some(SearchFields {
                    double_args,
                    string_args,
                    tags: vec![SESSION_TAG.to_string()],
                }),
                ..Default::default()
            },
        }
    }
}

pub struct PlayerSimulator {
    interval: Duration,
    players_pool: usize,
    frontend: Arc<dyn FrontendService>,
    players: Mutex<Vec<Player>>,
    span: Span,
}

impl PlayerSimulator {
    pub fn new(config: SimulatorConfig, frontend: Arc<dyn FrontendService>) -> Result<Self> {
        let interval = parse_duration(&config.interval)?;
        if interval.is_zero() {
            return Err(MatchmakingError::InvalidInterval {
                value: config.interval,
                reason: "interval must be greater than zero".to_string(),
            }
            .into());
        }

        Ok(Self {
            interval,
            players_pool: config.players_pool,
            frontend,
            players: Mutex::new(Vec::new()),
            span: info_span!("simulator"),
        })
    }

    pub fn create_players(&self, count: usize) -> Vec<Player> {
        let mut rng = rand::thread_rng();
        (0..count).map(|_| Player::random(&mut rng)).collect()
    }

    /// Open a ticket for each player. Players whose ticket was created are
    /// kept even when a later request fails.
    pub async fn request_matches(&self, players: Vec<Player>) -> Result<usize> {
        let mut created = Vec::with_capacity(players.len());
        let mut failure = None;

        for mut player in players {
            match self.frontend.create_ticket(player.ticket.clone()).await {
                Ok(ticket) => {
                    debug!(
                        "ticketID={} playerUID={} args={:?}",
                        ticket.id,
                        player.uid,
                        ticket.search_fields.as_ref().map(|f| &f.string_args)
                    );
                    player.ticket = ticket;
                    created.push(player);
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        let count = created.len();
        self.add_players(created);

        match failure {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }

    fn add_players(&self, players: Vec<Player>) {
        if let Ok(mut all) = self.players.lock() {
            all.extend(players);
        }
    }

    pub fn total_players(&self) -> usize {
        self.players.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn players(&self) -> Vec<Player> {
        self.players.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Create one batch and log the running total
    pub async fn create_matchmaking_requests(&self) {
        let players = self.create_players(self.players_pool);
        if let Err(e) = self.request_matches(players).await {
            error!("Failed to create tickets: {:#}", e);
        }
        info!("total Players: {}", self.total_players());
    }

    /// First batch immediately, then one per interval until cancelled
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        self.run_inner(shutdown).instrument(self.span.clone()).await
    }

    async fn run_inner(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            "Starting player simulator: {} players every {}",
            self.players_pool,
            format_duration(self.interval)
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }

            info!("Creating matchmaking requests for {} players", self.players_pool);
            tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => break,
                _ = self.create_matchmaking_requests() => {}
            }
        }

        info!("Player simulator stopped with {} players", self.total_players());
        Ok(())
    }
}
