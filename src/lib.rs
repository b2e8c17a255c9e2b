//! Match Director - Open Match director and match function for Agones
//!
//! This crate fetches match proposals from Open Match for a set of profiles,
//! finds a game server for each match through the discover API or the Agones
//! allocator, and reports the assignments back to Open Match. It also hosts
//! the player capacity match function and a player simulator.

pub mod allocator;
pub mod config;
pub mod director;
pub mod error;
pub mod extensions;
pub mod matchfunction;
pub mod metrics;
pub mod openmatch;
pub mod service;
pub mod simulator;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{MatchmakingError, Result};
pub use types::*;

// Re-export key components
pub use allocator::{AllocationSelector, GameServerDirectory};
pub use director::{AssignmentReporter, Director};
pub use matchfunction::pack;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
