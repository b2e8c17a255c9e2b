//! Game server allocation
//!
//! This module contains the directory abstraction, its discover and Agones
//! allocator implementations, and the first-fit selector that writes
//! connections onto assignment groups.

pub mod agones;
pub mod directory;
pub mod discover;
pub mod selector;

pub use agones::{AgonesAllocatorConfig, AgonesAllocatorDirectory};
pub use directory::{DirectoryError, GameServerDirectory};
pub use discover::{DiscoverConfig, DiscoverDirectory};
pub use selector::{AllocationOutcome, AllocationSelector};
