//! Match function: packs pool tickets into match proposals
//!
//! The packer is pure; the service wires it to the query service and the
//! server exposes it to the Open Match backend.

pub mod packer;
pub mod server;
pub mod service;

pub use packer::{pack, MATCH_FUNCTION_NAME};
pub use server::{MatchFunctionServer, MatchFunctionServerConfig};
pub use service::{MatchFunctionService, MatchMaker, PlayerCapacityMatchMaker};
