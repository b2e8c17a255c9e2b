//! Service layer
//!
//! This module contains the application state, service coordination, health
//! checks and background task management for both processes.

pub mod app;
pub mod health;

pub use app::{AppState, ServiceError};
pub use health::{HealthCheck, HealthStatus, ServiceMonitor, ServiceRole};
