//! Main application configuration
//!
//! Configuration structures for the director, the match function and the
//! player simulator, including environment variable and TOML file loading.

use crate::allocator::{AgonesAllocatorConfig, DiscoverConfig};
use crate::director::DirectorConfig;
use crate::matchfunction::MatchFunctionServerConfig;
use crate::openmatch::{FunctionConfig, FunctionType, OpenMatchEndpoint};
use crate::simulator::SimulatorConfig;
use crate::utils::parse_duration;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub openmatch: OpenMatchSettings,
    pub director: DirectorSettings,
    pub discover: DiscoverSettings,
    pub agones: AgonesAllocatorConfig,
    pub function: FunctionSettings,
    pub simulator: SimulatorSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for health check and metrics endpoints
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Open Match component addresses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenMatchSettings {
    pub backend_addr: String,
    pub query_service_addr: String,
    pub frontend_addr: String,
    /// Host the backend uses to reach the match function
    pub match_function_host: String,
    pub match_function_port: u16,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

/// Director loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorSettings {
    /// Tick interval, e.g. `5s` or `1m30s`
    pub interval: String,
    pub fetch_timeout_ms: u64,
    pub grace_period_ms: u64,
    pub mode: AllocatorMode,
}

/// Where game servers come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocatorMode {
    /// Read-only listing from the discover HTTP API
    Discover,
    /// Allocation through the Agones allocator service
    Agones,
}

impl fmt::Display for AllocatorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocatorMode::Discover => write!(f, "discover"),
            AllocatorMode::Agones => write!(f, "agones"),
        }
    }
}

impl FromStr for AllocatorMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "discover" => Ok(AllocatorMode::Discover),
            "agones" => Ok(AllocatorMode::Agones),
            _ => Err(anyhow!("Invalid allocator mode: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverSettings {
    pub url: String,
    pub timeout_ms: u64,
}

/// Match function server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionSettings {
    pub host: String,
    pub port: u16,
    pub player_capacity: i64,
}

/// Player simulator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSettings {
    pub interval: String,
    pub players_pool: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service: ServiceSettings::default(),
            openmatch: OpenMatchSettings::default(),
            director: DirectorSettings::default(),
            discover: DiscoverSettings::default(),
            agones: AgonesAllocatorConfig {
                host: "0.0.0.0".to_string(),
                port: 443,
                namespace: "default".to_string(),
                ..Default::default()
            },
            function: FunctionSettings::default(),
            simulator: SimulatorSettings::default(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "match-director".to_string(),
            log_level: "info".to_string(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for OpenMatchSettings {
    fn default() -> Self {
        Self {
            backend_addr: "open-match-backend.open-match.svc.cluster.local:51505".to_string(),
            query_service_addr: "open-match-query.open-match.svc.cluster.local:51503".to_string(),
            frontend_addr: "open-match-frontend.open-match.svc.cluster.local:51504".to_string(),
            match_function_host: "agones-openmatch-mmf.default.svc.cluster.local".to_string(),
            match_function_port: 50502,
            connect_timeout_ms: 5000,
            request_timeout_ms: 10000,
        }
    }
}

impl Default for DirectorSettings {
    fn default() -> Self {
        Self {
            interval: "5s".to_string(),
            fetch_timeout_ms: 1000,
            grace_period_ms: 1000,
            mode: AllocatorMode::Discover,
        }
    }
}

impl Default for DiscoverSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:8081".to_string(),
            timeout_ms: 5000,
        }
    }
}

impl Default for FunctionSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 50502,
            player_capacity: 10,
        }
    }
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            interval: "5s".to_string(),
            players_pool: 10,
        }
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("Invalid {} value: {}", name, value))
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load a TOML file, then let environment variables override it
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Parse TOML; sections left out keep their defaults
    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(port) = env::var("HEALTH_PORT") {
            self.service.health_port = parse_var("HEALTH_PORT", &port)?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            self.service.shutdown_timeout_seconds = parse_var("SHUTDOWN_TIMEOUT_SECONDS", &timeout)?;
        }

        // Open Match settings
        if let Ok(addr) = env::var("OPENMATCH_BACKEND_ADDR") {
            self.openmatch.backend_addr = addr;
        }
        if let Ok(addr) = env::var("OPENMATCH_QUERY_SERVICE_ADDR") {
            self.openmatch.query_service_addr = addr;
        }
        if let Ok(addr) = env::var("OPENMATCH_FRONTEND_ADDR") {
            self.openmatch.frontend_addr = addr;
        }
        if let Ok(host) = env::var("OPENMATCH_MATCH_FUNCTION_HOST") {
            self.openmatch.match_function_host = host;
        }
        if let Ok(port) = env::var("OPENMATCH_MATCH_FUNCTION_PORT") {
            self.openmatch.match_function_port = parse_var("OPENMATCH_MATCH_FUNCTION_PORT", &port)?;
        }

        // Director settings
        if let Ok(interval) = env::var("DIRECTOR_INTERVAL") {
            self.director.interval = interval;
        }
        if let Ok(timeout) = env::var("DIRECTOR_FETCH_TIMEOUT_MS") {
            self.director.fetch_timeout_ms = parse_var("DIRECTOR_FETCH_TIMEOUT_MS", &timeout)?;
        }
        if let Ok(grace) = env::var("DIRECTOR_GRACE_PERIOD_MS") {
            self.director.grace_period_ms = parse_var("DIRECTOR_GRACE_PERIOD_MS", &grace)?;
        }
        if let Ok(mode) = env::var("DIRECTOR_MODE") {
            self.director.mode = mode.parse()?;
        }
        if let Ok(url) = env::var("DISCOVER_URL") {
            self.discover.url = url;
        }

        // Agones allocator settings
        if let Ok(key) = env::var("AGONES_KEY_FILE") {
            self.agones.key_file = key;
        }
        if let Ok(cert) = env::var("AGONES_CERT_FILE") {
            self.agones.cert_file = cert;
        }
        if let Ok(ca) = env::var("AGONES_CA_CERT_FILE") {
            self.agones.ca_cert_file = ca;
        }
        if let Ok(host) = env::var("AGONES_ALLOCATOR_HOST") {
            self.agones.host = host;
        }
        if let Ok(port) = env::var("AGONES_ALLOCATOR_PORT") {
            self.agones.port = parse_var("AGONES_ALLOCATOR_PORT", &port)?;
        }
        if let Ok(namespace) = env::var("AGONES_NAMESPACE") {
            self.agones.namespace = namespace;
        }
        if let Ok(multi) = env::var("AGONES_MULTI_CLUSTER") {
            self.agones.multi_cluster = parse_var("AGONES_MULTI_CLUSTER", &multi)?;
        }

        // Match function settings
        if let Ok(capacity) = env::var("MATCH_FUNCTION_PLAYER_CAPACITY") {
            self.function.player_capacity = parse_var("MATCH_FUNCTION_PLAYER_CAPACITY", &capacity)?;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    pub fn backend_endpoint(&self) -> OpenMatchEndpoint {
        self.endpoint(&self.openmatch.backend_addr)
    }

    pub fn query_endpoint(&self) -> OpenMatchEndpoint {
        self.endpoint(&self.openmatch.query_service_addr)
    }

    pub fn frontend_endpoint(&self) -> OpenMatchEndpoint {
        self.endpoint(&self.openmatch.frontend_addr)
    }

    fn endpoint(&self, addr: &str) -> OpenMatchEndpoint {
        OpenMatchEndpoint {
            connect_timeout_ms: self.openmatch.connect_timeout_ms,
            request_timeout_ms: self.openmatch.request_timeout_ms,
            ..OpenMatchEndpoint::new(addr)
        }
    }

    /// Where the backend should send match function calls
    pub fn function_config(&self) -> FunctionConfig {
        FunctionConfig {
            host: self.openmatch.match_function_host.clone(),
            port: self.openmatch.match_function_port,
            function_type: FunctionType::Rest,
        }
    }

    pub fn director_config(&self) -> DirectorConfig {
        DirectorConfig {
            interval: self.director.interval.clone(),
            fetch_timeout: Duration::from_millis(self.director.fetch_timeout_ms),
            grace_period: Duration::from_millis(self.director.grace_period_ms),
        }
    }

    pub fn discover_config(&self) -> DiscoverConfig {
        DiscoverConfig {
            url: self.discover.url.clone(),
            timeout_ms: self.discover.timeout_ms,
        }
    }

    pub fn match_function_server_config(&self) -> MatchFunctionServerConfig {
        MatchFunctionServerConfig {
            host: self.function.host.clone(),
            port: self.function.port,
        }
    }

    pub fn simulator_config(&self) -> SimulatorConfig {
        SimulatorConfig {
            interval: self.simulator.interval.clone(),
            players_pool: self.simulator.players_pool,
        }
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate ports
    if config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }
    if config.function.port == 0 || config.openmatch.match_function_port == 0 {
        return Err(anyhow!("Match function port cannot be 0"));
    }

    // Validate timeouts
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.director.fetch_timeout_ms == 0 {
        return Err(anyhow!("Director fetch timeout must be greater than 0"));
    }

    // Validate intervals
    for (name, value) in [
        ("director", &config.director.interval),
        ("simulator", &config.simulator.interval),
    ] {
        let interval = parse_duration(value).map_err(|e| anyhow!("Invalid {} interval: {}", name, e))?;
        if interval.is_zero() {
            return Err(anyhow!("The {} interval must be greater than 0", name));
        }
    }

    // Validate Open Match addresses
    if config.openmatch.backend_addr.is_empty() {
        return Err(anyhow!("Open Match backend address cannot be empty"));
    }
    if config.openmatch.match_function_host.is_empty() {
        return Err(anyhow!("Match function host cannot be empty"));
    }

    // Validate match function settings
    if config.function.player_capacity <= 0 {
        return Err(anyhow!("Player capacity must be greater than 0"));
    }

    // Validate allocator settings
    match config.director.mode {
        AllocatorMode::Discover => {
            if config.discover.url.is_empty() {
                return Err(anyhow!("Discover URL cannot be empty"));
            }
        }
        AllocatorMode::Agones => config.agones.validate()?,
    }

    Ok(())
}
