use cdp_core::{Application, ApplicationKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Configuration error
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    LoadError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// A statically configured peer
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PeerEntry {
    #[validate(length(min = 1))]
    pub fqdn: String,
    #[validate(length(min = 1))]
    pub realm: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Local address outbound connections bind to
    #[serde(default)]
    pub src_addr: Option<String>,
}

/// A listening socket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptorEntry {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub bind: Option<String>,
}

/// One route: a peer and its metric (lower is preferred)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteEntry {
    pub fqdn: String,
    #[serde(default)]
    pub metric: u32,
}

/// Routes for one realm
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RealmRoutes {
    pub realm: String,
    pub routes: Vec<RouteEntry>,
}

/// Realm routing table plus default routes
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RoutingConfig {
    #[serde(default)]
    pub realms: Vec<RealmRoutes>,
    #[serde(default)]
    pub default_routes: Vec<RouteEntry>,
}

/// Everything the peer engine consumes at startup
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_references"))]
pub struct DiameterConfig {
    #[validate(length(min = 1))]
    pub fqdn: String,
    #[validate(length(min = 1))]
    pub realm: String,
    /// Prefix of generated Session-Ids; the FQDN when empty
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub vendor_id: u32,
    #[serde(default = "default_product_name")]
    pub product_name: String,

    #[serde(default)]
    pub accept_unknown_peers: bool,
    #[serde(default = "default_true")]
    pub drop_unknown_on_disconnect: bool,

    /// Reconnect interval (Tc), also the wait-state timeout
    #[validate(range(min = 1))]
    #[serde(default = "default_tc")]
    pub tc_secs: u64,
    #[validate(range(min = 1))]
    #[serde(default = "default_tc")]
    pub watchdog_interval_secs: u64,

    #[validate(range(min = 1, max = 1024))]
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[validate(range(min = 1, max = 1_000_000))]
    #[serde(default = "default_queue_length")]
    pub queue_length: usize,
    /// A task queue put slower than this is logged
    #[serde(default = "default_queue_put_warn_ms")]
    pub queue_put_warn_ms: u64,

    #[validate(range(min = 1))]
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[validate(range(min = 1))]
    #[serde(default = "default_transaction_timeout")]
    pub transaction_timeout_secs: u64,
    #[validate(range(min = 10, max = 60_000))]
    #[serde(default = "default_timer_resolution_ms")]
    pub timer_resolution_ms: u64,
    #[validate(range(min = 64))]
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    #[validate(range(min = 1, max = 65_536))]
    #[serde(default = "default_sessions_hash_size")]
    pub sessions_hash_size: usize,
    #[serde(default = "default_auth_session_timeout")]
    pub default_auth_session_timeout: u32,
    #[serde(default = "default_max_auth_session_timeout")]
    pub max_auth_session_timeout: u32,

    #[validate(nested)]
    #[serde(default)]
    pub peers: Vec<PeerEntry>,
    #[serde(default)]
    pub acceptors: Vec<AcceptorEntry>,
    #[serde(default)]
    pub applications: Vec<Application>,
    #[serde(default)]
    pub supported_vendors: Vec<u32>,
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Extra XML dictionaries loaded at startup
    #[serde(default)]
    pub dictionaries: Vec<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Bind address of the HTTP management surface; disabled when unset
    #[serde(default)]
    pub management_addr: Option<String>,
}

fn default_port() -> u16 {
    3868
}
fn default_product_name() -> String {
    "cdp".to_string()
}
fn default_true() -> bool {
    true
}
fn default_tc() -> u64 {
    30
}
fn default_workers() -> usize {
    4
}
fn default_queue_length() -> usize {
    32
}
fn default_queue_put_warn_ms() -> u64 {
    100
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_transaction_timeout() -> u64 {
    5
}
fn default_timer_resolution_ms() -> u64 {
    1000
}
fn default_max_message_length() -> usize {
    cdp_core::codec::DEFAULT_MAX_MESSAGE_LENGTH
}
fn default_sessions_hash_size() -> usize {
    128
}
fn default_auth_session_timeout() -> u32 {
    60
}
fn default_max_auth_session_timeout() -> u32 {
    3600
}
fn default_log_level() -> String {
    "info".to_string()
}

fn validate_references(cfg: &DiameterConfig) -> Result<(), ValidationError> {
    if cfg.default_auth_session_timeout > cfg.max_auth_session_timeout {
        return Err(ValidationError::new("default_auth_session_timeout_above_max"));
    }

    let known: HashSet<String> = cfg.peers.iter().map(|p| p.fqdn.to_ascii_lowercase()).collect();
    let routes = cfg
        .routing
        .realms
        .iter()
        .flat_map(|r| r.routes.iter())
        .chain(cfg.routing.default_routes.iter());
    for route in routes {
        if !known.contains(&route.fqdn.to_ascii_lowercase()) {
            return Err(ValidationError::new("route_to_unknown_peer"));
        }
    }
    Ok(())
}

impl DiameterConfig {
    /// Minimal configuration for a node; everything else defaulted
    pub fn new(fqdn: &str, realm: &str) -> Self {
        Self {
            fqdn: fqdn.to_string(),
            realm: realm.to_string(),
            identity: String::new(),
            vendor_id: 0,
            product_name: default_product_name(),
            accept_unknown_peers: false,
            drop_unknown_on_disconnect: true,
            tc_secs: default_tc(),
            watchdog_interval_secs: default_tc(),
            workers: default_workers(),
            queue_length: default_queue_length(),
            queue_put_warn_ms: default_queue_put_warn_ms(),
            connect_timeout_secs: default_connect_timeout(),
            transaction_timeout_secs: default_transaction_timeout(),
            timer_resolution_ms: default_timer_resolution_ms(),
            max_message_length: default_max_message_length(),
            sessions_hash_size: default_sessions_hash_size(),
            default_auth_session_timeout: default_auth_session_timeout(),
            max_auth_session_timeout: default_max_auth_session_timeout(),
            peers: Vec::new(),
            acceptors: Vec::new(),
            applications: Vec::new(),
            supported_vendors: Vec::new(),
            routing: RoutingConfig::default(),
            dictionaries: Vec::new(),
            log_level: default_log_level(),
            management_addr: None,
        }
    }

    /// Session-Id prefix
    pub fn identity(&self) -> &str {
        if self.identity.is_empty() {
            &self.fqdn
        } else {
            &self.identity
        }
    }

    /// Configured applications of one kind
    pub fn applications_of(&self, kind: ApplicationKind) -> impl Iterator<Item = &Application> {
        self.applications.iter().filter(move |a| a.kind == kind)
    }
}

fn check<T: Validate>(config: T) -> Result<T, ConfigError> {
    config
        .validate()
        .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
    Ok(config)
}

/// Load configuration from file, with `CDP__`-prefixed environment overrides
pub fn load_config<T>(path: &str) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de> + Validate,
{
    let config: T = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(config::Environment::with_prefix("CDP").separator("__"))
        .build()
        .map_err(|e| ConfigError::LoadError(e.to_string()))?
        .try_deserialize()
        .map_err(|e| ConfigError::LoadError(e.to_string()))?;

    check(config)
}

/// Load configuration from YAML string
pub fn load_from_yaml<T>(yaml: &str) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de> + Validate,
{
    let config: T =
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::LoadError(e.to_string()))?;
    check(config)
}
