use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use tracing::trace;

use crate::probe::http::DEFAULT_ONLINE_POINTER;
use crate::service::ProtocolVariant;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./samples.db")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub servers: Vec<ServiceConfig>,

    #[serde(default)]
    pub rates: Rates,

    /// Length of the rolling graph window
    #[serde(default = "default_graph_duration_ms")]
    pub graph_duration_ms: u64,

    /// Upper bound on retained points per graph window
    #[serde(default = "default_graph_max_points")]
    pub graph_max_points: u64,

    /// Persist every round's raw samples
    #[serde(default)]
    pub log_to_database: bool,

    #[serde(default = "default_true")]
    pub log_failed_pings: bool,

    /// Storage configuration (optional - defaults to SQLite)
    pub storage: Option<StorageConfig>,

    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Rates {
    /// Cadence of polling rounds
    #[serde(default = "default_ping_all_ms")]
    pub ping_all_ms: u64,

    /// Per-probe timeout
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for Rates {
    fn default() -> Self {
        Self {
            ping_all_ms: default_ping_all_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub address: String,

    /// Variants cycled through round by round
    #[serde(default)]
    pub protocol_variants: Vec<ProtocolVariant>,

    /// JSON pointer to the occupancy value in the status response
    #[serde(default = "default_online_pointer")]
    pub online_pointer: String,

    pub favicon_pointer: Option<String>,
}

fn default_ping_all_ms() -> u64 {
    3_000
}

fn default_connect_timeout_ms() -> u64 {
    2_500
}

fn default_graph_duration_ms() -> u64 {
    24 * 60 * 60 * 1000
}

fn default_graph_max_points() -> u64 {
    1_440
}

fn default_broadcast_capacity() -> usize {
    64
}

fn default_online_pointer() -> String {
    DEFAULT_ONLINE_POINTER.to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        let config: Config = serde_json::from_str(s)
            .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.servers.is_empty(), "servers must not be empty");

        let mut names = HashSet::new();
        for server in &self.servers {
            anyhow::ensure!(!server.name.is_empty(), "server names must be non-empty");
            anyhow::ensure!(
                names.insert(server.name.as_str()),
                "duplicate server name: {}",
                server.name
            );
            anyhow::ensure!(
                server.online_pointer.is_empty() || server.online_pointer.starts_with('/'),
                "{}: online_pointer must be a JSON pointer, got {}",
                server.name,
                server.online_pointer
            );
        }

        anyhow::ensure!(
            self.rates.ping_all_ms > 0,
            "rates.ping_all_ms must be > 0, got {}",
            self.rates.ping_all_ms
        );
        anyhow::ensure!(
            self.rates.connect_timeout_ms > 0,
            "rates.connect_timeout_ms must be > 0, got {}",
            self.rates.connect_timeout_ms
        );
        anyhow::ensure!(
            self.graph_duration_ms > 0 && self.graph_duration_ms <= i64::MAX as u64,
            "graph_duration_ms must be > 0, got {}",
            self.graph_duration_ms
        );
        anyhow::ensure!(
            self.graph_max_points > 0 && self.graph_max_points <= i64::MAX as u64,
            "graph_max_points must be > 0, got {}",
            self.graph_max_points
        );
        anyhow::ensure!(
            self.broadcast_capacity > 0,
            "broadcast_capacity must be > 0, got {}",
            self.broadcast_capacity
        );
        Ok(())
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.rates.ping_all_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.rates.connect_timeout_ms)
    }

    pub fn graph_duration_ms(&self) -> i64 {
        self.graph_duration_ms as i64
    }

    pub fn graph_max_points(&self) -> i64 {
        self.graph_max_points as i64
    }

    /// Whether raw samples should be written at all
    ///
    /// The `none` backend keeps nothing, so `log_to_database` is moot there.
    pub fn persists_samples(&self) -> bool {
        self.log_to_database && !matches!(self.storage, Some(StorageConfig::None))
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    Config::from_json(&file_content).inspect(|config| trace!("loaded config: {config:?}"))
}
