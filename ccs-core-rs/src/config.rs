//! Environment-driven configuration.
//!
//! All replicas run from the same image, so everything node-specific comes
//! in through the environment: the node's own hostname, the shared service
//! name whose A records enumerate the cluster, and the protocol timings.

use crate::error::StartupError;
use std::path::PathBuf;
use std::time::Duration;

/// Election timeout bounds in milliseconds
pub const ELECTION_TIMEOUT_LOWER_MILLIS: u64 = 1500;
pub const ELECTION_TIMEOUT_UPPER_MILLIS: u64 = 3000;

/// Tick cadence for all role executors
pub const HEARTBEAT_REPEAT_MILLIS: u64 = 1000;

/// Default HTTP port, also used when addressing peers
pub const DEFAULT_PORT: u16 = 80;

/// Settings shared by the node and monitor binaries.
#[derive(Debug, Clone)]
pub struct Config {
    /// Own node id, resolvable by the peer DNS
    pub hostname: String,

    /// DNS name whose A records enumerate the cluster
    pub app_name: String,

    /// HTTP port served and dialed on every replica
    pub port: u16,

    /// Election timeout drawn uniformly from `[lower, upper]`
    pub election_timeout_lower: Duration,
    pub election_timeout_upper: Duration,

    /// Executor tick cadence; must stay below `election_timeout_lower`
    pub heartbeat_interval: Duration,

    /// Expected cluster size including self, checked against discovery
    pub num_replicas: Option<usize>,

    /// Payload programs invoked on role transitions
    pub script_leader_path: Option<PathBuf>,
    pub script_follower_path: Option<PathBuf>,
}

impl Config {
    /// Read configuration from the environment and validate it.
    pub fn from_env() -> Result<Self, StartupError> {
        let config = Self {
            hostname: require("HOSTNAME")?,
            app_name: require("APP_NAME")?,
            port: parse_or("PORT", DEFAULT_PORT)?,
            election_timeout_lower: Duration::from_millis(parse_or(
                "ELECTION_TIMEOUT_LOWER_MILLIS",
                ELECTION_TIMEOUT_LOWER_MILLIS,
            )?),
            election_timeout_upper: Duration::from_millis(parse_or(
                "ELECTION_TIMEOUT_UPPER_MILLIS",
                ELECTION_TIMEOUT_UPPER_MILLIS,
            )?),
            heartbeat_interval: Duration::from_millis(parse_or(
                "HEARTBEAT_REPEAT_MILLIS",
                HEARTBEAT_REPEAT_MILLIS,
            )?),
            num_replicas: maybe_parse("NUM_REPLICAS")?,
            script_leader_path: std::env::var("SCRIPT_LEADER_PATH").ok().map(PathBuf::from),
            script_follower_path: std::env::var("SCRIPT_FOLLOWER_PATH").ok().map(PathBuf::from),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the timing relations the protocol depends on.
    pub fn validate(&self) -> Result<(), StartupError> {
        if self.election_timeout_lower > self.election_timeout_upper {
            return Err(StartupError::TimeoutBoundsInverted {
                lower: self.election_timeout_lower,
                upper: self.election_timeout_upper,
            });
        }
        if self.heartbeat_interval >= self.election_timeout_lower {
            return Err(StartupError::HeartbeatTooSlow {
                heartbeat: self.heartbeat_interval,
                lower: self.election_timeout_lower,
            });
        }
        Ok(())
    }

    /// Per-call deadline for outbound RPCs, strictly below the tick.
    pub fn rpc_timeout(&self) -> Duration {
        self.heartbeat_interval / 3
    }
}

fn require(name: &'static str) -> Result<String, StartupError> {
    std::env::var(name).map_err(|_| StartupError::MissingEnv(name))
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, StartupError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| StartupError::InvalidEnv { name, value }),
        Err(_) => Ok(default),
    }
}

fn maybe_parse<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, StartupError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| StartupError::InvalidEnv { name, value }),
        Err(_) => Ok(None),
    }
}
