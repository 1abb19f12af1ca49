//! TOML-based settings for the warehouse server.
//!
//! The server reads one file, `wms-server.toml` by default (override with
//! `--config` or the `WMS_CONFIG` environment variable).  Every field has a
//! default, so the file may be missing entirely or list only the values that
//! differ:
//!
//! ```toml
//! [server]
//! control_port = 9999
//! data_port = 0          # 0 disables the data-frame listener
//! idle_timeout_secs = 30
//!
//! [warehouse]
//! storage_capacity = 3
//!
//! [robot]
//! move_unit_ms = 500
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent.  Whole sections carry
//! `#[serde(default)]` so an empty file is a valid file.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use wms_core::{CyclingColorSensor, FrameVariant, RobotTimings, SectorStore};

use crate::application::dispatch::Warehouse;
use crate::application::robot_control::RobotController;

/// Error type for loading and validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error other than "not found".
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `bind_address` is not an IP address.
    #[error("invalid bind address {0:?}")]
    InvalidBindAddress(String),

    /// A value is out of range.
    #[error("invalid setting: {0}")]
    Invalid(String),
}

// ── Schema ────────────────────────────────────────────────────────────────────

/// Top-level settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerSettings {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub warehouse: WarehouseSection,
    #[serde(default)]
    pub robot: RobotSection,
}

/// Listener and connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// IP address both listeners bind to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Port for 7-byte control frames.  0 disables the listener.
    #[serde(default = "default_control_port")]
    pub control_port: u16,
    /// Port for 17-byte data frames.  0 disables the listener.
    #[serde(default = "default_data_port")]
    pub data_port: u16,
    /// A connection that sends nothing for this long is closed.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Live connections across both listeners.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WarehouseSection {
    /// Shelf capacity of each color storage sector.
    #[serde(default = "default_storage_capacity")]
    pub storage_capacity: u32,
    /// Sort received units into storage immediately.
    #[serde(default = "default_true")]
    pub auto_classify: bool,
}

/// Simulated motion durations, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RobotSection {
    #[serde(default = "default_move_unit_ms")]
    pub move_unit_ms: u64,
    #[serde(default = "default_default_move_ms")]
    pub default_move_ms: u64,
    #[serde(default = "default_operate_ms")]
    pub operate_ms: u64,
    #[serde(default = "default_actuator_test_ms")]
    pub actuator_test_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_control_port() -> u16 {
    9999
}
fn default_data_port() -> u16 {
    8100
}
fn default_idle_timeout_secs() -> u64 {
    30
}
fn default_max_connections() -> usize {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_storage_capacity() -> u32 {
    wms_core::domain::sector_store::DEFAULT_STORAGE_CAPACITY
}
fn default_true() -> bool {
    true
}
fn default_move_unit_ms() -> u64 {
    500
}
fn default_default_move_ms() -> u64 {
    1000
}
fn default_operate_ms() -> u64 {
    300
}
fn default_actuator_test_ms() -> u64 {
    200
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            control_port: default_control_port(),
            data_port: default_data_port(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_connections: default_max_connections(),
            log_level: default_log_level(),
        }
    }
}

impl Default for WarehouseSection {
    fn default() -> Self {
        Self {
            storage_capacity: default_storage_capacity(),
            auto_classify: default_true(),
        }
    }
}

impl Default for RobotSection {
    fn default() -> Self {
        Self {
            move_unit_ms: default_move_unit_ms(),
            default_move_ms: default_default_move_ms(),
            operate_ms: default_operate_ms(),
            actuator_test_ms: default_actuator_test_ms(),
        }
    }
}

// ── Derived values ────────────────────────────────────────────────────────────

impl ServerSettings {
    /// Checks values that deserialize fine but cannot be run.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidBindAddress`] or [`ConfigError::Invalid`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_ip()?;
        if self.server.control_port == 0 && self.server.data_port == 0 {
            return Err(ConfigError::Invalid(
                "both control_port and data_port are disabled".into(),
            ));
        }
        if self.server.control_port != 0 && self.server.control_port == self.server.data_port {
            return Err(ConfigError::Invalid(format!(
                "control_port and data_port are both {}",
                self.server.control_port
            )));
        }
        if self.server.idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid("idle_timeout_secs must be > 0".into()));
        }
        if self.server.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections must be > 0".into()));
        }
        if self.warehouse.storage_capacity == 0 {
            return Err(ConfigError::Invalid(
                "storage_capacity must be > 0; storage sectors are always bounded".into(),
            ));
        }
        Ok(())
    }

    fn bind_ip(&self) -> Result<IpAddr, ConfigError> {
        self.server
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.server.bind_address.clone()))
    }

    /// One `(variant, address)` pair per enabled listener.
    pub fn listen_addrs(&self) -> Result<Vec<(FrameVariant, SocketAddr)>, ConfigError> {
        let ip = self.bind_ip()?;
        Ok([
            (FrameVariant::Control, self.server.control_port),
            (FrameVariant::Data, self.server.data_port),
        ]
        .into_iter()
        .filter(|&(_, port)| port != 0)
        .map(|(variant, port)| (variant, SocketAddr::new(ip, port)))
        .collect())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.server.idle_timeout_secs)
    }

    pub fn robot_timings(&self) -> RobotTimings {
        RobotTimings {
            move_unit: Duration::from_millis(self.robot.move_unit_ms),
            default_move: Duration::from_millis(self.robot.default_move_ms),
            operate: Duration::from_millis(self.robot.operate_ms),
        }
    }

    /// Builds the shared warehouse described by these settings.
    pub fn build_warehouse(&self) -> Arc<Warehouse> {
        let robot = RobotController::new(
            self.robot_timings(),
            Duration::from_millis(self.robot.actuator_test_ms),
        );
        Arc::new(
            Warehouse::new(
                SectorStore::new(self.warehouse.storage_capacity),
                robot,
                Box::new(CyclingColorSensor::new()),
            )
            .with_auto_classify(self.warehouse.auto_classify),
        )
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Loads settings from `path`, returning defaults if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ServerSettings, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerSettings::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
