//! Configuration file support for ratewatchd
//!
//! Loads and validates the daemon configuration from a TOML file.
//! Default location: /etc/ratewatchd/ratewatchd.toml
//!
//! The trigger handler section accepts two shapes, resolved once at load
//! time into a [`HandlerTable`]:
//!
//! ```toml
//! [trigger]
//! script = "/usr/local/bin/on-alert"
//! levels = ["WARNING", "CRITICAL", "OK"]
//! ```
//!
//! ```toml
//! [trigger.scripts]
//! CRITICAL = "/usr/local/bin/critical"
//! OK = "/usr/local/bin/recovered"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{RatewatchError, Result};
use crate::rate::{Direction, RateSettings};
use crate::status::{Severity, Thresholds};
use crate::trigger::HandlerTable;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ratewatchd/ratewatchd.toml";

/// Standard sFlow collector port
pub const DEFAULT_SFLOW_PORT: u16 = 6343;

/// Longest accepted OK recovery delay (one day)
pub const MAX_OK_DELAY_SECS: u64 = 86_400;

/// Trigger handler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerConfig {
    /// One script per severity, keyed by severity name
    PerSeverity { scripts: BTreeMap<String, PathBuf> },
    /// One script for every listed severity
    Single {
        script: PathBuf,
        #[serde(default = "default_levels")]
        levels: Vec<Severity>,
    },
}

impl TriggerConfig {
    /// Resolves into the uniform lookup used at dispatch time
    pub fn handlers(&self) -> Result<HandlerTable> {
        match self {
            TriggerConfig::PerSeverity { scripts } => {
                let resolved = scripts
                    .iter()
                    .map(|(level, path)| Ok((level.parse::<Severity>()?, path.clone())))
                    .collect::<Result<Vec<_>>>()?;
                Ok(HandlerTable::per_severity(resolved))
            }
            TriggerConfig::Single { script, levels } => {
                Ok(HandlerTable::single(script.clone(), levels))
            }
        }
    }
}

/// Complete ratewatchd configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatewatchConfig {
    /// Interface label used in output and handler environment
    #[serde(default = "default_interface")]
    pub interface: String,

    /// sFlow ifIndex to track; the first reporting interface when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_index: Option<u32>,

    /// Address the collector socket binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// UDP port the collector listens on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Counter direction feeding the rates
    #[serde(default)]
    pub direction: Direction,

    /// History length in samples
    #[serde(default = "default_window")]
    pub window: usize,

    /// Rate multiplier compensating sampling bias
    #[serde(default = "default_bias")]
    pub bias: f64,

    /// Spike guard factor; 0 disables
    #[serde(default)]
    pub spike_factor: f64,

    /// Seconds a return to OK must hold before the OK handler fires
    #[serde(default = "default_ok_delay")]
    pub ok_delay_secs: u64,

    /// Seconds without datagrams before the feed is reported stale
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    /// Append-only log of fired triggers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_log: Option<PathBuf>,

    #[serde(default)]
    pub thresholds: Thresholds,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerConfig>,
}

// Default functions
fn default_interface() -> String {
    "eth0".to_string()
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    DEFAULT_SFLOW_PORT
}

fn default_window() -> usize {
    60
}

fn default_bias() -> f64 {
    1.0
}

fn default_ok_delay() -> u64 {
    30
}

fn default_stale_after() -> u64 {
    5
}

fn default_levels() -> Vec<Severity> {
    Severity::ALL.to_vec()
}

impl Default for RatewatchConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            interface_index: None,
            bind_address: default_bind_address(),
            port: default_port(),
            direction: Direction::default(),
            window: default_window(),
            bias: default_bias(),
            spike_factor: 0.0,
            ok_delay_secs: default_ok_delay(),
            stale_after_secs: default_stale_after(),
            trigger_log: None,
            thresholds: Thresholds::default(),
            trigger: None,
        }
    }
}

impl RatewatchConfig {
    /// Parses configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| RatewatchError::config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content).map_err(|e| {
                RatewatchError::config(format!("{}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(RatewatchError::Io(e)),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> Result<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Socket address the collector binds to
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Get OK recovery delay as Duration
    pub fn ok_delay(&self) -> Duration {
        Duration::from_secs(self.ok_delay_secs)
    }

    /// Get staleness timeout as Duration
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    /// Rate engine settings derived from this configuration
    pub fn rate_settings(&self) -> RateSettings {
        RateSettings {
            bias: self.bias,
            spike_factor: self.spike_factor,
            direction: self.direction,
        }
    }

    /// Resolved trigger handlers; empty when no trigger is configured
    pub fn handlers(&self) -> Result<HandlerTable> {
        match &self.trigger {
            Some(trigger) => trigger.handlers(),
            None => Ok(HandlerTable::default()),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(RatewatchError::config("port must be > 0"));
        }

        if self.window == 0 {
            return Err(RatewatchError::config("window must be > 0"));
        }

        if !self.bias.is_finite() || self.bias <= 0.0 {
            return Err(RatewatchError::config("bias must be a positive number"));
        }

        if !self.spike_factor.is_finite() || self.spike_factor < 0.0 {
            return Err(RatewatchError::config("spike_factor must be >= 0"));
        }

        if self.ok_delay_secs > MAX_OK_DELAY_SECS {
            return Err(RatewatchError::config(format!(
                "ok_delay_secs must be <= {}",
                MAX_OK_DELAY_SECS
            )));
        }

        for (name, value) in [
            ("thresholds.pps", self.thresholds.pps),
            ("thresholds.mbps", self.thresholds.mbps),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(RatewatchError::config(format!("{} must be >= 0", name)));
            }
        }

        if let Some(TriggerConfig::Single { levels, .. }) = &self.trigger {
            if levels.is_empty() {
                return Err(RatewatchError::config("trigger.levels must not be empty"));
            }
        }

        self.handlers()?;

        Ok(())
    }
}
