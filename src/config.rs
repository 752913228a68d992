//! Configuration for the osc-attitude receiver
//!
//! Loaded from a TOML file; every section and field is optional and falls
//! back to the rig defaults.
//!
//! ```toml
//! [link]
//! port = 9999
//! multicast_group = "239.255.0.1"
//! timeout_ms = 5000
//!
//! [fusion]
//! filter = "madgwick"
//! beta = 0.06
//!
//! [output]
//! display_interval_ms = 33
//!
//! [logging]
//! level = "info"
//! ```

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::link::{DEFAULT_MULTICAST_GROUP, DEFAULT_PORT, LinkSettings};
use crate::orchestrator::OrchestratorSettings;
use crate::types::FusionSettings;

/// Top-level application configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub link: LinkConfig,
    pub fusion: FusionSettings,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Network receive configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Interface address; resolved from the default route when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_address: Option<Ipv4Addr>,
    pub port: u16,
    /// Multicast group to join; absent means plain unicast
    pub multicast_group: Option<Ipv4Addr>,
    /// Silence before the link is reported lost
    pub timeout_ms: u64,
    pub max_datagram_size: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            local_address: None,
            port: DEFAULT_PORT,
            multicast_group: Some(DEFAULT_MULTICAST_GROUP),
            timeout_ms: 5000,
            max_datagram_size: 65536,
        }
    }
}

/// Presentation output configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Minimum spacing of rotation updates
    pub display_interval_ms: u64,
    /// Encoder ticks per full turn
    pub encoder_ticks_per_turn: f32,
    /// Divisor applied to raw accelerometer readings (9.81 for m/s²)
    pub accelerometer_divisor: f32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            display_interval_ms: 33,
            encoder_ticks_per_turn: 30.0,
            accelerometer_divisor: 9.81,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use osc_attitude::config::AppConfig;
    ///
    /// let config = AppConfig::from_file("osc-attitude.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate a TOML document
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the pipeline misbehave
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fusion = &self.fusion;
        if !(0.0..=1.0).contains(&fusion.alpha) {
            return Err(invalid("fusion.alpha", "must lie in [0, 1]"));
        }
        if fusion.beta.is_nan() || fusion.beta < 0.0 {
            return Err(invalid("fusion.beta", "must be non-negative"));
        }
        if !positive(fusion.fallback_dt) {
            return Err(invalid("fusion.fallback_dt", "must be positive"));
        }
        if !positive(fusion.max_dt) {
            return Err(invalid("fusion.max_dt", "must be positive"));
        }
        if self.link.timeout_ms == 0 {
            return Err(invalid("link.timeout_ms", "must be positive"));
        }
        if self.link.max_datagram_size == 0 {
            return Err(invalid("link.max_datagram_size", "must be positive"));
        }
        if !positive(self.output.encoder_ticks_per_turn) {
            return Err(invalid("output.encoder_ticks_per_turn", "must be positive"));
        }
        if self.output.accelerometer_divisor == 0.0 {
            return Err(invalid("output.accelerometer_divisor", "must be non-zero"));
        }
        Ok(())
    }

    /// Link settings, resolving the local address when none is configured
    pub fn link_settings(&self) -> Result<LinkSettings, ConfigError> {
        let local_address = match self.link.local_address {
            Some(addr) => addr,
            None => resolve_local_address()?,
        };
        Ok(LinkSettings {
            local_address,
            port: self.link.port,
            multicast_group: self.link.multicast_group,
            timeout: Duration::from_millis(self.link.timeout_ms),
            max_datagram_size: self.link.max_datagram_size,
        })
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            accelerometer_divisor: self.output.accelerometer_divisor,
            display_interval: Duration::from_millis(self.output.display_interval_ms),
            encoder_ticks_per_turn: self.output.encoder_ticks_per_turn,
        }
    }
}

fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

/// IPv4 address of the interface carrying the default route
///
/// Connecting a UDP socket sends nothing; it only makes the kernel pick the
/// outgoing interface.
pub fn resolve_local_address() -> Result<Ipv4Addr, ConfigError> {
    let probe = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))?;
    probe
        .connect(SocketAddr::from((Ipv4Addr::new(192, 0, 2, 1), 9)))
        .map_err(|err| {
            log::debug!("No default route: {}", err);
            ConfigError::NoLocalAddress
        })?;

    match probe.local_addr()?.ip() {
        IpAddr::V4(addr) if !addr.is_loopback() && !addr.is_unspecified() => Ok(addr),
        other => {
            log::debug!("Default route resolves to unusable address {}", other);
            Err(ConfigError::NoLocalAddress)
        }
    }
}
