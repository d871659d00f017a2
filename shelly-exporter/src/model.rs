//! Partial records for the Shelly Gen2 RPC responses.
//!
//! Every field the device may leave out is an `Option`. Whether a missing
//! field is tolerated or fatal is decided by the renderer, through
//! [`required`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

/// Switch and input channels polled on every device.
pub const CHANNELS: [u8; 2] = [0, 1];

/// A device address, `host` or `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Target(String);

impl Target {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a comma-separated list, ignoring blank entries.
    pub fn parse_list(list: &str) -> Vec<Target> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Target::new)
            .collect()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Target {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// `Switch.GetStatus` response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SwitchStatus {
    /// Channel number; the client overwrites it with the channel it asked for.
    #[serde(default)]
    pub id: u8,
    pub output: Option<bool>,
    pub apower: Option<f64>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub pf: Option<f64>,
    pub aenergy: Option<EnergyCounter>,
    pub temperature: Option<Temperature>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Cumulative energy counter of a switch channel.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EnergyCounter {
    /// Total energy in watt-hours.
    pub total: Option<f64>,
}

/// Internal temperature of a switch channel.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Temperature {
    #[serde(rename = "tC")]
    pub celsius: Option<f64>,
    #[serde(rename = "tF")]
    pub fahrenheit: Option<f64>,
}

/// `Input.GetStatus` response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InputStatus {
    #[serde(default)]
    pub id: u8,
    pub state: Option<bool>,
}

/// `Sys.GetStatus` response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SysStatus {
    pub mac: Option<String>,
    pub restart_required: Option<bool>,
    pub uptime: Option<u64>,
    pub ram_size: Option<u64>,
    pub ram_free: Option<u64>,
    pub fs_size: Option<u64>,
    pub fs_free: Option<u64>,
}

/// `Shelly.GetDeviceInfo` response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeviceInfo {
    pub id: Option<String>,
    pub model: Option<String>,
    #[serde(rename = "gen")]
    pub generation: Option<u32>,
    pub fw_id: Option<String>,
    pub ver: Option<String>,
    pub app: Option<String>,
    pub profile: Option<String>,
}

/// Everything fetched from one device during a scrape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceSnapshot {
    pub switches: Vec<SwitchStatus>,
    pub inputs: Vec<InputStatus>,
    pub sys: SysStatus,
    pub info: DeviceInfo,
}

/// Unwrap a field the exporter cannot do without.
pub fn required<T>(
    value: Option<T>,
    document: &'static str,
    field: &'static str,
) -> Result<T, DeviceError> {
    value.ok_or(DeviceError::MissingField { document, field })
}
