//! `adscollect-types` – shared vocabulary for the collector stack.
//!
//! Everything that crosses a crate boundary lives here: device addressing,
//! the two state enums observed on a controller, the control commands the
//! collector may issue, the configuration lookup seam, and the error types.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Addressing
// ─────────────────────────────────────────────────────────────────────────────

/// AMS port of the first PLC runtime on a controller.
pub const PLC_RUNTIME_PORT: u16 = 851;

/// Six-octet network identifier of a controller, e.g. `"5.12.34.56.1.1"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AmsNetId([u8; 6]);

impl AmsNetId {
    /// The identifier of the device the process runs on.
    pub const LOCAL: AmsNetId = AmsNetId([127, 0, 0, 1, 1, 1]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Resolve a configured identifier, falling back to [`AmsNetId::LOCAL`]
    /// when the value is absent or empty.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::InvalidAddress`] when a non-empty value is
    /// not six dotted octets.
    pub fn from_config(raw: Option<&str>) -> Result<Self, CollectorError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(Self::LOCAL),
            Some(s) => s.parse(),
        }
    }
}

impl Default for AmsNetId {
    fn default() -> Self {
        Self::LOCAL
    }
}

impl fmt::Display for AmsNetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a}.{b}.{c}.{d}.{e}.{g}")
    }
}

impl FromStr for AmsNetId {
    type Err = CollectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CollectorError::InvalidAddress(s.to_string());
        let mut octets = [0u8; 6];
        let mut parts = s.split('.');
        for slot in octets.iter_mut() {
            *slot = parts
                .next()
                .and_then(|p| p.parse::<u8>().ok())
                .ok_or_else(invalid)?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for AmsNetId {
    type Error = CollectorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AmsNetId> for String {
    fn from(id: AmsNetId) -> Self {
        id.to_string()
    }
}

/// A network identifier plus the port of one execution context on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AmsAddress {
    pub net_id: AmsNetId,
    pub port: u16,
}

impl AmsAddress {
    pub fn new(net_id: AmsNetId, port: u16) -> Self {
        Self { net_id, port }
    }

    /// Address of the PLC runtime on `net_id`.
    pub fn plc_runtime(net_id: AmsNetId) -> Self {
        Self::new(net_id, PLC_RUNTIME_PORT)
    }
}

impl fmt::Display for AmsAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.net_id, self.port)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session options
// ─────────────────────────────────────────────────────────────────────────────

/// Options applied when a transport session is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Deadline for the connect handshake.
    pub timeout: Duration,
    /// Write requests are acknowledged as soon as the router accepts them.
    pub fast_write_through: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            fast_write_through: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// States and commands
// ─────────────────────────────────────────────────────────────────────────────

/// Transport-level connection state reported by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ConnectionState {
    #[default]
    None = 0,
    Disconnected = 1,
    Connected = 2,
    Lost = 3,
}

impl ConnectionState {
    /// Decode a value stored with `as u8`. Unknown values read as `None`.
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Disconnected,
            2 => Self::Connected,
            3 => Self::Lost,
            _ => Self::None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Lost => "lost",
        };
        f.write_str(s)
    }
}

/// High-level run/stop status of a controller or one of its runtimes.
///
/// Read on demand and never cached beyond a single observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Init,
    Stopped,
    Running,
    /// The device reported an error, or the state query itself failed.
    Error,
    /// Any other raw device state (idle, reset, config, ...).
    Other(u16),
}

impl ExecutionState {
    const INIT: u16 = 3;
    const RUN: u16 = 5;
    const STOP: u16 = 6;
    const ERROR: u16 = 11;

    pub fn from_code(code: u16) -> Self {
        match code {
            Self::INIT => Self::Init,
            Self::RUN => Self::Running,
            Self::STOP => Self::Stopped,
            Self::ERROR => Self::Error,
            other => Self::Other(other),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            Self::Init => Self::INIT,
            Self::Running => Self::RUN,
            Self::Stopped => Self::STOP,
            Self::Error => Self::ERROR,
            Self::Other(code) => *code,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("init"),
            Self::Stopped => f.write_str("stopped"),
            Self::Running => f.write_str("running"),
            Self::Error => f.write_str("error"),
            Self::Other(code) => write!(f, "state({code})"),
        }
    }
}

/// State-transition request written to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlCommand {
    Start,
    Reset,
}

impl ControlCommand {
    /// Raw device state code carried by the control write.
    pub fn code(&self) -> u16 {
        match self {
            Self::Start => 4,
            Self::Reset => 2,
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Reset => f.write_str("reset"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration lookup
// ─────────────────────────────────────────────────────────────────────────────

/// Flat, colon-separated configuration lookup (`"AmsNetId"`, `"Keys:0"`, ...).
pub trait ConfigSource {
    /// Return the value stored under `key`, or `None` when it is absent.
    fn get(&self, key: &str) -> Option<String>;
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl ConfigSource for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        BTreeMap::get(self, key).cloned()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Failure reported by a device handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("handle is not connected")]
    NotConnected,

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("device unreachable: {0}")]
    Unreachable(String),

    /// The device answered with a non-succeeded result code.
    #[error("device returned error code {code:#x}")]
    Ads { code: u32 },

    #[error("operation cancelled")]
    Cancelled,
}

/// Top-level error for startup and configuration.
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Invalid AMS net id: {0:?}")]
    InvalidAddress(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Device Error: {0}")]
    Device(#[from] DeviceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn net_id_parses_and_displays() {
        let id: AmsNetId = "5.12.34.56.1.1".parse().unwrap();
        assert_eq!(id.octets(), [5, 12, 34, 56, 1, 1]);
        assert_eq!(id.to_string(), "5.12.34.56.1.1");
    }

    #[test]
    fn net_id_rejects_malformed_input() {
        for bad in ["", "1.2.3.4.5", "1.2.3.4.5.6.7", "1.2.3.4.5.256", "a.b.c.d.e.f"] {
            assert!(
                matches!(bad.parse::<AmsNetId>(), Err(CollectorError::InvalidAddress(_))),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn net_id_from_config_defaults_to_local() {
        assert_eq!(AmsNetId::from_config(None).unwrap(), AmsNetId::LOCAL);
        assert_eq!(AmsNetId::from_config(Some("")).unwrap(), AmsNetId::LOCAL);
        assert_eq!(AmsNetId::from_config(Some("  ")).unwrap(), AmsNetId::LOCAL);
        assert_eq!(
            AmsNetId::from_config(Some("10.0.0.7.1.1")).unwrap(),
            AmsNetId::new([10, 0, 0, 7, 1, 1])
        );
    }

    #[test]
    fn net_id_serializes_as_string() {
        let json = serde_json::to_string(&AmsNetId::LOCAL).unwrap();
        assert_eq!(json, "\"127.0.0.1.1.1\"");
        let back: AmsNetId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AmsNetId::LOCAL);
    }

    #[test]
    fn plc_runtime_address_uses_port_851() {
        let addr = AmsAddress::plc_runtime(AmsNetId::LOCAL);
        assert_eq!(addr.port, 851);
        assert_eq!(addr.to_string(), "127.0.0.1.1.1:851");
    }

    #[test]
    fn connection_state_u8_encoding() {
        for state in [
            ConnectionState::None,
            ConnectionState::Disconnected,
            ConnectionState::Connected,
            ConnectionState::Lost,
        ] {
            assert_eq!(ConnectionState::from_u8(state as u8), state);
        }
        assert_eq!(ConnectionState::from_u8(200), ConnectionState::None);
    }

    #[test]
    fn execution_state_codes() {
        assert_eq!(ExecutionState::from_code(5), ExecutionState::Running);
        assert_eq!(ExecutionState::from_code(6), ExecutionState::Stopped);
        assert_eq!(ExecutionState::from_code(3), ExecutionState::Init);
        assert_eq!(ExecutionState::from_code(11), ExecutionState::Error);
        assert_eq!(ExecutionState::from_code(15), ExecutionState::Other(15));
        assert_eq!(ExecutionState::Other(15).code(), 15);
        assert!(ExecutionState::Running.is_running());
        assert!(!ExecutionState::Init.is_running());
    }

    #[test]
    fn default_session_settings() {
        let settings = SessionSettings::default();
        assert_eq!(settings.timeout, Duration::from_secs(10));
        assert!(settings.fast_write_through);
    }

    #[test]
    fn config_source_for_maps() {
        let mut map = HashMap::new();
        map.insert("Keys:0".to_string(), "TagA".to_string());
        assert_eq!(ConfigSource::get(&map, "Keys:0").as_deref(), Some("TagA"));
        assert_eq!(ConfigSource::get(&map, "Keys:1"), None);
    }

    #[test]
    fn errors_display() {
        let err = CollectorError::from(DeviceError::Ads { code: 0x745 });
        assert!(err.to_string().contains("0x745"));
        assert!(DeviceError::NotConnected.to_string().contains("not connected"));
    }
}
