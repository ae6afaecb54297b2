// MIT License - Copyright (c) 2026 Peter Wright
// Panel families, per-family status tables and connection configuration

use std::fmt;

use crate::constants::{BG_AREA_STATUS, COMPACT_AREA_STATUS, DEFAULT_PORT};
use crate::devices::area::AreaStatus;
use crate::supervisor::ReconnectPolicy;
use crate::transport::auth::Credentials;

/// Panel product family. Determines the credentials form, the raw status
/// codes and which optional queries are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelFamily {
    /// Solution 2000/3000/4000: user code
    Solution,
    /// AMAX 2100/3000/4000: installer code + password
    Amax,
    /// B3512/B4512/B5512: automation passcode
    BSeries,
    /// B8512G/B9512G and GV4 panels: automation passcode
    GSeries,
}

impl PanelFamily {
    /// Family for a model code reported in the authentication challenge.
    pub fn from_model_code(code: u8) -> Option<Self> {
        match code {
            0x20 | 0x21 | 0x25 => Some(Self::Solution),
            0x22..=0x24 => Some(Self::Amax),
            0xA0 | 0xA4 | 0xA8 => Some(Self::BSeries),
            0x79 | 0x84 | 0xA6 | 0xA7 => Some(Self::GSeries),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Solution => "Solution",
            Self::Amax => "AMAX",
            Self::BSeries => "B Series",
            Self::GSeries => "G Series",
        }
    }

    /// Parse a family name as written in configuration files.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "solution" => Some(Self::Solution),
            "amax" => Some(Self::Amax),
            "b" | "bseries" | "b_series" | "b-series" => Some(Self::BSeries),
            "g" | "gseries" | "g_series" | "g-series" => Some(Self::GSeries),
            _ => None,
        }
    }

    /// Raw code tables used by this family, resolved once per connection.
    pub fn status_map(&self) -> StatusMap {
        match self {
            Self::Solution | Self::Amax => StatusMap {
                area_statuses: &COMPACT_AREA_STATUS,
                disarm: 0x01,
                arm_all: 0x02,
                arm_part: 0x03,
            },
            Self::BSeries | Self::GSeries => StatusMap {
                area_statuses: &BG_AREA_STATUS,
                disarm: 0x01,
                arm_all: 0x03,
                arm_part: 0x04,
            },
        }
    }

    /// Only B and G series panels report a serial number.
    pub fn supports_serial_number(&self) -> bool {
        matches!(self, Self::BSeries | Self::GSeries)
    }

    /// Default number of history entries retained.
    pub fn default_history_capacity(&self) -> usize {
        match self {
            Self::Solution | Self::Amax => 255,
            Self::BSeries | Self::GSeries => 1024,
        }
    }
}

impl fmt::Display for PanelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested arming transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmType {
    Disarm,
    /// Full/away arm
    Away,
    /// Partial/home arm
    Home,
}

impl ArmType {
    /// Whether an area in `status` already satisfies this request.
    pub fn satisfied_by(&self, status: AreaStatus) -> bool {
        match self {
            Self::Disarm => status == AreaStatus::Disarmed,
            Self::Away => status == AreaStatus::AllArmed,
            Self::Home => status == AreaStatus::PartArmed,
        }
    }
}

/// Per-family mapping between raw codes and logical states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMap {
    area_statuses: &'static [(u8, AreaStatus)],
    disarm: u8,
    arm_all: u8,
    arm_part: u8,
}

impl StatusMap {
    pub fn area_status(&self, raw: u8) -> Option<AreaStatus> {
        self.area_statuses
            .iter()
            .find(|(code, _)| *code == raw)
            .map(|(_, status)| *status)
    }

    /// First raw code mapping to `status`, used by test doubles and encoders.
    pub fn raw_area_status(&self, status: AreaStatus) -> Option<u8> {
        self.area_statuses
            .iter()
            .find(|(_, s)| *s == status)
            .map(|(code, _)| *code)
    }

    pub fn arm_code(&self, arm_type: ArmType) -> u8 {
        match arm_type {
            ArmType::Disarm => self.disarm,
            ArmType::Away => self.arm_all,
            ArmType::Home => self.arm_part,
        }
    }
}

/// Optional code that arm/disarm requests must carry.
#[derive(Clone, PartialEq, Eq)]
pub struct ArmingCode(String);

impl ArmingCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn verify(&self, supplied: Option<&str>) -> bool {
        supplied == Some(self.0.as_str())
    }
}

impl fmt::Debug for ArmingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ArmingCode(****)")
    }
}

/// Configuration for connecting to a Bosch panel.
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Panel host name or IP address
    pub host: String,
    /// Mode 2 automation port (default: 7700)
    pub port: u16,
    /// Wrap the connection in TLS (default: true)
    pub use_tls: bool,
    /// Expected family; overridden by what the panel reports
    pub family: Option<PanelFamily>,
    pub credentials: Credentials,
    /// Code required by arm/disarm requests, if any
    pub arming_code: Option<ArmingCode>,
    /// TCP + TLS + handshake timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Per-command response timeout in milliseconds
    pub command_timeout_ms: u64,
    /// History entries retained; family default when unset
    pub history_capacity: Option<usize>,
    /// Capacity of the panel event broadcast channel
    pub event_capacity: usize,
    pub reconnect: ReconnectPolicy,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.100".to_string(),
            port: DEFAULT_PORT,
            use_tls: true,
            family: None,
            credentials: Credentials::Passcode(String::new()),
            arming_code: None,
            connect_timeout_ms: 10000,
            command_timeout_ms: 5000,
            history_capacity: None,
            event_capacity: 256,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl PanelConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> PanelConfigBuilder {
        PanelConfigBuilder::default()
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for PanelConfig.
#[derive(Debug, Clone, Default)]
pub struct PanelConfigBuilder {
    config: PanelConfig,
}

impl PanelConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn use_tls(mut self, use_tls: bool) -> Self {
        self.config.use_tls = use_tls;
        self
    }

    pub fn family(mut self, family: PanelFamily) -> Self {
        self.config.family = Some(family);
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.config.credentials = credentials;
        self
    }

    pub fn arming_code(mut self, code: impl Into<String>) -> Self {
        self.config.arming_code = Some(ArmingCode::new(code));
        self
    }

    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    pub fn command_timeout_ms(mut self, ms: u64) -> Self {
        self.config.command_timeout_ms = ms;
        self
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.config.history_capacity = Some(capacity);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = policy;
        self
    }

    pub fn build(self) -> PanelConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_from_model_code() {
        assert_eq!(PanelFamily::from_model_code(0x21), Some(PanelFamily::Solution));
        assert_eq!(PanelFamily::from_model_code(0x23), Some(PanelFamily::Amax));
        assert_eq!(PanelFamily::from_model_code(0xA4), Some(PanelFamily::BSeries));
        assert_eq!(PanelFamily::from_model_code(0xA7), Some(PanelFamily::GSeries));
        assert_eq!(PanelFamily::from_model_code(0x00), None);
    }

    #[test]
    fn test_status_maps_differ_per_family() {
        let compact = PanelFamily::Solution.status_map();
        let bg = PanelFamily::BSeries.status_map();

        assert_eq!(compact.area_status(0x01), Some(AreaStatus::Disarmed));
        assert_eq!(bg.area_status(0x01), Some(AreaStatus::AllArmed));
        assert_eq!(bg.area_status(0x08), Some(AreaStatus::Disarmed));
        assert_eq!(compact.area_status(0x7F), None);

        assert_eq!(compact.arm_code(ArmType::Away), 0x02);
        assert_eq!(bg.arm_code(ArmType::Away), 0x03);
        assert_eq!(bg.arm_code(ArmType::Home), 0x04);
        assert_eq!(bg.raw_area_status(AreaStatus::Disarmed), Some(0x08));
    }

    #[test]
    fn test_arming_code_verify() {
        let code = ArmingCode::new("1234");
        assert!(code.verify(Some("1234")));
        assert!(!code.verify(Some("12345")));
        assert!(!code.verify(None));
        assert_eq!(format!("{code:?}"), "ArmingCode(****)");
    }

    #[test]
    fn test_arm_type_satisfied_by() {
        assert!(ArmType::Disarm.satisfied_by(AreaStatus::Disarmed));
        assert!(!ArmType::Away.satisfied_by(AreaStatus::Arming));
        assert!(ArmType::Home.satisfied_by(AreaStatus::PartArmed));
    }

    #[test]
    fn test_config_builder() {
        let config = PanelConfig::builder()
            .host("10.0.0.1")
            .port(7701)
            .use_tls(false)
            .family(PanelFamily::Amax)
            .credentials(Credentials::InstallerCode {
                code: "1234".into(),
                password: "abcdef".into(),
            })
            .arming_code("4321")
            .command_timeout_ms(2000)
            .build();

        assert_eq!(config.address(), "10.0.0.1:7701");
        assert!(!config.use_tls);
        assert_eq!(config.family, Some(PanelFamily::Amax));
        assert_eq!(config.command_timeout_ms, 2000);
        assert!(config.arming_code.is_some());
    }

    #[test]
    fn test_config_defaults() {
        let config = PanelConfig::builder().build();
        assert_eq!(config.port, 7700);
        assert!(config.use_tls);
        assert_eq!(config.command_timeout_ms, 5000);
        assert!(config.family.is_none());
    }
}
