// MIT License - Copyright (c) 2026 Peter Wright
// Error taxonomy for the Mode 2 client

use std::fmt;

/// Rejection reasons carried in the body of a NAK frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NakCode {
    /// 0x00 - Non-specific error
    NonSpecific,
    /// 0x01 - Checksum failure
    ChecksumFailure,
    /// 0x02 - Invalid size or length
    InvalidSize,
    /// 0x03 - Invalid command
    InvalidCommand,
    /// 0x04 - Invalid interface state
    InvalidState,
    /// 0x05 - Data out of range
    OutOfRange,
    /// 0x06 - No authority
    NoAuthority,
    /// 0x07 - Unsupported command
    Unsupported,
    /// 0x08 - Cannot arm panel
    CannotArm,
    /// 0x09 - Invalid remote ID
    InvalidRemoteId,
    /// 0x0C - Invalid area
    InvalidArea,
    /// 0x0D - Invalid point
    InvalidPoint,
    /// 0x0E - Invalid door
    InvalidDoor,
    /// 0x0F - Invalid output
    InvalidOutput,
    /// Any code not listed above
    Other(u8),
}

impl NakCode {
    /// Parse the reason byte of a NAK body.
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x00 => Self::NonSpecific,
            0x01 => Self::ChecksumFailure,
            0x02 => Self::InvalidSize,
            0x03 => Self::InvalidCommand,
            0x04 => Self::InvalidState,
            0x05 => Self::OutOfRange,
            0x06 => Self::NoAuthority,
            0x07 => Self::Unsupported,
            0x08 => Self::CannotArm,
            0x09 => Self::InvalidRemoteId,
            0x0C => Self::InvalidArea,
            0x0D => Self::InvalidPoint,
            0x0E => Self::InvalidDoor,
            0x0F => Self::InvalidOutput,
            other => Self::Other(other),
        }
    }

    /// The wire byte for this reason.
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::NonSpecific => 0x00,
            Self::ChecksumFailure => 0x01,
            Self::InvalidSize => 0x02,
            Self::InvalidCommand => 0x03,
            Self::InvalidState => 0x04,
            Self::OutOfRange => 0x05,
            Self::NoAuthority => 0x06,
            Self::Unsupported => 0x07,
            Self::CannotArm => 0x08,
            Self::InvalidRemoteId => 0x09,
            Self::InvalidArea => 0x0C,
            Self::InvalidPoint => 0x0D,
            Self::InvalidDoor => 0x0E,
            Self::InvalidOutput => 0x0F,
            Self::Other(b) => *b,
        }
    }

    /// Human-readable description of the reason.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NonSpecific => "Non-specific error",
            Self::ChecksumFailure => "Checksum failure",
            Self::InvalidSize => "Invalid size or length",
            Self::InvalidCommand => "Invalid command",
            Self::InvalidState => "Invalid interface state",
            Self::OutOfRange => "Data out of range",
            Self::NoAuthority => "No authority",
            Self::Unsupported => "Unsupported command",
            Self::CannotArm => "Cannot arm panel",
            Self::InvalidRemoteId => "Invalid remote ID",
            Self::InvalidArea => "Invalid area",
            Self::InvalidPoint => "Invalid point",
            Self::InvalidDoor => "Invalid door",
            Self::InvalidOutput => "Invalid output",
            Self::Other(_) => "Unknown error",
        }
    }
}

impl fmt::Display for NakCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}: {}", self.as_byte(), self.description())
    }
}

/// Malformed panel data, or a field too large to encode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("bad frame marker 0x{0:02X}")]
    BadMarker(u8),

    #[error("frame body too long ({len} bytes)")]
    Oversize { len: usize },

    #[error("checksum mismatch (expected {expected:04X}, got {actual:04X})")]
    Checksum { expected: u16, actual: u16 },

    #[error("unknown frame type 0x{0:02X}")]
    UnknownFrameType(u8),

    #[error("malformed body: {0}")]
    Malformed(String),

    #[error("string field too long ({len} bytes, max 255)")]
    FieldTooLong { len: usize },
}

/// How a failed initial connection should be routed by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupFailure {
    /// Credentials were rejected; send the user to re-authenticate.
    InvalidAuth,
    /// The panel could not be reached or stopped answering.
    CannotConnect,
    /// Anything else.
    Unknown,
}

/// All errors that can occur in the Mode 2 client.
#[derive(Debug, thiserror::Error)]
pub enum BoschError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS negotiation failed: {0}")]
    Tls(String),

    #[error("Authentication rejected: {reason}")]
    Auth { reason: String },

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Command timeout: {command}")]
    CommandTimeout { command: String },

    #[error("Protocol fault: {0}")]
    Decode(#[from] DecodeError),

    #[error("Command rejected by panel: {0}")]
    CommandRejected(NakCode),

    #[error("Panel not connected")]
    NotConnected,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid response: {details}")]
    InvalidResponse { details: String },

    #[error("Invalid {kind} ID: {id}")]
    InvalidDeviceId { kind: &'static str, id: u16 },

    #[error("Invalid arming code")]
    InvalidArmingCode,
}

impl BoschError {
    /// Whether this error is transient and the connection should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BoschError::Io(_)
                | BoschError::Connect { .. }
                | BoschError::Tls(_)
                | BoschError::ConnectionTimeout
                | BoschError::CommandTimeout { .. }
                | BoschError::Decode(_)
                | BoschError::ConnectionClosed
                | BoschError::NotConnected
        )
    }

    /// Classify an error returned by the initial connect.
    pub fn setup_failure(&self) -> SetupFailure {
        match self {
            BoschError::Auth { .. } => SetupFailure::InvalidAuth,
            BoschError::Io(_)
            | BoschError::Connect { .. }
            | BoschError::Tls(_)
            | BoschError::ConnectionTimeout
            | BoschError::CommandTimeout { .. }
            | BoschError::ConnectionClosed => SetupFailure::CannotConnect,
            _ => SetupFailure::Unknown,
        }
    }
}

pub type Result<T> = std::result::Result<T, BoschError>;
