// MIT License - Copyright (c) 2026 Peter Wright
// Connection, handshake and request correlation

pub mod auth;
pub mod command;
pub mod direct;
pub mod tls;

pub use auth::{Credentials, HandshakeOutcome};
pub use direct::{DirectTransport, OpenConnection, PanelStream, TransportEvent, TransportEvents};
