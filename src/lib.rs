// MIT License - Copyright (c) 2026 Peter Wright
// Bosch Mode 2 automation protocol client
//
//! # bosch-mode2-bridge
//!
//! Direct TCP/TLS communication with Bosch intrusion panels (Solution,
//! AMAX, B series and G series) over the Mode 2 automation protocol.
//!
//! The library keeps one authenticated session open, mirrors panel state
//! (areas, points, doors, outputs, history and faults) in memory, notifies
//! observers as pushes arrive, and reconnects with backoff when the session
//! drops.
//!
//! ## Quick Start
//!
//! ```no_run
//! use bosch_mode2_bridge::{BoschPanel, Credentials, PanelConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PanelConfig::builder()
//!         .host("192.168.1.100")
//!         .credentials(Credentials::UserCode("2580".into()))
//!         .build();
//!
//!     let panel = BoschPanel::connect(config).await?;
//!
//!     if let Some(area) = panel.area(1).await {
//!         area.status_observer.attach(|| println!("Area 1 changed"));
//!     }
//!
//!     panel.arm_home(1, None).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     panel.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod comm;
pub mod config;
pub mod constants;
pub mod devices;
pub mod error;
pub mod event;
pub mod model;
pub mod observer;
pub mod panel;
pub mod protocol;
pub mod supervisor;
pub mod transport;

// Re-exports for convenience
pub use config::{ArmType, ArmingCode, PanelConfig, PanelConfigBuilder, PanelFamily};
pub use devices::{
    Area, AreaStatus, Door, DoorStatus, HistoryEvent, Output, OutputStatus, PanelFaults, Point,
    PointStatus, ReadyFlags,
};
pub use error::{BoschError, DecodeError, NakCode, Result, SetupFailure};
pub use event::{EventReceiver, PanelEvent};
pub use model::{ConnectionState, PanelIdentity};
pub use observer::{Observer, SubscriptionId};
pub use panel::BoschPanel;
pub use supervisor::ReconnectPolicy;
pub use transport::Credentials;
