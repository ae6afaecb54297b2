// MIT License - Copyright (c) 2026 Peter Wright
// Public panel handle: connection lifecycle, state accessors and commands

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, timeout};
use tracing::{debug, error, info, warn};

use crate::codec::Frame;
use crate::comm;
use crate::config::{ArmType, PanelConfig};
use crate::constants::{
    DOOR_CYCLE, DOOR_SECURE, DOOR_TERMINATE_UNLOCK, DOOR_UNLOCK, DOOR_UNSECURE, OUTPUT_ACTIVE,
    OUTPUT_INACTIVE,
};
use crate::devices::{
    Area, AreaStatus, Door, DoorStatus, HistoryEvent, Output, OutputStatus, PanelFaults, Point,
};
use crate::error::{BoschError, Result};
use crate::event::{EventReceiver, EventSender, event_channel};
use crate::model::{ConnectionState, Notifications, PanelIdentity, PanelModel, PanelObservers};
use crate::observer::Observer;
use crate::protocol::{Command, PushMessage};
use crate::supervisor;
use crate::transport::{DirectTransport, TransportEvents};

/// State shared between the panel handle and its supervisor task.
pub(crate) struct PanelShared {
    pub(crate) config: PanelConfig,
    model: RwLock<PanelModel>,
    transport: RwLock<Option<Arc<DirectTransport>>>,
    event_tx: EventSender,
}

impl PanelShared {
    fn dispatch(&self, notes: Notifications) {
        notes.dispatch(&self.event_tx);
    }

    pub(crate) async fn set_state(&self, state: ConnectionState) {
        let notes = self.model.write().await.set_connection_state(state);
        self.dispatch(notes);
    }

    pub(crate) async fn apply_push(&self, frame: &Frame) {
        let push = match PushMessage::parse(frame) {
            Ok(push) => push,
            Err(e) => {
                warn!("Ignoring malformed push frame: {}", e);
                return;
            }
        };
        debug!("Push: {:?}", push);
        let notes = self.model.write().await.apply_push(push);
        self.dispatch(notes);
    }

    /// Open, authenticate and fully synchronize one session.
    pub(crate) async fn establish(&self) -> Result<TransportEvents> {
        self.set_state(ConnectionState::Connecting).await;

        let (transport, events) = DirectTransport::connect(
            &self.config,
            self.set_state(ConnectionState::Authenticating),
        )
        .await?;

        let history_from = self
            .model
            .read()
            .await
            .history()
            .last_index()
            .unwrap_or(0);
        let snapshot = match comm::synchronize(&transport, history_from).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Panel synchronization failed: {}", e);
                transport.close().await;
                return Err(e);
            }
        };

        *self.transport.write().await = Some(Arc::new(transport));

        let notes = {
            let mut model = self.model.write().await;
            let connected = model.set_connection_state(ConnectionState::Connected);
            connected.merge(model.resync(snapshot))
        };
        self.dispatch(notes);
        info!("System initialization completed");
        Ok(events)
    }

    pub(crate) async fn drop_transport(&self) {
        let transport = self.transport.write().await.take();
        if let Some(transport) = transport {
            transport.close().await;
        }
    }

    async fn transport(&self) -> Result<Arc<DirectTransport>> {
        self.transport
            .read()
            .await
            .clone()
            .ok_or(BoschError::NotConnected)
    }
}

/// The main public API for interacting with a Bosch panel.
///
/// # Example
///
/// ```no_run
/// use bosch_mode2_bridge::{BoschPanel, Credentials, PanelConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = PanelConfig::builder()
///         .host("192.168.1.100")
///         .credentials(Credentials::Passcode("0123456789".into()))
///         .arming_code("1234")
///         .build();
///
///     let panel = BoschPanel::connect(config).await?;
///
///     let mut events = panel.subscribe();
///     tokio::spawn(async move {
///         while let Ok(event) = events.recv().await {
///             println!("Event: {:?}", event);
///         }
///     });
///
///     for area in panel.areas().await.values() {
///         println!("Area {}: {} ({})", area.id, area.name, area.status);
///     }
///
///     panel.arm_away(1, Some("1234")).await?;
///
///     tokio::signal::ctrl_c().await?;
///     panel.disconnect().await;
///     Ok(())
/// }
/// ```
pub struct BoschPanel {
    shared: Arc<PanelShared>,
    observers: PanelObservers,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl BoschPanel {
    /// Connect, authenticate and synchronize the panel, then keep the session
    /// alive in the background.
    ///
    /// The initial attempt is not retried; use `BoschError::setup_failure` to
    /// classify a failure. Later connection losses are handled by reconnecting
    /// per `config.reconnect`.
    pub async fn connect(config: PanelConfig) -> Result<Self> {
        let (event_tx, _event_rx) = event_channel(config.event_capacity);
        let observers = PanelObservers::default();
        let model = PanelModel::new(observers.clone(), config.history_capacity);

        let shared = Arc::new(PanelShared {
            config,
            model: RwLock::new(model),
            transport: RwLock::new(None),
            event_tx,
        });

        let events = match shared.establish().await {
            Ok(events) => events,
            Err(e) => {
                error!("Unable to connect to panel: {}", e);
                shared.drop_transport().await;
                shared.set_state(ConnectionState::Disconnected).await;
                return Err(e);
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(supervisor::run(shared.clone(), events, shutdown_rx));

        Ok(Self {
            shared,
            observers,
            supervisor: Mutex::new(Some(handle)),
            shutdown_tx,
        })
    }

    /// Subscribe to the typed panel event stream.
    pub fn subscribe(&self) -> EventReceiver {
        self.shared.event_tx.subscribe()
    }

    /// Stop reconnecting and close the connection.
    pub async fn disconnect(&self) {
        info!("Disconnecting from panel");
        let _ = self.shutdown_tx.send(true);
        if let Some(mut handle) = self.supervisor.lock().await.take()
            && timeout(Duration::from_secs(1), &mut handle).await.is_err()
        {
            handle.abort();
        }
        self.shared.drop_transport().await;
        self.shared.set_state(ConnectionState::Disconnected).await;
    }

    // --- State accessors ---

    pub async fn areas(&self) -> BTreeMap<u16, Area> {
        self.shared.model.read().await.areas().clone()
    }

    pub async fn area(&self, id: u16) -> Option<Area> {
        self.shared.model.read().await.areas().get(&id).cloned()
    }

    pub async fn points(&self) -> BTreeMap<u16, Point> {
        self.shared.model.read().await.points().clone()
    }

    pub async fn point(&self, id: u16) -> Option<Point> {
        self.shared.model.read().await.points().get(&id).cloned()
    }

    pub async fn doors(&self) -> BTreeMap<u16, Door> {
        self.shared.model.read().await.doors().clone()
    }

    pub async fn door(&self, id: u16) -> Option<Door> {
        self.shared.model.read().await.doors().get(&id).cloned()
    }

    pub async fn outputs(&self) -> BTreeMap<u16, Output> {
        self.shared.model.read().await.outputs().clone()
    }

    pub async fn output(&self, id: u16) -> Option<Output> {
        self.shared.model.read().await.outputs().get(&id).cloned()
    }

    /// History log, oldest first.
    pub async fn events(&self) -> Vec<HistoryEvent> {
        self.shared.model.read().await.history().to_vec()
    }

    pub async fn panel_faults(&self) -> PanelFaults {
        self.shared.model.read().await.faults()
    }

    pub async fn identity(&self) -> Option<PanelIdentity> {
        self.shared.model.read().await.identity().cloned()
    }

    pub async fn model(&self) -> Option<String> {
        self.identity().await.map(|i| i.model)
    }

    pub async fn firmware_version(&self) -> Option<String> {
        self.identity().await.map(|i| i.firmware_version)
    }

    pub async fn serial_number(&self) -> Option<u64> {
        self.identity().await.and_then(|i| i.serial_number)
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.shared.model.read().await.connection_state()
    }

    /// True while a synchronized session is up.
    pub async fn connection_status(&self) -> bool {
        self.connection_state().await.is_connected()
    }

    pub fn connection_observer(&self) -> &Observer {
        &self.observers.connection
    }

    pub fn faults_observer(&self) -> &Observer {
        &self.observers.faults
    }

    pub fn history_observer(&self) -> &Observer {
        &self.observers.history
    }

    // --- Commands ---

    /// Arm all points in an area.
    pub async fn arm_away(&self, area_id: u16, code: Option<&str>) -> Result<()> {
        self.arm_area(area_id, ArmType::Away, code).await
    }

    /// Arm perimeter points only.
    pub async fn arm_home(&self, area_id: u16, code: Option<&str>) -> Result<()> {
        self.arm_area(area_id, ArmType::Home, code).await
    }

    pub async fn disarm(&self, area_id: u16, code: Option<&str>) -> Result<()> {
        self.arm_area(area_id, ArmType::Disarm, code).await
    }

    async fn arm_area(&self, area_id: u16, arm_type: ArmType, code: Option<&str>) -> Result<()> {
        debug!("Area {}: {:?} requested", area_id, arm_type);
        if let Some(expected) = &self.shared.config.arming_code
            && !expected.verify(code)
        {
            warn!("Area {}: arming code rejected", area_id);
            return Err(BoschError::InvalidArmingCode);
        }

        let (revision, arm_code) = {
            let model = self.shared.model.read().await;
            let map = model.status_map().ok_or(BoschError::NotConnected)?;
            let area = model.areas().get(&area_id).ok_or(BoschError::InvalidDeviceId {
                kind: "area",
                id: area_id,
            })?;
            if arm_type.satisfied_by(area.status) {
                debug!("Area {} already {}", area_id, area.status);
                return Ok(());
            }
            (area.revision(), map.arm_code(arm_type))
        };

        let transport = self.shared.transport().await?;
        transport
            .send_command(&Command::AreaArm { area_id, arm_code })
            .await?;

        let target = match arm_type {
            ArmType::Disarm => AreaStatus::Disarmed,
            ArmType::Away | ArmType::Home => AreaStatus::Arming,
        };
        let notes = self
            .shared
            .model
            .write()
            .await
            .confirm_area_status(area_id, revision, target);
        self.shared.dispatch(notes);
        Ok(())
    }

    /// Momentarily unlock a door; the panel relocks it on its own.
    pub async fn door_unlock(&self, door_id: u16) -> Result<()> {
        self.door_action(door_id, DOOR_UNLOCK, DoorStatus::Unlocked).await
    }

    /// Terminate an unlock and relock the door.
    pub async fn door_relock(&self, door_id: u16) -> Result<()> {
        self.door_action(door_id, DOOR_TERMINATE_UNLOCK, DoorStatus::Locked)
            .await
    }

    pub async fn door_cycle(&self, door_id: u16) -> Result<()> {
        self.door_action(door_id, DOOR_CYCLE, DoorStatus::Cycling).await
    }

    pub async fn door_secure(&self, door_id: u16) -> Result<()> {
        self.door_action(door_id, DOOR_SECURE, DoorStatus::Secured).await
    }

    pub async fn door_unsecure(&self, door_id: u16) -> Result<()> {
        self.door_action(door_id, DOOR_UNSECURE, DoorStatus::Locked).await
    }

    async fn door_action(&self, door_id: u16, action: u8, target: DoorStatus) -> Result<()> {
        debug!("Door {}: action 0x{:02X}", door_id, action);
        let revision = {
            let model = self.shared.model.read().await;
            model
                .doors()
                .get(&door_id)
                .map(Door::revision)
                .ok_or(BoschError::InvalidDeviceId {
                    kind: "door",
                    id: door_id,
                })?
        };

        let transport = self.shared.transport().await?;
        transport
            .send_command(&Command::SetDoor { door_id, action })
            .await?;

        let notes = self
            .shared
            .model
            .write()
            .await
            .confirm_door_status(door_id, revision, target);
        self.shared.dispatch(notes);
        Ok(())
    }

    pub async fn set_output_active(&self, output_id: u16) -> Result<()> {
        self.set_output(output_id, OUTPUT_ACTIVE, OutputStatus::Active)
            .await
    }

    pub async fn set_output_inactive(&self, output_id: u16) -> Result<()> {
        self.set_output(output_id, OUTPUT_INACTIVE, OutputStatus::Inactive)
            .await
    }

    async fn set_output(&self, output_id: u16, state: u8, target: OutputStatus) -> Result<()> {
        debug!("Output {}: set {}", output_id, target.as_str());
        let revision = {
            let model = self.shared.model.read().await;
            model
                .outputs()
                .get(&output_id)
                .map(Output::revision)
                .ok_or(BoschError::InvalidDeviceId {
                    kind: "output",
                    id: output_id,
                })?
        };

        let transport = self.shared.transport().await?;
        transport
            .send_command(&Command::SetOutput { output_id, state })
            .await?;

        let notes = self
            .shared
            .model
            .write()
            .await
            .confirm_output_status(output_id, revision, target);
        self.shared.dispatch(notes);
        Ok(())
    }

    /// Set the panel clock.
    pub async fn set_panel_date(&self, datetime: NaiveDateTime) -> Result<()> {
        debug!("Setting panel date to {}", datetime);
        let transport = self.shared.transport().await?;
        transport
            .send_command(&Command::SetDateTime(datetime))
            .await?;
        Ok(())
    }
}

impl Drop for BoschPanel {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}
