// MIT License - Copyright (c) 2026 Peter Wright
// Panel-wide change stream

use crate::devices::{AreaStatus, DoorStatus, HistoryEvent, OutputStatus, PanelFaults, PointStatus};
use crate::model::ConnectionState;

/// All events that can be emitted by the panel.
///
/// Users subscribe via `panel.subscribe()` to receive a
/// `tokio::sync::broadcast::Receiver<PanelEvent>`. Per-entity observers fire
/// for the same changes; this stream additionally carries old and new values.
#[derive(Debug, Clone)]
pub enum PanelEvent {
    /// Connection state moved
    ConnectionStateChanged {
        old: ConnectionState,
        new: ConnectionState,
    },
    /// Model (re)synchronized from a fresh bulk pull
    SystemInitComplete,
    AreaStatusChanged {
        area_id: u16,
        old_status: AreaStatus,
        new_status: AreaStatus,
    },
    AreaReadyChanged {
        area_id: u16,
        all_ready: bool,
        part_ready: bool,
        faults: Vec<String>,
    },
    AreaAlarmsChanged {
        area_id: u16,
        alarms: Vec<String>,
    },
    PointStatusChanged {
        point_id: u16,
        old_status: PointStatus,
        new_status: PointStatus,
    },
    DoorStatusChanged {
        door_id: u16,
        old_status: DoorStatus,
        new_status: DoorStatus,
    },
    OutputStatusChanged {
        output_id: u16,
        old_status: OutputStatus,
        new_status: OutputStatus,
    },
    FaultsChanged {
        old: PanelFaults,
        new: PanelFaults,
    },
    /// New entry appended to the history log
    History(HistoryEvent),
}

/// Type alias for the broadcast sender.
pub type EventSender = tokio::sync::broadcast::Sender<PanelEvent>;

/// Type alias for the broadcast receiver.
pub type EventReceiver = tokio::sync::broadcast::Receiver<PanelEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(capacity.max(1))
}
