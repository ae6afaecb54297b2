// MIT License - Copyright (c) 2026 Peter Wright
// In-memory panel model: entity maps, identity, history and faults

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, warn};

use crate::comm::PanelSnapshot;
use crate::config::{PanelFamily, StatusMap};
use crate::constants::{alarm_description, model_name};
use crate::devices::{
    Area, AreaStatus, Door, DoorStatus, HistoryEvent, HistoryLog, Output, OutputStatus,
    PanelFaults, Point, PointStatus, ReadyFlags,
};
use crate::event::{EventSender, PanelEvent};
use crate::observer::Observer;
use crate::protocol::{AreaRecord, EntityRecord, PushMessage};

/// Session connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    /// Reconnection gave up or credentials were rejected
    Faulted,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Authenticating => "AUTHENTICATING",
            Self::Connected => "CONNECTED",
            Self::Faulted => "FAULTED",
        }
    }

    pub fn is_connected(&self) -> bool {
        *self == Self::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Panel identity metadata, known after the first synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelIdentity {
    pub model: String,
    pub model_code: u8,
    pub family: PanelFamily,
    pub firmware_version: String,
    /// Only B and G series panels report one
    pub serial_number: Option<u64>,
}

/// Panel-level notification channels.
#[derive(Debug, Clone, Default)]
pub struct PanelObservers {
    pub connection: Observer,
    pub faults: Observer,
    pub history: Observer,
}

/// Observers and events produced by a model mutation, dispatched once the
/// model lock has been released.
#[derive(Debug, Default)]
#[must_use]
pub struct Notifications {
    observers: Vec<Observer>,
    events: Vec<PanelEvent>,
}

impl Notifications {
    fn observe(&mut self, observer: &Observer) {
        self.observers.push(observer.clone());
    }

    fn event(&mut self, event: PanelEvent) {
        self.events.push(event);
    }

    /// Combine two mutation results into one dispatch, in order.
    pub fn merge(mut self, other: Notifications) -> Self {
        self.observers.extend(other.observers);
        self.events.extend(other.events);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty() && self.events.is_empty()
    }

    pub fn dispatch(self, event_tx: &EventSender) {
        for observer in self.observers {
            observer.notify();
        }
        for event in self.events {
            // No receivers is fine
            let _ = event_tx.send(event);
        }
    }
}

/// The in-memory model of one panel. Pure data; no I/O.
#[derive(Debug)]
pub struct PanelModel {
    identity: Option<PanelIdentity>,
    status_map: Option<StatusMap>,
    connection_state: ConnectionState,
    areas: BTreeMap<u16, Area>,
    points: BTreeMap<u16, Point>,
    doors: BTreeMap<u16, Door>,
    outputs: BTreeMap<u16, Output>,
    history: HistoryLog,
    history_capacity: Option<usize>,
    faults: PanelFaults,
    observers: PanelObservers,
}

impl PanelModel {
    pub fn new(observers: PanelObservers, history_capacity: Option<usize>) -> Self {
        Self {
            identity: None,
            status_map: None,
            connection_state: ConnectionState::Disconnected,
            areas: BTreeMap::new(),
            points: BTreeMap::new(),
            doors: BTreeMap::new(),
            outputs: BTreeMap::new(),
            history: HistoryLog::new(history_capacity.unwrap_or(0)),
            history_capacity,
            faults: PanelFaults::empty(),
            observers,
        }
    }

    pub fn identity(&self) -> Option<&PanelIdentity> { self.identity.as_ref() }
    pub fn status_map(&self) -> Option<StatusMap> { self.status_map }
    pub fn connection_state(&self) -> ConnectionState { self.connection_state }
    pub fn areas(&self) -> &BTreeMap<u16, Area> { &self.areas }
    pub fn points(&self) -> &BTreeMap<u16, Point> { &self.points }
    pub fn doors(&self) -> &BTreeMap<u16, Door> { &self.doors }
    pub fn outputs(&self) -> &BTreeMap<u16, Output> { &self.outputs }
    pub fn history(&self) -> &HistoryLog { &self.history }
    pub fn faults(&self) -> PanelFaults { self.faults }

    /// Move to a new connection state.
    ///
    /// The connection observer fires only when connectivity changes (or the
    /// session gives up), not for intermediate connecting/authenticating steps.
    pub fn set_connection_state(&mut self, new: ConnectionState) -> Notifications {
        let mut notes = Notifications::default();
        let old = self.connection_state;
        if old == new {
            return notes;
        }
        self.connection_state = new;
        debug!("Connection state {} -> {}", old, new);
        if old.is_connected() != new.is_connected() || new == ConnectionState::Faulted {
            notes.observe(&self.observers.connection);
        }
        notes.event(PanelEvent::ConnectionStateChanged { old, new });
        notes
    }

    /// Apply one push. Identical values do not re-fire observers.
    pub fn apply_push(&mut self, push: PushMessage) -> Notifications {
        let mut notes = Notifications::default();
        match push {
            PushMessage::AreaStatus { area_id, raw } => {
                let Some(status) = self.status_map.and_then(|m| m.area_status(raw)) else {
                    warn!("Area {}: ignoring unknown status code 0x{:02X}", area_id, raw);
                    return notes;
                };
                if let Some(area) = self.areas.get_mut(&area_id) {
                    set_area_status(area, status, &mut notes);
                } else {
                    debug!("Status push for unknown area {}", area_id);
                }
            }
            PushMessage::AreaReady {
                area_id,
                ready,
                fault_points,
            } => {
                let faults = self.fault_names(&fault_points);
                if let Some(area) = self.areas.get_mut(&area_id) {
                    set_area_ready(area, ReadyFlags::from_bits_truncate(ready), faults, &mut notes);
                } else {
                    debug!("Ready push for unknown area {}", area_id);
                }
            }
            PushMessage::AreaAlarms { area_id, alarms } => {
                if let Some(area) = self.areas.get_mut(&area_id) {
                    set_area_alarms(area, describe_alarms(&alarms), &mut notes);
                } else {
                    debug!("Alarm push for unknown area {}", area_id);
                }
            }
            PushMessage::PointStatus { point_id, raw } => {
                let Some(status) = PointStatus::from_code(raw) else {
                    warn!("Point {}: ignoring unknown status code 0x{:02X}", point_id, raw);
                    return notes;
                };
                if let Some(point) = self.points.get_mut(&point_id) {
                    set_point_status(point, status, &mut notes);
                }
            }
            PushMessage::DoorStatus { door_id, raw } => {
                let Some(status) = DoorStatus::from_code(raw) else {
                    warn!("Door {}: ignoring unknown status code 0x{:02X}", door_id, raw);
                    return notes;
                };
                if let Some(door) = self.doors.get_mut(&door_id) {
                    set_door_status(door, status, &mut notes);
                }
            }
            PushMessage::OutputStatus { output_id, raw } => {
                let Some(status) = OutputStatus::from_code(raw) else {
                    warn!("Output {}: ignoring unknown status code 0x{:02X}", output_id, raw);
                    return notes;
                };
                if let Some(output) = self.outputs.get_mut(&output_id) {
                    set_output_status(output, status, &mut notes);
                }
            }
            PushMessage::PanelFaults(word) => {
                self.set_faults(PanelFaults::from_word(word), &mut notes);
            }
            PushMessage::History(event) => {
                self.append_history(vec![event], &mut notes);
            }
        }
        notes
    }

    /// Replace model contents with a fresh bulk pull.
    ///
    /// Existing entities keep their observers; changed ones notify, new ids
    /// are added and vanished ids dropped.
    pub fn resync(&mut self, snapshot: PanelSnapshot) -> Notifications {
        let mut notes = Notifications::default();
        let family = snapshot.family;
        let status_map = family.status_map();
        self.status_map = Some(status_map);

        let capacity = self
            .history_capacity
            .unwrap_or_else(|| family.default_history_capacity());
        if capacity != self.history.capacity() {
            let mut resized = HistoryLog::new(capacity);
            for event in self.history.iter() {
                let _ = resized.push(event.clone());
            }
            self.history = resized;
        }

        self.identity = Some(PanelIdentity {
            model: model_name(snapshot.model_code)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Unknown (0x{:02X})", snapshot.model_code)),
            model_code: snapshot.model_code,
            family,
            firmware_version: snapshot.firmware_version,
            serial_number: snapshot.serial_number,
        });

        // Points first: area faults are reported as point names
        self.sync_points(&snapshot.points, &mut notes);
        self.sync_areas(&snapshot.areas, status_map, &mut notes);
        sync_entities(
            &mut self.doors,
            &snapshot.doors,
            "door",
            DoorStatus::from_code,
            |r, status| Door::new(r.id, r.name.clone(), status),
            set_door_status,
            &mut notes,
        );
        sync_entities(
            &mut self.outputs,
            &snapshot.outputs,
            "output",
            OutputStatus::from_code,
            |r, status| Output::new(r.id, r.name.clone(), status),
            set_output_status,
            &mut notes,
        );

        self.set_faults(PanelFaults::from_word(snapshot.faults), &mut notes);
        self.append_history(snapshot.history, &mut notes);
        notes.event(PanelEvent::SystemInitComplete);
        notes
    }

    fn sync_points(&mut self, records: &[EntityRecord], notes: &mut Notifications) {
        sync_entities(
            &mut self.points,
            records,
            "point",
            PointStatus::from_code,
            |r, status| Point::new(r.id, r.name.clone(), status),
            set_point_status,
            notes,
        );
        for record in records {
            if let Some(point) = self.points.get_mut(&record.id)
                && point.name != record.name
            {
                point.name = record.name.clone();
            }
        }
    }

    fn sync_areas(&mut self, records: &[AreaRecord], map: StatusMap, notes: &mut Notifications) {
        self.areas
            .retain(|id, _| records.iter().any(|r| r.id == *id));
        for record in records {
            let faults = self.fault_names(&record.fault_points);
            let ready = ReadyFlags::from_bits_truncate(record.ready);
            let alarms = describe_alarms(&record.alarms);
            let status = map.area_status(record.raw_status);
            if status.is_none() {
                warn!(
                    "Area {}: ignoring unknown status code 0x{:02X}",
                    record.id, record.raw_status
                );
            }

            match self.areas.get_mut(&record.id) {
                Some(area) => {
                    area.name = record.name.clone();
                    if let Some(status) = status {
                        set_area_status(area, status, notes);
                    }
                    set_area_ready(area, ready, faults, notes);
                    set_area_alarms(area, alarms, notes);
                }
                None => {
                    let mut area = Area::new(
                        record.id,
                        record.name.clone(),
                        status.unwrap_or(AreaStatus::Disarmed),
                    );
                    let _ = area.update_ready(ready, faults);
                    let _ = area.update_alarms(alarms);
                    self.areas.insert(record.id, area);
                }
            }
        }
    }

    /// Apply the outcome of an acknowledged arm/disarm, unless a push changed
    /// the area after the command was sent.
    pub fn confirm_area_status(
        &mut self,
        area_id: u16,
        revision: u64,
        status: AreaStatus,
    ) -> Notifications {
        let mut notes = Notifications::default();
        if let Some(area) = self.areas.get_mut(&area_id) {
            if area.revision() == revision {
                set_area_status(area, status, &mut notes);
            } else {
                debug!(
                    "Area {} changed while command was in flight, keeping pushed state",
                    area_id
                );
            }
        }
        notes
    }

    pub fn confirm_door_status(
        &mut self,
        door_id: u16,
        revision: u64,
        status: DoorStatus,
    ) -> Notifications {
        let mut notes = Notifications::default();
        if let Some(door) = self.doors.get_mut(&door_id)
            && door.revision() == revision
        {
            set_door_status(door, status, &mut notes);
        }
        notes
    }

    pub fn confirm_output_status(
        &mut self,
        output_id: u16,
        revision: u64,
        status: OutputStatus,
    ) -> Notifications {
        let mut notes = Notifications::default();
        if let Some(output) = self.outputs.get_mut(&output_id)
            && output.revision() == revision
        {
            set_output_status(output, status, &mut notes);
        }
        notes
    }

    fn fault_names(&self, point_ids: &[u16]) -> Vec<String> {
        point_ids
            .iter()
            .map(|id| {
                self.points
                    .get(id)
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| format!("Point {id}"))
            })
            .collect()
    }

    fn set_faults(&mut self, faults: PanelFaults, notes: &mut Notifications) {
        if self.faults == faults {
            return;
        }
        let old = self.faults;
        self.faults = faults;
        notes.observe(&self.observers.faults);
        notes.event(PanelEvent::FaultsChanged { old, new: faults });
    }

    fn append_history(&mut self, events: Vec<HistoryEvent>, notes: &mut Notifications) {
        let mut added = false;
        for event in events {
            if self.history.push(event.clone()) {
                added = true;
                notes.event(PanelEvent::History(event));
            }
        }
        if added {
            notes.observe(&self.observers.history);
        }
    }
}

fn describe_alarms(codes: &[u8]) -> Vec<String> {
    codes.iter().map(|c| alarm_description(*c)).collect()
}

fn set_area_status(area: &mut Area, status: AreaStatus, notes: &mut Notifications) {
    let old_status = area.status;
    if area.update_status(status) {
        notes.observe(&area.status_observer);
        notes.event(PanelEvent::AreaStatusChanged {
            area_id: area.id,
            old_status,
            new_status: status,
        });
    }
}

fn set_area_ready(
    area: &mut Area,
    ready: ReadyFlags,
    faults: Vec<String>,
    notes: &mut Notifications,
) {
    if area.update_ready(ready, faults) {
        notes.observe(&area.ready_observer);
        notes.event(PanelEvent::AreaReadyChanged {
            area_id: area.id,
            all_ready: area.is_all_ready(),
            part_ready: area.is_part_ready(),
            faults: area.faults.clone(),
        });
    }
}

fn set_area_alarms(area: &mut Area, alarms: Vec<String>, notes: &mut Notifications) {
    if area.update_alarms(alarms) {
        notes.observe(&area.alarm_observer);
        notes.event(PanelEvent::AreaAlarmsChanged {
            area_id: area.id,
            alarms: area.alarms.clone(),
        });
    }
}

fn set_point_status(point: &mut Point, status: PointStatus, notes: &mut Notifications) {
    let old_status = point.status;
    if point.update_status(status) {
        notes.observe(&point.status_observer);
        notes.event(PanelEvent::PointStatusChanged {
            point_id: point.id,
            old_status,
            new_status: status,
        });
    }
}

fn set_door_status(door: &mut Door, status: DoorStatus, notes: &mut Notifications) {
    let old_status = door.status;
    if door.update_status(status) {
        notes.observe(&door.status_observer);
        notes.event(PanelEvent::DoorStatusChanged {
            door_id: door.id,
            old_status,
            new_status: status,
        });
    }
}

fn set_output_status(output: &mut Output, status: OutputStatus, notes: &mut Notifications) {
    let old_status = output.status;
    if output.update_status(status) {
        notes.observe(&output.status_observer);
        notes.event(PanelEvent::OutputStatusChanged {
            output_id: output.id,
            old_status,
            new_status: status,
        });
    }
}

/// Merge a list reply into an id-keyed entity map.
fn sync_entities<E, S>(
    map: &mut BTreeMap<u16, E>,
    records: &[EntityRecord],
    kind: &str,
    parse: impl Fn(u8) -> Option<S>,
    create: impl Fn(&EntityRecord, S) -> E,
    update: impl Fn(&mut E, S, &mut Notifications),
    notes: &mut Notifications,
) {
    map.retain(|id, _| records.iter().any(|r| r.id == *id));
    for record in records {
        let status = parse(record.raw_status);
        match (map.get_mut(&record.id), status) {
            (Some(entity), Some(status)) => update(entity, status, notes),
            (Some(_), None) => warn!(
                "{} {}: ignoring unknown status code 0x{:02X}",
                kind, record.id, record.raw_status
            ),
            (None, Some(status)) => {
                map.insert(record.id, create(record, status));
            }
            (None, None) => {
                warn!(
                    "{} {}: unknown status code 0x{:02X}, skipping",
                    kind, record.id, record.raw_status
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::NaiveDate;

    fn snapshot() -> PanelSnapshot {
        PanelSnapshot {
            model_code: 0x21,
            family: PanelFamily::Solution,
            firmware_version: "1.02".into(),
            serial_number: None,
            areas: vec![AreaRecord {
                id: 1,
                name: "Area1".into(),
                raw_status: 0x01,
                ready: 0x03,
                alarms: vec![],
                fault_points: vec![],
            }],
            points: vec![
                EntityRecord::new(1, "Window", 1),
                EntityRecord::new(2, "Door", 1),
            ],
            doors: vec![EntityRecord::new(1, "Main Door", 4)],
            outputs: vec![EntityRecord::new(1, "Output A", 0)],
            faults: 0,
            history: vec![],
        }
    }

    fn counter(observer: &Observer) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let _ = observer.attach(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    fn fire(notes: Notifications) {
        let (tx, _rx) = crate::event::event_channel(16);
        notes.dispatch(&tx);
    }

    fn synced() -> PanelModel {
        let mut model = PanelModel::new(PanelObservers::default(), None);
        fire(model.resync(snapshot()));
        model
    }

    #[test]
    fn test_resync_builds_identity_and_entities() {
        let model = synced();
        let identity = model.identity().unwrap();
        assert_eq!(identity.model, "Solution 3000");
        assert_eq!(identity.family, PanelFamily::Solution);
        assert_eq!(model.areas().len(), 1);
        assert_eq!(model.points().len(), 2);
        assert!(model.areas()[&1].is_disarmed());
        assert!(model.areas()[&1].is_all_ready());
        assert!(model.doors()[&1].is_locked());
        assert_eq!(model.history().capacity(), 255);
    }

    #[test]
    fn test_identical_push_fires_once() {
        let mut model = synced();
        let count = counter(&model.areas()[&1].status_observer);

        let push = PushMessage::AreaStatus { area_id: 1, raw: 0x04 };
        fire(model.apply_push(push.clone()));
        fire(model.apply_push(push));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(model.areas()[&1].is_all_armed());
    }

    #[test]
    fn test_last_push_wins() {
        let mut model = synced();
        for raw in [2, 0, 1, 2, 1] {
            fire(model.apply_push(PushMessage::PointStatus { point_id: 2, raw }));
        }
        assert!(model.points()[&2].is_normal());
    }

    #[test]
    fn test_unknown_status_code_is_ignored() {
        let mut model = synced();
        let notes = model.apply_push(PushMessage::AreaStatus { area_id: 1, raw: 0x7F });
        assert!(notes.is_empty());
        assert!(model.areas()[&1].is_disarmed());
    }

    #[test]
    fn test_ready_push_resolves_point_names() {
        let mut model = synced();
        let count = counter(&model.areas()[&1].ready_observer);
        fire(model.apply_push(PushMessage::AreaReady {
            area_id: 1,
            ready: 0x03,
            fault_points: vec![1, 9],
        }));
        let area = &model.areas()[&1];
        assert_eq!(area.faults, vec!["Window".to_string(), "Point 9".to_string()]);
        assert!(!area.is_all_ready());
        assert!(area.is_part_ready());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_history_and_faults_notify_panel_observers() {
        let observers = PanelObservers::default();
        let history = counter(&observers.history);
        let faults = counter(&observers.faults);
        let mut model = PanelModel::new(observers, Some(10));
        fire(model.resync(snapshot()));

        let event = HistoryEvent {
            index: 1,
            timestamp: NaiveDate::from_ymd_opt(2026, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            description: "Area 1 Disarmed".into(),
        };
        fire(model.apply_push(PushMessage::History(event.clone())));
        fire(model.apply_push(PushMessage::History(event)));
        fire(model.apply_push(PushMessage::PanelFaults(1 << 5)));

        assert_eq!(history.load(Ordering::SeqCst), 1);
        assert_eq!(faults.load(Ordering::SeqCst), 1);
        assert!(model.faults().is_ac_fail());
        assert_eq!(model.history().capacity(), 10);
    }

    #[test]
    fn test_confirm_skipped_after_push() {
        let mut model = synced();
        let revision = model.areas()[&1].revision();
        fire(model.apply_push(PushMessage::AreaStatus { area_id: 1, raw: 0x04 }));
        fire(model.confirm_area_status(1, revision, AreaStatus::Arming));
        assert!(model.areas()[&1].is_all_armed());

        let revision = model.areas()[&1].revision();
        fire(model.confirm_area_status(1, revision, AreaStatus::Disarmed));
        assert!(model.areas()[&1].is_disarmed());
    }

    #[test]
    fn test_resync_keeps_observers_and_drops_vanished() {
        let mut model = synced();
        let count = counter(&model.doors()[&1].status_observer);

        let mut next = snapshot();
        next.doors = vec![EntityRecord::new(1, "Main Door", 2)];
        next.outputs = vec![];
        next.points.push(EntityRecord::new(7, "Smoke Detector", 1));
        fire(model.resync(next));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(model.doors()[&1].is_open());
        assert!(model.outputs().is_empty());
        assert!(model.points().contains_key(&7));
    }

    #[test]
    fn test_connection_observer_only_on_connectivity_change() {
        let observers = PanelObservers::default();
        let count = counter(&observers.connection);
        let mut model = PanelModel::new(observers, None);

        fire(model.set_connection_state(ConnectionState::Connecting));
        fire(model.set_connection_state(ConnectionState::Authenticating));
        fire(model.set_connection_state(ConnectionState::Connected));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        fire(model.set_connection_state(ConnectionState::Disconnected));
        fire(model.set_connection_state(ConnectionState::Disconnected));
        assert_eq!(count.load(Ordering::SeqCst), 2);

        fire(model.set_connection_state(ConnectionState::Faulted));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
