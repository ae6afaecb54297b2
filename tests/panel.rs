// MIT License - Copyright (c) 2026 Peter Wright
// End-to-end panel tests against the loopback fake panel

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::NaiveDate;

use bosch_mode2_bridge::constants::{DOOR_TERMINATE_UNLOCK, DOOR_UNLOCK, OUTPUT_ACTIVE};
use bosch_mode2_bridge::protocol::{Command, EntityRecord, PushMessage};
use bosch_mode2_bridge::{
    AreaStatus, BoschError, BoschPanel, ConnectionState, Credentials, DoorStatus, NakCode,
    Observer, OutputStatus, PanelConfig, PanelEvent, PointStatus, ReconnectPolicy, SetupFailure,
};

use common::{FakePanel, FakeState, history_event, wait_for};

fn counter(observer: &Observer) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    observer.attach(move || {
        c.fetch_add(1, Ordering::SeqCst);
    });
    count
}

async fn connect(fake: &FakePanel) -> BoschPanel {
    BoschPanel::connect(fake.config().arming_code("1234").build())
        .await
        .expect("connect to fake panel")
}

async fn area_status(panel: &BoschPanel, id: u16) -> AreaStatus {
    panel.area(id).await.unwrap().status
}

/// Push a history entry and wait until it lands; every earlier push has then
/// been applied.
async fn barrier(fake: &FakePanel, panel: &BoschPanel, index: u32) {
    fake.push(PushMessage::History(history_event(index, "barrier")));
    assert!(
        wait_for(|| async { panel.events().await.iter().any(|e| e.index == index) }).await,
        "push barrier {index} never arrived"
    );
}

#[tokio::test]
async fn connect_synchronizes_model() {
    let fake = FakePanel::start(FakeState::solution()).await;
    let panel = connect(&fake).await;

    assert!(panel.connection_status().await);
    assert_eq!(panel.connection_state().await, ConnectionState::Connected);

    let identity = panel.identity().await.unwrap();
    assert_eq!(identity.model, "Solution 3000");
    assert_eq!(identity.firmware_version, "1.02");
    assert_eq!(identity.serial_number, None);

    let areas = panel.areas().await;
    assert_eq!(areas.len(), 1);
    assert!(areas[&1].is_disarmed());
    assert!(areas[&1].is_all_ready());

    let points = panel.points().await;
    assert_eq!(points.keys().copied().collect::<Vec<_>>(), vec![1, 2, 5]);
    assert_eq!(points[&5].name, "Hall PIR");

    assert!(panel.door(1).await.unwrap().is_locked());
    assert!(!panel.output(1).await.unwrap().is_active());
    assert_eq!(panel.events().await.len(), 1);
    assert!(panel.panel_faults().await.is_empty());

    panel.disconnect().await;
}

#[tokio::test]
async fn arm_away_moves_through_arming_to_all_armed() {
    let fake = FakePanel::start(FakeState::solution()).await;
    let panel = connect(&fake).await;
    let area = panel.area(1).await.unwrap();
    let changes = counter(&area.status_observer);

    panel.arm_away(1, Some("1234")).await.unwrap();
    assert_eq!(area_status(&panel, 1).await, AreaStatus::Arming);

    // Arming on ACK, then all-armed from the push
    assert!(
        wait_for(|| async {
            area_status(&panel, 1).await == AreaStatus::AllArmed
                && changes.load(Ordering::SeqCst) == 2
        })
        .await
    );
    assert_eq!(
        fake.arm_commands(),
        vec![Command::AreaArm {
            area_id: 1,
            arm_code: 0x02
        }]
    );

    panel.disarm(1, Some("1234")).await.unwrap();
    assert!(wait_for(|| async { area_status(&panel, 1).await == AreaStatus::Disarmed }).await);

    panel.disconnect().await;
}

#[tokio::test]
async fn wrong_arming_code_is_not_dispatched() {
    let fake = FakePanel::start(FakeState::solution()).await;
    let panel = connect(&fake).await;

    let err = panel.arm_away(1, Some("12345")).await.unwrap_err();
    assert!(matches!(err, BoschError::InvalidArmingCode));
    let err = panel.arm_home(1, None).await.unwrap_err();
    assert!(matches!(err, BoschError::InvalidArmingCode));

    assert_eq!(area_status(&panel, 1).await, AreaStatus::Disarmed);
    assert!(fake.arm_commands().is_empty());

    panel.disconnect().await;
}

#[tokio::test]
async fn arming_code_ignored_when_none_configured() {
    let fake = FakePanel::start(FakeState::solution()).await;
    let panel = BoschPanel::connect(fake.config().build()).await.unwrap();

    panel.arm_home(1, Some("anything")).await.unwrap();
    assert!(wait_for(|| async { area_status(&panel, 1).await == AreaStatus::PartArmed }).await);

    panel.disconnect().await;
}

#[tokio::test]
async fn satisfied_state_and_unknown_area_are_not_dispatched() {
    let fake = FakePanel::start(FakeState::solution()).await;
    let panel = connect(&fake).await;

    panel.disarm(1, Some("1234")).await.unwrap();
    let err = panel.arm_away(9, Some("1234")).await.unwrap_err();
    assert!(matches!(
        err,
        BoschError::InvalidDeviceId { kind: "area", id: 9 }
    ));
    assert!(matches!(
        panel.door_unlock(4).await.unwrap_err(),
        BoschError::InvalidDeviceId { kind: "door", id: 4 }
    ));
    assert!(fake.arm_commands().is_empty());

    panel.disconnect().await;
}

#[tokio::test]
async fn nak_is_reported_and_state_kept() {
    let mut state = FakeState::solution();
    state.nak_arm = true;
    let fake = FakePanel::start(state).await;
    let panel = connect(&fake).await;

    let err = panel.arm_away(1, Some("1234")).await.unwrap_err();
    assert!(matches!(err, BoschError::CommandRejected(NakCode::CannotArm)));
    assert_eq!(area_status(&panel, 1).await, AreaStatus::Disarmed);

    panel.disconnect().await;
}

#[tokio::test]
async fn identical_push_notifies_once() {
    let fake = FakePanel::start(FakeState::solution()).await;
    let panel = connect(&fake).await;
    let point = panel.point(2).await.unwrap();
    let changes = counter(&point.status_observer);

    let open = PushMessage::PointStatus { point_id: 2, raw: 2 };
    fake.push(open.clone());
    fake.push(open);
    barrier(&fake, &panel, 100).await;

    assert_eq!(changes.load(Ordering::SeqCst), 1);
    assert!(panel.point(2).await.unwrap().is_open());

    panel.disconnect().await;
}

#[tokio::test]
async fn last_push_wins() {
    let fake = FakePanel::start(FakeState::solution()).await;
    let panel = connect(&fake).await;

    for raw in [2, 1, 3, 5, 2] {
        fake.push(PushMessage::PointStatus { point_id: 5, raw });
    }
    for raw in [2, 4, 2] {
        fake.push(PushMessage::DoorStatus { door_id: 1, raw });
    }
    barrier(&fake, &panel, 100).await;

    assert_eq!(panel.point(5).await.unwrap().status, PointStatus::Open);
    assert_eq!(panel.door(1).await.unwrap().status, DoorStatus::Unlocked);

    panel.disconnect().await;
}

#[tokio::test]
async fn push_after_ack_overrides_confirmation() {
    let mut state = FakeState::solution();
    state.exit_delay = Duration::ZERO;
    let fake = FakePanel::start(state).await;
    let panel = connect(&fake).await;

    panel.arm_away(1, Some("1234")).await.unwrap();
    assert!(wait_for(|| async { area_status(&panel, 1).await == AreaStatus::AllArmed }).await);
    barrier(&fake, &panel, 100).await;
    assert_eq!(area_status(&panel, 1).await, AreaStatus::AllArmed);

    panel.disconnect().await;
}

#[tokio::test]
async fn door_and_output_commands() {
    let fake = FakePanel::start(FakeState::solution()).await;
    let panel = connect(&fake).await;

    panel.door_unlock(1).await.unwrap();
    assert_eq!(panel.door(1).await.unwrap().status, DoorStatus::Unlocked);
    panel.door_relock(1).await.unwrap();
    assert!(panel.door(1).await.unwrap().is_locked());

    panel.set_output_active(1).await.unwrap();
    assert_eq!(panel.output(1).await.unwrap().status, OutputStatus::Active);

    let when = NaiveDate::from_ymd_opt(2026, 10, 19)
        .unwrap()
        .and_hms_opt(12, 30, 0)
        .unwrap();
    panel.set_panel_date(when).await.unwrap();

    let commands = fake.commands();
    assert!(commands.contains(&Command::SetDoor {
        door_id: 1,
        action: DOOR_UNLOCK
    }));
    assert!(commands.contains(&Command::SetDoor {
        door_id: 1,
        action: DOOR_TERMINATE_UNLOCK
    }));
    assert!(commands.contains(&Command::SetOutput {
        output_id: 1,
        state: OUTPUT_ACTIVE
    }));
    assert!(commands.contains(&Command::SetDateTime(when)));

    panel.disconnect().await;
}

#[tokio::test]
async fn faults_and_history_observers() {
    let fake = FakePanel::start(FakeState::solution()).await;
    let panel = connect(&fake).await;
    let faults = counter(panel.faults_observer());
    let history = counter(panel.history_observer());

    fake.push(PushMessage::PanelFaults(1 << 5));
    fake.push(PushMessage::History(history_event(2, "AC Fail")));
    fake.push(PushMessage::History(history_event(2, "AC Fail")));
    fake.push(PushMessage::History(history_event(3, "AC Restore")));

    // Index 2 once, then index 3
    assert!(wait_for(|| async { history.load(Ordering::SeqCst) == 2 }).await);
    assert!(panel.panel_faults().await.is_ac_fail());
    assert_eq!(faults.load(Ordering::SeqCst), 1);
    assert_eq!(panel.events().await.len(), 3);

    panel.disconnect().await;
}

#[tokio::test]
async fn reconnect_notifies_once_and_resyncs() {
    let fake = FakePanel::start(FakeState::solution()).await;
    let panel = connect(&fake).await;
    let connection = counter(panel.connection_observer());
    let door = panel.door(1).await.unwrap();
    let door_changes = counter(&door.status_observer);
    let mut events = panel.subscribe();

    fake.update(|state| {
        state.points.push(EntityRecord::new(7, "Smoke Detector", 1));
        state.doors[0].raw_status = 2;
        state.outputs.clear();
        state.history.push(history_event(3, "Point 7 Added"));
    });
    fake.drop_connections();

    // Disconnected, then connected again
    assert!(
        wait_for(|| async {
            fake.connections() == 2
                && panel.connection_status().await
                && connection.load(Ordering::SeqCst) == 2
                && door_changes.load(Ordering::SeqCst) == 1
        })
        .await,
        "panel did not reconnect and resync"
    );

    let points = panel.points().await;
    assert!(points.contains_key(&7));
    assert_eq!(panel.door(1).await.unwrap().status, DoorStatus::Unlocked);
    assert!(panel.outputs().await.is_empty());
    assert!(panel.events().await.iter().any(|e| e.index == 3));

    let mut disconnected = 0;
    let mut resynced = false;
    let quiet = Duration::from_millis(100);
    while let Ok(Ok(event)) = tokio::time::timeout(quiet, events.recv()).await {
        match event {
            PanelEvent::ConnectionStateChanged {
                new: ConnectionState::Disconnected,
                ..
            } => disconnected += 1,
            PanelEvent::SystemInitComplete => resynced = true,
            _ => {}
        }
    }
    assert_eq!(disconnected, 1);
    assert!(resynced);

    panel.disconnect().await;
}

#[tokio::test]
async fn rejected_list_query_during_resync_is_retried() {
    let fake = FakePanel::start(FakeState::solution()).await;
    let panel = connect(&fake).await;

    fake.update(|state| state.nak_point_list = 1);
    fake.drop_connections();

    // First resync is refused at the point list, the next attempt completes
    assert!(
        wait_for(|| async { fake.connections() == 3 && panel.connection_status().await }).await,
        "panel did not recover from a refused point list"
    );
    assert_ne!(panel.connection_state().await, ConnectionState::Faulted);
    assert_eq!(fake.point_list_commands(), 3);
    assert_eq!(panel.points().await.len(), 3);

    panel.disconnect().await;
}

#[tokio::test]
async fn large_point_list_is_fetched_in_pages() {
    let mut state = FakeState::solution();
    state.points = (1..=120)
        .map(|i| EntityRecord::new(i, format!("Point number {i}"), 1))
        .collect();
    let fake = FakePanel::start(state).await;
    let panel = connect(&fake).await;

    let points = panel.points().await;
    assert_eq!(points.len(), 120);
    assert_eq!(points[&120].name, "Point number 120");
    assert!(fake.point_list_commands() > 1);
    let cursors: Vec<_> = fake
        .commands()
        .into_iter()
        .filter_map(|c| match c {
            Command::PointList { from } => Some(from),
            _ => None,
        })
        .collect();
    assert_eq!(cursors[0], 0);
    assert!(cursors.windows(2).all(|w| w[0] < w[1]));

    panel.disconnect().await;
}

#[tokio::test]
async fn long_history_is_fetched_in_pages() {
    let mut state = FakeState::solution();
    state.history = (1..=100)
        .map(|i| history_event(i, &format!("Area 1 All On by User {i} from keypad")))
        .collect();
    let fake = FakePanel::start(state).await;
    let panel = connect(&fake).await;

    let events = panel.events().await;
    assert_eq!(events.len(), 100);
    assert_eq!(events.last().unwrap().index, 100);
    let history_requests = fake
        .commands()
        .iter()
        .filter(|c| matches!(c, Command::History { .. }))
        .count();
    assert!(history_requests > 1);

    panel.disconnect().await;
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let fake = FakePanel::start(FakeState::solution()).await;
    let config = fake
        .config()
        .reconnect(ReconnectPolicy {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            max_attempts: 2,
            jitter_factor: 0.0,
        })
        .build();
    let panel = BoschPanel::connect(config).await.unwrap();
    let connection = counter(panel.connection_observer());

    fake.update(|state| state.refuse = true);
    fake.drop_connections();

    // Disconnected, then Faulted
    assert!(
        wait_for(|| async {
            panel.connection_state().await == ConnectionState::Faulted
                && connection.load(Ordering::SeqCst) == 2
        })
        .await
    );

    let err = panel.arm_away(1, None).await.unwrap_err();
    assert!(matches!(err, BoschError::NotConnected));
}

#[tokio::test]
async fn rejected_credentials_classified_invalid_auth() {
    let fake = FakePanel::start(FakeState::solution()).await;
    let config = fake
        .config()
        .credentials(Credentials::UserCode("0000".into()))
        .build();

    let err = BoschPanel::connect(config).await.err().unwrap();
    assert_eq!(err.setup_failure(), SetupFailure::InvalidAuth);
    assert!(matches!(err, BoschError::Auth { ref reason } if reason == "No authority"));
}

#[tokio::test]
async fn wrong_credentials_form_rejected_locally() {
    let fake = FakePanel::start(FakeState::solution()).await;
    let config = fake
        .config()
        .credentials(Credentials::Passcode("0123456789".into()))
        .build();

    let err = BoschPanel::connect(config).await.err().unwrap();
    assert_eq!(err.setup_failure(), SetupFailure::InvalidAuth);
    assert_eq!(fake.connections(), 0);
}

#[tokio::test]
async fn unreachable_panel_classified_cannot_connect() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = PanelConfig::builder()
        .host("127.0.0.1")
        .port(port)
        .use_tls(false)
        .credentials(Credentials::UserCode("2580".into()))
        .build();

    let err = BoschPanel::connect(config).await.err().unwrap();
    assert_eq!(err.setup_failure(), SetupFailure::CannotConnect);
}

#[tokio::test]
async fn commands_after_disconnect_fail() {
    let fake = FakePanel::start(FakeState::solution()).await;
    let panel = connect(&fake).await;
    let connection = counter(panel.connection_observer());

    panel.disconnect().await;
    assert_eq!(panel.connection_state().await, ConnectionState::Disconnected);
    assert_eq!(connection.load(Ordering::SeqCst), 1);

    let err = panel.door_unlock(1).await.unwrap_err();
    assert!(matches!(err, BoschError::NotConnected));

    // No reconnection after an explicit disconnect
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fake.connections(), 1);
}
