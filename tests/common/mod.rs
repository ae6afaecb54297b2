// MIT License - Copyright (c) 2026 Peter Wright
// In-process fake panel speaking Mode 2 over loopback TCP

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use bosch_mode2_bridge::codec::{Frame, FrameDecoder, FrameType};
use bosch_mode2_bridge::protocol::{
    AreaRecord, Command, EntityRecord, PanelInfo, PushMessage, encode_history_page,
};
use bosch_mode2_bridge::transport::auth::AuthChallenge;
use bosch_mode2_bridge::{
    Credentials, HistoryEvent, NakCode, PanelConfig, PanelConfigBuilder, PanelFamily,
    ReconnectPolicy,
};

const NONCE: u32 = 0x1234_5678;

/// What the fake panel reports and accepts.
#[derive(Debug, Clone)]
pub struct FakeState {
    pub model_code: u8,
    pub credentials: Credentials,
    pub firmware_version: String,
    pub areas: Vec<AreaRecord>,
    pub points: Vec<EntityRecord>,
    pub doors: Vec<EntityRecord>,
    pub outputs: Vec<EntityRecord>,
    pub faults: u16,
    pub history: Vec<HistoryEvent>,
    /// Delay between an arm ACK and the armed status push
    pub exit_delay: Duration,
    /// NAK every arm request with "cannot arm"
    pub nak_arm: bool,
    /// Close new connections before sending the challenge
    pub refuse: bool,
    /// NAK this many point list requests, then answer normally
    pub nak_point_list: u32,
}

impl FakeState {
    /// A Solution 3000 with one area, three points, one door and one output.
    pub fn solution() -> Self {
        Self {
            model_code: 0x21,
            credentials: Credentials::UserCode("2580".into()),
            firmware_version: "1.02".into(),
            areas: vec![AreaRecord {
                id: 1,
                name: "Main House".into(),
                raw_status: 0x01,
                ready: 0x03,
                alarms: vec![],
                fault_points: vec![],
            }],
            points: vec![
                EntityRecord::new(1, "Front Door", 1),
                EntityRecord::new(2, "Kitchen Window", 1),
                EntityRecord::new(5, "Hall PIR", 1),
            ],
            doors: vec![EntityRecord::new(1, "Lobby", 4)],
            outputs: vec![EntityRecord::new(1, "Siren", 0)],
            faults: 0,
            history: vec![history_event(1, "Area 1 Disarmed by User 1")],
            exit_delay: Duration::from_millis(100),
            nak_arm: false,
            refuse: false,
            nak_point_list: 0,
        }
    }

    fn apply(&mut self, push: &PushMessage) {
        match push {
            PushMessage::AreaStatus { area_id, raw } => {
                if let Some(a) = self.areas.iter_mut().find(|a| a.id == *area_id) {
                    a.raw_status = *raw;
                }
            }
            PushMessage::PointStatus { point_id, raw } => {
                set_raw(&mut self.points, *point_id, *raw)
            }
            PushMessage::DoorStatus { door_id, raw } => set_raw(&mut self.doors, *door_id, *raw),
            PushMessage::OutputStatus { output_id, raw } => {
                set_raw(&mut self.outputs, *output_id, *raw)
            }
            PushMessage::PanelFaults(word) => self.faults = *word,
            PushMessage::History(event) => self.history.push(event.clone()),
            PushMessage::AreaReady { .. } | PushMessage::AreaAlarms { .. } => {}
        }
    }
}

fn set_raw(records: &mut [EntityRecord], id: u16, raw: u8) {
    if let Some(r) = records.iter_mut().find(|r| r.id == id) {
        r.raw_status = raw;
    }
}

pub fn history_event(index: u32, description: &str) -> HistoryEvent {
    HistoryEvent {
        index,
        timestamp: NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(8, 0, index % 60)
            .unwrap(),
        description: description.into(),
    }
}

#[derive(Debug, Clone)]
enum Control {
    Push(PushMessage),
    Drop,
}

struct Inner {
    state: Mutex<FakeState>,
    commands: Mutex<Vec<Command>>,
    connections: AtomicUsize,
    control: broadcast::Sender<Control>,
}

/// A panel double listening on 127.0.0.1.
pub struct FakePanel {
    pub port: u16,
    inner: Arc<Inner>,
}

impl FakePanel {
    pub async fn start(state: FakeState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (control, _) = broadcast::channel(64);
        let inner = Arc::new(Inner {
            state: Mutex::new(state),
            commands: Mutex::new(Vec::new()),
            connections: AtomicUsize::new(0),
            control,
        });

        let accept_inner = inner.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let inner = accept_inner.clone();
                tokio::spawn(serve(stream, inner));
            }
        });

        Self { port, inner }
    }

    /// Builder preset for this panel: plain TCP, short timeouts, fast retries.
    pub fn config(&self) -> PanelConfigBuilder {
        PanelConfig::builder()
            .host("127.0.0.1")
            .port(self.port)
            .use_tls(false)
            .family(PanelFamily::Solution)
            .credentials(Credentials::UserCode("2580".into()))
            .connect_timeout_ms(2000)
            .command_timeout_ms(1000)
            .reconnect(ReconnectPolicy {
                base_delay: Duration::from_millis(20),
                max_delay: Duration::from_millis(100),
                max_attempts: 50,
                jitter_factor: 0.0,
            })
    }

    /// Update the panel state and send the push to connected clients.
    pub fn push(&self, push: PushMessage) {
        self.inner.state.lock().unwrap().apply(&push);
        let _ = self.inner.control.send(Control::Push(push));
    }

    /// Close every open connection.
    pub fn drop_connections(&self) {
        let _ = self.inner.control.send(Control::Drop);
    }

    pub fn update(&self, f: impl FnOnce(&mut FakeState)) {
        f(&mut self.inner.state.lock().unwrap());
    }

    pub fn commands(&self) -> Vec<Command> {
        self.inner.commands.lock().unwrap().clone()
    }

    pub fn point_list_commands(&self) -> usize {
        self.commands()
            .iter()
            .filter(|c| matches!(c, Command::PointList { .. }))
            .count()
    }

    pub fn arm_commands(&self) -> Vec<Command> {
        self.commands()
            .into_iter()
            .filter(|c| matches!(c, Command::AreaArm { .. }))
            .collect()
    }

    /// Number of accepted connections that completed the handshake.
    pub fn connections(&self) -> usize {
        self.inner.connections.load(Ordering::SeqCst)
    }
}

type Writer = Arc<tokio::sync::Mutex<OwnedWriteHalf>>;

async fn write_frame(writer: &Writer, frame: Frame) -> std::io::Result<()> {
    let bytes = frame.encode().unwrap();
    let mut w = writer.lock().await;
    w.write_all(&bytes).await?;
    w.flush().await
}

async fn serve(stream: TcpStream, inner: Arc<Inner>) {
    let (model_code, expected, refuse) = {
        let state = inner.state.lock().unwrap();
        (state.model_code, state.credentials.clone(), state.refuse)
    };
    if refuse {
        return;
    }

    let mut control = inner.control.subscribe();
    let (mut reader, writer) = stream.into_split();
    let writer: Writer = Arc::new(tokio::sync::Mutex::new(writer));

    let challenge = AuthChallenge {
        model_code,
        nonce: NONCE,
    };
    if write_frame(&writer, challenge.to_frame()).await.is_err() {
        return;
    }

    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; 2048];
    let mut authenticated = false;

    loop {
        loop {
            let frame = match decoder.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(_) => return,
            };

            if !authenticated {
                let accepted = frame.frame_type == FrameType::AuthResponse
                    && matches!(
                        Credentials::parse_response(&frame.body),
                        Ok((ref creds, nonce)) if *creds == expected && nonce == NONCE
                    );
                if !accepted {
                    let nak = Frame::new(
                        FrameType::Nak,
                        frame.txn,
                        vec![NakCode::NoAuthority.as_byte()],
                    );
                    let _ = write_frame(&writer, nak).await;
                    return;
                }
                if write_frame(&writer, Frame::new(FrameType::Ack, frame.txn, Vec::new()))
                    .await
                    .is_err()
                {
                    return;
                }
                authenticated = true;
                inner.connections.fetch_add(1, Ordering::SeqCst);
                continue;
            }

            if frame.frame_type != FrameType::Request {
                continue;
            }
            if respond(&inner, &writer, frame).await.is_err() {
                return;
            }
        }

        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) | Err(_) => return,
                Ok(n) => decoder.extend(&buf[..n]),
            },
            control = control.recv() => match control {
                Ok(Control::Push(push)) if authenticated => {
                    if write_frame(&writer, push.to_frame().unwrap()).await.is_err() {
                        return;
                    }
                }
                Ok(Control::Push(_)) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Ok(Control::Drop) | Err(broadcast::error::RecvError::Closed) => {
                    let _ = writer.lock().await.shutdown().await;
                    return;
                }
            },
        }
    }
}

async fn respond(inner: &Arc<Inner>, writer: &Writer, frame: Frame) -> std::io::Result<()> {
    let txn = frame.txn;
    let nak = |code: NakCode| Frame::new(FrameType::Nak, txn, vec![code.as_byte()]);
    let ack = |body: bytes::Bytes| Frame::new(FrameType::Ack, txn, body);

    let command = match Command::decode(&frame.body) {
        Ok(command) => command,
        Err(_) => return write_frame(writer, nak(NakCode::InvalidCommand)).await,
    };
    inner.commands.lock().unwrap().push(command.clone());

    let state = {
        let mut state = inner.state.lock().unwrap();
        let snapshot = state.clone();
        if matches!(command, Command::PointList { .. }) && state.nak_point_list > 0 {
            state.nak_point_list -= 1;
        }
        snapshot
    };
    let reply = match &command {
        Command::WhatAreYou => ack(
            PanelInfo {
                model_code: state.model_code,
                firmware_version: state.firmware_version.clone(),
            }
            .encode()
            .unwrap(),
        ),
        Command::SerialNumber => nak(NakCode::Unsupported),
        Command::AreaList { from } => {
            let rest: Vec<_> = state.areas.iter().filter(|a| a.id > *from).cloned().collect();
            ack(AreaRecord::encode_page(&rest).unwrap().0)
        }
        Command::PointList { .. } if state.nak_point_list > 0 => nak(NakCode::InvalidState),
        Command::PointList { from } => ack(entity_page(&state.points, *from)),
        Command::DoorList { from } => ack(entity_page(&state.doors, *from)),
        Command::OutputList { from } => ack(entity_page(&state.outputs, *from)),
        Command::PanelFaults => ack(bytes::Bytes::copy_from_slice(&state.faults.to_be_bytes())),
        Command::History { from } => {
            let newer: Vec<_> = state
                .history
                .iter()
                .filter(|e| e.index > *from)
                .cloned()
                .collect();
            ack(encode_history_page(&newer).unwrap().0)
        }
        Command::AreaArm { area_id, arm_code } => {
            if state.nak_arm {
                nak(NakCode::CannotArm)
            } else if !state.areas.iter().any(|a| a.id == *area_id) {
                nak(NakCode::InvalidArea)
            } else {
                // Compact family arm types: 1 disarm, 2 all, 3 part
                let (raw, delay) = match arm_code {
                    2 => (0x04, state.exit_delay),
                    3 => (0x05, state.exit_delay),
                    _ => (0x01, Duration::ZERO),
                };
                let push = PushMessage::AreaStatus {
                    area_id: *area_id,
                    raw,
                };
                write_frame(writer, ack(bytes::Bytes::new())).await?;
                let inner = inner.clone();
                let writer = writer.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    inner.state.lock().unwrap().apply(&push);
                    let _ = write_frame(&writer, push.to_frame().unwrap()).await;
                });
                return Ok(());
            }
        }
        Command::SetDoor { .. } | Command::SetOutput { .. } | Command::SetDateTime(_) => {
            ack(bytes::Bytes::new())
        }
    };
    write_frame(writer, reply).await
}

/// Records after `from`, as many as fit in one reply.
fn entity_page(records: &[EntityRecord], from: u16) -> bytes::Bytes {
    let rest: Vec<_> = records.iter().filter(|r| r.id > from).cloned().collect();
    EntityRecord::encode_page(&rest).unwrap().0
}

/// Poll `check` until it holds or two seconds pass.
pub async fn wait_for<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
