// MIT License - Copyright (c) 2026 Peter Wright
// MQTT bridge

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use clap::Parser;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::{Duration, interval, sleep};
use tracing::{debug, error, info, warn};

use bosch_mode2_bridge::{
    BoschError, BoschPanel, Credentials, PanelConfig, PanelEvent, PanelFamily, ReconnectPolicy,
    SetupFailure,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "bosch2mqtt")]
#[command(about = "Bridge between a Bosch alarm panel and MQTT")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    panel: PanelToml,
    mqtt: MqttToml,
}

#[derive(Debug, Deserialize)]
struct PanelToml {
    host: String,
    #[serde(default = "default_panel_port")]
    port: u16,
    #[serde(default = "default_tls")]
    tls: bool,
    /// "solution", "amax", "b_series" or "g_series". Optional: the panel
    /// reports its model during the handshake.
    #[serde(default)]
    family: Option<String>,
    /// Solution panels
    #[serde(default)]
    user_code: Option<String>,
    /// AMAX panels, together with `installer_password`
    #[serde(default)]
    installer_code: Option<String>,
    #[serde(default)]
    installer_password: Option<String>,
    /// B and G series panels
    #[serde(default)]
    passcode: Option<String>,
    #[serde(default)]
    arming_code: Option<String>,
    #[serde(default = "default_connect_timeout")]
    connect_timeout_ms: u64,
    #[serde(default = "default_command_timeout")]
    command_timeout_ms: u64,
    #[serde(default)]
    history_capacity: Option<usize>,
    #[serde(default)]
    reconnect: ReconnectToml,
}

#[derive(Debug, Deserialize)]
struct ReconnectToml {
    #[serde(default = "default_base_delay")]
    base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    max_delay_ms: u64,
    /// 0 retries forever
    #[serde(default)]
    max_attempts: u32,
    #[serde(default = "default_jitter")]
    jitter_factor: f64,
}

impl Default for ReconnectToml {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            max_attempts: 0,
            jitter_factor: default_jitter(),
        }
    }
}

fn default_panel_port() -> u16 {
    7700
}
fn default_tls() -> bool {
    true
}
fn default_connect_timeout() -> u64 {
    10000
}
fn default_command_timeout() -> u64 {
    5000
}
fn default_base_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    60000
}
fn default_jitter() -> f64 {
    0.2
}

#[derive(Debug, Deserialize)]
struct MqttToml {
    url: String,
    #[serde(default = "default_client_id")]
    client_id: String,
    #[serde(default = "default_subscribe_topic")]
    subscribe_topic: String,
    #[serde(default = "default_publish_topic")]
    publish_topic: String,
    #[serde(default = "default_snapshot_interval")]
    snapshot_interval_secs: u64,
}

fn default_client_id() -> String {
    "bosch-bridge".to_string()
}
fn default_subscribe_topic() -> String {
    "bosch/cmd".to_string()
}
fn default_publish_topic() -> String {
    "bosch".to_string()
}
fn default_snapshot_interval() -> u64 {
    60
}

fn build_credentials(toml: &PanelToml) -> Result<Credentials> {
    match (
        &toml.user_code,
        &toml.installer_code,
        &toml.installer_password,
        &toml.passcode,
    ) {
        (Some(code), None, None, None) => Ok(Credentials::UserCode(code.clone())),
        (None, Some(code), Some(password), None) => Ok(Credentials::InstallerCode {
            code: code.clone(),
            password: password.clone(),
        }),
        (None, None, None, Some(passcode)) => Ok(Credentials::Passcode(passcode.clone())),
        _ => anyhow::bail!(
            "Exactly one of user_code, installer_code + installer_password or passcode must be set"
        ),
    }
}

fn build_panel_config(toml: &PanelToml) -> Result<PanelConfig> {
    let mut builder = PanelConfig::builder()
        .host(&toml.host)
        .port(toml.port)
        .use_tls(toml.tls)
        .credentials(build_credentials(toml)?)
        .connect_timeout_ms(toml.connect_timeout_ms)
        .command_timeout_ms(toml.command_timeout_ms)
        .reconnect(ReconnectPolicy {
            base_delay: Duration::from_millis(toml.reconnect.base_delay_ms),
            max_delay: Duration::from_millis(toml.reconnect.max_delay_ms),
            max_attempts: toml.reconnect.max_attempts,
            jitter_factor: toml.reconnect.jitter_factor,
        });

    match &toml.family {
        Some(name) => {
            let family = PanelFamily::from_name(name)
                .with_context(|| format!("Unknown panel family: {name}"))?;
            builder = builder.family(family);
        }
        None => info!("No panel family configured; using the model reported by the panel"),
    }
    if let Some(code) = &toml.arming_code {
        builder = builder.arming_code(code);
    }
    if let Some(capacity) = toml.history_capacity {
        builder = builder.history_capacity(capacity);
    }
    Ok(builder.build())
}

// ---------------------------------------------------------------------------
// MQTT JSON types
// ---------------------------------------------------------------------------

// Published messages: all share the {now, op, ...} flat structure

#[derive(Serialize)]
struct MqttSnapshot {
    now: u64,
    op: String,
    state: MqttSnapshotState,
}

#[derive(Serialize)]
struct MqttSnapshotState {
    panel: MqttPanelState,
    areas: Vec<MqttAreaState>,
    points: Vec<MqttEntityState>,
    doors: Vec<MqttEntityState>,
    outputs: Vec<MqttEntityState>,
}

#[derive(Serialize)]
struct MqttPanelState {
    model: Option<String>,
    firmware: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    serial: Option<u64>,
    connected: bool,
    faults: Vec<String>,
}

#[derive(Serialize)]
struct MqttAreaState {
    id: u16,
    name: String,
    status: String,
    #[serde(rename = "allReady")]
    all_ready: bool,
    #[serde(rename = "partReady")]
    part_ready: bool,
    triggered: bool,
    alarms: Vec<String>,
    faults: Vec<String>,
}

#[derive(Serialize)]
struct MqttEntityState {
    id: u16,
    name: String,
    status: String,
}

// Entity status events: {now, op, id, status}
#[derive(Serialize)]
struct MqttStatusEvent {
    now: u64,
    op: String,
    id: u16,
    status: String,
}

#[derive(Serialize)]
struct MqttAreaReady {
    now: u64,
    op: String,
    id: u16,
    #[serde(rename = "allReady")]
    all_ready: bool,
    #[serde(rename = "partReady")]
    part_ready: bool,
    faults: Vec<String>,
}

#[derive(Serialize)]
struct MqttAreaAlarms {
    now: u64,
    op: String,
    id: u16,
    alarms: Vec<String>,
}

#[derive(Serialize)]
struct MqttHistory {
    now: u64,
    op: String,
    index: u32,
    timestamp: String,
    description: String,
}

#[derive(Serialize)]
struct MqttFaults {
    now: u64,
    op: String,
    faults: Vec<String>,
}

#[derive(Serialize)]
struct MqttConnection {
    now: u64,
    op: String,
    state: String,
    connected: bool,
}

// CMD_ACK response
#[derive(Serialize)]
struct MqttCmdAck {
    now: u64,
    op: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    src: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

// Inbound command (subscribed)
#[derive(Deserialize)]
struct MqttCommand {
    op: String,
    #[serde(default)]
    #[allow(dead_code)]
    op_id: Option<String>,
    #[serde(default)]
    area: Option<u16>,
    #[serde(default)]
    door: Option<u16>,
    #[serde(default)]
    output: Option<u16>,
    #[serde(default)]
    code: Option<String>,
    /// Local panel time, `YYYY-MM-DDTHH:MM:SS`
    #[serde(default)]
    datetime: Option<String>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

async fn publish_json(client: &AsyncClient, topic: &str, payload: &impl Serialize, retain: bool) {
    match serde_json::to_string(payload) {
        Ok(json) => {
            if let Err(e) = client.publish(topic, QoS::AtLeastOnce, retain, json).await {
                error!("Failed to publish to {topic}: {e}");
            }
        }
        Err(e) => error!("Failed to serialize MQTT payload: {e}"),
    }
}

async fn publish_status_event(client: &AsyncClient, topic: &str, op: &str, id: u16, status: &str) {
    let msg = MqttStatusEvent {
        now: now_epoch_ms(),
        op: op.to_string(),
        id,
        status: status.to_string(),
    };
    publish_json(client, topic, &msg, false).await;
}

async fn publish_cmd_ack(
    client: &AsyncClient,
    topic: &str,
    error: Option<String>,
    src: Option<serde_json::Value>,
    data: Option<serde_json::Value>,
) {
    let msg = MqttCmdAck {
        now: now_epoch_ms(),
        op: "CMD_ACK".to_string(),
        success: error.is_none(),
        error,
        src,
        data,
    };
    publish_json(client, topic, &msg, false).await;
}

async fn build_snapshot(panel: &BoschPanel) -> MqttSnapshot {
    let identity = panel.identity().await;
    let faults = panel.panel_faults().await;

    let areas = panel
        .areas()
        .await
        .into_values()
        .map(|a| MqttAreaState {
            id: a.id,
            status: a.status.as_str().to_string(),
            all_ready: a.is_all_ready(),
            part_ready: a.is_part_ready(),
            triggered: a.is_triggered(),
            name: a.name,
            alarms: a.alarms,
            faults: a.faults,
        })
        .collect();
    let points = panel
        .points()
        .await
        .into_values()
        .map(|p| MqttEntityState {
            id: p.id,
            status: p.status.as_str().to_string(),
            name: p.name,
        })
        .collect();
    let doors = panel
        .doors()
        .await
        .into_values()
        .map(|d| MqttEntityState {
            id: d.id,
            status: d.status.as_str().to_string(),
            name: d.name,
        })
        .collect();
    let outputs = panel
        .outputs()
        .await
        .into_values()
        .map(|o| MqttEntityState {
            id: o.id,
            status: o.status.as_str().to_string(),
            name: o.name,
        })
        .collect();

    MqttSnapshot {
        now: now_epoch_ms(),
        op: "SNAPSHOT".to_string(),
        state: MqttSnapshotState {
            panel: MqttPanelState {
                model: identity.as_ref().map(|i| i.model.clone()),
                firmware: identity.as_ref().map(|i| i.firmware_version.clone()),
                serial: identity.as_ref().and_then(|i| i.serial_number),
                connected: panel.connection_status().await,
                faults: fault_strings(faults),
            },
            areas,
            points,
            doors,
            outputs,
        },
    }
}

fn fault_strings(faults: bosch_mode2_bridge::PanelFaults) -> Vec<String> {
    faults.descriptions().into_iter().map(str::to_string).collect()
}

async fn publish_snapshot(client: &AsyncClient, topic: &str, panel: &BoschPanel) {
    let snapshot = build_snapshot(panel).await;
    publish_json(client, topic, &snapshot, true).await;
}

// ---------------------------------------------------------------------------
// Panel event → MQTT
// ---------------------------------------------------------------------------

async fn handle_panel_event(
    event: PanelEvent,
    client: &AsyncClient,
    topic: &str,
    panel: &BoschPanel,
) {
    match event {
        PanelEvent::AreaStatusChanged {
            area_id,
            old_status,
            new_status,
        } => {
            info!("Area {area_id}: {old_status} -> {new_status}");
            publish_status_event(client, topic, "AREA_STATUS", area_id, new_status.as_str()).await;
        }

        PanelEvent::AreaReadyChanged {
            area_id,
            all_ready,
            part_ready,
            faults,
        } => {
            debug!("Area {area_id}: ready all={all_ready} part={part_ready}");
            let msg = MqttAreaReady {
                now: now_epoch_ms(),
                op: "AREA_READY".to_string(),
                id: area_id,
                all_ready,
                part_ready,
                faults,
            };
            publish_json(client, topic, &msg, false).await;
        }

        PanelEvent::AreaAlarmsChanged { area_id, alarms } => {
            if alarms.is_empty() {
                info!("Area {area_id}: alarms cleared");
            } else {
                warn!("Area {area_id}: {}", alarms.join(", "));
            }
            let msg = MqttAreaAlarms {
                now: now_epoch_ms(),
                op: "AREA_ALARMS".to_string(),
                id: area_id,
                alarms,
            };
            publish_json(client, topic, &msg, false).await;
        }

        PanelEvent::PointStatusChanged {
            point_id,
            new_status,
            ..
        } => {
            debug!("Point {point_id}: {}", new_status.as_str());
            let status = new_status.as_str();
            publish_status_event(client, topic, "POINT_STATUS", point_id, status).await;
        }

        PanelEvent::DoorStatusChanged {
            door_id, new_status, ..
        } => {
            info!("Door {door_id}: {}", new_status.as_str());
            publish_status_event(client, topic, "DOOR_STATUS", door_id, new_status.as_str()).await;
        }

        PanelEvent::OutputStatusChanged {
            output_id,
            new_status,
            ..
        } => {
            info!("Output {output_id}: {}", new_status.as_str());
            publish_status_event(client, topic, "OUTPUT_STATUS", output_id, new_status.as_str())
                .await;
        }

        PanelEvent::FaultsChanged { new, .. } => {
            let faults = fault_strings(new);
            if faults.is_empty() {
                info!("Panel faults cleared");
            } else {
                warn!("Panel faults: {}", faults.join(", "));
            }
            let msg = MqttFaults {
                now: now_epoch_ms(),
                op: "FAULTS".to_string(),
                faults,
            };
            publish_json(client, topic, &msg, false).await;
        }

        PanelEvent::History(event) => {
            info!("History {}: {}", event.index, event.description);
            let msg = MqttHistory {
                now: now_epoch_ms(),
                op: "HISTORY".to_string(),
                index: event.index,
                timestamp: event.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
                description: event.description,
            };
            publish_json(client, topic, &msg, false).await;
        }

        PanelEvent::ConnectionStateChanged { old, new } => {
            if new.is_connected() {
                info!("Panel connected");
            } else {
                warn!("Panel connection {old} -> {new}");
            }
            let msg = MqttConnection {
                now: now_epoch_ms(),
                op: "CONNECTION".to_string(),
                state: new.as_str().to_string(),
                connected: new.is_connected(),
            };
            publish_json(client, topic, &msg, true).await;
        }

        PanelEvent::SystemInitComplete => {
            info!("Panel synchronized, publishing snapshot");
            publish_snapshot(client, topic, panel).await;
        }
    }
}

// ---------------------------------------------------------------------------
// MQTT command handler
// ---------------------------------------------------------------------------

/// Execute a panel command future and log the result. Returns the error text
/// on failure.
async fn exec_panel_cmd(
    op: &str,
    label: &str,
    fut: impl std::future::Future<Output = bosch_mode2_bridge::Result<()>>,
) -> Option<String> {
    match fut.await {
        Ok(()) => {
            info!("{op} {label}: success");
            None
        }
        Err(e @ BoschError::CommandTimeout { .. }) => {
            warn!("{op} {label}: {e}; outcome unknown until the next push");
            Some(e.to_string())
        }
        Err(e) => {
            error!("{op} {label} failed: {e}");
            Some(e.to_string())
        }
    }
}

fn missing(op: &str, field: &str) -> Option<String> {
    warn!("{op}: missing {field}");
    Some(format!("missing {field}"))
}

async fn handle_command(
    payload_str: &str,
    cmd: MqttCommand,
    client: &AsyncClient,
    topic: &str,
    panel: &BoschPanel,
) {
    // Parse the raw payload as a JSON value for the CMD_ACK src field
    let src_json = serde_json::from_str::<serde_json::Value>(payload_str).ok();
    let op = cmd.op.as_str();
    let code = cmd.code.as_deref();

    let error = match op {
        "SNAPSHOT" => {
            debug!("Command: SNAPSHOT");
            let snapshot = build_snapshot(panel).await;
            let snapshot_value = serde_json::to_value(&snapshot).ok();
            publish_json(client, topic, &snapshot, true).await;
            publish_cmd_ack(client, topic, None, src_json, snapshot_value).await;
            return;
        }

        "PING" => {
            info!("Command: PING");
            None
        }

        "ARM_AWAY" | "ARM_HOME" | "DISARM" => {
            let id = cmd.area.unwrap_or(1);
            info!("Command: {op} area {id}");
            let label = format!("area {id}");
            match op {
                "ARM_AWAY" => exec_panel_cmd(op, &label, panel.arm_away(id, code)).await,
                "ARM_HOME" => exec_panel_cmd(op, &label, panel.arm_home(id, code)).await,
                _ => exec_panel_cmd(op, &label, panel.disarm(id, code)).await,
            }
        }

        "DOOR_UNLOCK" | "DOOR_RELOCK" => match cmd.door {
            Some(id) => {
                info!("Command: {op} door {id}");
                let label = format!("door {id}");
                if op == "DOOR_UNLOCK" {
                    exec_panel_cmd(op, &label, panel.door_unlock(id)).await
                } else {
                    exec_panel_cmd(op, &label, panel.door_relock(id)).await
                }
            }
            None => missing(op, "door"),
        },

        "OUTPUT_ON" | "OUTPUT_OFF" => match cmd.output {
            Some(id) => {
                info!("Command: {op} output {id}");
                let label = format!("output {id}");
                if op == "OUTPUT_ON" {
                    exec_panel_cmd(op, &label, panel.set_output_active(id)).await
                } else {
                    exec_panel_cmd(op, &label, panel.set_output_inactive(id)).await
                }
            }
            None => missing(op, "output"),
        },

        "SET_DATE" => {
            let datetime = match &cmd.datetime {
                Some(text) => match NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
                    Ok(dt) => dt,
                    Err(e) => {
                        warn!("SET_DATE: invalid datetime {text}: {e}");
                        let error = Some(format!("invalid datetime: {e}"));
                        publish_cmd_ack(client, topic, error, src_json, None).await;
                        return;
                    }
                },
                None => chrono::Local::now().naive_local(),
            };
            info!("Command: SET_DATE {datetime}");
            exec_panel_cmd(op, "clock", panel.set_panel_date(datetime)).await
        }

        other => {
            warn!("Unknown command: {other}");
            Some(format!("unknown command: {other}"))
        }
    };

    publish_cmd_ack(client, topic, error, src_json, None).await;
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

/// Connect to the panel, retrying transient failures with the configured
/// backoff. Rejected credentials are fatal.
async fn connect_panel(config: &PanelConfig) -> Result<BoschPanel> {
    let policy = &config.reconnect;
    let mut attempt: u32 = 0;
    loop {
        match BoschPanel::connect(config.clone()).await {
            Ok(panel) => return Ok(panel),
            Err(e) if e.setup_failure() == SetupFailure::InvalidAuth => {
                return Err(e).context("Panel rejected the configured credentials");
            }
            Err(e) => {
                attempt += 1;
                if policy.max_attempts != 0 && attempt >= policy.max_attempts {
                    return Err(e).context("Unable to connect to panel");
                }
                let delay = policy.delay(attempt - 1);
                error!(
                    "Connection attempt {attempt} failed: {e}. Retrying in {:.1}s...",
                    delay.as_secs_f64()
                );
                sleep(delay).await;
            }
        }
    }
}

fn load_config(path: &str) -> Result<(Config, PanelConfig)> {
    let text = std::fs::read_to_string(path).context("Failed to read config file")?;
    let config: Config = toml::from_str(&text).context("Failed to parse config file")?;
    let panel_config = build_panel_config(&config.panel)?;
    parse_mqtt_url(&config.mqtt.url)?;
    Ok((config, panel_config))
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=bosch_mode2_bridge=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();
    let (mut config, mut panel_config) = load_config(&cli.config)?;

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        let (mqtt_host, mqtt_port) = parse_mqtt_url(&config.mqtt.url)?;
        let publish_topic = config.mqtt.publish_topic.clone();
        let subscribe_topic = config.mqtt.subscribe_topic.clone();

        info!("Connecting to Bosch panel at {}", panel_config.address());
        let panel = Arc::new(connect_panel(&panel_config).await?);
        if let Some(identity) = panel.identity().await {
            info!(
                "Panel connected: {} (firmware {})",
                identity.model, identity.firmware_version
            );
        }

        // Set up MQTT
        let mut mqtt_opts = MqttOptions::new(&config.mqtt.client_id, &mqtt_host, mqtt_port);
        mqtt_opts.set_keep_alive(Duration::from_secs(30));
        let (client, mut eventloop) = AsyncClient::new(mqtt_opts, 256);

        client
            .subscribe(&subscribe_topic, QoS::AtLeastOnce)
            .await
            .context("Failed to subscribe to MQTT topic")?;
        info!("MQTT: subscribed to {subscribe_topic}");

        publish_snapshot(&client, &publish_topic, &panel).await;

        // Task 1: Panel event listener. The library reconnects and re-syncs on
        // its own; a SystemInitComplete after reconnect republishes the snapshot.
        let panel_events = Arc::clone(&panel);
        let client_events = client.clone();
        let topic_events = publish_topic.clone();
        let mut event_rx = panel.subscribe();
        let event_handle = tokio::spawn(async move {
            loop {
                match event_rx.recv().await {
                    Ok(event) => {
                        handle_panel_event(event, &client_events, &topic_events, &panel_events)
                            .await;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Event receiver lagged, missed {n} events; republishing snapshot");
                        publish_snapshot(&client_events, &topic_events, &panel_events).await;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        info!("Event channel closed");
                        break;
                    }
                }
            }
        });

        // Task 2: MQTT event loop (receives messages, handles commands)
        let panel_cmds = Arc::clone(&panel);
        let client_cmds = client.clone();
        let topic_cmds = publish_topic.clone();
        let sub_topic = subscribe_topic.clone();
        let mqtt_handle = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        // rumqttc does not resubscribe after a broker reconnect
                        info!("MQTT: connected, subscribing to {sub_topic}");
                        if let Err(e) = client_cmds.subscribe(&sub_topic, QoS::AtLeastOnce).await {
                            error!("Failed to subscribe to {sub_topic}: {e}");
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(msg))) => {
                        if msg.topic == sub_topic {
                            let payload = String::from_utf8_lossy(&msg.payload);
                            match serde_json::from_str::<MqttCommand>(&payload) {
                                Ok(cmd) => {
                                    if cmd.op == "SNAPSHOT" {
                                        debug!("MQTT command received: {payload}");
                                    } else {
                                        info!("MQTT command received: {payload}");
                                    }
                                    handle_command(
                                        &payload,
                                        cmd,
                                        &client_cmds,
                                        &topic_cmds,
                                        &panel_cmds,
                                    )
                                    .await;
                                }
                                Err(e) => {
                                    warn!("Failed to parse MQTT command: {e}");
                                }
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("MQTT event loop error: {e}");
                        sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        // Task 3: Snapshot timer
        let panel_snap = Arc::clone(&panel);
        let client_snap = client.clone();
        let topic_snap = publish_topic.clone();
        let snapshot_interval = Duration::from_secs(config.mqtt.snapshot_interval_secs.max(1));
        let snap_handle = tokio::spawn(async move {
            let mut ticker = interval(snapshot_interval);
            // Skip the first immediate tick (we already published an initial snapshot)
            ticker.tick().await;
            loop {
                ticker.tick().await;
                publish_snapshot(&client_snap, &topic_snap, &panel_snap).await;
            }
        });

        // Wait for a signal
        info!("MQTT bridge running. Send SIGHUP to restart, SIGINT/SIGTERM to stop.");
        let restart = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
                false
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                false
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, reloading config and restarting connections...");
                true
            }
        };

        event_handle.abort();
        mqtt_handle.abort();
        snap_handle.abort();

        panel.disconnect().await;

        if !restart {
            break;
        }

        // Reload config from disk; keep previous config on failure
        info!("Reloading config from {}", cli.config);
        match load_config(&cli.config) {
            Ok((new_config, new_panel_config)) => {
                config = new_config;
                panel_config = new_panel_config;
                info!("Config reloaded successfully");
            }
            Err(e) => warn!("Failed to reload config, keeping previous: {e:#}"),
        }

        info!("Reconnecting...");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Parse an MQTT URL like "mqtt://host:port" into (host, port).
fn parse_mqtt_url(url: &str) -> Result<(String, u16)> {
    let stripped = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    let (host, port_str) = stripped
        .rsplit_once(':')
        .context("MQTT URL must be in format mqtt://host:port")?;

    let port: u16 = port_str.parse().context("Invalid MQTT port number")?;

    Ok((host.to_string(), port))
}
