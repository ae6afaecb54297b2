// MIT License - Copyright (c) 2026 Peter Wright
// Bulk state pull after (re)connect

use std::fmt;

use tracing::{debug, info};

use crate::config::PanelFamily;
use crate::devices::history::HistoryEvent;
use crate::error::{BoschError, DecodeError, Result};
use crate::protocol::{
    AreaRecord, Command, EntityRecord, Page, PanelInfo, parse_fault_word, parse_history_page,
    parse_serial_number,
};
use crate::transport::DirectTransport;

/// Everything read from the panel in one synchronization pass.
#[derive(Debug, Clone)]
pub struct PanelSnapshot {
    pub model_code: u8,
    pub family: PanelFamily,
    pub firmware_version: String,
    pub serial_number: Option<u64>,
    pub areas: Vec<AreaRecord>,
    pub points: Vec<EntityRecord>,
    pub doors: Vec<EntityRecord>,
    pub outputs: Vec<EntityRecord>,
    pub faults: u16,
    pub history: Vec<HistoryEvent>,
}

/// Pull identity, entity lists, faults and new history entries.
///
/// `history_from` is the highest history index already held; only newer
/// entries are requested.
pub async fn synchronize(transport: &DirectTransport, history_from: u32) -> Result<PanelSnapshot> {
    let handshake = transport.handshake();
    let family = handshake.family;
    info!("Synchronizing panel state ({})", family);

    let reply = transport.send_command(&Command::WhatAreYou).await?;
    let info = PanelInfo::parse(&reply.body)?;
    debug!(
        "Panel model 0x{:02X}, firmware {}",
        info.model_code, info.firmware_version
    );

    let serial_number = if family.supports_serial_number() {
        match transport.send_command(&Command::SerialNumber).await {
            Ok(reply) => Some(parse_serial_number(&reply.body)?),
            Err(BoschError::CommandRejected(code)) => {
                debug!("Serial number not available: {}", code);
                None
            }
            Err(e) => return Err(e),
        }
    } else {
        None
    };

    let areas = fetch_all(
        transport,
        "area",
        0,
        |from| Command::AreaList { from },
        AreaRecord::parse_page,
        |r| r.id,
    )
    .await?;
    let points = fetch_all(
        transport,
        "point",
        0,
        |from| Command::PointList { from },
        EntityRecord::parse_page,
        |r| r.id,
    )
    .await?;
    let doors = fetch_all(
        transport,
        "door",
        0,
        |from| Command::DoorList { from },
        EntityRecord::parse_page,
        |r| r.id,
    )
    .await?;
    let outputs = fetch_all(
        transport,
        "output",
        0,
        |from| Command::OutputList { from },
        EntityRecord::parse_page,
        |r| r.id,
    )
    .await?;
    let faults = parse_fault_word(&transport.send_command(&Command::PanelFaults).await?.body)?;
    let history = fetch_all(
        transport,
        "history",
        history_from,
        |from| Command::History { from },
        parse_history_page,
        |e| e.index,
    )
    .await?;

    debug!(
        "Synchronized {} areas, {} points, {} doors, {} outputs, {} history entries",
        areas.len(),
        points.len(),
        doors.len(),
        outputs.len(),
        history.len()
    );

    Ok(PanelSnapshot {
        model_code: handshake.model_code,
        family,
        firmware_version: info.firmware_version,
        serial_number,
        areas,
        points,
        doors,
        outputs,
        faults,
        history,
    })
}

/// Request pages until the panel reports no more, advancing the cursor to
/// the last key of each page.
async fn fetch_all<T, K>(
    transport: &DirectTransport,
    kind: &str,
    mut from: K,
    request: impl Fn(K) -> Command,
    parse: impl Fn(&[u8]) -> std::result::Result<Page<T>, DecodeError>,
    key: impl Fn(&T) -> K,
) -> Result<Vec<T>>
where
    K: Copy + Ord + fmt::Display,
{
    let mut all = Vec::new();
    loop {
        let reply = transport.send_command(&request(from)).await?;
        let page = parse(&reply.body)?;
        let Some(last) = page.records.last().map(&key) else {
            if page.more {
                return Err(BoschError::InvalidResponse {
                    details: format!("empty {kind} page after {from} with more pending"),
                });
            }
            return Ok(all);
        };
        if last <= from {
            return Err(BoschError::InvalidResponse {
                details: format!("{kind} page cursor did not advance past {from}"),
            });
        }
        let more = page.more;
        all.extend(page.records);
        if !more {
            return Ok(all);
        }
        debug!("Fetching next {} page after {}", kind, last);
        from = last;
    }
}
