// MIT License - Copyright (c) 2026 Peter Wright
// Mode 2 request bodies, reply records and push messages

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::codec::{Frame, FrameType};
use crate::constants::{
    MAX_BODY_LEN, OP_AREA_ARM, OP_AREA_LIST, OP_DOOR_LIST, OP_HISTORY, OP_OUTPUT_LIST,
    OP_PANEL_FAULTS, OP_POINT_LIST, OP_SERIAL_NUMBER, OP_SET_DATE_TIME, OP_SET_DOOR,
    OP_SET_OUTPUT, OP_WHAT_ARE_YOU, PUSH_AREA_ALARMS, PUSH_AREA_READY, PUSH_AREA_STATUS,
    PUSH_DOOR_STATUS, PUSH_OUTPUT_STATUS, PUSH_PANEL_FAULTS, PUSH_POINT_STATUS,
};
use crate::devices::history::HistoryEvent;
use crate::error::DecodeError;

/// Requests the client can send to the panel.
///
/// Every request body starts with its opcode byte; multi-byte fields are
/// big-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `[0x01]` - Panel model and firmware version.
    /// Reply: `[model u8][len u8][firmware]`.
    WhatAreYou,
    /// `[0x4A]` - Serial number. B/G series only; others NAK.
    /// Reply: `[serial u64]`.
    SerialNumber,
    /// `[0x24][from u16]` - Areas with id greater than `from`.
    /// Reply: one [`Page`] of area records.
    AreaList { from: u16 },
    /// `[0x3C][from u16]` - Points with id greater than `from`.
    /// Reply: one [`Page`] of entity records.
    PointList { from: u16 },
    /// `[0x2B][from u16]` - Doors with id greater than `from`.
    DoorList { from: u16 },
    /// `[0x30][from u16]` - Outputs with id greater than `from`.
    OutputList { from: u16 },
    /// `[0x15][from u32]` - History entries with index greater than `from`.
    /// Reply: one [`Page`] of history records.
    History { from: u32 },
    /// `[0x22]` - Panel fault word. Reply: `[faults u16]`.
    PanelFaults,
    /// `[0x27][arm type u8][area u16]` - Arm or disarm an area.
    AreaArm { area_id: u16, arm_code: u8 },
    /// `[0x2C][action u8][door u16]` - Door action.
    SetDoor { door_id: u16, action: u8 },
    /// `[0x32][output u16][state u8]` - Set output state.
    SetOutput { output_id: u16, state: u8 },
    /// `[0x19][timestamp 7]` - Set panel clock.
    SetDateTime(NaiveDateTime),
}

impl Command {
    pub fn opcode(&self) -> u8 {
        match self {
            Command::WhatAreYou => OP_WHAT_ARE_YOU,
            Command::SerialNumber => OP_SERIAL_NUMBER,
            Command::AreaList { .. } => OP_AREA_LIST,
            Command::PointList { .. } => OP_POINT_LIST,
            Command::DoorList { .. } => OP_DOOR_LIST,
            Command::OutputList { .. } => OP_OUTPUT_LIST,
            Command::History { .. } => OP_HISTORY,
            Command::PanelFaults => OP_PANEL_FAULTS,
            Command::AreaArm { .. } => OP_AREA_ARM,
            Command::SetDoor { .. } => OP_SET_DOOR,
            Command::SetOutput { .. } => OP_SET_OUTPUT,
            Command::SetDateTime(_) => OP_SET_DATE_TIME,
        }
    }

    /// Short name used in logs and timeout errors.
    pub fn name(&self) -> &'static str {
        match self {
            Command::WhatAreYou => "WHAT_ARE_YOU",
            Command::SerialNumber => "SERIAL_NUMBER",
            Command::AreaList { .. } => "AREA_LIST",
            Command::PointList { .. } => "POINT_LIST",
            Command::DoorList { .. } => "DOOR_LIST",
            Command::OutputList { .. } => "OUTPUT_LIST",
            Command::History { .. } => "HISTORY",
            Command::PanelFaults => "PANEL_FAULTS",
            Command::AreaArm { .. } => "AREA_ARM",
            Command::SetDoor { .. } => "SET_DOOR",
            Command::SetOutput { .. } => "SET_OUTPUT",
            Command::SetDateTime(_) => "SET_DATE_TIME",
        }
    }

    pub fn encode_body(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(8);
        out.put_u8(self.opcode());
        match self {
            Command::AreaList { from }
            | Command::PointList { from }
            | Command::DoorList { from }
            | Command::OutputList { from } => out.put_u16(*from),
            Command::History { from } => out.put_u32(*from),
            Command::AreaArm { area_id, arm_code } => {
                out.put_u8(*arm_code);
                out.put_u16(*area_id);
            }
            Command::SetDoor { door_id, action } => {
                out.put_u8(*action);
                out.put_u16(*door_id);
            }
            Command::SetOutput { output_id, state } => {
                out.put_u16(*output_id);
                out.put_u8(*state);
            }
            Command::SetDateTime(when) => put_timestamp(&mut out, when),
            _ => {}
        }
        out.freeze()
    }

    /// Build the request frame under the given transaction id.
    pub fn to_frame(&self, txn: u16) -> Frame {
        Frame::new(FrameType::Request, txn, self.encode_body())
    }

    /// Parse a request body. Used by panel-side tooling and test doubles.
    pub fn decode(body: &[u8]) -> Result<Self, DecodeError> {
        let mut r = BodyReader::new(body);
        let command = match r.u8()? {
            OP_WHAT_ARE_YOU => Command::WhatAreYou,
            OP_SERIAL_NUMBER => Command::SerialNumber,
            OP_AREA_LIST => Command::AreaList { from: r.u16()? },
            OP_POINT_LIST => Command::PointList { from: r.u16()? },
            OP_DOOR_LIST => Command::DoorList { from: r.u16()? },
            OP_OUTPUT_LIST => Command::OutputList { from: r.u16()? },
            OP_HISTORY => Command::History { from: r.u32()? },
            OP_PANEL_FAULTS => Command::PanelFaults,
            OP_AREA_ARM => {
                let arm_code = r.u8()?;
                Command::AreaArm {
                    area_id: r.u16()?,
                    arm_code,
                }
            }
            OP_SET_DOOR => {
                let action = r.u8()?;
                Command::SetDoor {
                    door_id: r.u16()?,
                    action,
                }
            }
            OP_SET_OUTPUT => Command::SetOutput {
                output_id: r.u16()?,
                state: r.u8()?,
            },
            OP_SET_DATE_TIME => Command::SetDateTime(r.timestamp()?),
            other => {
                return Err(DecodeError::Malformed(format!(
                    "unknown opcode 0x{other:02X}"
                )));
            }
        };
        Ok(command)
    }
}

/// Checked big-endian reader over a frame body.
pub struct BodyReader<'a> {
    buf: &'a [u8],
}

impl<'a> BodyReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn need(&self, n: usize) -> Result<(), DecodeError> {
        if self.buf.remaining() < n {
            return Err(DecodeError::Malformed(format!(
                "need {n} bytes, {} left",
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn u64(&mut self) -> Result<u64, DecodeError> {
        self.need(8)?;
        Ok(self.buf.get_u64())
    }

    /// Length-prefixed (u8) UTF-8 string. Invalid sequences are replaced.
    pub fn string(&mut self) -> Result<String, DecodeError> {
        let len = self.u8()? as usize;
        self.need(len)?;
        let s = String::from_utf8_lossy(&self.buf[..len]).into_owned();
        self.buf.advance(len);
        Ok(s)
    }

    /// `[year u16][month][day][hour][minute][second]`
    pub fn timestamp(&mut self) -> Result<NaiveDateTime, DecodeError> {
        let year = self.u16()?;
        let (month, day) = (self.u8()?, self.u8()?);
        let (hour, minute, second) = (self.u8()?, self.u8()?, self.u8()?);
        NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
            .and_then(|d| d.and_hms_opt(hour as u32, minute as u32, second as u32))
            .ok_or_else(|| {
                DecodeError::Malformed(format!(
                    "invalid timestamp {year}-{month}-{day} {hour}:{minute}:{second}"
                ))
            })
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

fn put_timestamp(out: &mut BytesMut, when: &NaiveDateTime) {
    out.put_u16(when.year().clamp(0, u16::MAX as i32) as u16);
    out.put_u8(when.month() as u8);
    out.put_u8(when.day() as u8);
    out.put_u8(when.hour() as u8);
    out.put_u8(when.minute() as u8);
    out.put_u8(when.second() as u8);
}

/// Write a length-prefixed (u8) string. Strings longer than 255 bytes are
/// rejected rather than truncated.
pub(crate) fn put_string(out: &mut BytesMut, s: &str) -> Result<(), DecodeError> {
    let len = u8::try_from(s.len()).map_err(|_| DecodeError::FieldTooLong { len: s.len() })?;
    out.put_u8(len);
    out.put_slice(s.as_bytes());
    Ok(())
}

/// Reply to `WhatAreYou`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelInfo {
    pub model_code: u8,
    pub firmware_version: String,
}

impl PanelInfo {
    pub fn parse(body: &[u8]) -> Result<Self, DecodeError> {
        let mut r = BodyReader::new(body);
        Ok(Self {
            model_code: r.u8()?,
            firmware_version: r.string()?,
        })
    }

    pub fn encode(&self) -> Result<Bytes, DecodeError> {
        let mut out = BytesMut::new();
        out.put_u8(self.model_code);
        put_string(&mut out, &self.firmware_version)?;
        Ok(out.freeze())
    }
}

/// Parse the reply to `SerialNumber`.
pub fn parse_serial_number(body: &[u8]) -> Result<u64, DecodeError> {
    BodyReader::new(body).u64()
}

/// Parse the reply to `PanelFaults`.
pub fn parse_fault_word(body: &[u8]) -> Result<u16, DecodeError> {
    BodyReader::new(body).u16()
}

/// `[more u8][count u16]`
const PAGE_HEADER_LEN: usize = 3;

/// One page of a list reply: `[more u8][count u16][record]*`.
///
/// Records are ordered by id (or history index). When `more` is set the
/// client asks again with the last id of this page as the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub more: bool,
}

impl<T> Page<T> {
    fn parse(
        body: &[u8],
        read: impl Fn(&mut BodyReader<'_>) -> Result<T, DecodeError>,
    ) -> Result<Self, DecodeError> {
        let mut r = BodyReader::new(body);
        let more = r.u8()? != 0;
        let records = (0..r.u16()?)
            .map(|_| read(&mut r))
            .collect::<Result<_, _>>()?;
        Ok(Self { records, more })
    }
}

/// Encode as many leading `records` as fit in one frame body.
///
/// Returns the page body and the number of records it carries; `more` is set
/// when records are left over. Used by panel-side tooling and test doubles.
fn encode_page<T>(
    records: &[T],
    write: impl Fn(&T, &mut BytesMut) -> Result<(), DecodeError>,
) -> Result<(Bytes, usize), DecodeError> {
    let mut out = BytesMut::with_capacity(MAX_BODY_LEN);
    out.put_u8(0);
    out.put_u16(0);
    let mut count = 0usize;
    let mut record = BytesMut::new();
    for item in records {
        record.clear();
        write(item, &mut record)?;
        if out.len() + record.len() > MAX_BODY_LEN || count == u16::MAX as usize {
            break;
        }
        out.put_slice(&record);
        count += 1;
    }
    if count == 0 && !records.is_empty() {
        return Err(DecodeError::Oversize {
            len: PAGE_HEADER_LEN + record.len(),
        });
    }
    out[0] = u8::from(count < records.len());
    out[1..PAGE_HEADER_LEN].copy_from_slice(&(count as u16).to_be_bytes());
    Ok((out.freeze(), count))
}

/// One area in an `AreaList` page.
///
/// `[id u16][status u8][ready u8][n u8][alarm code u8]*n[m u8][point id u16]*m[name]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaRecord {
    pub id: u16,
    pub name: String,
    pub raw_status: u8,
    pub ready: u8,
    pub alarms: Vec<u8>,
    /// Points currently blocking arming
    pub fault_points: Vec<u16>,
}

impl AreaRecord {
    fn read(r: &mut BodyReader<'_>) -> Result<Self, DecodeError> {
        let id = r.u16()?;
        let raw_status = r.u8()?;
        let ready = r.u8()?;
        let alarms = (0..r.u8()?).map(|_| r.u8()).collect::<Result<_, _>>()?;
        let fault_points = (0..r.u8()?).map(|_| r.u16()).collect::<Result<_, _>>()?;
        Ok(Self {
            id,
            name: r.string()?,
            raw_status,
            ready,
            alarms,
            fault_points,
        })
    }

    fn write(&self, out: &mut BytesMut) -> Result<(), DecodeError> {
        out.put_u16(self.id);
        out.put_u8(self.raw_status);
        out.put_u8(self.ready);
        out.put_u8(self.alarms.len() as u8);
        out.put_slice(&self.alarms);
        out.put_u8(self.fault_points.len() as u8);
        for p in &self.fault_points {
            out.put_u16(*p);
        }
        put_string(out, &self.name)
    }

    pub fn parse_page(body: &[u8]) -> Result<Page<Self>, DecodeError> {
        Page::parse(body, Self::read)
    }

    pub fn encode_page(records: &[Self]) -> Result<(Bytes, usize), DecodeError> {
        encode_page(records, Self::write)
    }
}

/// One point, door or output in a list page: `[id u16][status u8][name]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    pub id: u16,
    pub name: String,
    pub raw_status: u8,
}

impl EntityRecord {
    pub fn new(id: u16, name: impl Into<String>, raw_status: u8) -> Self {
        Self {
            id,
            name: name.into(),
            raw_status,
        }
    }

    fn read(r: &mut BodyReader<'_>) -> Result<Self, DecodeError> {
        let id = r.u16()?;
        let raw_status = r.u8()?;
        Ok(Self {
            id,
            name: r.string()?,
            raw_status,
        })
    }

    fn write(&self, out: &mut BytesMut) -> Result<(), DecodeError> {
        out.put_u16(self.id);
        out.put_u8(self.raw_status);
        put_string(out, &self.name)
    }

    pub fn parse_page(body: &[u8]) -> Result<Page<Self>, DecodeError> {
        Page::parse(body, Self::read)
    }

    pub fn encode_page(records: &[Self]) -> Result<(Bytes, usize), DecodeError> {
        encode_page(records, Self::write)
    }
}

/// `[index u32][timestamp 7][description]`
fn read_history(r: &mut BodyReader<'_>) -> Result<HistoryEvent, DecodeError> {
    let index = r.u32()?;
    let timestamp = r.timestamp()?;
    Ok(HistoryEvent {
        index,
        timestamp,
        description: r.string()?,
    })
}

fn write_history(event: &HistoryEvent, out: &mut BytesMut) -> Result<(), DecodeError> {
    out.put_u32(event.index);
    put_timestamp(out, &event.timestamp);
    put_string(out, &event.description)
}

/// Parse one page of the reply to `History`.
pub fn parse_history_page(body: &[u8]) -> Result<Page<HistoryEvent>, DecodeError> {
    Page::parse(body, read_history)
}

pub fn encode_history_page(events: &[HistoryEvent]) -> Result<(Bytes, usize), DecodeError> {
    encode_page(events, write_history)
}

/// Unsolicited messages from the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMessage {
    AreaStatus { area_id: u16, raw: u8 },
    AreaReady { area_id: u16, ready: u8, fault_points: Vec<u16> },
    AreaAlarms { area_id: u16, alarms: Vec<u8> },
    PointStatus { point_id: u16, raw: u8 },
    DoorStatus { door_id: u16, raw: u8 },
    OutputStatus { output_id: u16, raw: u8 },
    PanelFaults(u16),
    History(HistoryEvent),
}

impl PushMessage {
    /// Parse a status or history push frame.
    pub fn parse(frame: &Frame) -> Result<Self, DecodeError> {
        let mut r = BodyReader::new(&frame.body);
        match frame.frame_type {
            FrameType::HistoryPush => return Ok(PushMessage::History(read_history(&mut r)?)),
            FrameType::StatusPush => {}
            other => {
                return Err(DecodeError::Malformed(format!(
                    "{other:?} frame is not a push"
                )));
            }
        }

        let kind = r.u8()?;
        let id = r.u16()?;
        let message = match kind {
            PUSH_AREA_STATUS => PushMessage::AreaStatus {
                area_id: id,
                raw: r.u8()?,
            },
            PUSH_AREA_READY => {
                let ready = r.u8()?;
                let fault_points = (0..r.u8()?).map(|_| r.u16()).collect::<Result<_, _>>()?;
                PushMessage::AreaReady {
                    area_id: id,
                    ready,
                    fault_points,
                }
            }
            PUSH_AREA_ALARMS => {
                let alarms = (0..r.u8()?).map(|_| r.u8()).collect::<Result<_, _>>()?;
                PushMessage::AreaAlarms {
                    area_id: id,
                    alarms,
                }
            }
            PUSH_POINT_STATUS => PushMessage::PointStatus {
                point_id: id,
                raw: r.u8()?,
            },
            PUSH_DOOR_STATUS => PushMessage::DoorStatus {
                door_id: id,
                raw: r.u8()?,
            },
            PUSH_OUTPUT_STATUS => PushMessage::OutputStatus {
                output_id: id,
                raw: r.u8()?,
            },
            PUSH_PANEL_FAULTS => PushMessage::PanelFaults(r.u16()?),
            other => {
                return Err(DecodeError::Malformed(format!(
                    "unknown push kind 0x{other:02X}"
                )));
            }
        };
        Ok(message)
    }

    /// Build the push frame the panel would send for this message.
    pub fn to_frame(&self) -> Result<Frame, DecodeError> {
        let mut out = BytesMut::new();
        match self {
            PushMessage::History(event) => {
                write_history(event, &mut out)?;
                return Ok(Frame::new(FrameType::HistoryPush, 0, out.freeze()));
            }
            PushMessage::AreaStatus { area_id, raw } => {
                out.put_u8(PUSH_AREA_STATUS);
                out.put_u16(*area_id);
                out.put_u8(*raw);
            }
            PushMessage::AreaReady {
                area_id,
                ready,
                fault_points,
            } => {
                out.put_u8(PUSH_AREA_READY);
                out.put_u16(*area_id);
                out.put_u8(*ready);
                out.put_u8(fault_points.len() as u8);
                for p in fault_points {
                    out.put_u16(*p);
                }
            }
            PushMessage::AreaAlarms { area_id, alarms } => {
                out.put_u8(PUSH_AREA_ALARMS);
                out.put_u16(*area_id);
                out.put_u8(alarms.len() as u8);
                out.put_slice(alarms);
            }
            PushMessage::PointStatus { point_id, raw } => {
                out.put_u8(PUSH_POINT_STATUS);
                out.put_u16(*point_id);
                out.put_u8(*raw);
            }
            PushMessage::DoorStatus { door_id, raw } => {
                out.put_u8(PUSH_DOOR_STATUS);
                out.put_u16(*door_id);
                out.put_u8(*raw);
            }
            PushMessage::OutputStatus { output_id, raw } => {
                out.put_u8(PUSH_OUTPUT_STATUS);
                out.put_u16(*output_id);
                out.put_u8(*raw);
            }
            PushMessage::PanelFaults(word) => {
                out.put_u8(PUSH_PANEL_FAULTS);
                out.put_u16(0);
                out.put_u16(*word);
            }
        }
        Ok(Frame::new(FrameType::StatusPush, 0, out.freeze()))
    }
}
