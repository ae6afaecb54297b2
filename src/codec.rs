// MIT License - Copyright (c) 2026 Peter Wright
// Mode 2 frame encoding, CRC and resumable stream decoding

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::constants::{
    CRC_LEN, CRC_TABLE, FRAME_ACK, FRAME_AUTH_CHALLENGE, FRAME_AUTH_RESPONSE,
    FRAME_HISTORY_PUSH, FRAME_MARKER, FRAME_NAK, FRAME_REQUEST, FRAME_STATUS_PUSH, HEADER_LEN,
    MAX_BODY_LEN,
};
use crate::error::DecodeError;

/// Frame type carried in byte 1 of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Request,
    Ack,
    Nak,
    StatusPush,
    HistoryPush,
    AuthChallenge,
    AuthResponse,
}

impl FrameType {
    pub fn from_byte(b: u8) -> Result<Self, DecodeError> {
        match b {
            FRAME_REQUEST => Ok(Self::Request),
            FRAME_ACK => Ok(Self::Ack),
            FRAME_NAK => Ok(Self::Nak),
            FRAME_STATUS_PUSH => Ok(Self::StatusPush),
            FRAME_HISTORY_PUSH => Ok(Self::HistoryPush),
            FRAME_AUTH_CHALLENGE => Ok(Self::AuthChallenge),
            FRAME_AUTH_RESPONSE => Ok(Self::AuthResponse),
            other => Err(DecodeError::UnknownFrameType(other)),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Request => FRAME_REQUEST,
            Self::Ack => FRAME_ACK,
            Self::Nak => FRAME_NAK,
            Self::StatusPush => FRAME_STATUS_PUSH,
            Self::HistoryPush => FRAME_HISTORY_PUSH,
            Self::AuthChallenge => FRAME_AUTH_CHALLENGE,
            Self::AuthResponse => FRAME_AUTH_RESPONSE,
        }
    }

    /// Unsolicited frames are not correlated with any request.
    pub fn is_push(&self) -> bool {
        matches!(self, Self::StatusPush | Self::HistoryPush)
    }
}

/// One decoded (or to-be-encoded) frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    /// Transaction id; 0 for pushes and the auth challenge
    pub txn: u16,
    pub body: Bytes,
}

impl Frame {
    pub fn new(frame_type: FrameType, txn: u16, body: impl Into<Bytes>) -> Self {
        Self {
            frame_type,
            txn,
            body: body.into(),
        }
    }

    /// Serialize to wire bytes: marker, header, body and trailing CRC.
    ///
    /// Bodies longer than `MAX_BODY_LEN` are rejected.
    pub fn encode(&self) -> Result<Bytes, DecodeError> {
        if self.body.len() > MAX_BODY_LEN {
            return Err(DecodeError::Oversize {
                len: self.body.len(),
            });
        }
        let mut out = BytesMut::with_capacity(HEADER_LEN + self.body.len() + CRC_LEN);
        out.put_u8(FRAME_MARKER);
        out.put_u8(self.frame_type.as_byte());
        out.put_u16(self.txn);
        out.put_u16(self.body.len() as u16);
        out.put_slice(&self.body);
        let crc = compute_crc(&out[1..]);
        out.put_u16(crc);
        Ok(out.freeze())
    }
}

/// Compute CRC-16/MODBUS (reflected poly 0xA001, init 0xFFFF).
pub fn compute_crc(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc = (crc >> 8) ^ CRC_TABLE[((crc & 0xFF) ^ byte as u16) as usize];
    }
    crc
}

/// Outcome of a single decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame, and how many input bytes it occupied
    Frame { frame: Frame, consumed: usize },
    /// The buffer holds a prefix of a frame
    NeedMoreData,
}

/// Decode the frame at the start of `buf`.
///
/// Header faults (marker, type, oversize length) are reported as soon as the
/// header bytes are present, without waiting for the body.
pub fn decode(buf: &[u8]) -> Result<Decoded, DecodeError> {
    let Some(&marker) = buf.first() else {
        return Ok(Decoded::NeedMoreData);
    };
    if marker != FRAME_MARKER {
        return Err(DecodeError::BadMarker(marker));
    }
    if buf.len() < HEADER_LEN {
        return Ok(Decoded::NeedMoreData);
    }

    let mut header = &buf[1..HEADER_LEN];
    let frame_type = FrameType::from_byte(header.get_u8())?;
    let txn = header.get_u16();
    let len = header.get_u16() as usize;
    if len > MAX_BODY_LEN {
        return Err(DecodeError::Oversize { len });
    }

    let total = HEADER_LEN + len + CRC_LEN;
    if buf.len() < total {
        return Ok(Decoded::NeedMoreData);
    }

    let expected = compute_crc(&buf[1..HEADER_LEN + len]);
    let actual = u16::from_be_bytes([buf[total - 2], buf[total - 1]]);
    if expected != actual {
        return Err(DecodeError::Checksum { expected, actual });
    }

    let body = Bytes::copy_from_slice(&buf[HEADER_LEN..HEADER_LEN + len]);
    Ok(Decoded::Frame {
        frame: Frame {
            frame_type,
            txn,
            body,
        },
        consumed: total,
    })
}

/// Stream reassembly buffer fed by the transport reader.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
        }
    }

    /// Append bytes read from the socket.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pop the next complete frame, if one is buffered.
    ///
    /// After an error the stream is unusable; the caller must drop the connection.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        match decode(&self.buf)? {
            Decoded::Frame { frame, consumed } => {
                self.buf.advance(consumed);
                Ok(Some(frame))
            }
            Decoded::NeedMoreData => Ok(None),
        }
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
