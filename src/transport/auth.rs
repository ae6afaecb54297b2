// MIT License - Copyright (c) 2026 Peter Wright
// Credentials and the challenge/response handshake

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::codec::{Frame, FrameDecoder, FrameType};
use crate::config::PanelFamily;
use crate::constants::{AUTH_INSTALLER_CODE, AUTH_PASSCODE, AUTH_USER_CODE, model_name};
use crate::error::{BoschError, DecodeError, NakCode, Result};
use crate::protocol::{BodyReader, put_string};

/// Transaction id used for the auth response.
pub const HANDSHAKE_TXN: u16 = 1;

/// Credentials presented during the handshake. The accepted form depends on
/// the panel family.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Solution panels
    UserCode(String),
    /// AMAX panels
    InstallerCode { code: String, password: String },
    /// B and G series panels
    Passcode(String),
}

impl Credentials {
    pub fn variant(&self) -> u8 {
        match self {
            Credentials::UserCode(_) => AUTH_USER_CODE,
            Credentials::InstallerCode { .. } => AUTH_INSTALLER_CODE,
            Credentials::Passcode(_) => AUTH_PASSCODE,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Credentials::UserCode(_) => "user code",
            Credentials::InstallerCode { .. } => "installer code",
            Credentials::Passcode(_) => "automation passcode",
        }
    }

    /// Whether panels of this family accept this credentials form.
    pub fn matches_family(&self, family: PanelFamily) -> bool {
        matches!(
            (self, family),
            (Credentials::UserCode(_), PanelFamily::Solution)
                | (Credentials::InstallerCode { .. }, PanelFamily::Amax)
                | (
                    Credentials::Passcode(_),
                    PanelFamily::BSeries | PanelFamily::GSeries
                )
        )
    }

    /// Auth response body: `[variant u8][nonce u32][fields]`, each field a
    /// length-prefixed string of at most 255 bytes.
    pub fn encode_response(&self, nonce: u32) -> std::result::Result<Bytes, DecodeError> {
        let mut out = BytesMut::with_capacity(32);
        out.put_u8(self.variant());
        out.put_u32(nonce);
        let fields: Vec<&str> = match self {
            Credentials::UserCode(code) => vec![code.as_str()],
            Credentials::InstallerCode { code, password } => {
                vec![code.as_str(), password.as_str()]
            }
            Credentials::Passcode(passcode) => vec![passcode.as_str()],
        };
        for field in fields {
            put_string(&mut out, field)?;
        }
        Ok(out.freeze())
    }

    /// Parse an auth response body into the credentials and echoed nonce.
    pub fn parse_response(body: &[u8]) -> std::result::Result<(Self, u32), DecodeError> {
        let mut r = BodyReader::new(body);
        let variant = r.u8()?;
        let nonce = r.u32()?;
        let credentials = match variant {
            AUTH_USER_CODE => Credentials::UserCode(r.string()?),
            AUTH_INSTALLER_CODE => Credentials::InstallerCode {
                code: r.string()?,
                password: r.string()?,
            },
            AUTH_PASSCODE => Credentials::Passcode(r.string()?),
            other => {
                return Err(DecodeError::Malformed(format!(
                    "unknown auth variant 0x{other:02X}"
                )));
            }
        };
        Ok((credentials, nonce))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credentials({})", self.kind())
    }
}

/// First frame sent by the panel: `[model u8][nonce u32]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthChallenge {
    pub model_code: u8,
    pub nonce: u32,
}

impl AuthChallenge {
    pub fn parse(body: &[u8]) -> std::result::Result<Self, DecodeError> {
        let mut r = BodyReader::new(body);
        Ok(Self {
            model_code: r.u8()?,
            nonce: r.u32()?,
        })
    }

    pub fn to_frame(&self) -> Frame {
        let mut out = BytesMut::with_capacity(5);
        out.put_u8(self.model_code);
        out.put_u32(self.nonce);
        Frame::new(FrameType::AuthChallenge, 0, out.freeze())
    }
}

/// What the handshake learned about the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeOutcome {
    pub model_code: u8,
    pub family: PanelFamily,
}

/// Run the handshake on a freshly opened stream.
///
/// Bytes received after the panel's ACK stay buffered in `decoder` for the
/// reader task.
pub async fn authenticate<S>(
    stream: &mut S,
    decoder: &mut FrameDecoder,
    credentials: &Credentials,
    configured_family: Option<PanelFamily>,
) -> Result<HandshakeOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = read_frame(stream, decoder).await?;
    if frame.frame_type != FrameType::AuthChallenge {
        return Err(BoschError::InvalidResponse {
            details: format!("expected auth challenge, got {:?}", frame.frame_type),
        });
    }
    let challenge = AuthChallenge::parse(&frame.body)?;
    debug!(
        "Auth challenge: model 0x{:02X} ({})",
        challenge.model_code,
        model_name(challenge.model_code).unwrap_or("unknown")
    );

    let family = resolve_family(challenge.model_code, configured_family)?;

    if !credentials.matches_family(family) {
        return Err(BoschError::Auth {
            reason: format!(
                "{} credentials are not accepted by {} panels",
                credentials.kind(),
                family
            ),
        });
    }

    let body = credentials
        .encode_response(challenge.nonce)
        .map_err(|e| BoschError::Auth {
            reason: format!("{} cannot be sent: {}", credentials.kind(), e),
        })?;
    let response = Frame::new(FrameType::AuthResponse, HANDSHAKE_TXN, body);
    stream.write_all(&response.encode()?).await?;
    stream.flush().await?;
    debug!("Sent {} auth response", credentials.kind());

    let reply = read_frame(stream, decoder).await?;
    match reply.frame_type {
        FrameType::Ack if reply.txn == HANDSHAKE_TXN => {
            info!("Authenticated with {} panel", family);
            Ok(HandshakeOutcome {
                model_code: challenge.model_code,
                family,
            })
        }
        FrameType::Nak if reply.txn == HANDSHAKE_TXN => {
            let code = NakCode::from_byte(reply.body.first().copied().unwrap_or(0));
            Err(BoschError::Auth {
                reason: code.description().to_string(),
            })
        }
        other => Err(BoschError::InvalidResponse {
            details: format!("unexpected {other:?} (txn {}) during handshake", reply.txn),
        }),
    }
}

fn resolve_family(model_code: u8, configured: Option<PanelFamily>) -> Result<PanelFamily> {
    match (PanelFamily::from_model_code(model_code), configured) {
        (Some(detected), Some(configured)) if detected != configured => {
            warn!(
                "Configured family {} does not match panel ({}), using {}",
                configured, detected, detected
            );
            Ok(detected)
        }
        (Some(detected), _) => Ok(detected),
        (None, Some(configured)) => {
            warn!(
                "Unknown model code 0x{:02X}, assuming configured family {}",
                model_code, configured
            );
            Ok(configured)
        }
        (None, None) => Err(BoschError::InvalidResponse {
            details: format!("unknown panel model 0x{model_code:02X}"),
        }),
    }
}

async fn read_frame<S>(stream: &mut S, decoder: &mut FrameDecoder) -> Result<Frame>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; 1024];
    loop {
        if let Some(frame) = decoder.next_frame()? {
            return Ok(frame);
        }
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(BoschError::ConnectionClosed);
        }
        decoder.extend(&buf[..n]);
    }
}
