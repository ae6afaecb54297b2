// MIT License - Copyright (c) 2026 Peter Wright
// Direct TCP/TLS session with the panel

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, timeout};
use tracing::{debug, error, info, warn};

use crate::codec::{Frame, FrameDecoder, FrameType};
use crate::config::PanelConfig;
use crate::error::{BoschError, Result};
use crate::protocol::Command;
use crate::transport::auth::{self, HANDSHAKE_TXN, HandshakeOutcome};
use crate::transport::command::CommandEngine;
use crate::transport::tls;

/// What the reader task reports to the session owner.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A status or history push, in arrival order
    Push(Frame),
    /// The stream ended or became unusable; in-flight requests have been failed
    Closed { reason: String },
}

pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// One authenticated connection to the panel.
pub struct DirectTransport {
    engine: Arc<CommandEngine>,
    handshake: HandshakeOutcome,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
}

/// Byte stream carrying a panel session, plain TCP or TLS.
pub trait PanelStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> PanelStream for T {}

/// A connected but not yet authenticated stream.
pub struct OpenConnection {
    stream: Box<dyn PanelStream>,
}

impl OpenConnection {
    /// Run the handshake and start the reader task.
    pub async fn authenticate(
        mut self,
        config: &PanelConfig,
    ) -> Result<(DirectTransport, TransportEvents)> {
        let mut decoder = FrameDecoder::new();
        let handshake = auth::authenticate(
            &mut self.stream,
            &mut decoder,
            &config.credentials,
            config.family,
        )
        .await?;

        let (reader, writer) = tokio::io::split(self.stream);
        let engine = Arc::new(CommandEngine::new(
            Box::new(writer),
            Duration::from_millis(config.command_timeout_ms),
            HANDSHAKE_TXN.wrapping_add(1),
        ));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let reader_handle = spawn_reader_task(reader, decoder, engine.clone(), event_tx);

        info!("Connection to panel successfully established");
        Ok((
            DirectTransport {
                engine,
                handshake,
                reader_handle: Mutex::new(Some(reader_handle)),
            },
            event_rx,
        ))
    }
}

impl DirectTransport {
    /// Connect, optionally wrap in TLS, and authenticate.
    ///
    /// `on_open` runs once the stream is open, before the handshake. The
    /// whole sequence is bounded by `connect_timeout_ms`; no retries here.
    pub async fn connect(
        config: &PanelConfig,
        on_open: impl Future<Output = ()>,
    ) -> Result<(Self, TransportEvents)> {
        let limit = Duration::from_millis(config.connect_timeout_ms);
        let establish = async {
            let connection = Self::open(config).await?;
            on_open.await;
            connection.authenticate(config).await
        };
        match timeout(limit, establish).await {
            Ok(result) => result,
            Err(_) => {
                error!("Connection to {} timed out", config.address());
                Err(BoschError::ConnectionTimeout)
            }
        }
    }

    /// Open the TCP socket and wrap it in TLS when configured.
    pub async fn open(config: &PanelConfig) -> Result<OpenConnection> {
        let address = config.address();
        info!(
            "Connecting to panel at {} ({})",
            address,
            if config.use_tls { "TLS" } else { "plain TCP" }
        );

        let stream = TcpStream::connect(&address).await.map_err(|e| {
            error!("TCP connect failed: {}", e);
            BoschError::Connect {
                address: address.clone(),
                source: e,
            }
        })?;
        stream.set_nodelay(true)?;
        debug!("TCP socket connected");

        let stream: Box<dyn PanelStream> = if config.use_tls {
            Box::new(tls::wrap(stream, &config.host).await?)
        } else {
            Box::new(stream)
        };
        Ok(OpenConnection { stream })
    }

    /// Send a request and wait for its correlated reply.
    pub async fn send_command(&self, command: &Command) -> Result<Frame> {
        self.engine.send_command(command).await
    }

    /// Release the connection. In-flight requests fail with `ConnectionClosed`
    /// and no `Closed` event is emitted.
    pub async fn close(&self) {
        info!("Closing panel connection");
        self.abort_reader();
        self.engine.close().await;
    }

    pub fn handshake(&self) -> HandshakeOutcome {
        self.handshake
    }

    fn abort_reader(&self) {
        let handle = self
            .reader_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl Drop for DirectTransport {
    fn drop(&mut self) {
        self.abort_reader();
    }
}

/// Spawn the reader task: decode frames continuously, route replies to the
/// command engine and forward pushes in arrival order.
fn spawn_reader_task<R>(
    mut reader: R,
    mut decoder: FrameDecoder,
    engine: Arc<CommandEngine>,
    events: mpsc::UnboundedSender<TransportEvent>,
) -> JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        let reason = loop {
            if let Err(e) = dispatch_buffered(&mut decoder, &engine, &events).await {
                error!("Reader: protocol fault: {}", e);
                break format!("protocol fault: {e}");
            }
            let read = tokio::select! {
                _ = engine.stalled() => break "write stalled".to_string(),
                read = reader.read(&mut buf) => read,
            };
            match read {
                Ok(0) => {
                    debug!("Reader: connection closed");
                    break "connection closed by panel".to_string();
                }
                Ok(n) => decoder.extend(&buf[..n]),
                Err(e) => {
                    error!("Reader: read error: {}", e);
                    break format!("read error: {e}");
                }
            }
        };
        engine.fail_all().await;
        let _ = events.send(TransportEvent::Closed { reason });
    })
}

async fn dispatch_buffered(
    decoder: &mut FrameDecoder,
    engine: &CommandEngine,
    events: &mpsc::UnboundedSender<TransportEvent>,
) -> Result<()> {
    while let Some(frame) = decoder.next_frame()? {
        match frame.frame_type {
            FrameType::Ack | FrameType::Nak => engine.route_response(frame).await,
            push if push.is_push() => {
                let _ = events.send(TransportEvent::Push(frame));
            }
            other => warn!("Ignoring unexpected {:?} frame from panel", other),
        }
    }
    Ok(())
}
