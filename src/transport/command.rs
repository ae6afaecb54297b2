// MIT License - Copyright (c) 2026 Peter Wright
// Request/response correlation over a single connection

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, Notify, RwLock, oneshot};
use tokio::time::{Duration, Instant, timeout, timeout_at};
use tracing::{debug, error, warn};

use crate::codec::{Frame, FrameType};
use crate::error::{BoschError, NakCode, Result};
use crate::protocol::Command;

/// Write half of the panel connection (plain TCP or TLS).
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

type PendingMap = HashMap<u16, oneshot::Sender<Result<Frame>>>;

/// Tracks in-flight requests and routes ACK/NAK frames back to callers by
/// transaction id. Replies may arrive in any order.
pub struct CommandEngine {
    /// Next transaction id to hand out; cycles 1..=u16::MAX
    next_txn: Mutex<u16>,
    /// Map of in-flight transaction ids to their response senders
    pending: Arc<Mutex<PendingMap>>,
    writer: Mutex<BoxedWriter>,
    connected: Arc<RwLock<bool>>,
    /// Signalled when a write could not complete in time
    stalled: Notify,
    command_timeout: Duration,
}

impl CommandEngine {
    pub fn new(writer: BoxedWriter, command_timeout: Duration, first_txn: u16) -> Self {
        Self {
            next_txn: Mutex::new(first_txn.max(1)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            writer: Mutex::new(writer),
            connected: Arc::new(RwLock::new(true)),
            stalled: Notify::new(),
            command_timeout,
        }
    }

    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    pub async fn in_flight(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Resolves once a write has stalled past the command timeout. The
    /// connection is unusable from then on.
    pub async fn stalled(&self) {
        self.stalled.notified().await
    }

    /// Send a request and wait for its ACK.
    ///
    /// Writing and waiting share one `command_timeout` budget. A NAK is
    /// returned as `CommandRejected`. On timeout the outcome at the panel is
    /// unknown; callers should re-query rather than retry.
    pub async fn send_command(&self, command: &Command) -> Result<Frame> {
        if !self.is_connected().await {
            return Err(BoschError::NotConnected);
        }

        let deadline = Instant::now() + self.command_timeout;
        let (tx, rx) = oneshot::channel();
        let txn = {
            let mut pending = self.pending.lock().await;
            let txn = self.allocate_txn(&pending).await;
            pending.insert(txn, tx);
            txn
        };

        let encoded = match command.to_frame(txn).encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                self.pending.lock().await.remove(&txn);
                return Err(e.into());
            }
        };

        debug!("Sending {} (txn {})", command.name(), txn);
        let write = async {
            let mut writer = self.writer.lock().await;
            writer.write_all(&encoded).await?;
            writer.flush().await
        };
        match timeout_at(deadline, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Failed to write {}: {}", command.name(), e);
                self.pending.lock().await.remove(&txn);
                return Err(BoschError::Io(e));
            }
            Err(_) => {
                self.pending.lock().await.remove(&txn);
                error!("Write stalled: {} (txn {})", command.name(), txn);
                self.mark_stalled().await;
                return Err(BoschError::CommandTimeout {
                    command: command.name().to_string(),
                });
            }
        }

        match timeout_at(deadline, rx).await {
            Ok(Ok(result)) => {
                if let Err(ref e) = result {
                    debug!("{} (txn {}) failed: {}", command.name(), txn, e);
                }
                result
            }
            Ok(Err(_)) => Err(BoschError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&txn);
                warn!("Command timeout: {} (txn {})", command.name(), txn);
                Err(BoschError::CommandTimeout {
                    command: command.name().to_string(),
                })
            }
        }
    }

    /// Deliver an ACK or NAK to whoever is waiting on its transaction id.
    pub async fn route_response(&self, frame: Frame) {
        let Some(sender) = self.pending.lock().await.remove(&frame.txn) else {
            warn!(
                "Dropping {:?} for unknown txn {} (late or unsolicited)",
                frame.frame_type, frame.txn
            );
            return;
        };
        let result = match frame.frame_type {
            FrameType::Nak => {
                let code = NakCode::from_byte(frame.body.first().copied().unwrap_or(0));
                Err(BoschError::CommandRejected(code))
            }
            _ => Ok(frame),
        };
        let _ = sender.send(result);
    }

    /// Mark the connection dead and fail every in-flight request with
    /// `ConnectionClosed`.
    pub async fn fail_all(&self) {
        *self.connected.write().await = false;
        let drained: Vec<_> = self.pending.lock().await.drain().collect();
        if !drained.is_empty() {
            debug!("Failing {} in-flight request(s)", drained.len());
        }
        for (_, sender) in drained {
            let _ = sender.send(Err(BoschError::ConnectionClosed));
        }
    }

    /// A partially written frame leaves the stream out of sync; fail
    /// everything and wake the reader so the session is torn down.
    async fn mark_stalled(&self) {
        self.fail_all().await;
        self.stalled.notify_one();
    }

    /// Fail in-flight requests and shut the write half down, giving up on
    /// the shutdown after `command_timeout`.
    pub async fn close(&self) {
        self.fail_all().await;
        let shutdown = async { self.writer.lock().await.shutdown().await };
        match timeout(self.command_timeout, shutdown).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Writer shutdown: {}", e),
            Err(_) => warn!("Writer shutdown timed out"),
        }
    }

    /// Next free transaction id, skipping 0 and ids still in flight.
    async fn allocate_txn(&self, pending: &PendingMap) -> u16 {
        let mut next = self.next_txn.lock().await;
        loop {
            let txn = *next;
            *next = match next.wrapping_add(1) {
                0 => 1,
                n => n,
            };
            if !pending.contains_key(&txn) {
                return txn;
            }
        }
    }
}
