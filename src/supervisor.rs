// MIT License - Copyright (c) 2026 Peter Wright
// Push application, disconnect detection and reconnection with backoff

use std::sync::Arc;

use rand::Rng;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};
use tracing::{debug, error, info, warn};

use crate::error::SetupFailure;
use crate::model::ConnectionState;
use crate::panel::PanelShared;
use crate::transport::{TransportEvent, TransportEvents};

/// Backoff schedule for reconnection attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Attempts before giving up; 0 retries forever
    pub max_attempts: u32,
    /// Extra random delay as a fraction of the computed delay
    pub jitter_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: 10,
            jitter_factor: 0.2,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let spread = delay.as_secs_f64() * self.jitter_factor;
        if spread > 0.0 {
            delay + Duration::from_secs_f64(rand::rng().random_range(0.0..spread))
        } else {
            delay
        }
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts != 0 && attempts >= self.max_attempts
    }
}

/// Drive one panel session until shutdown or until reconnection gives up.
pub(crate) async fn run(
    shared: Arc<PanelShared>,
    mut events: TransportEvents,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.changed() => {
                debug!("Supervisor shutting down");
                return;
            }
            event = events.recv() => event,
        };

        match event {
            Some(TransportEvent::Push(frame)) => {
                shared.apply_push(&frame).await;
                continue;
            }
            Some(TransportEvent::Closed { reason }) => {
                warn!("Panel connection lost: {}", reason);
            }
            None => {
                warn!("Panel connection lost: reader stopped");
            }
        }

        shared.drop_transport().await;
        shared.set_state(ConnectionState::Disconnected).await;

        match reconnect(&shared, &mut shutdown).await {
            Some(next) => events = next,
            None => return,
        }
    }
}

async fn reconnect(
    shared: &PanelShared,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<TransportEvents> {
    let policy = shared.config.reconnect.clone();
    let mut attempts = 0u32;

    loop {
        if policy.exhausted(attempts) {
            error!("Giving up after {} reconnection attempts", attempts);
            shared.set_state(ConnectionState::Faulted).await;
            return None;
        }

        let delay = policy.delay(attempts);
        attempts += 1;
        info!(
            "Reconnecting in {:.1}s (attempt {})",
            delay.as_secs_f64(),
            attempts
        );

        let result = tokio::select! {
            _ = shutdown.changed() => return None,
            result = async {
                sleep(delay).await;
                shared.establish().await
            } => result,
        };

        match result {
            Ok(events) => {
                info!("Reconnected to panel after {} attempt(s)", attempts);
                return Some(events);
            }
            Err(e) if e.setup_failure() == SetupFailure::InvalidAuth => {
                error!("Reconnection failed permanently: {}", e);
                shared.set_state(ConnectionState::Faulted).await;
                return None;
            }
            Err(e) => {
                if e.is_retryable() {
                    warn!("Reconnection attempt {} failed: {}", attempts, e);
                } else {
                    warn!("Panel rejected resync on attempt {}: {}", attempts, e);
                }
                shared.set_state(ConnectionState::Disconnected).await;
            }
        }
    }
}
