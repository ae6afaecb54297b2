// MIT License - Copyright (c) 2026 Peter Wright
// Per-entity publish/subscribe channels

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Callback invoked when the observed entity changes.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Token returned by [`Observer::attach`], used to detach later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

/// A notification channel: a registry of callbacks keyed by subscription id.
///
/// Cloning yields another handle to the same registry, so a subscriber
/// attached through a snapshot copy of an entity is attached to the live one.
#[derive(Clone, Default)]
pub struct Observer {
    subscribers: Arc<Mutex<Vec<(SubscriptionId, Callback)>>>,
}

impl Observer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. Returns the token to pass to [`detach`](Self::detach).
    pub fn attach<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = SubscriptionId(NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback. Unknown ids are ignored.
    pub fn detach(&self, id: SubscriptionId) {
        self.lock().retain(|(sub, _)| *sub != id);
    }

    /// Invoke every attached callback.
    ///
    /// The subscriber list is copied first, so callbacks may attach or
    /// detach on this same observer without deadlocking.
    pub fn notify(&self) {
        let callbacks: Vec<Callback> = self.lock().iter().map(|(_, cb)| cb.clone()).collect();
        for callback in callbacks {
            callback();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, Callback)>> {
        // A panicking subscriber must not take the channel down with it
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
