// MIT License - Copyright (c) 2026 Peter Wright
// Panel event history

use std::collections::VecDeque;

use chrono::NaiveDateTime;

/// A single entry from the panel's event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEvent {
    pub index: u32,
    pub timestamp: NaiveDateTime,
    pub description: String,
}

/// Append-only, bounded history log. The oldest entry is evicted when full.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    events: VecDeque<HistoryEvent>,
    capacity: usize,
}

impl HistoryLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append an event. Returns false if an event with the same index is
    /// already held (or the log has zero capacity).
    pub fn push(&mut self, event: HistoryEvent) -> bool {
        if self.capacity == 0 || self.contains_index(event.index) {
            return false;
        }
        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
        true
    }

    pub fn contains_index(&self, index: u32) -> bool {
        self.events.iter().any(|e| e.index == index)
    }

    /// Highest index currently held, used to resume history pulls.
    pub fn last_index(&self) -> Option<u32> {
        self.events.iter().map(|e| e.index).max()
    }

    pub fn latest(&self) -> Option<&HistoryEvent> {
        self.events.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEvent> {
        self.events.iter()
    }

    pub fn to_vec(&self) -> Vec<HistoryEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
