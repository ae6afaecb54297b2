// MIT License - Copyright (c) 2026 Peter Wright
// Arming areas

use std::fmt;

use bitflags::bitflags;

use crate::constants::{READY_ALL, READY_PART};
use crate::observer::Observer;

/// Logical arming state of an area, independent of panel family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AreaStatus {
    Disarmed,
    Arming,
    Pending,
    PartArmed,
    AllArmed,
    Triggered,
}

impl AreaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AreaStatus::Disarmed => "DISARMED",
            AreaStatus::Arming => "ARMING",
            AreaStatus::Pending => "PENDING",
            AreaStatus::PartArmed => "PART_ARMED",
            AreaStatus::AllArmed => "ALL_ARMED",
            AreaStatus::Triggered => "TRIGGERED",
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self, AreaStatus::PartArmed | AreaStatus::AllArmed)
    }
}

impl fmt::Display for AreaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// Area readiness, as reported in area records and ready pushes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ReadyFlags: u8 {
        /// Area can be armed away
        const ALL  = READY_ALL;
        /// Area can be armed home
        const PART = READY_PART;
    }
}

/// A single arming area.
#[derive(Debug, Clone)]
pub struct Area {
    pub id: u16,
    pub name: String,
    pub status: AreaStatus,
    pub ready: ReadyFlags,
    /// Names of the points currently blocking arming
    pub faults: Vec<String>,
    /// Active alarm descriptors, in panel order
    pub alarms: Vec<String>,
    pub status_observer: Observer,
    pub ready_observer: Observer,
    pub alarm_observer: Observer,
    revision: u64,
}

impl Area {
    pub fn new(id: u16, name: impl Into<String>, status: AreaStatus) -> Self {
        Self {
            id,
            name: name.into(),
            status,
            ready: ReadyFlags::empty(),
            faults: Vec::new(),
            alarms: Vec::new(),
            status_observer: Observer::new(),
            ready_observer: Observer::new(),
            alarm_observer: Observer::new(),
            revision: 0,
        }
    }

    /// Set the arming status. Returns true if it changed.
    pub fn update_status(&mut self, status: AreaStatus) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        self.revision += 1;
        true
    }

    /// Set readiness and blocking faults. Returns true if either changed.
    ///
    /// An area with blocking faults is never reported as all-ready.
    pub fn update_ready(&mut self, ready: ReadyFlags, faults: Vec<String>) -> bool {
        let ready = if faults.is_empty() {
            ready
        } else {
            ready - ReadyFlags::ALL
        };
        if self.ready == ready && self.faults == faults {
            return false;
        }
        self.ready = ready;
        self.faults = faults;
        true
    }

    /// Replace the active alarm list. Returns true if it changed.
    pub fn update_alarms(&mut self, alarms: Vec<String>) -> bool {
        if self.alarms == alarms {
            return false;
        }
        self.alarms = alarms;
        true
    }

    /// Counter bumped on every status change, used to detect pushes that
    /// landed while a command was in flight.
    pub(crate) fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_disarmed(&self) -> bool { self.status == AreaStatus::Disarmed }
    pub fn is_arming(&self) -> bool { self.status == AreaStatus::Arming }
    pub fn is_pending(&self) -> bool { self.status == AreaStatus::Pending }
    pub fn is_part_armed(&self) -> bool { self.status == AreaStatus::PartArmed }
    pub fn is_all_armed(&self) -> bool { self.status == AreaStatus::AllArmed }
    pub fn is_all_ready(&self) -> bool { self.ready.contains(ReadyFlags::ALL) }
    pub fn is_part_ready(&self) -> bool { self.ready.contains(ReadyFlags::PART) }

    pub fn is_triggered(&self) -> bool {
        self.status == AreaStatus::Triggered
            || (self.status.is_armed() && !self.alarms.is_empty())
    }
}
