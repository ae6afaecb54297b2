// MIT License - Copyright (c) 2026 Peter Wright
// Access-controlled doors

use crate::observer::Observer;

/// Door state as reported by the panel.
///
/// Raw values: 0 = Unknown, 1 = Cycling, 2 = Unlocked, 3 = Open,
/// 4 = Locked, 5 = Secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DoorStatus {
    Unknown,
    Cycling,
    Unlocked,
    Open,
    Locked,
    Secured,
}

impl DoorStatus {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Unknown),
            1 => Some(Self::Cycling),
            2 => Some(Self::Unlocked),
            3 => Some(Self::Open),
            4 => Some(Self::Locked),
            5 => Some(Self::Secured),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Cycling => "CYCLING",
            Self::Unlocked => "UNLOCKED",
            Self::Open => "OPEN",
            Self::Locked => "LOCKED",
            Self::Secured => "SECURED",
        }
    }
}

/// A single controlled door.
#[derive(Debug, Clone)]
pub struct Door {
    pub id: u16,
    pub name: String,
    pub status: DoorStatus,
    pub status_observer: Observer,
    revision: u64,
}

impl Door {
    pub fn new(id: u16, name: impl Into<String>, status: DoorStatus) -> Self {
        Self {
            id,
            name: name.into(),
            status,
            status_observer: Observer::new(),
            revision: 0,
        }
    }

    /// Returns true if the status changed.
    pub fn update_status(&mut self, status: DoorStatus) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        self.revision += 1;
        true
    }

    pub(crate) fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.status, DoorStatus::Locked | DoorStatus::Secured)
    }

    pub fn is_open(&self) -> bool {
        matches!(
            self.status,
            DoorStatus::Unlocked | DoorStatus::Open | DoorStatus::Cycling
        )
    }

    pub fn is_available(&self) -> bool { self.is_open() || self.is_locked() }
}
