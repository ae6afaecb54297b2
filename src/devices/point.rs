// MIT License - Copyright (c) 2026 Peter Wright
// Detection points (sensors)

use crate::observer::Observer;

/// Point state as reported by the panel.
///
/// Raw values: 0 = Unknown, 1 = Normal, 2 = Open, 3 = Trouble,
/// 4 = Missing, 5 = Bypassed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointStatus {
    Unknown,
    Normal,
    Open,
    Trouble,
    Missing,
    Bypassed,
}

impl PointStatus {
    /// Parse a raw status byte. Returns `None` for codes the panel should never send.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Unknown),
            1 => Some(Self::Normal),
            2 => Some(Self::Open),
            3 => Some(Self::Trouble),
            4 => Some(Self::Missing),
            5 => Some(Self::Bypassed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Normal => "NORMAL",
            Self::Open => "OPEN",
            Self::Trouble => "TROUBLE",
            Self::Missing => "MISSING",
            Self::Bypassed => "BYPASSED",
        }
    }
}

/// A single detection point.
#[derive(Debug, Clone)]
pub struct Point {
    pub id: u16,
    pub name: String,
    pub status: PointStatus,
    pub status_observer: Observer,
}

impl Point {
    pub fn new(id: u16, name: impl Into<String>, status: PointStatus) -> Self {
        Self {
            id,
            name: name.into(),
            status,
            status_observer: Observer::new(),
        }
    }

    /// Returns true if the status changed.
    pub fn update_status(&mut self, status: PointStatus) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        true
    }

    pub fn is_open(&self) -> bool { self.status == PointStatus::Open }
    pub fn is_normal(&self) -> bool { self.status == PointStatus::Normal }
    pub fn is_available(&self) -> bool { self.is_open() || self.is_normal() }
}
