// MIT License - Copyright (c) 2026 Peter Wright
// Controllable outputs (relays)

use crate::constants::{OUTPUT_ACTIVE, OUTPUT_INACTIVE};
use crate::observer::Observer;

/// Output relay state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStatus {
    Inactive,
    Active,
}

impl OutputStatus {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            OUTPUT_INACTIVE => Some(Self::Inactive),
            OUTPUT_ACTIVE => Some(Self::Active),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::Inactive => OUTPUT_INACTIVE,
            Self::Active => OUTPUT_ACTIVE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "INACTIVE",
            Self::Active => "ACTIVE",
        }
    }
}

/// A single output device.
#[derive(Debug, Clone)]
pub struct Output {
    pub id: u16,
    pub name: String,
    pub status: OutputStatus,
    pub status_observer: Observer,
    revision: u64,
}

impl Output {
    pub fn new(id: u16, name: impl Into<String>, status: OutputStatus) -> Self {
        Self {
            id,
            name: name.into(),
            status,
            status_observer: Observer::new(),
            revision: 0,
        }
    }

    /// Returns true if the status changed.
    pub fn update_status(&mut self, status: OutputStatus) -> bool {
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

    pub fn is_active(&self) -> bool {
        self.status == OutputStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_status_codes() {
        assert_eq!(OutputStatus::from_code(1), Some(OutputStatus::Active));
        assert_eq!(OutputStatus::from_code(0), Some(OutputStatus::Inactive));
        assert_eq!(OutputStatus::from_code(7), None);
        assert_eq!(OutputStatus::Active.code(), 1);
    }

    #[test]
    fn test_output_update_status() {
        let mut output = Output::new(1, "Siren", OutputStatus::Inactive);
        assert!(!output.is_active());
        assert!(output.update_status(OutputStatus::Active));
        assert!(output.is_active());
        assert!(!output.update_status(OutputStatus::Active));
    }
}
