// MIT License - Copyright (c) 2026 Peter Wright
// Panel-wide trouble conditions

use bitflags::bitflags;

bitflags! {
    /// Panel fault bits, as carried by the faults reply and faults push (u16 BE).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PanelFaults: u16 {
        /// Phone line failure
        const PHONE_LINE_FAILURE     = 1 << 0;
        /// Parameter checksum failure
        const PARAMETER_CRC_FAIL     = 1 << 1;
        /// Communication failure to the receiver
        const COMMUNICATION_FAIL     = 1 << 2;
        /// Battery low
        const BATTERY_LOW            = 1 << 3;
        /// Battery missing
        const BATTERY_MISSING        = 1 << 4;
        /// AC power failure
        const AC_FAIL                = 1 << 5;
        /// Event log overflow
        const LOG_OVERFLOW           = 1 << 6;
        /// Event log threshold reached
        const LOG_THRESHOLD          = 1 << 7;
        /// Point bus failure
        const POINT_BUS_FAILURE      = 1 << 8;
        /// SDI bus failure
        const SDI_FAILURE            = 1 << 9;
        /// Enclosure tamper
        const ENCLOSURE_TAMPER       = 1 << 10;
        /// Clock lost
        const CLOCK_LOST             = 1 << 11;
    }
}

const FAULT_DESCRIPTIONS: [(PanelFaults, &str); 12] = [
    (PanelFaults::PHONE_LINE_FAILURE, "Phone line failure"),
    (PanelFaults::PARAMETER_CRC_FAIL, "Parameter CRC fail"),
    (PanelFaults::COMMUNICATION_FAIL, "Communication failure"),
    (PanelFaults::BATTERY_LOW, "Battery low"),
    (PanelFaults::BATTERY_MISSING, "Battery missing"),
    (PanelFaults::AC_FAIL, "AC fail"),
    (PanelFaults::LOG_OVERFLOW, "Log overflow"),
    (PanelFaults::LOG_THRESHOLD, "Log threshold reached"),
    (PanelFaults::POINT_BUS_FAILURE, "Point bus failure"),
    (PanelFaults::SDI_FAILURE, "SDI failure"),
    (PanelFaults::ENCLOSURE_TAMPER, "Enclosure tamper"),
    (PanelFaults::CLOCK_LOST, "Clock lost"),
];

impl PanelFaults {
    /// Parse the raw fault word. Unknown bits are dropped.
    pub fn from_word(word: u16) -> Self {
        Self::from_bits_truncate(word)
    }

    /// Descriptor strings for every set fault, in bit order.
    pub fn descriptions(&self) -> Vec<&'static str> {
        FAULT_DESCRIPTIONS
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, d)| *d)
            .collect()
    }

    pub fn is_ac_fail(&self) -> bool { self.contains(Self::AC_FAIL) }
    pub fn is_battery_low(&self) -> bool { self.contains(Self::BATTERY_LOW) }
}
