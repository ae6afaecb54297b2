// MIT License - Copyright (c) 2026 Peter Wright
// Mode 2 protocol constants and per-family lookup tables

use crate::devices::area::AreaStatus;

/// Frame layout.
pub const FRAME_MARKER: u8 = 0xB2;
pub const HEADER_LEN: usize = 6;
pub const CRC_LEN: usize = 2;
/// Largest body the panel will accept or send.
pub const MAX_BODY_LEN: usize = 1024;

/// Default Mode 2 automation port.
pub const DEFAULT_PORT: u16 = 7700;

/// Frame type codes (byte 1 of every frame).
pub const FRAME_REQUEST: u8 = 0x01;
pub const FRAME_ACK: u8 = 0x02;
pub const FRAME_NAK: u8 = 0x03;
pub const FRAME_STATUS_PUSH: u8 = 0x04;
pub const FRAME_HISTORY_PUSH: u8 = 0x05;
pub const FRAME_AUTH_CHALLENGE: u8 = 0x06;
pub const FRAME_AUTH_RESPONSE: u8 = 0x07;

/// Request opcodes (first body byte of a request frame).
pub const OP_WHAT_ARE_YOU: u8 = 0x01;
pub const OP_SET_DATE_TIME: u8 = 0x19;
pub const OP_PANEL_FAULTS: u8 = 0x22;
pub const OP_AREA_LIST: u8 = 0x24;
pub const OP_AREA_ARM: u8 = 0x27;
pub const OP_DOOR_LIST: u8 = 0x2B;
pub const OP_SET_DOOR: u8 = 0x2C;
pub const OP_OUTPUT_LIST: u8 = 0x30;
pub const OP_SET_OUTPUT: u8 = 0x32;
pub const OP_POINT_LIST: u8 = 0x3C;
pub const OP_HISTORY: u8 = 0x15;
pub const OP_SERIAL_NUMBER: u8 = 0x4A;

/// Status push kinds (first body byte of a status push frame).
pub const PUSH_AREA_STATUS: u8 = 0x01;
pub const PUSH_AREA_READY: u8 = 0x02;
pub const PUSH_AREA_ALARMS: u8 = 0x03;
pub const PUSH_POINT_STATUS: u8 = 0x04;
pub const PUSH_DOOR_STATUS: u8 = 0x05;
pub const PUSH_OUTPUT_STATUS: u8 = 0x06;
pub const PUSH_PANEL_FAULTS: u8 = 0x07;

/// Authentication variants (first body byte of an auth response).
pub const AUTH_USER_CODE: u8 = 0x01;
pub const AUTH_INSTALLER_CODE: u8 = 0x02;
pub const AUTH_PASSCODE: u8 = 0x03;

/// Door actions for `OP_SET_DOOR`.
pub const DOOR_CYCLE: u8 = 0x01;
pub const DOOR_UNLOCK: u8 = 0x02;
pub const DOOR_TERMINATE_UNLOCK: u8 = 0x03;
pub const DOOR_SECURE: u8 = 0x04;
pub const DOOR_UNSECURE: u8 = 0x05;

/// Output states for `OP_SET_OUTPUT`.
pub const OUTPUT_INACTIVE: u8 = 0x00;
pub const OUTPUT_ACTIVE: u8 = 0x01;

/// Area ready flag bits in area records and ready pushes.
pub const READY_ALL: u8 = 0x01;
pub const READY_PART: u8 = 0x02;

/// Panel model codes reported in the authentication challenge.
pub const PANEL_MODELS: [(u8, &str); 13] = [
    (0x20, "Solution 2000"),
    (0x21, "Solution 3000"),
    (0x22, "AMAX 2100"),
    (0x23, "AMAX 3000"),
    (0x24, "AMAX 4000"),
    (0x25, "Solution 4000"),
    (0x79, "D7412GV4"),
    (0x84, "D9412GV4"),
    (0xA0, "B4512"),
    (0xA4, "B5512 (US1B)"),
    (0xA6, "B8512G"),
    (0xA7, "B9512G"),
    (0xA8, "B3512"),
];

/// Look up the marketing name for a model code.
pub fn model_name(code: u8) -> Option<&'static str> {
    PANEL_MODELS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Area arming states reported by Solution and AMAX panels.
pub const COMPACT_AREA_STATUS: [(u8, AreaStatus); 8] = [
    (0x01, AreaStatus::Disarmed),
    (0x02, AreaStatus::Arming),
    (0x03, AreaStatus::Arming),
    (0x04, AreaStatus::AllArmed),
    (0x05, AreaStatus::PartArmed),
    (0x06, AreaStatus::Pending),
    (0x07, AreaStatus::Pending),
    (0x08, AreaStatus::Triggered),
];

/// Area arming states reported by B and G series panels.
pub const BG_AREA_STATUS: [(u8, AreaStatus); 10] = [
    (0x01, AreaStatus::AllArmed),
    (0x02, AreaStatus::PartArmed),
    (0x03, AreaStatus::AllArmed),
    (0x04, AreaStatus::PartArmed),
    (0x08, AreaStatus::Disarmed),
    (0x09, AreaStatus::Pending),
    (0x0A, AreaStatus::Pending),
    (0x0B, AreaStatus::Arming),
    (0x0C, AreaStatus::Arming),
    (0x0D, AreaStatus::Triggered),
];

/// Alarm type codes carried by area alarm pushes.
pub const ALARM_TYPES: [(u8, &str); 10] = [
    (0x01, "Burglary Alarm"),
    (0x02, "Burglary Trouble"),
    (0x03, "Burglary Supervisory"),
    (0x04, "Fire Alarm"),
    (0x05, "Fire Trouble"),
    (0x06, "Fire Supervisory"),
    (0x07, "Gas Alarm"),
    (0x08, "Gas Trouble"),
    (0x09, "Personal Emergency"),
    (0x0A, "Panic Alarm"),
];

/// Human-readable descriptor for an alarm type code.
pub fn alarm_description(code: u8) -> String {
    ALARM_TYPES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, d)| (*d).to_string())
        .unwrap_or_else(|| format!("Unknown Alarm 0x{code:02X}"))
}

/// CRC-16/MODBUS lookup table (256 entries, reflected poly 0xA001).
pub const CRC_TABLE: [u16; 256] = [
    0, 49345, 49537, 320, 49921, 960, 640, 49729,
    50689, 1728, 1920, 51009, 1280, 50625, 50305, 1088,
    52225, 3264, 3456, 52545, 3840, 53185, 52865, 3648,
    2560, 51905, 52097, 2880, 51457, 2496, 2176, 51265,
    55297, 6336, 6528, 55617, 6912, 56257, 55937, 6720,
    7680, 57025, 57217, 8000, 56577, 7616, 7296, 56385,
    5120, 54465, 54657, 5440, 55041, 6080, 5760, 54849,
    53761, 4800, 4992, 54081, 4352, 53697, 53377, 4160,
    61441, 12480, 12672, 61761, 13056, 62401, 62081, 12864,
    13824, 63169, 63361, 14144, 62721, 13760, 13440, 62529,
    15360, 64705, 64897, 15680, 65281, 16320, 16000, 65089,
    64001, 15040, 15232, 64321, 14592, 63937, 63617, 14400,
    10240, 59585, 59777, 10560, 60161, 11200, 10880, 59969,
    60929, 11968, 12160, 61249, 11520, 60865, 60545, 11328,
    58369, 9408, 9600, 58689, 9984, 59329, 59009, 9792,
    8704, 58049, 58241, 9024, 57601, 8640, 8320, 57409,
    40961, 24768, 24960, 41281, 25344, 41921, 41601, 25152,
    26112, 42689, 42881, 26432, 42241, 26048, 25728, 42049,
    27648, 44225, 44417, 27968, 44801, 28608, 28288, 44609,
    43521, 27328, 27520, 43841, 26880, 43457, 43137, 26688,
    30720, 47297, 47489, 31040, 47873, 31680, 31360, 47681,
    48641, 32448, 32640, 48961, 32000, 48577, 48257, 31808,
    46081, 29888, 30080, 46401, 30464, 47041, 46721, 30272,
    29184, 45761, 45953, 29504, 45313, 29120, 28800, 45121,
    20480, 37057, 37249, 20800, 37633, 21440, 21120, 37441,
    38401, 22208, 22400, 38721, 21760, 38337, 38017, 21568,
    39937, 23744, 23936, 40257, 24320, 40897, 40577, 24128,
    23040, 39617, 39809, 23360, 39169, 22976, 22656, 38977,
    34817, 18624, 18816, 35137, 19200, 35777, 35457, 19008,
    19968, 36545, 36737, 20288, 36097, 19904, 19584, 35905,
    17408, 33985, 34177, 17728, 34561, 18368, 18048, 34369,
    33281, 17088, 17280, 33601, 16640, 33217, 32897, 16448,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_name_lookup() {
        assert_eq!(model_name(0x21), Some("Solution 3000"));
        assert_eq!(model_name(0xA4), Some("B5512 (US1B)"));
        assert_eq!(model_name(0x00), None);
    }

    #[test]
    fn test_alarm_description_unknown_code() {
        assert_eq!(alarm_description(0x04), "Fire Alarm");
        assert_eq!(alarm_description(0x7F), "Unknown Alarm 0x7F");
    }

    #[test]
    fn test_status_tables_cover_every_logical_state() {
        for table in [&COMPACT_AREA_STATUS[..], &BG_AREA_STATUS[..]] {
            for status in [
                AreaStatus::Disarmed,
                AreaStatus::Arming,
                AreaStatus::Pending,
                AreaStatus::PartArmed,
                AreaStatus::AllArmed,
                AreaStatus::Triggered,
            ] {
                assert!(table.iter().any(|(_, s)| *s == status), "{status:?} missing");
            }
        }
    }
}
