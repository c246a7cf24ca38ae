//! HID Report Descriptor — composite gamepad + keyboard + mouse device.
//!
//! One top-level Application collection per report ID, concatenated into a
//! single descriptor blob so the USB gadget and the BLE HoG server both
//! serve the exact same bytes for the Report Map / report_desc file.

/// Report ID for the gamepad collection.
pub const REPORT_ID_GAMEPAD: u8 = 0x01;
/// Report ID for the keyboard collection.
pub const REPORT_ID_KEYBOARD: u8 = 0x02;
/// Report ID for the mouse collection.
pub const REPORT_ID_MOUSE: u8 = 0x03;

/// Gamepad input report payload length (excludes the report ID byte).
pub const GAMEPAD_REPORT_LEN: usize = 13;
/// Keyboard input report payload length (excludes the report ID byte).
pub const KEYBOARD_REPORT_LEN: usize = 8;
/// Mouse input report payload length (excludes the report ID byte).
pub const MOUSE_REPORT_LEN: usize = 7;

/// Longest report including its report ID byte — what the USB gadget's
/// `report_length` configfs attribute must be set to.
pub const MAX_REPORT_LEN_WITH_ID: usize = 1 + GAMEPAD_REPORT_LEN;

const GAMEPAD: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x05, // Usage (Game Pad)
    0xA1, 0x01, // Collection (Application)
    0x85, REPORT_ID_GAMEPAD, //   Report ID (1)
    // 11 digital buttons
    0x05, 0x09, //   Usage Page (Button)
    0x19, 0x01, //   Usage Minimum (1)
    0x29, 0x0B, //   Usage Maximum (11)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x0B, //   Report Count (11)
    0x81, 0x02, //   Input (Data, Var, Abs)
    // 5 padding bits filling out the second button byte
    0x95, 0x01, //   Report Count (1)
    0x75, 0x05, //   Report Size (5)
    0x81, 0x01, //   Input (Const)
    // X, Y, Rx, Ry — 16-bit signed
    0x05, 0x01, //   Usage Page (Generic Desktop)
    0x09, 0x30, //   Usage (X)
    0x09, 0x31, //   Usage (Y)
    0x09, 0x33, //   Usage (Rx)
    0x09, 0x34, //   Usage (Ry)
    0x16, 0x00, 0x80, // Logical Minimum (-32768)
    0x26, 0xFF, 0x7F, // Logical Maximum (32767)
    0x75, 0x10, //   Report Size (16)
    0x95, 0x04, //   Report Count (4)
    0x81, 0x02, //   Input (Data, Var, Abs)
    // L2 / R2 triggers — 8-bit unsigned
    0x05, 0x02, //   Usage Page (Simulation Controls)
    0x09, 0xC5, //   Usage (Brake)
    0x09, 0xC4, //   Usage (Accelerator)
    0x15, 0x00, //   Logical Minimum (0)
    0x26, 0xFF, 0x00, // Logical Maximum (255)
    0x75, 0x08, //   Report Size (8)
    0x95, 0x02, //   Report Count (2)
    0x81, 0x02, //   Input (Data, Var, Abs)
    // Hat switch — 4 bits, null state for neutral, 4 padding bits
    0x05, 0x01, //   Usage Page (Generic Desktop)
    0x09, 0x39, //   Usage (Hat Switch)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x07, //   Logical Maximum (7)
    0x35, 0x00, //   Physical Minimum (0)
    0x46, 0x3B, 0x01, // Physical Maximum (315)
    0x65, 0x14, //   Unit (Eng Rot: Angular Position)
    0x75, 0x04, //   Report Size (4)
    0x95, 0x01, //   Report Count (1)
    0x81, 0x42, //   Input (Data, Var, Abs, Null State)
    0x65, 0x00, //   Unit (None)
    0x75, 0x04, //   Report Size (4)
    0x95, 0x01, //   Report Count (1)
    0x81, 0x01, //   Input (Const) - padding
    0xC0, // End Collection
];

const KEYBOARD: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x06, // Usage (Keyboard)
    0xA1, 0x01, // Collection (Application)
    0x85, REPORT_ID_KEYBOARD, //   Report ID (2)
    // Modifier byte
    0x05, 0x07, //   Usage Page (Key Codes)
    0x19, 0xE0, //   Usage Minimum (224) - Left Control
    0x29, 0xE7, //   Usage Maximum (231) - Right GUI
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x08, //   Report Count (8)
    0x81, 0x02, //   Input (Data, Var, Abs)
    // Reserved byte
    0x95, 0x01, //   Report Count (1)
    0x75, 0x08, //   Report Size (8)
    0x81, 0x01, //   Input (Const)
    // 6 simultaneous key codes
    0x95, 0x06, //   Report Count (6)
    0x75, 0x08, //   Report Size (8)
    0x15, 0x00, //   Logical Minimum (0)
    0x26, 0xFF, 0x00, // Logical Maximum (255)
    0x05, 0x07, //   Usage Page (Key Codes)
    0x19, 0x00, //   Usage Minimum (0)
    0x2A, 0xFF, 0x00, // Usage Maximum (255)
    0x81, 0x00, //   Input (Data, Array)
    0xC0, // End Collection
];

const MOUSE: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x02, // Usage (Mouse)
    0xA1, 0x01, // Collection (Application)
    0x85, REPORT_ID_MOUSE, //   Report ID (3)
    0x09, 0x01, //   Usage (Pointer)
    0xA1, 0x00, //   Collection (Physical)
    // Left/Right/Middle buttons
    0x05, 0x09, //     Usage Page (Button)
    0x19, 0x01, //     Usage Minimum (1)
    0x29, 0x03, //     Usage Maximum (3)
    0x15, 0x00, //     Logical Minimum (0)
    0x25, 0x01, //     Logical Maximum (1)
    0x95, 0x03, //     Report Count (3)
    0x75, 0x01, //     Report Size (1)
    0x81, 0x02, //     Input (Data, Var, Abs)
    // Padding (5 bits)
    0x95, 0x01, //     Report Count (1)
    0x75, 0x05, //     Report Size (5)
    0x81, 0x01, //     Input (Const)
    // Relative X, Y — 16-bit signed
    0x05, 0x01, //     Usage Page (Generic Desktop)
    0x09, 0x30, //     Usage (X)
    0x09, 0x31, //     Usage (Y)
    0x16, 0x00, 0x80, // Logical Minimum (-32768)
    0x26, 0xFF, 0x7F, // Logical Maximum (32767)
    0x75, 0x10, //     Report Size (16)
    0x95, 0x02, //     Report Count (2)
    0x81, 0x06, //     Input (Data, Var, Rel)
    // Vertical wheel
    0x09, 0x38, //     Usage (Wheel)
    0x15, 0x81, //     Logical Minimum (-127)
    0x25, 0x7F, //     Logical Maximum (127)
    0x75, 0x08, //     Report Size (8)
    0x95, 0x01, //     Report Count (1)
    0x81, 0x06, //     Input (Data, Var, Rel)
    // Horizontal wheel (Consumer AC Pan)
    0x05, 0x0C, //     Usage Page (Consumer)
    0x0A, 0x38, 0x02, // Usage (AC Pan)
    0x15, 0x81, //     Logical Minimum (-127)
    0x25, 0x7F, //     Logical Maximum (127)
    0x75, 0x08, //     Report Size (8)
    0x95, 0x01, //     Report Count (1)
    0x81, 0x06, //     Input (Data, Var, Rel)
    0xC0, //   End Collection
    0xC0, // End Collection
];

/// Full composite HID report descriptor: gamepad, then keyboard, then mouse.
pub fn bytes() -> Vec<u8> {
    let mut out = Vec::with_capacity(GAMEPAD.len() + KEYBOARD.len() + MOUSE.len());
    out.extend_from_slice(GAMEPAD);
    out.extend_from_slice(KEYBOARD);
    out.extend_from_slice(MOUSE);
    out
}

/// Payload length (without report ID) declared by the descriptor for a
/// given report ID, or `None` for an unknown ID.
pub fn payload_len(report_id: u8) -> Option<usize> {
    match report_id {
        REPORT_ID_GAMEPAD => Some(GAMEPAD_REPORT_LEN),
        REPORT_ID_KEYBOARD => Some(KEYBOARD_REPORT_LEN),
        REPORT_ID_MOUSE => Some(MOUSE_REPORT_LEN),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_is_nonempty_and_well_formed() {
        let desc = bytes();
        assert!(!desc.is_empty());
        // Each collection opens (0xA1) and closes (0xC0) in balance.
        let opens = desc.iter().filter(|&&b| b == 0xA1).count();
        let closes = desc.iter().filter(|&&b| b == 0xC0).count();
        assert_eq!(opens, closes);
    }

    #[test]
    fn payload_lengths_match_report_ids() {
        assert_eq!(payload_len(REPORT_ID_GAMEPAD), Some(13));
        assert_eq!(payload_len(REPORT_ID_KEYBOARD), Some(8));
        assert_eq!(payload_len(REPORT_ID_MOUSE), Some(7));
        assert_eq!(payload_len(0x09), None);
    }

    #[test]
    fn max_report_len_accounts_for_report_id_byte() {
        assert_eq!(MAX_REPORT_LEN_WITH_ID, 14);
    }
}
