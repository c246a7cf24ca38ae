//! Report-ID-aware framing: prepends the report ID byte for the USB
//! transport, which the GATT transport omits (the ID is implicit in which
//! characteristic carries the value).

use crate::error::{AppError, Result};

use super::descriptor::{self, REPORT_ID_GAMEPAD, REPORT_ID_KEYBOARD, REPORT_ID_MOUSE};

/// Direction-quad to hat-switch byte, per the canonical table. Opposite
/// simultaneous directions (up+down, left+right) cancel before lookup, so
/// holding both collapses to neutral rather than an undefined combination.
pub fn hat_from_directions(up: bool, down: bool, left: bool, right: bool) -> u8 {
    let u = up && !down;
    let d = down && !up;
    let l = left && !right;
    let r = right && !left;
    match (u, d, l, r) {
        (true, false, false, true) => 1,
        (false, false, false, true) => 2,
        (false, true, false, true) => 3,
        (false, true, false, false) => 4,
        (false, true, true, false) => 5,
        (false, false, true, false) => 6,
        (true, false, true, false) => 7,
        (true, false, false, false) => 0,
        _ => super::gamepad::HAT_NEUTRAL,
    }
}

/// Prepends `report_id` to `payload`, as the USB gadget transport requires.
pub fn frame_with_report_id(report_id: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(report_id);
    out.extend_from_slice(payload);
    out
}

/// Validates that `report_id` names a known report and that `payload`'s
/// length matches what the descriptor declares for it.
pub fn validate(report_id: u8, payload: &[u8]) -> Result<()> {
    match descriptor::payload_len(report_id) {
        Some(len) if len == payload.len() => Ok(()),
        Some(_) | None => Err(AppError::BadReportId(report_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_prepends_report_id() {
        let framed = frame_with_report_id(REPORT_ID_MOUSE, &[0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(framed[0], REPORT_ID_MOUSE);
        assert_eq!(framed.len(), 8);
    }

    #[test]
    fn validate_rejects_unknown_report_id() {
        assert!(validate(0xEE, &[]).is_err());
    }

    #[test]
    fn validate_rejects_wrong_length() {
        assert!(validate(REPORT_ID_GAMEPAD, &[0; 5]).is_err());
        assert!(validate(REPORT_ID_KEYBOARD, &[0; 8]).is_ok());
    }
}
