//! Thread-safe aggregate of the three virtual devices' state.
//!
//! One `parking_lot::Mutex` per device, matching the otg module's existing
//! per-resource locking style. Mutators may run from any thread (the evdev
//! read task, a synthetic-event injector); snapshot reads happen from the
//! dispatcher's transmit loop only, and never leak references — every read
//! returns owned bytes.

use parking_lot::Mutex;

use crate::error::{AppError, Result};
use crate::report::descriptor::{REPORT_ID_GAMEPAD, REPORT_ID_KEYBOARD, REPORT_ID_MOUSE};
use crate::report::gamepad::{Axis, Trigger};
use crate::report::keyboard::Modifier;
use crate::report::mouse::MouseButton;
use crate::report::{GamepadState, KeyboardState, MouseState};

/// Owns the live state of the gamepad, keyboard, and mouse virtual devices.
#[derive(Default)]
pub struct InputState {
    gamepad: Mutex<GamepadState>,
    keyboard: Mutex<KeyboardState>,
    mouse: Mutex<MouseState>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Gamepad ---

    pub fn set_button(&self, button: u8, pressed: bool) {
        self.gamepad.lock().set_button(button, pressed);
    }

    pub fn set_axis(&self, axis: Axis, value: i32) {
        self.gamepad.lock().set_axis(axis, value);
    }

    pub fn set_trigger(&self, trigger: Trigger, value: i32) {
        self.gamepad.lock().set_trigger(trigger, value);
    }

    pub fn set_hat(&self, up: bool, down: bool, left: bool, right: bool) {
        self.gamepad.lock().set_hat(up, down, left, right);
    }

    // --- Keyboard ---

    pub fn press_key(&self, scan_code: u8) {
        self.keyboard.lock().press_key(scan_code);
    }

    pub fn release_key(&self, scan_code: u8) {
        self.keyboard.lock().release_key(scan_code);
    }

    pub fn set_modifier(&self, modifier: Modifier, on: bool) {
        self.keyboard.lock().set_modifier(modifier, on);
    }

    // --- Mouse ---

    pub fn move_mouse(&self, dx: i32, dy: i32) {
        self.mouse.lock().move_mouse(dx, dy);
    }

    pub fn set_mouse_button(&self, button: MouseButton, pressed: bool) {
        self.mouse.lock().set_button(button, pressed);
    }

    pub fn wheel(&self, v: i32, h: i32) {
        self.mouse.lock().wheel(v, h);
    }

    // --- Dispatch ---

    /// Whether `report_id`'s state has pending changes worth transmitting.
    /// The mouse report is always dirty: relative deltas may be pending
    /// even with no button-state change.
    pub fn is_dirty(&self, report_id: u8) -> bool {
        match report_id {
            REPORT_ID_GAMEPAD => self.gamepad.lock().is_dirty(),
            REPORT_ID_KEYBOARD => self.keyboard.lock().is_dirty(),
            REPORT_ID_MOUSE => self.mouse.lock().is_dirty(),
            _ => false,
        }
    }

    /// Atomic read-and-clear of `report_id`'s payload bytes (without the
    /// report ID byte — framing is a transport concern).
    pub fn snapshot_and_clear_relative(&self, report_id: u8) -> Result<Vec<u8>> {
        match report_id {
            REPORT_ID_GAMEPAD => Ok(self.gamepad.lock().snapshot_and_clear().to_vec()),
            REPORT_ID_KEYBOARD => Ok(self.keyboard.lock().snapshot_and_clear().to_vec()),
            REPORT_ID_MOUSE => Ok(self.mouse.lock().snapshot_and_clear().to_vec()),
            other => Err(AppError::BadReportId(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_report_id_is_rejected() {
        let state = InputState::new();
        assert!(state.snapshot_and_clear_relative(0x42).is_err());
    }

    #[test]
    fn mouse_report_is_always_dirty() {
        let state = InputState::new();
        assert!(state.is_dirty(REPORT_ID_MOUSE));
    }

    #[test]
    fn gamepad_dirty_flag_tracks_mutation() {
        let state = InputState::new();
        assert!(!state.is_dirty(REPORT_ID_GAMEPAD));
        state.set_button(1, true);
        assert!(state.is_dirty(REPORT_ID_GAMEPAD));
        let _ = state.snapshot_and_clear_relative(REPORT_ID_GAMEPAD);
        assert!(!state.is_dirty(REPORT_ID_GAMEPAD));
    }

    #[test]
    fn mouse_round_trip_through_aggregate() {
        let state = InputState::new();
        state.move_mouse(10, 0);
        let bytes = state
            .snapshot_and_clear_relative(REPORT_ID_MOUSE)
            .unwrap();
        assert_eq!(&bytes[1..3], &10i16.to_le_bytes());
    }
}
