//! In-memory gamepad state and its report encoding.

use super::descriptor::GAMEPAD_REPORT_LEN;

/// Neutral (no direction held) hat switch value.
pub const HAT_NEUTRAL: u8 = 8;

/// Snapshot of the virtual gamepad's 11 buttons, 4 analog axes, 2 triggers,
/// and one 8-direction hat switch.
#[derive(Debug, Clone, Default)]
pub struct GamepadState {
    /// Bit N set = button N+1 held. Only bits 0..=10 are meaningful.
    buttons: u16,
    x: i16,
    y: i16,
    rx: i16,
    ry: i16,
    l2: u8,
    r2: u8,
    hat_up: bool,
    hat_down: bool,
    hat_left: bool,
    hat_right: bool,
    dirty: bool,
}

/// Gamepad axis selector for `set_axis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Rx,
    Ry,
}

/// Trigger selector for `set_trigger`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    L2,
    R2,
}

impl GamepadState {
    /// `button` is 1-based (1..=11) per the descriptor's Usage Minimum/Maximum.
    pub fn set_button(&mut self, button: u8, pressed: bool) {
        if !(1..=11).contains(&button) {
            return;
        }
        let bit = 1u16 << (button - 1);
        let before = self.buttons;
        if pressed {
            self.buttons |= bit;
        } else {
            self.buttons &= !bit;
        }
        if before != self.buttons {
            self.dirty = true;
        }
    }

    pub fn set_axis(&mut self, axis: Axis, value: i32) {
        let clamped = value.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        let slot = match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Rx => &mut self.rx,
            Axis::Ry => &mut self.ry,
        };
        if *slot != clamped {
            *slot = clamped;
            self.dirty = true;
        }
    }

    pub fn set_trigger(&mut self, trigger: Trigger, value: i32) {
        let clamped = value.clamp(0, 255) as u8;
        let slot = match trigger {
            Trigger::L2 => &mut self.l2,
            Trigger::R2 => &mut self.r2,
        };
        if *slot != clamped {
            *slot = clamped;
            self.dirty = true;
        }
    }

    /// Updates the held directions; the hat byte is derived from these at
    /// serialization time via the canonical direction table.
    pub fn set_hat(&mut self, up: bool, down: bool, left: bool, right: bool) {
        if (self.hat_up, self.hat_down, self.hat_left, self.hat_right)
            != (up, down, left, right)
        {
            self.hat_up = up;
            self.hat_down = down;
            self.hat_left = left;
            self.hat_right = right;
            self.dirty = true;
        }
    }

    /// Direction-boolean-quad to hat byte, per the canonical table: opposite
    /// simultaneous directions (up+down, left+right) cancel before lookup.
    pub fn hat_byte(&self) -> u8 {
        super::codec::hat_from_directions(self.hat_up, self.hat_down, self.hat_left, self.hat_right)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Serializes the current state to the 13-byte gamepad report payload
    /// and clears the dirty flag.
    pub fn snapshot_and_clear(&mut self) -> [u8; GAMEPAD_REPORT_LEN] {
        self.dirty = false;
        let mut out = [0u8; GAMEPAD_REPORT_LEN];
        out[0] = (self.buttons & 0xFF) as u8;
        out[1] = ((self.buttons >> 8) & 0x07) as u8;
        out[2..4].copy_from_slice(&self.x.to_le_bytes());
        out[4..6].copy_from_slice(&self.y.to_le_bytes());
        out[6..8].copy_from_slice(&self.rx.to_le_bytes());
        out[8..10].copy_from_slice(&self.ry.to_le_bytes());
        out[10] = self.l2;
        out[11] = self.r2;
        out[12] = self.hat_byte();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_one_sets_low_bit() {
        let mut gp = GamepadState::default();
        gp.set_button(1, true);
        let bytes = gp.snapshot_and_clear();
        assert_eq!(
            bytes,
            [0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, HAT_NEUTRAL]
        );
    }

    #[test]
    fn axis_x_is_little_endian() {
        let mut gp = GamepadState::default();
        gp.set_axis(Axis::X, 0x4000);
        let bytes = gp.snapshot_and_clear();
        assert_eq!(&bytes[2..4], &[0x00, 0x40]);
    }

    #[test]
    fn hat_up_right_then_right_only() {
        let mut gp = GamepadState::default();
        gp.set_hat(true, false, false, true);
        assert_eq!(gp.hat_byte(), 1);
        gp.set_hat(false, false, false, true);
        assert_eq!(gp.hat_byte(), 2);
    }

    #[test]
    fn opposite_directions_are_neutral() {
        let mut gp = GamepadState::default();
        gp.set_hat(true, true, false, false);
        assert_eq!(gp.hat_byte(), HAT_NEUTRAL);
    }

    #[test]
    fn axis_clamps_out_of_range_values() {
        let mut gp = GamepadState::default();
        gp.set_axis(Axis::Y, 100_000);
        let bytes = gp.snapshot_and_clear();
        assert_eq!(&bytes[4..6], &i16::MAX.to_le_bytes());
    }

    #[test]
    fn report_length_matches_descriptor() {
        let gp = GamepadState::default();
        assert_eq!(gp.clone().snapshot_and_clear().len(), GAMEPAD_REPORT_LEN);
    }
}
