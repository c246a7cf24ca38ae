//! In-memory keyboard state and its Boot-style report encoding.

use super::descriptor::KEYBOARD_REPORT_LEN;

/// Number of simultaneous key slots before rollover.
const KEY_SLOTS: usize = 6;
/// ErrorRollOver fill value used once more than `KEY_SLOTS` keys are held,
/// per the HID Boot Keyboard convention this spec follows.
const ERROR_ROLL_OVER: u8 = 0x01;

/// Modifier bit flags (Ctrl/Shift/Alt/Meta × left/right), matching the
/// descriptor's Usage Minimum 0xE0 (Left Control) .. Maximum 0xE7 (Right GUI).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Modifier {
    LeftCtrl = 0x01,
    LeftShift = 0x02,
    LeftAlt = 0x04,
    LeftMeta = 0x08,
    RightCtrl = 0x10,
    RightShift = 0x20,
    RightAlt = 0x40,
    RightMeta = 0x80,
}

/// Snapshot of the virtual keyboard: modifier byte plus an ordered multiset
/// of up to six simultaneously-held scan codes.
#[derive(Debug, Clone, Default)]
pub struct KeyboardState {
    modifiers: u8,
    /// Insertion-ordered; `active` keys are the leading `count` slots.
    keys: [u8; KEY_SLOTS],
    count: usize,
    /// True once more than six keys have been held at once; cleared only
    /// when the held-key count drops back to `KEY_SLOTS` or below.
    overflowed: bool,
    dirty: bool,
}

impl KeyboardState {
    pub fn set_modifier(&mut self, modifier: Modifier, on: bool) {
        let bit = modifier as u8;
        let before = self.modifiers;
        if on {
            self.modifiers |= bit;
        } else {
            self.modifiers &= !bit;
        }
        if before != self.modifiers {
            self.dirty = true;
        }
    }

    /// Adds `scan_code` to the held set. Idempotent if already held.
    pub fn press_key(&mut self, scan_code: u8) {
        if self.keys[..self.count].contains(&scan_code) {
            return;
        }
        if self.count < KEY_SLOTS {
            self.keys[self.count] = scan_code;
            self.count += 1;
        } else {
            self.overflowed = true;
        }
        self.dirty = true;
    }

    /// Removes `scan_code` from the held set, compacting the remaining keys.
    pub fn release_key(&mut self, scan_code: u8) {
        if let Some(pos) = self.keys[..self.count].iter().position(|&k| k == scan_code) {
            for i in pos..self.count - 1 {
                self.keys[i] = self.keys[i + 1];
            }
            self.count -= 1;
            self.keys[self.count] = 0;
            self.dirty = true;
        }
        if self.count <= KEY_SLOTS {
            self.overflowed = false;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Serializes the current state to the 8-byte keyboard report payload
    /// and clears the dirty flag. Overflow fills all six slots with
    /// ErrorRollOver (0x01); the modifier byte stays accurate regardless.
    pub fn snapshot_and_clear(&mut self) -> [u8; KEYBOARD_REPORT_LEN] {
        self.dirty = false;
        let mut out = [0u8; KEYBOARD_REPORT_LEN];
        out[0] = self.modifiers;
        out[1] = 0;
        if self.overflowed {
            out[2..8].fill(ERROR_ROLL_OVER);
        } else {
            out[2..2 + self.count].copy_from_slice(&self.keys[..self.count]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_a_yields_expected_report() {
        let mut kb = KeyboardState::default();
        kb.press_key(0x04);
        assert_eq!(kb.snapshot_and_clear(), [0, 0, 0x04, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn seven_keys_triggers_full_rollover() {
        let mut kb = KeyboardState::default();
        for code in 0x04..=0x0A {
            kb.press_key(code);
        }
        assert_eq!(kb.snapshot_and_clear(), [0, 0, 1, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn releasing_below_seven_clears_rollover() {
        let mut kb = KeyboardState::default();
        for code in 0x04..=0x0A {
            kb.press_key(code);
        }
        kb.release_key(0x0A);
        let bytes = kb.snapshot_and_clear();
        assert_ne!(bytes[2], ERROR_ROLL_OVER);
        assert_eq!(&bytes[2..8].iter().filter(|&&b| b != 0).count(), &6);
    }

    #[test]
    fn modifier_byte_is_independent_of_rollover() {
        let mut kb = KeyboardState::default();
        kb.set_modifier(Modifier::LeftShift, true);
        for code in 0x04..=0x0A {
            kb.press_key(code);
        }
        let bytes = kb.snapshot_and_clear();
        assert_eq!(bytes[0], Modifier::LeftShift as u8);
    }

    #[test]
    fn duplicate_press_is_idempotent() {
        let mut kb = KeyboardState::default();
        kb.press_key(0x04);
        kb.press_key(0x04);
        assert_eq!(kb.snapshot_and_clear()[2], 0x04);
    }
}
