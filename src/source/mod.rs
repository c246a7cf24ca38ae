//! Input Source Adapter: translates a kernel evdev event stream into
//! `InputState` mutations.
//!
//! Grounded on the pack's evdev-based adapters (`evdev::enumerate()` for
//! `auto` device selection, `task::spawn_blocking` around the blocking
//! `fetch_events()` read loop, and the evdev-keycode-to-HID-usage mapping
//! tables) rather than on anything in the teacher, which has no physical
//! gamepad input path of its own.

use std::path::PathBuf;
use std::sync::Arc;

use evdev::{AbsoluteAxisCode, Device, EventSummary, KeyCode};
use tokio::sync::mpsc;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{AppError, Result};
use crate::input::InputState;
use crate::report::gamepad::{Axis, Trigger};

/// Fixed lookup from a physical gamepad's button codes to the virtual
/// gamepad's 1-based button indices (per the descriptor's 11-button field).
fn button_index(code: KeyCode) -> Option<u8> {
    match code {
        KeyCode::BTN_SOUTH => Some(1),
        KeyCode::BTN_EAST => Some(2),
        KeyCode::BTN_NORTH => Some(3),
        KeyCode::BTN_WEST => Some(4),
        KeyCode::BTN_TL => Some(5),
        KeyCode::BTN_TR => Some(6),
        KeyCode::BTN_SELECT => Some(7),
        KeyCode::BTN_START => Some(8),
        KeyCode::BTN_THUMBL => Some(9),
        KeyCode::BTN_THUMBR => Some(10),
        KeyCode::BTN_MODE => Some(11),
        _ => None,
    }
}

/// Linearly rescales `value` from `[in_min, in_max]` to `[out_min, out_max]`.
fn rescale(value: i32, in_min: i32, in_max: i32, out_min: i32, out_max: i32) -> i32 {
    if in_max <= in_min {
        return out_min;
    }
    let span = (in_max - in_min) as i64;
    let out_span = (out_max - out_min) as i64;
    let offset = (value - in_min) as i64;
    out_min + ((offset * out_span) / span) as i32
}

/// Tracks the four D-pad directions so a single discrete-button or
/// discrete-axis change can be folded into one `InputState::set_hat` call.
#[derive(Default)]
struct DpadTracker {
    up: bool,
    down: bool,
    left: bool,
    right: bool,
}

/// Reads one evdev device and maps its events onto an `InputState`.
///
/// `device_path` of `"auto"` scans `/dev/input/event*` for the first device
/// whose capabilities advertise both absolute axes and gamepad buttons.
pub struct EvdevSource {
    device_path: String,
}

impl EvdevSource {
    pub fn new(device_path: impl Into<String>) -> Self {
        Self {
            device_path: device_path.into(),
        }
    }

    fn resolve_path(&self) -> Result<PathBuf> {
        if self.device_path != "auto" {
            return Ok(PathBuf::from(&self.device_path));
        }
        for (path, device) in evdev::enumerate() {
            let has_buttons = device
                .supported_keys()
                .map(|keys| keys.contains(KeyCode::BTN_SOUTH) || keys.contains(KeyCode::BTN_GAMEPAD))
                .unwrap_or(false);
            let has_axes = device
                .supported_absolute_axes()
                .map(|axes| axes.contains(AbsoluteAxisCode::ABS_X))
                .unwrap_or(false);
            if has_buttons && has_axes {
                return Ok(path);
            }
        }
        Err(AppError::DeviceUnsupported(
            "no gamepad-capable evdev device found".into(),
        ))
    }

    /// Opens the device and runs the blocking read loop on a worker thread,
    /// posting mutations through an mpsc channel drained on the caller's
    /// runtime, until `cancel` fires or the device disappears.
    pub async fn run(self, state: Arc<InputState>, cancel: CancellationToken) -> Result<()> {
        let path = self.resolve_path()?;
        let mut device = Device::open(&path)
            .map_err(|e| AppError::DeviceGone(format!("{}: {e}", path.display())))?;

        let has_triggers = device
            .supported_absolute_axes()
            .map(|axes| {
                axes.contains(AbsoluteAxisCode::ABS_Z)
                    || axes.contains(AbsoluteAxisCode::ABS_RZ)
                    || axes.contains(AbsoluteAxisCode::ABS_HAT2Y)
                    || axes.contains(AbsoluteAxisCode::ABS_HAT2X)
            })
            .unwrap_or(false);
        if !has_triggers {
            warn!(
                "{}: no ABS_Z/ABS_RZ/ABS_HAT2Y/ABS_HAT2X axis, triggers will stay at rest",
                path.display()
            );
        }

        let axis_ranges = AxisRanges::from_device(&device);

        let (tx, mut rx) = mpsc::channel::<evdev::InputEvent>(256);
        let worker = task::spawn_blocking(move || loop {
            match device.fetch_events() {
                Ok(events) => {
                    for ev in events {
                        if tx.blocking_send(ev).is_err() {
                            return;
                        }
                    }
                }
                Err(_) => return,
            }
        });

        let mut tracker = DpadTracker::default();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => {
                    match event {
                        Some(ev) => handle_event(&state, &axis_ranges, &mut tracker, ev),
                        None => {
                            return Err(AppError::DeviceGone(path.display().to_string()));
                        }
                    }
                }
            }
        }
        worker.abort();
        Ok(())
    }
}

/// Device-reported min/max for each analog axis, captured once at attach
/// time so every event can be rescaled without re-querying the kernel.
struct AxisRanges {
    x: (i32, i32),
    y: (i32, i32),
    rx: (i32, i32),
    ry: (i32, i32),
    z: (i32, i32),
    rz: (i32, i32),
    hat2y: (i32, i32),
    hat2x: (i32, i32),
}

impl AxisRanges {
    fn from_device(device: &Device) -> Self {
        let range_of = |code: AbsoluteAxisCode| {
            device
                .get_absinfo(code)
                .map(|info| (info.minimum(), info.maximum()))
                .unwrap_or((-32768, 32767))
        };
        Self {
            x: range_of(AbsoluteAxisCode::ABS_X),
            y: range_of(AbsoluteAxisCode::ABS_Y),
            rx: range_of(AbsoluteAxisCode::ABS_RX),
            ry: range_of(AbsoluteAxisCode::ABS_RY),
            z: range_of(AbsoluteAxisCode::ABS_Z),
            rz: range_of(AbsoluteAxisCode::ABS_RZ),
            hat2y: range_of(AbsoluteAxisCode::ABS_HAT2Y),
            hat2x: range_of(AbsoluteAxisCode::ABS_HAT2X),
        }
    }
}

fn handle_event(
    state: &InputState,
    ranges: &AxisRanges,
    tracker: &mut DpadTracker,
    event: evdev::InputEvent,
) {
    match event.destructure() {
        EventSummary::Key(_, code, value) => {
            if let Some(index) = button_index(code) {
                state.set_button(index, value != 0);
                return;
            }
            let pressed = value != 0;
            match code {
                KeyCode::BTN_DPAD_UP => tracker.up = pressed,
                KeyCode::BTN_DPAD_DOWN => tracker.down = pressed,
                KeyCode::BTN_DPAD_LEFT => tracker.left = pressed,
                KeyCode::BTN_DPAD_RIGHT => tracker.right = pressed,
                _ => return,
            }
            state.set_hat(tracker.up, tracker.down, tracker.left, tracker.right);
        }
        EventSummary::AbsoluteAxis(_, code, value) => match code {
            AbsoluteAxisCode::ABS_X => {
                state.set_axis(Axis::X, rescale(value, ranges.x.0, ranges.x.1, -32768, 32767))
            }
            AbsoluteAxisCode::ABS_Y => {
                state.set_axis(Axis::Y, rescale(value, ranges.y.0, ranges.y.1, -32768, 32767))
            }
            AbsoluteAxisCode::ABS_RX => state.set_axis(
                Axis::Rx,
                rescale(value, ranges.rx.0, ranges.rx.1, -32768, 32767),
            ),
            AbsoluteAxisCode::ABS_RY => state.set_axis(
                Axis::Ry,
                rescale(value, ranges.ry.0, ranges.ry.1, -32768, 32767),
            ),
            AbsoluteAxisCode::ABS_Z => {
                state.set_trigger(Trigger::L2, rescale(value, ranges.z.0, ranges.z.1, 0, 255))
            }
            AbsoluteAxisCode::ABS_RZ => {
                state.set_trigger(Trigger::R2, rescale(value, ranges.rz.0, ranges.rz.1, 0, 255))
            }
            // Some controllers (notably Xbox-pad-derived drivers) report
            // triggers on the second hat's axes rather than Z/RZ.
            AbsoluteAxisCode::ABS_HAT2Y => state.set_trigger(
                Trigger::L2,
                rescale(value, ranges.hat2y.0, ranges.hat2y.1, 0, 255),
            ),
            AbsoluteAxisCode::ABS_HAT2X => state.set_trigger(
                Trigger::R2,
                rescale(value, ranges.hat2x.0, ranges.hat2x.1, 0, 255),
            ),
            AbsoluteAxisCode::ABS_HAT0X => {
                tracker.left = value < 0;
                tracker.right = value > 0;
                state.set_hat(tracker.up, tracker.down, tracker.left, tracker.right);
            }
            AbsoluteAxisCode::ABS_HAT0Y => {
                tracker.up = value < 0;
                tracker.down = value > 0;
                state.set_hat(tracker.up, tracker.down, tracker.left, tracker.right);
            }
            _ => {}
        },
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescale_midpoint_maps_to_zero() {
        assert_eq!(rescale(0, -255, 255, -32768, 32767), 0);
    }

    #[test]
    fn rescale_max_maps_to_out_max() {
        assert_eq!(rescale(255, -255, 255, -32768, 32767), 32767);
    }

    #[test]
    fn button_index_maps_south_to_one() {
        assert_eq!(button_index(KeyCode::BTN_SOUTH), Some(1));
        assert_eq!(button_index(KeyCode::BTN_0), None);
    }
}
