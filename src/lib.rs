//! hidctl - exposes a handheld Linux device as a BLE and USB HID peripheral
//!
//! Three virtual devices (gamepad, keyboard, mouse) are multiplexed over
//! whichever single transport — BLE HID-over-GATT or a USB configfs gadget —
//! is currently active.

pub mod config;
pub mod control;
pub mod dispatcher;
pub mod error;
pub mod health;
pub mod input;
pub mod report;
pub mod source;
pub mod transport;

pub use error::{AppError, Result};
