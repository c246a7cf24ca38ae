//! HID report model: descriptor bytes, per-device state, and the codec that
//! turns state into descriptor-compliant report bytes.
//!
//! ```text
//! Input Source ──mutates──▶ {Gamepad,Keyboard,Mouse}State ──encode──▶ bytes
//! ```

pub mod codec;
pub mod descriptor;
pub mod gamepad;
pub mod keyboard;
pub mod mouse;

pub use gamepad::GamepadState;
pub use keyboard::KeyboardState;
pub use mouse::MouseState;
