//! Transport adapters: the BLE HoG GATT server and the USB configfs gadget.
//!
//! Both implement the same narrow `Transport` trait so the Dispatcher can
//! treat "push this report" identically regardless of which one is active —
//! the cyclic-lifetime note in the design docs (transport holds a sink, not
//! a back-reference to the Dispatcher) falls out of this trait boundary.

use async_trait::async_trait;

use crate::config::{AppConfig, TransportMode};
use crate::error::Result;

pub mod ble;
pub mod usb;

/// A running HID transport that can deliver report bytes to a connected
/// host and be torn down idempotently.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Brings the transport up: GATT registration + advertisement for BLE,
    /// configfs gadget creation + UDC bind for USB. Must perform no partial
    /// writes on failure.
    async fn start(&mut self) -> Result<()>;

    /// Tears the transport down, cooperatively and idempotently. Must
    /// complete in bounded time; callers enforce the ≤1s budget.
    async fn stop(&mut self) -> Result<()>;

    /// Delivers `payload` (without a report ID byte) for `report_id`. A
    /// push to a transport with no subscriber/peer is dropped silently.
    async fn push(&self, report_id: u8, payload: &[u8]) -> Result<()>;
}

/// Builds the transport named by `config.mode`, configured from its
/// matching `ble`/`usb` sub-table. Shared by `start` and by the control
/// surface's `set-mode` handler, so both bring up a transport the same way.
pub fn build_transport(config: &AppConfig) -> Box<dyn Transport> {
    match config.mode {
        TransportMode::Ble => Box::new(ble::HogServer::new(
            config.ble.device_name.clone(),
            config.ble.static_address.clone(),
            config.ble.appearance,
        )),
        TransportMode::Usb => Box::new(usb::UsbGadget::new(config.usb.gadget_name.clone())),
    }
}
