//! BLE HID-over-GATT peripheral.
//!
//! Grounded on the pack's `bluer`-based GATT servers (the `ble_uuid!` macro,
//! `CharacteristicNotify`'s per-subscription mpsc channel, `Application` /
//! `adapter.serve_gatt_application()` / `adapter.advertise()`) since the
//! teacher carries no BLE code of its own. The object tree and registration
//! protocol follow the HID Service layout fixed by the report model: one
//! Report characteristic per report ID, each with its own Report Reference
//! descriptor, plus HID Information, Report Map, Control Point, and
//! Protocol Mode.

use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bluer::adv::Advertisement;
use bluer::gatt::local::{
    Application, Characteristic, CharacteristicNotify, CharacteristicNotifyMethod,
    CharacteristicRead, CharacteristicWrite, CharacteristicWriteMethod, Descriptor, DescriptorRead,
    Service,
};
use bluer::{Adapter, Session, Uuid};
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::{AppError, Result};
use crate::report::descriptor::{self, REPORT_ID_GAMEPAD, REPORT_ID_KEYBOARD, REPORT_ID_MOUSE};

use super::Transport;

macro_rules! ble_uuid {
    ($short:expr) => {
        Uuid::from_u128((($short as u128) << 96) | 0x0000_0000_1000_8000_0080_5f9b_34fb_u128)
    };
}

const HID_SERVICE_UUID: Uuid = ble_uuid!(0x1812u16);
const HID_INFORMATION_UUID: Uuid = ble_uuid!(0x2A4Au16);
const HID_REPORT_MAP_UUID: Uuid = ble_uuid!(0x2A4Bu16);
const HID_CONTROL_POINT_UUID: Uuid = ble_uuid!(0x2A4Cu16);
const HID_REPORT_UUID: Uuid = ble_uuid!(0x2A4Du16);
const PROTOCOL_MODE_UUID: Uuid = ble_uuid!(0x2A4Eu16);
const REPORT_REFERENCE_UUID: Uuid = ble_uuid!(0x2908u16);

/// bcdHID 0x0111 (little-endian), country code 0, flags NormallyConnectable
/// | RemoteWake (0x03) — the exact wire value §6 fixes.
const HID_INFORMATION_VALUE: &[u8] = &[0x11, 0x01, 0x00, 0x03];

/// BLE gamepad appearance value, used unless overridden by config.
pub const APPEARANCE_GAMEPAD: u16 = 0x03C4;

type ReportNotifier = mpsc::Sender<Vec<u8>>;

/// One Report characteristic's subscription state: `None` is the IDLE
/// state from §4.4's notification state machine; `Some(tx)` is SUBSCRIBED.
#[derive(Default, Clone)]
struct ReportSlot {
    notifier: Arc<AsyncMutex<Option<ReportNotifier>>>,
    last_value: Arc<AsyncMutex<Vec<u8>>>,
}

/// BLE HID-over-GATT server: exports the HID GATT hierarchy and an LE
/// advertisement, and routes `push` calls to the matching characteristic's
/// notification channel.
pub struct HogServer {
    device_name: String,
    static_address: Option<String>,
    appearance: u16,
    gamepad: ReportSlot,
    keyboard: ReportSlot,
    mouse: ReportSlot,
    session: Option<Session>,
    app_handle: Option<bluer::gatt::local::ApplicationHandle>,
    adv_handle: Option<bluer::adv::AdvertisementHandle>,
    /// Cleared by the bus-liveness watchdog once a D-Bus call to the
    /// adapter fails; checked by `push` so a dropped system bus surfaces
    /// as `AppError::BusDisconnected` instead of going unnoticed.
    bus_connected: Arc<AtomicBool>,
    monitor_handle: Option<JoinHandle<()>>,
}

impl HogServer {
    pub fn new(device_name: impl Into<String>, static_address: Option<String>, appearance: u16) -> Self {
        Self {
            device_name: device_name.into(),
            static_address,
            appearance,
            gamepad: ReportSlot::default(),
            keyboard: ReportSlot::default(),
            mouse: ReportSlot::default(),
            session: None,
            app_handle: None,
            adv_handle: None,
            bus_connected: Arc::new(AtomicBool::new(true)),
            monitor_handle: None,
        }
    }

    fn slot(&self, report_id: u8) -> Option<&ReportSlot> {
        match report_id {
            REPORT_ID_GAMEPAD => Some(&self.gamepad),
            REPORT_ID_KEYBOARD => Some(&self.keyboard),
            REPORT_ID_MOUSE => Some(&self.mouse),
            _ => None,
        }
    }

    /// Powers the adapter off, programs a static random address via the
    /// BlueZ management tool, then powers it back on. Format is validated
    /// by the caller (top two bits of the leading byte must be `11`).
    fn program_static_address(&self, adapter_name: &str, address: &str) -> Result<()> {
        let run = |args: &[&str]| -> Result<()> {
            let status = Command::new("btmgmt")
                .arg("--index")
                .arg(adapter_name)
                .args(args)
                .status()
                .map_err(|e| AppError::PermissionDenied(format!("btmgmt unavailable: {e}")))?;
            if !status.success() {
                return Err(AppError::PermissionDenied(format!(
                    "btmgmt {:?} exited with {status}",
                    args
                )));
            }
            Ok(())
        };
        run(&["power", "off"])?;
        run(&["static-addr", address])?;
        run(&["power", "on"])?;
        Ok(())
    }

    fn build_application(&self) -> Application {
        let report_characteristic = |id: u8, slot: ReportSlot| Characteristic {
            uuid: HID_REPORT_UUID,
            read: Some(CharacteristicRead {
                read: true,
                fun: Box::new(move |_req| {
                    let slot = slot.clone();
                    async move { Ok(slot.last_value.lock().await.clone()) }.boxed()
                }),
                ..Default::default()
            }),
            notify: Some(CharacteristicNotify {
                notify: true,
                method: CharacteristicNotifyMethod::Fun(Box::new({
                    let slot = self.slot_for(id).clone();
                    move |mut writer| {
                        let slot = slot.clone();
                        async move {
                            let (tx, mut rx) = mpsc::channel::<Vec<u8>>(16);
                            *slot.notifier.lock().await = Some(tx);
                            while let Some(bytes) = rx.recv().await {
                                if writer.notify(bytes).await.is_err() {
                                    break;
                                }
                            }
                            *slot.notifier.lock().await = None;
                        }
                        .boxed()
                    }
                })),
                ..Default::default()
            }),
            descriptors: vec![Descriptor {
                uuid: REPORT_REFERENCE_UUID,
                read: Some(DescriptorRead {
                    read: true,
                    fun: Box::new(move |_req| async move { Ok(vec![id, 0x01]) }.boxed()),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        };

        let hid_service = Service {
            uuid: HID_SERVICE_UUID,
            primary: true,
            characteristics: vec![
                Characteristic {
                    uuid: HID_INFORMATION_UUID,
                    read: Some(CharacteristicRead {
                        read: true,
                        fun: Box::new(|_req| {
                            async move { Ok(HID_INFORMATION_VALUE.to_vec()) }.boxed()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                Characteristic {
                    uuid: HID_REPORT_MAP_UUID,
                    read: Some(CharacteristicRead {
                        read: true,
                        fun: Box::new(|_req| async move { Ok(descriptor::bytes()) }.boxed()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                Characteristic {
                    uuid: HID_CONTROL_POINT_UUID,
                    write: Some(CharacteristicWrite {
                        write_without_response: true,
                        method: CharacteristicWriteMethod::Fun(Box::new(|_value, _req| {
                            // Suspend / Exit-Suspend signaling only; ignored.
                            async move { Ok(()) }.boxed()
                        })),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                report_characteristic(REPORT_ID_GAMEPAD, self.gamepad.clone()),
                report_characteristic(REPORT_ID_KEYBOARD, self.keyboard.clone()),
                report_characteristic(REPORT_ID_MOUSE, self.mouse.clone()),
                Characteristic {
                    uuid: PROTOCOL_MODE_UUID,
                    read: Some(CharacteristicRead {
                        read: true,
                        fun: Box::new(|_req| async move { Ok(vec![0x01]) }.boxed()),
                        ..Default::default()
                    }),
                    write: Some(CharacteristicWrite {
                        write_without_response: true,
                        method: CharacteristicWriteMethod::Fun(Box::new(|_value, _req| {
                            async move { Ok(()) }.boxed()
                        })),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        Application {
            services: vec![hid_service],
            ..Default::default()
        }
    }

    fn slot_for(&self, report_id: u8) -> &ReportSlot {
        self.slot(report_id).expect("report id fixed at call sites")
    }

    async fn adapter(&self) -> Result<(Session, Adapter)> {
        let session = Session::new()
            .await
            .map_err(|e| AppError::RegistrationFailed(e.to_string()))?;
        let adapter = session
            .default_adapter()
            .await
            .map_err(|e| AppError::RegistrationFailed(e.to_string()))?;
        Ok((session, adapter))
    }

    /// Polls the adapter's powered state over D-Bus at a fixed interval;
    /// the first call that fails (bluetoothd restarted, system bus dropped)
    /// clears `bus_connected` so the next `push` reports `BusDisconnected`.
    fn spawn_bus_monitor(adapter: Adapter, bus_connected: Arc<AtomicBool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(2));
            loop {
                ticker.tick().await;
                if let Err(e) = adapter.is_powered().await {
                    let err = AppError::Bluer(e);
                    warn!("lost contact with bluetoothd: {err}");
                    bus_connected.store(false, Ordering::Release);
                    break;
                }
            }
        })
    }
}

#[async_trait]
impl Transport for HogServer {
    async fn start(&mut self) -> Result<()> {
        let (session, adapter) = self.adapter().await?;

        if let Some(address) = &self.static_address {
            self.program_static_address(adapter.name(), address)?;
        }

        adapter
            .set_powered(true)
            .await
            .map_err(|e| AppError::RegistrationFailed(e.to_string()))?;
        adapter
            .set_alias(self.device_name.clone())
            .await
            .map_err(|e| AppError::RegistrationFailed(e.to_string()))?;

        let app = self.build_application();
        let app_handle = adapter
            .serve_gatt_application(app)
            .await
            .map_err(|e| AppError::RegistrationFailed(e.to_string()))?;

        let adv = Advertisement {
            advertisement_type: bluer::adv::Type::Peripheral,
            service_uuids: vec![HID_SERVICE_UUID].into_iter().collect(),
            local_name: Some(self.device_name.clone()),
            appearance: Some(self.appearance),
            discoverable: Some(true),
            tx_power: Some(true),
            ..Default::default()
        };
        let adv_handle = adapter
            .advertise(adv)
            .await
            .map_err(|e| AppError::AdvertisementFailed(e.to_string()))?;

        self.bus_connected.store(true, Ordering::Release);
        self.monitor_handle = Some(Self::spawn_bus_monitor(adapter.clone(), self.bus_connected.clone()));

        self.session = Some(session);
        self.app_handle = Some(app_handle);
        self.adv_handle = Some(adv_handle);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(handle) = self.monitor_handle.take() {
            handle.abort();
        }
        // Dropping the handles invokes BlueZ's Unregister* methods.
        self.adv_handle.take();
        self.app_handle.take();
        self.session.take();
        Ok(())
    }

    async fn push(&self, report_id: u8, payload: &[u8]) -> Result<()> {
        if !self.bus_connected.load(Ordering::Acquire) {
            return Err(AppError::BusDisconnected(
                "system bus connection to bluetoothd was lost".into(),
            ));
        }
        let slot = self
            .slot(report_id)
            .ok_or(AppError::BadReportId(report_id))?;
        *slot.last_value.lock().await = payload.to_vec();
        let guard = slot.notifier.lock().await;
        if let Some(tx) = guard.as_ref() {
            // IDLE (no subscriber): dropped silently per the state machine.
            let _ = tx.send(payload.to_vec()).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hid_information_value_matches_external_interface() {
        assert_eq!(HID_INFORMATION_VALUE, &[0x11, 0x01, 0x00, 0x03]);
    }

    #[tokio::test]
    async fn push_to_idle_characteristic_is_a_noop() {
        let server = HogServer::new("test", None, APPEARANCE_GAMEPAD);
        // No subscriber registered yet: IDLE state, push must not error.
        assert!(server.push(REPORT_ID_GAMEPAD, &[0; 13]).await.is_ok());
    }

    #[tokio::test]
    async fn push_updates_last_value_for_read() {
        let server = HogServer::new("test", None, APPEARANCE_GAMEPAD);
        server.push(REPORT_ID_MOUSE, &[1, 2, 3, 4, 5, 6, 7]).await.unwrap();
        assert_eq!(
            *server.mouse.last_value.lock().await,
            vec![1, 2, 3, 4, 5, 6, 7]
        );
    }

    #[tokio::test]
    async fn push_unknown_report_id_errors() {
        let server = HogServer::new("test", None, APPEARANCE_GAMEPAD);
        assert!(server.push(0x42, &[]).await.is_err());
    }
}
