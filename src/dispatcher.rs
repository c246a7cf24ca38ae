//! Dispatcher: owns the active transport and drives the periodic report
//! transmit loop.
//!
//! Grounded on `hid/mod.rs`'s `HidController` (single-active-backend
//! ownership, reload-by-replace) and `otg/service.rs`'s `OtgService`
//! (lock-free atomic state flags, `RwLock`-guarded service state) — the
//! state machine here plays the same "one thing live at a time" role for
//! whichever transport (BLE or USB) is selected.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::TransportMode;
use crate::error::{AppError, Result};
use crate::health::{HealthMonitor, HealthStatus};
use crate::input::InputState;
use crate::report::descriptor::{REPORT_ID_GAMEPAD, REPORT_ID_KEYBOARD, REPORT_ID_MOUSE};
use crate::transport::Transport;

/// Report IDs in ascending order — the fixed transmit priority when more
/// than one report is dirty on the same tick.
const REPORT_ORDER: [u8; 3] = [REPORT_ID_GAMEPAD, REPORT_ID_KEYBOARD, REPORT_ID_MOUSE];

pub const MIN_REPORT_RATE_HZ: u32 = 1;
pub const MAX_REPORT_RATE_HZ: u32 = 250;
pub const DEFAULT_REPORT_RATE_HZ: u32 = 100;

/// Bound within which `stop()` must complete.
const STOP_BUDGET: Duration = Duration::from_secs(1);

/// Which transport is (or was) active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Ble,
    Usb,
}

impl From<TransportMode> for Mode {
    fn from(mode: TransportMode) -> Self {
        match mode {
            TransportMode::Ble => Mode::Ble,
            TransportMode::Usb => Mode::Usb,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum StateTag {
    Off = 0,
    StartingBle = 1,
    StartingUsb = 2,
    RunningBle = 3,
    RunningUsb = 4,
    Stopping = 5,
}

impl StateTag {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => StateTag::StartingBle,
            2 => StateTag::StartingUsb,
            3 => StateTag::RunningBle,
            4 => StateTag::RunningUsb,
            5 => StateTag::Stopping,
            _ => StateTag::Off,
        }
    }

    fn starting(mode: Mode) -> Self {
        match mode {
            Mode::Ble => StateTag::StartingBle,
            Mode::Usb => StateTag::StartingUsb,
        }
    }

    fn running(mode: Mode) -> Self {
        match mode {
            Mode::Ble => StateTag::RunningBle,
            Mode::Usb => StateTag::RunningUsb,
        }
    }
}

/// Externally observable dispatcher state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Off,
    Starting(Mode),
    Running(Mode),
    Stopping,
}

impl From<StateTag> for DispatcherState {
    fn from(tag: StateTag) -> Self {
        match tag {
            StateTag::Off => DispatcherState::Off,
            StateTag::StartingBle => DispatcherState::Starting(Mode::Ble),
            StateTag::StartingUsb => DispatcherState::Starting(Mode::Usb),
            StateTag::RunningBle => DispatcherState::Running(Mode::Ble),
            StateTag::RunningUsb => DispatcherState::Running(Mode::Usb),
            StateTag::Stopping => DispatcherState::Stopping,
        }
    }
}

/// Owns the active `Transport` (behind a shared async mutex so the
/// transmit loop task and `stop()` can both reach it) and the loop that
/// pulls dirty reports off `InputState` and pushes them out at a fixed
/// rate.
pub struct Dispatcher {
    input: Arc<InputState>,
    state: AtomicU8,
    report_rate_hz: AtomicU32,
    transport: AsyncMutex<Option<Arc<AsyncMutex<Box<dyn Transport>>>>>,
    loop_handle: AsyncMutex<Option<JoinHandle<()>>>,
    loop_cancel: AsyncMutex<Option<CancellationToken>>,
    health: Arc<HealthMonitor>,
}

impl Dispatcher {
    pub fn new(input: Arc<InputState>, report_rate_hz: u32) -> Self {
        let rate = report_rate_hz.clamp(MIN_REPORT_RATE_HZ, MAX_REPORT_RATE_HZ);
        Self {
            input,
            state: AtomicU8::new(StateTag::Off as u8),
            report_rate_hz: AtomicU32::new(rate),
            transport: AsyncMutex::new(None),
            loop_handle: AsyncMutex::new(None),
            loop_cancel: AsyncMutex::new(None),
            health: Arc::new(HealthMonitor::new()),
        }
    }

    pub fn state(&self) -> DispatcherState {
        StateTag::from_u8(self.state.load(Ordering::Acquire)).into()
    }

    pub fn report_rate_hz(&self) -> u32 {
        self.report_rate_hz.load(Ordering::Relaxed)
    }

    pub fn health_status(&self) -> HealthStatus {
        self.health.status()
    }

    /// Brings `transport` up and starts the transmit loop. Fails closed:
    /// on any error the dispatcher returns to `Off` with no loop running.
    pub async fn start(&self, mode: Mode, mut transport: Box<dyn Transport>) -> Result<()> {
        if self.state() != DispatcherState::Off {
            return Err(AppError::Internal(
                "dispatcher already starting or running".into(),
            ));
        }

        self.state
            .store(StateTag::starting(mode) as u8, Ordering::Release);

        if let Err(e) = transport.start().await {
            error!("transport bring-up failed: {e}");
            self.state.store(StateTag::Off as u8, Ordering::Release);
            return Err(e);
        }

        let shared = Arc::new(AsyncMutex::new(transport));
        let cancel = CancellationToken::new();
        let rate = self.report_rate_hz();
        self.health.report_recovered();

        let handle = tokio::spawn(transmit_loop(
            self.input.clone(),
            shared.clone(),
            rate,
            cancel.clone(),
            self.health.clone(),
        ));

        *self.transport.lock().await = Some(shared);
        *self.loop_handle.lock().await = Some(handle);
        *self.loop_cancel.lock().await = Some(cancel);

        self.state
            .store(StateTag::running(mode) as u8, Ordering::Release);
        info!("dispatcher running ({mode:?})");
        Ok(())
    }

    /// Cooperatively stops the transmit loop and tears the transport down,
    /// within `STOP_BUDGET`. On timeout the loop task is abandoned and the
    /// dispatcher still reports `Off`.
    pub async fn stop(&self) -> Result<()> {
        if self.state() == DispatcherState::Off {
            return Ok(());
        }
        self.state.store(StateTag::Stopping as u8, Ordering::Release);

        if let Some(cancel) = self.loop_cancel.lock().await.take() {
            cancel.cancel();
        }
        let mut dirty = false;
        if let Some(handle) = self.loop_handle.lock().await.take() {
            if tokio::time::timeout(STOP_BUDGET, handle).await.is_err() {
                warn!("transmit loop did not stop within budget, abandoning");
                dirty = true;
            }
        }

        if let Some(transport) = self.transport.lock().await.take() {
            if let Err(e) = transport.lock().await.stop().await {
                warn!("transport teardown reported an error: {e}");
                dirty = true;
            }
        }

        self.state.store(StateTag::Off as u8, Ordering::Release);
        if dirty {
            return Err(AppError::DirtyShutdown(
                "transmit loop or transport teardown exceeded the stop budget".into(),
            ));
        }
        info!("dispatcher stopped");
        Ok(())
    }
}

async fn transmit_loop(
    input: Arc<InputState>,
    transport: Arc<AsyncMutex<Box<dyn Transport>>>,
    rate_hz: u32,
    cancel: CancellationToken,
    health: Arc<HealthMonitor>,
) {
    let period = Duration::from_secs_f64(1.0 / rate_hz as f64);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                for &report_id in &REPORT_ORDER {
                    if !input.is_dirty(report_id) {
                        continue;
                    }
                    let payload = match input.snapshot_and_clear_relative(report_id) {
                        Ok(p) => p,
                        Err(e) => {
                            warn!("snapshot failed for report {report_id}: {e}");
                            continue;
                        }
                    };
                    let result = transport.lock().await.push(report_id, &payload).await;
                    if let Err(e) = result {
                        error!("transport push failed for report {report_id}: {e}");
                        health.report_error(e.to_string());
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rate_is_within_bounds() {
        assert!(DEFAULT_REPORT_RATE_HZ >= MIN_REPORT_RATE_HZ);
        assert!(DEFAULT_REPORT_RATE_HZ <= MAX_REPORT_RATE_HZ);
    }

    #[test]
    fn rate_is_clamped_on_construction() {
        let input = Arc::new(InputState::new());
        let dispatcher = Dispatcher::new(input, 10_000);
        assert_eq!(dispatcher.report_rate_hz(), MAX_REPORT_RATE_HZ);
    }

    #[test]
    fn initial_state_is_off() {
        let input = Arc::new(InputState::new());
        let dispatcher = Dispatcher::new(input, DEFAULT_REPORT_RATE_HZ);
        assert_eq!(dispatcher.state(), DispatcherState::Off);
    }
}
