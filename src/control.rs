//! Local control surface: a line-delimited JSON protocol over a Unix
//! domain socket, used by the `status`/`set-mode`/`inject`/`stop`
//! subcommands to reach the `start`-ed foreground daemon.
//!
//! Grounded on the teacher's event-bus-as-decoupling-point style
//! (`events::EventBus`) in spirit — here the decoupling is process
//! boundary rather than in-process broadcast, so a socket plays that role
//! instead.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{ConfigStore, TransportMode};
use crate::dispatcher::{Dispatcher, DispatcherState, Mode};
use crate::error::{AppError, Result};
use crate::health::HealthStatus;
use crate::input::InputState;
use crate::report::gamepad::{Axis, Trigger};
use crate::report::keyboard::Modifier;
use crate::report::mouse::MouseButton;
use crate::transport;

pub fn default_socket_path() -> PathBuf {
    PathBuf::from("/run/hidctl.sock")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InjectAction {
    Button { index: u8, pressed: bool },
    Hat { up: bool, down: bool, left: bool, right: bool },
    Axis { axis: String, value: i32 },
    Trigger { trigger: String, value: i32 },
    Key { scan_code: u8, pressed: bool },
    Modifier { modifier: String, on: bool },
    MouseMove { dx: i32, dy: i32 },
    MouseButton { button: String, pressed: bool },
    Wheel { v: i32, h: i32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControlRequest {
    Status,
    SetMode(TransportMode),
    Inject(InjectAction),
    Stop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControlResponse {
    Status {
        state: String,
        report_rate_hz: u32,
        health: String,
    },
    Ack,
    Error(String),
}

fn axis_from_name(name: &str) -> Option<Axis> {
    match name {
        "x" => Some(Axis::X),
        "y" => Some(Axis::Y),
        "rx" => Some(Axis::Rx),
        "ry" => Some(Axis::Ry),
        _ => None,
    }
}

fn trigger_from_name(name: &str) -> Option<Trigger> {
    match name {
        "l2" => Some(Trigger::L2),
        "r2" => Some(Trigger::R2),
        _ => None,
    }
}

fn modifier_from_name(name: &str) -> Option<Modifier> {
    match name {
        "left_ctrl" => Some(Modifier::LeftCtrl),
        "left_shift" => Some(Modifier::LeftShift),
        "left_alt" => Some(Modifier::LeftAlt),
        "left_meta" => Some(Modifier::LeftMeta),
        "right_ctrl" => Some(Modifier::RightCtrl),
        "right_shift" => Some(Modifier::RightShift),
        "right_alt" => Some(Modifier::RightAlt),
        "right_meta" => Some(Modifier::RightMeta),
        _ => None,
    }
}

fn mouse_button_from_name(name: &str) -> Option<MouseButton> {
    match name {
        "left" => Some(MouseButton::Left),
        "right" => Some(MouseButton::Right),
        "middle" => Some(MouseButton::Middle),
        _ => None,
    }
}

fn apply_injection(input: &InputState, action: InjectAction) -> Result<()> {
    match action {
        InjectAction::Button { index, pressed } => input.set_button(index, pressed),
        InjectAction::Hat { up, down, left, right } => input.set_hat(up, down, left, right),
        InjectAction::Axis { axis, value } => {
            let axis = axis_from_name(&axis)
                .ok_or_else(|| AppError::Config(format!("unknown axis '{axis}'")))?;
            input.set_axis(axis, value);
        }
        InjectAction::Trigger { trigger, value } => {
            let trigger = trigger_from_name(&trigger)
                .ok_or_else(|| AppError::Config(format!("unknown trigger '{trigger}'")))?;
            input.set_trigger(trigger, value);
        }
        InjectAction::Key { scan_code, pressed } => {
            if pressed {
                input.press_key(scan_code);
            } else {
                input.release_key(scan_code);
            }
        }
        InjectAction::Modifier { modifier, on } => {
            let modifier = modifier_from_name(&modifier)
                .ok_or_else(|| AppError::Config(format!("unknown modifier '{modifier}'")))?;
            input.set_modifier(modifier, on);
        }
        InjectAction::MouseMove { dx, dy } => input.move_mouse(dx, dy),
        InjectAction::MouseButton { button, pressed } => {
            let button = mouse_button_from_name(&button)
                .ok_or_else(|| AppError::Config(format!("unknown mouse button '{button}'")))?;
            input.set_mouse_button(button, pressed);
        }
        InjectAction::Wheel { v, h } => input.wheel(v, h),
    }
    Ok(())
}

/// Stops the current transport and brings up a new one in `mode`, per
/// §4.6's stop-then-start mode-change sequence. On a failed `start` the
/// dispatcher is left `Off` (it fails closed) and the config's `mode` has
/// already been updated to reflect what was requested.
async fn switch_mode(config: &ConfigStore, dispatcher: &Dispatcher, mode: TransportMode) -> Result<()> {
    dispatcher.stop().await?;

    let mut updated = (*config.get()).clone();
    updated.mode = mode;
    config.set(updated.clone());

    let transport = transport::build_transport(&updated);
    dispatcher.start(mode.into(), transport).await
}

fn describe_health(status: HealthStatus) -> String {
    match status {
        HealthStatus::Healthy => "healthy".to_string(),
        HealthStatus::Error { reason, retry_count } => {
            format!("error({retry_count}): {reason}")
        }
    }
}

fn describe_state(state: DispatcherState) -> String {
    match state {
        DispatcherState::Off => "off".to_string(),
        DispatcherState::Starting(Mode::Ble) => "starting(ble)".to_string(),
        DispatcherState::Starting(Mode::Usb) => "starting(usb)".to_string(),
        DispatcherState::Running(Mode::Ble) => "running(ble)".to_string(),
        DispatcherState::Running(Mode::Usb) => "running(usb)".to_string(),
        DispatcherState::Stopping => "stopping".to_string(),
    }
}

/// Runs the control server until `shutdown` fires, handling one request
/// per connection.
pub async fn serve(
    socket_path: &Path,
    input: Arc<InputState>,
    dispatcher: Arc<Dispatcher>,
    config: ConfigStore,
    shutdown_requested: CancellationToken,
    shutdown: CancellationToken,
) -> Result<()> {
    let _ = std::fs::remove_file(socket_path);
    let listener = UnixListener::bind(socket_path)
        .map_err(|e| AppError::Internal(format!("bind {}: {e}", socket_path.display())))?;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, _) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("control socket accept failed: {e}");
                        continue;
                    }
                };
                let input = input.clone();
                let dispatcher = dispatcher.clone();
                let config = config.clone();
                let shutdown_requested = shutdown_requested.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, &input, &dispatcher, &config, &shutdown_requested).await {
                        debug!("control connection ended with error: {e}");
                    }
                });
            }
        }
    }

    let _ = std::fs::remove_file(socket_path);
    Ok(())
}

async fn handle_connection(
    stream: UnixStream,
    input: &InputState,
    dispatcher: &Dispatcher,
    config: &ConfigStore,
    shutdown_requested: &CancellationToken,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
    else {
        return Ok(());
    };

    let request: ControlRequest = match serde_json::from_str(&line) {
        Ok(r) => r,
        Err(e) => {
            let response = ControlResponse::Error(format!("malformed request: {e}"));
            write_response(&mut writer, &response).await?;
            return Ok(());
        }
    };

    let response = match request {
        ControlRequest::Status => ControlResponse::Status {
            state: describe_state(dispatcher.state()),
            report_rate_hz: dispatcher.report_rate_hz(),
            health: describe_health(dispatcher.health_status()),
        },
        ControlRequest::SetMode(mode) => match switch_mode(config, dispatcher, mode).await {
            Ok(()) => ControlResponse::Ack,
            Err(e) => ControlResponse::Error(e.to_string()),
        },
        ControlRequest::Inject(action) => match apply_injection(input, action) {
            Ok(()) => ControlResponse::Ack,
            Err(e) => ControlResponse::Error(e.to_string()),
        },
        ControlRequest::Stop => {
            shutdown_requested.cancel();
            ControlResponse::Ack
        }
    };

    write_response(&mut writer, &response).await
}

async fn write_response(
    writer: &mut (impl AsyncWriteExt + Unpin),
    response: &ControlResponse,
) -> Result<()> {
    let mut line = serde_json::to_string(response)?;
    line.push('\n');
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// Sends one request to a running daemon's control socket and returns its
/// response. Used by the `stop`/`status`/`set-mode`/`inject` subcommands.
pub async fn send_request(socket_path: &Path, request: ControlRequest) -> Result<ControlResponse> {
    let stream = UnixStream::connect(socket_path).await.map_err(|e| {
        AppError::Internal(format!(
            "connect {} (is hidctl running?): {e}",
            socket_path.display()
        ))
    })?;
    let (reader, mut writer) = stream.into_split();

    let mut line = serde_json::to_string(&request)?;
    line.push('\n');
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let mut lines = BufReader::new(reader).lines();
    let response_line = lines
        .next_line()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| AppError::Internal("daemon closed connection without responding".into()))?;

    serde_json::from_str(&response_line).map_err(AppError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_name_lookup_is_case_sensitive_and_exact() {
        assert!(axis_from_name("x").is_some());
        assert!(axis_from_name("X").is_none());
        assert!(axis_from_name("bogus").is_none());
    }

    #[test]
    fn describe_state_covers_every_variant() {
        assert_eq!(describe_state(DispatcherState::Off), "off");
        assert_eq!(describe_state(DispatcherState::Running(Mode::Usb)), "running(usb)");
    }
}
