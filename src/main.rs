//! hidctl control binary.
//!
//! Grounded on the teacher's `main.rs`: the `LogLevel`/`-v` escalation
//! pattern and `init_logging` structure are kept near-verbatim, the
//! `CliArgs` struct is replaced by the `start`/`stop`/`status`/`set-mode`/
//! `inject` subcommand set this project's external interface calls for,
//! and the `foreground daemon + short-lived client` split is new: the
//! teacher runs one long-lived server, this binary's `start` loops for
//! the daemon's whole lifetime while the other subcommands are one-shot
//! control-socket clients.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hidctl::config::{AppConfig, ConfigStore, TransportMode};
use hidctl::control::{self, ControlRequest, ControlResponse, InjectAction};
use hidctl::dispatcher::Dispatcher;
use hidctl::input::InputState;
use hidctl::source::EvdevSource;
use hidctl::transport::build_transport;
use hidctl::{AppError, Result};

/// Verbosity level, mirrored after the teacher's `LogLevel`: explicit
/// `--log-level` picks a base, repeated `-v` escalates past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Verbose,
    Debug,
    Trace,
}

#[derive(Debug, Parser)]
#[command(name = "hidctl", about = "Expose this device as a BLE/USB HID peripheral")]
struct Cli {
    /// Path to a TOML config file. Missing is fine; unparsable is not.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base log level.
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    log_level: LogLevel,

    /// Escalates verbosity past `--log-level`; repeatable (-v, -vv, -vvv).
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Control socket path, shared between `start` and the other subcommands.
    #[arg(long, default_value_os_t = control::default_socket_path(), global = true)]
    socket: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Runs the daemon in the foreground until stopped.
    Start {
        #[arg(long, value_enum)]
        mode: Option<CliMode>,
        #[arg(long)]
        device_name: Option<String>,
        #[arg(long)]
        report_rate_hz: Option<u32>,
        #[arg(long)]
        input_device: Option<String>,
        #[arg(long)]
        static_address: Option<String>,
        #[arg(long)]
        gadget_name: Option<String>,
    },
    /// Requests a running daemon to stop.
    Stop,
    /// Prints the running daemon's dispatcher state.
    Status,
    /// Stops and restarts the running daemon's transport in the new mode.
    SetMode {
        #[arg(value_enum)]
        mode: CliMode,
    },
    /// Injects one synthetic input event into the running daemon.
    Inject {
        #[command(subcommand)]
        action: InjectCommand,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    Ble,
    Usb,
}

impl From<CliMode> for TransportMode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::Ble => TransportMode::Ble,
            CliMode::Usb => TransportMode::Usb,
        }
    }
}

#[derive(Debug, Subcommand)]
enum InjectCommand {
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

impl From<InjectCommand> for InjectAction {
    fn from(cmd: InjectCommand) -> Self {
        match cmd {
            InjectCommand::Button { index, pressed } => InjectAction::Button { index, pressed },
            InjectCommand::Hat { up, down, left, right } => InjectAction::Hat { up, down, left, right },
            InjectCommand::Axis { axis, value } => InjectAction::Axis { axis, value },
            InjectCommand::Trigger { trigger, value } => InjectAction::Trigger { trigger, value },
            InjectCommand::Key { scan_code, pressed } => InjectAction::Key { scan_code, pressed },
            InjectCommand::Modifier { modifier, on } => InjectAction::Modifier { modifier, on },
            InjectCommand::MouseMove { dx, dy } => InjectAction::MouseMove { dx, dy },
            InjectCommand::MouseButton { button, pressed } => InjectAction::MouseButton { button, pressed },
            InjectCommand::Wheel { v, h } => InjectAction::Wheel { v, h },
        }
    }
}

/// Mirrors the teacher's `init_logging`: an explicit `-v` count overrides
/// `--log-level`, an `RUST_LOG` env var overrides both.
fn init_logging(level: LogLevel, verbose: u8) {
    let effective = match verbose {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };
    let directive = match effective {
        LogLevel::Error => "hidctl=error",
        LogLevel::Warn => "hidctl=warn",
        LogLevel::Info => "hidctl=info",
        LogLevel::Verbose => "hidctl=debug,hidctl::source=trace",
        LogLevel::Debug => "hidctl=debug",
        LogLevel::Trace => "hidctl=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .try_init();
}

fn merge_overrides(
    mut config: AppConfig,
    mode: Option<CliMode>,
    device_name: Option<String>,
    report_rate_hz: Option<u32>,
    input_device: Option<String>,
    static_address: Option<String>,
    gadget_name: Option<String>,
) -> AppConfig {
    if let Some(mode) = mode {
        config.mode = mode.into();
    }
    if let Some(name) = device_name {
        config.ble.device_name = name;
    }
    if let Some(rate) = report_rate_hz {
        config.report_rate_hz = rate;
    }
    if let Some(device) = input_device {
        config.input_device = device;
    }
    if let Some(address) = static_address {
        config.ble.static_address = Some(address);
    }
    if let Some(name) = gadget_name {
        config.usb.gadget_name = name;
    }
    config
}

#[allow(clippy::too_many_arguments)]
async fn run_start(
    config_path: Option<PathBuf>,
    socket: PathBuf,
    mode: Option<CliMode>,
    device_name: Option<String>,
    report_rate_hz: Option<u32>,
    input_device: Option<String>,
    static_address: Option<String>,
    gadget_name: Option<String>,
) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let config = merge_overrides(
        config,
        mode,
        device_name,
        report_rate_hz,
        input_device,
        static_address,
        gadget_name,
    );
    let store = ConfigStore::new(config);
    let config = store.get();

    let input = Arc::new(InputState::new());
    let dispatcher = Arc::new(Dispatcher::new(input.clone(), config.report_rate_hz));

    let source_cancel = CancellationToken::new();
    let source = EvdevSource::new(config.input_device.clone());
    let source_handle = tokio::spawn({
        let input = input.clone();
        let cancel = source_cancel.clone();
        async move {
            if let Err(e) = source.run(input, cancel).await {
                warn!("input source stopped: {e}");
            }
        }
    });

    let transport = build_transport(&config);
    dispatcher.start(config.mode.into(), transport).await?;
    info!(
        "hidctl {} (built {}) started in {:?} mode",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_DATE"),
        config.mode
    );

    let control_shutdown = CancellationToken::new();
    let stop_requested = CancellationToken::new();
    let control_task = tokio::spawn({
        let input = input.clone();
        let dispatcher = dispatcher.clone();
        let socket = socket.clone();
        let store = store.clone();
        let stop_requested = stop_requested.clone();
        let control_shutdown = control_shutdown.clone();
        async move {
            if let Err(e) = control::serve(
                &socket,
                input,
                dispatcher,
                store,
                stop_requested,
                control_shutdown,
            )
            .await
            {
                error!("control socket error: {e}");
            }
        }
    });

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::select! {
        _ = ctrl_c => info!("received interrupt, shutting down"),
        _ = stop_requested.cancelled() => info!("stop requested over control socket"),
    }

    source_cancel.cancel();
    control_shutdown.cancel();
    let _ = source_handle.await;
    let _ = control_task.await;

    let stop_result = dispatcher.stop().await;
    let _ = std::fs::remove_file(&socket);
    stop_result
}

async fn run_client(socket: PathBuf, request: ControlRequest) -> Result<()> {
    let response = control::send_request(&socket, request).await?;
    match response {
        ControlResponse::Status {
            state,
            report_rate_hz,
            health,
        } => {
            println!("state: {state}, report_rate_hz: {report_rate_hz}, health: {health}");
            Ok(())
        }
        ControlResponse::Ack => {
            println!("ok");
            Ok(())
        }
        ControlResponse::Error(message) => Err(AppError::Internal(message)),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level, cli.verbose);

    let result = match cli.command {
        Command::Start {
            mode,
            device_name,
            report_rate_hz,
            input_device,
            static_address,
            gadget_name,
        } => {
            run_start(
                cli.config,
                cli.socket,
                mode,
                device_name,
                report_rate_hz,
                input_device,
                static_address,
                gadget_name,
            )
            .await
        }
        Command::Stop => run_client(cli.socket, ControlRequest::Stop).await,
        Command::Status => run_client(cli.socket, ControlRequest::Status).await,
        Command::SetMode { mode } => {
            run_client(cli.socket, ControlRequest::SetMode(mode.into())).await
        }
        Command::Inject { action } => {
            run_client(cli.socket, ControlRequest::Inject(action.into())).await
        }
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(e.exit_code());
    }
}
