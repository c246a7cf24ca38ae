use thiserror::Error;

/// Application-wide error type.
///
/// Variants are grouped the way the control surface is expected to react to
/// them: `Config` and `PermissionDenied` are fatal before anything starts,
/// the transport bring-up variants abort a single `start`, the transport
/// runtime variants demote the dispatcher to `Off` but are recoverable,
/// the input variants degrade to transport-only operation, and `Internal`
/// is a programmer error that should never observably happen.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("GATT application registration failed: {0}")]
    RegistrationFailed(String),

    #[error("LE advertisement registration failed: {0}")]
    AdvertisementFailed(String),

    #[error("no USB device controller available")]
    NoUdcAvailable,

    #[error("gadget '{0}' already exists")]
    GadgetAlreadyExists(String),

    #[error("configfs is not mounted at /sys/kernel/config/usb_gadget")]
    ConfigfsNotMounted,

    #[error("host detached from transport: {0}")]
    HostDetached(String),

    #[error("system bus disconnected: {0}")]
    BusDisconnected(String),

    #[error("input device gone: {0}")]
    DeviceGone(String),

    #[error("input device unsupported: {0}")]
    DeviceUnsupported(String),

    #[error("bad report id: {0}")]
    BadReportId(u8),

    #[error("dirty shutdown: {0}")]
    DirtyShutdown(String),

    #[error("internal invariant violated: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("bluetooth error: {0}")]
    Bluer(#[from] bluer::Error),
}

impl AppError {
    /// Exit code the control binary should return for this error, per the
    /// external-interfaces contract (0 success is handled by the caller).
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) => 1,
            AppError::RegistrationFailed(_)
            | AppError::AdvertisementFailed(_)
            | AppError::NoUdcAvailable
            | AppError::GadgetAlreadyExists(_)
            | AppError::ConfigfsNotMounted => 2,
            AppError::PermissionDenied(_) | AppError::BusDisconnected(_) => 3,
            AppError::DirtyShutdown(_) => 4,
            _ => 1,
        }
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AppError>;
