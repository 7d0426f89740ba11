use crate::device::{DeviceClass, DeviceId};
use crate::transport::{CompletionError, TransportError};

/// Failure of an action, either reported synchronously from `execute_action` or later through
/// [`crate::device::PluginEvent::ActionFinished`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("hardware not available")]
    HardwareNotAvailable,

    #[error("hardware failure")]
    HardwareFailure,

    #[error("action type not found: {0}")]
    ActionTypeNotFound(String),

    #[error("device class not found: {0}")]
    DeviceClassNotFound(String),

    #[error("invalid parameter {name}: {reason}")]
    InvalidParam { name: String, reason: String },
}

/// Failure of a device setup.  Configuration problems are reported synchronously and are never
/// worth retrying without changing the configuration; [`SetupError::Discovery`] and
/// [`SetupError::Removed`] only ever arrive asynchronously.
#[derive(thiserror::Error, Debug)]
pub enum SetupError {
    #[error("device class {0} is not handled by this plugin")]
    DeviceClassNotFound(DeviceClass),

    #[error("missing parameter {0}")]
    MissingParam(&'static str),

    #[error("parameter {0} has the wrong type")]
    InvalidParam(&'static str),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid url scheme {found:?}, expected {expected:?}")]
    InvalidScheme {
        found: String,
        expected: &'static str,
    },

    #[error("a session is already configured for device {0}")]
    SessionExists(DeviceId),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("resource discovery failed: {0}")]
    Discovery(#[source] CompletionError),

    #[error("device removed before setup finished")]
    Removed,

    #[error("plugin is not running")]
    PluginUnavailable,
}
