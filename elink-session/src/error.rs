use elink_link::{ConnectionError, DeviceError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed reading config {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported sample rate {0} Hz (allowed: 250, 500, 1000, 2000)")]
    UnsupportedSampleRate(u32),
    #[error("sample rate {0} Hz exceeds 1000 Hz while tracking both eyes")]
    BinocularRateTooHigh(u32),
    #[error("render fps must be positive")]
    ZeroFps,
}

/// The validation result message did not carry an (average, maximum) error pair.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no ':' in validation message '{0}'")]
    MissingSeparator(String),
    #[error("expected average and maximum error in '{0}'")]
    MissingValues(String),
}

/// Failure while bringing a connector up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("tracker host rejected the session setup")]
    Device(#[from] DeviceError),
}
