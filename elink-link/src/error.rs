use std::path::PathBuf;
use thiserror::Error;

/// The host cannot be reached. Fatal to the whole session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("invalid tracker host address '{0}'")]
    InvalidAddress(String),
    #[error("tracker host {host} is unreachable: {reason}")]
    Unreachable { host: String, reason: String },
}

/// A command was rejected or the link dropped while talking to the host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("connection to tracker host lost")]
    ConnectionLost,
    #[error("host rejected '{command}' with code {code}")]
    Rejected { command: String, code: i32 },
    #[error("host did not answer '{command}' in time")]
    Timeout { command: String },
}

/// The EDF stem exceeds the host's eight-character limit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("edf file name '{name}' is too long: stem has {stem_len} characters, at most {max} allowed")]
pub struct NameTooLong {
    pub name: String,
    pub stem_len: usize,
    pub max: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpenFileError {
    #[error(transparent)]
    NameTooLong(#[from] NameTooLong),
    #[error(transparent)]
    Device(#[from] DeviceError),
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("no file has been opened on the host")]
    NoFile,
    #[error("host has no file named '{0}'")]
    NotFound(String),
    #[error("failed writing {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Teardown failure reported by `disconnect`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("host refused to close the link (code {0})")]
    Close(i32),
}
