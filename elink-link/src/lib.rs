//! Connection to the tracker host: primitive host operations, the
//! session-level [`DeviceLink`] built on them, and an in-process simulator.

pub mod edf;
pub mod error;
pub mod host;
pub mod link;
pub mod sim;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use edf::{EdfFileName, MAX_STEM_LEN};
pub use error::{ConnectionError, DeviceError, LinkError, NameTooLong, OpenFileError, TransferError};
pub use host::{Connect, RecordingStreams, TrackerHost};
pub use link::DeviceLink;
pub use sim::{SimConfig, SimulatedHost};
