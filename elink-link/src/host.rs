use crate::error::{ConnectionError, DeviceError, TransferError};
use elink_core::{KeyAction, RawDualEyeSample, TargetState};
use std::path::Path;

/// Which streams the host writes to file and forwards over the link while recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingStreams {
    pub samples_to_file: bool,
    pub events_to_file: bool,
    pub samples_over_link: bool,
    pub events_over_link: bool,
}

impl RecordingStreams {
    pub fn all() -> Self {
        Self {
            samples_to_file: true,
            events_to_file: true,
            samples_over_link: true,
            events_over_link: true,
        }
    }
}

/// Primitive operations of a tracker host connection.
///
/// Every call is a short command send or a non-blocking query; only
/// `receive_data_file` may take noticeable time.
pub trait TrackerHost {
    fn is_connected(&self) -> bool;

    fn send_command(&mut self, command: &str) -> Result<(), DeviceError>;
    /// Writes a message event into the open data file.
    fn send_message(&mut self, message: &str) -> Result<(), DeviceError>;
    fn send_key_button(&mut self, code: u16, modifier: u16, action: KeyAction) -> Result<(), DeviceError>;

    fn start_setup(&mut self) -> Result<(), DeviceError>;
    fn set_offline_mode(&mut self) -> Result<(), DeviceError>;
    fn set_calibration_type(&mut self, kind: &str) -> Result<(), DeviceError>;
    fn set_accept_target_fixation_button(&mut self, code: u16) -> Result<(), DeviceError>;

    /// Raw result code of the running procedure; 1000 while it is still running.
    fn calibration_result(&mut self) -> Result<i32, DeviceError>;
    fn calibration_message(&mut self) -> Result<String, DeviceError>;
    fn target_position_and_state(&mut self) -> Result<TargetState, DeviceError>;

    fn start_drift_correct(&mut self, x: i32, y: i32) -> Result<(), DeviceError>;
    fn apply_drift_correct(&mut self) -> Result<(), DeviceError>;

    fn newest_sample(&mut self) -> Result<Option<RawDualEyeSample>, DeviceError>;

    fn open_data_file(&mut self, name: &str) -> Result<(), DeviceError>;
    fn close_data_file(&mut self) -> Result<(), DeviceError>;
    /// Copies a closed data file to `local`, returning the number of bytes written.
    fn receive_data_file(&mut self, remote: &str, local: &Path) -> Result<u64, TransferError>;

    fn start_recording(&mut self, streams: RecordingStreams) -> Result<(), DeviceError>;
    fn stop_recording(&mut self) -> Result<(), DeviceError>;

    /// Tears down the connection. A non-zero code is the host's link error.
    fn close(&mut self) -> Result<i32, DeviceError>;
}

/// Hosts that can be reached by address.
pub trait Connect: TrackerHost + Sized {
    fn connect(address: &str) -> Result<Self, ConnectionError>;
}
