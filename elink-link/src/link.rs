use crate::edf::EdfFileName;
use crate::error::{ConnectionError, DeviceError, LinkError, OpenFileError, TransferError};
use crate::host::{Connect, RecordingStreams, TrackerHost};
use elink_core::{HostKey, KeyAction, RawDualEyeSample, SessionStatusCode, TargetState};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// The single connection to the tracker host. Nothing here retries: a failed
/// command is reported once and the caller decides what happens next.
pub struct DeviceLink<H: TrackerHost> {
    host: H,
    address: String,
    prefix: String,
    open_file: Option<EdfFileName>,
    connected: bool,
}

impl<H: Connect> DeviceLink<H> {
    pub fn connect(address: &str, prefix: &str) -> Result<Self, ConnectionError> {
        let host = H::connect(address)?;
        info!(address, "connected to tracker host");
        Ok(Self::with_host(host, address, prefix))
    }
}

impl<H: TrackerHost> DeviceLink<H> {
    /// Wraps an already connected host.
    pub fn with_host(host: H, address: &str, prefix: &str) -> Self {
        Self {
            host,
            address: address.to_string(),
            prefix: prefix.to_string(),
            open_file: None,
            connected: true,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_connected(&self) -> bool {
        self.connected && self.host.is_connected()
    }

    pub fn open_file_name(&self) -> Option<&EdfFileName> {
        self.open_file.as_ref()
    }

    fn live(&mut self) -> Result<&mut H, DeviceError> {
        if self.connected {
            Ok(&mut self.host)
        } else {
            Err(DeviceError::ConnectionLost)
        }
    }

    /// Injects one half of a virtual key stroke.
    pub fn send_signal(&mut self, key: HostKey, pressed: bool) -> Result<(), DeviceError> {
        let action = if pressed {
            KeyAction::Press
        } else {
            KeyAction::Release
        };
        self.live()?.send_key_button(key.code(), 0, action)
    }

    /// Full press/release pair.
    pub fn press(&mut self, key: HostKey) -> Result<(), DeviceError> {
        debug!(?key, "key signal");
        self.send_signal(key, true)?;
        self.send_signal(key, false)
    }

    pub fn command(&mut self, command: &str) -> Result<(), DeviceError> {
        debug!(command, "host command");
        self.live()?.send_command(command)
    }

    pub fn message(&mut self, message: &str) -> Result<(), DeviceError> {
        debug!(message, "host message");
        self.live()?.send_message(message)
    }

    pub fn start_setup(&mut self) -> Result<(), DeviceError> {
        self.live()?.start_setup()
    }

    pub fn set_offline(&mut self) -> Result<(), DeviceError> {
        self.live()?.set_offline_mode()
    }

    pub fn set_calibration_type(&mut self, kind: &str) -> Result<(), DeviceError> {
        self.live()?.set_calibration_type(kind)
    }

    pub fn set_accept_fixation_key(&mut self, key: HostKey) -> Result<(), DeviceError> {
        self.live()?.set_accept_target_fixation_button(key.code())
    }

    /// Non-blocking: `InProgress` while a host procedure is still running.
    pub fn poll_status(&mut self) -> Result<SessionStatusCode, DeviceError> {
        let code = self.live()?.calibration_result()?;
        Ok(SessionStatusCode::from_code(code))
    }

    /// Free-text result of the procedure that just finished.
    pub fn result_message(&mut self) -> Result<String, DeviceError> {
        self.live()?.calibration_message()
    }

    pub fn poll_target(&mut self) -> Result<TargetState, DeviceError> {
        self.live()?.target_position_and_state()
    }

    pub fn poll_sample(&mut self) -> Result<Option<RawDualEyeSample>, DeviceError> {
        self.live()?.newest_sample()
    }

    pub fn start_drift_correct(&mut self, x: i32, y: i32) -> Result<(), DeviceError> {
        debug!(x, y, "drift correct start");
        self.live()?.start_drift_correct(x, y)
    }

    pub fn apply_drift_correct(&mut self) -> Result<(), DeviceError> {
        self.live()?.apply_drift_correct()
    }

    pub fn start_recording(&mut self, streams: RecordingStreams) -> Result<(), DeviceError> {
        self.live()?.start_recording(streams)
    }

    pub fn stop_recording(&mut self) -> Result<(), DeviceError> {
        self.live()?.stop_recording()
    }

    /// Opens a recording file on the host. The name is validated before
    /// anything is sent.
    pub fn open_file(&mut self, name: &str) -> Result<EdfFileName, OpenFileError> {
        let edf = EdfFileName::compose(&self.prefix, name)?;
        self.live()?.open_data_file(edf.as_str())?;
        info!(file = %edf, "opened data file on host");
        self.open_file = Some(edf.clone());
        Ok(edf)
    }

    /// Sets the host offline and closes the open file. No-op without one.
    /// The file stays open until the host confirms the close.
    pub fn close_file(&mut self) -> Result<(), DeviceError> {
        if self.open_file.is_none() {
            return Ok(());
        }
        let host = self.live()?;
        host.set_offline_mode()?;
        host.close_data_file()?;
        if let Some(edf) = self.open_file.take() {
            info!(file = %edf, "closed data file on host");
        }
        Ok(())
    }

    /// Closes `name` if it is still open and copies it into `local_dir`,
    /// which must already exist.
    pub fn download_file(&mut self, name: &EdfFileName, local_dir: &Path) -> Result<PathBuf, TransferError> {
        if self.open_file.as_ref() == Some(name) {
            self.close_file()?;
        }
        let target = local_dir.join(name.as_str());
        let bytes = self.live()?.receive_data_file(name.as_str(), &target)?;
        info!(file = %name, path = %target.display(), bytes, "downloaded data file");
        Ok(target)
    }

    /// Closes any open file, sets the host offline and drops the connection.
    /// Calling it again is a no-op.
    pub fn disconnect(&mut self) -> Result<(), LinkError> {
        if !self.is_connected() {
            self.connected = false;
            return Ok(());
        }
        self.close_file()?;
        self.host.set_offline_mode()?;
        let code = self.host.close()?;
        self.connected = false;
        if code != 0 {
            warn!(code, "host reported an error while closing the link");
            return Err(LinkError::Close(code));
        }
        info!(address = %self.address, "disconnected from tracker host");
        Ok(())
    }
}
