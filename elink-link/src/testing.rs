//! Scripted host for exercising link and session logic without hardware.

use crate::error::{ConnectionError, DeviceError, TransferError};
use crate::host::{Connect, RecordingStreams, TrackerHost};
use elink_core::{KeyAction, RawDualEyeSample, TargetState};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Every state-changing call the host received, in order. Polls are only counted.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    Command(String),
    Message(String),
    Key(u16, KeyAction),
    StartSetup,
    SetOffline,
    CalibrationType(String),
    AcceptFixationButton(u16),
    StartDriftCorrect(i32, i32),
    ApplyDriftCorrect,
    OpenDataFile(String),
    CloseDataFile,
    ReceiveDataFile(String, PathBuf),
    StartRecording(RecordingStreams),
    StopRecording,
    Close,
}

#[derive(Debug)]
pub struct ScriptedHost {
    calls: Vec<HostCall>,
    statuses: VecDeque<i32>,
    messages: VecDeque<String>,
    targets: VecDeque<TargetState>,
    samples: VecDeque<Option<RawDualEyeSample>>,
    pub status_polls: usize,
    pub target_polls: usize,
    pub connected: bool,
    pub close_code: i32,
    pub fail_polls: bool,
    pub fail_apply_drift: bool,
    pub fail_transfer: bool,
    /// Commands starting with any of these are rejected.
    pub reject_commands: Vec<String>,
    pub payload: Vec<u8>,
}

impl Default for ScriptedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            statuses: VecDeque::new(),
            messages: VecDeque::new(),
            targets: VecDeque::new(),
            samples: VecDeque::new(),
            status_polls: 0,
            target_polls: 0,
            connected: true,
            close_code: 0,
            fail_polls: false,
            fail_apply_drift: false,
            fail_transfer: false,
            reject_commands: Vec::new(),
            payload: b"EDF".to_vec(),
        }
    }

    pub fn calls(&self) -> &[HostCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn commands(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                HostCall::Command(s) => Some(s.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                HostCall::Message(s) => Some(s.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Key codes of completed press/release pairs.
    pub fn pressed_keys(&self) -> Vec<u16> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                HostCall::Key(code, KeyAction::Release) => Some(*code),
                _ => None,
            })
            .collect()
    }

    /// Status codes returned by successive polls; 1000 once exhausted.
    pub fn push_statuses(&mut self, codes: impl IntoIterator<Item = i32>) {
        self.statuses.extend(codes);
    }

    pub fn push_message(&mut self, message: &str) {
        self.messages.push_back(message.to_string());
    }

    pub fn push_targets(&mut self, targets: impl IntoIterator<Item = TargetState>) {
        self.targets.extend(targets);
    }

    pub fn push_sample(&mut self, sample: Option<RawDualEyeSample>) {
        self.samples.push_back(sample);
    }

    fn record(&mut self, call: HostCall) -> Result<(), DeviceError> {
        if !self.connected {
            return Err(DeviceError::ConnectionLost);
        }
        self.calls.push(call);
        Ok(())
    }
}

impl TrackerHost for ScriptedHost {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn send_command(&mut self, command: &str) -> Result<(), DeviceError> {
        if self.reject_commands.iter().any(|p| command.starts_with(p.as_str())) {
            return Err(DeviceError::Rejected {
                command: command.to_string(),
                code: -1,
            });
        }
        self.record(HostCall::Command(command.to_string()))
    }

    fn send_message(&mut self, message: &str) -> Result<(), DeviceError> {
        self.record(HostCall::Message(message.to_string()))
    }

    fn send_key_button(&mut self, code: u16, _modifier: u16, action: KeyAction) -> Result<(), DeviceError> {
        self.record(HostCall::Key(code, action))
    }

    fn start_setup(&mut self) -> Result<(), DeviceError> {
        self.record(HostCall::StartSetup)
    }

    fn set_offline_mode(&mut self) -> Result<(), DeviceError> {
        self.record(HostCall::SetOffline)
    }

    fn set_calibration_type(&mut self, kind: &str) -> Result<(), DeviceError> {
        self.record(HostCall::CalibrationType(kind.to_string()))
    }

    fn set_accept_target_fixation_button(&mut self, code: u16) -> Result<(), DeviceError> {
        self.record(HostCall::AcceptFixationButton(code))
    }

    fn calibration_result(&mut self) -> Result<i32, DeviceError> {
        if self.fail_polls || !self.connected {
            return Err(DeviceError::ConnectionLost);
        }
        self.status_polls += 1;
        Ok(self.statuses.pop_front().unwrap_or(1000))
    }

    fn calibration_message(&mut self) -> Result<String, DeviceError> {
        Ok(self.messages.pop_front().unwrap_or_default())
    }

    fn target_position_and_state(&mut self) -> Result<TargetState, DeviceError> {
        if self.fail_polls || !self.connected {
            return Err(DeviceError::ConnectionLost);
        }
        self.target_polls += 1;
        Ok(self.targets.pop_front().unwrap_or_default())
    }

    fn start_drift_correct(&mut self, x: i32, y: i32) -> Result<(), DeviceError> {
        self.record(HostCall::StartDriftCorrect(x, y))
    }

    fn apply_drift_correct(&mut self) -> Result<(), DeviceError> {
        self.record(HostCall::ApplyDriftCorrect)?;
        if self.fail_apply_drift {
            return Err(DeviceError::Rejected {
                command: "apply_drift_correct".into(),
                code: 1,
            });
        }
        Ok(())
    }

    fn newest_sample(&mut self) -> Result<Option<RawDualEyeSample>, DeviceError> {
        Ok(self.samples.pop_front().flatten())
    }

    fn open_data_file(&mut self, name: &str) -> Result<(), DeviceError> {
        self.record(HostCall::OpenDataFile(name.to_string()))
    }

    fn close_data_file(&mut self) -> Result<(), DeviceError> {
        self.record(HostCall::CloseDataFile)
    }

    fn receive_data_file(&mut self, remote: &str, local: &Path) -> Result<u64, TransferError> {
        self.record(HostCall::ReceiveDataFile(remote.to_string(), local.to_path_buf()))?;
        if self.fail_transfer {
            return Err(TransferError::NotFound(remote.to_string()));
        }
        std::fs::write(local, &self.payload).map_err(|source| TransferError::Io {
            path: local.to_path_buf(),
            source,
        })?;
        Ok(self.payload.len() as u64)
    }

    fn start_recording(&mut self, streams: RecordingStreams) -> Result<(), DeviceError> {
        self.record(HostCall::StartRecording(streams))
    }

    fn stop_recording(&mut self) -> Result<(), DeviceError> {
        self.record(HostCall::StopRecording)
    }

    fn close(&mut self) -> Result<i32, DeviceError> {
        self.record(HostCall::Close)?;
        self.connected = false;
        Ok(self.close_code)
    }
}

impl Connect for ScriptedHost {
    fn connect(address: &str) -> Result<Self, ConnectionError> {
        if address == "unreachable" {
            return Err(ConnectionError::Unreachable {
                host: address.to_string(),
                reason: "scripted refusal".into(),
            });
        }
        Ok(Self::new())
    }
}
