//! In-process stand-in for a tracker host.
//!
//! Follows the host's setup UI closely enough to drive the whole session:
//! virtual keys start and steer calibration, validation and drift correction,
//! result codes and messages appear when a procedure ends, and the data file
//! is an opaque byte log that can be downloaded.

use crate::error::{ConnectionError, DeviceError, TransferError};
use crate::host::{Connect, RecordingStreams, TrackerHost};
use elink_core::{EyeSelection, HostKey, KeyAction, Procedure, RawDualEyeSample, RawEyeData, TargetState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::net::IpAddr;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, trace};

const RESULT_PENDING: i32 = 1000;

#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Host coordinates assumed until `screen_pixel_coords` arrives.
    pub display: (f64, f64),
    /// Target polls after which a fixation counts as detected; `None` means
    /// targets only advance on the accept-fixation key.
    pub auto_accept_polls: Option<u32>,
    /// Average validation error (degrees) above which the result is poor.
    pub poor_threshold_deg: f64,
    pub sample_noise_px: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            display: (1920.0, 1080.0),
            auto_accept_polls: None,
            poor_threshold_deg: 1.0,
            sample_noise_px: 8.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Offline,
    Setup,
    Running,
    Recording,
}

#[derive(Debug, Clone)]
struct Run {
    procedure: Procedure,
    targets: Vec<(f64, f64)>,
    index: usize,
    dwell: u32,
}

pub struct SimulatedHost<R: Rng> {
    config: SimConfig,
    rng: R,
    clock: Instant,
    connected: bool,
    mode: Mode,
    coords: [f64; 4],
    calibration_area: (f64, f64),
    validation_area: (f64, f64),
    calibration_type: String,
    accept_key: u16,
    eye: EyeSelection,
    sample_rate: u32,
    run: Option<Run>,
    result: Option<(i32, String)>,
    calibrated: bool,
    last_drift: Option<i32>,
    streams: Option<RecordingStreams>,
    open_file: Option<String>,
    files: HashMap<String, Vec<u8>>,
}

impl<R: Rng> SimulatedHost<R> {
    pub fn with_rng(config: SimConfig, rng: R) -> Self {
        let (w, h) = config.display;
        Self {
            config,
            rng,
            clock: Instant::now(),
            connected: true,
            mode: Mode::Offline,
            coords: [0.0, 0.0, w - 1.0, h - 1.0],
            calibration_area: (0.88, 0.83),
            validation_area: (0.88, 0.83),
            calibration_type: "HV9".into(),
            accept_key: HostKey::Enter.code(),
            eye: EyeSelection::Both,
            sample_rate: 1000,
            run: None,
            result: None,
            calibrated: false,
            last_drift: None,
            streams: None,
            open_file: None,
            files: HashMap::new(),
        }
    }

    pub fn eye(&self) -> EyeSelection {
        self.eye
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn coords(&self) -> [f64; 4] {
        self.coords
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    pub fn is_recording(&self) -> bool {
        self.mode == Mode::Recording
    }

    /// Number of targets left in the running procedure.
    pub fn remaining_targets(&self) -> Option<usize> {
        self.run.as_ref().map(|r| r.targets.len() - r.index)
    }

    pub fn file(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    fn millis(&self) -> u128 {
        self.clock.elapsed().as_millis()
    }

    fn append(&mut self, line: &str) {
        let stamp = self.millis();
        if let Some(buf) = self.open_file.as_ref().and_then(|n| self.files.get_mut(n)) {
            let _ = writeln!(Bytes(buf), "{stamp}\t{line}");
        }
    }

    fn live(&self) -> Result<(), DeviceError> {
        if self.connected {
            Ok(())
        } else {
            Err(DeviceError::ConnectionLost)
        }
    }

    fn center(&self) -> (f64, f64) {
        let [l, t, r, b] = self.coords;
        ((l + r) / 2.0, (t + b) / 2.0)
    }

    fn grid(&self, area: (f64, f64)) -> Vec<(f64, f64)> {
        let [l, t, r, b] = self.coords;
        let (cx, cy) = self.center();
        let hx = (r - l) / 2.0 * area.0;
        let hy = (b - t) / 2.0 * area.1;
        let at = |fx: f64, fy: f64| (cx + fx * hx, cy + fy * hy);

        let mut points = vec![at(0.0, 0.0)];
        match self.calibration_type.as_str() {
            "HV3" => points.extend([at(-1.0, 1.0), at(1.0, 1.0)]),
            "HV5" => points.extend([at(0.0, -1.0), at(0.0, 1.0), at(-1.0, 0.0), at(1.0, 0.0)]),
            _ => {
                points.extend([
                    at(0.0, -1.0),
                    at(0.0, 1.0),
                    at(-1.0, 0.0),
                    at(1.0, 0.0),
                    at(-1.0, -1.0),
                    at(1.0, -1.0),
                    at(-1.0, 1.0),
                    at(1.0, 1.0),
                ]);
                if self.calibration_type == "HV13" {
                    points.extend([at(-0.5, -0.5), at(0.5, -0.5), at(-0.5, 0.5), at(0.5, 0.5)]);
                }
            }
        }
        points
    }

    fn begin(&mut self, procedure: Procedure, targets: Vec<(f64, f64)>) {
        debug!(?procedure, targets = targets.len(), "simulated procedure started");
        self.result = None;
        self.mode = Mode::Running;
        self.run = Some(Run {
            procedure,
            targets,
            index: 0,
            dwell: 0,
        });
    }

    fn accept_target(&mut self) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        run.index += 1;
        run.dwell = 0;
        if run.index >= run.targets.len() {
            let procedure = run.procedure;
            self.finish(procedure);
        }
    }

    fn finish(&mut self, procedure: Procedure) {
        self.run = None;
        self.mode = Mode::Setup;
        let result = match procedure {
            Procedure::Calibration => (0, format!("calibration: {} GOOD", self.calibration_type)),
            Procedure::Validation => {
                let avg: f64 = self.rng.random_range(0.15..1.2);
                let max = avg + self.rng.random_range(0.1..0.8);
                let (code, grade) = if avg <= self.config.poor_threshold_deg {
                    (0, if avg < 0.5 { "GOOD" } else { "FAIR" })
                } else {
                    (1, "POOR")
                };
                (
                    code,
                    format!(
                        "validation: {} {grade} ERROR {avg:.2} avg. {max:.2} max",
                        self.calibration_type
                    ),
                )
            }
            Procedure::DriftCorrection => {
                let dx: f64 = self.rng.random_range(-0.5..0.5);
                let dy: f64 = self.rng.random_range(-0.5..0.5);
                self.last_drift = Some(0);
                (0, format!("drift_correct: {dx:.2} {dy:.2} deg"))
            }
        };
        debug!(?procedure, code = result.0, message = %result.1, "simulated procedure finished");
        self.append(&format!("!CAL {}", result.1));
        self.result = Some(result);
    }

    // successful calibration result not yet accepted or discarded
    fn pending_calibration(&self) -> bool {
        matches!(&self.result, Some((0, message)) if message.starts_with("calibration"))
    }

    fn abort(&mut self) {
        if let Some(run) = self.run.take() {
            if run.procedure == Procedure::DriftCorrection {
                self.last_drift = Some(27);
            }
            self.result = Some((27, format!("{} aborted", run.procedure.name())));
        }
        self.mode = Mode::Setup;
    }

    fn on_key(&mut self, key: HostKey) {
        match self.mode {
            Mode::Running => {
                if key.code() == self.accept_key {
                    self.accept_target();
                } else if key == HostKey::Backspace {
                    if let Some(run) = self.run.as_mut() {
                        run.index = run.index.saturating_sub(1);
                        run.dwell = 0;
                    }
                } else if key == HostKey::Escape {
                    self.abort();
                }
            }
            Mode::Setup => match key {
                HostKey::C => {
                    let targets = self.grid(self.calibration_area);
                    self.begin(Procedure::Calibration, targets);
                }
                HostKey::V => {
                    if self.pending_calibration() {
                        self.calibrated = true;
                    }
                    if self.calibrated {
                        let targets = self.grid(self.validation_area);
                        self.begin(Procedure::Validation, targets);
                    } else {
                        self.result = Some((-1, "validation: no calibration to validate".into()));
                    }
                }
                HostKey::Enter => {
                    if self.pending_calibration() {
                        self.calibrated = true;
                    }
                    self.result = None;
                }
                HostKey::Delete | HostKey::Escape => self.result = None,
                HostKey::B => self.eye = EyeSelection::Both,
                HostKey::L => self.eye = EyeSelection::Left,
                HostKey::R => self.eye = EyeSelection::Right,
                _ => {}
            },
            Mode::Offline | Mode::Recording => {}
        }
    }

    fn on_command(&mut self, command: &str) -> Result<(), DeviceError> {
        let (name, args) = match command.split_once('=') {
            Some((n, a)) => (n.trim(), a.trim()),
            None => command.split_once(' ').unwrap_or((command, "")),
        };
        let numbers: Vec<f64> = args.split_whitespace().filter_map(|t| t.parse().ok()).collect();
        let reject = || DeviceError::Rejected {
            command: command.to_string(),
            code: -1,
        };

        match name {
            "screen_pixel_coords" => {
                let [l, t, r, b] = numbers[..] else {
                    return Err(reject());
                };
                self.coords = [l, t, r, b];
            }
            "calibration_area_proportion" | "validation_area_proportion" => {
                let [x, y] = numbers[..] else {
                    return Err(reject());
                };
                if name.starts_with("calibration") {
                    self.calibration_area = (x, y);
                } else {
                    self.validation_area = (x, y);
                }
            }
            "sample_rate" => {
                let rate = args.trim().parse::<u32>().map_err(|_| reject())?;
                if !matches!(rate, 250 | 500 | 1000 | 2000) || (rate > 1000 && self.eye.is_binocular()) {
                    return Err(reject());
                }
                self.sample_rate = rate;
            }
            "add_file_preamble_text" => {
                if let Some(buf) = self.open_file.as_ref().and_then(|n| self.files.get_mut(n)) {
                    let _ = writeln!(Bytes(buf), "** {}", args.trim_matches('\''));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn eye_data(&mut self) -> RawEyeData {
        let (cx, cy) = self.center();
        let noise = self.config.sample_noise_px;
        let gx = cx + self.rng.random_range(-noise..=noise);
        let gy = cy + self.rng.random_range(-noise..=noise);
        RawEyeData {
            gaze: (gx, gy),
            href: (gx * 4.0, gy * 4.0),
            pupil_raw: (gx / 10.0, gy / 10.0),
            pupil_size: self.rng.random_range(800.0..1200.0),
        }
    }
}

/// `fmt::Write` over a byte log.
struct Bytes<'a>(&'a mut Vec<u8>);

impl std::fmt::Write for Bytes<'_> {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        self.0.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

impl<R: Rng> TrackerHost for SimulatedHost<R> {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn send_command(&mut self, command: &str) -> Result<(), DeviceError> {
        self.live()?;
        trace!(command, "simulated host command");
        self.on_command(command)
    }

    fn send_message(&mut self, message: &str) -> Result<(), DeviceError> {
        self.live()?;
        self.append(&format!("MSG {message}"));
        Ok(())
    }

    fn send_key_button(&mut self, code: u16, _modifier: u16, action: KeyAction) -> Result<(), DeviceError> {
        self.live()?;
        if action == KeyAction::Press {
            if let Some(key) = HostKey::from_code(code) {
                self.on_key(key);
            }
        }
        Ok(())
    }

    fn start_setup(&mut self) -> Result<(), DeviceError> {
        self.live()?;
        self.run = None;
        self.streams = None;
        self.mode = Mode::Setup;
        Ok(())
    }

    fn set_offline_mode(&mut self) -> Result<(), DeviceError> {
        self.live()?;
        self.run = None;
        self.streams = None;
        self.mode = Mode::Offline;
        Ok(())
    }

    fn set_calibration_type(&mut self, kind: &str) -> Result<(), DeviceError> {
        self.live()?;
        if !matches!(kind, "HV3" | "HV5" | "HV9" | "HV13") {
            return Err(DeviceError::Rejected {
                command: format!("calibration_type = {kind}"),
                code: -1,
            });
        }
        self.calibration_type = kind.to_string();
        Ok(())
    }

    fn set_accept_target_fixation_button(&mut self, code: u16) -> Result<(), DeviceError> {
        self.live()?;
        self.accept_key = code;
        Ok(())
    }

    fn calibration_result(&mut self) -> Result<i32, DeviceError> {
        self.live()?;
        Ok(self.result.as_ref().map_or(RESULT_PENDING, |(code, _)| *code))
    }

    fn calibration_message(&mut self) -> Result<String, DeviceError> {
        self.live()?;
        Ok(self.result.as_ref().map(|(_, m)| m.clone()).unwrap_or_default())
    }

    fn target_position_and_state(&mut self) -> Result<TargetState, DeviceError> {
        self.live()?;
        let auto_accept = self.config.auto_accept_polls;
        let Some(run) = self.run.as_mut() else {
            return Ok(TargetState::hidden());
        };
        let Some(&(x, y)) = run.targets.get(run.index) else {
            return Ok(TargetState::hidden());
        };
        run.dwell += 1;
        if auto_accept.is_some_and(|n| run.dwell >= n) {
            self.accept_target();
        }
        Ok(TargetState::shown(x, y))
    }

    fn start_drift_correct(&mut self, x: i32, y: i32) -> Result<(), DeviceError> {
        self.live()?;
        self.last_drift = None;
        self.begin(Procedure::DriftCorrection, vec![(x as f64, y as f64)]);
        Ok(())
    }

    fn apply_drift_correct(&mut self) -> Result<(), DeviceError> {
        self.live()?;
        match self.last_drift {
            Some(0) => {
                self.append("!DRIFTCORRECT applied");
                Ok(())
            }
            other => Err(DeviceError::Rejected {
                command: "apply_drift_correct".into(),
                code: other.unwrap_or(RESULT_PENDING),
            }),
        }
    }

    fn newest_sample(&mut self) -> Result<Option<RawDualEyeSample>, DeviceError> {
        self.live()?;
        if self.mode != Mode::Recording || !self.streams.is_some_and(|s| s.samples_over_link) {
            return Ok(None);
        }
        let left = self.eye.includes(elink_core::Eye::Left).then(|| self.eye_data());
        let right = self.eye.includes(elink_core::Eye::Right).then(|| self.eye_data());
        Ok(Some(RawDualEyeSample { left, right }))
    }

    fn open_data_file(&mut self, name: &str) -> Result<(), DeviceError> {
        self.live()?;
        self.files.insert(name.to_string(), b"** SIMULATED EDF\n".to_vec());
        self.open_file = Some(name.to_string());
        Ok(())
    }

    fn close_data_file(&mut self) -> Result<(), DeviceError> {
        self.live()?;
        self.open_file = None;
        Ok(())
    }

    fn receive_data_file(&mut self, remote: &str, local: &Path) -> Result<u64, TransferError> {
        self.live()?;
        if self.open_file.as_deref() == Some(remote) {
            return Err(DeviceError::Rejected {
                command: format!("receive_data_file {remote}"),
                code: -1,
            }
            .into());
        }
        let payload = self
            .files
            .get(remote)
            .ok_or_else(|| TransferError::NotFound(remote.to_string()))?;
        std::fs::write(local, payload).map_err(|source| TransferError::Io {
            path: local.to_path_buf(),
            source,
        })?;
        Ok(payload.len() as u64)
    }

    fn start_recording(&mut self, streams: RecordingStreams) -> Result<(), DeviceError> {
        self.live()?;
        self.run = None;
        self.streams = Some(streams);
        self.mode = Mode::Recording;
        self.append("START");
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<(), DeviceError> {
        self.live()?;
        self.streams = None;
        self.mode = Mode::Offline;
        self.append("END");
        Ok(())
    }

    fn close(&mut self) -> Result<i32, DeviceError> {
        self.live()?;
        self.connected = false;
        Ok(0)
    }
}

impl Connect for SimulatedHost<StdRng> {
    fn connect(address: &str) -> Result<Self, ConnectionError> {
        address
            .parse::<IpAddr>()
            .map_err(|_| ConnectionError::InvalidAddress(address.to_string()))?;
        Ok(Self::with_rng(SimConfig::default(), StdRng::from_os_rng()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> SimulatedHost<StdRng> {
        SimulatedHost::with_rng(SimConfig::default(), StdRng::seed_from_u64(7))
    }

    fn press(host: &mut SimulatedHost<StdRng>, key: HostKey) {
        host.send_key_button(key.code(), 0, KeyAction::Press).unwrap();
        host.send_key_button(key.code(), 0, KeyAction::Release).unwrap();
    }

    #[test]
    fn calibration_walks_nine_targets() {
        let mut host = host();
        host.start_setup().unwrap();
        host.send_command("screen_pixel_coords = 0 0 1023 767").unwrap();
        host.send_command("calibration_area_proportion = 0.5 0.5").unwrap();
        host.set_accept_target_fixation_button(HostKey::Space.code()).unwrap();
        press(&mut host, HostKey::C);

        let first = host.target_position_and_state().unwrap();
        assert!(first.visible);
        assert_eq!((first.x, first.y), (511.5, 383.5));
        assert_eq!(host.remaining_targets(), Some(9));

        for _ in 0..8 {
            press(&mut host, HostKey::Space);
            assert_eq!(host.calibration_result().unwrap(), 1000);
        }
        press(&mut host, HostKey::Backspace);
        assert_eq!(host.remaining_targets(), Some(2));
        press(&mut host, HostKey::Space);
        press(&mut host, HostKey::Space);

        assert_eq!(host.calibration_result().unwrap(), 0);
        assert!(host.calibration_message().unwrap().starts_with("calibration"));
        press(&mut host, HostKey::Enter);
        assert!(host.is_calibrated());
    }

    #[test]
    fn escape_aborts_with_code_27() {
        let mut host = host();
        host.start_setup().unwrap();
        press(&mut host, HostKey::C);
        press(&mut host, HostKey::Escape);
        assert_eq!(host.calibration_result().unwrap(), 27);
    }

    #[test]
    fn validation_without_calibration_fails() {
        let mut host = host();
        host.start_setup().unwrap();
        press(&mut host, HostKey::V);
        assert_eq!(host.calibration_result().unwrap(), -1);
    }

    #[test]
    fn auto_accept_advances_on_polls() {
        let config = SimConfig {
            auto_accept_polls: Some(2),
            ..SimConfig::default()
        };
        let mut host = SimulatedHost::with_rng(config, StdRng::seed_from_u64(1));
        host.start_setup().unwrap();
        host.set_calibration_type("HV3").unwrap();
        press(&mut host, HostKey::C);
        for _ in 0..6 {
            host.target_position_and_state().unwrap();
        }
        assert_eq!(host.calibration_result().unwrap(), 0);
    }

    #[test]
    fn drift_apply_requires_successful_drift() {
        let mut host = host();
        assert!(host.apply_drift_correct().is_err());
        host.set_accept_target_fixation_button(HostKey::Space.code()).unwrap();
        host.start_drift_correct(960, 540).unwrap();
        press(&mut host, HostKey::Space);
        assert_eq!(host.calibration_result().unwrap(), 0);
        assert!(host.apply_drift_correct().is_ok());
    }

    #[test]
    fn drift_result_does_not_count_as_calibration() {
        let mut host = host();
        host.set_accept_target_fixation_button(HostKey::Space.code()).unwrap();
        host.start_drift_correct(960, 540).unwrap();
        press(&mut host, HostKey::Space);
        assert_eq!(host.calibration_result().unwrap(), 0);

        host.start_setup().unwrap();
        press(&mut host, HostKey::V);
        assert!(!host.is_calibrated());
        assert_eq!(host.remaining_targets(), None);
        assert_eq!(host.calibration_result().unwrap(), -1);
    }

    #[test]
    fn samples_follow_selected_eye_while_recording() {
        let mut host = host();
        host.start_setup().unwrap();
        press(&mut host, HostKey::L);
        assert_eq!(host.newest_sample().unwrap(), None);

        host.start_recording(RecordingStreams::all()).unwrap();
        let sample = host.newest_sample().unwrap().unwrap();
        assert!(sample.is_left_sample());
        assert!(!sample.is_right_sample());
    }

    #[test]
    fn binocular_rate_is_capped() {
        let mut host = host();
        assert!(host.send_command("sample_rate 2000").is_err());
        assert!(host.send_command("sample_rate 500").is_ok());
        assert_eq!(host.sample_rate(), 500);
    }

    #[test]
    fn open_file_cannot_be_received() {
        let mut host = host();
        host.open_data_file("run.edf").unwrap();
        host.send_message("hello").unwrap();
        let target = std::env::temp_dir().join("elink-sim-open.edf");
        assert!(host.receive_data_file("run.edf", &target).is_err());

        host.close_data_file().unwrap();
        let bytes = host.receive_data_file("run.edf", &target).unwrap();
        assert_eq!(bytes as usize, host.file("run.edf").unwrap().len());
        let _ = std::fs::remove_file(target);
    }

    #[test]
    fn connect_requires_ip_address() {
        assert!(SimulatedHost::<StdRng>::connect("100.1.1.1").is_ok());
        assert_eq!(
            SimulatedHost::<StdRng>::connect("not an ip").err(),
            Some(ConnectionError::InvalidAddress("not an ip".into()))
        );
    }
}
