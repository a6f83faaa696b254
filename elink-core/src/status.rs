use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome codes shared by calibration, validation and drift correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionStatusCode {
    /// Sentinel while a procedure runs (or before it ever ran). Not a result.
    #[default]
    InProgress,
    Success,
    Aborted,
    PoorResult,
    Failed,
    Unknown,
}

impl SessionStatusCode {
    pub const IN_PROGRESS: i32 = 1000;

    /// Maps a raw host code. Codes outside the fixed domain read as `Unknown`.
    pub fn from_code(code: i32) -> Self {
        match code {
            1000 => SessionStatusCode::InProgress,
            0 => SessionStatusCode::Success,
            27 => SessionStatusCode::Aborted,
            1 => SessionStatusCode::PoorResult,
            -1 => SessionStatusCode::Failed,
            _ => SessionStatusCode::Unknown,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            SessionStatusCode::InProgress => 1000,
            SessionStatusCode::Success => 0,
            SessionStatusCode::Aborted => 27,
            SessionStatusCode::PoorResult => 1,
            SessionStatusCode::Failed => -1,
            SessionStatusCode::Unknown => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatusCode::InProgress)
    }

    /// Operator-facing label. Empty while in progress.
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatusCode::InProgress => "",
            SessionStatusCode::Success => "success",
            SessionStatusCode::Aborted => "aborted",
            SessionStatusCode::PoorResult => "failed (poor result)",
            SessionStatusCode::Failed => "failed",
            SessionStatusCode::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SessionStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.code())
    }
}

/// The three host-side procedures the setup workflow can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Procedure {
    Calibration,
    Validation,
    DriftCorrection,
}

impl Procedure {
    pub fn name(&self) -> &'static str {
        match self {
            Procedure::Calibration => "Calibration",
            Procedure::Validation => "Validation",
            Procedure::DriftCorrection => "Drift correction",
        }
    }
}

/// Aggregate session state owned by the connector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub calibration_status: SessionStatusCode,
    pub validation_status: SessionStatusCode,
    pub drift_status: SessionStatusCode,
    /// (average, maximum) angular error; set only when a validation is accepted.
    pub validation_error: Option<(f64, f64)>,
    pub data_file_open: bool,
    pub edf_file_name: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, procedure: Procedure) -> SessionStatusCode {
        match procedure {
            Procedure::Calibration => self.calibration_status,
            Procedure::Validation => self.validation_status,
            Procedure::DriftCorrection => self.drift_status,
        }
    }

    pub fn set_status(&mut self, procedure: Procedure, status: SessionStatusCode) {
        match procedure {
            Procedure::Calibration => self.calibration_status = status,
            Procedure::Validation => self.validation_status = status,
            Procedure::DriftCorrection => self.drift_status = status,
        }
    }

    pub fn calibrated(&self) -> bool {
        self.calibration_status == SessionStatusCode::Success
    }

    pub fn validated(&self) -> bool {
        self.validation_status == SessionStatusCode::Success
    }
}
