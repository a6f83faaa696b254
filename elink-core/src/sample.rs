use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which eye(s) a session tracks. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EyeSelection {
    Left,
    Right,
    #[default]
    Both,
}

impl EyeSelection {
    /// Eye-channel prefix for the host's event and sample filter strings.
    pub fn filter_prefix(&self) -> &'static str {
        match self {
            EyeSelection::Left => "LEFT,",
            EyeSelection::Right => "RIGHT,",
            EyeSelection::Both => "LEFT,RIGHT,",
        }
    }

    pub fn includes(&self, eye: Eye) -> bool {
        matches!(
            (self, eye),
            (EyeSelection::Both, _)
                | (EyeSelection::Left, Eye::Left)
                | (EyeSelection::Right, Eye::Right)
        )
    }

    pub fn is_binocular(&self) -> bool {
        matches!(self, EyeSelection::Both)
    }
}

impl fmt::Display for EyeSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EyeSelection::Left => "left",
            EyeSelection::Right => "right",
            EyeSelection::Both => "both",
        })
    }
}

impl FromStr for EyeSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(EyeSelection::Left),
            "right" => Ok(EyeSelection::Right),
            "both" => Ok(EyeSelection::Both),
            other => Err(format!(
                "unknown eye selection '{other}', expected one of: both, left, right"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Eye {
    Left,
    Right,
}

/// One instant's gaze/pupil reading for one eye.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    gaze: (f64, f64),
    href: (f64, f64),
    pupil_raw: (f64, f64),
    pupil_size: f64,
}

impl Sample {
    pub fn new(gaze: (f64, f64), href: (f64, f64), pupil_raw: (f64, f64), pupil_size: f64) -> Self {
        Self {
            gaze,
            href,
            pupil_raw,
            pupil_size,
        }
    }

    /// Stand-in used when the device has not reported the requested eye:
    /// every position sits at the display's own dimensions, pupil size is zero.
    pub fn dummy(display: (f64, f64)) -> Self {
        Self::new(display, display, display, 0.0)
    }

    pub fn gaze(&self) -> (f64, f64) {
        self.gaze
    }

    pub fn href(&self) -> (f64, f64) {
        self.href
    }

    pub fn pupil_raw(&self) -> (f64, f64) {
        self.pupil_raw
    }

    pub fn pupil_size(&self) -> f64 {
        self.pupil_size
    }
}

/// Per-eye payload as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawEyeData {
    pub gaze: (f64, f64),
    pub href: (f64, f64),
    pub pupil_raw: (f64, f64),
    pub pupil_size: f64,
}

impl From<RawEyeData> for Sample {
    fn from(raw: RawEyeData) -> Self {
        Sample::new(raw.gaze, raw.href, raw.pupil_raw, raw.pupil_size)
    }
}

/// Newest sample from the host. An eye's slot is `Some` exactly when the
/// host set that eye's flag.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RawDualEyeSample {
    pub left: Option<RawEyeData>,
    pub right: Option<RawEyeData>,
}

impl RawDualEyeSample {
    pub fn is_left_sample(&self) -> bool {
        self.left.is_some()
    }

    pub fn is_right_sample(&self) -> bool {
        self.right.is_some()
    }
}

/// Typed gaze reading shaped by the session's [`EyeSelection`]. A monocular
/// session never exposes the other eye's channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GazeReading {
    Monocular { eye: Eye, sample: Sample },
    Binocular { left: Sample, right: Sample },
}

impl GazeReading {
    pub fn left(&self) -> Option<&Sample> {
        match self {
            GazeReading::Monocular {
                eye: Eye::Left,
                sample,
            } => Some(sample),
            GazeReading::Binocular { left, .. } => Some(left),
            _ => None,
        }
    }

    pub fn right(&self) -> Option<&Sample> {
        match self {
            GazeReading::Monocular {
                eye: Eye::Right,
                sample,
            } => Some(sample),
            GazeReading::Binocular { right, .. } => Some(right),
            _ => None,
        }
    }
}

/// Turns raw host samples into typed readings for the selected eye(s).
#[derive(Debug, Clone, Copy)]
pub struct SampleModel {
    selection: EyeSelection,
    dummy: Sample,
}

impl SampleModel {
    pub fn new(selection: EyeSelection, display: (f64, f64)) -> Self {
        Self {
            selection,
            dummy: Sample::dummy(display),
        }
    }

    pub fn selection(&self) -> EyeSelection {
        self.selection
    }

    pub fn dummy(&self) -> Sample {
        self.dummy
    }

    pub fn read(&self, raw: Option<&RawDualEyeSample>) -> GazeReading {
        let pick = |slot: Option<RawEyeData>| slot.map(Sample::from).unwrap_or(self.dummy);
        let raw = raw.copied().unwrap_or_default();

        match self.selection {
            EyeSelection::Both => GazeReading::Binocular {
                left: pick(raw.left),
                right: pick(raw.right),
            },
            EyeSelection::Left => GazeReading::Monocular {
                eye: Eye::Left,
                sample: pick(raw.left),
            },
            EyeSelection::Right => GazeReading::Monocular {
                eye: Eye::Right,
                sample: pick(raw.right),
            },
        }
    }
}
