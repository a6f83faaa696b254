use crate::keys::OperatorKey;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Where the host wants the calibration target drawn this tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TargetState {
    pub visible: bool,
    pub x: f64,
    pub y: f64,
}

impl TargetState {
    pub fn shown(x: f64, y: f64) -> Self {
        Self {
            visible: true,
            x,
            y,
        }
    }

    pub fn hidden() -> Self {
        Self::default()
    }
}

/// Origin and axis direction of a renderer's display coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateConvention {
    /// Origin top-left, y grows downwards.
    #[default]
    TopLeft,
    /// Origin bottom-left, y grows upwards.
    BottomLeft,
    /// Origin at the display centre, y grows upwards.
    Centered,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayGeometry {
    pub width: f64,
    pub height: f64,
    pub convention: CoordinateConvention,
}

impl DisplayGeometry {
    pub fn new(width: f64, height: f64, convention: CoordinateConvention) -> Self {
        Self {
            width,
            height,
            convention,
        }
    }

    pub fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    /// LEFT, TOP, RIGHT, BOTTOM as announced to the host.
    pub fn coords_rect(&self) -> [f64; 4] {
        let (w, h) = (self.width, self.height);
        match self.convention {
            CoordinateConvention::TopLeft => [0.0, 0.0, w - 1.0, h - 1.0],
            CoordinateConvention::BottomLeft => [0.0, h - 1.0, w - 1.0, 0.0],
            CoordinateConvention::Centered => [-w / 2.0, h / 2.0, w / 2.0, -h / 2.0],
        }
    }

    /// Display centre in the renderer's own coordinates.
    pub fn center(&self) -> (f64, f64) {
        match self.convention {
            CoordinateConvention::Centered => (0.0, 0.0),
            _ => (self.width / 2.0, self.height / 2.0),
        }
    }

    pub fn half_extents(&self) -> (i32, i32) {
        ((self.width / 2.0) as i32, (self.height / 2.0) as i32)
    }

    /// Display coordinates to raster pixels (origin top-left, y down).
    pub fn to_pixels(&self, x: f64, y: f64) -> (f64, f64) {
        match self.convention {
            CoordinateConvention::TopLeft => (x, y),
            CoordinateConvention::BottomLeft => (x, self.height - 1.0 - y),
            CoordinateConvention::Centered => (x + self.width / 2.0, self.height / 2.0 - y),
        }
    }
}

/// Renderer capability consumed by the setup workflow.
pub trait RenderPort {
    fn display_geometry(&self) -> DisplayGeometry;
    fn draw_target(&mut self, x: f64, y: f64, visible: bool);
    fn draw_status_text(&mut self, text: &str);
    fn present(&mut self) -> anyhow::Result<()>;
}

/// Operator keyboard. Every call drains what arrived since the previous one;
/// nothing carries over between ticks.
pub trait InputPort {
    fn drain_keys(&mut self) -> impl Iterator<Item = OperatorKey> + '_;
}

/// Buffer for event-driven front-ends: window callbacks push, the tick drains.
#[derive(Debug, Default)]
pub struct KeyQueue {
    pending: VecDeque<OperatorKey>,
}

impl KeyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: OperatorKey) {
        self.pending.push_back(key);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl InputPort for KeyQueue {
    fn drain_keys(&mut self) -> impl Iterator<Item = OperatorKey> + '_ {
        self.pending.drain(..)
    }
}
