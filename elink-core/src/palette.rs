use serde::{Deserialize, Serialize};

pub type Rgb = [u8; 3];

/// Colours of the setup screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Palette {
    pub background: Rgb,
    pub target_outer: Rgb,
    pub target_inner: Rgb,
    pub text: Rgb,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            background: [128, 128, 128],
            target_outer: [255, 255, 255],
            target_inner: [0, 0, 0],
            text: [0, 0, 0],
        }
    }
}
