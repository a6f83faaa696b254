pub mod keys;
pub mod palette;
pub mod ports;
pub mod sample;
pub mod status;

pub use keys::{HostKey, KeyAction, OperatorKey};
pub use palette::{Palette, Rgb};
pub use ports::{CoordinateConvention, DisplayGeometry, InputPort, KeyQueue, RenderPort, TargetState};
pub use sample::{Eye, EyeSelection, GazeReading, RawDualEyeSample, RawEyeData, Sample, SampleModel};
pub use status::{Procedure, SessionState, SessionStatusCode};
