//! Session logic on top of a [`DeviceLink`](elink_link::DeviceLink): the data
//! file and trial lifecycle, the interactive setup workflow and the connector
//! that owns both.

pub mod config;
pub mod connector;
pub mod error;
pub mod recording;
pub mod setup;
pub mod status_text;
pub mod validation;

pub use config::{CalibrationConfig, Palette, Rgb, SessionConfig};
pub use connector::{Connector, Progress};
pub use error::{ConfigError, ConnectError, ParseError};
pub use recording::RecordingSession;
pub use setup::{Effect, Screen, SetupEntry, SetupEvent, SetupMachine, SetupPhase};
pub use validation::parse_validation_error;
