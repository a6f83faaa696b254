use crate::config::SessionConfig;
use chrono::Local;
use elink_core::{DisplayGeometry, EyeSelection, SessionState};
use elink_link::{DeviceError, DeviceLink, EdfFileName, OpenFileError, RecordingStreams, TrackerHost, TransferError};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Data file and trial lifecycle on top of a [`DeviceLink`].
#[derive(Debug, Clone)]
pub struct RecordingSession {
    eye: EyeSelection,
    sample_rate: u32,
    preamble_tag: String,
    trial_message: Option<String>,
    last_file: Option<EdfFileName>,
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

impl RecordingSession {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            eye: config.eye,
            sample_rate: config.sample_rate,
            preamble_tag: config.preamble_tag.clone(),
            trial_message: None,
            last_file: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.trial_message.is_some()
    }

    /// Most recently opened file, open or not.
    pub fn file_name(&self) -> Option<&EdfFileName> {
        self.last_file.as_ref()
    }

    /// Opens `name` on the host and configures the coordinate system, the
    /// event and sample filters and the sample rate for it.
    pub fn open_file<H: TrackerHost>(
        &mut self,
        link: &mut DeviceLink<H>,
        state: &mut SessionState,
        name: &str,
        geometry: &DisplayGeometry,
    ) -> Result<EdfFileName, OpenFileError> {
        if state.data_file_open {
            warn!(file = ?state.edf_file_name, "closing previous data file before opening a new one");
            self.close_file(link, state)?;
        }

        let edf = link.open_file(name)?;
        state.data_file_open = true;
        state.edf_file_name = Some(edf.to_string());
        self.last_file = Some(edf.clone());

        link.command(&format!(
            "add_file_preamble_text 'RECORDED BY {} tagged {}'",
            self.preamble_tag,
            link.prefix()
        ))?;

        let [left, top, right, bottom] = geometry.coords_rect();
        link.message(&format!("DISPLAY_COORDS {left} {top} {right} {bottom}"))?;
        link.command(&format!("screen_pixel_coords = {left} {top} {right} {bottom}"))?;

        let eye = self.eye.filter_prefix();
        link.command(&format!("file_event_filter = {eye}FIXATION,SACCADE,BLINK,MESSAGE,BUTTON,INPUT"))?;
        link.command(&format!(
            "file_sample_data = {eye}GAZE,HREF,RAW,AREA,HTARGET,GAZERES,BUTTON,STATUS,INPUT"
        ))?;
        link.command(&format!("link_event_filter = {eye}FIXATION,SACCADE,BLINK,BUTTON,FIXUPDATE,INPUT"))?;
        link.command(&format!("link_sample_data = {eye}GAZE,GAZERES,AREA,HTARGET,STATUS,INPUT"))?;
        link.command(&format!("sample_rate {}", self.sample_rate))?;

        Ok(edf)
    }

    /// # Panics
    ///
    /// Without an open data file.
    pub fn start_recording<H: TrackerHost>(
        &mut self,
        link: &mut DeviceLink<H>,
        state: &SessionState,
        message: &str,
    ) -> Result<(), DeviceError> {
        assert!(state.data_file_open, "start_recording requires an open data file");
        self.trial_message = Some(message.to_string());
        link.message(&format!("TIMESTAMP {} - START OF TRIAL {message}", timestamp()))?;
        link.start_recording(RecordingStreams::all())?;
        info!(trial = message, "recording started");
        Ok(())
    }

    /// # Panics
    ///
    /// Without a preceding `start_recording`.
    pub fn stop_recording<H: TrackerHost>(&mut self, link: &mut DeviceLink<H>) -> Result<(), DeviceError> {
        let Some(message) = self.trial_message.take() else {
            panic!("stop_recording called without start_recording");
        };
        link.message(&format!("TIMESTAMP {} - END OF TRIAL {message}", timestamp()))?;
        link.stop_recording()?;
        info!(trial = %message, "recording stopped");
        Ok(())
    }

    pub fn close_file<H: TrackerHost>(
        &mut self,
        link: &mut DeviceLink<H>,
        state: &mut SessionState,
    ) -> Result<(), DeviceError> {
        link.close_file()?;
        state.data_file_open = false;
        Ok(())
    }

    /// Closes the file and copies it to `local_dir/<edf name>`, creating the
    /// directory when needed. The file counts as closed afterwards even when
    /// the transfer fails.
    pub fn close_and_download<H: TrackerHost>(
        &mut self,
        link: &mut DeviceLink<H>,
        state: &mut SessionState,
        local_dir: &Path,
    ) -> Result<PathBuf, TransferError> {
        let edf = self.last_file.clone().ok_or(TransferError::NoFile)?;
        std::fs::create_dir_all(local_dir).map_err(|source| TransferError::Io {
            path: local_dir.to_path_buf(),
            source,
        })?;

        let result = link.download_file(&edf, local_dir);
        state.data_file_open = false;
        if let Err(err) = &result {
            warn!(file = %edf, error = %err, "data file download failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elink_core::CoordinateConvention;
    use elink_link::testing::{HostCall, ScriptedHost};

    fn setup(eye: EyeSelection) -> (RecordingSession, DeviceLink<ScriptedHost>, SessionState) {
        let config = SessionConfig {
            eye,
            prefix: "T1".into(),
            ..SessionConfig::default()
        };
        let link = DeviceLink::with_host(ScriptedHost::new(), &config.host, &config.prefix);
        (RecordingSession::new(&config), link, SessionState::new())
    }

    #[test]
    fn open_file_configures_host_in_order() {
        let (mut session, mut link, mut state) = setup(EyeSelection::Right);
        let geometry = DisplayGeometry::new(1024.0, 768.0, CoordinateConvention::BottomLeft);
        let edf = session.open_file(&mut link, &mut state, "ab", &geometry).unwrap();

        assert_eq!(edf.as_str(), "T1_ab.edf");
        assert!(state.data_file_open);
        assert_eq!(state.edf_file_name.as_deref(), Some("T1_ab.edf"));
        assert_eq!(link.host().calls()[0], HostCall::OpenDataFile("T1_ab.edf".into()));
        assert_eq!(link.host().messages(), vec!["DISPLAY_COORDS 0 767 1023 0"]);
        assert_eq!(
            link.host().commands(),
            vec![
                "add_file_preamble_text 'RECORDED BY elink connector tagged T1'",
                "screen_pixel_coords = 0 767 1023 0",
                "file_event_filter = RIGHT,FIXATION,SACCADE,BLINK,MESSAGE,BUTTON,INPUT",
                "file_sample_data = RIGHT,GAZE,HREF,RAW,AREA,HTARGET,GAZERES,BUTTON,STATUS,INPUT",
                "link_event_filter = RIGHT,FIXATION,SACCADE,BLINK,BUTTON,FIXUPDATE,INPUT",
                "link_sample_data = RIGHT,GAZE,GAZERES,AREA,HTARGET,STATUS,INPUT",
                "sample_rate 1000",
            ]
        );
    }

    #[test]
    fn too_long_name_leaves_state_untouched() {
        let (mut session, mut link, mut state) = setup(EyeSelection::Both);
        let geometry = DisplayGeometry::new(800.0, 600.0, CoordinateConvention::TopLeft);
        assert!(session.open_file(&mut link, &mut state, "averylongname12345", &geometry).is_err());
        assert!(!state.data_file_open);
        assert!(link.host().calls().is_empty());
    }

    #[test]
    fn trial_markers_share_the_message() {
        let (mut session, mut link, mut state) = setup(EyeSelection::Both);
        let geometry = DisplayGeometry::new(800.0, 600.0, CoordinateConvention::TopLeft);
        session.open_file(&mut link, &mut state, "ab", &geometry).unwrap();
        link.host_mut().clear_calls();

        session.start_recording(&mut link, &state, "trial-1").unwrap();
        assert!(session.is_recording());
        session.stop_recording(&mut link).unwrap();
        assert!(!session.is_recording());

        let messages = link.host().messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].starts_with("TIMESTAMP "));
        assert!(messages[0].ends_with(" - START OF TRIAL trial-1"));
        assert!(messages[1].ends_with(" - END OF TRIAL trial-1"));
        assert_eq!(
            link.host().calls()[1],
            HostCall::StartRecording(RecordingStreams::all())
        );
        assert_eq!(link.host().calls()[3], HostCall::StopRecording);
    }

    #[test]
    #[should_panic(expected = "requires an open data file")]
    fn recording_without_file_panics() {
        let (mut session, mut link, state) = setup(EyeSelection::Both);
        let _ = session.start_recording(&mut link, &state, "x");
    }

    #[test]
    #[should_panic(expected = "without start_recording")]
    fn stop_without_start_panics() {
        let (mut session, mut link, _) = setup(EyeSelection::Both);
        let _ = session.stop_recording(&mut link);
    }

    #[test]
    fn rejected_setup_command_keeps_file_open() {
        let (mut session, mut link, mut state) = setup(EyeSelection::Both);
        link.host_mut().reject_commands.push("sample_rate".into());
        let geometry = DisplayGeometry::new(800.0, 600.0, CoordinateConvention::TopLeft);

        let err = session.open_file(&mut link, &mut state, "ab", &geometry).unwrap_err();
        assert!(matches!(
            err,
            OpenFileError::Device(DeviceError::Rejected { ref command, .. }) if command == "sample_rate 1000"
        ));
        // the host did open it, so it still has to be closed
        assert!(state.data_file_open);
        assert_eq!(link.open_file_name().map(|f| f.as_str()), Some("T1_ab.edf"));

        session.close_file(&mut link, &mut state).unwrap();
        assert!(!state.data_file_open);
        assert!(link.open_file_name().is_none());
    }

    #[test]
    fn failed_close_can_be_retried() {
        let (mut session, mut link, mut state) = setup(EyeSelection::Both);
        let geometry = DisplayGeometry::new(800.0, 600.0, CoordinateConvention::TopLeft);
        session.open_file(&mut link, &mut state, "ab", &geometry).unwrap();

        link.host_mut().connected = false;
        assert!(session.close_file(&mut link, &mut state).is_err());
        assert!(state.data_file_open);
        assert!(link.open_file_name().is_some());

        link.host_mut().connected = true;
        session.close_file(&mut link, &mut state).unwrap();
        assert!(!state.data_file_open);
        let closes = link
            .host()
            .calls()
            .iter()
            .filter(|c| matches!(c, HostCall::CloseDataFile))
            .count();
        assert_eq!(closes, 1);
    }

    #[test]
    fn download_without_file_is_an_error() {
        let (mut session, mut link, mut state) = setup(EyeSelection::Both);
        let dir = std::env::temp_dir();
        assert!(matches!(
            session.close_and_download(&mut link, &mut state, &dir),
            Err(TransferError::NoFile)
        ));
    }
}
