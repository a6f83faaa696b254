use crate::config::SessionConfig;
use crate::error::ConnectError;
use crate::recording::RecordingSession;
use crate::setup::{Effect, Screen, SetupEntry, SetupEvent, SetupMachine};
use elink_core::{
    DisplayGeometry, EyeSelection, GazeReading, HostKey, InputPort, OperatorKey, Procedure, RenderPort, SampleModel,
    SessionState, SessionStatusCode,
};
use elink_link::{Connect, DeviceError, DeviceLink, EdfFileName, LinkError, OpenFileError, TrackerHost, TransferError};
use elink_timing::{FramePacer, Timer};
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Running,
    /// Setup returned control to the caller with this status.
    Finished(SessionStatusCode),
}

fn eye_key(eye: EyeSelection) -> HostKey {
    match eye {
        EyeSelection::Both => HostKey::B,
        EyeSelection::Left => HostKey::L,
        EyeSelection::Right => HostKey::R,
    }
}

/// One tracker session: the link, its state, the recording lifecycle and the
/// setup workflow. Drive setup either with [`Connector::run_setup`] or by
/// calling [`Connector::tick`] once per rendered frame.
pub struct Connector<H: TrackerHost> {
    link: DeviceLink<H>,
    config: SessionConfig,
    state: SessionState,
    recording: RecordingSession,
    setup: SetupMachine,
    model: SampleModel,
}

impl<H: Connect> Connector<H> {
    pub fn connect(config: SessionConfig, geometry: DisplayGeometry) -> Result<Self, ConnectError> {
        let link = DeviceLink::connect(&config.host, &config.prefix)?;
        Ok(Self::new(link, config, geometry)?)
    }
}

impl<H: TrackerHost> Connector<H> {
    /// Takes over a connected link and selects the tracked eye on the host.
    pub fn new(mut link: DeviceLink<H>, config: SessionConfig, geometry: DisplayGeometry) -> Result<Self, DeviceError> {
        link.start_setup()?;
        link.press(eye_key(config.eye))?;
        info!(eye = %config.eye, width = geometry.width, height = geometry.height, "tracker session ready");

        Ok(Self {
            recording: RecordingSession::new(&config),
            setup: SetupMachine::new(config.calibration.clone(), geometry),
            model: SampleModel::new(config.eye, geometry.size()),
            state: SessionState::new(),
            config,
            link,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn link(&self) -> &DeviceLink<H> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut DeviceLink<H> {
        &mut self.link
    }

    pub fn setup(&self) -> &SetupMachine {
        &self.setup
    }

    pub fn calibrated(&self) -> bool {
        self.state.calibrated()
    }

    pub fn validated(&self) -> bool {
        self.state.validated()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_recording()
    }

    pub fn open_file(&mut self, name: &str) -> Result<EdfFileName, OpenFileError> {
        let geometry = self.setup.geometry();
        self.recording.open_file(&mut self.link, &mut self.state, name, &geometry)
    }

    pub fn close_file(&mut self) -> Result<(), DeviceError> {
        self.recording.close_file(&mut self.link, &mut self.state)
    }

    /// Closes the data file and downloads it into the configured directory.
    pub fn close_and_download(&mut self) -> Result<PathBuf, TransferError> {
        let dir = self.config.download_dir.clone();
        self.recording.close_and_download(&mut self.link, &mut self.state, &dir)
    }

    pub fn start_recording(&mut self, message: &str) -> Result<(), DeviceError> {
        self.recording.start_recording(&mut self.link, &self.state, message)
    }

    pub fn stop_recording(&mut self) -> Result<(), DeviceError> {
        self.recording.stop_recording(&mut self.link)
    }

    /// Latest gaze for the selected eye(s); missing eyes read as the dummy sample.
    pub fn eye_sample(&mut self) -> Result<GazeReading, DeviceError> {
        let raw = self.link.poll_sample()?;
        Ok(self.model.read(raw.as_ref()))
    }

    /// Enters setup at `entry`.
    ///
    /// # Panics
    ///
    /// Without an open data file, or while setup is already running.
    pub fn begin_setup(&mut self, entry: SetupEntry) -> Result<(), DeviceError> {
        info!(?entry, "entering setup");
        let effects = self.setup.begin(entry, &mut self.state);
        let running = self.setup.phase().procedure();
        if let Err(err) = self.execute(effects) {
            self.recover(running, err)?;
        }
        Ok(())
    }

    /// One frame of setup: drains operator keys, polls the host while a
    /// procedure runs and draws the current screen. Keys are handled before
    /// the polls, so an abort always wins over a result arriving the same tick.
    ///
    /// A device error inside a procedure marks it failed and is not returned;
    /// outside one it is.
    pub fn tick<R: RenderPort, I: InputPort>(&mut self, render: &mut R, input: &mut I) -> Result<Progress, DeviceError> {
        let running = self.setup.phase().procedure();
        let keys: Vec<OperatorKey> = input.drain_keys().collect();
        if let Err(err) = self.step(&keys) {
            self.recover(running, err)?;
        }
        self.draw(render);
        Ok(self.progress())
    }

    pub fn progress(&self) -> Progress {
        match self.setup.outcome(&self.state) {
            Some(status) => Progress::Finished(status),
            None => Progress::Running,
        }
    }

    /// Blocking setup loop: tick, present and pace at `render_fps` until the
    /// operator leaves setup. Returns the outcome status.
    pub fn run_setup<R, I, T>(
        &mut self,
        entry: SetupEntry,
        render: &mut R,
        input: &mut I,
        timer: &mut T,
    ) -> anyhow::Result<SessionStatusCode>
    where
        R: RenderPort,
        I: InputPort,
        T: Timer,
    {
        self.begin_setup(entry)?;
        let pacer = FramePacer::new(self.config.render_fps);
        loop {
            let frame_start = timer.now();
            let progress = self.tick(render, input)?;
            render.present()?;
            if let Progress::Finished(status) = progress {
                let stats = timer.frame_stats();
                info!(
                    %status,
                    frames = stats.frames,
                    fps = stats.effective_fps,
                    jitter_ms = stats.jitter_ns / 1e6,
                    "setup finished"
                );
                return Ok(status);
            }
            pacer.finish_frame(timer, frame_start);
        }
    }

    /// Closes any open file, sets the host offline and drops the connection.
    /// The session state does not outlive the connection.
    pub fn close(&mut self) -> Result<(), LinkError> {
        let result = self.link.disconnect();
        self.state = SessionState::new();
        result
    }

    fn step(&mut self, keys: &[OperatorKey]) -> Result<(), DeviceError> {
        for &key in keys {
            debug!(?key, "operator key");
            let effects = self.setup.handle(SetupEvent::Key(key), &mut self.state);
            self.execute(effects)?;
        }

        if self.setup.polls_status() {
            let target = if self.setup.polls_target() {
                Some(self.link.poll_target()?)
            } else {
                None
            };
            let status = self.link.poll_status()?;
            let message = if status.is_terminal() {
                Some(self.link.result_message()?)
            } else {
                None
            };
            let effects = self.setup.handle(
                SetupEvent::Polled {
                    target,
                    status,
                    message,
                },
                &mut self.state,
            );
            self.execute(effects)?;
        }
        Ok(())
    }

    fn recover(&mut self, running: Option<Procedure>, err: DeviceError) -> Result<(), DeviceError> {
        match self.setup.phase().procedure().or(running) {
            Some(procedure) => {
                self.setup.fault(procedure, &err, &mut self.state);
                Ok(())
            }
            None => Err(err),
        }
    }

    fn execute(&mut self, effects: Vec<Effect>) -> Result<(), DeviceError> {
        for effect in effects {
            match effect {
                Effect::Press(key) => self.link.press(key)?,
                Effect::StartSetup => self.link.start_setup()?,
                Effect::SetOffline => self.link.set_offline()?,
                Effect::SetCalibrationType(kind) => self.link.set_calibration_type(&kind)?,
                Effect::Command(command) => self.link.command(&command)?,
                Effect::AcceptFixationWith(key) => self.link.set_accept_fixation_key(key)?,
                Effect::StartDriftCorrect { x, y } => self.link.start_drift_correct(x, y)?,
                Effect::ApplyDriftCorrect => self.link.apply_drift_correct()?,
            }
        }
        Ok(())
    }

    fn draw<R: RenderPort>(&self, render: &mut R) {
        match self.setup.screen(&self.state) {
            Screen::Blank => render.draw_status_text(""),
            Screen::Text(text) => render.draw_status_text(&text),
            Screen::Target(target) => render.draw_target(target.x, target.y, target.visible),
        }
    }
}
