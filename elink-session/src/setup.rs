//! Calibrate / validate / drift-correct workflow as a pure transition table.
//!
//! [`SetupMachine`] never touches the host. Each event moves it to its next
//! phase, updates the [`SessionState`] and returns the host effects the
//! driver must carry out, in order. The blocking loop and the window-event
//! dispatcher feed it the same events.

use crate::config::CalibrationConfig;
use crate::status_text;
use crate::validation::parse_validation_error;
use elink_core::{DisplayGeometry, HostKey, OperatorKey, Procedure, SessionState, SessionStatusCode, TargetState};
use elink_link::DeviceError;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupEntry {
    /// Status screen first.
    Menu,
    /// Straight into calibration; the status screen follows.
    Calibration,
    /// With `direct_return` the drift outcome ends setup instead of showing
    /// the status screen.
    DriftCorrection { direct_return: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetupPhase {
    Idle,
    Menu,
    Calibrating,
    Validating,
    DriftCorrecting,
    CalibrationReview { message: String },
    ValidationReview { message: String },
    Done,
}

impl SetupPhase {
    /// The host procedure running in this phase, if any.
    pub fn procedure(&self) -> Option<Procedure> {
        match self {
            SetupPhase::Calibrating => Some(Procedure::Calibration),
            SetupPhase::Validating => Some(Procedure::Validation),
            SetupPhase::DriftCorrecting => Some(Procedure::DriftCorrection),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, SetupPhase::Idle | SetupPhase::Done)
    }
}

/// Host operation requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Press/release pair of a virtual key.
    Press(HostKey),
    StartSetup,
    SetOffline,
    SetCalibrationType(String),
    Command(String),
    AcceptFixationWith(HostKey),
    StartDriftCorrect { x: i32, y: i32 },
    ApplyDriftCorrect,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetupEvent {
    Key(OperatorKey),
    /// Result of one tick's polls. `target` is absent when the phase does
    /// not track the host target; `message` accompanies terminal statuses.
    Polled {
        target: Option<TargetState>,
        status: SessionStatusCode,
        message: Option<String>,
    },
}

/// What the current phase wants on screen.
#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    Blank,
    Text(String),
    Target(TargetState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriftReturn {
    Menu,
    Caller,
}

#[derive(Debug, Clone)]
pub struct SetupMachine {
    calibration: CalibrationConfig,
    geometry: DisplayGeometry,
    phase: SetupPhase,
    drift_return: DriftReturn,
    target: TargetState,
    notice: String,
    /// Whose status is reported once `Done`.
    reported: Procedure,
}

impl SetupMachine {
    pub fn new(calibration: CalibrationConfig, geometry: DisplayGeometry) -> Self {
        Self {
            calibration,
            geometry,
            phase: SetupPhase::Idle,
            drift_return: DriftReturn::Menu,
            target: TargetState::hidden(),
            notice: String::new(),
            reported: Procedure::Calibration,
        }
    }

    pub fn phase(&self) -> &SetupPhase {
        &self.phase
    }

    pub fn geometry(&self) -> DisplayGeometry {
        self.geometry
    }

    pub fn is_done(&self) -> bool {
        self.phase == SetupPhase::Done
    }

    /// Last action message shown on the status screen.
    pub fn notice(&self) -> &str {
        &self.notice
    }

    /// Status handed back to the caller once setup is done: the drift status
    /// after a direct-return drift correction, the calibration status otherwise.
    pub fn outcome(&self, state: &SessionState) -> Option<SessionStatusCode> {
        self.is_done().then(|| state.status(self.reported))
    }

    /// Whether the driver should poll the host status this tick.
    pub fn polls_status(&self) -> bool {
        self.phase.procedure().is_some()
    }

    /// Whether the driver should poll the host target this tick.
    pub fn polls_target(&self) -> bool {
        matches!(self.phase, SetupPhase::Calibrating | SetupPhase::Validating)
    }

    /// Enters setup.
    ///
    /// # Panics
    ///
    /// Without an open data file, or while setup is already running.
    pub fn begin(&mut self, entry: SetupEntry, state: &mut SessionState) -> Vec<Effect> {
        assert!(state.data_file_open, "setup requires an open data file");
        assert!(!self.phase.is_active(), "setup is already running ({:?})", self.phase);

        self.notice.clear();
        self.drift_return = DriftReturn::Menu;
        self.reported = Procedure::Calibration;
        match entry {
            SetupEntry::Menu => {
                self.enter(SetupPhase::Menu);
                vec![Effect::StartSetup]
            }
            SetupEntry::Calibration => self.calibrate(state),
            SetupEntry::DriftCorrection { direct_return } => {
                if direct_return {
                    self.drift_return = DriftReturn::Caller;
                }
                self.drift_correct(state)
            }
        }
    }

    pub fn handle(&mut self, event: SetupEvent, state: &mut SessionState) -> Vec<Effect> {
        match event {
            SetupEvent::Key(key) => self.on_key(key, state),
            SetupEvent::Polled {
                target,
                status,
                message,
            } => self.on_poll(target, status, message, state),
        }
    }

    /// A host call failed while `procedure` was running. Marks it failed and
    /// lands where its outcome would have been shown.
    pub fn fault(&mut self, procedure: Procedure, error: &DeviceError, state: &mut SessionState) {
        warn!(procedure = procedure.name(), %error, "procedure failed on a device error");
        state.set_status(procedure, SessionStatusCode::Failed);
        match procedure {
            Procedure::Calibration => self.enter(SetupPhase::CalibrationReview {
                message: error.to_string(),
            }),
            Procedure::Validation => self.enter(SetupPhase::ValidationReview {
                message: error.to_string(),
            }),
            Procedure::DriftCorrection => self.leave_drift(format!("Drift correction failed: {error}.")),
        }
    }

    pub fn screen(&self, state: &SessionState) -> Screen {
        match &self.phase {
            SetupPhase::Idle | SetupPhase::Done => Screen::Blank,
            SetupPhase::Menu => Screen::Text(status_text::menu(state, &self.notice)),
            SetupPhase::Calibrating | SetupPhase::Validating | SetupPhase::DriftCorrecting => {
                Screen::Target(self.target)
            }
            SetupPhase::CalibrationReview { message } => {
                Screen::Text(status_text::calibration_review(state.calibration_status, message))
            }
            SetupPhase::ValidationReview { message } => {
                Screen::Text(status_text::validation_review(state.validation_status, message))
            }
        }
    }

    fn enter(&mut self, next: SetupPhase) {
        info!(from = ?self.phase, to = ?next, "setup transition");
        self.phase = next;
    }

    fn to_menu(&mut self, notice: &str) {
        self.notice = notice.to_string();
        self.enter(SetupPhase::Menu);
    }

    fn calibrate(&mut self, state: &mut SessionState) -> Vec<Effect> {
        state.calibration_status = SessionStatusCode::InProgress;
        self.target = TargetState::hidden();
        self.enter(SetupPhase::Calibrating);

        let cal = &self.calibration;
        vec![
            Effect::StartSetup,
            Effect::SetCalibrationType(cal.kind.clone()),
            Effect::Command(format!(
                "calibration_area_proportion = {} {}",
                cal.calibration_area.0, cal.calibration_area.1
            )),
            Effect::Command(format!(
                "validation_area_proportion = {} {}",
                cal.validation_area.0, cal.validation_area.1
            )),
            Effect::Press(HostKey::C),
            Effect::AcceptFixationWith(cal.accept_key),
        ]
    }

    fn validate(&mut self, state: &mut SessionState) -> Vec<Effect> {
        state.validation_status = SessionStatusCode::InProgress;
        state.validation_error = None;
        self.target = TargetState::hidden();
        self.enter(SetupPhase::Validating);
        vec![Effect::Press(HostKey::V), Effect::AcceptFixationWith(self.calibration.accept_key)]
    }

    fn drift_correct(&mut self, state: &mut SessionState) -> Vec<Effect> {
        state.drift_status = SessionStatusCode::InProgress;
        let (cx, cy) = self.geometry.center();
        self.target = TargetState::shown(cx, cy);
        self.enter(SetupPhase::DriftCorrecting);

        let (x, y) = self.geometry.half_extents();
        vec![Effect::StartDriftCorrect { x, y }]
    }

    fn leave_drift(&mut self, notice: String) {
        match self.drift_return {
            DriftReturn::Menu => self.to_menu(&notice),
            DriftReturn::Caller => {
                self.notice = notice;
                self.reported = Procedure::DriftCorrection;
                self.enter(SetupPhase::Done);
            }
        }
    }

    fn abort(&mut self, procedure: Procedure, state: &mut SessionState) -> Vec<Effect> {
        state.set_status(procedure, SessionStatusCode::Aborted);
        match procedure {
            Procedure::DriftCorrection => self.leave_drift("Drift correction aborted.".into()),
            _ => self.to_menu(&format!("{} was aborted.", procedure.name())),
        }
        vec![Effect::Press(HostKey::Escape), Effect::StartSetup]
    }

    fn on_key(&mut self, key: OperatorKey, state: &mut SessionState) -> Vec<Effect> {
        use OperatorKey as K;
        use SetupPhase as P;

        match (self.phase.clone(), key) {
            (P::Menu, K::C) => self.calibrate(state),
            (P::Menu, K::V) => self.validate(state),
            (P::Menu, K::D) => {
                self.drift_return = DriftReturn::Menu;
                self.drift_correct(state)
            }
            (P::Menu, K::Q | K::Enter) => {
                self.reported = Procedure::Calibration;
                self.enter(P::Done);
                vec![Effect::SetOffline]
            }

            (P::Calibrating | P::Validating | P::DriftCorrecting, K::Space) => vec![Effect::Press(HostKey::Space)],
            (P::Calibrating | P::Validating, K::Backspace) => vec![Effect::Press(HostKey::Backspace)],
            (P::Calibrating, k) if k.is_abort() => self.abort(Procedure::Calibration, state),
            (P::Validating, k) if k.is_abort() => self.abort(Procedure::Validation, state),
            (P::DriftCorrecting, k) if k.is_abort() => self.abort(Procedure::DriftCorrection, state),

            (P::CalibrationReview { .. }, K::Enter) => {
                self.to_menu("Calibration accepted.");
                vec![Effect::Press(HostKey::Enter)]
            }
            (P::CalibrationReview { .. }, K::C) => {
                let mut effects = vec![Effect::Press(HostKey::Delete)];
                effects.extend(self.calibrate(state));
                effects
            }
            (P::CalibrationReview { .. }, K::V) => self.validate(state),
            (P::CalibrationReview { .. }, K::Backspace | K::Delete) => {
                state.calibration_status = SessionStatusCode::InProgress;
                self.to_menu("Calibration discarded.");
                vec![Effect::Press(HostKey::Escape)]
            }

            (P::ValidationReview { message }, K::Enter) => {
                state.validation_error = match parse_validation_error(&message) {
                    Ok(error) => Some(error),
                    Err(err) => {
                        warn!(%err, "validation accepted without an error estimate");
                        None
                    }
                };
                self.to_menu("Validation accepted.");
                vec![Effect::Press(HostKey::Enter)]
            }
            (P::ValidationReview { .. }, K::V) => {
                let mut effects = vec![Effect::Press(HostKey::Delete)];
                effects.extend(self.validate(state));
                effects
            }
            (P::ValidationReview { .. }, K::Backspace | K::Delete) => {
                state.validation_status = SessionStatusCode::InProgress;
                self.to_menu("Validation discarded.");
                vec![Effect::Press(HostKey::Escape)]
            }

            _ => Vec::new(),
        }
    }

    fn on_poll(
        &mut self,
        target: Option<TargetState>,
        status: SessionStatusCode,
        message: Option<String>,
        state: &mut SessionState,
    ) -> Vec<Effect> {
        let Some(procedure) = self.phase.procedure() else {
            return Vec::new();
        };
        if let Some(target) = target.filter(|_| self.polls_target()) {
            self.target = target;
        }
        if !status.is_terminal() {
            return Vec::new();
        }

        let message = message.unwrap_or_default();
        state.set_status(procedure, status);
        info!(procedure = procedure.name(), %status, %message, "procedure finished on host");

        match procedure {
            Procedure::Calibration => {
                self.enter(SetupPhase::CalibrationReview { message });
                Vec::new()
            }
            Procedure::Validation => {
                self.enter(SetupPhase::ValidationReview { message });
                Vec::new()
            }
            Procedure::DriftCorrection if status == SessionStatusCode::Aborted => {
                self.leave_drift("Drift correction aborted.".into());
                vec![Effect::StartSetup]
            }
            Procedure::DriftCorrection => {
                self.leave_drift("Drift correction applied.".into());
                vec![Effect::ApplyDriftCorrect, Effect::StartSetup]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elink_core::CoordinateConvention;

    fn machine() -> (SetupMachine, SessionState) {
        let geometry = DisplayGeometry::new(1920.0, 1080.0, CoordinateConvention::TopLeft);
        let mut state = SessionState::new();
        state.data_file_open = true;
        (SetupMachine::new(CalibrationConfig::default(), geometry), state)
    }

    fn key(m: &mut SetupMachine, s: &mut SessionState, k: OperatorKey) -> Vec<Effect> {
        m.handle(SetupEvent::Key(k), s)
    }

    fn finished(m: &mut SetupMachine, s: &mut SessionState, status: SessionStatusCode, msg: &str) -> Vec<Effect> {
        m.handle(
            SetupEvent::Polled {
                target: None,
                status,
                message: Some(msg.into()),
            },
            s,
        )
    }

    #[test]
    fn calibration_entry_configures_host() {
        let (mut m, mut s) = machine();
        let effects = m.begin(SetupEntry::Calibration, &mut s);
        assert_eq!(
            effects,
            vec![
                Effect::StartSetup,
                Effect::SetCalibrationType("HV9".into()),
                Effect::Command("calibration_area_proportion = 0.5 0.5".into()),
                Effect::Command("validation_area_proportion = 0.5 0.5".into()),
                Effect::Press(HostKey::C),
                Effect::AcceptFixationWith(HostKey::Space),
            ]
        );
        assert_eq!(m.phase(), &SetupPhase::Calibrating);
        assert!(m.polls_target());
    }

    #[test]
    #[should_panic(expected = "requires an open data file")]
    fn begin_without_file_panics() {
        let (mut m, mut s) = machine();
        s.data_file_open = false;
        m.begin(SetupEntry::Menu, &mut s);
    }

    #[test]
    #[should_panic(expected = "already running")]
    fn begin_twice_panics() {
        let (mut m, mut s) = machine();
        m.begin(SetupEntry::Menu, &mut s);
        m.begin(SetupEntry::Calibration, &mut s);
    }

    #[test]
    fn menu_ignores_unrelated_keys() {
        let (mut m, mut s) = machine();
        m.begin(SetupEntry::Menu, &mut s);
        for k in [OperatorKey::Space, OperatorKey::Escape, OperatorKey::Backspace, OperatorKey::Other] {
            assert!(key(&mut m, &mut s, k).is_empty());
            assert_eq!(m.phase(), &SetupPhase::Menu);
        }
    }

    #[test]
    fn target_follows_polls_while_calibrating() {
        let (mut m, mut s) = machine();
        m.begin(SetupEntry::Calibration, &mut s);
        m.handle(
            SetupEvent::Polled {
                target: Some(TargetState::shown(100.0, 200.0)),
                status: SessionStatusCode::InProgress,
                message: None,
            },
            &mut s,
        );
        assert_eq!(m.screen(&s), Screen::Target(TargetState::shown(100.0, 200.0)));
        assert_eq!(s.calibration_status, SessionStatusCode::InProgress);
    }

    #[test]
    fn terminal_poll_opens_review_with_message() {
        let (mut m, mut s) = machine();
        m.begin(SetupEntry::Calibration, &mut s);
        finished(&mut m, &mut s, SessionStatusCode::PoorResult, "calibration: HV9 POOR");

        assert_eq!(s.calibration_status, SessionStatusCode::PoorResult);
        assert_eq!(
            m.phase(),
            &SetupPhase::CalibrationReview {
                message: "calibration: HV9 POOR".into()
            }
        );
        let Screen::Text(text) = m.screen(&s) else {
            panic!("review shows text");
        };
        assert!(text.starts_with("Calibration failed (poor result)"));
    }

    #[test]
    fn abort_key_sets_aborted_and_returns_to_menu() {
        let (mut m, mut s) = machine();
        m.begin(SetupEntry::Calibration, &mut s);
        let effects = key(&mut m, &mut s, OperatorKey::Q);
        assert_eq!(effects, vec![Effect::Press(HostKey::Escape), Effect::StartSetup]);
        assert_eq!(s.calibration_status, SessionStatusCode::Aborted);
        assert_eq!(m.phase(), &SetupPhase::Menu);
        assert_eq!(m.notice(), "Calibration was aborted.");
        assert!(!m.polls_status());
    }

    #[test]
    fn review_v_goes_straight_to_validation() {
        let (mut m, mut s) = machine();
        m.begin(SetupEntry::Calibration, &mut s);
        finished(&mut m, &mut s, SessionStatusCode::Success, "ok");
        let effects = key(&mut m, &mut s, OperatorKey::V);
        assert_eq!(
            effects,
            vec![Effect::Press(HostKey::V), Effect::AcceptFixationWith(HostKey::Space)]
        );
        assert_eq!(m.phase(), &SetupPhase::Validating);
        assert_eq!(s.calibration_status, SessionStatusCode::Success);
    }

    #[test]
    fn discarding_calibration_resets_status() {
        let (mut m, mut s) = machine();
        m.begin(SetupEntry::Calibration, &mut s);
        finished(&mut m, &mut s, SessionStatusCode::Success, "ok");
        assert_eq!(key(&mut m, &mut s, OperatorKey::Delete), vec![Effect::Press(HostKey::Escape)]);
        assert_eq!(s.calibration_status, SessionStatusCode::InProgress);
        assert_eq!(m.notice(), "Calibration discarded.");
    }

    #[test]
    fn accepted_validation_stores_error_pair() {
        let (mut m, mut s) = machine();
        m.begin(SetupEntry::Menu, &mut s);
        key(&mut m, &mut s, OperatorKey::V);
        finished(&mut m, &mut s, SessionStatusCode::Success, "validation: HV9 GOOD ERROR 0.31 avg. 0.72 max");
        key(&mut m, &mut s, OperatorKey::Enter);

        assert_eq!(s.validation_error, Some((0.31, 0.72)));
        let Screen::Text(text) = m.screen(&s) else {
            panic!("menu shows text");
        };
        assert!(text.contains("> Validation accepted."));
        assert!(text.contains("avg. error: 0.31°"));
    }

    #[test]
    fn unparsable_validation_message_still_accepts() {
        let (mut m, mut s) = machine();
        m.begin(SetupEntry::Menu, &mut s);
        key(&mut m, &mut s, OperatorKey::V);
        finished(&mut m, &mut s, SessionStatusCode::Success, "garbled");
        key(&mut m, &mut s, OperatorKey::Enter);
        assert_eq!(s.validation_error, None);
        assert_eq!(s.validation_status, SessionStatusCode::Success);
        assert_eq!(m.phase(), &SetupPhase::Menu);
    }

    #[test]
    fn revalidating_clears_stale_error() {
        let (mut m, mut s) = machine();
        s.validation_error = Some((2.0, 3.0));
        s.validation_status = SessionStatusCode::PoorResult;
        m.begin(SetupEntry::Menu, &mut s);
        key(&mut m, &mut s, OperatorKey::V);
        assert_eq!(s.validation_error, None);
        assert_eq!(s.validation_status, SessionStatusCode::InProgress);
    }

    #[test]
    fn drift_from_menu_applies_and_returns_to_menu() {
        let (mut m, mut s) = machine();
        m.begin(SetupEntry::Menu, &mut s);
        let effects = key(&mut m, &mut s, OperatorKey::D);
        assert_eq!(effects, vec![Effect::StartDriftCorrect { x: 960, y: 540 }]);
        assert_eq!(m.screen(&s), Screen::Target(TargetState::shown(960.0, 540.0)));
        assert!(!m.polls_target());

        let effects = finished(&mut m, &mut s, SessionStatusCode::Success, "drift_correct: 0.1 0.2 deg");
        assert_eq!(effects, vec![Effect::ApplyDriftCorrect, Effect::StartSetup]);
        assert_eq!(s.drift_status, SessionStatusCode::Success);
        assert_eq!(m.phase(), &SetupPhase::Menu);
        assert_eq!(m.notice(), "Drift correction applied.");
    }

    #[test]
    fn direct_drift_returns_to_caller() {
        let (mut m, mut s) = machine();
        m.begin(SetupEntry::DriftCorrection { direct_return: true }, &mut s);
        let effects = key(&mut m, &mut s, OperatorKey::Escape);
        assert_eq!(effects, vec![Effect::Press(HostKey::Escape), Effect::StartSetup]);
        assert!(m.is_done());
        assert_eq!(m.outcome(&s), Some(SessionStatusCode::Aborted));
    }

    #[test]
    fn host_side_drift_abort_skips_apply() {
        let (mut m, mut s) = machine();
        m.begin(SetupEntry::DriftCorrection { direct_return: false }, &mut s);
        let effects = finished(&mut m, &mut s, SessionStatusCode::Aborted, "");
        assert_eq!(effects, vec![Effect::StartSetup]);
        assert_eq!(m.phase(), &SetupPhase::Menu);
    }

    #[test]
    fn fault_marks_procedure_failed() {
        let (mut m, mut s) = machine();
        m.begin(SetupEntry::Calibration, &mut s);
        m.fault(Procedure::Calibration, &DeviceError::ConnectionLost, &mut s);
        assert_eq!(s.calibration_status, SessionStatusCode::Failed);
        assert!(matches!(m.phase(), SetupPhase::CalibrationReview { .. }));

        let (mut m, mut s) = machine();
        m.begin(SetupEntry::DriftCorrection { direct_return: true }, &mut s);
        finished(&mut m, &mut s, SessionStatusCode::Success, "");
        m.fault(Procedure::DriftCorrection, &DeviceError::ConnectionLost, &mut s);
        assert_eq!(m.outcome(&s), Some(SessionStatusCode::Failed));
    }

    #[test]
    fn quitting_menu_reports_calibration_status() {
        let (mut m, mut s) = machine();
        m.begin(SetupEntry::Calibration, &mut s);
        finished(&mut m, &mut s, SessionStatusCode::Success, "ok");
        key(&mut m, &mut s, OperatorKey::Enter);
        assert_eq!(key(&mut m, &mut s, OperatorKey::Q), vec![Effect::SetOffline]);
        assert_eq!(m.outcome(&s), Some(SessionStatusCode::Success));
        assert_eq!(m.screen(&s), Screen::Blank);

        // setup can run again once done
        m.begin(SetupEntry::Menu, &mut s);
        assert_eq!(m.phase(), &SetupPhase::Menu);
    }
}
