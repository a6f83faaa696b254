mod common;

use common::{RecordingRender, ScriptedInput};
use elink_core::{OperatorKey as K, RenderPort, SessionStatusCode};
use elink_link::{DeviceLink, SimConfig, SimulatedHost};
use elink_session::{Connector, Progress, SessionConfig, SetupEntry, SetupPhase};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn simulated(seed: u64) -> Connector<SimulatedHost<StdRng>> {
    let config = SessionConfig {
        prefix: "S1".into(),
        download_dir: std::env::temp_dir().join(format!("elink-sim-{seed}-{}", std::process::id())),
        ..SessionConfig::default()
    };
    let host = SimulatedHost::with_rng(SimConfig::default(), StdRng::seed_from_u64(seed));
    let link = DeviceLink::with_host(host, &config.host, &config.prefix);
    Connector::new(link, config, RecordingRender::new().display_geometry()).unwrap()
}

fn spaces(input: ScriptedInput, n: usize) -> ScriptedInput {
    (0..n).fold(input, |input, _| input.then(&[K::Space]))
}

#[test]
fn full_session_against_simulated_host() {
    let mut c = simulated(11);
    c.open_file("run").unwrap();
    assert_eq!(c.link().host().coords(), [0.0, 0.0, 1023.0, 767.0]);

    let mut render = RecordingRender::new();
    let input = ScriptedInput::new().then(&[K::C]);
    let input = spaces(input, 9).then(&[K::Enter]).then(&[K::V]);
    let mut input = spaces(input, 9).then(&[K::Enter]).then(&[K::Q]);

    c.begin_setup(SetupEntry::Menu).unwrap();
    let mut outcome = None;
    for _ in 0..40 {
        if let Progress::Finished(status) = c.tick(&mut render, &mut input).unwrap() {
            outcome = Some(status);
            break;
        }
    }

    assert_eq!(outcome, Some(SessionStatusCode::Success));
    assert!(c.calibrated());
    assert!(c.link().host().is_calibrated());
    assert!(c.state().validation_status.is_terminal());
    let (avg, max) = c.state().validation_error.expect("validation error parsed");
    assert!(avg > 0.0 && max > avg);

    c.start_recording("trial-1").unwrap();
    let reading = c.eye_sample().unwrap();
    assert!(reading.left().is_some() && reading.right().is_some());
    c.stop_recording().unwrap();

    let path = c.close_and_download().unwrap();
    let payload = std::fs::read_to_string(&path).unwrap();
    assert!(payload.contains("START OF TRIAL trial-1"));
    assert!(payload.contains("END OF TRIAL trial-1"));
    assert!(payload.contains("DISPLAY_COORDS 0 0 1023 767"));

    c.close().unwrap();
    let _ = std::fs::remove_dir_all(c.config().download_dir.clone());
}

#[test]
fn calibration_targets_stay_inside_the_configured_area() {
    let mut c = simulated(3);
    c.open_file("area").unwrap();
    let mut render = RecordingRender::new();
    let mut input = spaces(ScriptedInput::new(), 8);

    c.begin_setup(SetupEntry::Calibration).unwrap();
    for _ in 0..9 {
        c.tick(&mut render, &mut input).unwrap();
    }
    assert_eq!(c.setup().phase(), &SetupPhase::Calibrating);

    for drawn in &render.drawn {
        if let common::Drawn::Target { x, y, visible: true } = drawn {
            assert!((255.0..=768.0).contains(x), "x {x}");
            assert!((191.0..=576.0).contains(y), "y {y}");
        }
    }
}

#[test]
fn aborted_direct_drift_returns_aborted() {
    let mut c = simulated(5);
    c.open_file("drift").unwrap();
    let mut render = RecordingRender::new();
    let mut input = ScriptedInput::new().then(&[K::Escape]);

    c.begin_setup(SetupEntry::DriftCorrection { direct_return: true }).unwrap();
    assert_eq!(
        c.tick(&mut render, &mut input).unwrap(),
        Progress::Finished(SessionStatusCode::Aborted)
    );
}
