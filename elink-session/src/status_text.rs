//! Operator-facing screens shown between procedures.

use elink_core::{SessionState, SessionStatusCode};

fn re(status: SessionStatusCode) -> &'static str {
    if status.is_terminal() { "(re)" } else { "" }
}

/// Status screen. Built from the state passed in, so it always reflects the
/// latest outcomes.
pub fn menu(state: &SessionState, notice: &str) -> String {
    let error = match state.validation_error {
        Some((avg, max)) => format!(" - avg. error: {avg:.2}° (max {max:.2}°)"),
        None => String::new(),
    };
    format!(
        "STATUS:\n\
         > {notice}\n\
         \n\
         Calibration: {}\n\
         Validation: {}{error}\n\
         \n\
         Press C to {}calibrate.\n\
         Press V to {}validate.\n\
         Press D to drift correct.\n\
         Press Q/ENTER to quit setup and continue.\n\
         \n\
         Use SPACE to manually accept a fixation.",
        state.calibration_status.label(),
        state.validation_status.label(),
        re(state.calibration_status),
        re(state.validation_status),
    )
}

pub fn calibration_review(status: SessionStatusCode, message: &str) -> String {
    format!(
        "Calibration {}\n\
         > {message}\n\
         Press ENTER to accept the calibration and continue.\n\
         Press C to calibrate again.\n\
         Press V to validate.\n\
         Press BACKSPACE/DELETE to discard the calibration.",
        status.label()
    )
}

pub fn validation_review(status: SessionStatusCode, message: &str) -> String {
    format!(
        "Validation {}\n\
         > {message}\n\
         Press ENTER to accept the validation and continue.\n\
         Press V to validate again.\n\
         Press BACKSPACE/DELETE to discard the validation.",
        status.label()
    )
}
