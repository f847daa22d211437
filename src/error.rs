//! Uniform error taxonomy (spec §7). Every fallible operation in this crate
//! returns `Result<T, PhdError>`; there is no throw-to-exit control flow.

use thiserror::Error;

/// Why a calibration run aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationReason {
    /// The star didn't move far enough within `MAX_CALIBRATION_STEPS` pulses.
    NotMoved,
    /// Dec backlash could not be cleared within the allotted step budget.
    BacklashStuck,
    /// Calibration was aborted for some other reason (camera/mount failure,
    /// explicit cancellation).
    Aborted,
}

/// Why the star finder considers the star lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StarLossReason {
    NearEdge,
    LowSnr,
    LowMass,
    MassChange,
    Error,
}

#[derive(Debug, Error)]
pub enum PhdError {
    #[error("not connected: {0}")]
    NotConnected(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("camera failure: {0}")]
    CameraFailure(String),

    #[error("mount failure: {0}")]
    MountFailure(String),

    #[error("calibration failed ({reason:?}): {detail}")]
    CalibrationFailed {
        reason: CalibrationReason,
        detail: String,
    },

    #[error("star lost ({reason:?}): {detail}")]
    StarLost {
        reason: StarLossReason,
        detail: String,
    },

    #[error("illegal state transition: {0}")]
    IllegalStateTransition(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("cancelled: {0}")]
    Cancelled(String),
}

pub type PhdResult<T> = Result<T, PhdError>;
