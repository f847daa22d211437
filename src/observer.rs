//! Injected notification sink for guiding events (spec §10), replacing the
//! global `GuidingLog`/`Debug` singletons the original source relies on.
//! Downstream code holds a `Box<dyn GuideObserver>`; nothing here ever talks
//! back up to its owner, avoiding the back-pointer cycles the original's
//! singleton loggers required.

use crate::calibration::Direction;
use crate::error::PhdError;
use crate::geometry::Point;
use std::sync::mpsc::Sender;

/// One event per notable occurrence during guiding. Implementors should not
/// block for long; `Engine`/`Guider` call these synchronously on the
/// controller thread.
pub trait GuideObserver: Send + Sync {
    fn star_found(&self, _position: Point, _mass: f64, _snr: f64) {}
    fn star_lost(&self, _error: &PhdError) {}
    fn calibration_step(&self, _direction: Direction, _step: u32, _distance_px: f64) {}
    fn move_issued(&self, _direction: Direction, _duration_ms: u32) {}
    fn state_transition(&self, _from: &str, _to: &str) {}
}

/// Discards every event; the default when no caller wants guiding history.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl GuideObserver for NullObserver {}

/// One observed event, as delivered through a `ChannelObserver`.
#[derive(Debug, Clone)]
pub enum GuideEvent {
    StarFound { position: Point, mass: f64, snr: f64 },
    StarLost { detail: String },
    CalibrationStep { direction: Direction, step: u32, distance_px: f64 },
    MoveIssued { direction: Direction, duration_ms: u32 },
    StateTransition { from: String, to: String },
}

/// Forwards every event over an `mpsc::Sender`, for a caller that wants to
/// persist or display guiding history out of band. A full or disconnected
/// channel silently drops the event rather than panicking the controller
/// thread.
pub struct ChannelObserver {
    tx: Sender<GuideEvent>,
}

impl ChannelObserver {
    pub fn new(tx: Sender<GuideEvent>) -> Self {
        ChannelObserver { tx }
    }
}

impl GuideObserver for ChannelObserver {
    fn star_found(&self, position: Point, mass: f64, snr: f64) {
        let _ = self.tx.send(GuideEvent::StarFound { position, mass, snr });
    }

    fn star_lost(&self, error: &PhdError) {
        let _ = self.tx.send(GuideEvent::StarLost { detail: error.to_string() });
    }

    fn calibration_step(&self, direction: Direction, step: u32, distance_px: f64) {
        let _ = self.tx.send(GuideEvent::CalibrationStep { direction, step, distance_px });
    }

    fn move_issued(&self, direction: Direction, duration_ms: u32) {
        let _ = self.tx.send(GuideEvent::MoveIssued { direction, duration_ms });
    }

    fn state_transition(&self, from: &str, to: &str) {
        let _ = self.tx.send(GuideEvent::StateTransition { from: from.to_string(), to: to.to_string() });
    }
}
