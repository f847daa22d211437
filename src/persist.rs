//! Persisted calibration state (spec §6 "Persisted state (calibration
//! file)"), serialized with `serde`/`serde_json` — the same small
//! config/state record pattern `art-den-astra_lite` uses for its saved
//! options.

use crate::calibration::Calibration;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub ra_angle: f64,
    pub dec_angle: f64,
    pub ra_rate: f64,
    pub dec_rate: f64,
    pub cal_duration_ms: u32,
    pub schema_version: u32,
}

impl CalibrationRecord {
    pub fn from_calibration(cal: &Calibration, cal_duration_ms: u32) -> Self {
        CalibrationRecord {
            ra_angle: cal.ra_angle,
            dec_angle: cal.dec_angle,
            ra_rate: cal.ra_rate,
            dec_rate: cal.dec_rate,
            cal_duration_ms,
            schema_version: SCHEMA_VERSION,
        }
    }

    /// `None` if the record doesn't match the schema this build expects —
    /// the caller treats that as "no calibration available", not an error.
    pub fn into_calibration(self) -> Option<Calibration> {
        if self.schema_version != SCHEMA_VERSION {
            return None;
        }
        Some(Calibration::new(self.ra_angle, self.dec_angle, self.ra_rate, self.dec_rate))
    }
}

pub fn save(path: &Path, record: &CalibrationRecord) -> io::Result<()> {
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(path, json)
}

/// Loads a calibration record from disk. A missing file, unreadable JSON, or
/// schema mismatch all yield `None` rather than propagating an error — the
/// guider simply starts uncalibrated in those cases.
pub fn load(path: &Path) -> Option<Calibration> {
    let text = std::fs::read_to_string(path).ok()?;
    let record: CalibrationRecord = serde_json::from_str(&text).ok()?;
    record.into_calibration()
}
