//! Plain value-object configuration structs, supplied at construction
//! (spec §6, DESIGN NOTES "Deep UI/config inheritance"). No GUI or
//! persistence logic lives here — just the typed knobs the rest of the
//! crate consumes, mirroring how `art-den-astra_lite/src/options/*.rs`'s
//! sibling `options/` module separates config shape from behavior.

use serde::{Deserialize, Serialize};

/// §4.1 star finder constants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StarFinderConfig {
    /// Search half-width in pixels around the seed position.
    pub search_radius: i64,
    /// Minimum integrated mass (threshold-subtracted intensity sum) to
    /// consider a candidate found.
    pub min_mass: f64,
    /// Minimum SNR to consider a candidate found.
    pub min_snr: f64,
}

impl Default for StarFinderConfig {
    fn default() -> Self {
        StarFinderConfig { search_radius: 15, min_mass: 10.0, min_snr: 3.0 }
    }
}

/// §4.4 calibration state machine constants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CalibrationConfig {
    pub cal_duration_ms: u32,
    pub max_calibration_steps: u32,
    pub dec_backlash_distance_px: f64,
    /// Upper bound on `dist_crit` (spec: `min(image_height * 0.05, 25px)`).
    pub max_dist_crit_px: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig {
            cal_duration_ms: 750,
            max_calibration_steps: 60,
            dec_backlash_distance_px: 3.0,
            max_dist_crit_px: 25.0,
        }
    }
}

/// Dec-axis guiding policy (spec §3 `MountState.dec_mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecMode {
    Off,
    Auto,
    NorthOnly,
    SouthOnly,
}

/// §4.5 per-axis move caps and Dec policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MountConfig {
    pub max_ra_ms: u32,
    pub max_dec_ms: u32,
    pub dec_mode: DecMode,
}

impl Default for MountConfig {
    fn default() -> Self {
        MountConfig { max_ra_ms: 2000, max_dec_ms: 2000, dec_mode: DecMode::Auto }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoiseReduction {
    None,
    Mean2x2,
    Median3x3,
}

/// §4.8/§6 engine/frame-loop configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EngineConfig {
    pub exposure_ms: u32,
    pub use_subframes: bool,
    pub time_lapse_ms: u32,
    pub noise_reduction: NoiseReduction,
    pub dither_scale: f64,
    pub dither_ra_only: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            exposure_ms: 2000,
            use_subframes: true,
            time_lapse_ms: 0,
            noise_reduction: NoiseReduction::None,
            dither_scale: 1.0,
            dither_ra_only: false,
        }
    }
}
