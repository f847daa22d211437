//! Test-only synthetic fixtures: a Gaussian-star image builder and fake
//! `Camera`/`MountBackend` implementations, reimagined in-process from the
//! mock hardware backends under PHD2's own test suite
//! (`original_source/.../tests/cpp/src/mounts/mocks/`) instead of porting
//! them file-for-file.

use crate::engine::Camera;
use crate::error::{PhdError, PhdResult};
use crate::image::{Image, Rect};
use crate::mount::{CompassDirection, MountBackend, MountCapabilities};
use std::sync::{Arc, Mutex};

/// A flat background with a single Gaussian star stamped at `(cx, cy)`.
pub fn star_image(w: u32, h: u32, cx: f64, cy: f64, peak: u16, bg: u16, sigma: f64) -> Image {
    let mut pixels = vec![bg; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            let g = (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
            let v = bg as f64 + (peak as f64 - bg as f64) * g;
            pixels[(y * w + x) as usize] = v.round().clamp(0.0, 65535.0) as u16;
        }
    }
    Image::new(w, h, pixels)
}

/// A camera that always returns the same star position and size, or an
/// error once `fail_after` successful captures have happened.
pub struct FakeCamera {
    pub w: u32,
    pub h: u32,
    pub star_x: f64,
    pub star_y: f64,
    pub captures: u32,
    pub fail_after: Option<u32>,
}

impl FakeCamera {
    pub fn steady(w: u32, h: u32, star_x: f64, star_y: f64) -> Self {
        FakeCamera { w, h, star_x, star_y, captures: 0, fail_after: None }
    }
}

impl Camera for FakeCamera {
    fn capture(&mut self, _exposure_ms: u32, _subframe: Option<Rect>) -> PhdResult<Image> {
        if let Some(limit) = self.fail_after {
            if self.captures >= limit {
                return Err(PhdError::CameraFailure("fake camera exhausted".to_string()));
            }
        }
        self.captures += 1;
        Ok(star_image(self.w, self.h, self.star_x, self.star_y, 5000, 100, 2.0))
    }

    fn full_size(&self) -> (u32, u32) {
        (self.w, self.h)
    }
}

/// A mount backend that records every pulse and, if configured, simulates
/// motion by nudging a shared star position — used to drive the
/// calibration state machine end to end without a real camera loop.
pub struct FakeMountBackend {
    pub pulses: Arc<Mutex<Vec<(CompassDirection, u32)>>>,
    pub px_per_ms: f64,
    pub star: Arc<Mutex<(f64, f64)>>,
}

impl FakeMountBackend {
    pub fn new(star: Arc<Mutex<(f64, f64)>>, px_per_ms: f64) -> Self {
        FakeMountBackend { pulses: Arc::new(Mutex::new(Vec::new())), px_per_ms, star }
    }
}

impl MountBackend for FakeMountBackend {
    fn connect(&mut self) -> PhdResult<()> {
        Ok(())
    }

    fn disconnect(&mut self) {}

    fn pulse(&mut self, dir: CompassDirection, ms: u32) -> PhdResult<()> {
        self.pulses.lock().unwrap().push((dir, ms));
        let distance = self.px_per_ms * ms as f64;
        let mut star = self.star.lock().unwrap();
        match dir {
            CompassDirection::East => star.0 += distance,
            CompassDirection::West => star.0 -= distance,
            CompassDirection::South => star.1 += distance,
            CompassDirection::North => star.1 -= distance,
        }
        Ok(())
    }

    fn capabilities(&self) -> MountCapabilities {
        MountCapabilities { has_nonui_move: true, reports_busy: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_image_peaks_near_the_requested_center() {
        let img = star_image(50, 50, 25.0, 25.0, 5000, 100, 2.0);
        assert!(img.get(25, 25) > img.get(0, 0));
    }

    #[test]
    fn fake_camera_fails_after_the_configured_count() {
        let mut cam = FakeCamera { fail_after: Some(2), ..FakeCamera::steady(20, 20, 10.0, 10.0) };
        assert!(cam.capture(100, None).is_ok());
        assert!(cam.capture(100, None).is_ok());
        assert!(cam.capture(100, None).is_err());
    }
}
