//! Engine / frame loop (spec §4.8, §6). Drives one exposure at a time,
//! routed through per-channel worker threads (spec §2: `schedule_exposure →
//! worker.capture → engine.on_image → guider.on_image → … → worker.pulse →
//! engine.on_move_done`), hands the result to the `Guider`, and issues any
//! resulting pulses to the mount(s). Grounded on `detect_engine.rs`'s
//! capture-then-process loop, generalized from star detection to the full
//! guiding cycle.

use crate::calibration::Direction;
use crate::config::EngineConfig;
use crate::error::{PhdError, PhdResult};
use crate::guider::{Guider, MountSelector};
use crate::image::{Image, Rect};
use crate::mount::Mount;
use crate::worker::{CameraWorkerService, MountWorkerService, Worker, WorkerRequest, WorkerResponse, WorkerSet};

/// External camera seam (spec §6). Lives on its own worker thread once
/// handed to an `Engine` (spec §5: captures never run on the controller
/// thread).
pub trait Camera: Send {
    fn capture(&mut self, exposure_ms: u32, subframe: Option<Rect>) -> PhdResult<Image>;
    fn full_size(&self) -> (u32, u32);
    fn has_shutter(&self) -> bool {
        false
    }
}

/// Half-width of the capture subframe drawn around the lock position, once
/// a star has actually been selected.
const SUBFRAME_HALF_WIDTH: i64 = 64;

fn subframe_around(lock: crate::geometry::Point, img_w: u32, img_h: u32, half: i64) -> Rect {
    let cx = (lock.x.round() as i64).clamp(half, img_w as i64 - half - 1);
    let cy = (lock.y.round() as i64).clamp(half, img_h as i64 - half - 1);
    Rect::new((cx - half) as u32, (cy - half) as u32, (half * 2) as u32, (half * 2) as u32)
}

pub struct Engine {
    camera_worker: Worker,
    full_size: (u32, u32),
    primary: Mount,
    secondary: Option<Mount>,
    mount_workers: WorkerSet,
    guider: Guider,
    config: EngineConfig,
    capturing: bool,
    last_image: Option<Image>,
}

impl Engine {
    /// Connects both mounts, starts a capture worker for `camera`, and
    /// starts a pulse worker for each mount backend that reports
    /// `has_nonui_move` (spec §4.7) — the rest keep their backend on `Mount`
    /// and are pulsed directly from the controller thread in `step`.
    pub fn new<C: Camera + 'static>(
        camera: C,
        mut primary: Mount,
        mut secondary: Option<Mount>,
        guider: Guider,
        config: EngineConfig,
    ) -> PhdResult<Self> {
        primary.connect()?;
        if let Some(sec) = secondary.as_mut() {
            sec.connect()?;
        }

        let full_size = camera.full_size();
        let camera_worker = Worker::spawn(CameraWorkerService::new(camera));
        let primary_worker = primary.take_backend_for_worker().map(|backend| Worker::spawn(MountWorkerService::new(backend)));
        let secondary_worker = secondary
            .as_mut()
            .and_then(Mount::take_backend_for_worker)
            .map(|backend| Worker::spawn(MountWorkerService::new(backend)));

        Ok(Engine {
            camera_worker,
            full_size,
            primary,
            secondary,
            mount_workers: WorkerSet::new(primary_worker, secondary_worker),
            guider,
            config,
            capturing: false,
            last_image: None,
        })
    }

    pub fn guider(&self) -> &Guider {
        &self.guider
    }

    pub fn primary(&self) -> &Mount {
        &self.primary
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    pub fn set_exposure(&mut self, ms: u32) {
        self.config.exposure_ms = ms;
    }

    pub fn set_subframes(&mut self, enabled: bool) {
        self.config.use_subframes = enabled;
    }

    pub fn set_time_lapse(&mut self, ms: u32) {
        self.config.time_lapse_ms = ms;
    }

    pub fn set_noise_reduction(&mut self, mode: crate::config::NoiseReduction) {
        self.config.noise_reduction = mode;
    }

    pub fn set_dither(&mut self, scale: f64, ra_only: bool) {
        self.config.dither_scale = scale;
        self.config.dither_ra_only = ra_only;
    }

    pub fn start_capturing(&mut self) {
        self.capturing = true;
    }

    pub fn stop_capturing(&mut self) {
        self.capturing = false;
    }

    pub fn pause(&mut self, paused: bool) {
        self.guider.pause(paused);
    }

    /// Seeds the finder at `(x, y)` in the most recently captured frame and
    /// adopts whatever star it finds there (spec §6 `select_star`). Errors
    /// if no frame has been captured yet.
    pub fn select_star(&mut self, x: f64, y: f64) -> PhdResult<()> {
        let image = self.require_last_image()?;
        self.guider.select_star(&image, x, y)
    }

    /// Runs the auto-select sweep over the most recently captured frame
    /// (spec §6 `auto_select_star`). Errors if no frame has been captured
    /// yet.
    pub fn auto_select_star(&mut self) -> PhdResult<()> {
        let image = self.require_last_image()?;
        self.guider.auto_select_star(&image)
    }

    /// Sets the lock position, honoring `exact` (spec §6
    /// `set_lock_position`).
    pub fn set_lock_position(&mut self, x: f64, y: f64, exact: bool) {
        self.guider.set_lock_position(x, y, exact);
    }

    fn require_last_image(&self) -> PhdResult<Image> {
        self.last_image.clone().ok_or_else(|| PhdError::InvalidArgument("no image captured yet".to_string()))
    }

    pub fn start_guiding(&mut self) -> PhdResult<()> {
        self.guider.start_guiding()
    }

    pub fn clear_calibration(&mut self) {
        self.primary.clear_calibration();
        if let Some(secondary) = &mut self.secondary {
            secondary.clear_calibration();
        }
    }

    pub fn flip_ra_calibration(&mut self) {
        self.primary.flip_ra_calibration();
    }

    /// Runs one capture/guide cycle. A no-op, successful return if
    /// `capturing` is false (spec §4.8: `start_capturing` is the only thing
    /// that arms the loop).
    pub fn step(&mut self) -> PhdResult<()> {
        if !self.capturing {
            return Ok(());
        }

        let subframe = if self.config.use_subframes && self.guider.lock_position().is_valid() {
            let (img_w, img_h) = self.full_size;
            if img_w as i64 > 2 * SUBFRAME_HALF_WIDTH && img_h as i64 > 2 * SUBFRAME_HALF_WIDTH {
                Some(subframe_around(self.guider.lock_position(), img_w, img_h, SUBFRAME_HALF_WIDTH))
            } else {
                None
            }
        } else {
            None
        };

        let completion = self.camera_worker.submit(WorkerRequest::Expose { exposure_ms: self.config.exposure_ms, subframe })?;
        let mut image = match completion.wait()? {
            WorkerResponse::Exposed(Ok(image)) => image,
            WorkerResponse::Exposed(Err(err)) => {
                log::error!("capture failed, stopping: {}", err);
                self.capturing = false;
                self.guider.reset_on_camera_failure();
                return Err(err);
            }
            WorkerResponse::Moved(_) => {
                return Err(PhdError::IllegalStateTransition("camera worker returned a move response".to_string()));
            }
        };

        image.apply_noise_reduction(self.config.noise_reduction);
        self.last_image = Some(image.clone());

        let moves = self.guider.on_image(&image, &mut self.primary, self.secondary.as_mut())?;

        for pending in moves {
            let (mount, worker) = match pending.mount {
                MountSelector::Primary => (&mut self.primary, self.mount_workers.primary.as_ref()),
                MountSelector::Secondary => match self.secondary.as_mut() {
                    Some(mount) => (mount, self.mount_workers.secondary.as_ref()),
                    None => {
                        log::warn!("secondary move requested but no secondary mount is configured");
                        continue;
                    }
                },
            };
            let result = match worker {
                Some(worker) => Self::issue_pulse_via_worker(worker, pending.mv.direction, pending.mv.duration_ms),
                None => mount.execute_pulse(pending.mv.direction, pending.mv.duration_ms),
            };
            if let Err(err) = result {
                log::warn!("guiding pulse failed: {}", err);
            }
        }

        if self.config.time_lapse_ms > 0 {
            std::thread::sleep(std::time::Duration::from_millis(self.config.time_lapse_ms as u64));
        }

        Ok(())
    }

    fn issue_pulse_via_worker(worker: &Worker, direction: Direction, duration_ms: u32) -> PhdResult<()> {
        let completion = worker.submit(WorkerRequest::Move { direction, duration_ms })?;
        match completion.wait()? {
            WorkerResponse::Moved(result) => result,
            WorkerResponse::Exposed(_) => {
                Err(PhdError::IllegalStateTransition("mount worker returned an expose response".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CalibrationConfig, MountConfig, StarFinderConfig};
    use crate::filters::FilterChain;
    use crate::mount::{CompassDirection, MountBackend, MountCapabilities};

    struct NullBackend;
    impl MountBackend for NullBackend {
        fn connect(&mut self) -> PhdResult<()> {
            Ok(())
        }
        fn disconnect(&mut self) {}
        fn pulse(&mut self, _dir: CompassDirection, _ms: u32) -> PhdResult<()> {
            Ok(())
        }
        fn capabilities(&self) -> MountCapabilities {
            MountCapabilities { has_nonui_move: true, reports_busy: false }
        }
    }

    fn fresh_mount() -> Mount {
        Mount::new(
            Box::new(NullBackend),
            CalibrationConfig::default(),
            MountConfig::default(),
            FilterChain::default(),
            FilterChain::default(),
        )
    }

    struct StaticStarCamera {
        w: u32,
        h: u32,
        cx: f64,
        cy: f64,
        fail: bool,
    }

    impl Camera for StaticStarCamera {
        fn capture(&mut self, _exposure_ms: u32, _subframe: Option<Rect>) -> PhdResult<Image> {
            if self.fail {
                return Err(PhdError::CameraFailure("simulated failure".to_string()));
            }
            let mut pixels = vec![100u16; (self.w * self.h) as usize];
            for y in 0..self.h {
                for x in 0..self.w {
                    let dx = x as f64 - self.cx;
                    let dy = y as f64 - self.cy;
                    let g = (-(dx * dx + dy * dy) / (2.0 * 2.0 * 2.0)).exp();
                    pixels[(y * self.w + x) as usize] = (100.0 + 5000.0 * g).round().clamp(0.0, 65535.0) as u16;
                }
            }
            Ok(Image::new(self.w, self.h, pixels))
        }
        fn full_size(&self) -> (u32, u32) {
            (self.w, self.h)
        }
    }

    fn engine_with(fail: bool) -> Engine {
        let camera = StaticStarCamera { w: 100, h: 100, cx: 50.0, cy: 50.0, fail };
        Engine::new(camera, fresh_mount(), None, Guider::new(StarFinderConfig::default()), EngineConfig::default())
            .expect("engine construction should not fail in tests")
    }

    #[test]
    fn step_without_start_capturing_is_a_noop() {
        let mut engine = engine_with(false);
        engine.step().unwrap();
        assert_eq!(engine.guider().state(), crate::guider::GuiderState::Uninitialized);
    }

    #[test]
    fn repeated_steps_select_a_star_then_hold_it_selected() {
        let mut engine = engine_with(false);
        engine.start_capturing();
        engine.step().unwrap();
        engine.step().unwrap();
        assert_eq!(engine.guider().state(), crate::guider::GuiderState::Selected);
    }

    #[test]
    fn camera_failure_stops_capturing_and_resets_the_guider() {
        let mut engine = engine_with(true);
        engine.start_capturing();
        assert!(engine.step().is_err());
        assert!(!engine.is_capturing());
        assert_eq!(engine.guider().state(), crate::guider::GuiderState::Uninitialized);
    }

    #[test]
    fn select_star_before_any_frame_is_rejected() {
        let mut engine = engine_with(false);
        assert!(engine.select_star(50.0, 50.0).is_err());
    }

    #[test]
    fn select_star_adopts_the_star_at_the_given_position() {
        let mut engine = engine_with(false);
        engine.start_capturing();
        engine.step().unwrap();
        engine.select_star(50.0, 50.0).unwrap();
        assert_eq!(engine.guider().state(), crate::guider::GuiderState::Selected);
        assert!((engine.guider().lock_position().x - 50.0).abs() < 1.0);
    }

    #[test]
    fn auto_select_star_adopts_a_candidate() {
        let mut engine = engine_with(false);
        engine.start_capturing();
        engine.step().unwrap();
        engine.auto_select_star().unwrap();
        assert_eq!(engine.guider().state(), crate::guider::GuiderState::Selected);
    }
}
