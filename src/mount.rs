//! The Mount: calibration state machine (spec §4.4), guiding-move decomposition
//! (spec §4.5), and the external backend seam (spec §6). Grounded on
//! `mount.cpp`'s `Mount::UpdateCalibrationState` / `Mount::Move`, reworked
//! from its single God-object into state owned here and I/O delegated to an
//! injected `MountBackend`.

use crate::calibration::{Calibration, DecDirection, Direction, Move, RaDirection};
use crate::config::{CalibrationConfig, DecMode, MountConfig};
use crate::error::{CalibrationReason, PhdError, PhdResult};
use crate::filters::{FilterChain, GuideFilter};
use crate::geometry::Point;

/// The four pulse directions a backend understands, independent of which
/// axis (RA/Dec) they serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompassDirection {
    North,
    South,
    East,
    West,
}

impl From<Direction> for CompassDirection {
    fn from(d: Direction) -> Self {
        match d {
            Direction::Ra(RaDirection::East) => CompassDirection::East,
            Direction::Ra(RaDirection::West) => CompassDirection::West,
            Direction::Dec(DecDirection::South) => CompassDirection::South,
            Direction::Dec(DecDirection::North) => CompassDirection::North,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MountCapabilities {
    pub has_nonui_move: bool,
    pub reports_busy: bool,
}

/// External mount driver seam (spec §6). Implementations block for the
/// duration of `pulse`; the worker thread is the only caller.
pub trait MountBackend: Send {
    fn connect(&mut self) -> PhdResult<()>;
    fn disconnect(&mut self);
    fn pulse(&mut self, dir: CompassDirection, ms: u32) -> PhdResult<()>;
    fn capabilities(&self) -> MountCapabilities;
    fn is_busy(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CalDirection {
    West,
    North,
    East,
    South,
}

#[derive(Debug, Clone, Copy)]
struct CalProgress {
    dir: Option<CalDirection>,
    step: u32,
    backlash_remaining: u32,
    start: Point,
}

pub enum CalibrationOutcome {
    /// A pulse was issued; the caller should enqueue it on the worker. The
    /// final pulse of the Dec return phase also flips `Mount::is_calibrated`
    /// to true as a side effect — callers check that flag after the tick
    /// rather than looking for a distinct "done" variant. `step` and
    /// `distance_px` report the calibration progress this pulse represents,
    /// for the guiding log (spec §10).
    Pulse { mv: Move, step: u32, distance_px: f64 },
    /// The active axis finished; no pulse this tick, the next tick begins
    /// the reverse (return) phase.
    AxisComplete,
    Aborted(CalibrationReason),
}

pub struct Mount {
    /// `None` once `take_backend_for_worker` has handed the backend to a
    /// worker thread (spec §4.7) — only backends that report
    /// `has_nonui_move == false` stay here, since their `pulse` must run on
    /// the controller thread that owns this `Mount`.
    backend: Option<Box<dyn MountBackend>>,
    capabilities: MountCapabilities,
    connected: bool,
    pub calibration: Calibration,
    cal_config: CalibrationConfig,
    mount_config: MountConfig,
    cal_progress: Option<CalProgress>,
    ra_filter: FilterChain,
    dec_filter: FilterChain,
}

impl Mount {
    pub fn new(
        backend: Box<dyn MountBackend>,
        cal_config: CalibrationConfig,
        mount_config: MountConfig,
        ra_filter: FilterChain,
        dec_filter: FilterChain,
    ) -> Self {
        let capabilities = backend.capabilities();
        Mount {
            backend: Some(backend),
            capabilities,
            connected: false,
            calibration: Calibration::default(),
            cal_config,
            mount_config,
            cal_progress: None,
            ra_filter,
            dec_filter,
        }
    }

    pub fn capabilities(&self) -> MountCapabilities {
        self.capabilities
    }

    pub fn connect(&mut self) -> PhdResult<()> {
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| PhdError::IllegalStateTransition("backend owned by its worker thread".to_string()))?;
        backend.connect()?;
        self.connected = true;
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            backend.disconnect();
        }
        self.connected = false;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Hands the backend to a worker thread for off-controller-thread
    /// pulsing (spec §4.7), if and only if it reports `has_nonui_move`.
    /// Backends that must stay on the controller thread are left in place —
    /// `execute_pulse` keeps serving them directly — and this returns `None`.
    pub fn take_backend_for_worker(&mut self) -> Option<Box<dyn MountBackend>> {
        if self.capabilities.has_nonui_move {
            self.backend.take()
        } else {
            None
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.valid
    }

    pub fn is_calibrating(&self) -> bool {
        self.cal_progress.is_some()
    }

    pub fn clear_calibration(&mut self) {
        self.calibration = Calibration::default();
        self.cal_progress = None;
    }

    /// Adds π to `ra_angle`; spec §6/§8 property 3.
    pub fn flip_ra_calibration(&mut self) {
        self.calibration.flip_ra();
    }

    /// Executes one physical pulse through the backend directly on whatever
    /// thread calls it. Only valid for backends still held here — i.e.
    /// those with `has_nonui_move == false`, which the controller thread
    /// must call directly rather than handing to a worker (spec §4.7).
    /// Never called while another pulse on this backend is in flight.
    pub fn execute_pulse(&mut self, direction: Direction, duration_ms: u32) -> PhdResult<()> {
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| PhdError::IllegalStateTransition("backend owned by its worker thread".to_string()))?;
        backend.pulse(direction.into(), duration_ms)
    }

    /// Short human-readable progress string, e.g. `"W calibration: 4"` or
    /// `"Clear Backlash: 12"` — an ambient status line, not logged as an
    /// error (spec §7, SPEC_FULL §15).
    pub fn calibration_status(&self) -> String {
        match &self.cal_progress {
            None if self.calibration.valid => "Calibrated".to_string(),
            None => "Not calibrated".to_string(),
            Some(p) => match p.dir {
                None => "Calibration starting".to_string(),
                Some(CalDirection::North) if p.backlash_remaining > 0 => {
                    format!("Clear backlash: {}", p.backlash_remaining)
                }
                Some(CalDirection::West) => format!("W calibration: {}", p.step),
                Some(CalDirection::North) => format!("N calibration: {}", p.step),
                Some(CalDirection::East) => format!("E calibration: {}", p.step),
                Some(CalDirection::South) => format!("S calibration: {}", p.step),
            },
        }
    }

    /// Primes the calibration state machine; the actual first pulse is
    /// issued by the next `update_calibration` call (spec §4.4 precondition).
    pub fn begin_calibration(&mut self, current: Point) {
        self.cal_progress = Some(CalProgress {
            dir: None,
            step: 0,
            backlash_remaining: self.cal_config.max_calibration_steps,
            start: current,
        });
    }

    /// One tick of the calibration state machine, driven by the Guider on
    /// every new star position while calibrating (spec §4.4).
    pub fn update_calibration(&mut self, pos: Point, image_height: u32) -> PhdResult<CalibrationOutcome> {
        let dist_crit = (image_height as f64 * 0.05).min(self.cal_config.max_dist_crit_px);
        let cal_duration_ms = self.cal_config.cal_duration_ms;
        let max_steps = self.cal_config.max_calibration_steps;

        let progress = self
            .cal_progress
            .as_mut()
            .ok_or_else(|| PhdError::IllegalStateTransition("not calibrating".to_string()))?;

        let Some(dir) = progress.dir else {
            progress.dir = Some(CalDirection::West);
            progress.step = 1;
            progress.start = pos;
            return Ok(CalibrationOutcome::Pulse {
                mv: Move { direction: Direction::Ra(RaDirection::West), duration_ms: cal_duration_ms },
                step: progress.step,
                distance_px: 0.0,
            });
        };

        let d = pos.distance(&progress.start);

        if dir == CalDirection::North && progress.backlash_remaining > 0 {
            if d >= self.cal_config.dec_backlash_distance_px {
                progress.step = 1;
                progress.backlash_remaining = 0;
                progress.start = pos;
                return Ok(CalibrationOutcome::Pulse {
                    mv: Move { direction: Direction::Dec(DecDirection::North), duration_ms: cal_duration_ms },
                    step: progress.step,
                    distance_px: d,
                });
            }
            progress.backlash_remaining -= 1;
            if progress.backlash_remaining == 0 {
                self.cal_progress = None;
                self.mount_config.dec_mode = DecMode::Off;
                return Ok(CalibrationOutcome::Aborted(CalibrationReason::BacklashStuck));
            }
            return Ok(CalibrationOutcome::Pulse {
                mv: Move { direction: Direction::Dec(DecDirection::North), duration_ms: cal_duration_ms },
                step: progress.step,
                distance_px: d,
            });
        }

        match dir {
            CalDirection::West | CalDirection::North => {
                if d >= dist_crit {
                    let angle = progress.start.angle_to(&pos);
                    let rate = d / (progress.step as f64 * cal_duration_ms as f64);
                    match dir {
                        CalDirection::West => {
                            self.calibration.ra_angle = angle;
                            self.calibration.ra_rate = rate;
                            progress.dir = Some(CalDirection::East);
                        }
                        CalDirection::North => {
                            self.calibration.dec_angle = angle;
                            self.calibration.dec_rate = rate;
                            progress.dir = Some(CalDirection::South);
                        }
                        _ => unreachable!(),
                    }
                    return Ok(CalibrationOutcome::AxisComplete);
                }
                if progress.step >= max_steps {
                    self.cal_progress = None;
                    return Ok(CalibrationOutcome::Aborted(CalibrationReason::NotMoved));
                }
                progress.step += 1;
                let direction = match dir {
                    CalDirection::West => Direction::Ra(RaDirection::West),
                    CalDirection::North => Direction::Dec(DecDirection::North),
                    _ => unreachable!(),
                };
                Ok(CalibrationOutcome::Pulse {
                    mv: Move { direction, duration_ms: cal_duration_ms },
                    step: progress.step,
                    distance_px: d,
                })
            }
            CalDirection::East | CalDirection::South => {
                let pulse_direction = match dir {
                    CalDirection::East => Direction::Ra(RaDirection::East),
                    CalDirection::South => Direction::Dec(DecDirection::South),
                    _ => unreachable!(),
                };
                progress.step = progress.step.saturating_sub(1);
                let step = progress.step;
                if step == 0 {
                    match dir {
                        CalDirection::East => {
                            progress.dir = Some(CalDirection::North);
                            progress.step = 0;
                            progress.start = pos;
                        }
                        CalDirection::South => {
                            self.calibration.valid = true;
                            self.cal_progress = None;
                            return Ok(CalibrationOutcome::Pulse {
                                mv: Move { direction: pulse_direction, duration_ms: cal_duration_ms },
                                step,
                                distance_px: d,
                            });
                        }
                        _ => unreachable!(),
                    }
                }
                Ok(CalibrationOutcome::Pulse {
                    mv: Move { direction: pulse_direction, duration_ms: cal_duration_ms },
                    step,
                    distance_px: d,
                })
            }
        }
    }

    /// Guiding move decomposition (spec §4.5). Returns zero, one, or two
    /// pulses to issue; zero-duration axis moves are omitted.
    pub fn guide_move(&mut self, current: Point, lock: Point, guiding_enabled: bool) -> Vec<Move> {
        if !self.connected || !self.calibration.valid || !guiding_enabled {
            return Vec::new();
        }
        let delta = current - lock;
        if !delta.is_valid() {
            return Vec::new();
        }

        let (ra_distance, dec_distance) = self.calibration.axis_distances(delta.x, delta.y);
        let filtered_ra = self.ra_filter.result(ra_distance);
        let filtered_dec = self.dec_filter.result(dec_distance);

        let mut moves = Vec::with_capacity(2);

        if filtered_ra != 0.0 {
            let mv = self.calibration.ra_move(filtered_ra, self.mount_config.max_ra_ms);
            if mv.duration_ms > 0 {
                moves.push(mv);
            }
        }

        if filtered_dec != 0.0 {
            let mv = self.calibration.dec_move(filtered_dec, self.mount_config.max_dec_ms);
            if mv.duration_ms > 0 && self.dec_move_allowed(mv.direction) {
                moves.push(mv);
            }
        }

        moves
    }

    fn dec_move_allowed(&self, direction: Direction) -> bool {
        let Direction::Dec(dec_dir) = direction else { return true };
        match self.mount_config.dec_mode {
            DecMode::Off => false,
            DecMode::Auto => true,
            DecMode::NorthOnly => dec_dir == DecDirection::North,
            DecMode::SouthOnly => dec_dir == DecDirection::South,
        }
    }

    pub fn reset_filters(&mut self) {
        self.ra_filter.reset();
        self.dec_filter.reset();
    }
}
