//! The Guider state machine (spec §4.6): drives star selection, calibration
//! of one or two mounts, and steady-state guiding, exclusively through
//! `on_image`. `stop()`/`start_guiding()` only set intent flags; the state
//! machine itself only ever moves on the next frame.

use crate::calibration::Move;
use crate::config::StarFinderConfig;
use crate::error::{PhdError, PhdResult, StarLossReason};
use crate::geometry::Point;
use crate::image::Image;
use crate::mount::{CalibrationOutcome, Mount};
use crate::observer::{GuideObserver, NullObserver};
use crate::star::{self, FindResult};
use crate::value_stats::{ValueStats, ValueStatsAccumulator};

/// Rolling window size for the star mass/SNR accumulators, wide enough to
/// smooth a handful of seconds of guiding at typical exposure lengths.
const STAR_STATS_WINDOW: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuiderState {
    Uninitialized,
    Selecting,
    Selected,
    CalibratingPrimary,
    CalibratingSecondary,
    Calibrated,
    Guiding,
}

impl GuiderState {
    fn name(self) -> &'static str {
        match self {
            GuiderState::Uninitialized => "Uninitialized",
            GuiderState::Selecting => "Selecting",
            GuiderState::Selected => "Selected",
            GuiderState::CalibratingPrimary => "CalibratingPrimary",
            GuiderState::CalibratingSecondary => "CalibratingSecondary",
            GuiderState::Calibrated => "Calibrated",
            GuiderState::Guiding => "Guiding",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountSelector {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy)]
pub struct PendingMove {
    pub mount: MountSelector,
    pub mv: Move,
}

/// Above this ratio (either direction) a found star's mass is treated as a
/// transient anomaly rather than a reacquisition of the same star; see
/// `consecutive_mass_change_tolerance`.
const MASS_CHANGE_RATIO: f64 = 2.0;

pub struct Guider {
    state: GuiderState,
    lock: Point,
    current: Point,
    paused: bool,
    stop_requested: bool,
    start_guiding_requested: bool,
    star_cfg: StarFinderConfig,
    last_mass: Option<f64>,
    mass_change_streak: u32,
    mass_stats: ValueStatsAccumulator,
    snr_stats: ValueStatsAccumulator,
    observer: Box<dyn GuideObserver>,
}

impl Guider {
    pub fn new(star_cfg: StarFinderConfig) -> Self {
        Guider {
            state: GuiderState::Uninitialized,
            lock: Point::invalid(),
            current: Point::invalid(),
            paused: false,
            stop_requested: false,
            start_guiding_requested: false,
            star_cfg,
            last_mass: None,
            mass_change_streak: 0,
            mass_stats: ValueStatsAccumulator::new(STAR_STATS_WINDOW),
            snr_stats: ValueStatsAccumulator::new(STAR_STATS_WINDOW),
            observer: Box::new(NullObserver),
        }
    }

    /// Recent/session mass stats for the currently tracked star, for
    /// diagnostics and UI display; empty until a star has been found.
    pub fn mass_stats(&self) -> &ValueStats {
        &self.mass_stats.value_stats
    }

    /// Recent/session SNR stats for the currently tracked star.
    pub fn snr_stats(&self) -> &ValueStats {
        &self.snr_stats.value_stats
    }

    pub fn with_observer(mut self, observer: Box<dyn GuideObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn state(&self) -> GuiderState {
        self.state
    }

    pub fn lock_position(&self) -> Point {
        self.lock
    }

    pub fn current_position(&self) -> Point {
        self.current
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Sets the lock position (spec §6 `set_lock_position(x, y, exact)`).
    /// `exact` bypasses any star search: the lock becomes the literal pixel
    /// position given. Otherwise the currently tracked star position is
    /// considered stale, so the finder re-seeds at `(x, y)` on the next
    /// `on_image` tick (the finder always seeds at the last known star
    /// position, falling back to the lock position when none is known).
    pub fn set_lock_position(&mut self, x: f64, y: f64, exact: bool) {
        self.lock = Point::new(x, y);
        if !exact {
            self.current = Point::invalid();
        }
    }

    /// Runs the finder at `(x, y)` in `image` and, if a star is found there,
    /// adopts it as the locked/tracked star (spec §6 `select_star`). Distinct
    /// from the per-tick auto-select the `Selecting` state runs on every
    /// `on_image`; this is the manually-triggered, image-seeded equivalent.
    pub fn select_star(&mut self, image: &Image, x: f64, y: f64) -> PhdResult<()> {
        let found = star::find_star(image, Point::new(x, y), &self.star_cfg);
        if !found.last_result.found() {
            return Err(star::to_star_lost(found.last_result, "no star found at the requested position"));
        }
        self.adopt_found_star(found);
        Ok(())
    }

    /// Runs the auto-select sweep over `image` and, if a candidate star is
    /// found, adopts it as the locked/tracked star (spec §6
    /// `auto_select_star`).
    pub fn auto_select_star(&mut self, image: &Image) -> PhdResult<()> {
        let found = star::auto_select_star(image, &self.star_cfg).ok_or_else(|| PhdError::StarLost {
            reason: StarLossReason::Error,
            detail: "no candidate star found in frame".to_string(),
        })?;
        self.adopt_found_star(found);
        Ok(())
    }

    /// Common bookkeeping for a freshly found/selected star: updates
    /// position, mass/SNR stats, and the observer, and advances out of
    /// Uninitialized/Selecting into Selected if still there.
    fn adopt_found_star(&mut self, found: star::Star) {
        self.current = found.position;
        self.lock = found.position;
        self.last_mass = Some(found.mass);
        self.mass_stats.add_value(found.mass);
        self.snr_stats.add_value(found.snr);
        self.observer.star_found(found.position, found.mass, found.snr);
        if matches!(self.state, GuiderState::Uninitialized | GuiderState::Selecting) {
            self.transition(GuiderState::Selected);
        }
    }

    /// Requests a stop; takes effect on the next `on_image` call per the
    /// mapping in spec §4.6.
    pub fn stop(&mut self) {
        self.stop_requested = true;
    }

    /// Requests the transition into calibration/guiding. Rejected outright
    /// if no star has ever been selected; a no-op if already past Selected.
    pub fn start_guiding(&mut self) -> PhdResult<()> {
        match self.state {
            GuiderState::Selected
            | GuiderState::CalibratingPrimary
            | GuiderState::CalibratingSecondary
            | GuiderState::Calibrated
            | GuiderState::Guiding => {
                self.start_guiding_requested = true;
                Ok(())
            }
            GuiderState::Uninitialized | GuiderState::Selecting => {
                Err(PhdError::IllegalStateTransition("cannot start guiding before a star is selected".to_string()))
            }
        }
    }

    fn transition(&mut self, to: GuiderState) {
        self.observer.state_transition(self.state.name(), to.name());
        self.state = to;
    }

    /// Forces an unconditional reset to `Uninitialized`, bypassing the
    /// normal transition table — used when the camera itself fails (spec
    /// §7: "camera failures stop the engine and place the Guider in
    /// Uninitialized").
    pub fn reset_on_camera_failure(&mut self) {
        self.start_guiding_requested = false;
        self.stop_requested = false;
        self.transition(GuiderState::Uninitialized);
    }

    /// Applies the `stop()` mapping from spec §4.6. Partial calibration
    /// state on any mount is left untouched — only an explicit
    /// `clear_calibration()` call wipes it (spec §7).
    fn apply_stop(&mut self) {
        self.start_guiding_requested = false;
        let next = match self.state {
            GuiderState::Uninitialized | GuiderState::Selecting | GuiderState::Selected => return,
            GuiderState::CalibratingPrimary => GuiderState::Uninitialized,
            GuiderState::CalibratingSecondary => GuiderState::CalibratingPrimary,
            GuiderState::Calibrated | GuiderState::Guiding => GuiderState::Selected,
        };
        self.transition(next);
    }

    /// Runs the star finder at the last known position (or the lock
    /// position when just entering a tracking state), updating `current`
    /// and the mass-change tolerance counter. Returns `Ok(())` if the star
    /// should be considered found this tick.
    fn track_star(&mut self, image: &Image) -> PhdResult<()> {
        let seed = if self.current.is_valid() { self.current } else { self.lock };
        let found = star::find_star(image, seed, &self.star_cfg);

        if !found.last_result.found() {
            self.mass_change_streak = 0;
            self.last_mass = None;
            self.current = Point::invalid();
            return Err(star::to_star_lost(found.last_result, "finder lost the star"));
        }

        let is_mass_change = match self.last_mass {
            Some(prev) if prev > 0.0 => {
                let ratio = found.mass / prev;
                ratio >= MASS_CHANGE_RATIO || ratio <= 1.0 / MASS_CHANGE_RATIO
            }
            _ => false,
        };

        if is_mass_change {
            self.mass_change_streak += 1;
            if self.mass_change_streak > star::consecutive_mass_change_tolerance() {
                self.mass_change_streak = 0;
                self.last_mass = None;
                self.current = Point::invalid();
                return Err(PhdError::StarLost {
                    reason: StarLossReason::MassChange,
                    detail: format!("mass jumped from {:.1} to {:.1}", self.last_mass.unwrap_or(0.0), found.mass),
                });
            }
        } else {
            self.mass_change_streak = 0;
        }

        self.last_mass = Some(found.mass);
        self.current = found.position;
        self.mass_stats.add_value(found.mass);
        self.snr_stats.add_value(found.snr);
        self.observer.star_found(found.position, found.mass, found.snr);
        Ok(())
    }

    /// Advances the state machine by one frame. `primary` is required;
    /// `secondary` is only consulted once the primary axis is calibrated.
    pub fn on_image(
        &mut self,
        image: &Image,
        primary: &mut Mount,
        secondary: Option<&mut Mount>,
    ) -> PhdResult<Vec<PendingMove>> {
        if self.stop_requested {
            self.stop_requested = false;
            self.apply_stop();
        }

        match self.state {
            GuiderState::Uninitialized => {
                self.lock = Point::invalid();
                self.current = Point::invalid();
                self.transition(GuiderState::Selecting);
                Ok(vec![])
            }

            GuiderState::Selecting => {
                if let Some(found) = star::auto_select_star(image, &self.star_cfg) {
                    self.adopt_found_star(found);
                }
                Ok(vec![])
            }

            GuiderState::Selected => {
                match self.track_star(image) {
                    Ok(()) => {}
                    Err(err) => {
                        self.observer.star_lost(&err);
                        primary.reset_filters();
                        if let Some(sec) = secondary {
                            sec.reset_filters();
                        }
                        self.transition(GuiderState::Uninitialized);
                        return Ok(vec![]);
                    }
                }
                if self.start_guiding_requested {
                    self.start_guiding_requested = false;
                    primary.begin_calibration(self.current);
                    if primary.is_calibrated() {
                        self.transition(GuiderState::CalibratingSecondary);
                    } else {
                        self.transition(GuiderState::CalibratingPrimary);
                    }
                }
                Ok(vec![])
            }

            GuiderState::CalibratingPrimary => {
                if self.paused {
                    return Ok(vec![]);
                }
                match self.track_star(image) {
                    Ok(()) => {}
                    Err(err) => {
                        self.observer.star_lost(&err);
                        self.transition(GuiderState::Uninitialized);
                        return Ok(vec![]);
                    }
                }
                let outcome = primary.update_calibration(self.current, image.height());
                let moves = self.handle_calibration_outcome(outcome, MountSelector::Primary)?;
                if primary.is_calibrated() && !primary.is_calibrating() {
                    self.transition(GuiderState::CalibratingSecondary);
                }
                Ok(moves)
            }

            GuiderState::CalibratingSecondary => {
                if self.paused {
                    return Ok(vec![]);
                }
                match self.track_star(image) {
                    Ok(()) => {}
                    Err(err) => {
                        self.observer.star_lost(&err);
                        self.transition(GuiderState::Uninitialized);
                        return Ok(vec![]);
                    }
                }
                let Some(secondary) = secondary else {
                    self.transition(GuiderState::Calibrated);
                    return Ok(vec![]);
                };
                if !secondary.is_calibrating() && !secondary.is_calibrated() {
                    secondary.begin_calibration(self.current);
                }
                let outcome = secondary.update_calibration(self.current, image.height());
                let moves = self.handle_calibration_outcome(outcome, MountSelector::Secondary)?;
                if secondary.is_calibrated() && !secondary.is_calibrating() {
                    self.transition(GuiderState::Calibrated);
                }
                Ok(moves)
            }

            GuiderState::Calibrated => {
                match self.track_star(image) {
                    Ok(()) => {}
                    Err(err) => {
                        self.observer.star_lost(&err);
                        self.transition(GuiderState::Uninitialized);
                        return Ok(vec![]);
                    }
                }
                self.lock = self.current;
                self.transition(GuiderState::Guiding);
                Ok(vec![])
            }

            GuiderState::Guiding => {
                match self.track_star(image) {
                    Ok(()) => {}
                    Err(err) => {
                        self.observer.star_lost(&err);
                        self.transition(GuiderState::Uninitialized);
                        return Ok(vec![]);
                    }
                }
                if self.paused {
                    return Ok(vec![]);
                }
                let moves = primary.guide_move(self.current, self.lock, true);
                let mut pending: Vec<PendingMove> = moves
                    .into_iter()
                    .map(|mv| {
                        self.observer.move_issued(mv.direction, mv.duration_ms);
                        PendingMove { mount: MountSelector::Primary, mv }
                    })
                    .collect();
                if let Some(secondary) = secondary {
                    for mv in secondary.guide_move(self.current, self.lock, true) {
                        self.observer.move_issued(mv.direction, mv.duration_ms);
                        pending.push(PendingMove { mount: MountSelector::Secondary, mv });
                    }
                }
                Ok(pending)
            }
        }
    }

    fn handle_calibration_outcome(
        &mut self,
        outcome: PhdResult<CalibrationOutcome>,
        mount: MountSelector,
    ) -> PhdResult<Vec<PendingMove>> {
        match outcome? {
            CalibrationOutcome::Pulse { mv, step, distance_px } => {
                self.observer.calibration_step(mv.direction, step, distance_px);
                Ok(vec![PendingMove { mount, mv }])
            }
            CalibrationOutcome::AxisComplete => Ok(vec![]),
            CalibrationOutcome::Aborted(reason) => {
                let err = PhdError::CalibrationFailed { reason, detail: "calibration aborted".to_string() };
                self.observer.star_lost(&err);
                self.transition(GuiderState::Uninitialized);
                Err(err)
            }
        }
    }
}
