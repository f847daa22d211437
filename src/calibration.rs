//! Measured axis geometry for a mount: two unit-vector directions in image
//! space (one per axis) and their pixel-per-millisecond rates (spec §4.3,
//! §3). Grounded on `mount.cpp`'s `Calibration` struct and
//! `TransformMountCoordinatesToCameraCoordinates`.

use crate::geometry::normalize_angle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaDirection {
    East,
    West,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecDirection {
    North,
    South,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ra(RaDirection),
    Dec(DecDirection),
}

/// One queued mount move: a direction and a clamped duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Move {
    pub direction: Direction,
    pub duration_ms: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub ra_angle: f64,
    pub dec_angle: f64,
    /// Pixels per millisecond of pulse, always positive when `valid`.
    pub ra_rate: f64,
    pub dec_rate: f64,
    pub valid: bool,
}

impl Default for Calibration {
    fn default() -> Self {
        Calibration { ra_angle: 0.0, dec_angle: 0.0, ra_rate: 0.0, dec_rate: 0.0, valid: false }
    }
}

impl Calibration {
    pub fn new(ra_angle: f64, dec_angle: f64, ra_rate: f64, dec_rate: f64) -> Self {
        Calibration { ra_angle, dec_angle, ra_rate, dec_rate, valid: true }
    }

    /// Signed projections of a pixel offset `(dx, dy)` onto each axis
    /// (positive = East / South, per spec §4.3).
    pub fn axis_distances(&self, dx: f64, dy: f64) -> (f64, f64) {
        let theta = dy.atan2(dx);
        let h = (dx * dx + dy * dy).sqrt();
        ((self.ra_angle - theta).cos() * h, (self.dec_angle - theta).cos() * h)
    }

    pub fn ra_move(&self, ra_distance: f64, max_ra_ms: u32) -> Move {
        let dir = if ra_distance > 0.0 { RaDirection::East } else { RaDirection::West };
        Move { direction: Direction::Ra(dir), duration_ms: duration_ms(ra_distance, self.ra_rate, max_ra_ms) }
    }

    pub fn dec_move(&self, dec_distance: f64, max_dec_ms: u32) -> Move {
        let dir = if dec_distance > 0.0 { DecDirection::South } else { DecDirection::North };
        Move { direction: Direction::Dec(dir), duration_ms: duration_ms(dec_distance, self.dec_rate, max_dec_ms) }
    }

    /// Decomposes a pixel offset `(dx, dy)` into up to two axis moves, each
    /// capped by the corresponding `max_*_ms`. A rate of zero yields a
    /// zero-duration move rather than dividing by zero.
    pub fn pixel_to_moves(&self, dx: f64, dy: f64, max_ra_ms: u32, max_dec_ms: u32) -> [Move; 2] {
        let (ra_distance, dec_distance) = self.axis_distances(dx, dy);
        [self.ra_move(ra_distance, max_ra_ms), self.dec_move(dec_distance, max_dec_ms)]
    }

    /// Adds π to `ra_angle`, normalized to `(-π, π]` — used when the mount's
    /// RA motor sense is discovered to be reversed from what calibration
    /// assumed.
    pub fn flip_ra(&mut self) {
        self.ra_angle = normalize_angle(self.ra_angle + std::f64::consts::PI);
    }
}

fn duration_ms(distance: f64, rate: f64, max_ms: u32) -> u32 {
    if rate <= 0.0 {
        return 0;
    }
    let ms = (distance.abs() / rate).round();
    if ms.is_nan() || ms < 0.0 {
        0
    } else if ms > max_ms as f64 {
        max_ms
    } else {
        ms as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    #[test]
    fn east_west_north_south_convention() {
        let cal = Calibration::new(0.0, PI / 2.0, 0.01, 0.01);
        let moves = cal.pixel_to_moves(3.0, -2.0, 1000, 1000);
        assert_eq!(moves[0].direction, Direction::Ra(RaDirection::East));
        assert_eq!(moves[0].duration_ms, 300);
        assert_eq!(moves[1].direction, Direction::Dec(DecDirection::North));
        assert_eq!(moves[1].duration_ms, 200);
    }

    #[test]
    fn decompose_and_reconstruct_recovers_the_offset() {
        let cal = Calibration::new(0.3, 0.3 + PI / 2.0, 0.02, 0.015);
        let (dx, dy) = (12.0, -7.0);
        let moves = cal.pixel_to_moves(dx, dy, u32::MAX, u32::MAX);

        let mut rx = 0.0;
        let mut ry = 0.0;
        for m in &moves {
            let (angle, rate, sign) = match m.direction {
                Direction::Ra(RaDirection::East) => (cal.ra_angle, cal.ra_rate, 1.0),
                Direction::Ra(RaDirection::West) => (cal.ra_angle, cal.ra_rate, -1.0),
                Direction::Dec(DecDirection::South) => (cal.dec_angle, cal.dec_rate, 1.0),
                Direction::Dec(DecDirection::North) => (cal.dec_angle, cal.dec_rate, -1.0),
            };
            let signed_distance = sign * (m.duration_ms as f64) * rate;
            rx += signed_distance * angle.cos();
            ry += signed_distance * angle.sin();
        }
        assert_abs_diff_eq!(rx, dx, epsilon = 1e-6);
        assert_abs_diff_eq!(ry, dy, epsilon = 1e-6);
    }

    #[test]
    fn flip_ra_is_an_involution() {
        let mut cal = Calibration::new(1.0, 0.0, 0.01, 0.01);
        let original = cal.ra_angle;
        cal.flip_ra();
        cal.flip_ra();
        assert_abs_diff_eq!(cal.ra_angle, original, epsilon = 1e-9);
    }

    #[test]
    fn zero_rate_yields_zero_duration_without_panicking() {
        let cal = Calibration::new(0.0, PI / 2.0, 0.0, 0.0);
        let moves = cal.pixel_to_moves(5.0, 5.0, 1000, 1000);
        assert_eq!(moves[0].duration_ms, 0);
        assert_eq!(moves[1].duration_ms, 0);
    }

    #[test]
    fn duration_is_capped_per_axis() {
        let cal = Calibration::new(0.0, PI / 2.0, 0.001, 0.001);
        let moves = cal.pixel_to_moves(100.0, 100.0, 50, 75);
        assert_eq!(moves[0].duration_ms, 50);
        assert_eq!(moves[1].duration_ms, 75);
    }
}
