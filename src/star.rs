//! Sub-pixel star centroid tracker (spec §4.1). Given an image and a seed
//! pixel, locates the brightest nearby blob and returns its centroid, mass,
//! and SNR. Also supports auto-selecting the best candidate star in a fresh
//! frame.

use crate::config::StarFinderConfig;
use crate::error::{PhdError, StarLossReason};
use crate::geometry::Point;
use crate::image::Image;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindResult {
    Ok,
    Saturated,
    LowSnr,
    LowMass,
    NearEdge,
    Error,
}

impl FindResult {
    /// "Found" per spec §3: result in {Ok, Saturated}.
    pub fn found(self) -> bool {
        matches!(self, FindResult::Ok | FindResult::Saturated)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Star {
    pub position: Point,
    pub mass: f64,
    pub snr: f64,
    pub last_result: FindResult,
}

impl Star {
    pub fn not_found(result: FindResult) -> Self {
        Star { position: Point::invalid(), mass: 0.0, snr: 0.0, last_result: result }
    }
}

const CENTROID_BOX: i64 = 15;
const PLUS_SHAPE_OFFSETS: [(i64, i64); 5] = [(0, 0), (1, 0), (-1, 0), (0, 1), (0, -1)];

/// Runs the finder at a seed pixel within `image`, using `image.get`
/// directly (so callers must ensure the search window plus a half centroid
/// box lies inside the image; `find_star` itself only double-checks the
/// bare search window per spec §4.1 step 1).
pub fn find_star(image: &Image, seed: Point, cfg: &StarFinderConfig) -> Star {
    let r = cfg.search_radius;
    let sx = seed.x.round() as i64;
    let sy = seed.y.round() as i64;

    if !image.valid_rect().contains_window(sx, sy, r) {
        return Star::not_found(FindResult::NearEdge);
    }

    let start_x = sx - r;
    let start_y = sy - r;
    let search_size = r * 2 + 1;

    let mut local_min = u16::MAX;
    let mut local_sum = 0.0_f64;
    for dy in 0..search_size {
        for dx in 0..search_size {
            let v = image.get(start_x + dx, start_y + dy);
            if v < local_min {
                local_min = v;
            }
            local_sum += v as f64;
        }
    }
    let local_mean = local_sum / (search_size * search_size) as f64;
    let local_min = local_min as f64;

    // Coarse peak: 5-pixel plus-shape sum (center counted twice) locates
    // (px, py); independently track the largest and second-largest
    // background-subtracted single-pixel values across the window.
    let mut peak_sum = -1.0_f64;
    let mut px = start_x;
    let mut py = start_y;
    let mut max_val = 0.0_f64;
    let mut nearmax2 = 0.0_f64;
    let mut window_sum = 0.0_f64;
    for dy in 0..search_size {
        for dx in 0..search_size {
            let x = start_x + dx;
            let y = start_y + dy;
            let mut plus_sum = 0.0_f64;
            for &(ox, oy) in &PLUS_SHAPE_OFFSETS {
                plus_sum += image.get(x + ox, y + oy) as f64;
            }
            plus_sum += image.get(x, y) as f64; // center pixel counted twice
            if plus_sum >= peak_sum {
                peak_sum = plus_sum;
                px = x;
                py = y;
            }
            let sval = image.get(x, y) as f64 - local_min;
            window_sum += sval;
            if sval >= max_val {
                nearmax2 = max_val;
                max_val = sval;
            }
        }
    }
    let window_mean_subtracted = window_sum / (search_size * search_size) as f64;

    // Centroid: try thresholds in order until mass >= MIN_MASS.
    let thresholds = [
        local_mean + (max_val + local_min - local_mean) / 10.0,
        local_mean,
        local_min,
    ];
    let half = CENTROID_BOX / 2;
    let mut mass = 0.0_f64;
    let mut mx = 0.0_f64;
    let mut my = 0.0_f64;
    for &threshold in &thresholds {
        if mass >= cfg.min_mass {
            break;
        }
        mass = 0.0;
        mx = 0.0;
        my = 0.0;
        for dy in -half..=half {
            for dx in -half..=half {
                let x = px + dx;
                let y = py + dy;
                let v = if image.in_bounds(x, y) { image.get(x, y) as f64 } else { local_min };
                let val = (v - threshold).max(0.0);
                mx += x as f64 * val;
                my += y as f64 * val;
                mass += val;
            }
        }
    }

    let snr = max_val / window_mean_subtracted.max(f64::EPSILON);

    if mass < cfg.min_mass {
        return Star::not_found(FindResult::LowMass);
    }
    if snr < cfg.min_snr {
        return Star { position: Point::invalid(), mass, snr, last_result: FindResult::LowSnr };
    }
    let result = if max_val == nearmax2 { FindResult::Saturated } else { FindResult::Ok };
    Star { position: Point::new(mx / mass, my / mass), mass, snr, last_result: result }
}

/// Slides an `R`-radius window over the whole image, ranks candidates by
/// `mass * snr` excluding saturated/edge cases, and returns the best one.
/// Ties are broken by lowest distance to image center.
pub fn auto_select_star(image: &Image, cfg: &StarFinderConfig) -> Option<Star> {
    let rect = image.valid_rect();
    let r = cfg.search_radius;
    let margin = r + 1;
    if rect.w as i64 <= 2 * margin || rect.h as i64 <= 2 * margin {
        return None;
    }
    let center = Point::new(
        rect.x as f64 + rect.w as f64 / 2.0,
        rect.y as f64 + rect.h as f64 / 2.0,
    );

    // Coarse grid search at half the search diameter, refined with a local
    // find_star at each candidate seed; this keeps the sweep tractable
    // without materializing every pixel as a seed.
    let step = (r).max(1);
    let mut best: Option<(f64, f64, Star)> = None;
    let mut y = rect.y as i64 + margin;
    while y < (rect.y + rect.h) as i64 - margin {
        let mut x = rect.x as i64 + margin;
        while x < (rect.x + rect.w) as i64 - margin {
            let seed = Point::new(x as f64, y as f64);
            let star = find_star(image, seed, cfg);
            if star.last_result == FindResult::Ok {
                let score = star.mass * star.snr;
                let dist = star.position.distance(&center);
                let better = match &best {
                    None => true,
                    Some((best_score, best_dist, _)) => {
                        score > *best_score || (score == *best_score && dist < *best_dist)
                    }
                };
                if better {
                    best = Some((score, dist, star));
                }
            }
            x += step;
        }
        y += step;
    }
    best.map(|(_, _, star)| star)
}

pub fn consecutive_mass_change_tolerance() -> u32 {
    2
}

/// Translates a non-found finder result into a `StarLost` error, used by the
/// guider once mass-change tolerance (spec §7) is exhausted.
pub fn to_star_lost(result: FindResult, detail: impl Into<String>) -> PhdError {
    let reason = match result {
        FindResult::NearEdge => StarLossReason::NearEdge,
        FindResult::LowSnr => StarLossReason::LowSnr,
        FindResult::LowMass => StarLossReason::LowMass,
        FindResult::Error => StarLossReason::Error,
        FindResult::Ok | FindResult::Saturated => StarLossReason::Error,
    };
    PhdError::StarLost { reason, detail: detail.into() }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A synthetic star: a 2-D Gaussian-ish blob stamped onto a flat
    /// background, similar in spirit to the mock images used by the
    /// original test suite's hardware mocks.
    fn make_star_image(w: u32, h: u32, cx: f64, cy: f64, peak: u16, bg: u16, sigma: f64) -> Image {
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

    #[test]
    fn finds_bright_star_near_seed() {
        let img = make_star_image(100, 100, 50.3, 49.7, 5000, 100, 2.0);
        let cfg = StarFinderConfig::default();
        let star = find_star(&img, Point::new(50.0, 50.0), &cfg);
        assert!(star.last_result.found());
        assert!((star.position.x - 50.3).abs() < 0.5);
        assert!((star.position.y - 49.7).abs() < 0.5);
    }

    #[test]
    fn rejects_seed_too_near_edge() {
        let img = make_star_image(100, 100, 5.0, 5.0, 5000, 100, 2.0);
        let cfg = StarFinderConfig::default();
        let star = find_star(&img, Point::new(5.0, 5.0), &cfg);
        assert_eq!(star.last_result, FindResult::NearEdge);
        assert!(!star.position.is_valid());
    }

    #[test]
    fn flat_background_is_low_mass_or_low_snr() {
        let img = Image::new(100, 100, vec![100u16; 10000]);
        let cfg = StarFinderConfig::default();
        let star = find_star(&img, Point::new(50.0, 50.0), &cfg);
        assert!(!star.last_result.found());
    }

    #[test]
    fn auto_select_finds_the_brightest_star() {
        let mut pixels = vec![100u16; 200 * 200];
        // Dim star near the corner of the searchable area.
        stamp(&mut pixels, 200, 40.0, 40.0, 1500, 100, 2.0);
        // Bright star near the center.
        stamp(&mut pixels, 200, 100.0, 100.0, 8000, 100, 2.0);
        let img = Image::new(200, 200, pixels);
        let cfg = StarFinderConfig::default();
        let star = auto_select_star(&img, &cfg).expect("a star should be found");
        assert!((star.position.x - 100.0).abs() < 2.0);
        assert!((star.position.y - 100.0).abs() < 2.0);
    }

    fn stamp(pixels: &mut [u16], w: u32, cx: f64, cy: f64, peak: u16, bg: u16, sigma: f64) {
        let h = pixels.len() as u32 / w;
        for y in 0..h {
            for x in 0..w {
                let dx = x as f64 - cx;
                let dy = y as f64 - cy;
                let g = (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
                if g < 0.01 {
                    continue;
                }
                let idx = (y * w + x) as usize;
                let v = bg as f64 + (peak as f64 - bg as f64) * g;
                let v = v.round().clamp(0.0, 65535.0) as u16;
                if v > pixels[idx] {
                    pixels[idx] = v;
                }
            }
        }
    }
}
