//! Composition-root example: wires a synthetic camera and mount backend into
//! an `Engine` and runs it for a fixed number of frames, logging every state
//! transition. Stands in for the real ASCOM/INDI drivers that are out of
//! scope here (spec Non-goals); the point is to show how the pieces in this
//! crate are assembled, not to guide anything real.

use std::path::PathBuf;

use clap::Parser;

use phd2_core::config::{CalibrationConfig, EngineConfig, MountConfig, StarFinderConfig};
use phd2_core::engine::{Camera, Engine};
use phd2_core::error::PhdResult;
use phd2_core::filters::FilterChain;
use phd2_core::guider::Guider;
use phd2_core::image::{Image, Rect};
use phd2_core::mount::{CompassDirection, Mount, MountBackend, MountCapabilities};
use phd2_core::persist;

#[derive(Parser, Debug)]
#[command(about = "Runs a synthetic guiding session against the phd2_core engine")]
struct Args {
    /// Number of frames to capture.
    #[arg(long, default_value_t = 40)]
    frames: u32,

    /// Exposure length per frame, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    exposure_ms: u32,

    /// Frame at which to request the start of calibration/guiding.
    #[arg(long, default_value_t = 3)]
    start_guiding_at: u32,

    /// Optional path to a saved calibration; loaded at startup if present,
    /// and written back out once calibration completes.
    #[arg(long)]
    calibration_file: Option<PathBuf>,
}

/// A camera that returns a fixed-size frame with a single Gaussian star that
/// drifts a little every frame, just enough to exercise the guider.
struct DriftingStarCamera {
    w: u32,
    h: u32,
    cx: f64,
    cy: f64,
    drift_x: f64,
}

impl Camera for DriftingStarCamera {
    fn capture(&mut self, _exposure_ms: u32, _subframe: Option<Rect>) -> PhdResult<Image> {
        self.cx += self.drift_x;
        let mut pixels = vec![200u16; (self.w * self.h) as usize];
        for y in 0..self.h {
            for x in 0..self.w {
                let dx = x as f64 - self.cx;
                let dy = y as f64 - self.cy;
                let g = (-(dx * dx + dy * dy) / (2.0 * 2.2 * 2.2)).exp();
                let v = 200.0 + 6000.0 * g;
                pixels[(y * self.w + x) as usize] = v.round().clamp(0.0, 65535.0) as u16;
            }
        }
        Ok(Image::new(self.w, self.h, pixels))
    }

    fn full_size(&self) -> (u32, u32) {
        (self.w, self.h)
    }
}

/// A mount backend that just logs pulses; nothing moves the synthetic star
/// back in response, since this demo cares about exercising the state
/// machine rather than closing the loop realistically.
struct LoggingBackend {
    name: &'static str,
}

impl MountBackend for LoggingBackend {
    fn connect(&mut self) -> PhdResult<()> {
        Ok(())
    }

    fn disconnect(&mut self) {}

    fn pulse(&mut self, dir: CompassDirection, ms: u32) -> PhdResult<()> {
        log::info!("{} pulse: {:?} for {}ms", self.name, dir, ms);
        Ok(())
    }

    fn capabilities(&self) -> MountCapabilities {
        MountCapabilities { has_nonui_move: true, reports_busy: false }
    }
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let camera = DriftingStarCamera { w: 400, h: 300, cx: 200.0, cy: 150.0, drift_x: 0.05 };

    let mut primary = Mount::new(
        Box::new(LoggingBackend { name: "ra/dec" }),
        CalibrationConfig::default(),
        MountConfig::default(),
        FilterChain::default().with_hysteresis(0.2, 0.1, 1.0),
        FilterChain::default().with_hysteresis(0.2, 0.1, 1.0),
    );

    if let Some(path) = &args.calibration_file {
        if let Some(loaded) = persist::load(path) {
            log::info!("loaded calibration from {}", path.display());
            primary.calibration = loaded;
        }
    }

    let guider = Guider::new(StarFinderConfig::default());
    let mut engine = match Engine::new(
        camera,
        primary,
        None,
        guider,
        EngineConfig { exposure_ms: args.exposure_ms, ..EngineConfig::default() },
    ) {
        Ok(engine) => engine,
        Err(err) => {
            log::error!("failed to start engine: {}", err);
            return;
        }
    };

    engine.start_capturing();
    for frame in 1..=args.frames {
        if frame == args.start_guiding_at {
            if let Err(err) = engine.start_guiding() {
                log::warn!("start_guiding rejected: {}", err);
            }
        }
        if let Err(err) = engine.step() {
            log::error!("frame {} failed: {}", frame, err);
            break;
        }
        log::info!(
            "frame {}: state={:?} mass_stats={:?}",
            frame,
            engine.guider().state(),
            engine.guider().mass_stats().recent
        );
    }

    if let Some(path) = &args.calibration_file {
        let cal = engine.primary().calibration;
        if cal.valid {
            let record = persist::CalibrationRecord::from_calibration(&cal, args.exposure_ms);
            match persist::save(path, &record) {
                Ok(()) => log::info!("saved calibration to {}", path.display()),
                Err(err) => log::warn!("failed to save calibration: {}", err),
            }
        }
    }
}
