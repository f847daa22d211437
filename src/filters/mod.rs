//! Single-axis correction filters (spec §4.2). Each filter type implements
//! `GuideFilter`; a `FilterChain` composes several by value (no heap-allocated
//! graph, per DESIGN NOTES "Chained filters" — the outer filter calls the
//! inner first, then applies its own stage).

mod hysteresis;
mod identity;
mod lowpass;
mod resist_switch;

pub use hysteresis::Hysteresis;
pub use identity::Identity;
pub use lowpass::Lowpass;
pub use resist_switch::ResistSwitch;

/// A single-axis scalar filter: `result(input) -> output`, with a dead-zone
/// (`min_move`) and a `reset()` to clear internal state.
pub trait GuideFilter: Send {
    fn result(&mut self, input: f64) -> f64;
    fn reset(&mut self);
    fn min_move(&self) -> f64;
}

enum Stage {
    Identity(Identity),
    Hysteresis(Hysteresis),
    Lowpass(Lowpass),
    ResistSwitch(ResistSwitch),
}

impl Stage {
    fn result(&mut self, input: f64) -> f64 {
        match self {
            Stage::Identity(f) => f.result(input),
            Stage::Hysteresis(f) => f.result(input),
            Stage::Lowpass(f) => f.result(input),
            Stage::ResistSwitch(f) => f.result(input),
        }
    }

    fn reset(&mut self) {
        match self {
            Stage::Identity(f) => f.reset(),
            Stage::Hysteresis(f) => f.reset(),
            Stage::Lowpass(f) => f.reset(),
            Stage::ResistSwitch(f) => f.reset(),
        }
    }
}

/// A small, fixed sequence of filter stages applied inner-to-outer, built at
/// construction time (the `m_pChained` wrapping in the original source,
/// re-modeled as a value instead of a pointer graph).
pub struct FilterChain {
    stages: Vec<Stage>,
}

impl FilterChain {
    pub fn new() -> Self {
        FilterChain { stages: Vec::new() }
    }

    pub fn with_identity(mut self) -> Self {
        self.stages.push(Stage::Identity(Identity::new(0.0)));
        self
    }

    pub fn with_hysteresis(mut self, min_move: f64, hysteresis: f64, aggression: f64) -> Self {
        self.stages.push(Stage::Hysteresis(Hysteresis::new(min_move, hysteresis, aggression)));
        self
    }

    pub fn with_lowpass(mut self, min_move: f64, slope_weight: f64) -> Self {
        self.stages.push(Stage::Lowpass(Lowpass::new(min_move, slope_weight)));
        self
    }

    pub fn with_resist_switch(mut self, min_move: f64) -> Self {
        self.stages.push(Stage::ResistSwitch(ResistSwitch::new(min_move)));
        self
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        FilterChain::new().with_identity()
    }
}

impl GuideFilter for FilterChain {
    fn result(&mut self, input: f64) -> f64 {
        let mut value = input;
        for stage in &mut self.stages {
            value = stage.result(value);
        }
        value
    }

    fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }

    fn min_move(&self) -> f64 {
        self.stages.last().map(Stage::min_move).unwrap_or(0.0)
    }
}

impl Stage {
    fn min_move(&self) -> f64 {
        match self {
            Stage::Identity(f) => f.min_move(),
            Stage::Hysteresis(f) => f.min_move(),
            Stage::Lowpass(f) => f.min_move(),
            Stage::ResistSwitch(f) => f.min_move(),
        }
    }
}
