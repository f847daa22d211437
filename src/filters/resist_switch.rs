use super::GuideFilter;

/// After a sign change relative to the last non-zero output, withholds
/// output (returns 0) until two consecutive inputs above `min_move` agree
/// on the new sign — resisting a single noisy sample from flipping the
/// guide direction. Matches the "resist switching axis direction" algorithm
/// referenced alongside `guide_algorithm_ra.cpp`'s RA-specific policies.
#[derive(Debug, Clone, Copy)]
pub struct ResistSwitch {
    min_move: f64,
    last_sign: f64,
    pending_sign: f64,
    pending_count: u32,
}

impl ResistSwitch {
    pub fn new(min_move: f64) -> Self {
        ResistSwitch { min_move, last_sign: 0.0, pending_sign: 0.0, pending_count: 0 }
    }
}

impl GuideFilter for ResistSwitch {
    fn result(&mut self, input: f64) -> f64 {
        if input.abs() < self.min_move {
            return 0.0;
        }
        let sign = input.signum();

        if self.last_sign == 0.0 || sign == self.last_sign {
            self.last_sign = sign;
            self.pending_sign = 0.0;
            self.pending_count = 0;
            return input;
        }

        if sign == self.pending_sign {
            self.pending_count += 1;
        } else {
            self.pending_sign = sign;
            self.pending_count = 1;
        }

        if self.pending_count >= 2 {
            self.last_sign = sign;
            self.pending_sign = 0.0;
            self.pending_count = 0;
            input
        } else {
            0.0
        }
    }

    fn reset(&mut self) {
        self.last_sign = 0.0;
        self.pending_sign = 0.0;
        self.pending_count = 0;
    }

    fn min_move(&self) -> f64 {
        self.min_move
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_input_always_passes() {
        let mut f = ResistSwitch::new(0.0);
        assert_eq!(f.result(3.0), 3.0);
    }

    #[test]
    fn single_reversal_is_withheld() {
        let mut f = ResistSwitch::new(0.0);
        f.result(3.0);
        f.result(3.0);
        assert_eq!(f.result(-2.0), 0.0);
    }

    #[test]
    fn two_consecutive_reversals_resume_output() {
        let mut f = ResistSwitch::new(0.0);
        f.result(3.0);
        f.result(-2.0);
        assert_eq!(f.result(-2.0), -2.0);
    }

    #[test]
    fn a_flip_back_before_confirmation_resets_the_pending_count() {
        let mut f = ResistSwitch::new(0.0);
        f.result(3.0);
        f.result(-2.0); // pending negative, count 1
        f.result(3.0); // back to the established sign, passes through and clears pending
        assert_eq!(f.result(-2.0), 0.0); // reversal withheld again, fresh count
        assert_eq!(f.result(-2.0), -2.0);
    }

    #[test]
    fn dead_zone_yields_zero_without_touching_state() {
        let mut f = ResistSwitch::new(1.0);
        f.result(3.0);
        assert_eq!(f.result(0.5), 0.0);
        assert_eq!(f.result(-3.0), 0.0);
        assert_eq!(f.result(-3.0), -3.0);
    }
}
