//! Learning-rate schedule: log-linear decay with optional warm-up delay.

use std::f64::consts::FRAC_PI_2;

/// Stateful exponential decay from `lr_init` to `lr_final` over `max_steps`.
///
/// When a delay is configured, the rate is damped during the first
/// `delay_steps` by a sine ramp starting at `delay_mult` of nominal.
/// The driver reads [`last_lr`](Self::last_lr) before each optimizer step
/// and [`step`](Self::step)s afterwards.
#[derive(Debug, Clone)]
pub struct LrDecay {
    lr_init: f64,
    lr_final: f64,
    max_steps: usize,
    delay_steps: usize,
    delay_mult: f64,
    step: usize,
    last_lr: f64,
}

impl LrDecay {
    /// A schedule with no warm-up delay, positioned at step 0.
    pub fn new(lr_init: f64, lr_final: f64, max_steps: usize) -> Self {
        let mut schedule = Self {
            lr_init,
            lr_final,
            max_steps: max_steps.max(1),
            delay_steps: 0,
            delay_mult: 1.0,
            step: 0,
            last_lr: 0.0,
        };
        schedule.last_lr = schedule.lr_at(0);
        schedule
    }

    /// Configure the warm-up delay.
    pub fn with_delay(mut self, delay_steps: usize, delay_mult: f64) -> Self {
        self.delay_steps = delay_steps;
        self.delay_mult = delay_mult;
        self.last_lr = self.lr_at(self.step);
        self
    }

    /// Fast-forward to `step`, as after resuming from a checkpoint.
    pub fn advanced_to(mut self, step: usize) -> Self {
        self.step = step;
        self.last_lr = self.lr_at(step);
        self
    }

    /// The rate the schedule prescribes at an arbitrary step.
    pub fn lr_at(&self, step: usize) -> f64 {
        let t = (step as f64 / self.max_steps as f64).clamp(0.0, 1.0);
        let log_lerp = (self.lr_init.ln() * (1.0 - t) + self.lr_final.ln() * t).exp();
        let delay = if self.delay_steps > 0 {
            let p = (step as f64 / self.delay_steps as f64).clamp(0.0, 1.0);
            self.delay_mult + (1.0 - self.delay_mult) * (FRAC_PI_2 * p).sin()
        } else {
            1.0
        };
        delay * log_lerp
    }

    /// Advance one step and return the new rate.
    pub fn step(&mut self) -> f64 {
        self.step += 1;
        self.last_lr = self.lr_at(self.step);
        self.last_lr
    }

    /// The rate most recently computed.
    pub fn last_lr(&self) -> f64 {
        self.last_lr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decay_is_monotone_without_delay() {
        let mut schedule = LrDecay::new(5e-4, 5e-6, 1000);
        let mut previous = schedule.last_lr();
        for _ in 0..1000 {
            let lr = schedule.step();
            assert!(lr <= previous + 1e-15, "lr increased: {lr} > {previous}");
            previous = lr;
        }
        assert!((previous - 5e-6).abs() < 1e-9);
    }

    #[test]
    fn test_endpoints() {
        let schedule = LrDecay::new(1e-3, 1e-5, 100);
        assert!((schedule.lr_at(0) - 1e-3).abs() < 1e-12);
        assert!((schedule.lr_at(100) - 1e-5).abs() < 1e-12);
        // Past the end the rate pins to the final value.
        assert!((schedule.lr_at(500) - 1e-5).abs() < 1e-12);
    }

    #[test]
    fn test_delay_damps_early_steps() {
        let plain = LrDecay::new(5e-4, 5e-6, 1000);
        let delayed = LrDecay::new(5e-4, 5e-6, 1000).with_delay(100, 0.01);
        assert!(delayed.lr_at(0) < plain.lr_at(0) * 0.02);
        // Once the delay window has passed the two agree.
        assert!((delayed.lr_at(100) - plain.lr_at(100)).abs() < 1e-15);
        assert!((delayed.lr_at(500) - plain.lr_at(500)).abs() < 1e-15);
    }

    #[test]
    fn test_advanced_to_matches_stepping() {
        let mut stepped = LrDecay::new(5e-4, 5e-6, 1000).with_delay(50, 0.1);
        for _ in 0..77 {
            stepped.step();
        }
        let jumped = LrDecay::new(5e-4, 5e-6, 1000)
            .with_delay(50, 0.1)
            .advanced_to(77);
        assert_eq!(stepped.last_lr(), jumped.last_lr());
    }

    #[test]
    fn test_geometric_midpoint() {
        // Log-linear interpolation passes through the geometric mean.
        let schedule = LrDecay::new(1e-2, 1e-6, 100);
        assert!((schedule.lr_at(50) - 1e-4).abs() < 1e-10);
    }
}
