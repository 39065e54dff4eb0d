use std::time::Duration;

use rand::Rng;

/// Cool-down policy applied between connection attempts.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CooldownPolicy {
    pub(crate) cool_down: Duration,
    pub(crate) jitter: f64,
    pub(crate) penalty_threshold: u32,
    pub(crate) penalty: Duration,
}

impl CooldownPolicy {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.cool_down.is_zero() {
            return Err("Cool-down must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter) || !self.jitter.is_finite() {
            return Err("Jitter must be between 0.0 and 1.0".to_string());
        }
        Ok(())
    }

    /// Whether the penalty applies after `failures` consecutive failures.
    pub(crate) fn penalized(&self, failures: u32) -> bool {
        failures > self.penalty_threshold
    }

    /// Total wait before the next attempt, `failures` already incremented.
    pub(crate) fn delay_after(&self, failures: u32) -> Duration {
        let base = jittered(self.cool_down, self.jitter);
        if self.penalized(failures) {
            base + self.penalty
        } else {
            base
        }
    }
}

fn jittered(base: Duration, jitter: f64) -> Duration {
    if jitter == 0.0 {
        return base;
    }

    let base = base.as_secs_f64();
    let mut rng = rand::rng();
    let randomized = rng.random_range(0.0..=base);
    let blended = base * (1.0 - jitter) + randomized * jitter;
    Duration::from_secs_f64(blended)
}
