//! Propagation delay models.
//!
//! Simulated time has microsecond resolution (the default embassy-time tick
//! rate), so delays are rounded to the nearest microsecond.

use embassy_time::Duration;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::geometry::{Vector, distance};
use super::loss::SPEED_OF_LIGHT;

pub trait PropagationDelayModel {
    fn delay(&mut self, a: &Vector, b: &Vector) -> Duration;
}

/// Convert seconds to a `Duration`, rounding to the nearest microsecond.
pub fn duration_from_secs_f64(secs: f64) -> Duration {
    Duration::from_micros((secs.max(0.0) * 1_000_000.0).round() as u64)
}

/// Delay proportional to distance.
#[derive(Debug, Clone, Copy)]
pub struct ConstantSpeedPropagationDelay {
    pub speed_mps: f64,
}

impl Default for ConstantSpeedPropagationDelay {
    fn default() -> Self {
        Self { speed_mps: SPEED_OF_LIGHT }
    }
}

impl PropagationDelayModel for ConstantSpeedPropagationDelay {
    fn delay(&mut self, a: &Vector, b: &Vector) -> Duration {
        duration_from_secs_f64(distance(a, b) / self.speed_mps)
    }
}

/// Delay drawn uniformly from `[min, max]`, independent of the positions.
#[derive(Debug, Clone)]
pub struct RandomPropagationDelay {
    min_us: u64,
    max_us: u64,
    rng: StdRng,
}

impl RandomPropagationDelay {
    pub fn new(min: Duration, max: Duration, seed: u64) -> Self {
        assert!(min <= max, "random delay bounds are inverted");
        Self {
            min_us: min.as_micros(),
            max_us: max.as_micros(),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl PropagationDelayModel for RandomPropagationDelay {
    fn delay(&mut self, _a: &Vector, _b: &Vector) -> Duration {
        Duration::from_micros(self.rng.gen_range(self.min_us..=self.max_us))
    }
}
