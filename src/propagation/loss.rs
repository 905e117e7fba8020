//! Scalar propagation loss models and power unit helpers.
//!
//! Contains:
//! - Friis free-space loss
//! - Log-distance path loss with optional log-normal shadowing
//! - A hard range cut-off
//! - dBm/mW and dB/linear conversions
//!
//! Units:
//! - Power: dBm, mW
//! - Distance: meters

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use std::f64::consts::PI;

use super::geometry::{Vector, distance};

/// Speed of light in vacuum (m/s).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// A deterministic or stochastic model of the power lost between two positions.
pub trait PropagationLossModel {
    /// Received power in dBm for a transmission of `tx_power_dbm` from `a` to `b`.
    ///
    /// With `tx_power_dbm == 0` the result is the propagation gain in dB.
    fn calc_rx_power(&mut self, tx_power_dbm: f64, a: &Vector, b: &Vector) -> f64;
}

/// Friis free-space model.
///
/// ```text
/// L = -10 · log10( λ² / ((4π)² · d² · L_sys) )
/// ```
///
/// The loss never goes below `min_loss_db`, which also covers `d = 0`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FriisPropagationLoss {
    pub frequency_hz: f64,
    #[serde(default = "default_system_loss")]
    pub system_loss: f64,
    #[serde(default)]
    pub min_loss_db: f64,
}

fn default_system_loss() -> f64 {
    1.0
}

impl FriisPropagationLoss {
    pub fn new(frequency_hz: f64) -> Self {
        Self {
            frequency_hz,
            system_loss: 1.0,
            min_loss_db: 0.0,
        }
    }

    pub fn loss_db(&self, distance_m: f64) -> f64 {
        if distance_m <= 0.0 {
            return self.min_loss_db;
        }
        let lambda = SPEED_OF_LIGHT / self.frequency_hz;
        let numerator = lambda * lambda;
        let denominator = 16.0 * PI * PI * distance_m * distance_m * self.system_loss;
        let loss = -10.0 * (numerator / denominator).log10();
        loss.max(self.min_loss_db)
    }
}

impl PropagationLossModel for FriisPropagationLoss {
    fn calc_rx_power(&mut self, tx_power_dbm: f64, a: &Vector, b: &Vector) -> f64 {
        tx_power_dbm - self.loss_db(distance(a, b))
    }
}

/// Parameters of the log-distance path loss model with log-normal shadowing.
#[derive(Debug, Clone, Deserialize)]
pub struct LogDistanceParameters {
    /// Path loss exponent (n).
    /// - n = 2.0: Free space
    /// - n = 2.7 to 3.5: Urban areas
    /// - n = 3.0 to 5.0: Indoor obstructed environments
    pub path_loss_exponent: f64,

    /// Standard deviation of the shadowing term (σ) in dB. 0 disables shadowing.
    #[serde(default)]
    pub shadowing_sigma: f64,

    /// Reference distance d₀ in meters.
    #[serde(default = "default_reference_distance")]
    pub reference_distance: f64,

    /// Path loss at d₀ in dB.
    pub path_loss_at_reference_distance: f64,
}

fn default_reference_distance() -> f64 {
    1.0
}

/// Log-distance path loss model.
///
/// ```text
/// PL(d) = PL(d₀) + 10 × n × log₁₀(d/d₀) + X_σ
/// ```
///
/// For distances below d₀ the reference loss is returned without shadowing.
/// `X_σ` is drawn from Normal(0, σ) with the model's own seeded generator,
/// so a run is reproducible for a given seed.
#[derive(Debug, Clone)]
pub struct LogDistancePropagationLoss {
    params: LogDistanceParameters,
    shadowing: Option<Normal<f64>>,
    rng: StdRng,
}

impl LogDistancePropagationLoss {
    pub fn new(params: LogDistanceParameters, seed: u64) -> Self {
        let shadowing = if params.shadowing_sigma > 0.0 {
            Normal::new(0.0, params.shadowing_sigma).ok()
        } else {
            None
        };
        Self {
            params,
            shadowing,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn params(&self) -> &LogDistanceParameters {
        &self.params
    }

    pub fn path_loss_db(&mut self, distance_m: f64) -> f64 {
        let p = &self.params;
        if distance_m < p.reference_distance {
            return p.path_loss_at_reference_distance;
        }
        let path_loss = p.path_loss_at_reference_distance + 10.0 * p.path_loss_exponent * (distance_m / p.reference_distance).log10();
        let shadowing = match &self.shadowing {
            Some(normal) => normal.sample(&mut self.rng),
            None => 0.0,
        };
        path_loss + shadowing
    }
}

impl PropagationLossModel for LogDistancePropagationLoss {
    fn calc_rx_power(&mut self, tx_power_dbm: f64, a: &Vector, b: &Vector) -> f64 {
        tx_power_dbm - self.path_loss_db(distance(a, b))
    }
}

/// Received power for links longer than `max_range_m`.
pub const OUT_OF_RANGE_RX_POWER_DBM: f64 = -1000.0;

/// Lossless within range, `OUT_OF_RANGE_RX_POWER_DBM` beyond it.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RangePropagationLoss {
    pub max_range_m: f64,
}

impl PropagationLossModel for RangePropagationLoss {
    fn calc_rx_power(&mut self, tx_power_dbm: f64, a: &Vector, b: &Vector) -> f64 {
        if distance(a, b) <= self.max_range_m {
            tx_power_dbm
        } else {
            OUT_OF_RANGE_RX_POWER_DBM
        }
    }
}

/// Convert dBm to mW: `P(mW) = 10^(P(dBm) / 10)`.
pub fn dbm_to_mw(dbm: f64) -> f64 {
    10f64.powf(dbm / 10.0)
}

/// Convert mW to dBm: `P(dBm) = 10 × log₁₀(P(mW))`. Not defined for `mw <= 0`.
pub fn mw_to_dbm(mw: f64) -> f64 {
    10.0 * mw.log10()
}

/// Linear power ratio of a gain in dB.
pub fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 10.0)
}

pub fn linear_to_db(ratio: f64) -> f64 {
    10.0 * ratio.log10()
}
