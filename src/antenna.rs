//! Antenna models queried by the channel for directional gains.
//!
//! Gains are in dBi and looked up with the direction of the far end as seen
//! from the antenna (`Angles`). An antenna that also behaves as a phased
//! array exposes that capability through `AntennaModel::as_phased_array`.

use crate::propagation::geometry::{Angles, deg_to_rad, wrap_to_pi};

pub trait AntennaModel {
    /// Gain in dB toward the given direction.
    fn gain_db(&self, angles: &Angles) -> f64;

    /// Phased-array capability, if this antenna has one.
    fn as_phased_array(&self) -> Option<&dyn PhasedArrayModel> {
        None
    }
}

/// Capability of an antenna made of several elements whose beam can be steered.
pub trait PhasedArrayModel {
    fn num_elements(&self) -> usize;

    /// Gain in dB toward `angles` with the beam steered in that direction.
    fn beamforming_gain_db(&self, angles: &Angles) -> f64;
}

/// Same gain in every direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsotropicAntenna {
    pub gain_db: f64,
}

impl IsotropicAntenna {
    pub fn new(gain_db: f64) -> Self {
        Self { gain_db }
    }
}

impl AntennaModel for IsotropicAntenna {
    fn gain_db(&self, _angles: &Angles) -> f64 {
        self.gain_db
    }
}

/// Horizontal parabolic pattern: `-min(12 · (φ / θ3dB)², Amax)`.
///
/// `φ` is the azimuth offset from the boresight and `θ3dB` the 3 dB beamwidth.
#[derive(Debug, Clone, Copy)]
pub struct ParabolicAntenna {
    pub boresight_deg: f64,
    pub beamwidth_deg: f64,
    pub max_attenuation_db: f64,
}

impl Default for ParabolicAntenna {
    fn default() -> Self {
        Self {
            boresight_deg: 0.0,
            beamwidth_deg: 60.0,
            max_attenuation_db: 20.0,
        }
    }
}

impl AntennaModel for ParabolicAntenna {
    fn gain_db(&self, angles: &Angles) -> f64 {
        let phi = wrap_to_pi(angles.azimuth - deg_to_rad(self.boresight_deg));
        let ratio = phi / deg_to_rad(self.beamwidth_deg);
        -(12.0 * ratio * ratio).min(self.max_attenuation_db)
    }
}

/// Rectangular array of identical elements.
///
/// The beam is assumed steered toward the far end, so the array adds
/// `10·log10(rows · columns)` dB on top of the element gain.
pub struct UniformPlanarArray {
    pub rows: usize,
    pub columns: usize,
    pub element: Box<dyn AntennaModel>,
}

impl UniformPlanarArray {
    pub fn new(rows: usize, columns: usize, element: Box<dyn AntennaModel>) -> Self {
        assert!(rows > 0 && columns > 0, "a planar array needs at least one element");
        Self { rows, columns, element }
    }

    pub fn isotropic(rows: usize, columns: usize) -> Self {
        Self::new(rows, columns, Box::new(IsotropicAntenna::default()))
    }
}

impl AntennaModel for UniformPlanarArray {
    fn gain_db(&self, angles: &Angles) -> f64 {
        self.beamforming_gain_db(angles)
    }

    fn as_phased_array(&self) -> Option<&dyn PhasedArrayModel> {
        Some(self)
    }
}

impl PhasedArrayModel for UniformPlanarArray {
    fn num_elements(&self) -> usize {
        self.rows * self.columns
    }

    fn beamforming_gain_db(&self, angles: &Angles) -> f64 {
        self.element.gain_db(angles) + 10.0 * (self.num_elements() as f64).log10()
    }
}
