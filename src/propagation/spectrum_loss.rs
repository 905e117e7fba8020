//! Frequency-aware loss models applied at receive time.
//!
//! These run after the PSD has been converted to the receiver's spectrum
//! model and replace it with a per-band attenuated version.

use serde_json::json;
use std::f64::consts::PI;

use super::geometry::{Angles, Vector, distance};
use super::loss::{SPEED_OF_LIGHT, db_to_linear};
use crate::antenna::PhasedArrayModel;
use crate::spectrum::{SignalParameters, SpectrumValue};

/// Loss model producing a new PSD from the received signal.
pub trait SpectrumPropagationLossModel {
    fn calc_rx_psd(&mut self, params: &SignalParameters, tx_position: Option<Vector>, rx_position: Option<Vector>) -> SpectrumValue;
}

/// Loss model that needs the phased arrays of both ends and may reshape
/// any part of the signal, not only its PSD.
pub trait PhasedArraySpectrumPropagationLoss {
    fn calc_rx_signal(
        &mut self,
        params: SignalParameters,
        tx_position: Option<Vector>,
        rx_position: Option<Vector>,
        tx_array: &dyn PhasedArrayModel,
        rx_array: &dyn PhasedArrayModel,
    ) -> SignalParameters;
}

/// Free-space loss evaluated at each band's center frequency.
///
/// ```text
/// L(f) = max(1, (4π · d · f / c)²)
/// ```
///
/// The PSD is returned unchanged when a position is unknown or the ends are co-located.
#[derive(Debug, Clone, Copy, Default)]
pub struct FriisSpectrumPropagationLoss;

impl FriisSpectrumPropagationLoss {
    pub fn linear_loss(frequency_hz: f64, distance_m: f64) -> f64 {
        let sqrt_loss = 4.0 * PI * frequency_hz * distance_m / SPEED_OF_LIGHT;
        (sqrt_loss * sqrt_loss).max(1.0)
    }
}

impl SpectrumPropagationLossModel for FriisSpectrumPropagationLoss {
    fn calc_rx_psd(&mut self, params: &SignalParameters, tx_position: Option<Vector>, rx_position: Option<Vector>) -> SpectrumValue {
        let mut psd = params.psd.clone();
        let (Some(a), Some(b)) = (tx_position, rx_position) else {
            return psd;
        };
        let d = distance(&a, &b);
        if d == 0.0 {
            return psd;
        }
        let bands = psd.model().clone();
        for (v, band) in psd.values_mut().iter_mut().zip(bands.bands()) {
            *v /= Self::linear_loss(band.fc, d);
        }
        psd
    }
}

/// Metadata key under which `BeamformingGainLoss` records the applied gain.
pub const BEAMFORMING_GAIN_KEY: &str = "beamforming_gain_db";

/// Applies the combined beamforming gain of both arrays, each steered toward the other.
#[derive(Debug, Clone, Copy, Default)]
pub struct BeamformingGainLoss;

impl PhasedArraySpectrumPropagationLoss for BeamformingGainLoss {
    fn calc_rx_signal(
        &mut self,
        mut params: SignalParameters,
        tx_position: Option<Vector>,
        rx_position: Option<Vector>,
        tx_array: &dyn PhasedArrayModel,
        rx_array: &dyn PhasedArrayModel,
    ) -> SignalParameters {
        let (tx_angles, rx_angles) = match (tx_position, rx_position) {
            (Some(a), Some(b)) => (Angles::between(&b, &a), Angles::between(&a, &b)),
            _ => (Angles::default(), Angles::default()),
        };
        let gain_db = tx_array.beamforming_gain_db(&tx_angles) + rx_array.beamforming_gain_db(&rx_angles);
        params.psd *= db_to_linear(gain_db);
        params.metadata.insert(BEAMFORMING_GAIN_KEY.to_string(), json!(gain_db));
        params
    }
}
