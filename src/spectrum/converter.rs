//! Conversion of PSD values between spectrum models.
//!
//! The conversion re-bins a density: the power a source band contributes to a
//! target band is `psd · overlap`, and the target density is that power spread
//! over the target band width. Total power is conserved for the overlapping
//! part of the spectrum.

use std::sync::Arc;

use super::model::{SpectrumModel, SpectrumValue};

/// Precomputed conversion from one spectrum model to another.
#[derive(Debug, Clone)]
pub struct SpectrumConverter {
    from: Arc<SpectrumModel>,
    to: Arc<SpectrumModel>,
    /// For each target band, the (source band index, coefficient) pairs with a
    /// non-zero coefficient.
    matrix: Vec<Vec<(usize, f64)>>,
}

impl SpectrumConverter {
    pub fn new(from: Arc<SpectrumModel>, to: Arc<SpectrumModel>) -> Self {
        let matrix = to
            .bands()
            .iter()
            .map(|target| {
                let width = target.width();
                from.bands()
                    .iter()
                    .enumerate()
                    .filter_map(|(j, source)| {
                        let overlap = target.overlap(source);
                        (overlap > 0.0 && width > 0.0).then(|| (j, overlap / width))
                    })
                    .collect()
            })
            .collect();
        Self { from, to, matrix }
    }

    pub fn from_model(&self) -> &Arc<SpectrumModel> {
        &self.from
    }

    pub fn to_model(&self) -> &Arc<SpectrumModel> {
        &self.to
    }

    pub fn convert(&self, psd: &SpectrumValue) -> SpectrumValue {
        assert_eq!(
            psd.model_uid(),
            self.from.uid(),
            "converter built for spectrum model {} cannot convert a PSD of model {}",
            self.from.uid(),
            psd.model_uid()
        );
        let input = psd.values();
        let values = self
            .matrix
            .iter()
            .map(|row| row.iter().map(|&(j, coeff)| coeff * input[j]).sum())
            .collect();
        SpectrumValue::from_values(self.to.clone(), values)
    }
}
