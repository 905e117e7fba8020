//! Spectrum models and power spectral density values.
//!
//! A `SpectrumModel` is an immutable frequency-axis layout. Each model gets a
//! process-wide unique id at construction; two models are the same model only
//! when their ids match, even if their band layouts are identical.
//!
//! Units:
//! - Frequency: Hz
//! - PSD: W/Hz per band

use serde::Serialize;
use std::ops::{Index, MulAssign};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Unique identity of a spectrum model.
pub type SpectrumModelUid = u32;

static NEXT_UID: AtomicU32 = AtomicU32::new(1);

/// One band of a spectrum model: lower edge, center, upper edge (Hz).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandInfo {
    pub fl: f64,
    pub fc: f64,
    pub fh: f64,
}

impl BandInfo {
    pub fn new(fl: f64, fh: f64) -> Self {
        Self { fl, fc: (fl + fh) / 2.0, fh }
    }

    pub fn width(&self) -> f64 {
        self.fh - self.fl
    }

    /// Width of the frequency range shared with `other`; zero when the bands
    /// only touch or are disjoint.
    pub fn overlap(&self, other: &BandInfo) -> f64 {
        (self.fh.min(other.fh) - self.fl.max(other.fl)).max(0.0)
    }
}

#[derive(Debug)]
pub struct SpectrumModel {
    uid: SpectrumModelUid,
    bands: Vec<BandInfo>,
}

impl SpectrumModel {
    pub fn new(bands: Vec<BandInfo>) -> Arc<Self> {
        assert!(!bands.is_empty(), "a spectrum model needs at least one band");
        let uid = NEXT_UID.fetch_add(1, Ordering::Relaxed);
        Arc::new(Self { uid, bands })
    }

    /// Contiguous bands of equal width around the given center frequencies.
    pub fn from_center_frequencies(centers: &[f64], band_width: f64) -> Arc<Self> {
        let bands = centers
            .iter()
            .map(|&fc| BandInfo {
                fl: fc - band_width / 2.0,
                fc,
                fh: fc + band_width / 2.0,
            })
            .collect();
        Self::new(bands)
    }

    /// `band_count` contiguous bands of `band_width` starting at `start`.
    pub fn contiguous(start: f64, band_width: f64, band_count: usize) -> Arc<Self> {
        let bands = (0..band_count)
            .map(|i| {
                let fl = start + i as f64 * band_width;
                BandInfo::new(fl, fl + band_width)
            })
            .collect();
        Self::new(bands)
    }

    pub fn uid(&self) -> SpectrumModelUid {
        self.uid
    }

    pub fn bands(&self) -> &[BandInfo] {
        &self.bands
    }

    pub fn num_bands(&self) -> usize {
        self.bands.len()
    }

    /// True when no band of `self` overlaps any band of `other`.
    pub fn is_orthogonal(&self, other: &SpectrumModel) -> bool {
        !self.bands.iter().any(|a| other.bands.iter().any(|b| a.overlap(b) > 0.0))
    }
}

impl PartialEq for SpectrumModel {
    fn eq(&self, other: &Self) -> bool {
        self.uid == other.uid
    }
}

impl Eq for SpectrumModel {}

/// Power spectral density tagged with the spectrum model it is expressed in.
#[derive(Debug, Clone)]
pub struct SpectrumValue {
    model: Arc<SpectrumModel>,
    values: Vec<f64>,
}

impl SpectrumValue {
    /// All bands set to zero.
    pub fn zeros(model: Arc<SpectrumModel>) -> Self {
        let values = vec![0.0; model.num_bands()];
        Self { model, values }
    }

    pub fn from_values(model: Arc<SpectrumModel>, values: Vec<f64>) -> Self {
        assert_eq!(
            values.len(),
            model.num_bands(),
            "PSD has {} values but spectrum model {} has {} bands",
            values.len(),
            model.uid(),
            model.num_bands()
        );
        Self { model, values }
    }

    pub fn model(&self) -> &Arc<SpectrumModel> {
        &self.model
    }

    pub fn model_uid(&self) -> SpectrumModelUid {
        self.model.uid()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Total power in W (Σ psd · band width).
    pub fn integral(&self) -> f64 {
        self.values.iter().zip(self.model.bands()).map(|(v, b)| v * b.width()).sum()
    }
}

impl MulAssign<f64> for SpectrumValue {
    fn mul_assign(&mut self, rhs: f64) {
        for v in &mut self.values {
            *v *= rhs;
        }
    }
}

impl Index<usize> for SpectrumValue {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.values[index]
    }
}
