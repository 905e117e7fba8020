//! Frequency-domain representation of signals.
//!
//! - `model`: spectrum model identity and band layout, PSD values
//! - `converter`: PSD re-binning between two non-orthogonal models
//! - `signal`: the signal parameters carried from transmitter to receivers

pub mod converter;
pub mod model;
pub mod signal;

pub use converter::SpectrumConverter;
pub use model::{BandInfo, SpectrumModel, SpectrumModelUid, SpectrumValue};
pub use signal::SignalParameters;
