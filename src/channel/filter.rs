//! Transmit filters: predicates that veto a (signal, receiver) pair before any
//! link computation is done for it.

use super::phy::SpectrumPhy;
use crate::spectrum::SignalParameters;

pub trait TransmitFilter {
    /// `true` drops the receiver for this transmission.
    fn filter(&self, params: &SignalParameters, receiver: &dyn SpectrumPhy) -> bool;
}

impl<F> TransmitFilter for F
where
    F: Fn(&SignalParameters, &dyn SpectrumPhy) -> bool,
{
    fn filter(&self, params: &SignalParameters, receiver: &dyn SpectrumPhy) -> bool {
        self(params, receiver)
    }
}

/// Drops receivers whose spectrum model shares no band with the signal's.
///
/// Such a signal would be discarded at receive time anyway; filtering it here
/// saves the link computation and the scheduled event.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrthogonalModelFilter;

impl TransmitFilter for OrthogonalModelFilter {
    fn filter(&self, params: &SignalParameters, receiver: &dyn SpectrumPhy) -> bool {
        match receiver.rx_spectrum_model() {
            Some(rx_model) => params.psd.model().is_orthogonal(&rx_model),
            None => false,
        }
    }
}
