//! Diagnostic trace outputs of the channel.
//!
//! Traces have no effect on channel behavior. Each trace can have several
//! subscribers; they are called in subscription order.

use serde::Serialize;

use super::phy::PhyId;
use crate::propagation::Vector;
use crate::spectrum::SignalParameters;

/// Decomposition of the path loss of one link, all in dB.
#[derive(Debug, Clone, Serialize)]
pub struct GainTrace {
    pub tx_position: Vector,
    pub rx_position: Vector,
    pub tx_antenna_gain_db: f64,
    pub rx_antenna_gain_db: f64,
    pub propagation_gain_db: f64,
    pub path_loss_db: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathLossTrace {
    pub tx_phy: PhyId,
    pub rx_phy: PhyId,
    pub path_loss_db: f64,
}

/// A list of callbacks fired with a reference to a trace record.
pub struct TracedCallback<T> {
    callbacks: Vec<Box<dyn FnMut(&T)>>,
}

impl<T> Default for TracedCallback<T> {
    fn default() -> Self {
        Self { callbacks: Vec::new() }
    }
}

impl<T> TracedCallback<T> {
    pub fn connect(&mut self, callback: impl FnMut(&T) + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    pub fn is_connected(&self) -> bool {
        !self.callbacks.is_empty()
    }

    pub fn fire(&mut self, record: &T) {
        for cb in &mut self.callbacks {
            cb(record);
        }
    }
}

#[derive(Default)]
pub struct ChannelTraces {
    /// Every transmitted signal, as an independent copy.
    pub tx_signal: TracedCallback<SignalParameters>,
    pub gain: TracedCallback<GainTrace>,
    pub path_loss: TracedCallback<PathLossTrace>,
}
