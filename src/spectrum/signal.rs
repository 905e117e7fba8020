//! Parameters of a transmitted signal as it travels through the channel.

use embassy_time::Duration;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use super::model::SpectrumValue;
use crate::antenna::AntennaModel;
use crate::channel::PhyHandle;

/// A signal on the medium.
///
/// `Clone` is the per-receiver deep copy: the PSD vector and the metadata are
/// owned by each copy, so a receiver scaling its PSD never affects another
/// receiver, the transmitter, or a trace consumer. The antenna handle is
/// shared since antenna models are immutable.
#[derive(Clone)]
pub struct SignalParameters {
    /// Transmitting endpoint (non-owning).
    pub tx_phy: PhyHandle,
    pub psd: SpectrumValue,
    pub tx_antenna: Option<Arc<dyn AntennaModel>>,
    pub duration: Duration,
    /// Free-form signal metadata; loss models may add or reshape entries.
    pub metadata: Map<String, Value>,
}

impl SignalParameters {
    pub fn new(tx_phy: PhyHandle, psd: SpectrumValue, duration: Duration) -> Self {
        Self {
            tx_phy,
            psd,
            tx_antenna: None,
            duration,
            metadata: Map::new(),
        }
    }

    pub fn with_antenna(mut self, antenna: Arc<dyn AntennaModel>) -> Self {
        self.tx_antenna = Some(antenna);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

impl fmt::Debug for SignalParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalParameters")
            .field("tx_phy", &self.tx_phy.id())
            .field("model", &self.psd.model_uid())
            .field("psd", &self.psd.values())
            .field("has_tx_antenna", &self.tx_antenna.is_some())
            .field("duration_us", &self.duration.as_micros())
            .field("metadata", &self.metadata)
            .finish()
    }
}
