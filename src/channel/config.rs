//! Channel configuration.

use serde::Deserialize;

/// Tunables of `MultiModelSpectrumChannel`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// Links whose path loss exceeds this value (dB) are out of range and get
    /// no delivery. Absent from a scene file means unlimited.
    #[serde(default = "default_max_loss_db")]
    pub max_loss_db: f64,

    /// Whether a delivery scheduled before its receiver was removed from the
    /// channel still reaches the receiver. Pending deliveries are never cancelled.
    #[serde(default = "default_deliver_to_detached")]
    pub deliver_to_detached: bool,
}

fn default_max_loss_db() -> f64 {
    f64::INFINITY
}

fn default_deliver_to_detached() -> bool {
    true
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_loss_db: default_max_loss_db(),
            deliver_to_detached: default_deliver_to_detached(),
        }
    }
}
