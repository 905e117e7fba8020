//! Physical propagation between two positions.
//!
//! - `geometry`: positions, distances and direction angles
//! - `loss`: scalar path loss models (Friis, log-distance with shadowing, range)
//! - `delay`: propagation delay models
//! - `spectrum_loss`: per-band loss models applied at receive time

pub mod delay;
pub mod geometry;
pub mod loss;
pub mod spectrum_loss;

pub use delay::{ConstantSpeedPropagationDelay, PropagationDelayModel, RandomPropagationDelay};
pub use geometry::{Angles, Vector};
pub use loss::{FriisPropagationLoss, LogDistanceParameters, LogDistancePropagationLoss, PropagationLossModel, RangePropagationLoss};
pub use spectrum_loss::{BeamformingGainLoss, FriisSpectrumPropagationLoss, PhasedArraySpectrumPropagationLoss, SpectrumPropagationLossModel};
