//! Multi-model wireless spectrum channel.
//!
//! Connects transmitting and receiving endpoints that may each describe
//! signals in a different spectrum model (frequency band layout). A
//! transmission is fanned out to every other registered receiver with antenna
//! gains, propagation loss and delay applied, then converted to the
//! receiver's spectrum model when it arrives.
//!
//! - `spectrum`: spectrum models, PSD values, converters, signal parameters
//! - `antenna`: antenna gain patterns and phased arrays
//! - `propagation`: geometry, loss and delay models
//! - `channel`: `MultiModelSpectrumChannel` and its interfaces
//! - `simulation`: a deterministic event-driven host for the channel

pub mod antenna;
pub mod channel;
pub mod propagation;
pub mod simulation;
pub mod spectrum;
