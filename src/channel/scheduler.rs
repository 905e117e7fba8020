//! Discrete-event scheduler interface consumed by the channel.

use embassy_time::{Duration, Instant};

use super::phy::{NodeId, PhyHandle};
use crate::spectrum::SignalParameters;

/// A deferred receive event: `signal` reaches `receiver` when the event fires,
/// at which point the host hands it back to `MultiModelSpectrumChannel::start_rx`.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub signal: SignalParameters,
    pub receiver: PhyHandle,
}

pub trait Scheduler {
    /// Current simulated time.
    fn now(&self) -> Instant;

    fn is_finished(&self) -> bool;

    /// Schedule `delivery` at `now() + delay` without an execution context.
    fn schedule(&mut self, delay: Duration, delivery: Delivery);

    /// Schedule `delivery` at `now() + delay` in the execution context of `node`.
    fn schedule_with_context(&mut self, node: NodeId, delay: Duration, delivery: Delivery);
}
