//! Deterministic discrete-event driver for a `MultiModelSpectrumChannel`.
//!
//! The simulator is the channel's `Scheduler`: deliveries the channel
//! schedules land in the event queue, and when they fire the simulator hands
//! them back to `start_rx`. Host transmissions are queued the same way.

use embassy_time::{Duration, Instant};
use log::{debug, trace};
use serde::Serialize;
use std::cell::Cell;
use std::rc::Rc;

use super::events::{Event, EventQueue};
use crate::channel::{Delivery, MultiModelSpectrumChannel, NodeId, Scheduler};
use crate::spectrum::SignalParameters;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SimulationStats {
    pub transmissions: u64,
    pub deliveries_scheduled: u64,
    /// Deliveries that reached their receiver.
    pub receptions: u64,
    /// Deliveries dropped at receive time (orthogonal models, detached or dropped receivers).
    pub discarded: u64,
}

pub struct Simulator {
    queue: EventQueue,
    clock: Rc<Cell<Instant>>,
    stop_time: Option<Instant>,
    stopped: bool,
    stats: SimulationStats,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    pub fn new() -> Self {
        Self {
            queue: EventQueue::new(),
            clock: Rc::new(Cell::new(Instant::from_ticks(0))),
            stop_time: None,
            stopped: false,
            stats: SimulationStats::default(),
        }
    }

    /// Events scheduled after `stop_time` are never processed.
    pub fn with_stop_time(mut self, stop_time: Instant) -> Self {
        self.stop_time = Some(stop_time);
        self
    }

    /// Clock advanced by the simulator; endpoints read arrival times from it.
    pub fn clock(&self) -> Rc<Cell<Instant>> {
        self.clock.clone()
    }

    pub fn stats(&self) -> SimulationStats {
        self.stats
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Queue a host transmission at absolute time `at`.
    ///
    /// # Panics
    ///
    /// If `at` is in the past.
    pub fn schedule_transmission(&mut self, at: Instant, params: SignalParameters) {
        assert!(at >= self.now(), "cannot schedule a transmission in the past");
        let context = params.tx_phy.upgrade().and_then(|p| p.node_id());
        self.queue.schedule(at, context, Event::Transmit(params));
    }

    /// Process the next event. Returns `false` once there is nothing left to do.
    pub fn step(&mut self, channel: &mut MultiModelSpectrumChannel) -> bool {
        let Some(next) = self.queue.peek_earliest() else {
            return false;
        };
        if let Some(stop_time) = self.stop_time {
            if next.time() > stop_time {
                debug!("Stop time {} us reached with {} pending events", stop_time.as_micros(), self.queue.len());
                self.stopped = true;
                return false;
            }
        }
        let Some(event) = self.queue.pop_earliest() else {
            return false;
        };

        self.clock.set(event.time());
        trace!("t = {} us, context {:?}", event.time().as_micros(), event.context());
        match event.into_event() {
            Event::Transmit(params) => {
                self.stats.transmissions += 1;
                let scheduled = channel.start_tx(params, self);
                self.stats.deliveries_scheduled += scheduled as u64;
            }
            Event::Deliver(delivery) => {
                if channel.start_rx(delivery) {
                    self.stats.receptions += 1;
                } else {
                    self.stats.discarded += 1;
                }
            }
        }
        true
    }

    /// Process events until the queue drains or the stop time is reached.
    pub fn run(&mut self, channel: &mut MultiModelSpectrumChannel) -> SimulationStats {
        while self.step(channel) {}
        self.stats
    }

    fn push_delivery(&mut self, context: Option<NodeId>, delay: Duration, delivery: Delivery) {
        let at = self.now() + delay;
        self.queue.schedule(at, context, Event::Deliver(delivery));
    }
}

impl Scheduler for Simulator {
    fn now(&self) -> Instant {
        self.clock.get()
    }

    fn is_finished(&self) -> bool {
        self.stopped || self.queue.is_empty()
    }

    fn schedule(&mut self, delay: Duration, delivery: Delivery) {
        self.push_delivery(None, delay, delivery);
    }

    fn schedule_with_context(&mut self, node: NodeId, delay: Duration, delivery: Delivery) {
        self.push_delivery(Some(node), delay, delivery);
    }
}
