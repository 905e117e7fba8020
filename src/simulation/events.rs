//! Time-ordered event queue of the simulator.

use embassy_time::Instant;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::channel::{Delivery, NodeId};
use crate::spectrum::SignalParameters;

#[derive(Debug)]
pub enum Event {
    /// A host-scheduled transmission, handed to `MultiModelSpectrumChannel::start_tx`.
    Transmit(SignalParameters),
    /// A signal reaching its receiver, handed to `MultiModelSpectrumChannel::start_rx`.
    Deliver(Delivery),
}

#[derive(Debug)]
pub struct ScheduledEvent {
    time: Instant,
    sequence: u64,
    /// Node in whose context the event executes, if any.
    context: Option<NodeId>,
    event: Event,
}

impl ScheduledEvent {
    pub fn new(time: Instant, sequence: u64, context: Option<NodeId>, event: Event) -> Self {
        Self {
            time,
            sequence,
            context,
            event,
        }
    }

    pub fn time(&self) -> Instant {
        self.time
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn context(&self) -> Option<NodeId> {
        self.context
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn into_event(self) -> Event {
        self.event
    }
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.sequence == other.sequence
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: reverse both keys so the earliest time, then the lowest sequence, pops first
        match other.time.cmp(&self.time) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            ord => ord,
        }
    }
}

/// Events ordered by time; events at the same time keep their scheduling order.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<ScheduledEvent>,
    next_sequence: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, time: Instant, context: Option<NodeId>, event: Event) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(ScheduledEvent::new(time, sequence, context, event));
    }

    pub fn pop_earliest(&mut self) -> Option<ScheduledEvent> {
        self.heap.pop()
    }

    pub fn peek_earliest(&self) -> Option<&ScheduledEvent> {
        self.heap.peek()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}
