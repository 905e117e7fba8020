//! A concrete endpoint that records what it receives.

use embassy_time::Instant;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use crate::antenna::AntennaModel;
use crate::channel::{NodeId, PhyHandle, PhyId, SpectrumPhy};
use crate::propagation::Vector;
use crate::spectrum::{SignalParameters, SpectrumModel};

/// One received signal.
#[derive(Debug, Clone)]
pub struct Reception {
    pub at: Instant,
    pub signal: SignalParameters,
}

/// Endpoint with a settable receive model, an optional position and antenna,
/// and a log of every signal delivered to it.
///
/// Arrival times are read from a clock shared with the simulator that owns the
/// endpoint; `SimplePhy::new` starts with its own clock stuck at zero.
pub struct SimplePhy {
    id: PhyId,
    node_id: Option<NodeId>,
    position: Cell<Option<Vector>>,
    antenna: Option<Arc<dyn AntennaModel>>,
    rx_model: RefCell<Option<Arc<SpectrumModel>>>,
    clock: Rc<Cell<Instant>>,
    received: RefCell<Vec<Reception>>,
}

impl SimplePhy {
    pub fn new(id: PhyId) -> Self {
        Self {
            id,
            node_id: None,
            position: Cell::new(None),
            antenna: None,
            rx_model: RefCell::new(None),
            clock: Rc::new(Cell::new(Instant::from_ticks(0))),
            received: RefCell::new(Vec::new()),
        }
    }

    pub fn with_node(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }

    pub fn with_position(self, position: Vector) -> Self {
        self.position.set(Some(position));
        self
    }

    pub fn with_antenna(mut self, antenna: Arc<dyn AntennaModel>) -> Self {
        self.antenna = Some(antenna);
        self
    }

    pub fn with_rx_spectrum_model(self, model: Arc<SpectrumModel>) -> Self {
        self.set_rx_spectrum_model(model);
        self
    }

    /// Read arrival times from `clock`.
    pub fn with_clock(mut self, clock: Rc<Cell<Instant>>) -> Self {
        self.clock = clock;
        self
    }

    pub fn into_rc(self) -> Rc<Self> {
        Rc::new(self)
    }

    /// Change the receive model. The endpoint must then be added to the channel again.
    pub fn set_rx_spectrum_model(&self, model: Arc<SpectrumModel>) {
        *self.rx_model.borrow_mut() = Some(model);
    }

    pub fn set_position(&self, position: Vector) {
        self.position.set(Some(position));
    }

    pub fn received(&self) -> Vec<Reception> {
        self.received.borrow().clone()
    }

    pub fn received_count(&self) -> usize {
        self.received.borrow().len()
    }

    /// Total received power (W) per reception, in arrival order.
    pub fn received_powers(&self) -> Vec<f64> {
        self.received.borrow().iter().map(|r| r.signal.psd.integral()).collect()
    }
}

/// Handle to an `Rc`-owned `SimplePhy`.
pub fn handle(phy: &Rc<SimplePhy>) -> PhyHandle {
    PhyHandle::new(phy)
}

impl SpectrumPhy for SimplePhy {
    fn id(&self) -> PhyId {
        self.id
    }

    fn rx_spectrum_model(&self) -> Option<Arc<SpectrumModel>> {
        self.rx_model.borrow().clone()
    }

    fn position(&self) -> Option<Vector> {
        self.position.get()
    }

    fn antenna(&self) -> Option<Arc<dyn AntennaModel>> {
        self.antenna.clone()
    }

    fn node_id(&self) -> Option<NodeId> {
        self.node_id
    }

    fn start_rx(&self, signal: SignalParameters) {
        let at = self.clock.get();
        log::debug!("Phy {} received {} W at {} us", self.id, signal.psd.integral(), at.as_micros());
        self.received.borrow_mut().push(Reception { at, signal });
    }
}
