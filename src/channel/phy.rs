//! Endpoint capability consumed by the channel.
//!
//! Endpoints (physical-layer instances) are owned by the host. The channel only
//! keeps `PhyHandle`s: a stable id plus a weak reference used to query the
//! endpoint and deliver signals to it.

use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::antenna::AntennaModel;
use crate::propagation::Vector;
use crate::spectrum::{SignalParameters, SpectrumModel};

/// Identity of an endpoint.
pub type PhyId = u32;
/// Identity of the node an endpoint's device is attached to.
pub type NodeId = u32;

pub trait SpectrumPhy {
    fn id(&self) -> PhyId;

    /// Spectrum model the endpoint currently receives in. Must be set before
    /// the endpoint is registered with a channel.
    fn rx_spectrum_model(&self) -> Option<Arc<SpectrumModel>>;

    /// Current position, if the endpoint has mobility.
    fn position(&self) -> Option<Vector>;

    fn antenna(&self) -> Option<Arc<dyn AntennaModel>>;

    /// Node of the attached device, if the endpoint is attached to one.
    fn node_id(&self) -> Option<NodeId>;

    /// Deliver a signal that has reached this endpoint.
    fn start_rx(&self, params: SignalParameters);
}

/// Non-owning reference to an endpoint. Two handles are equal when their ids are.
#[derive(Clone)]
pub struct PhyHandle {
    id: PhyId,
    phy: Weak<dyn SpectrumPhy>,
}

impl PhyHandle {
    pub fn new<P: SpectrumPhy + 'static>(phy: &Rc<P>) -> Self {
        let weak: Weak<P> = Rc::downgrade(phy);
        Self { id: phy.id(), phy: weak }
    }

    pub fn from_dyn(phy: &Rc<dyn SpectrumPhy>) -> Self {
        Self {
            id: phy.id(),
            phy: Rc::downgrade(phy),
        }
    }

    /// A handle that never resolves to an endpoint.
    pub fn detached(id: PhyId) -> Self {
        let weak: Weak<dyn SpectrumPhy> = Weak::<NoPhy>::new();
        Self { id, phy: weak }
    }

    pub fn id(&self) -> PhyId {
        self.id
    }

    /// The endpoint, unless its owner has dropped it.
    pub fn upgrade(&self) -> Option<Rc<dyn SpectrumPhy>> {
        self.phy.upgrade()
    }
}

impl PartialEq for PhyHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PhyHandle {}

impl fmt::Debug for PhyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhyHandle({})", self.id)
    }
}

/// Placeholder type backing detached handles; never instantiated.
struct NoPhy;

impl SpectrumPhy for NoPhy {
    fn id(&self) -> PhyId {
        PhyId::MAX
    }

    fn rx_spectrum_model(&self) -> Option<Arc<SpectrumModel>> {
        None
    }

    fn position(&self) -> Option<Vector> {
        None
    }

    fn antenna(&self) -> Option<Arc<dyn AntennaModel>> {
        None
    }

    fn node_id(&self) -> Option<NodeId> {
        None
    }

    fn start_rx(&self, _params: SignalParameters) {}
}
