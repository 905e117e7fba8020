//! Multi-model spectrum channel.
//!
//! Delivers a transmitted signal to every other registered receiver, whatever
//! spectrum model each one listens in.
//!
//! Flow of one transmission:
//! 1) `start_tx` walks all receivers, skips the transmitter itself, receivers on
//!    the transmitter's node and receivers vetoed by a transmit filter.
//! 2) For each remaining receiver it deep-copies the signal, applies antenna
//!    gains and propagation loss when both ends have a position, drops links
//!    beyond `max_loss_db`, computes the propagation delay and schedules a
//!    `Delivery`.
//! 3) When the delivery fires, the host calls `start_rx`, which converts the PSD
//!    to the receiver's spectrum model (or drops it if the models are
//!    orthogonal), applies the spectrum-aware or phased-array loss model if one
//!    is installed, and hands the signal to the receiver.

use embassy_time::Duration;
use log::{debug, trace};
use std::sync::Arc;

use super::config::ChannelConfig;
use super::error::{ChannelError, ChannelResult};
use super::filter::TransmitFilter;
use super::phy::{PhyHandle, PhyId, SpectrumPhy};
use super::registry::SpectrumModelRegistry;
use super::scheduler::{Delivery, Scheduler};
use super::trace::{ChannelTraces, GainTrace, PathLossTrace};
use crate::propagation::loss::db_to_linear;
use crate::propagation::{Angles, PhasedArraySpectrumPropagationLoss, PropagationDelayModel, PropagationLossModel, SpectrumPropagationLossModel, Vector};
use crate::spectrum::{SignalParameters, SpectrumModel, SpectrumModelUid};

const SPECTRUM_LOSS_KIND: &str = "spectrum-aware";
const PHASED_ARRAY_LOSS_KIND: &str = "phased-array";

/// Outcome of the link computation for one transmitter/receiver pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    /// Receiver is the transmitter itself.
    SelfLink,
    SameNode,
    Filtered,
    OutOfRange,
    Scheduled,
}

#[derive(Default)]
pub struct MultiModelSpectrumChannel {
    config: ChannelConfig,
    registry: SpectrumModelRegistry,
    propagation_loss: Option<Box<dyn PropagationLossModel>>,
    propagation_delay: Option<Box<dyn PropagationDelayModel>>,
    spectrum_loss: Option<Box<dyn SpectrumPropagationLossModel>>,
    phased_array_loss: Option<Box<dyn PhasedArraySpectrumPropagationLoss>>,
    filters: Vec<Box<dyn TransmitFilter>>,
    traces: ChannelTraces,
}

impl MultiModelSpectrumChannel {
    /// Channel with default configuration and no loss, delay or filter installed.
    ///
    /// Without a propagation loss model the only gains are the antenna gains;
    /// without a delay model every delivery is scheduled with zero delay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel with the given configuration.
    ///
    /// # Parameters
    ///
    /// * `config` - Max loss threshold and detached-receiver policy
    pub fn with_config(config: ChannelConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Links whose total path loss exceeds `max_loss_db` get no delivery.
    pub fn set_max_loss_db(&mut self, max_loss_db: f64) {
        self.config.max_loss_db = max_loss_db;
    }

    /// Whether pending deliveries still reach receivers removed after scheduling.
    pub fn set_deliver_to_detached(&mut self, deliver: bool) {
        self.config.deliver_to_detached = deliver;
    }

    /// Scalar loss model evaluated at transmit time for every positioned link.
    ///
    /// The model is queried with a 0 dBm transmit power, so its result is the
    /// propagation gain in dB.
    pub fn set_propagation_loss_model(&mut self, model: Box<dyn PropagationLossModel>) {
        self.propagation_loss = Some(model);
    }

    pub fn set_propagation_delay_model(&mut self, model: Box<dyn PropagationDelayModel>) {
        self.propagation_delay = Some(model);
    }

    /// Install a spectrum-aware loss model, applied at receive time after conversion.
    ///
    /// # Parameters
    ///
    /// * `model` - Replaces any spectrum-aware model installed before
    ///
    /// # Returns
    ///
    /// `Err(ChannelError::ConflictingSpectrumLossModels)` if a phased-array loss model is installed.
    pub fn set_spectrum_propagation_loss_model(&mut self, model: Box<dyn SpectrumPropagationLossModel>) -> ChannelResult<()> {
        if self.phased_array_loss.is_some() {
            return Err(ChannelError::ConflictingSpectrumLossModels {
                installed: PHASED_ARRAY_LOSS_KIND,
                requested: SPECTRUM_LOSS_KIND,
            });
        }
        self.spectrum_loss = Some(model);
        Ok(())
    }

    /// Install a phased-array-aware loss model, applied at receive time after conversion.
    ///
    /// Both ends of every link then need an antenna with phased-array capability.
    ///
    /// # Returns
    ///
    /// `Err(ChannelError::ConflictingSpectrumLossModels)` if a spectrum-aware loss model is installed.
    pub fn set_phased_array_spectrum_propagation_loss_model(&mut self, model: Box<dyn PhasedArraySpectrumPropagationLoss>) -> ChannelResult<()> {
        if self.spectrum_loss.is_some() {
            return Err(ChannelError::ConflictingSpectrumLossModels {
                installed: SPECTRUM_LOSS_KIND,
                requested: PHASED_ARRAY_LOSS_KIND,
            });
        }
        self.phased_array_loss = Some(model);
        Ok(())
    }

    /// Append a filter; a receiver is skipped if any filter vetoes it.
    pub fn add_transmit_filter(&mut self, filter: Box<dyn TransmitFilter>) {
        self.filters.push(filter);
    }

    pub fn traces_mut(&mut self) -> &mut ChannelTraces {
        &mut self.traces
    }

    /// Subscribe to transmitted signals. Each subscriber sees an independent copy.
    pub fn on_tx_signal(&mut self, callback: impl FnMut(&SignalParameters) + 'static) {
        self.traces.tx_signal.connect(callback);
    }

    /// Subscribe to the gain decomposition of every positioned link.
    pub fn on_gain(&mut self, callback: impl FnMut(&GainTrace) + 'static) {
        self.traces.gain.connect(callback);
    }

    pub fn on_path_loss(&mut self, callback: impl FnMut(&PathLossTrace) + 'static) {
        self.traces.path_loss.connect(callback);
    }

    /// Register `phy` as a receiver, in the spectrum model it currently exposes.
    ///
    /// Call again whenever the endpoint's receive model changes.
    ///
    /// # Panics
    ///
    /// If the endpoint is gone or has no receive spectrum model yet.
    pub fn add_rx(&mut self, phy: &PhyHandle) {
        let Some(endpoint) = phy.upgrade() else {
            panic!("endpoint {} was dropped before being added to the channel", phy.id());
        };
        let Some(model) = endpoint.rx_spectrum_model() else {
            panic!(
                "endpoint {} has no receive spectrum model; set it before adding the endpoint to the channel",
                phy.id()
            );
        };
        debug!("Adding receiver {} with SpectrumModelUid {}", phy.id(), model.uid());
        self.registry.add_rx(phy.clone(), model);
    }

    /// Detach a receiver. Unknown receivers are ignored.
    pub fn remove_rx(&mut self, phy_id: PhyId) {
        if self.registry.remove_rx(phy_id) {
            debug!("Removed receiver {}", phy_id);
        }
    }

    pub fn device_count(&self) -> usize {
        self.registry.device_count()
    }

    /// The `index`-th registered receiver. Slow: walks every model bucket.
    pub fn device_at(&self, index: usize) -> &PhyHandle {
        self.registry.device_at(index)
    }

    pub fn is_registered(&self, phy_id: PhyId) -> bool {
        self.registry.contains(phy_id)
    }

    pub fn find_or_register_tx_model(&mut self, model: &Arc<SpectrumModel>) {
        self.registry.find_or_register_tx(model);
    }

    pub fn converter_pairs(&self) -> Vec<(SpectrumModelUid, SpectrumModelUid)> {
        self.registry.converter_pairs()
    }

    pub fn tx_model_count(&self) -> usize {
        self.registry.tx_model_count()
    }

    pub fn rx_model_count(&self) -> usize {
        self.registry.rx_model_count()
    }

    /// Forget every receiver and cached converter.
    pub fn dispose(&mut self) {
        self.registry.clear();
    }

    /// Start a transmission. Returns the number of deliveries scheduled.
    ///
    /// # Panics
    ///
    /// If the transmitting endpoint is gone, or a registered receiver changed
    /// its spectrum model without being added again.
    pub fn start_tx(&mut self, params: SignalParameters, scheduler: &mut dyn Scheduler) -> usize {
        assert!(!params.psd.is_empty(), "cannot transmit an empty PSD");
        let Some(tx) = params.tx_phy.upgrade() else {
            panic!("transmitting endpoint {} is gone", params.tx_phy.id());
        };

        if self.traces.tx_signal.is_connected() {
            let copy = params.clone();
            self.traces.tx_signal.fire(&copy);
        }

        debug!("Transmission from {} with SpectrumModelUid {}", params.tx_phy.id(), params.psd.model_uid());

        let receivers: Vec<(SpectrumModelUid, PhyHandle)> = self.registry.receivers().map(|(uid, p)| (uid, p.clone())).collect();
        let mut scheduled = 0;
        for (rx_uid, handle) in receivers {
            let Some(rx) = handle.upgrade() else {
                debug!("Receiver {} was dropped without being removed, skipping", handle.id());
                continue;
            };
            let current_uid = rx.rx_spectrum_model().map(|m| m.uid());
            assert_eq!(
                current_uid,
                Some(rx_uid),
                "spectrum model change of receiver {} was not notified to the channel (add_rx must be called again after the model changes)",
                handle.id()
            );

            let link = self.transmit_to(&params, tx.as_ref(), &handle, rx.as_ref(), scheduler);
            trace!("Link {} -> {}: {:?}", params.tx_phy.id(), handle.id(), link);
            if link == Link::Scheduled {
                scheduled += 1;
            }
        }
        scheduled
    }

    fn transmit_to(&mut self, params: &SignalParameters, tx: &dyn SpectrumPhy, handle: &PhyHandle, rx: &dyn SpectrumPhy, scheduler: &mut dyn Scheduler) -> Link {
        if handle.id() == params.tx_phy.id() {
            return Link::SelfLink;
        }

        let rx_node = rx.node_id();
        if let (Some(rx_node), Some(tx_node)) = (rx_node, tx.node_id()) {
            if rx_node == tx_node {
                debug!("Skipping link between antennas of the same node {}", rx_node);
                return Link::SameNode;
            }
        }

        if self.filters.iter().any(|f| f.filter(params, rx)) {
            return Link::Filtered;
        }

        let mut rx_params = params.clone();
        let mut delay = Duration::from_ticks(0);

        if let (Some(tx_position), Some(rx_position)) = (tx.position(), rx.position()) {
            let path_loss_db = self.path_loss_db(params, handle.id(), &tx_position, rx, &rx_position);
            if path_loss_db > self.config.max_loss_db {
                debug!(
                    "Receiver {} out of range: path loss {} dB > {} dB",
                    handle.id(),
                    path_loss_db,
                    self.config.max_loss_db
                );
                return Link::OutOfRange;
            }
            rx_params.psd *= db_to_linear(-path_loss_db);

            if let Some(delay_model) = self.propagation_delay.as_mut() {
                delay = delay_model.delay(&tx_position, &rx_position);
            }
        }

        let delivery = Delivery {
            signal: rx_params,
            receiver: handle.clone(),
        };
        match rx_node {
            Some(node) => scheduler.schedule_with_context(node, delay, delivery),
            None => scheduler.schedule(delay, delivery),
        }
        Link::Scheduled
    }

    /// Total path loss in dB: `-(tx antenna gain) - (rx antenna gain) - (propagation gain)`.
    fn path_loss_db(&mut self, params: &SignalParameters, rx_id: PhyId, tx_position: &Vector, rx: &dyn SpectrumPhy, rx_position: &Vector) -> f64 {
        let tx_antenna_gain_db = match &params.tx_antenna {
            Some(antenna) => antenna.gain_db(&Angles::between(rx_position, tx_position)),
            None => 0.0,
        };
        let rx_antenna_gain_db = match rx.antenna() {
            Some(antenna) => antenna.gain_db(&Angles::between(tx_position, rx_position)),
            None => 0.0,
        };
        let propagation_gain_db = match self.propagation_loss.as_mut() {
            // Co-located ends: no propagation loss
            Some(_) if tx_position == rx_position => 0.0,
            Some(model) => model.calc_rx_power(0.0, tx_position, rx_position),
            None => 0.0,
        };
        let path_loss_db = -tx_antenna_gain_db - rx_antenna_gain_db - propagation_gain_db;
        trace!(
            "txAntennaGain = {} dB, rxAntennaGain = {} dB, propagationGain = {} dB, pathLoss = {} dB",
            tx_antenna_gain_db, rx_antenna_gain_db, propagation_gain_db, path_loss_db
        );

        self.traces.gain.fire(&GainTrace {
            tx_position: *tx_position,
            rx_position: *rx_position,
            tx_antenna_gain_db,
            rx_antenna_gain_db,
            propagation_gain_db,
            path_loss_db,
        });
        self.traces.path_loss.fire(&PathLossTrace {
            tx_phy: params.tx_phy.id(),
            rx_phy: rx_id,
            path_loss_db,
        });
        path_loss_db
    }

    /// Handle a delivery that has fired. Returns whether the receiver got the signal.
    ///
    /// # Panics
    ///
    /// If the receiver has no receive spectrum model, or a phased-array loss
    /// model is installed and either end lacks a phased-array antenna. With a
    /// phased-array loss model, a signal whose transmitter was dropped is
    /// discarded instead.
    pub fn start_rx(&mut self, delivery: Delivery) -> bool {
        let Delivery { mut signal, receiver } = delivery;
        let Some(rx) = receiver.upgrade() else {
            debug!("Receiver {} is gone, discarding signal", receiver.id());
            return false;
        };
        if !self.config.deliver_to_detached && !self.registry.contains(receiver.id()) {
            debug!("Receiver {} was removed from the channel, discarding signal", receiver.id());
            return false;
        }
        let Some(rx_model) = rx.rx_spectrum_model() else {
            panic!("receiver {} has no receive spectrum model", receiver.id());
        };

        let tx_uid = signal.psd.model_uid();
        let rx_uid = rx_model.uid();
        let tx_info = self.registry.find_or_register_tx(signal.psd.model());

        if tx_uid == rx_uid {
            trace!("No spectrum conversion needed");
        } else {
            let Some(converter) = tx_info.converters.get(&rx_uid) else {
                debug!(
                    "SpectrumModelUid {} is orthogonal to {}, receiver {} gets nothing",
                    tx_uid,
                    rx_uid,
                    receiver.id()
                );
                return false;
            };
            trace!("Converting PSD from SpectrumModelUid {} to {}", tx_uid, rx_uid);
            signal.psd = converter.convert(&signal.psd);
        }

        let tx = signal.tx_phy.upgrade();
        let tx_position = tx.as_ref().and_then(|p| p.position());
        if let Some(model) = self.spectrum_loss.as_mut() {
            signal.psd = model.calc_rx_psd(&signal, tx_position, rx.position());
        } else if let Some(model) = self.phased_array_loss.as_mut() {
            let Some(tx) = tx.as_ref() else {
                debug!(
                    "Transmitter {} is gone, discarding signal to receiver {}",
                    signal.tx_phy.id(),
                    receiver.id()
                );
                return false;
            };
            let tx_antenna = tx.antenna();
            let rx_antenna = rx.antenna();
            let tx_array = tx_antenna.as_deref().and_then(|a| a.as_phased_array());
            let rx_array = rx_antenna.as_deref().and_then(|a| a.as_phased_array());
            let (Some(tx_array), Some(rx_array)) = (tx_array, rx_array) else {
                panic!("phased-array antennas must be installed at both the transmitter and the receiver to use a phased-array loss model");
            };
            signal = model.calc_rx_signal(signal, tx_position, rx.position(), tx_array, rx_array);
        }

        rx.start_rx(signal);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::antenna::{AntennaModel, IsotropicAntenna, UniformPlanarArray};
    use crate::channel::OrthogonalModelFilter;
    use crate::channel::phy::NodeId;
    use crate::propagation::spectrum_loss::BEAMFORMING_GAIN_KEY;
    use crate::propagation::{BeamformingGainLoss, ConstantSpeedPropagationDelay, FriisPropagationLoss, FriisSpectrumPropagationLoss};
    use crate::spectrum::{BandInfo, SpectrumValue};
    use embassy_time::Instant;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    struct TestPhy {
        id: PhyId,
        node: Option<NodeId>,
        position: Cell<Option<Vector>>,
        model: RefCell<Option<Arc<SpectrumModel>>>,
        antenna: Option<Arc<dyn AntennaModel>>,
        received: RefCell<Vec<SignalParameters>>,
    }

    impl TestPhy {
        fn new(id: PhyId, model: &Arc<SpectrumModel>) -> Rc<Self> {
            Self::build(id, None, None, Some(model.clone()), None)
        }

        fn build(
            id: PhyId,
            node: Option<NodeId>,
            position: Option<Vector>,
            model: Option<Arc<SpectrumModel>>,
            antenna: Option<Arc<dyn AntennaModel>>,
        ) -> Rc<Self> {
            Rc::new(Self {
                id,
                node,
                position: Cell::new(position),
                model: RefCell::new(model),
                antenna,
                received: RefCell::new(Vec::new()),
            })
        }

        fn received_count(&self) -> usize {
            self.received.borrow().len()
        }
    }

    impl SpectrumPhy for TestPhy {
        fn id(&self) -> PhyId {
            self.id
        }

        fn rx_spectrum_model(&self) -> Option<Arc<SpectrumModel>> {
            self.model.borrow().clone()
        }

        fn position(&self) -> Option<Vector> {
            self.position.get()
        }

        fn antenna(&self) -> Option<Arc<dyn AntennaModel>> {
            self.antenna.clone()
        }

        fn node_id(&self) -> Option<NodeId> {
            self.node
        }

        fn start_rx(&self, params: SignalParameters) {
            self.received.borrow_mut().push(params);
        }
    }

    #[derive(Default)]
    struct RecordingScheduler {
        scheduled: Vec<(Option<NodeId>, Duration, Delivery)>,
    }

    impl RecordingScheduler {
        fn deliveries(&mut self) -> Vec<Delivery> {
            self.scheduled.drain(..).map(|(_, _, d)| d).collect()
        }
    }

    impl Scheduler for RecordingScheduler {
        fn now(&self) -> Instant {
            Instant::from_ticks(0)
        }

        fn is_finished(&self) -> bool {
            false
        }

        fn schedule(&mut self, delay: Duration, delivery: Delivery) {
            self.scheduled.push((None, delay, delivery));
        }

        fn schedule_with_context(&mut self, node: NodeId, delay: Duration, delivery: Delivery) {
            self.scheduled.push((Some(node), delay, delivery));
        }
    }

    fn model_a() -> Arc<SpectrumModel> {
        SpectrumModel::contiguous(2.400e9, 1e6, 4)
    }

    fn signal_from(phy: &Rc<TestPhy>, model: &Arc<SpectrumModel>, value: f64) -> SignalParameters {
        let psd = SpectrumValue::from_values(model.clone(), vec![value; model.num_bands()]);
        SignalParameters::new(PhyHandle::new(phy), psd, Duration::from_micros(500))
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() <= 1e-9 * b.abs().max(1e-30), "{} != {}", a, b);
    }

    fn deliver_all(channel: &mut MultiModelSpectrumChannel, scheduler: &mut RecordingScheduler) -> usize {
        scheduler.deliveries().into_iter().filter(|d| channel.start_rx(d.clone())).count()
    }

    #[test]
    fn same_model_receivers_get_the_psd_unchanged() {
        let model = model_a();
        let tx = TestPhy::new(1, &model);
        let rx = TestPhy::new(2, &model);
        let mut channel = MultiModelSpectrumChannel::new();
        channel.add_rx(&PhyHandle::new(&tx));
        channel.add_rx(&PhyHandle::new(&rx));

        let mut scheduler = RecordingScheduler::default();
        assert_eq!(channel.start_tx(signal_from(&tx, &model, 1e-9), &mut scheduler), 1);
        assert_eq!(scheduler.scheduled[0].2.receiver.id(), 2);
        assert_eq!(deliver_all(&mut channel, &mut scheduler), 1);

        assert_eq!(tx.received_count(), 0);
        let received = rx.received.borrow();
        assert_eq!(received[0].psd.model_uid(), model.uid());
        assert_eq!(received[0].psd.values(), &[1e-9; 4]);
        assert_eq!(received[0].tx_phy.id(), 1);
    }

    #[test]
    fn psd_is_converted_to_the_receiver_model() {
        let tx_model = model_a();
        // One wide band covering the first two tx bands
        let rx_model = SpectrumModel::new(vec![BandInfo::new(2.400e9, 2.402e9)]);
        let tx = TestPhy::new(1, &tx_model);
        let rx = TestPhy::new(2, &rx_model);
        let mut channel = MultiModelSpectrumChannel::new();
        channel.add_rx(&PhyHandle::new(&rx));

        let psd = SpectrumValue::from_values(tx_model.clone(), vec![1.0, 3.0, 5.0, 7.0]);
        let params = SignalParameters::new(PhyHandle::new(&tx), psd, Duration::from_micros(10));
        let mut scheduler = RecordingScheduler::default();
        channel.start_tx(params, &mut scheduler);
        assert_eq!(deliver_all(&mut channel, &mut scheduler), 1);

        let received = rx.received.borrow();
        assert_eq!(received[0].psd.model_uid(), rx_model.uid());
        assert_close(received[0].psd[0], 2.0);
        assert_eq!(channel.converter_pairs(), vec![(tx_model.uid(), rx_model.uid())]);
    }

    #[test]
    fn orthogonal_receivers_get_nothing() {
        let tx_model = model_a();
        let rx_model = SpectrumModel::contiguous(5.0e9, 1e6, 4);
        let tx = TestPhy::new(1, &tx_model);
        let rx = TestPhy::new(2, &rx_model);
        let mut channel = MultiModelSpectrumChannel::new();
        channel.add_rx(&PhyHandle::new(&rx));

        let mut scheduler = RecordingScheduler::default();
        assert_eq!(channel.start_tx(signal_from(&tx, &tx_model, 1.0), &mut scheduler), 1);
        assert_eq!(deliver_all(&mut channel, &mut scheduler), 0);
        assert_eq!(rx.received_count(), 0);
        assert!(channel.converter_pairs().is_empty());

        channel.add_transmit_filter(Box::new(OrthogonalModelFilter));
        assert_eq!(channel.start_tx(signal_from(&tx, &tx_model, 1.0), &mut scheduler), 0);
    }

    #[test]
    fn transmitter_and_same_node_receivers_are_skipped() {
        let model = model_a();
        let tx = TestPhy::build(1, Some(10), None, Some(model.clone()), None);
        let sibling = TestPhy::build(2, Some(10), None, Some(model.clone()), None);
        let other = TestPhy::build(3, Some(11), None, Some(model.clone()), None);
        let no_node = TestPhy::new(4, &model);
        let mut channel = MultiModelSpectrumChannel::new();
        for phy in [&tx, &sibling, &other, &no_node] {
            channel.add_rx(&PhyHandle::new(phy));
        }

        let mut scheduler = RecordingScheduler::default();
        assert_eq!(channel.start_tx(signal_from(&tx, &model, 1.0), &mut scheduler), 2);
        let targets: Vec<(Option<NodeId>, PhyId)> = scheduler.scheduled.iter().map(|(ctx, _, d)| (*ctx, d.receiver.id())).collect();
        assert!(targets.contains(&(Some(11), 3)));
        assert!(targets.contains(&(None, 4)));
    }

    #[test]
    fn transmit_filter_vetoes_receivers() {
        let model = model_a();
        let tx = TestPhy::new(1, &model);
        let rx2 = TestPhy::new(2, &model);
        let rx3 = TestPhy::new(3, &model);
        let mut channel = MultiModelSpectrumChannel::new();
        channel.add_rx(&PhyHandle::new(&rx2));
        channel.add_rx(&PhyHandle::new(&rx3));
        channel.add_transmit_filter(Box::new(|_: &SignalParameters, rx: &dyn SpectrumPhy| rx.id() == 3));

        let mut scheduler = RecordingScheduler::default();
        assert_eq!(channel.start_tx(signal_from(&tx, &model, 1.0), &mut scheduler), 1);
        assert_eq!(scheduler.scheduled[0].2.receiver.id(), 2);
    }

    #[test]
    fn antenna_and_propagation_gains_scale_the_psd() {
        let model = model_a();
        let tx = TestPhy::build(
            1,
            None,
            Some(Vector::new(0.0, 0.0, 0.0)),
            Some(model.clone()),
            None,
        );
        let rx = TestPhy::build(
            2,
            None,
            Some(Vector::new(100.0, 0.0, 0.0)),
            Some(model.clone()),
            Some(Arc::new(IsotropicAntenna::new(2.0))),
        );
        let friis = FriisPropagationLoss::new(2.4e9);
        let expected_loss_db = friis.loss_db(100.0) - 3.0 - 2.0;

        let mut channel = MultiModelSpectrumChannel::new();
        channel.set_propagation_loss_model(Box::new(friis));
        channel.add_rx(&PhyHandle::new(&rx));
        let gains = Rc::new(RefCell::new(Vec::new()));
        let path_losses = Rc::new(RefCell::new(Vec::new()));
        {
            let gains = gains.clone();
            channel.on_gain(move |g| gains.borrow_mut().push(g.clone()));
            let path_losses = path_losses.clone();
            channel.on_path_loss(move |p| path_losses.borrow_mut().push(p.clone()));
        }

        let params = signal_from(&tx, &model, 1.0).with_antenna(Arc::new(IsotropicAntenna::new(3.0)));
        let mut scheduler = RecordingScheduler::default();
        channel.start_tx(params, &mut scheduler);

        let delivery = &scheduler.scheduled[0].2;
        assert_close(delivery.signal.psd[0], 10f64.powf(-expected_loss_db / 10.0));

        let gains = gains.borrow();
        assert_eq!(gains.len(), 1);
        assert_eq!(gains[0].tx_antenna_gain_db, 3.0);
        assert_eq!(gains[0].rx_antenna_gain_db, 2.0);
        assert_close(gains[0].propagation_gain_db, -friis.loss_db(100.0));
        assert_close(gains[0].path_loss_db, expected_loss_db);
        let path_losses = path_losses.borrow();
        assert_eq!((path_losses[0].tx_phy, path_losses[0].rx_phy), (1, 2));
    }

    #[test]
    fn co_located_ends_have_no_propagation_loss() {
        let model = model_a();
        let here = Some(Vector::new(5.0, 5.0, 1.0));
        let tx = TestPhy::build(1, None, here, Some(model.clone()), None);
        let rx = TestPhy::build(2, None, here, Some(model.clone()), None);
        let mut channel = MultiModelSpectrumChannel::new();
        channel.set_propagation_loss_model(Box::new(FriisPropagationLoss::new(2.4e9)));
        channel.set_propagation_delay_model(Box::new(ConstantSpeedPropagationDelay::default()));
        channel.add_rx(&PhyHandle::new(&rx));

        let mut scheduler = RecordingScheduler::default();
        channel.start_tx(signal_from(&tx, &model, 0.5), &mut scheduler);
        let (_, delay, delivery) = &scheduler.scheduled[0];
        assert_eq!(delivery.signal.psd[0], 0.5);
        assert_eq!(*delay, Duration::from_ticks(0));
    }

    #[test]
    fn co_located_ends_keep_their_antenna_gains() {
        let model = model_a();
        let here = Some(Vector::new(-3.0, 8.0, 0.0));
        let tx = TestPhy::build(1, None, here, Some(model.clone()), None);
        let rx = TestPhy::build(2, None, here, Some(model.clone()), Some(Arc::new(IsotropicAntenna::new(2.0))));
        let mut channel = MultiModelSpectrumChannel::new();
        channel.set_propagation_loss_model(Box::new(FriisPropagationLoss::new(2.4e9)));
        channel.add_rx(&PhyHandle::new(&rx));
        let gains = Rc::new(RefCell::new(Vec::new()));
        {
            let gains = gains.clone();
            channel.on_gain(move |g| gains.borrow_mut().push(g.clone()));
        }

        let params = signal_from(&tx, &model, 0.5).with_antenna(Arc::new(IsotropicAntenna::new(3.0)));
        let mut scheduler = RecordingScheduler::default();
        channel.start_tx(params, &mut scheduler);

        assert_close(scheduler.scheduled[0].2.signal.psd[0], 0.5 * 10f64.powf(5.0 / 10.0));
        let gains = gains.borrow();
        assert_eq!(gains[0].propagation_gain_db, 0.0);
        assert_eq!(gains[0].path_loss_db, -5.0);
    }

    #[test]
    fn links_above_max_loss_are_dropped() {
        let model = model_a();
        let tx = TestPhy::build(1, None, Some(Vector::new(0.0, 0.0, 0.0)), Some(model.clone()), None);
        let near = TestPhy::build(2, None, Some(Vector::new(10.0, 0.0, 0.0)), Some(model.clone()), None);
        let far = TestPhy::build(3, None, Some(Vector::new(10_000.0, 0.0, 0.0)), Some(model.clone()), None);
        let friis = FriisPropagationLoss::new(2.4e9);
        let threshold = (friis.loss_db(10.0) + friis.loss_db(10_000.0)) / 2.0;

        let mut channel = MultiModelSpectrumChannel::new();
        channel.set_propagation_loss_model(Box::new(friis));
        channel.set_max_loss_db(threshold);
        channel.add_rx(&PhyHandle::new(&near));
        channel.add_rx(&PhyHandle::new(&far));
        let traced = Rc::new(Cell::new(0));
        {
            let traced = traced.clone();
            channel.on_path_loss(move |_| traced.set(traced.get() + 1));
        }

        let mut scheduler = RecordingScheduler::default();
        assert_eq!(channel.start_tx(signal_from(&tx, &model, 1.0), &mut scheduler), 1);
        assert_eq!(scheduler.scheduled[0].2.receiver.id(), 2);
        assert_eq!(traced.get(), 2);
    }

    #[test]
    fn endpoints_without_position_skip_loss_and_delay() {
        let model = model_a();
        let tx = TestPhy::new(1, &model);
        let rx = TestPhy::build(2, None, Some(Vector::new(1e6, 0.0, 0.0)), Some(model.clone()), None);
        let mut channel = MultiModelSpectrumChannel::new();
        channel.set_propagation_loss_model(Box::new(FriisPropagationLoss::new(2.4e9)));
        channel.set_propagation_delay_model(Box::new(ConstantSpeedPropagationDelay::default()));
        channel.set_max_loss_db(1.0);
        channel.add_rx(&PhyHandle::new(&rx));

        let mut scheduler = RecordingScheduler::default();
        assert_eq!(channel.start_tx(signal_from(&tx, &model, 2.0), &mut scheduler), 1);
        let (_, delay, delivery) = &scheduler.scheduled[0];
        assert_eq!(delivery.signal.psd[0], 2.0);
        assert_eq!(*delay, Duration::from_ticks(0));
    }

    #[test]
    fn delay_grows_with_distance() {
        let model = model_a();
        let tx = TestPhy::build(1, None, Some(Vector::new(0.0, 0.0, 0.0)), Some(model.clone()), None);
        let near = TestPhy::build(2, None, Some(Vector::new(100.0, 0.0, 0.0)), Some(model.clone()), None);
        let far = TestPhy::build(3, None, Some(Vector::new(0.0, 300.0, 0.0)), Some(model.clone()), None);
        let mut channel = MultiModelSpectrumChannel::new();
        channel.set_propagation_delay_model(Box::new(ConstantSpeedPropagationDelay { speed_mps: 1000.0 }));
        channel.add_rx(&PhyHandle::new(&far));
        channel.add_rx(&PhyHandle::new(&near));

        let mut scheduler = RecordingScheduler::default();
        channel.start_tx(signal_from(&tx, &model, 1.0), &mut scheduler);
        let mut delays: Vec<(PhyId, Duration)> = scheduler.scheduled.iter().map(|(_, delay, d)| (d.receiver.id(), *delay)).collect();
        delays.sort();
        assert_eq!(delays, vec![(2, Duration::from_millis(100)), (3, Duration::from_millis(300))]);
    }

    #[test]
    fn every_receiver_gets_its_own_copy() {
        let model = model_a();
        let tx = TestPhy::new(1, &model);
        let rx2 = TestPhy::new(2, &model);
        let rx3 = TestPhy::new(3, &model);
        let mut channel = MultiModelSpectrumChannel::new();
        channel.add_rx(&PhyHandle::new(&rx2));
        channel.add_rx(&PhyHandle::new(&rx3));
        let tx_copy = Rc::new(RefCell::new(None));
        {
            let tx_copy = tx_copy.clone();
            channel.on_tx_signal(move |p| *tx_copy.borrow_mut() = Some(p.clone()));
        }

        let mut scheduler = RecordingScheduler::default();
        channel.start_tx(signal_from(&tx, &model, 1.0).with_metadata("mcs", serde_json::json!(3)), &mut scheduler);
        let mut deliveries = scheduler.deliveries();
        deliveries[0].signal.psd *= 0.0;
        deliveries[0].signal.metadata.clear();

        assert_eq!(deliveries[1].signal.psd.values(), &[1.0; 4]);
        assert_eq!(deliveries[1].signal.metadata["mcs"], 3);
        let tx_copy = tx_copy.borrow();
        let tx_copy = tx_copy.as_ref().expect("tx trace fired");
        assert_eq!(tx_copy.psd.values(), &[1.0; 4]);
    }

    #[test]
    #[should_panic(expected = "was not notified")]
    fn unnotified_model_change_is_fatal() {
        let model = model_a();
        let tx = TestPhy::new(1, &model);
        let rx = TestPhy::new(2, &model);
        let mut channel = MultiModelSpectrumChannel::new();
        channel.add_rx(&PhyHandle::new(&rx));

        *rx.model.borrow_mut() = Some(SpectrumModel::contiguous(900e6, 200e3, 8));
        let mut scheduler = RecordingScheduler::default();
        channel.start_tx(signal_from(&tx, &model, 1.0), &mut scheduler);
    }

    #[test]
    fn re_adding_after_model_change_moves_the_receiver() {
        let model = model_a();
        let other = SpectrumModel::contiguous(2.401e9, 1e6, 4);
        let tx = TestPhy::new(1, &model);
        let rx = TestPhy::new(2, &model);
        let mut channel = MultiModelSpectrumChannel::new();
        let handle = PhyHandle::new(&rx);
        channel.add_rx(&handle);

        *rx.model.borrow_mut() = Some(other.clone());
        channel.add_rx(&handle);
        assert_eq!(channel.device_count(), 1);
        assert!(channel.is_registered(2));
        // The old model's entry stays; only the binding moves
        assert_eq!(channel.rx_model_count(), 2);

        let mut scheduler = RecordingScheduler::default();
        channel.start_tx(signal_from(&tx, &model, 1.0), &mut scheduler);
        assert_eq!(deliver_all(&mut channel, &mut scheduler), 1);
        assert_eq!(rx.received.borrow()[0].psd.model_uid(), other.uid());
    }

    #[test]
    #[should_panic(expected = "set it before adding")]
    fn adding_a_receiver_without_model_is_fatal() {
        let rx = TestPhy::build(2, None, None, None, None);
        MultiModelSpectrumChannel::new().add_rx(&PhyHandle::new(&rx));
    }

    #[test]
    fn removed_receiver_still_gets_pending_delivery_by_default() {
        let model = model_a();
        let tx = TestPhy::new(1, &model);
        let rx = TestPhy::new(2, &model);
        let mut channel = MultiModelSpectrumChannel::new();
        channel.add_rx(&PhyHandle::new(&rx));

        let mut scheduler = RecordingScheduler::default();
        channel.start_tx(signal_from(&tx, &model, 1.0), &mut scheduler);
        channel.remove_rx(2);
        assert!(!channel.is_registered(2));
        assert_eq!(deliver_all(&mut channel, &mut scheduler), 1);
        assert_eq!(rx.received_count(), 1);
    }

    #[test]
    fn removed_receiver_can_be_excluded_from_pending_deliveries() {
        let model = model_a();
        let tx = TestPhy::new(1, &model);
        let rx = TestPhy::new(2, &model);
        let mut channel = MultiModelSpectrumChannel::with_config(ChannelConfig {
            deliver_to_detached: false,
            ..ChannelConfig::default()
        });
        channel.add_rx(&PhyHandle::new(&rx));

        let mut scheduler = RecordingScheduler::default();
        channel.start_tx(signal_from(&tx, &model, 1.0), &mut scheduler);
        channel.remove_rx(2);
        assert_eq!(deliver_all(&mut channel, &mut scheduler), 0);
        assert_eq!(rx.received_count(), 0);
    }

    #[test]
    fn dropped_receivers_are_skipped() {
        let model = model_a();
        let tx = TestPhy::new(1, &model);
        let rx = TestPhy::new(2, &model);
        let kept = TestPhy::new(3, &model);
        let mut channel = MultiModelSpectrumChannel::new();
        channel.add_rx(&PhyHandle::new(&rx));
        channel.add_rx(&PhyHandle::new(&kept));

        let mut scheduler = RecordingScheduler::default();
        channel.start_tx(signal_from(&tx, &model, 1.0), &mut scheduler);
        drop(rx);
        assert_eq!(deliver_all(&mut channel, &mut scheduler), 1);
        assert_eq!(channel.start_tx(signal_from(&tx, &model, 1.0), &mut scheduler), 1);
    }

    #[test]
    fn spectrum_loss_models_are_mutually_exclusive() {
        let mut channel = MultiModelSpectrumChannel::new();
        channel.set_spectrum_propagation_loss_model(Box::new(FriisSpectrumPropagationLoss)).expect("first model");
        let err = channel
            .set_phased_array_spectrum_propagation_loss_model(Box::new(BeamformingGainLoss))
            .expect_err("conflicting model");
        assert_eq!(
            err,
            ChannelError::ConflictingSpectrumLossModels {
                installed: "spectrum-aware",
                requested: "phased-array",
            }
        );

        let mut channel = MultiModelSpectrumChannel::new();
        channel.set_phased_array_spectrum_propagation_loss_model(Box::new(BeamformingGainLoss)).expect("first model");
        assert!(channel.set_spectrum_propagation_loss_model(Box::new(FriisSpectrumPropagationLoss)).is_err());
        // Replacing a model of the same kind is fine
        assert!(channel.set_phased_array_spectrum_propagation_loss_model(Box::new(BeamformingGainLoss)).is_ok());
    }

    #[test]
    fn spectrum_aware_loss_runs_at_receive_time() {
        let model = model_a();
        let tx = TestPhy::build(1, None, Some(Vector::new(0.0, 0.0, 0.0)), Some(model.clone()), None);
        let rx = TestPhy::build(2, None, Some(Vector::new(50.0, 0.0, 0.0)), Some(model.clone()), None);
        let mut channel = MultiModelSpectrumChannel::new();
        channel.set_spectrum_propagation_loss_model(Box::new(FriisSpectrumPropagationLoss)).expect("no conflict");
        channel.add_rx(&PhyHandle::new(&rx));

        let mut scheduler = RecordingScheduler::default();
        channel.start_tx(signal_from(&tx, &model, 1.0), &mut scheduler);
        assert_eq!(scheduler.scheduled[0].2.signal.psd[0], 1.0);
        deliver_all(&mut channel, &mut scheduler);

        let received = rx.received.borrow();
        for (v, band) in received[0].psd.values().iter().zip(model.bands()) {
            assert_close(*v, 1.0 / FriisSpectrumPropagationLoss::linear_loss(band.fc, 50.0));
        }
    }

    #[test]
    fn phased_array_loss_uses_both_arrays() {
        let model = model_a();
        let tx_array: Arc<dyn AntennaModel> = Arc::new(UniformPlanarArray::isotropic(2, 2));
        let tx = TestPhy::build(1, None, Some(Vector::new(0.0, 0.0, 0.0)), Some(model.clone()), Some(tx_array));
        let rx = TestPhy::build(
            2,
            None,
            Some(Vector::new(0.0, 20.0, 0.0)),
            Some(model.clone()),
            Some(Arc::new(UniformPlanarArray::isotropic(1, 4))),
        );
        let mut channel = MultiModelSpectrumChannel::new();
        channel.set_phased_array_spectrum_propagation_loss_model(Box::new(BeamformingGainLoss)).expect("no conflict");
        channel.add_rx(&PhyHandle::new(&rx));

        let mut scheduler = RecordingScheduler::default();
        channel.start_tx(signal_from(&tx, &model, 1.0), &mut scheduler);
        // Without propagation loss, the rx antenna gain already applies at transmit time
        let at_tx = scheduler.scheduled[0].2.signal.psd[0];
        assert_close(at_tx, 4.0);
        deliver_all(&mut channel, &mut scheduler);

        let received = rx.received.borrow();
        let gain_db = received[0].metadata[BEAMFORMING_GAIN_KEY].as_f64().expect("gain recorded");
        assert_close(gain_db, 20.0 * 4f64.log10());
        assert_close(received[0].psd[0], at_tx * 16.0);
    }

    #[test]
    fn phased_array_loss_discards_signals_from_dropped_transmitters() {
        let model = model_a();
        let tx = TestPhy::build(
            1,
            None,
            Some(Vector::new(0.0, 0.0, 0.0)),
            Some(model.clone()),
            Some(Arc::new(UniformPlanarArray::isotropic(2, 2))),
        );
        let rx = TestPhy::build(
            2,
            None,
            Some(Vector::new(10.0, 0.0, 0.0)),
            Some(model.clone()),
            Some(Arc::new(UniformPlanarArray::isotropic(2, 2))),
        );
        let mut channel = MultiModelSpectrumChannel::new();
        channel.set_phased_array_spectrum_propagation_loss_model(Box::new(BeamformingGainLoss)).expect("no conflict");
        channel.add_rx(&PhyHandle::new(&rx));

        let mut scheduler = RecordingScheduler::default();
        assert_eq!(channel.start_tx(signal_from(&tx, &model, 1.0), &mut scheduler), 1);
        drop(tx);
        assert_eq!(deliver_all(&mut channel, &mut scheduler), 0);
        assert_eq!(rx.received_count(), 0);
    }

    #[test]
    #[should_panic(expected = "phased-array antennas must be installed")]
    fn phased_array_loss_without_arrays_is_fatal() {
        let model = model_a();
        let tx = TestPhy::new(1, &model);
        let rx = TestPhy::build(2, None, None, Some(model.clone()), Some(Arc::new(IsotropicAntenna::default())));
        let mut channel = MultiModelSpectrumChannel::new();
        channel.set_phased_array_spectrum_propagation_loss_model(Box::new(BeamformingGainLoss)).expect("no conflict");
        channel.add_rx(&PhyHandle::new(&rx));

        let mut scheduler = RecordingScheduler::default();
        channel.start_tx(signal_from(&tx, &model, 1.0), &mut scheduler);
        deliver_all(&mut channel, &mut scheduler);
    }

    #[test]
    fn registry_queries_and_dispose() {
        let a = model_a();
        let b = SpectrumModel::contiguous(2.4005e9, 2e6, 2);
        let rx1 = TestPhy::new(1, &a);
        let rx2 = TestPhy::new(2, &b);
        let mut channel = MultiModelSpectrumChannel::new();
        channel.add_rx(&PhyHandle::new(&rx1));
        channel.add_rx(&PhyHandle::new(&rx2));
        channel.find_or_register_tx_model(&a);

        assert_eq!(channel.device_count(), 2);
        let mut ids = vec![channel.device_at(0).id(), channel.device_at(1).id()];
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(channel.tx_model_count(), 1);
        assert_eq!(channel.rx_model_count(), 2);
        assert_eq!(channel.converter_pairs(), vec![(a.uid(), b.uid())]);

        channel.remove_rx(42);
        assert_eq!(channel.device_count(), 2);

        channel.dispose();
        assert_eq!(channel.device_count(), 0);
        assert_eq!(channel.tx_model_count(), 0);
        assert!(channel.converter_pairs().is_empty());
    }
}
