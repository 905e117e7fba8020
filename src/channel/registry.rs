//! Receiver registry and spectrum converter cache.
//!
//! Two keyed containers, both lazily populated:
//! - receive model uid → model + receivers currently bound to it
//! - transmit model uid → model + converters to every distinct, non-orthogonal
//!   receive model seen so far
//!
//! Whichever side of a (tx, rx) model pair is registered second builds the
//! converter, so the cache contents do not depend on registration order.
//! Converters are only built tx → rx because lookups always go from the
//! signal's model to the receiver's model. Identical and orthogonal pairs never
//! get a converter.
//!
//! Receivers are bucketed by model rather than kept in a flat list so that a
//! transmission finds the converter once per receive model. Indexed access
//! (`device_at`) is a linear scan as a consequence; it is rarely used.

use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::phy::{PhyHandle, PhyId};
use crate::spectrum::{SpectrumConverter, SpectrumModel, SpectrumModelUid};

/// Everything known about one transmit spectrum model.
#[derive(Debug)]
pub struct TxSpectrumModelInfo {
    pub model: Arc<SpectrumModel>,
    pub converters: BTreeMap<SpectrumModelUid, SpectrumConverter>,
}

/// Everything known about one receive spectrum model.
#[derive(Debug)]
pub struct RxSpectrumModelInfo {
    pub model: Arc<SpectrumModel>,
    /// Receivers whose current model is this one, in registration order.
    pub phys: Vec<PhyHandle>,
}

/// A converter is needed only between distinct, overlapping models.
fn needs_converter(tx: &SpectrumModel, rx: &SpectrumModel) -> bool {
    tx.uid() != rx.uid() && !tx.is_orthogonal(rx)
}

#[derive(Debug, Default)]
pub struct SpectrumModelRegistry {
    tx_models: BTreeMap<SpectrumModelUid, TxSpectrumModelInfo>,
    rx_models: BTreeMap<SpectrumModelUid, RxSpectrumModelInfo>,
    num_devices: usize,
}

impl SpectrumModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `phy` to `model`, moving it from whatever model it was bound to before.
    pub fn add_rx(&mut self, phy: PhyHandle, model: Arc<SpectrumModel>) {
        self.remove_rx(phy.id());

        let rx_uid = model.uid();
        let tx_models = &mut self.tx_models;
        let info = self.rx_models.entry(rx_uid).or_insert_with(|| {
            for tx_info in tx_models.values_mut() {
                if needs_converter(&tx_info.model, &model) {
                    debug!("Creating converter between SpectrumModelUid {} and {}", tx_info.model.uid(), rx_uid);
                    let converter = SpectrumConverter::new(tx_info.model.clone(), model.clone());
                    let previous = tx_info.converters.insert(rx_uid, converter);
                    assert!(previous.is_none(), "converter {} -> {} created twice", tx_info.model.uid(), rx_uid);
                }
            }
            RxSpectrumModelInfo { model, phys: Vec::new() }
        });
        info.phys.push(phy);
        self.num_devices += 1;
    }

    /// Unbind the receiver with id `phy_id` from its model. Returns whether it was registered.
    ///
    /// The receiver's previous model is not assumed known, so every bucket is scanned.
    pub fn remove_rx(&mut self, phy_id: PhyId) -> bool {
        for info in self.rx_models.values_mut() {
            if let Some(pos) = info.phys.iter().position(|p| p.id() == phy_id) {
                info.phys.remove(pos);
                self.num_devices -= 1;
                // There is at most one binding per receiver
                return true;
            }
        }
        false
    }

    /// Entry for the transmit model `model`, created with its converters on first sight.
    pub fn find_or_register_tx(&mut self, model: &Arc<SpectrumModel>) -> &TxSpectrumModelInfo {
        let tx_uid = model.uid();
        let rx_models = &self.rx_models;
        self.tx_models.entry(tx_uid).or_insert_with(|| {
            let mut converters = BTreeMap::new();
            for rx_info in rx_models.values() {
                if needs_converter(model, &rx_info.model) {
                    debug!("Creating converter between SpectrumModelUid {} and {}", tx_uid, rx_info.model.uid());
                    converters.insert(rx_info.model.uid(), SpectrumConverter::new(model.clone(), rx_info.model.clone()));
                }
            }
            TxSpectrumModelInfo {
                model: model.clone(),
                converters,
            }
        })
    }

    pub fn converter(&self, tx_uid: SpectrumModelUid, rx_uid: SpectrumModelUid) -> Option<&SpectrumConverter> {
        self.tx_models.get(&tx_uid)?.converters.get(&rx_uid)
    }

    /// All cached (tx uid, rx uid) converter pairs in ascending order.
    pub fn converter_pairs(&self) -> Vec<(SpectrumModelUid, SpectrumModelUid)> {
        self.tx_models
            .iter()
            .flat_map(|(&tx, info)| info.converters.keys().map(move |&rx| (tx, rx)))
            .collect()
    }

    pub fn device_count(&self) -> usize {
        self.num_devices
    }

    /// The `index`-th receiver in registry iteration order. Linear in the number of receivers.
    pub fn device_at(&self, index: usize) -> &PhyHandle {
        assert!(index < self.num_devices, "device index {} out of range (device count {})", index, self.num_devices);
        match self.receivers().nth(index) {
            Some((_, phy)) => phy,
            None => panic!("device count {} exceeds the number of registered receivers", self.num_devices),
        }
    }

    pub fn contains(&self, phy_id: PhyId) -> bool {
        self.rx_models.values().any(|info| info.phys.iter().any(|p| p.id() == phy_id))
    }

    /// Model the receiver is currently bound to.
    pub fn bound_model(&self, phy_id: PhyId) -> Option<SpectrumModelUid> {
        self.rx_models
            .iter()
            .find(|(_, info)| info.phys.iter().any(|p| p.id() == phy_id))
            .map(|(&uid, _)| uid)
    }

    /// Every registered receiver with the uid of the model it is bound to.
    pub fn receivers(&self) -> impl Iterator<Item = (SpectrumModelUid, &PhyHandle)> {
        self.rx_models.iter().flat_map(|(&uid, info)| info.phys.iter().map(move |p| (uid, p)))
    }

    pub fn rx_model_count(&self) -> usize {
        self.rx_models.len()
    }

    pub fn tx_model_count(&self) -> usize {
        self.tx_models.len()
    }

    pub fn clear(&mut self) {
        self.tx_models.clear();
        self.rx_models.clear();
        self.num_devices = 0;
    }
}
