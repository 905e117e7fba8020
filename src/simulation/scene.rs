//! Scene files: spectrum models, channel configuration, endpoints and the
//! transmissions to replay.
//!
//! A scene is plain JSON. `load_scene` reads and parses it, `validate_scene`
//! checks cross references and value ranges, and `instantiate` builds the
//! channel and endpoints and queues the transmissions on a `Simulator`.

use anyhow::{Context, Result, bail};
use embassy_time::{Duration, Instant};
use log::{debug, info};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use super::phy::{SimplePhy, handle};
use super::simulator::Simulator;
use crate::antenna::{AntennaModel, IsotropicAntenna, ParabolicAntenna, UniformPlanarArray};
use crate::channel::{ChannelConfig, MultiModelSpectrumChannel, NodeId, PhyId, SpectrumPhy};
use crate::propagation::{
    BeamformingGainLoss, ConstantSpeedPropagationDelay, FriisPropagationLoss, FriisSpectrumPropagationLoss, LogDistanceParameters,
    LogDistancePropagationLoss, PropagationDelayModel, PropagationLossModel, RandomPropagationDelay, RangePropagationLoss, Vector,
};
use crate::spectrum::{SignalParameters, SpectrumModel, SpectrumValue};

#[derive(Debug, Clone, Deserialize)]
pub struct Scene {
    pub spectrum_models: BTreeMap<String, SpectrumModelConfig>,
    #[serde(default)]
    pub channel: ChannelSection,
    pub phys: Vec<PhyConfig>,
    #[serde(default)]
    pub transmissions: Vec<TransmissionConfig>,
}

/// `band_count` contiguous bands of `band_width_hz`, the first starting at `start_hz`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SpectrumModelConfig {
    pub start_hz: f64,
    pub band_width_hz: f64,
    pub band_count: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelSection {
    pub max_loss_db: Option<f64>,
    pub propagation_loss: Option<PropagationLossConfig>,
    pub propagation_delay: Option<PropagationDelayConfig>,
    pub spectrum_loss: Option<SpectrumLossConfig>,
    pub deliver_to_detached: Option<bool>,
}

impl ChannelSection {
    pub fn config(&self) -> ChannelConfig {
        let defaults = ChannelConfig::default();
        ChannelConfig {
            max_loss_db: self.max_loss_db.unwrap_or(defaults.max_loss_db),
            deliver_to_detached: self.deliver_to_detached.unwrap_or(defaults.deliver_to_detached),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropagationLossConfig {
    Friis(FriisPropagationLoss),
    LogDistance(LogDistanceParameters),
    Range(RangePropagationLoss),
}

impl PropagationLossConfig {
    pub fn build(&self, seed: u64) -> Box<dyn PropagationLossModel> {
        match self {
            Self::Friis(model) => Box::new(*model),
            Self::LogDistance(params) => Box::new(LogDistancePropagationLoss::new(params.clone(), seed)),
            Self::Range(model) => Box::new(*model),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropagationDelayConfig {
    ConstantSpeed {
        #[serde(default = "default_speed_mps")]
        speed_mps: f64,
    },
    Random {
        min_us: u64,
        max_us: u64,
    },
}

fn default_speed_mps() -> f64 {
    ConstantSpeedPropagationDelay::default().speed_mps
}

impl PropagationDelayConfig {
    pub fn build(&self, seed: u64) -> Box<dyn PropagationDelayModel> {
        match *self {
            Self::ConstantSpeed { speed_mps } => Box::new(ConstantSpeedPropagationDelay { speed_mps }),
            Self::Random { min_us, max_us } => Box::new(RandomPropagationDelay::new(Duration::from_micros(min_us), Duration::from_micros(max_us), seed)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectrumLossConfig {
    /// Per-band free-space loss.
    Friis,
    /// Beamforming gain of phased arrays at both ends.
    Beamforming,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AntennaConfig {
    Isotropic {
        #[serde(default)]
        gain_db: f64,
    },
    Parabolic {
        #[serde(default)]
        boresight_deg: f64,
        beamwidth_deg: f64,
        max_attenuation_db: f64,
    },
    UniformPlanarArray {
        rows: usize,
        columns: usize,
    },
}

impl AntennaConfig {
    pub fn build(&self) -> Arc<dyn AntennaModel> {
        match *self {
            Self::Isotropic { gain_db } => Arc::new(IsotropicAntenna::new(gain_db)),
            Self::Parabolic {
                boresight_deg,
                beamwidth_deg,
                max_attenuation_db,
            } => Arc::new(ParabolicAntenna {
                boresight_deg,
                beamwidth_deg,
                max_attenuation_db,
            }),
            Self::UniformPlanarArray { rows, columns } => Arc::new(UniformPlanarArray::isotropic(rows, columns)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhyConfig {
    pub id: PhyId,
    pub node_id: Option<NodeId>,
    pub position: Option<Vector>,
    pub antenna: Option<AntennaConfig>,
    /// Name of an entry of `spectrum_models`.
    pub rx_model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransmissionConfig {
    pub at_us: u64,
    pub from: PhyId,
    pub model: String,
    /// PSD in W/Hz, one value per band of `model`.
    pub psd: Vec<f64>,
    pub duration_us: u64,
}

/// Read and parse a scene file.
pub fn load_scene(scene_path: &str) -> Result<Scene> {
    let data = std::fs::read_to_string(scene_path).with_context(|| format!("Failed to read file: {scene_path}"))?;
    let scene = serde_json::from_str::<Scene>(&data).context("Invalid JSON format")?;
    Ok(scene)
}

/// Check cross references and value ranges of a parsed scene.
pub fn validate_scene(scene: &Scene) -> Result<(), String> {
    const MAX_PHYS: usize = 10000;

    if scene.spectrum_models.is_empty() {
        return Err("Scene must define at least one spectrum model".to_string());
    }
    for (name, model) in &scene.spectrum_models {
        if model.band_count == 0 {
            return Err(format!("Spectrum model '{}' must have at least one band", name));
        }
        if !(model.band_width_hz > 0.0) {
            return Err(format!("Spectrum model '{}' band_width_hz {} must be positive", name, model.band_width_hz));
        }
        if !(model.start_hz >= 0.0) {
            return Err(format!("Spectrum model '{}' start_hz {} must be non-negative", name, model.start_hz));
        }
    }

    if scene.phys.is_empty() {
        return Err("Scene must contain at least one phy".to_string());
    }
    if scene.phys.len() > MAX_PHYS {
        return Err(format!("Phy count {} exceeds maximum of {}", scene.phys.len(), MAX_PHYS));
    }

    let mut phy_ids = HashSet::new();
    for phy in &scene.phys {
        if !phy_ids.insert(phy.id) {
            return Err(format!("Duplicate phy id found: {}", phy.id));
        }
        if !scene.spectrum_models.contains_key(&phy.rx_model) {
            return Err(format!("Phy {} uses unknown spectrum model '{}'", phy.id, phy.rx_model));
        }
        if let Some(AntennaConfig::UniformPlanarArray { rows, columns }) = phy.antenna {
            if rows == 0 || columns == 0 {
                return Err(format!("Phy {} planar array must have at least one row and column", phy.id));
            }
        }
        if let Some(AntennaConfig::Parabolic { beamwidth_deg, .. }) = phy.antenna {
            if !(beamwidth_deg > 0.0) {
                return Err(format!("Phy {} parabolic beamwidth {} must be positive", phy.id, beamwidth_deg));
            }
        }
    }

    let channel = &scene.channel;
    if let Some(max_loss_db) = channel.max_loss_db {
        if max_loss_db.is_nan() {
            return Err("Invalid max_loss_db, must be a number".to_string());
        }
    }
    match &channel.propagation_loss {
        Some(PropagationLossConfig::Friis(friis)) => {
            if !(friis.frequency_hz > 0.0) {
                return Err(format!("Invalid Friis frequency_hz {}, must be positive", friis.frequency_hz));
            }
            if !(friis.system_loss > 0.0) {
                return Err(format!("Invalid Friis system_loss {}, must be positive", friis.system_loss));
            }
        }
        Some(PropagationLossConfig::LogDistance(params)) => {
            if params.path_loss_exponent <= 0.0 {
                return Err(format!("Invalid path_loss_exponent {}, must be positive", params.path_loss_exponent));
            }
            if params.shadowing_sigma < 0.0 {
                return Err(format!("Invalid shadowing_sigma {}, must be non-negative", params.shadowing_sigma));
            }
            if !(params.reference_distance > 0.0) {
                return Err(format!("Invalid reference_distance {}, must be positive", params.reference_distance));
            }
        }
        _ => {}
    }
    match channel.propagation_delay {
        Some(PropagationDelayConfig::ConstantSpeed { speed_mps }) if !(speed_mps > 0.0) => {
            return Err(format!("Invalid propagation speed {}, must be positive", speed_mps));
        }
        Some(PropagationDelayConfig::Random { min_us, max_us }) if min_us > max_us => {
            return Err(format!("Invalid random delay bounds, min_us {} exceeds max_us {}", min_us, max_us));
        }
        _ => {}
    }
    if channel.spectrum_loss == Some(SpectrumLossConfig::Beamforming) {
        let all_arrays = scene
            .phys
            .iter()
            .all(|p| matches!(p.antenna, Some(AntennaConfig::UniformPlanarArray { .. })));
        if !all_arrays {
            return Err("Beamforming spectrum loss requires a uniform_planar_array antenna on every phy".to_string());
        }
    }

    for (i, tx) in scene.transmissions.iter().enumerate() {
        if !phy_ids.contains(&tx.from) {
            return Err(format!("Transmission {} is from unknown phy {}", i, tx.from));
        }
        let Some(model) = scene.spectrum_models.get(&tx.model) else {
            return Err(format!("Transmission {} uses unknown spectrum model '{}'", i, tx.model));
        };
        if tx.psd.len() != model.band_count {
            return Err(format!(
                "Transmission {} PSD has {} values but spectrum model '{}' has {} bands",
                i,
                tx.psd.len(),
                tx.model,
                model.band_count
            ));
        }
        if tx.psd.iter().any(|v| !(*v >= 0.0)) {
            return Err(format!("Transmission {} PSD values must be non-negative", i));
        }
    }

    Ok(())
}

/// A scene turned into live objects.
pub struct SceneInstance {
    pub channel: MultiModelSpectrumChannel,
    pub models: BTreeMap<String, Arc<SpectrumModel>>,
    pub phys: BTreeMap<PhyId, Rc<SimplePhy>>,
}

/// Build the channel and endpoints of a validated scene and queue its
/// transmissions on `sim`. Random models are seeded from `seed`.
pub fn instantiate(scene: &Scene, sim: &mut Simulator, seed: u64) -> Result<SceneInstance> {
    let models: BTreeMap<String, Arc<SpectrumModel>> = scene
        .spectrum_models
        .iter()
        .map(|(name, m)| (name.clone(), SpectrumModel::contiguous(m.start_hz, m.band_width_hz, m.band_count)))
        .collect();
    for (name, model) in &models {
        debug!("Spectrum model '{}' has SpectrumModelUid {}", name, model.uid());
    }

    let mut channel = MultiModelSpectrumChannel::with_config(scene.channel.config());
    if let Some(loss) = &scene.channel.propagation_loss {
        channel.set_propagation_loss_model(loss.build(seed));
    }
    if let Some(delay) = &scene.channel.propagation_delay {
        // Offset so loss and delay models never share a random stream
        channel.set_propagation_delay_model(delay.build(seed.wrapping_add(1)));
    }
    match scene.channel.spectrum_loss {
        Some(SpectrumLossConfig::Friis) => channel.set_spectrum_propagation_loss_model(Box::new(FriisSpectrumPropagationLoss))?,
        Some(SpectrumLossConfig::Beamforming) => channel.set_phased_array_spectrum_propagation_loss_model(Box::new(BeamformingGainLoss))?,
        None => {}
    }

    let mut phys = BTreeMap::new();
    for config in &scene.phys {
        let Some(model) = models.get(&config.rx_model) else {
            bail!("Phy {} uses unknown spectrum model '{}'", config.id, config.rx_model);
        };
        let mut phy = SimplePhy::new(config.id).with_rx_spectrum_model(model.clone()).with_clock(sim.clock());
        if let Some(node_id) = config.node_id {
            phy = phy.with_node(node_id);
        }
        if let Some(position) = config.position {
            phy = phy.with_position(position);
        }
        if let Some(antenna) = &config.antenna {
            phy = phy.with_antenna(antenna.build());
        }
        let phy = phy.into_rc();
        channel.add_rx(&handle(&phy));
        phys.insert(config.id, phy);
    }

    for (i, tx) in scene.transmissions.iter().enumerate() {
        let phy = phys.get(&tx.from).with_context(|| format!("Transmission {} is from unknown phy {}", i, tx.from))?;
        let model = models.get(&tx.model).with_context(|| format!("Transmission {} uses unknown spectrum model '{}'", i, tx.model))?;
        if tx.psd.len() != model.num_bands() {
            bail!("Transmission {} PSD length {} does not match {} bands", i, tx.psd.len(), model.num_bands());
        }
        let psd = SpectrumValue::from_values(model.clone(), tx.psd.clone());
        let mut params = SignalParameters::new(handle(phy), psd, Duration::from_micros(tx.duration_us));
        if let Some(antenna) = phy.antenna() {
            params = params.with_antenna(antenna);
        }
        sim.schedule_transmission(Instant::from_micros(tx.at_us), params);
    }

    info!(
        "Scene instantiated: {} spectrum models, {} phys, {} transmissions",
        models.len(),
        phys.len(),
        scene.transmissions.len()
    );
    Ok(SceneInstance { channel, models, phys })
}
