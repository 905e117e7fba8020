use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::Parser;
use embassy_time::Instant;
use env_logger::Builder;
use log::{LevelFilter, info, warn};
use serde::Serialize;
use std::path::PathBuf;

use multimodel_spectrum_channel::channel::{GainTrace, PathLossTrace};
use multimodel_spectrum_channel::simulation::{RunConfig, Simulator, instantiate, load_scene, validate_scene};

#[derive(Serialize)]
#[serde(tag = "trace", rename_all = "snake_case")]
enum TraceLine<'a> {
    Gain(&'a GainTrace),
    PathLoss(&'a PathLossTrace),
}

fn print_trace(line: TraceLine<'_>) {
    match serde_json::to_string(&line) {
        Ok(json) => println!("{}", json),
        Err(err) => warn!("Failed to serialize trace record: {}", err),
    }
}

#[derive(Parser, Debug)]
#[command(name = "spectrum-sim")]
#[command(version, about = "Replay a scene through a multi-model spectrum channel", long_about = None)]
struct Args {
    /// Scene JSON file
    scene: String,

    /// Run configuration TOML (default: config.toml next to the scene)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    fn config_path(&self) -> PathBuf {
        match &self.config {
            Some(path) => path.clone(),
            None => RunConfig::config_path_from_scene(&self.scene),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let scene_path = args.scene.as_str();
    let config_path = args.config_path();

    // A missing config file is not an error; fall back to defaults
    let (config, config_error) = match RunConfig::load(&config_path) {
        Ok(config) => (config, None),
        Err(err) => (RunConfig::default(), Some(err)),
    };

    // Logging setup
    Builder::new()
        .filter_level(LevelFilter::Warn)
        .filter(Some("multimodel_spectrum_channel"), config.level_filter())
        .filter(Some("spectrum_sim"), LevelFilter::Info)
        .init();

    if let Some(err) = config_error {
        info!("Using default run configuration ({}: {})", config_path.display(), err);
    }
    info!("Starting up at {}", Local::now().format("%Y-%m-%d %H:%M:%S"));

    let scene = load_scene(scene_path)?;
    if let Err(err) = validate_scene(&scene) {
        bail!("Invalid scene {}: {}", scene_path, err);
    }

    let mut sim = Simulator::new();
    if let Some(stop_time_us) = config.stop_time_us {
        sim = sim.with_stop_time(Instant::from_micros(stop_time_us));
    }
    let mut instance = instantiate(&scene, &mut sim, config.seed).with_context(|| format!("Failed to build scene {scene_path}"))?;

    if config.trace_output {
        instance.channel.on_gain(|g| print_trace(TraceLine::Gain(g)));
        instance.channel.on_path_loss(|p| print_trace(TraceLine::PathLoss(p)));
    }

    let started = std::time::Instant::now();
    let stats = sim.run(&mut instance.channel);
    info!(
        "Simulation finished in {:?}: {} transmissions, {} deliveries scheduled, {} received, {} discarded",
        started.elapsed(),
        stats.transmissions,
        stats.deliveries_scheduled,
        stats.receptions,
        stats.discarded
    );

    for (id, phy) in &instance.phys {
        let powers = phy.received_powers();
        let total: f64 = powers.iter().sum();
        info!("Phy {}: {} receptions, {:.3e} W total", id, powers.len(), total);
    }
    instance.channel.dispose();
    Ok(())
}
