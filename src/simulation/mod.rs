//! Headless discrete-event driver around the channel.
//!
//! - `events`: time-ordered event queue with deterministic tie-breaking
//! - `simulator`: the `Scheduler` implementation that runs transmissions and deliveries
//! - `phy`: `SimplePhy`, an endpoint that records what it receives
//! - `scene`: JSON scene files and their instantiation
//! - `config`: TOML run configuration

pub mod config;
pub mod events;
pub mod phy;
pub mod scene;
pub mod simulator;

pub use crate::channel::{Delivery, Scheduler};
pub use config::RunConfig;
pub use events::{Event, EventQueue, ScheduledEvent};
pub use phy::{Reception, SimplePhy};
pub use scene::{Scene, SceneInstance, instantiate, load_scene, validate_scene};
pub use simulator::{SimulationStats, Simulator};
