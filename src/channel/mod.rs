//! The multi-model spectrum channel and the interfaces it is wired through.
//!
//! - `phy`: endpoint capability and non-owning handles
//! - `registry`: receivers bucketed by spectrum model, converter cache
//! - `multi_model`: transmission fan-out and receive-time processing
//! - `scheduler`: the deferred-delivery interface the host implements
//! - `filter`, `trace`, `config`, `error`: channel plumbing

pub mod config;
pub mod error;
pub mod filter;
pub mod multi_model;
pub mod phy;
pub mod registry;
pub mod scheduler;
pub mod trace;

pub use config::ChannelConfig;
pub use error::{ChannelError, ChannelResult};
pub use filter::{OrthogonalModelFilter, TransmitFilter};
pub use multi_model::MultiModelSpectrumChannel;
pub use phy::{NodeId, PhyHandle, PhyId, SpectrumPhy};
pub use registry::SpectrumModelRegistry;
pub use scheduler::{Delivery, Scheduler};
pub use trace::{ChannelTraces, GainTrace, PathLossTrace, TracedCallback};
