//! Errors returned by channel configuration.

use thiserror::Error;

/// Recoverable channel configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// A spectrum-aware and a phased-array-aware loss model cannot both be installed.
    #[error("a {installed} propagation loss model is already installed; cannot also install a {requested} one")]
    ConflictingSpectrumLossModels { installed: &'static str, requested: &'static str },
}

pub type ChannelResult<T> = Result<T, ChannelError>;
