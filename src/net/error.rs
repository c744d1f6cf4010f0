//! Error type shared by network construction and the forward/backward passes.

use std::fmt;

/// Errors raised by layers, the network orchestrator, and optimizers.
#[derive(Debug)]
pub enum NetError {
    /// A hyperparameter combination produces an impossible network, e.g. a
    /// non-integral convolution output size.
    InvalidConfig(String),
    /// A tensor arrived with a shape a layer cannot consume.
    ShapeMismatch(String),
    /// A parameter or gradient name was absent from its mapping. The
    /// parameter and gradient mappings must always share one key set, so
    /// this is an internal-consistency failure, not a recoverable state.
    MissingParam(String),
    /// `backward` was called on a layer without a preceding `forward`, so
    /// there is no cached state to differentiate through.
    BackwardBeforeForward(&'static str),
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::InvalidConfig(msg) => write!(f, "Invalid network configuration: {msg}"),
            NetError::ShapeMismatch(msg) => write!(f, "Tensor shape mismatch: {msg}"),
            NetError::MissingParam(name) => {
                write!(f, "Parameter mapping is missing the key '{name}'")
            }
            NetError::BackwardBeforeForward(layer) => {
                write!(f, "{layer}::backward called without a preceding forward pass")
            }
        }
    }
}

impl std::error::Error for NetError {}
