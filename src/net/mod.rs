//! Network components: layers, the loss head, the orchestrator, the
//! optimizer family, and the gradient verifier.
//!
//! Gradients are written by hand per layer; the numerical gradient in
//! [`network::SimpleConvNet::numerical_gradient`] together with
//! [`gradient_check`] is the oracle that keeps them honest.

pub mod affine;
pub mod conv;
pub mod error;
pub mod gradient_check;
pub mod layer;
pub mod loss;
pub mod network;
pub mod optimizer;
pub mod params;
pub mod pool;

pub use affine::Affine;
pub use conv::{conv_output_size, Convolution};
pub use error::NetError;
pub use gradient_check::{compare, relative_error, NUMERICAL_STEP};
pub use layer::{Layer, Relu};
pub use loss::{cross_entropy, softmax, SoftmaxWithLoss};
pub use network::SimpleConvNet;
pub use optimizer::{Adam, AdaGrad, Momentum, Optimizer, OptimizerKind, Sgd};
pub use params::{GradSet, ParamSet};
pub use pool::MaxPooling;
