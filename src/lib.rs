//! # scratchnet
//!
//! A from-scratch supervised-learning engine: a convolutional classifier
//! with hand-written per-layer gradients, a finite-difference gradient
//! verifier, and a family of four first-order update rules. No automatic
//! differentiation, no GPU, no general computation graph.
//!
//! ## Quick Start
//!
//! ```rust
//! use scratchnet::{
//!     ConvParams, DatasetConfig, NetworkConfig, OptimizerKind, SimpleConvNet, StripeDataset,
//!     TrainerConfig, WeightInit,
//! };
//!
//! // A small network matching the synthetic dataset's geometry.
//! let network_config = NetworkConfig {
//!     input_dim: (1, 12, 12),
//!     conv: ConvParams { filter_num: 4, filter_size: 3, pad: 1, stride: 1 },
//!     hidden_size: 16,
//!     output_size: 4,
//!     weight_init: WeightInit::Std(0.01),
//!     seed: 42,
//! };
//! let mut net = SimpleConvNet::from_seed(&network_config).unwrap();
//!
//! let dataset = StripeDataset::generate(DatasetConfig::default());
//! let trainer_config = TrainerConfig {
//!     iterations: 10,
//!     batch_size: 16,
//!     optimizer: OptimizerKind::AdaptiveMomentum,
//!     log_every: 0,
//!     ..TrainerConfig::default()
//! };
//!
//! let result = scratchnet::train(&mut net, &dataset.images, &dataset.labels, &trainer_config)
//!     .unwrap();
//! println!("final batch loss: {:.4}", result.loss_history.last().unwrap());
//! ```
//!
//! ## Core Modules
//!
//! - [`config`] - Network configuration via TOML
//! - [`net`] - Layers, loss head, orchestrator, optimizers, gradient checks
//! - [`data`] - Label handling and a synthetic stripe dataset
//! - [`training`] - Mini-batch training loop
//! - [`checkpoint`] - Versioned binary parameter snapshots
//! - [`logging`] - JSON line-delimited run logging

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod logging;
pub mod net;
pub mod training;

pub use checkpoint::{CheckpointError, ParamSnapshot, SNAPSHOT_VERSION};
pub use config::{ConfigError, ConvParams, NetworkConfig, WeightInit};
pub use data::{DatasetConfig, Labels, StripeDataset};
pub use net::{
    compare, conv_output_size, cross_entropy, relative_error, softmax, AdaGrad, Adam, Affine,
    Convolution, GradSet, Layer, MaxPooling, Momentum, NetError, Optimizer, OptimizerKind,
    ParamSet, Relu, Sgd, SimpleConvNet, SoftmaxWithLoss, NUMERICAL_STEP,
};
pub use training::{train, TrainerConfig, TrainingResult};
