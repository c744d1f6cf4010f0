//! Mini-batch training loop
//!
//! Implements iterated stochastic mini-batch updates against any of the
//! first-order update rules, with per-iteration loss history and JSON-line
//! run logging.

use std::time::Instant;

use ndarray::{Array4, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::Labels;
use crate::logging;
use crate::net::error::NetError;
use crate::net::network::SimpleConvNet;
use crate::net::optimizer::OptimizerKind;

/// Training loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Number of mini-batch update iterations
    pub iterations: usize,
    /// Examples sampled per iteration
    pub batch_size: usize,
    /// Update rule applied after each gradient
    pub optimizer: OptimizerKind,
    /// Learning-rate override; `None` keeps the rule's default
    pub learning_rate: Option<f64>,
    /// Log every n-th iteration (0 disables logging)
    pub log_every: usize,
    /// Seed for mini-batch sampling
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            iterations: 200,
            batch_size: 32,
            optimizer: OptimizerKind::default(),
            learning_rate: None,
            log_every: 10,
            seed: 42,
        }
    }
}

/// Complete training result
#[derive(Debug, Clone, Serialize)]
pub struct TrainingResult {
    pub config: TrainerConfig,
    /// Mini-batch loss per iteration, in order.
    pub loss_history: Vec<f64>,
    pub final_train_accuracy: f64,
    pub total_elapsed_ms: u128,
}

/// Trains the network in place on the given dataset.
///
/// Each iteration samples `batch_size` examples with replacement from a
/// seeded RNG, runs one gradient/update step, and records the batch loss.
/// Logging failures are swallowed; a full `logs/` disk never aborts a run.
pub fn train(
    net: &mut SimpleConvNet,
    x: &Array4<f64>,
    labels: &Labels,
    config: &TrainerConfig,
) -> Result<TrainingResult, NetError> {
    let total = x.shape()[0];
    if total == 0 || labels.len() != total {
        return Err(NetError::ShapeMismatch(format!(
            "{} labels supplied for {total} examples",
            labels.len()
        )));
    }
    if config.batch_size == 0 {
        return Err(NetError::InvalidConfig(
            "training batch_size must be at least 1".into(),
        ));
    }

    let learning_rate = config
        .learning_rate
        .unwrap_or_else(|| config.optimizer.default_learning_rate());
    let mut optimizer = config.optimizer.build_with_learning_rate(learning_rate);
    let mut rng = StdRng::seed_from_u64(config.seed);

    let start_time = Instant::now();
    let mut loss_history = Vec::with_capacity(config.iterations);

    for iteration in 0..config.iterations {
        let indices: Vec<usize> = (0..config.batch_size)
            .map(|_| rng.gen_range(0..total))
            .collect();
        let batch = x.select(Axis(0), &indices);
        let batch_labels = labels.select(&indices);

        let grads = net.gradient(&batch, &batch_labels)?;
        optimizer.update(net.params_mut(), &grads)?;

        let loss = net.loss(&batch, &batch_labels)?;
        loss_history.push(loss);

        if config.log_every > 0 && iteration % config.log_every == 0 {
            logging::log_training_iteration(iteration, loss, learning_rate).ok();
        }
    }

    let final_train_accuracy = net.accuracy(x, labels, config.batch_size.min(total))?;

    Ok(TrainingResult {
        config: config.clone(),
        loss_history,
        final_train_accuracy,
        total_elapsed_ms: start_time.elapsed().as_millis(),
    })
}
