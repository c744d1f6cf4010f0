//! The fixed convolutional classifier and its gradient machinery.

use std::path::Path;

use ndarray::{s, Array2, Array4, ArrayD, Axis, Ix2, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::checkpoint::{self, CheckpointError, ParamSnapshot};
use crate::config::NetworkConfig;
use crate::data::Labels;
use crate::net::affine::Affine;
use crate::net::conv::{conv_output_size, Convolution};
use crate::net::error::NetError;
use crate::net::gradient_check::NUMERICAL_STEP;
use crate::net::layer::{Layer, Relu};
use crate::net::loss::SoftmaxWithLoss;
use crate::net::params::{GradSet, ParamSet};
use crate::net::pool::MaxPooling;

/// Pooling window side and stride. The pooling stage always halves each
/// spatial extent.
const POOL: usize = 2;

/// Convolutional classifier with the fixed architecture
/// `Convolution → Relu → MaxPooling → Affine → Relu → Affine`, terminated by
/// a [`SoftmaxWithLoss`] head during training.
///
/// The network owns the parameter mapping; layers address their weights by
/// name and resolve them on every call, so [`SimpleConvNet::load_params`]
/// replacing the mapping is observed everywhere immediately.
pub struct SimpleConvNet {
    config: NetworkConfig,
    params: ParamSet,
    layers: Vec<Box<dyn Layer>>,
    head: SoftmaxWithLoss,
}

impl SimpleConvNet {
    /// Builds the network, validating that the convolution and pooling
    /// windows tile the configured input exactly.
    ///
    /// # Arguments
    ///
    /// * `config` - Architecture hyperparameters.
    /// * `rng` - Source for the uniform weight initialization.
    pub fn new(config: &NetworkConfig, rng: &mut impl Rng) -> Result<Self, NetError> {
        let (channels, height, width) = config.input_dim;
        let conv = config.conv;
        if conv.filter_num == 0 || config.hidden_size == 0 || config.output_size == 0 {
            return Err(NetError::InvalidConfig(
                "filter_num, hidden_size, and output_size must all be at least 1".into(),
            ));
        }

        let conv_out_h = conv_output_size(height, conv.filter_size, conv.pad, conv.stride)?;
        let conv_out_w = conv_output_size(width, conv.filter_size, conv.pad, conv.stride)?;
        let pool_out_h = conv_output_size(conv_out_h, POOL, 0, POOL)?;
        let pool_out_w = conv_output_size(conv_out_w, POOL, 0, POOL)?;
        let pool_output_size = conv.filter_num * pool_out_h * pool_out_w;

        let mut params = ParamSet::new();
        let conv_fan_in = channels * conv.filter_size * conv.filter_size;
        params.insert(
            "W1",
            uniform_tensor(
                rng,
                &[conv.filter_num, channels, conv.filter_size, conv.filter_size],
                config.weight_init.scale(conv_fan_in),
            ),
        );
        params.insert("b1", ArrayD::zeros(IxDyn(&[conv.filter_num])));
        params.insert(
            "W2",
            uniform_tensor(
                rng,
                &[pool_output_size, config.hidden_size],
                config.weight_init.scale(pool_output_size),
            ),
        );
        params.insert("b2", ArrayD::zeros(IxDyn(&[config.hidden_size])));
        params.insert(
            "W3",
            uniform_tensor(
                rng,
                &[config.hidden_size, config.output_size],
                config.weight_init.scale(config.hidden_size),
            ),
        );
        params.insert("b3", ArrayD::zeros(IxDyn(&[config.output_size])));

        let layers: Vec<Box<dyn Layer>> = vec![
            Box::new(Convolution::new("W1", "b1", conv.stride, conv.pad)),
            Box::new(Relu::new()),
            Box::new(MaxPooling::new(POOL, POOL, POOL)),
            Box::new(Affine::new("W2", "b2")),
            Box::new(Relu::new()),
            Box::new(Affine::new("W3", "b3")),
        ];

        Ok(Self {
            config: config.clone(),
            params,
            layers,
            head: SoftmaxWithLoss::new(),
        })
    }

    /// Builds the network with a `StdRng` seeded from the configuration.
    pub fn from_seed(config: &NetworkConfig) -> Result<Self, NetError> {
        let mut rng = StdRng::seed_from_u64(config.seed);
        Self::new(config, &mut rng)
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParamSet {
        &mut self.params
    }

    /// Runs the layer sequence forward, returning pre-softmax class scores
    /// of shape (batch, output_size).
    pub fn predict(&mut self, x: &Array4<f64>) -> Result<Array2<f64>, NetError> {
        let mut activation = x.clone().into_dyn();
        for layer in &mut self.layers {
            activation = layer.forward(activation, &self.params)?;
        }
        activation
            .into_dimensionality::<Ix2>()
            .map_err(|_| NetError::ShapeMismatch("final layer did not produce a score matrix".into()))
    }

    /// Mean cross-entropy loss of the batch under the current parameters.
    pub fn loss(&mut self, x: &Array4<f64>, labels: &Labels) -> Result<f64, NetError> {
        let scores = self.predict(x)?;
        self.head.forward(&scores, labels)
    }

    /// Fraction of correctly classified examples, evaluated in fixed-size
    /// chunks to bound peak memory. Examples past the last full chunk are
    /// skipped but still counted in the denominator, so with a dataset size
    /// not divisible by `batch_size` the result slightly underestimates.
    pub fn accuracy(
        &mut self,
        x: &Array4<f64>,
        labels: &Labels,
        batch_size: usize,
    ) -> Result<f64, NetError> {
        let total = x.shape()[0];
        if batch_size == 0 {
            return Err(NetError::InvalidConfig(
                "accuracy batch_size must be at least 1".into(),
            ));
        }
        if labels.len() != total {
            return Err(NetError::ShapeMismatch(format!(
                "{} labels supplied for {total} examples",
                labels.len()
            )));
        }
        if total == 0 {
            return Ok(0.0);
        }

        let truth = labels.to_indices();
        let mut correct = 0usize;
        for chunk in 0..total / batch_size {
            let start = chunk * batch_size;
            let batch = x.slice(s![start..start + batch_size, .., .., ..]).to_owned();
            let scores = self.predict(&batch)?;
            for (row, score_row) in scores.axis_iter(Axis(0)).enumerate() {
                let predicted = score_row
                    .iter()
                    .enumerate()
                    .max_by(|(_, a), (_, b)| a.total_cmp(b))
                    .map(|(idx, _)| idx)
                    .unwrap_or(0);
                if predicted == truth[start + row] {
                    correct += 1;
                }
            }
        }
        Ok(correct as f64 / total as f64)
    }

    /// Analytic gradient of the loss with respect to every parameter:
    /// one forward pass to populate the caches, then a reverse walk of the
    /// layer sequence seeded by the head gradient.
    pub fn gradient(&mut self, x: &Array4<f64>, labels: &Labels) -> Result<GradSet, NetError> {
        self.loss(x, labels)?;

        let mut grads = GradSet::new();
        let mut grad: ArrayD<f64> = self.head.backward()?.into_dyn();
        for layer in self.layers.iter_mut().rev() {
            grad = layer.backward(&grad, &self.params, &mut grads)?;
        }

        self.params.validate_matches(&grads)?;
        Ok(grads)
    }

    /// Central finite-difference estimate of the same gradient, perturbing
    /// one parameter element at a time with `loss` as the objective. Costs
    /// two forward passes per parameter element; only viable on deliberately
    /// small inputs, as a verification oracle for [`SimpleConvNet::gradient`].
    pub fn numerical_gradient(
        &mut self,
        x: &Array4<f64>,
        labels: &Labels,
    ) -> Result<GradSet, NetError> {
        let names: Vec<String> = self.params.names().cloned().collect();
        let mut grads = GradSet::new();

        for name in names {
            let tensor = self.params.get(&name)?;
            let shape = tensor.raw_dim();
            let elements = tensor.len();
            let mut grad = ArrayD::<f64>::zeros(shape);

            for idx in 0..elements {
                let original = self.params.elem(&name, idx)?;

                self.params.set_elem(&name, idx, original + NUMERICAL_STEP)?;
                let loss_plus = self.loss(x, labels)?;
                self.params.set_elem(&name, idx, original - NUMERICAL_STEP)?;
                let loss_minus = self.loss(x, labels)?;
                self.params.set_elem(&name, idx, original)?;

                grad.as_slice_mut().expect("contiguous")[idx] =
                    (loss_plus - loss_minus) / (2.0 * NUMERICAL_STEP);
            }
            grads.insert(&name, grad);
        }

        self.params.validate_matches(&grads)?;
        Ok(grads)
    }

    /// Writes a versioned snapshot of the parameters (with the architecture
    /// that produced them) to disk.
    pub fn save_params<P: AsRef<Path>>(&self, path: P) -> Result<(), CheckpointError> {
        let snapshot = ParamSnapshot::new(self.config.clone(), self.params.clone());
        checkpoint::write_snapshot(path, &snapshot)
    }

    /// Replaces every parameter tensor with the snapshot's, after version,
    /// key-set, and shape validation. Layers resolve parameters by name, so
    /// the loaded tensors take effect on the next forward pass.
    pub fn load_params<P: AsRef<Path>>(&mut self, path: P) -> Result<(), CheckpointError> {
        let snapshot = checkpoint::read_snapshot(path)?;
        self.params
            .assign_all(snapshot.params())
            .map_err(|err| CheckpointError::InvalidFormat(err.to_string()))?;
        Ok(())
    }
}

fn uniform_tensor(rng: &mut impl Rng, shape: &[usize], scale: f64) -> ArrayD<f64> {
    ArrayD::from_shape_fn(IxDyn(shape), |_| (rng.gen::<f64>() - 0.5) * 2.0 * scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConvParams, WeightInit};
    use ndarray::Array1;

    fn tiny_config() -> NetworkConfig {
        NetworkConfig {
            input_dim: (1, 8, 8),
            conv: ConvParams {
                filter_num: 2,
                filter_size: 3,
                pad: 1,
                stride: 1,
            },
            hidden_size: 8,
            output_size: 4,
            weight_init: WeightInit::Std(0.01),
            seed: 42,
        }
    }

    fn tiny_batch() -> (Array4<f64>, Labels) {
        let mut rng = StdRng::seed_from_u64(9);
        let x = Array4::from_shape_fn((3, 1, 8, 8), |_| rng.gen::<f64>());
        let labels = Labels::Indices(Array1::from_vec(vec![0, 1, 3]));
        (x, labels)
    }

    #[test]
    fn test_construction_registers_all_parameters() {
        let net = SimpleConvNet::from_seed(&tiny_config()).unwrap();
        let names: Vec<&String> = net.params().names().collect();
        assert_eq!(names, vec!["W1", "W2", "W3", "b1", "b2", "b3"]);

        // conv keeps 8x8 (pad 1), pool halves to 4x4.
        assert_eq!(net.params().get("W1").unwrap().shape(), &[2, 1, 3, 3]);
        assert_eq!(net.params().get("W2").unwrap().shape(), &[2 * 4 * 4, 8]);
        assert_eq!(net.params().get("W3").unwrap().shape(), &[8, 4]);
    }

    #[test]
    fn test_seeded_construction_is_deterministic() {
        let a = SimpleConvNet::from_seed(&tiny_config()).unwrap();
        let b = SimpleConvNet::from_seed(&tiny_config()).unwrap();
        assert_eq!(a.params().get("W1").unwrap(), b.params().get("W1").unwrap());
        assert_eq!(a.params().get("W3").unwrap(), b.params().get("W3").unwrap());
    }

    #[test]
    fn test_predict_shape_and_loss_consistency() {
        let mut net = SimpleConvNet::from_seed(&tiny_config()).unwrap();
        let (x, labels) = tiny_batch();

        let scores = net.predict(&x).unwrap();
        assert_eq!(scores.dim(), (3, 4));

        // loss == head applied to predict's output.
        let mut head = crate::net::loss::SoftmaxWithLoss::new();
        let expected = head.forward(&scores, &labels).unwrap();
        let loss = net.loss(&x, &labels).unwrap();
        assert!((loss - expected).abs() < 1e-12);
    }

    #[test]
    fn test_gradient_covers_every_parameter() {
        let mut net = SimpleConvNet::from_seed(&tiny_config()).unwrap();
        let (x, labels) = tiny_batch();

        let grads = net.gradient(&x, &labels).unwrap();
        net.params().validate_matches(&grads).unwrap();
        // Some signal must reach the earliest weights.
        assert!(grads.get("W1").unwrap().iter().any(|&g| g != 0.0));
    }

    #[test]
    fn test_accuracy_truncates_trailing_partial_chunk() {
        let mut net = SimpleConvNet::from_seed(&tiny_config()).unwrap();
        let (x, labels) = tiny_batch();

        // 3 examples with batch_size 2: only the first 2 are evaluated but
        // the denominator stays 3, so the result is at most 2/3.
        let accuracy = net.accuracy(&x, &labels, 2).unwrap();
        assert!(accuracy <= 2.0 / 3.0 + 1e-12);
    }

    #[test]
    fn test_non_tiling_geometry_fails_construction() {
        let mut config = tiny_config();
        // (8 - 4 + 0) / 3 is not integral.
        config.conv.filter_size = 4;
        config.conv.pad = 0;
        config.conv.stride = 3;

        assert!(matches!(
            SimpleConvNet::from_seed(&config),
            Err(NetError::InvalidConfig(_))
        ));
    }
}
