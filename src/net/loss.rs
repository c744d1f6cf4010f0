//! Softmax activation and the cross-entropy loss head.

use ndarray::{Array2, Axis};

use crate::data::Labels;
use crate::net::error::NetError;

/// Numerically stable row-wise softmax: the per-row maximum is subtracted
/// before exponentiating so large scores cannot overflow.
pub fn softmax(scores: &Array2<f64>) -> Array2<f64> {
    let mut output = scores.clone();
    for mut row in output.axis_iter_mut(Axis(0)) {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    output
}

/// Mean cross-entropy between a probability matrix and one-hot targets.
/// The small additive constant guards `ln(0)` for fully confident wrong
/// predictions.
pub fn cross_entropy(probs: &Array2<f64>, one_hot: &Array2<f64>) -> f64 {
    let batch = probs.nrows() as f64;
    let log_likelihood = (one_hot * &probs.mapv(|p| (p + 1e-7).ln())).sum();
    -log_likelihood / batch
}

/// Combined softmax activation and cross-entropy loss, used as the fixed
/// terminal layer of the network. It is separate from the ordered layer
/// sequence because it needs labels.
#[derive(Default)]
pub struct SoftmaxWithLoss {
    /// (softmax output, one-hot labels) from the last forward call.
    cache: Option<(Array2<f64>, Array2<f64>)>,
}

impl SoftmaxWithLoss {
    pub fn new() -> Self {
        Self { cache: None }
    }

    /// Computes the scalar mean loss from pre-softmax scores. Labels may be
    /// class indices or one-hot rows; both are normalized internally.
    pub fn forward(&mut self, scores: &Array2<f64>, labels: &Labels) -> Result<f64, NetError> {
        let (batch, classes) = scores.dim();
        if labels.len() != batch {
            return Err(NetError::ShapeMismatch(format!(
                "{} labels supplied for a batch of {batch}",
                labels.len()
            )));
        }
        match labels {
            Labels::Indices(indices) => {
                if let Some(&bad) = indices.iter().find(|&&idx| idx >= classes) {
                    return Err(NetError::ShapeMismatch(format!(
                        "label index {bad} is out of range for {classes} classes"
                    )));
                }
            }
            Labels::OneHot(matrix) => {
                if matrix.ncols() != classes {
                    return Err(NetError::ShapeMismatch(format!(
                        "one-hot labels have {} columns, scores have {classes}",
                        matrix.ncols()
                    )));
                }
            }
        }

        let probs = softmax(scores);
        let one_hot = labels.to_one_hot(classes);
        let loss = cross_entropy(&probs, &one_hot);
        self.cache = Some((probs, one_hot));
        Ok(loss)
    }

    /// Gradient with respect to the pre-softmax scores. The upstream seed is
    /// always the constant 1 (d loss / d loss); the closed form
    /// `(y − t) / batch` is exact only because this layer is terminal.
    pub fn backward(&self) -> Result<Array2<f64>, NetError> {
        let (probs, one_hot) = self
            .cache
            .as_ref()
            .ok_or(NetError::BackwardBeforeForward("SoftmaxWithLoss"))?;
        let batch = probs.nrows() as f64;
        Ok((probs - one_hot) / batch)
    }
}
