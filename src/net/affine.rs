//! Fully-connected layer operating on a flattened (batch, features) view.

use ndarray::{Array2, ArrayD, Axis, Ix1, Ix2, IxDyn};

use crate::net::error::NetError;
use crate::net::layer::Layer;
use crate::net::params::{GradSet, ParamSet};

/// Affine layer: `output = input · W + b` after flattening the input to
/// two dimensions. The original input shape is cached so the backward pass
/// can hand the gradient back in the shape the previous layer produced.
pub struct Affine {
    weight_key: String,
    bias_key: String,
    cache: Option<(Vec<usize>, Array2<f64>)>,
}

impl Affine {
    pub fn new(weight_key: impl Into<String>, bias_key: impl Into<String>) -> Self {
        Self {
            weight_key: weight_key.into(),
            bias_key: bias_key.into(),
            cache: None,
        }
    }

    fn resolve<'p>(
        &self,
        params: &'p ParamSet,
    ) -> Result<(ndarray::ArrayView2<'p, f64>, ndarray::ArrayView1<'p, f64>), NetError> {
        let weight = params
            .get(&self.weight_key)?
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| {
                NetError::ShapeMismatch(format!(
                    "'{}' is not a (features, outputs) matrix",
                    self.weight_key
                ))
            })?;
        let bias = params
            .get(&self.bias_key)?
            .view()
            .into_dimensionality::<Ix1>()
            .map_err(|_| {
                NetError::ShapeMismatch(format!("'{}' is not a 1-D bias vector", self.bias_key))
            })?;
        Ok((weight, bias))
    }
}

impl Layer for Affine {
    fn forward(&mut self, input: ArrayD<f64>, params: &ParamSet) -> Result<ArrayD<f64>, NetError> {
        let (weight, bias) = self.resolve(params)?;

        let original_shape = input.shape().to_vec();
        let batch = original_shape.first().copied().unwrap_or(0);
        if batch == 0 {
            return Err(NetError::ShapeMismatch(
                "affine input must have a non-empty batch axis".into(),
            ));
        }
        let features = input.len() / batch;
        if features != weight.nrows() {
            return Err(NetError::ShapeMismatch(format!(
                "'{}' expects {} input features, input flattens to {features}",
                self.weight_key,
                weight.nrows()
            )));
        }
        if bias.len() != weight.ncols() {
            return Err(NetError::ShapeMismatch(format!(
                "'{}' has {} entries, '{}' produces {} outputs",
                self.bias_key,
                bias.len(),
                self.weight_key,
                weight.ncols()
            )));
        }

        let flattened = input
            .into_shape((batch, features))
            .map_err(|_| NetError::ShapeMismatch("affine input is not contiguous".into()))?;
        let output = flattened.dot(&weight) + &bias;

        self.cache = Some((original_shape, flattened));
        Ok(output.into_dyn())
    }

    fn backward(
        &mut self,
        grad_output: &ArrayD<f64>,
        params: &ParamSet,
        grads: &mut GradSet,
    ) -> Result<ArrayD<f64>, NetError> {
        let (original_shape, flattened) = self
            .cache
            .as_ref()
            .ok_or(NetError::BackwardBeforeForward("Affine"))?;
        let (weight, _bias) = self.resolve(params)?;
        let dout = grad_output
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| {
                NetError::ShapeMismatch("affine backward expects a (batch, outputs) gradient".into())
            })?;
        if dout.nrows() != flattened.nrows() || dout.ncols() != weight.ncols() {
            return Err(NetError::ShapeMismatch(format!(
                "affine backward received {:?}, expected ({}, {})",
                dout.dim(),
                flattened.nrows(),
                weight.ncols()
            )));
        }

        let grad_weight = flattened.t().dot(&dout);
        let grad_bias = dout.sum_axis(Axis(0));
        let grad_input = dout.dot(&weight.t());

        grads.insert(&self.weight_key, grad_weight.into_dyn());
        grads.insert(&self.bias_key, grad_bias.into_dyn());

        grad_input
            .into_shape(IxDyn(original_shape))
            .map_err(|_| NetError::ShapeMismatch("affine input gradient reshape failed".into()))
    }
}
