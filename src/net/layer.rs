//! The layer capability and the rectified-linear activation.

use ndarray::{ArrayD, Zip};
use rayon::prelude::*;

use crate::net::error::NetError;
use crate::net::params::{GradSet, ParamSet};

/// A unit of computation with a forward and a backward pass.
///
/// `forward` is a pure function of the input and the current parameters,
/// with the side effect of caching whatever the backward pass will need.
/// The cache is overwritten on every forward call. Calling `backward`
/// without a preceding `forward` violates the contract and returns
/// [`NetError::BackwardBeforeForward`] instead of stale data.
///
/// Parameterized layers record their own weight/bias gradients into the
/// supplied [`GradSet`] and return the gradient with respect to their input.
pub trait Layer {
    fn forward(&mut self, input: ArrayD<f64>, params: &ParamSet) -> Result<ArrayD<f64>, NetError>;

    fn backward(
        &mut self,
        grad_output: &ArrayD<f64>,
        params: &ParamSet,
        grads: &mut GradSet,
    ) -> Result<ArrayD<f64>, NetError>;
}

/// Elementwise `max(0, x)`. No parameters.
#[derive(Default)]
pub struct Relu {
    /// True where the last forward input was <= 0; those positions block
    /// the gradient.
    mask: Option<ArrayD<bool>>,
}

impl Relu {
    pub fn new() -> Self {
        Self { mask: None }
    }
}

impl Layer for Relu {
    fn forward(&mut self, input: ArrayD<f64>, _params: &ParamSet) -> Result<ArrayD<f64>, NetError> {
        let mask = input.mapv(|v| v <= 0.0);
        let mut output = input;
        if let Some(slice) = output.as_slice_mut() {
            slice.par_iter_mut().for_each(|v| {
                if *v < 0.0 {
                    *v = 0.0;
                }
            });
        } else {
            output.mapv_inplace(|v| v.max(0.0));
        }
        self.mask = Some(mask);
        Ok(output)
    }

    fn backward(
        &mut self,
        grad_output: &ArrayD<f64>,
        _params: &ParamSet,
        _grads: &mut GradSet,
    ) -> Result<ArrayD<f64>, NetError> {
        let mask = self
            .mask
            .as_ref()
            .ok_or(NetError::BackwardBeforeForward("Relu"))?;
        if mask.shape() != grad_output.shape() {
            return Err(NetError::ShapeMismatch(format!(
                "Relu backward received shape {:?}, forward saw {:?}",
                grad_output.shape(),
                mask.shape()
            )));
        }

        let mut grad_input = grad_output.clone();
        Zip::from(&mut grad_input).and(mask).for_each(|g, &blocked| {
            if blocked {
                *g = 0.0;
            }
        });
        Ok(grad_input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_relu_forward_clamps_negatives() {
        let mut relu = Relu::new();
        let params = ParamSet::new();
        let input = array![[-1.0, 0.0], [2.0, -3.0]].into_dyn();

        let output = relu.forward(input, &params).unwrap();
        assert_eq!(output, array![[0.0, 0.0], [2.0, 0.0]].into_dyn());
    }

    #[test]
    fn test_relu_backward_routes_through_positive_entries() {
        let mut relu = Relu::new();
        let params = ParamSet::new();
        let mut grads = GradSet::new();

        let input = array![[-1.0, 0.5], [2.0, 0.0]].into_dyn();
        relu.forward(input, &params).unwrap();

        let grad_output = array![[10.0, 10.0], [10.0, 10.0]].into_dyn();
        let grad_input = relu.backward(&grad_output, &params, &mut grads).unwrap();
        assert_eq!(grad_input, array![[0.0, 10.0], [10.0, 0.0]].into_dyn());
    }

    #[test]
    fn test_relu_backward_before_forward_fails() {
        let mut relu = Relu::new();
        let params = ParamSet::new();
        let mut grads = GradSet::new();
        let grad_output = array![[1.0]].into_dyn();

        assert!(matches!(
            relu.backward(&grad_output, &params, &mut grads),
            Err(NetError::BackwardBeforeForward("Relu"))
        ));
    }
}
