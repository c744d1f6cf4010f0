//! Max-pooling over spatial windows with argmax routing for backward.

use ndarray::{Array4, ArrayD, Ix4};

use crate::net::conv::conv_output_size;
use crate::net::error::NetError;
use crate::net::layer::Layer;
use crate::net::params::{GradSet, ParamSet};

/// Max-pooling layer. Records, per window, the flat in-window index of the
/// maximum (first occurrence wins ties), and routes the entire incoming
/// gradient for a window back to that position.
pub struct MaxPooling {
    pool_h: usize,
    pool_w: usize,
    stride: usize,
    /// (input dimensions, flat argmax per output position) from the last
    /// forward call.
    cache: Option<((usize, usize, usize, usize), Array4<usize>)>,
}

impl MaxPooling {
    pub fn new(pool_h: usize, pool_w: usize, stride: usize) -> Self {
        Self {
            pool_h,
            pool_w,
            stride,
            cache: None,
        }
    }
}

impl Layer for MaxPooling {
    fn forward(&mut self, input: ArrayD<f64>, _params: &ParamSet) -> Result<ArrayD<f64>, NetError> {
        let x = input.into_dimensionality::<Ix4>().map_err(|_| {
            NetError::ShapeMismatch("pooling expects a (batch, channel, height, width) input".into())
        })?;
        let (batch, channels, height, width) = x.dim();
        let out_h = conv_output_size(height, self.pool_h, 0, self.stride)?;
        let out_w = conv_output_size(width, self.pool_w, 0, self.stride)?;

        let mut output = Array4::<f64>::zeros((batch, channels, out_h, out_w));
        let mut argmax = Array4::<usize>::zeros((batch, channels, out_h, out_w));

        for n in 0..batch {
            for c in 0..channels {
                for i in 0..out_h {
                    for j in 0..out_w {
                        let mut best = f64::NEG_INFINITY;
                        let mut best_idx = 0;
                        for kh in 0..self.pool_h {
                            for kw in 0..self.pool_w {
                                let v = x[[n, c, i * self.stride + kh, j * self.stride + kw]];
                                // Strict comparison keeps the first occurrence on ties.
                                if v > best {
                                    best = v;
                                    best_idx = kh * self.pool_w + kw;
                                }
                            }
                        }
                        output[[n, c, i, j]] = best;
                        argmax[[n, c, i, j]] = best_idx;
                    }
                }
            }
        }

        self.cache = Some((x.dim(), argmax));
        Ok(output.into_dyn())
    }

    fn backward(
        &mut self,
        grad_output: &ArrayD<f64>,
        _params: &ParamSet,
        _grads: &mut GradSet,
    ) -> Result<ArrayD<f64>, NetError> {
        let (input_dim, argmax) = self
            .cache
            .as_ref()
            .ok_or(NetError::BackwardBeforeForward("MaxPooling"))?;
        let dout = grad_output
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|_| NetError::ShapeMismatch("pooling backward expects a 4-D gradient".into()))?;
        if dout.dim() != argmax.dim() {
            return Err(NetError::ShapeMismatch(format!(
                "pooling backward received {:?}, forward produced {:?}",
                dout.dim(),
                argmax.dim()
            )));
        }

        let (batch, channels, out_h, out_w) = dout.dim();
        let mut grad_input = Array4::<f64>::zeros(*input_dim);

        for n in 0..batch {
            for c in 0..channels {
                for i in 0..out_h {
                    for j in 0..out_w {
                        let flat = argmax[[n, c, i, j]];
                        let kh = flat / self.pool_w;
                        let kw = flat % self.pool_w;
                        grad_input[[n, c, i * self.stride + kh, j * self.stride + kw]] +=
                            dout[[n, c, i, j]];
                    }
                }
            }
        }

        Ok(grad_input.into_dyn())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn test_forward_picks_window_maximum() {
        // Single 2x2 window [[1,3],[5,2]]: maximum 5 sits at (1,0).
        let mut pool = MaxPooling::new(2, 2, 2);
        let params = ParamSet::new();
        let input =
            Array4::from_shape_vec((1, 1, 2, 2), vec![1.0, 3.0, 5.0, 2.0]).expect("shape matches");

        let output = pool.forward(input.into_dyn(), &params).unwrap();
        assert_eq!(output.shape(), &[1, 1, 1, 1]);
        assert_eq!(output[[0, 0, 0, 0]], 5.0);
    }

    #[test]
    fn test_backward_routes_gradient_to_argmax() {
        let mut pool = MaxPooling::new(2, 2, 2);
        let params = ParamSet::new();
        let mut grads = GradSet::new();
        let input =
            Array4::from_shape_vec((1, 1, 2, 2), vec![1.0, 3.0, 5.0, 2.0]).expect("shape matches");
        pool.forward(input.into_dyn(), &params).unwrap();

        let dout = ArrayD::ones(ndarray::IxDyn(&[1, 1, 1, 1]));
        let grad_input = pool.backward(&dout, &params, &mut grads).unwrap();

        assert_eq!(grad_input[[0, 0, 0, 0]], 0.0);
        assert_eq!(grad_input[[0, 0, 0, 1]], 0.0);
        assert_eq!(grad_input[[0, 0, 1, 0]], 1.0);
        assert_eq!(grad_input[[0, 0, 1, 1]], 0.0);
    }

    #[test]
    fn test_tie_break_prefers_first_occurrence() {
        let mut pool = MaxPooling::new(2, 2, 2);
        let params = ParamSet::new();
        let mut grads = GradSet::new();
        let input =
            Array4::from_shape_vec((1, 1, 2, 2), vec![7.0, 7.0, 7.0, 7.0]).expect("shape matches");
        pool.forward(input.into_dyn(), &params).unwrap();

        let dout = ArrayD::ones(ndarray::IxDyn(&[1, 1, 1, 1]));
        let grad_input = pool.backward(&dout, &params, &mut grads).unwrap();

        assert_eq!(grad_input[[0, 0, 0, 0]], 1.0);
        assert_eq!(grad_input.sum(), 1.0);
    }

    #[test]
    fn test_window_must_tile_input() {
        let mut pool = MaxPooling::new(2, 2, 2);
        let params = ParamSet::new();
        let input = Array4::<f64>::zeros((1, 1, 3, 3));

        assert!(matches!(
            pool.forward(input.into_dyn(), &params),
            Err(NetError::InvalidConfig(_))
        ));
    }
}
