//! Strided, zero-padded convolution over (batch, channel, height, width).

use ndarray::{s, Array1, Array4, ArrayD, Ix1, Ix4};
use rayon::prelude::*;

use crate::net::error::NetError;
use crate::net::layer::Layer;
use crate::net::params::{GradSet, ParamSet};

/// Output extent of a convolution or pooling window along one axis:
/// `(input − filter + 2·pad) / stride + 1`.
///
/// A non-integral result means the window does not tile the input and is a
/// configuration error, never a silent truncation.
pub fn conv_output_size(
    input: usize,
    filter: usize,
    pad: usize,
    stride: usize,
) -> Result<usize, NetError> {
    if stride == 0 {
        return Err(NetError::InvalidConfig("stride must be at least 1".into()));
    }
    let span = input + 2 * pad;
    if span < filter {
        return Err(NetError::InvalidConfig(format!(
            "filter size {filter} exceeds padded input size {span}"
        )));
    }
    let numerator = span - filter;
    if numerator % stride != 0 {
        return Err(NetError::InvalidConfig(format!(
            "output size ({input} - {filter} + 2*{pad}) / {stride} + 1 is not an integer"
        )));
    }
    Ok(numerator / stride + 1)
}

fn pad_spatial(x: &Array4<f64>, pad: usize) -> Array4<f64> {
    if pad == 0 {
        return x.clone();
    }
    let (n, c, h, w) = x.dim();
    let mut padded = Array4::zeros((n, c, h + 2 * pad, w + 2 * pad));
    padded
        .slice_mut(s![.., .., pad..pad + h, pad..pad + w])
        .assign(x);
    padded
}

/// Convolution layer. Holds the *names* of its weight and bias in the
/// network's parameter mapping, never the tensors themselves.
pub struct Convolution {
    weight_key: String,
    bias_key: String,
    stride: usize,
    pad: usize,
    /// Zero-padded input from the last forward call.
    cache: Option<Array4<f64>>,
}

impl Convolution {
    pub fn new(
        weight_key: impl Into<String>,
        bias_key: impl Into<String>,
        stride: usize,
        pad: usize,
    ) -> Self {
        Self {
            weight_key: weight_key.into(),
            bias_key: bias_key.into(),
            stride,
            pad,
            cache: None,
        }
    }

    fn resolve<'p>(
        &self,
        params: &'p ParamSet,
    ) -> Result<(ndarray::ArrayView4<'p, f64>, ndarray::ArrayView1<'p, f64>), NetError> {
        let weight = params
            .get(&self.weight_key)?
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|_| {
                NetError::ShapeMismatch(format!(
                    "'{}' is not a (filters, channels, height, width) tensor",
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

impl Layer for Convolution {
    /// For each output position, the sum of elementwise products between a
    /// filter and the receptive-field patch of the padded input, plus bias.
    fn forward(&mut self, input: ArrayD<f64>, params: &ParamSet) -> Result<ArrayD<f64>, NetError> {
        let x = input.into_dimensionality::<Ix4>().map_err(|_| {
            NetError::ShapeMismatch(
                "convolution expects a (batch, channel, height, width) input".into(),
            )
        })?;
        let (weight, bias) = self.resolve(params)?;

        let (batch, channels, height, width) = x.dim();
        let (filters, weight_channels, filter_h, filter_w) = weight.dim();
        if weight_channels != channels {
            return Err(NetError::ShapeMismatch(format!(
                "'{}' expects {weight_channels} input channels, input has {channels}",
                self.weight_key
            )));
        }
        if bias.len() != filters {
            return Err(NetError::ShapeMismatch(format!(
                "'{}' has {} entries, expected one per filter ({filters})",
                self.bias_key,
                bias.len()
            )));
        }
        let out_h = conv_output_size(height, filter_h, self.pad, self.stride)?;
        let out_w = conv_output_size(width, filter_w, self.pad, self.stride)?;

        let padded = pad_spatial(&x, self.pad);
        let stride = self.stride;
        let mut output = Array4::<f64>::zeros((batch, filters, out_h, out_w));

        // Samples are independent, so parallelize over the batch axis.
        output
            .as_slice_mut()
            .expect("contiguous")
            .par_chunks_mut(filters * out_h * out_w)
            .enumerate()
            .for_each(|(n, sample_out)| {
                for f in 0..filters {
                    for i in 0..out_h {
                        for j in 0..out_w {
                            let mut acc = bias[f];
                            for c in 0..channels {
                                for kh in 0..filter_h {
                                    for kw in 0..filter_w {
                                        acc += weight[[f, c, kh, kw]]
                                            * padded[[n, c, i * stride + kh, j * stride + kw]];
                                    }
                                }
                            }
                            sample_out[(f * out_h + i) * out_w + j] = acc;
                        }
                    }
                }
            });

        self.cache = Some(padded);
        Ok(output.into_dyn())
    }

    /// Weight gradient correlates input patches with the output gradient,
    /// bias gradient sums the output gradient over batch and positions, and
    /// the input gradient distributes the output gradient back through each
    /// receptive field (summing where fields overlap). The padding region is
    /// stripped before returning, since it has no real input behind it.
    fn backward(
        &mut self,
        grad_output: &ArrayD<f64>,
        params: &ParamSet,
        grads: &mut GradSet,
    ) -> Result<ArrayD<f64>, NetError> {
        let padded = self
            .cache
            .as_ref()
            .ok_or(NetError::BackwardBeforeForward("Convolution"))?;
        let dout = grad_output
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|_| {
                NetError::ShapeMismatch("convolution backward expects a 4-D gradient".into())
            })?;
        let (weight, _bias) = self.resolve(params)?;

        let (batch, channels, padded_h, padded_w) = padded.dim();
        let (filters, _, filter_h, filter_w) = weight.dim();
        let (grad_batch, grad_filters, out_h, out_w) = dout.dim();
        if grad_batch != batch || grad_filters != filters {
            return Err(NetError::ShapeMismatch(format!(
                "convolution backward received {:?}, forward produced batch {batch} x {filters} filters",
                dout.dim()
            )));
        }

        let stride = self.stride;
        let mut grad_weight = Array4::<f64>::zeros(weight.dim());
        let mut grad_bias = Array1::<f64>::zeros(filters);
        let mut grad_padded = Array4::<f64>::zeros(padded.dim());

        for n in 0..batch {
            for f in 0..filters {
                for i in 0..out_h {
                    for j in 0..out_w {
                        let g = dout[[n, f, i, j]];
                        grad_bias[f] += g;
                        for c in 0..channels {
                            for kh in 0..filter_h {
                                for kw in 0..filter_w {
                                    let row = i * stride + kh;
                                    let col = j * stride + kw;
                                    grad_weight[[f, c, kh, kw]] += g * padded[[n, c, row, col]];
                                    grad_padded[[n, c, row, col]] += g * weight[[f, c, kh, kw]];
                                }
                            }
                        }
                    }
                }
            }
        }

        let height = padded_h - 2 * self.pad;
        let width = padded_w - 2 * self.pad;
        let grad_input = grad_padded
            .slice(s![.., .., self.pad..self.pad + height, self.pad..self.pad + width])
            .to_owned();

        grads.insert(&self.weight_key, grad_weight.into_dyn());
        grads.insert(&self.bias_key, grad_bias.into_dyn());
        Ok(grad_input.into_dyn())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn ones_setup() -> (Convolution, ParamSet, Array4<f64>) {
        // 1x1x3x3 all-ones input, single 1x1x2x2 all-ones filter, zero bias.
        let mut params = ParamSet::new();
        params.insert("W1", Array4::<f64>::ones((1, 1, 2, 2)).into_dyn());
        params.insert("b1", Array1::<f64>::zeros(1).into_dyn());
        let conv = Convolution::new("W1", "b1", 1, 0);
        let input = Array4::<f64>::ones((1, 1, 3, 3));
        (conv, params, input)
    }

    #[test]
    fn test_output_size_rejects_non_integral() {
        assert_eq!(conv_output_size(28, 5, 0, 1).unwrap(), 24);
        assert_eq!(conv_output_size(5, 3, 1, 2).unwrap(), 3);
        assert!(conv_output_size(6, 3, 0, 2).is_err());
        assert!(conv_output_size(3, 2, 0, 0).is_err());
    }

    #[test]
    fn test_forward_all_ones_gives_all_fours() {
        let (mut conv, params, input) = ones_setup();
        let output = conv.forward(input.into_dyn(), &params).unwrap();

        assert_eq!(output.shape(), &[1, 1, 2, 2]);
        assert!(output.iter().all(|&v| (v - 4.0).abs() < 1e-12));
    }

    #[test]
    fn test_backward_all_ones_weight_gradient_is_four() {
        let (mut conv, params, input) = ones_setup();
        conv.forward(input.into_dyn(), &params).unwrap();

        let mut grads = GradSet::new();
        let dout = Array4::<f64>::ones((1, 1, 2, 2)).into_dyn();
        let grad_input = conv.backward(&dout, &params, &mut grads).unwrap();

        // Each weight element sits over 4 all-ones input patches.
        let grad_weight = grads.get("W1").unwrap();
        assert!(grad_weight.iter().all(|&v| (v - 4.0).abs() < 1e-12));
        assert_eq!(grads.get("b1").unwrap()[[0]], 4.0);

        // Overlap counts of the transposed convolution.
        let expected = [[1.0, 2.0, 1.0], [2.0, 4.0, 2.0], [1.0, 2.0, 1.0]];
        for (i, row) in expected.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                assert!((grad_input[[0, 0, i, j]] - v).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_padding_is_stripped_from_input_gradient() {
        let mut params = ParamSet::new();
        params.insert("W1", Array4::<f64>::ones((1, 1, 3, 3)).into_dyn());
        params.insert("b1", Array1::<f64>::zeros(1).into_dyn());
        let mut conv = Convolution::new("W1", "b1", 1, 1);

        let input = Array4::<f64>::ones((1, 1, 4, 4));
        let output = conv.forward(input.into_dyn(), &params).unwrap();
        assert_eq!(output.shape(), &[1, 1, 4, 4]);

        let mut grads = GradSet::new();
        let dout = ArrayD::ones(ndarray::IxDyn(&[1, 1, 4, 4]));
        let grad_input = conv.backward(&dout, &params, &mut grads).unwrap();
        assert_eq!(grad_input.shape(), &[1, 1, 4, 4]);
    }

    #[test]
    fn test_backward_before_forward_fails() {
        let (mut conv, params, _input) = ones_setup();
        let mut grads = GradSet::new();
        let dout = ArrayD::ones(ndarray::IxDyn(&[1, 1, 2, 2]));

        assert!(matches!(
            conv.backward(&dout, &params, &mut grads),
            Err(NetError::BackwardBeforeForward("Convolution"))
        ));
    }
}
