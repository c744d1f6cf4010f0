//! Analytic vs numerical gradient agreement on a deliberately small network.
//!
//! The numerical gradient costs two forward passes per parameter element, so
//! the geometry here is chosen to keep the parameter count in the hundreds.

use ndarray::{Array1, Array4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scratchnet::{compare, ConvParams, Labels, NetworkConfig, SimpleConvNet, WeightInit};

fn tiny_config() -> NetworkConfig {
    NetworkConfig {
        input_dim: (1, 6, 6),
        conv: ConvParams {
            filter_num: 2,
            filter_size: 3,
            pad: 0,
            stride: 1,
        },
        hidden_size: 8,
        output_size: 3,
        weight_init: WeightInit::Std(0.01),
        seed: 42,
    }
}

#[test]
fn test_analytic_gradient_matches_numerical_oracle() {
    let mut net = SimpleConvNet::from_seed(&tiny_config()).unwrap();

    let mut rng = StdRng::seed_from_u64(11);
    let x = Array4::from_shape_fn((2, 1, 6, 6), |_| rng.gen::<f64>());
    let labels = Labels::Indices(Array1::from_vec(vec![0, 2]));

    let analytic = net.gradient(&x, &labels).unwrap();
    let numerical = net.numerical_gradient(&x, &labels).unwrap();

    let report = compare(&analytic, &numerical).unwrap();
    assert_eq!(report.len(), 6);
    for (name, error) in report {
        assert!(
            error < 1e-4,
            "gradient of '{name}' disagrees with the numerical estimate: {error:.3e}"
        );
    }
}

#[test]
fn test_gradient_check_holds_with_one_hot_labels() {
    let mut net = SimpleConvNet::from_seed(&tiny_config()).unwrap();

    let mut rng = StdRng::seed_from_u64(23);
    let x = Array4::from_shape_fn((2, 1, 6, 6), |_| rng.gen::<f64>());
    let one_hot = ndarray::array![[0.0, 1.0, 0.0], [1.0, 0.0, 0.0]];
    let labels = Labels::OneHot(one_hot);

    let analytic = net.gradient(&x, &labels).unwrap();
    let numerical = net.numerical_gradient(&x, &labels).unwrap();

    for (name, error) in compare(&analytic, &numerical).unwrap() {
        assert!(error < 1e-4, "'{name}' error {error:.3e}");
    }
}

#[test]
fn test_gradient_check_holds_with_padding_and_stride() {
    // pad 1 keeps the 8x8 extent through the convolution.
    let config = NetworkConfig {
        input_dim: (1, 8, 8),
        conv: ConvParams {
            filter_num: 2,
            filter_size: 3,
            pad: 1,
            stride: 1,
        },
        hidden_size: 6,
        output_size: 2,
        weight_init: WeightInit::He,
        seed: 5,
    };
    let mut net = SimpleConvNet::from_seed(&config).unwrap();

    let mut rng = StdRng::seed_from_u64(31);
    let x = Array4::from_shape_fn((2, 1, 8, 8), |_| rng.gen::<f64>() - 0.5);
    let labels = Labels::Indices(Array1::from_vec(vec![1, 0]));

    let analytic = net.gradient(&x, &labels).unwrap();
    let numerical = net.numerical_gradient(&x, &labels).unwrap();

    for (name, error) in compare(&analytic, &numerical).unwrap() {
        assert!(error < 1e-4, "'{name}' error {error:.3e}");
    }
}
