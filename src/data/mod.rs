//! Batch labels and a synthetic stripe dataset for end-to-end validation.
//!
//! The engine itself is dataset-agnostic: any collaborator that supplies a
//! (batch, channel, height, width) tensor with integer or one-hot labels can
//! drive it. The stripe generator here exists so training, gradient checks,
//! and the demos run without external data, deterministically per seed.

use ndarray::{s, Array1, Array2, Array4, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Classification targets, either per-row class indices or a one-hot matrix.
/// Every consumer accepts both forms.
#[derive(Clone, Debug)]
pub enum Labels {
    Indices(Array1<usize>),
    OneHot(Array2<f64>),
}

impl Labels {
    pub fn len(&self) -> usize {
        match self {
            Labels::Indices(indices) => indices.len(),
            Labels::OneHot(matrix) => matrix.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Class index per row; one-hot rows reduce by argmax.
    pub fn to_indices(&self) -> Array1<usize> {
        match self {
            Labels::Indices(indices) => indices.clone(),
            Labels::OneHot(matrix) => {
                let indices = matrix
                    .axis_iter(Axis(0))
                    .map(|row| {
                        row.iter()
                            .enumerate()
                            .max_by(|(_, a), (_, b)| a.total_cmp(b))
                            .map(|(idx, _)| idx)
                            .unwrap_or(0)
                    })
                    .collect::<Vec<_>>();
                Array1::from_vec(indices)
            }
        }
    }

    /// One-hot matrix with `num_classes` columns. Index labels at or beyond
    /// `num_classes` produce an all-zero row; callers validate ranges before
    /// computing losses.
    pub fn to_one_hot(&self, num_classes: usize) -> Array2<f64> {
        match self {
            Labels::Indices(indices) => {
                let mut matrix = Array2::zeros((indices.len(), num_classes));
                for (row, &class) in indices.iter().enumerate() {
                    if class < num_classes {
                        matrix[[row, class]] = 1.0;
                    }
                }
                matrix
            }
            Labels::OneHot(matrix) => matrix.clone(),
        }
    }

    /// Gathers the given rows, preserving the label representation.
    pub fn select(&self, indices: &[usize]) -> Labels {
        match self {
            Labels::Indices(labels) => Labels::Indices(labels.select(Axis(0), indices)),
            Labels::OneHot(matrix) => Labels::OneHot(matrix.select(Axis(0), indices)),
        }
    }
}

/// Configuration for stripe dataset generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Image dimensions (height, width); images are single-channel.
    pub image_size: (usize, usize),
    /// Number of stripe positions, i.e. classes.
    pub num_classes: usize,
    /// Samples generated per class.
    pub samples_per_class: usize,
    /// Uniform background noise amplitude.
    pub noise_level: f64,
    /// Random seed for reproducibility.
    pub seed: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            image_size: (12, 12),
            num_classes: 4,
            samples_per_class: 50,
            noise_level: 0.1,
            seed: 42,
        }
    }
}

/// Synthetic classification task: each image is background noise with one
/// bright horizontal band, and the class is the band's position.
pub struct StripeDataset {
    /// (N, 1, height, width) image tensor.
    pub images: Array4<f64>,
    pub labels: Labels,
    pub config: DatasetConfig,
}

impl StripeDataset {
    /// Generates and shuffles a dataset. The same configuration always
    /// yields the same samples in the same order. A `num_classes` of 0 is
    /// clamped to 1, mirroring how other degenerate configuration values
    /// are clamped rather than panicking.
    pub fn generate(config: DatasetConfig) -> Self {
        let config = DatasetConfig {
            num_classes: config.num_classes.max(1),
            ..config
        };
        let (height, width) = config.image_size;
        let band_height = (height / config.num_classes).max(1);
        let total = config.num_classes * config.samples_per_class;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut images = Array4::<f64>::zeros((total, 1, height, width));
        let mut labels = Vec::with_capacity(total);

        let mut sample = 0;
        for class in 0..config.num_classes {
            let band_start = class * band_height;
            for _ in 0..config.samples_per_class {
                for row in 0..height {
                    let in_band = row >= band_start && row < band_start + band_height;
                    for col in 0..width {
                        let noise = rng.gen::<f64>() * config.noise_level;
                        images[[sample, 0, row, col]] = if in_band { 1.0 - noise } else { noise };
                    }
                }
                labels.push(class);
                sample += 1;
            }
        }

        let mut order: Vec<usize> = (0..total).collect();
        order.shuffle(&mut rng);
        let images = images.select(Axis(0), &order);
        let labels = Array1::from_vec(order.into_iter().map(|i| labels[i]).collect());

        Self {
            images,
            labels: Labels::Indices(labels),
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.images.shape()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Splits into (train, test) portions by the given train ratio.
    pub fn split(&self, train_ratio: f64) -> (StripeDataset, StripeDataset) {
        let total = self.len();
        let split = ((total as f64) * train_ratio.clamp(0.0, 1.0)).round() as usize;
        let split = split.min(total);

        let train_images = self.images.slice(s![..split, .., .., ..]).to_owned();
        let test_images = self.images.slice(s![split.., .., .., ..]).to_owned();
        let train_idx: Vec<usize> = (0..split).collect();
        let test_idx: Vec<usize> = (split..total).collect();

        (
            StripeDataset {
                images: train_images,
                labels: self.labels.select(&train_idx),
                config: self.config.clone(),
            },
            StripeDataset {
                images: test_images,
                labels: self.labels.select(&test_idx),
                config: self.config.clone(),
            },
        )
    }
}
