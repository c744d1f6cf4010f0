//! First-order parameter-update rules.
//!
//! Every optimizer mutates the parameter mapping in place from a gradient
//! mapping with the same keys. Auxiliary state (velocity, squared-gradient
//! accumulator, moment estimates) is keyed by parameter name and created
//! lazily on the first update that sees a given name; once created it never
//! changes shape.

use std::collections::HashMap;
use std::str::FromStr;

use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};

use crate::net::error::NetError;
use crate::net::params::{GradSet, ParamSet};

/// A stateful update rule consuming (parameters, gradients).
pub trait Optimizer {
    fn update(&mut self, params: &mut ParamSet, grads: &GradSet) -> Result<(), NetError>;
}

fn param_names(params: &ParamSet) -> Vec<String> {
    params.names().cloned().collect()
}

/// Plain gradient descent: `param -= learning_rate * gradient`.
pub struct Sgd {
    pub learning_rate: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }
}

impl Default for Sgd {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl Optimizer for Sgd {
    fn update(&mut self, params: &mut ParamSet, grads: &GradSet) -> Result<(), NetError> {
        for name in param_names(params) {
            let grad = grads.get(&name)?;
            let param = params.get_mut(&name)?;
            param.zip_mut_with(grad, |p, &g| *p -= self.learning_rate * g);
        }
        Ok(())
    }
}

/// Momentum: `v = momentum * v - learning_rate * gradient; param += v`.
pub struct Momentum {
    pub learning_rate: f64,
    pub momentum: f64,
    velocities: HashMap<String, ArrayD<f64>>,
}

impl Momentum {
    pub fn new(learning_rate: f64, momentum: f64) -> Self {
        Self {
            learning_rate,
            momentum,
            velocities: HashMap::new(),
        }
    }
}

impl Default for Momentum {
    fn default() -> Self {
        Self::new(0.01, 0.9)
    }
}

impl Optimizer for Momentum {
    fn update(&mut self, params: &mut ParamSet, grads: &GradSet) -> Result<(), NetError> {
        for name in param_names(params) {
            let grad = grads.get(&name)?;
            let param = params.get_mut(&name)?;
            let velocity = self
                .velocities
                .entry(name.clone())
                .or_insert_with(|| ArrayD::zeros(param.raw_dim()));

            velocity.zip_mut_with(grad, |v, &g| {
                *v = self.momentum * *v - self.learning_rate * g;
            });
            param.zip_mut_with(velocity, |p, &v| *p += v);
        }
        Ok(())
    }
}

/// AdaGrad-style adaptive learning rate: accumulates squared gradients per
/// element and shrinks the step for frequently updated parameters.
pub struct AdaGrad {
    pub learning_rate: f64,
    pub epsilon: f64,
    accumulated: HashMap<String, ArrayD<f64>>,
}

impl AdaGrad {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            epsilon: 1e-7,
            accumulated: HashMap::new(),
        }
    }
}

impl Default for AdaGrad {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl Optimizer for AdaGrad {
    fn update(&mut self, params: &mut ParamSet, grads: &GradSet) -> Result<(), NetError> {
        for name in param_names(params) {
            let grad = grads.get(&name)?;
            let param = params.get_mut(&name)?;
            let accumulated = self
                .accumulated
                .entry(name.clone())
                .or_insert_with(|| ArrayD::zeros(param.raw_dim()));

            accumulated.zip_mut_with(grad, |h, &g| *h += g * g);
            Zip::from(param)
                .and(grad)
                .and(&*accumulated)
                .for_each(|p, &g, &h| {
                    *p -= self.learning_rate * g / (h.sqrt() + self.epsilon);
                });
        }
        Ok(())
    }
}

/// Adam-style adaptive momentum: exponential moving averages of the gradient
/// and its square, with bias correction folded into the effective step size.
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    first_moments: HashMap<String, ArrayD<f64>>,
    second_moments: HashMap<String, ArrayD<f64>>,
    t: i32,
}

impl Adam {
    pub fn new(learning_rate: f64, beta1: f64, beta2: f64) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon: 1e-8,
            first_moments: HashMap::new(),
            second_moments: HashMap::new(),
            t: 0,
        }
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.001, 0.9, 0.999)
    }
}

impl Optimizer for Adam {
    fn update(&mut self, params: &mut ParamSet, grads: &GradSet) -> Result<(), NetError> {
        self.t += 1;
        // Bias-corrected step size; equivalent to dividing the moments by
        // (1 - beta^t) individually.
        let corrected_lr = self.learning_rate * (1.0 - self.beta2.powi(self.t)).sqrt()
            / (1.0 - self.beta1.powi(self.t));

        for name in param_names(params) {
            let grad = grads.get(&name)?;
            let param = params.get_mut(&name)?;
            let m = self
                .first_moments
                .entry(name.clone())
                .or_insert_with(|| ArrayD::zeros(param.raw_dim()));
            let v = self
                .second_moments
                .entry(name.clone())
                .or_insert_with(|| ArrayD::zeros(param.raw_dim()));

            m.zip_mut_with(grad, |m, &g| *m = self.beta1 * *m + (1.0 - self.beta1) * g);
            v.zip_mut_with(grad, |v, &g| *v = self.beta2 * *v + (1.0 - self.beta2) * g * g);

            Zip::from(param).and(&*m).and(&*v).for_each(|p, &m, &v| {
                *p -= corrected_lr * m / (v.sqrt() + self.epsilon);
            });
        }
        Ok(())
    }
}

/// Optimizer selection by tag. The string forms are the external interface:
/// `plain`, `momentum`, `adaptive`, `adaptive-momentum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptimizerKind {
    Plain,
    Momentum,
    Adaptive,
    #[default]
    AdaptiveMomentum,
}

impl FromStr for OptimizerKind {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(OptimizerKind::Plain),
            "momentum" => Ok(OptimizerKind::Momentum),
            "adaptive" => Ok(OptimizerKind::Adaptive),
            "adaptive-momentum" => Ok(OptimizerKind::AdaptiveMomentum),
            other => Err(NetError::InvalidConfig(format!(
                "unknown optimizer tag '{other}'"
            ))),
        }
    }
}

impl OptimizerKind {
    pub fn default_learning_rate(self) -> f64 {
        match self {
            OptimizerKind::Plain | OptimizerKind::Momentum | OptimizerKind::Adaptive => 0.01,
            OptimizerKind::AdaptiveMomentum => 0.001,
        }
    }

    /// Builds the optimizer with its default hyperparameters.
    pub fn build(self) -> Box<dyn Optimizer> {
        self.build_with_learning_rate(self.default_learning_rate())
    }

    /// Builds the optimizer with an overridden learning rate; other
    /// hyperparameters keep their defaults.
    pub fn build_with_learning_rate(self, learning_rate: f64) -> Box<dyn Optimizer> {
        match self {
            OptimizerKind::Plain => Box::new(Sgd::new(learning_rate)),
            OptimizerKind::Momentum => Box::new(Momentum::new(learning_rate, 0.9)),
            OptimizerKind::Adaptive => Box::new(AdaGrad::new(learning_rate)),
            OptimizerKind::AdaptiveMomentum => Box::new(Adam::new(learning_rate, 0.9, 0.999)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    fn scalar_sets(param: f64, grad: f64) -> (ParamSet, GradSet) {
        let mut params = ParamSet::new();
        params.insert("w", ArrayD::from_elem(IxDyn(&[1]), param));
        let mut grads = GradSet::new();
        grads.insert("w", ArrayD::from_elem(IxDyn(&[1]), grad));
        (params, grads)
    }

    fn value(params: &ParamSet) -> f64 {
        params.get("w").unwrap()[[0]]
    }

    #[test]
    fn test_sgd_step() {
        let (mut params, grads) = scalar_sets(1.0, 2.0);
        let mut sgd = Sgd::new(0.1);
        sgd.update(&mut params, &grads).unwrap();
        assert!((value(&params) - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_momentum_two_steps() {
        // With momentum 0.9 and lr 0.01 against a constant gradient of 2,
        // the deltas are exactly -0.02 and then -0.038.
        let (mut params, grads) = scalar_sets(0.0, 2.0);
        let mut momentum = Momentum::new(0.01, 0.9);

        momentum.update(&mut params, &grads).unwrap();
        assert!((value(&params) + 0.02).abs() < 1e-12);

        momentum.update(&mut params, &grads).unwrap();
        assert!((value(&params) + 0.02 + 0.038).abs() < 1e-12);
    }

    #[test]
    fn test_adagrad_shrinks_effective_step() {
        let (mut params, grads) = scalar_sets(0.0, 1.0);
        let mut adagrad = AdaGrad::new(0.1);

        adagrad.update(&mut params, &grads).unwrap();
        let first = -value(&params);
        // h = 1 after one step, so the first delta is lr / (1 + eps).
        assert!((first - 0.1 / (1.0 + 1e-7)).abs() < 1e-12);

        let before = value(&params);
        adagrad.update(&mut params, &grads).unwrap();
        let second = before - value(&params);
        assert!(second < first);
        assert!((second - 0.1 / (2.0f64.sqrt() + 1e-7)).abs() < 1e-12);
    }

    #[test]
    fn test_adam_constant_gradient_steps_near_learning_rate() {
        // With a constant gradient the bias-corrected moments cancel and each
        // step is almost exactly the learning rate.
        let (mut params, grads) = scalar_sets(0.0, 1.0);
        let mut adam = Adam::default();

        adam.update(&mut params, &grads).unwrap();
        assert!((value(&params) + 0.001).abs() < 1e-6);

        adam.update(&mut params, &grads).unwrap();
        assert!((value(&params) + 0.002).abs() < 1e-6);
    }

    #[test]
    fn test_adam_matches_scalar_reference() {
        // Scripted gradient sequence against an elementwise reference of the
        // published formulation.
        let gradient_script = [1.0, -0.5, 0.25, 2.0];
        let (lr, beta1, beta2, eps) = (0.001, 0.9, 0.999, 1e-8);

        let (mut params, _) = scalar_sets(0.3, 0.0);
        let mut adam = Adam::new(lr, beta1, beta2);

        let (mut reference, mut m, mut v) = (0.3f64, 0.0f64, 0.0f64);
        for (step, &g) in gradient_script.iter().enumerate() {
            let mut grads = GradSet::new();
            grads.insert("w", ArrayD::from_elem(IxDyn(&[1]), g));
            adam.update(&mut params, &grads).unwrap();

            let t = (step + 1) as i32;
            m = beta1 * m + (1.0 - beta1) * g;
            v = beta2 * v + (1.0 - beta2) * g * g;
            let lr_t = lr * (1.0 - beta2.powi(t)).sqrt() / (1.0 - beta1.powi(t));
            reference -= lr_t * m / (v.sqrt() + eps);

            assert!(
                (value(&params) - reference).abs() < 1e-12,
                "diverged at step {t}"
            );
        }
    }

    #[test]
    fn test_lazy_state_tolerates_new_keys_only_when_empty() {
        let (mut params, grads) = scalar_sets(0.0, 1.0);
        let mut momentum = Momentum::default();
        momentum.update(&mut params, &grads).unwrap();

        // A second parameter appearing later still gets fresh state.
        params.insert("b", ArrayD::from_elem(IxDyn(&[2]), 0.0));
        let mut grads2 = GradSet::new();
        grads2.insert("w", ArrayD::from_elem(IxDyn(&[1]), 1.0));
        grads2.insert("b", ArrayD::from_elem(IxDyn(&[2]), 1.0));
        momentum.update(&mut params, &grads2).unwrap();

        assert!((params.get("b").unwrap()[[0]] + 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_kind_parsing_and_defaults() {
        assert_eq!("plain".parse::<OptimizerKind>().unwrap(), OptimizerKind::Plain);
        assert_eq!(
            "adaptive-momentum".parse::<OptimizerKind>().unwrap(),
            OptimizerKind::AdaptiveMomentum
        );
        assert!("sgd".parse::<OptimizerKind>().is_err());
        assert_eq!(OptimizerKind::AdaptiveMomentum.default_learning_rate(), 0.001);
    }

    #[test]
    fn test_missing_gradient_key_is_an_error() {
        let (mut params, _) = scalar_sets(0.0, 0.0);
        let grads = GradSet::new();
        let mut sgd = Sgd::default();

        assert!(matches!(
            sgd.update(&mut params, &grads),
            Err(NetError::MissingParam(_))
        ));
    }
}
