//! Comparison of analytic gradients against finite-difference estimates.
//!
//! The backpropagated gradients are fast but easy to get subtly wrong; the
//! central-difference estimate is slow but hard to get wrong. Agreement
//! between the two is the correctness oracle for every layer's backward
//! pass.

use std::collections::BTreeMap;

use crate::net::error::NetError;
use crate::net::params::GradSet;

/// Perturbation used by the central-difference estimate. Large enough that
/// the loss difference survives f64 rounding, small enough that the
/// second-order truncation term stays below the comparison tolerance.
pub const NUMERICAL_STEP: f64 = 1e-4;

/// Denominator floor for [`relative_error`]. Gradient entries this close to
/// zero are dominated by finite-difference noise, so they are compared on an
/// absolute scale instead.
const DENOMINATOR_FLOOR: f64 = 1e-3;

/// Worst-case elementwise relative error between two tensors of the same
/// shape: `|a - n| / max(|a| + |n|, floor)`, maximized over elements.
pub fn relative_error(
    analytic: &ndarray::ArrayD<f64>,
    numerical: &ndarray::ArrayD<f64>,
) -> Result<f64, NetError> {
    if analytic.shape() != numerical.shape() {
        return Err(NetError::ShapeMismatch(format!(
            "cannot compare gradients of shape {:?} and {:?}",
            analytic.shape(),
            numerical.shape()
        )));
    }

    let mut worst = 0.0f64;
    for (&a, &n) in analytic.iter().zip(numerical.iter()) {
        let denom = (a.abs() + n.abs()).max(DENOMINATOR_FLOOR);
        worst = worst.max((a - n).abs() / denom);
    }
    Ok(worst)
}

/// Compares two gradient mappings parameter by parameter, returning the
/// worst relative error per name. Key sets and shapes must agree.
pub fn compare(analytic: &GradSet, numerical: &GradSet) -> Result<BTreeMap<String, f64>, NetError> {
    analytic.validate_matches(numerical)?;
    let mut report = BTreeMap::new();
    for (name, tensor) in analytic.iter() {
        let counterpart = numerical.get(name)?;
        report.insert(name.clone(), relative_error(tensor, counterpart)?);
    }
    Ok(report)
}
