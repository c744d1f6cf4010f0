//! Named tensor collections for learnable parameters and their gradients.
//!
//! The [`ParamSet`] owned by the network is the single source of truth for
//! learnable state. Layers hold parameter *names*, never copies, and resolve
//! them on every forward/backward call, so replacing a tensor in the mapping
//! (e.g. during a checkpoint load) is observed by every layer immediately.

use std::collections::BTreeMap;

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::net::error::NetError;

/// Name → tensor mapping with a key set that is stable for the lifetime of
/// a network instance.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ParamSet {
    tensors: BTreeMap<String, ArrayD<f64>>,
}

/// Gradient mapping produced by a backward pass. Always mirrors the key set
/// and per-key shapes of the [`ParamSet`] it was computed against.
pub type GradSet = ParamSet;

impl ParamSet {
    pub fn new() -> Self {
        Self {
            tensors: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: ArrayD<f64>) {
        self.tensors.insert(name.into(), tensor);
    }

    pub fn get(&self, name: &str) -> Result<&ArrayD<f64>, NetError> {
        self.tensors
            .get(name)
            .ok_or_else(|| NetError::MissingParam(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut ArrayD<f64>, NetError> {
        self.tensors
            .get_mut(name)
            .ok_or_else(|| NetError::MissingParam(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.tensors.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ArrayD<f64>)> {
        self.tensors.iter()
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Reads one scalar element by flat index. Used by the numerical
    /// gradient, which perturbs parameters one element at a time.
    pub fn elem(&self, name: &str, index: usize) -> Result<f64, NetError> {
        let tensor = self.get(name)?;
        tensor
            .as_slice()
            .and_then(|slice| slice.get(index))
            .copied()
            .ok_or_else(|| {
                NetError::ShapeMismatch(format!(
                    "element {index} is out of bounds for parameter '{name}'"
                ))
            })
    }

    /// Writes one scalar element by flat index.
    pub fn set_elem(&mut self, name: &str, index: usize, value: f64) -> Result<(), NetError> {
        let tensor = self.get_mut(name)?;
        let slot = tensor
            .as_slice_mut()
            .and_then(|slice| slice.get_mut(index))
            .ok_or_else(|| {
                NetError::ShapeMismatch(format!(
                    "element {index} is out of bounds for parameter '{name}'"
                ))
            })?;
        *slot = value;
        Ok(())
    }

    /// Verifies that `other` carries exactly this mapping's keys with
    /// matching shapes. Used after a backward walk and before applying a
    /// loaded snapshot.
    pub fn validate_matches(&self, other: &ParamSet) -> Result<(), NetError> {
        for name in other.names() {
            if !self.tensors.contains_key(name) {
                return Err(NetError::MissingParam(name.clone()));
            }
        }
        for (name, tensor) in self.iter() {
            let counterpart = other.get(name)?;
            if counterpart.shape() != tensor.shape() {
                return Err(NetError::ShapeMismatch(format!(
                    "'{name}' has shape {:?}, counterpart has {:?}",
                    tensor.shape(),
                    counterpart.shape()
                )));
            }
        }
        Ok(())
    }

    /// Replaces every tensor with the same-named tensor from `other`, after
    /// checking that key sets and shapes agree exactly.
    pub fn assign_all(&mut self, other: &ParamSet) -> Result<(), NetError> {
        self.validate_matches(other)?;
        for (name, tensor) in other.iter() {
            self.tensors.insert(name.clone(), tensor.clone());
        }
        Ok(())
    }
}
