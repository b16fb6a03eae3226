//! Lightweight validation helpers shared across components.
//!
//! Every helper takes a `name` used as a prefix in the error context so the
//! caller's parameter shows up in the message. Structural problems surface as
//! [`LayerError::ShapeMismatch`], bad scalars as
//! [`LayerError::InvalidArgument`].

use candle_core::{DType, Tensor};

use crate::errors::{LayerError, Result};

/// Dtypes accepted for floating point activations and parameters.
pub const FLOAT_DTYPES: [DType; 3] = [DType::F32, DType::F16, DType::BF16];

/// Rejects zero-valued dimensions.
pub fn expect_positive(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        Err(LayerError::invalid_argument(format!(
            "{name} must be greater than zero"
        )))
    } else {
        Ok(())
    }
}

/// Ensures a tensor has exactly `rank` dimensions.
pub fn expect_rank(name: &str, tensor: &Tensor, rank: usize) -> Result<()> {
    if tensor.rank() == rank {
        Ok(())
    } else {
        Err(LayerError::shape_mismatch(format!(
            "{name} expected rank {rank}, got shape {:?}",
            tensor.dims()
        )))
    }
}

/// Ensures a tensor has at least `rank` dimensions.
pub fn expect_min_rank(name: &str, tensor: &Tensor, rank: usize) -> Result<()> {
    if tensor.rank() >= rank {
        Ok(())
    } else {
        Err(LayerError::shape_mismatch(format!(
            "{name} expected at least rank {rank}, got shape {:?}",
            tensor.dims()
        )))
    }
}

/// Ensures a tensor matches the expected dimensions exactly.
pub fn expect_shape(name: &str, tensor: &Tensor, expected: &[usize]) -> Result<()> {
    if tensor.dims() == expected {
        Ok(())
    } else {
        Err(LayerError::shape_mismatch(format!(
            "{name} expected shape {expected:?}, got {:?}",
            tensor.dims()
        )))
    }
}

/// Validates the trailing feature dimension.
pub fn expect_last_dim(name: &str, tensor: &Tensor, expected: usize) -> Result<()> {
    match tensor.dims().last() {
        Some(&last) if last == expected => Ok(()),
        _ => Err(LayerError::shape_mismatch(format!(
            "{name} expected last dim {expected}, got shape {:?}",
            tensor.dims()
        ))),
    }
}

/// Checks the tensor dtype is one of the allowed values.
pub fn expect_dtype_in(name: &str, tensor: &Tensor, allowed: &[DType]) -> Result<()> {
    let dtype = tensor.dtype();
    if allowed.contains(&dtype) {
        Ok(())
    } else {
        Err(LayerError::UnsupportedDType {
            requested: format!("{dtype:?} for {name} (allowed {allowed:?})"),
        })
    }
}

/// Ensures two tensors live on the same device.
pub fn expect_same_device(lhs_name: &str, lhs: &Tensor, rhs_name: &str, rhs: &Tensor) -> Result<()> {
    if lhs.device().same_device(rhs.device()) {
        Ok(())
    } else {
        Err(LayerError::shape_mismatch(format!(
            "{lhs_name} and {rhs_name} must reside on the same device"
        )))
    }
}

/// Ensures two tensors share a dtype.
pub fn expect_same_dtype(lhs_name: &str, lhs: &Tensor, rhs_name: &str, rhs: &Tensor) -> Result<()> {
    if lhs.dtype() == rhs.dtype() {
        Ok(())
    } else {
        Err(LayerError::shape_mismatch(format!(
            "{lhs_name} has dtype {:?} but {rhs_name} has {:?}",
            lhs.dtype(),
            rhs.dtype()
        )))
    }
}
