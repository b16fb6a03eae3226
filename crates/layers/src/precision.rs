//! Precision policy for parameters and activations.
//!
//! Parameters may be stored in `f16`/`bf16`; matmuls and reductions are
//! promoted to `f32` and results are cast back to the storage dtype.
//! [`Linear`](crate::Linear) derives its policy from the weight dtype.

use candle_core::{DType, Tensor};

use crate::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecisionPolicy {
    storage: DType,
    compute: DType,
}

impl PrecisionPolicy {
    /// Builds a policy from the parameter storage dtype.
    pub fn from_storage(storage: DType) -> Self {
        Self {
            storage,
            compute: DType::F32,
        }
    }

    pub fn to_compute(&self, tensor: &Tensor) -> Result<Tensor> {
        cast(tensor, self.compute)
    }

    pub fn to_storage(&self, tensor: &Tensor) -> Result<Tensor> {
        cast(tensor, self.storage)
    }
}

fn cast(tensor: &Tensor, dtype: DType) -> Result<Tensor> {
    if tensor.dtype() == dtype {
        Ok(tensor.clone())
    } else {
        Ok(tensor.to_dtype(dtype)?)
    }
}
