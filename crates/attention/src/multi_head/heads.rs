//! Reshapes between the packed hidden layout and per-head layout.
//!
//! Head `h` owns features `[h * head_dim, (h + 1) * head_dim)` of the hidden
//! axis. Splitting moves heads to axis 1 so they batch alongside the batch
//! axis; merging concatenates them back in head order. Sequence positions are
//! never reordered.

use candle_core::Tensor;
use layers::{LayerError, Result};

/// `(batch, seq, hidden)` → `(batch, n_heads, seq, hidden / n_heads)`.
pub fn split_heads(x: &Tensor, n_heads: usize) -> Result<Tensor> {
    let (batch, seq, hidden) = x.dims3().map_err(|_| {
        LayerError::shape_mismatch(format!(
            "split_heads expects (batch, seq, hidden), got {:?}",
            x.dims()
        ))
    })?;
    if n_heads == 0 || hidden % n_heads != 0 {
        return Err(LayerError::invalid_argument(format!(
            "hidden width {hidden} is not divisible into {n_heads} heads"
        )));
    }
    let head_dim = hidden / n_heads;
    Ok(x
        .reshape((batch, seq, n_heads, head_dim))?
        .transpose(1, 2)?
        .contiguous()?)
}

/// `(batch, n_heads, seq, head_dim)` → `(batch, seq, n_heads * head_dim)`.
pub fn merge_heads(x: &Tensor) -> Result<Tensor> {
    let (batch, n_heads, seq, head_dim) = x.dims4().map_err(|_| {
        LayerError::shape_mismatch(format!(
            "merge_heads expects (batch, heads, seq, head_dim), got {:?}",
            x.dims()
        ))
    })?;
    Ok(x
        .transpose(1, 2)?
        .contiguous()?
        .reshape((batch, seq, n_heads * head_dim))?)
}
