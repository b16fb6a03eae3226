//! Numerically stable softmax over the key axis.

use candle_core::{DType, Tensor, D};
use layers::{LayerError, Result};

/// Softmax along the last dimension, computed in `f32`.
///
/// Each row is shifted by its maximum before exponentiating, so large scores
/// cannot overflow. `-inf` entries map to exactly `0.0`. A row whose maximum
/// is itself `-inf` (every position masked) is clamped so the shift never
/// evaluates `-inf - -inf`; such a row has zero mass and is rejected, as is any
/// row whose mass is not finite (e.g. from `NaN` or `+inf` scores).
pub fn stable_softmax_last_dim(scores: &Tensor) -> Result<Tensor> {
    let scores = scores.to_dtype(DType::F32)?;
    let row_max = scores.max_keepdim(D::Minus1)?;
    let floor = Tensor::new(f32::MIN, scores.device())?.broadcast_as(row_max.shape())?;
    let row_max = row_max.maximum(&floor)?;

    let exp = scores.broadcast_sub(&row_max)?.exp()?;
    let mass = exp.sum_keepdim(D::Minus1)?;
    ensure_finite_mass(&mass)?;
    Ok(exp.broadcast_div(&mass)?)
}

fn ensure_finite_mass(mass: &Tensor) -> Result<()> {
    let mass = mass.flatten_all()?;
    // `m - m` is zero for finite mass and NaN for NaN or infinite mass.
    let non_finite = mass.sub(&mass)?.ne(0f32)?.to_dtype(DType::U32)?;
    let empty = mass.le(0f32)?.to_dtype(DType::U32)?;
    let bad = non_finite.add(&empty)?;
    if bad.sum_all()?.to_scalar::<u32>()? == 0 {
        return Ok(());
    }

    let row = bad.argmax(0)?.to_scalar::<u32>()? as usize;
    let value = mass.get(row)?.to_scalar::<f32>()?;
    Err(LayerError::numeric_instability(format!(
        "softmax row {row} has no finite probability mass (mass = {value})"
    )))
}
