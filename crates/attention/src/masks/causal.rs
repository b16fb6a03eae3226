//! Lower-triangular causal masks.

use candle_core::{Device, Tensor};
use layers::Result;

/// Builds the `(seq_len, seq_len)` causal mask.
///
/// Entry `(i, j)` is `0.0` for `j <= i` and `f32::NEG_INFINITY` for `j > i`, so
/// the diagonal is always kept.
pub fn causal_mask(device: &Device, seq_len: usize) -> Result<Tensor> {
    let data: Vec<f32> = (0..seq_len)
        .flat_map(|i| {
            (0..seq_len).map(move |j| if j > i { f32::NEG_INFINITY } else { 0.0 })
        })
        .collect();
    Ok(Tensor::from_vec(data, (seq_len, seq_len), device)?)
}
