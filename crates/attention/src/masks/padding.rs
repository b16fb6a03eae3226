//! Builders for padding masks used to drop padded keys.

use candle_core::{Device, Tensor};
use layers::Result;

/// Masks key positions at or beyond each batch element's valid length.
///
/// The result is `(batch, 1, seq_len, seq_len)` so it broadcasts over the
/// head axis of multi-head attention. Lengths larger than `seq_len` are
/// clamped. A length of zero masks every key of that batch element, which the
/// attention softmax reports as a numeric instability.
pub fn padding_mask_from_lengths(
    device: &Device,
    key_lengths: &[usize],
    seq_len: usize,
) -> Result<Tensor> {
    let batch = key_lengths.len();
    let mut data = vec![0f32; batch * seq_len * seq_len];

    for (b, &valid) in key_lengths.iter().enumerate() {
        let valid = valid.min(seq_len);
        for q in 0..seq_len {
            let row_start = (b * seq_len + q) * seq_len;
            data[row_start + valid..row_start + seq_len].fill(f32::NEG_INFINITY);
        }
    }

    Ok(Tensor::from_vec(data, (batch, 1, seq_len, seq_len), device)?)
}
