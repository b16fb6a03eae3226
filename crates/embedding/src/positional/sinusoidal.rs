//! Sinusoidal positional encoding from "Attention Is All You Need".
//!
//! For position `pos` and pair index `i`:
//!
//! ```text
//! angle          = pos / base^(2i / dim)
//! P[pos, 2i]     = sin(angle)
//! P[pos, 2i + 1] = cos(angle)
//! ```
//!
//! Angles are evaluated in `f64` and the table is stored as `f32`, so two
//! tables built from the same `(max_len, dim, base)` are bit-identical.

use candle_core::{DType, Device, Tensor};
use layers::{checks, LayerError, Result};

/// Frequency base used by the original Transformer.
pub const DEFAULT_BASE: f64 = 10_000.0;

/// Builds the `(max_len, dim)` sinusoidal table.
///
/// `dim` must be positive and even; `max_len == 0` yields an empty `(0, dim)`
/// tensor.
pub fn sinusoidal_table(max_len: usize, dim: usize, base: f64, device: &Device) -> Result<Tensor> {
    checks::expect_positive("positional.dim", dim)?;
    if dim % 2 != 0 {
        return Err(LayerError::invalid_argument(format!(
            "positional.dim must be even, got {dim}"
        )));
    }
    if !base.is_finite() || base <= 0.0 {
        return Err(LayerError::invalid_argument(format!(
            "positional.base must be a positive finite number, got {base}"
        )));
    }

    let denominators: Vec<f64> = (0..dim / 2)
        .map(|i| base.powf((2 * i) as f64 / dim as f64))
        .collect();

    let mut data = Vec::with_capacity(max_len * dim);
    for pos in 0..max_len {
        for denom in &denominators {
            let angle = pos as f64 / denom;
            data.push(angle.sin() as f32);
            data.push(angle.cos() as f32);
        }
    }

    log::debug!("sinusoidal table generated: max_len={max_len} dim={dim} base={base}");
    Ok(Tensor::from_vec(data, (max_len, dim), device)?)
}

/// Precomputed sinusoidal table that can be added to embeddings.
#[derive(Debug, Clone)]
pub struct SinusoidalEncoding {
    table: Tensor,
    max_len: usize,
    dim: usize,
    base: f64,
}

impl SinusoidalEncoding {
    pub fn new(max_len: usize, dim: usize, device: &Device) -> Result<Self> {
        Self::with_base(max_len, dim, DEFAULT_BASE, device)
    }

    pub fn with_base(max_len: usize, dim: usize, base: f64, device: &Device) -> Result<Self> {
        let table = sinusoidal_table(max_len, dim, base, device)?;
        Ok(Self {
            table,
            max_len,
            dim,
            base,
        })
    }

    /// The full `(max_len, dim)` table.
    pub fn table(&self) -> &Tensor {
        &self.table
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn base(&self) -> f64 {
        self.base
    }

    /// Rows `[0, seq_len)` of the table.
    pub fn slice(&self, seq_len: usize) -> Result<Tensor> {
        if seq_len > self.max_len {
            return Err(LayerError::invalid_argument(format!(
                "sequence length {seq_len} exceeds positional table length {}",
                self.max_len
            )));
        }
        Ok(self.table.narrow(0, 0, seq_len)?)
    }

    /// Adds the encoding to embeddings shaped `(batch, seq, dim)` or `(seq, dim)`.
    ///
    /// The sum is taken in `f32` and cast back to the embedding dtype.
    pub fn forward(&self, embeddings: &Tensor) -> Result<Tensor> {
        let dims = embeddings.dims();
        let seq_len = match dims {
            [_, seq, _] | [seq, _] => *seq,
            _ => {
                return Err(LayerError::shape_mismatch(format!(
                    "positional encoding expects (batch, seq, dim) or (seq, dim), got {dims:?}"
                )))
            }
        };
        checks::expect_last_dim("positional.input", embeddings, self.dim)?;
        checks::expect_dtype_in("positional.input", embeddings, &checks::FLOAT_DTYPES)?;
        checks::expect_same_device("positional.input", embeddings, "positional.table", &self.table)?;

        let encoding = self.slice(seq_len)?;
        let summed = embeddings
            .to_dtype(DType::F32)?
            .broadcast_add(&encoding)?;
        Ok(summed.to_dtype(embeddings.dtype())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_shape_and_first_row() -> Result<()> {
        let table = sinusoidal_table(7, 6, DEFAULT_BASE, &Device::Cpu)?;
        assert_eq!(table.dims(), &[7, 6]);
        assert_eq!(table.dtype(), DType::F32);

        let rows = table.to_vec2::<f32>()?;
        assert_eq!(rows[0], vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
        Ok(())
    }

    #[test]
    fn second_position_matches_reference_values() -> Result<()> {
        let table = sinusoidal_table(5, 4, DEFAULT_BASE, &Device::Cpu)?;
        let row = &table.to_vec2::<f32>()?[1];
        let expected = [0.8415f32, 0.5403, 0.0100, 0.9999];
        for (got, want) in row.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-4, "got {row:?}");
        }
        Ok(())
    }

    #[test]
    fn regeneration_is_bit_identical() -> Result<()> {
        let a = sinusoidal_table(32, 16, DEFAULT_BASE, &Device::Cpu)?.to_vec2::<f32>()?;
        let b = sinusoidal_table(32, 16, DEFAULT_BASE, &Device::Cpu)?.to_vec2::<f32>()?;
        let bits = |rows: &Vec<Vec<f32>>| -> Vec<u32> {
            rows.iter().flatten().map(|v| v.to_bits()).collect()
        };
        assert_eq!(bits(&a), bits(&b));
        Ok(())
    }

    #[test]
    fn zero_length_yields_empty_table() -> Result<()> {
        let table = sinusoidal_table(0, 4, DEFAULT_BASE, &Device::Cpu)?;
        assert_eq!(table.dims(), &[0, 4]);
        assert_eq!(table.elem_count(), 0);
        Ok(())
    }

    #[test]
    fn rejects_odd_zero_dims_and_bad_base() {
        let device = Device::Cpu;
        for dim in [0usize, 3, 7] {
            let err = sinusoidal_table(4, dim, DEFAULT_BASE, &device).unwrap_err();
            assert!(matches!(err, LayerError::InvalidArgument { .. }), "dim {dim}");
        }
        for base in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = sinusoidal_table(4, 4, base, &device).unwrap_err();
            assert!(matches!(err, LayerError::InvalidArgument { .. }), "base {base}");
        }
    }
}
