//! Properties every attention result must satisfy.

use attention::masks::padding_mask_from_lengths;
use attention::{Attention, LayerError, Result, ScaledDotProductAttention};
use candle_core::{DType, Device, Tensor};

/// Deterministic pseudo-random values in `[-1, 1]`.
fn fixture(shape: &[usize], seed: f32, device: &Device) -> Result<Tensor> {
    let count: usize = shape.iter().product();
    let data: Vec<f32> = (0..count)
        .map(|i| ((i as f32 + 1.0) * 0.731 + seed).sin())
        .collect();
    Ok(Tensor::from_vec(data, shape, device)?)
}

/// Textbook attention over `(batch, n, d)` operands, one row at a time.
fn naive_attention(q: &Tensor, k: &Tensor, v: &Tensor, causal: bool) -> Result<Tensor> {
    let (batch, n, d_k) = q.dims3()?;
    let (_, _, d_v) = v.dims3()?;
    let q = q.to_vec3::<f32>()?;
    let k = k.to_vec3::<f32>()?;
    let v = v.to_vec3::<f32>()?;
    let scale = 1.0 / (d_k as f32).sqrt();

    let mut output = Vec::with_capacity(batch * n * d_v);
    for b in 0..batch {
        for i in 0..n {
            let visible = if causal { i + 1 } else { n };
            let scores: Vec<f32> = (0..visible)
                .map(|j| (0..d_k).map(|d| q[b][i][d] * k[b][j][d]).sum::<f32>() * scale)
                .collect();
            let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
            let denom: f32 = exps.iter().sum();
            for d in 0..d_v {
                let acc: f32 = (0..visible).map(|j| exps[j] / denom * v[b][j][d]).sum();
                output.push(acc);
            }
        }
    }
    Ok(Tensor::from_vec(output, (batch, n, d_v), &Device::Cpu)?)
}

fn max_abs_diff(a: &Tensor, b: &Tensor) -> Result<f32> {
    Ok(a.sub(b)?.abs()?.flatten_all()?.max(0)?.to_scalar::<f32>()?)
}

#[test]
fn matches_naive_reference() -> Result<()> {
    let device = Device::Cpu;
    let q = fixture(&[2, 6, 4], 0.1, &device)?;
    let k = fixture(&[2, 6, 4], 0.7, &device)?;
    let v = fixture(&[2, 6, 3], 1.3, &device)?;

    for (attention, causal) in [
        (ScaledDotProductAttention::unmasked(), false),
        (ScaledDotProductAttention::causal(), true),
    ] {
        let out = attention.attend(&q, &k, &v, None)?;
        let expected = naive_attention(&q, &k, &v, causal)?;
        assert!(max_abs_diff(&out, &expected)? < 1e-5, "causal={causal}");
    }
    Ok(())
}

#[test]
fn weight_rows_sum_to_one() -> Result<()> {
    let device = Device::Cpu;
    let q = fixture(&[2, 3, 7, 8], 0.2, &device)?.affine(4.0, 0.0)?;
    let k = fixture(&[2, 3, 7, 8], 0.9, &device)?.affine(4.0, 0.0)?;
    let v = fixture(&[2, 3, 7, 5], 1.7, &device)?;

    for attention in [ScaledDotProductAttention::unmasked(), ScaledDotProductAttention::causal()] {
        let weights = attention.attend_with_weights(&q, &k, &v, None)?.weights;
        assert_eq!(weights.dims(), &[2, 3, 7, 7]);
        let sums = weights.sum(3)?.flatten_all()?.to_vec1::<f32>()?;
        assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-5), "{sums:?}");
    }
    Ok(())
}

#[test]
fn causal_weights_above_diagonal_are_exactly_zero() -> Result<()> {
    let device = Device::Cpu;
    let q = fixture(&[3, 9, 4], 0.4, &device)?;
    let k = fixture(&[3, 9, 4], 2.1, &device)?;
    let v = fixture(&[3, 9, 4], 3.3, &device)?;

    let weights = ScaledDotProductAttention::causal()
        .attend_with_weights(&q, &k, &v, None)?
        .weights
        .to_vec3::<f32>()?;
    for matrix in &weights {
        for (i, row) in matrix.iter().enumerate() {
            for (j, &w) in row.iter().enumerate() {
                if j > i {
                    assert_eq!(w, 0.0, "weight ({i}, {j})");
                } else {
                    assert!(w > 0.0, "weight ({i}, {j})");
                }
            }
        }
    }
    Ok(())
}

#[test]
fn output_shape_follows_value_width() -> Result<()> {
    let device = Device::Cpu;
    let attention = ScaledDotProductAttention::unmasked();
    for (lead, n, d_k, d_v) in [
        (vec![], 5usize, 4usize, 3usize),
        (vec![2], 3, 8, 2),
        (vec![2, 4], 6, 2, 7),
        (vec![1, 2, 3], 4, 4, 4),
    ] {
        let shape = |last: usize| -> Vec<usize> {
            let mut dims = lead.clone();
            dims.extend([n, last]);
            dims
        };
        let q = fixture(&shape(d_k), 0.0, &device)?;
        let k = fixture(&shape(d_k), 0.5, &device)?;
        let v = fixture(&shape(d_v), 1.0, &device)?;
        let out = attention.attend(&q, &k, &v, None)?;
        assert_eq!(out.dims(), shape(d_v).as_slice());
    }
    Ok(())
}

#[test]
fn masked_unbatched_scenario() -> Result<()> {
    let device = Device::Cpu;
    let q = fixture(&[5, 4], 0.3, &device)?;
    let k = fixture(&[5, 4], 0.6, &device)?;
    let v = fixture(&[5, 3], 0.9, &device)?;

    let result = ScaledDotProductAttention::causal().attend_with_weights(&q, &k, &v, None)?;
    assert_eq!(result.output.dims(), &[5, 3]);

    let weights = result.weights.to_vec2::<f32>()?;
    assert_eq!(weights[0], vec![1.0, 0.0, 0.0, 0.0, 0.0]);

    // Position 0 can only see itself, so its output is value row 0.
    let out = result.output.to_vec2::<f32>()?;
    let v0 = v.to_vec2::<f32>()?[0].clone();
    for (got, want) in out[0].iter().zip(v0.iter()) {
        assert!((got - want).abs() < 1e-6);
    }
    Ok(())
}

#[test]
fn padding_mask_zeroes_padded_keys() -> Result<()> {
    let device = Device::Cpu;
    let q = fixture(&[2, 2, 4, 4], 0.2, &device)?;
    let k = fixture(&[2, 2, 4, 4], 0.8, &device)?;
    let v = fixture(&[2, 2, 4, 4], 1.4, &device)?;
    let mask = padding_mask_from_lengths(&device, &[2, 4], 4)?;

    let weights = ScaledDotProductAttention::unmasked()
        .attend_with_weights(&q, &k, &v, Some(&mask))?
        .weights
        .to_dtype(DType::F32)?;
    let first = weights.narrow(0, 0, 1)?.flatten_all()?.to_vec1::<f32>()?;
    for (idx, w) in first.iter().enumerate() {
        if idx % 4 >= 2 {
            assert_eq!(*w, 0.0, "padded key at flat index {idx}");
        }
    }
    let second = weights.narrow(0, 1, 1)?.flatten_all()?.to_vec1::<f32>()?;
    assert!(second.iter().all(|w| *w > 0.0));
    Ok(())
}

#[test]
fn fully_masked_rows_fail_instead_of_producing_nan() -> Result<()> {
    let device = Device::Cpu;
    let q = fixture(&[1, 1, 3, 4], 0.2, &device)?;
    let mask = padding_mask_from_lengths(&device, &[0], 3)?;

    let err = ScaledDotProductAttention::unmasked()
        .attend(&q, &q, &q, Some(&mask))
        .unwrap_err();
    assert!(matches!(err, LayerError::NumericInstability { .. }));
    Ok(())
}
