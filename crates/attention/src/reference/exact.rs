//! Exact scaled dot-product attention.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use candle_core::{DType, Tensor};
use candle_nn::ops::dropout;
use layers::{checks, LayerError, Result};

use crate::core::{Attention, AttentionConfig, AttentionOutput};
use crate::masks::{causal_mask, MASK_DTYPE};
use crate::reference::softmax::stable_softmax_last_dim;

/// `softmax(Q·Kᵗ / sqrt(d_k) + mask) · V` over any number of leading dims.
///
/// Dropout from the config only applies after [`set_training`](Self::set_training)
/// enables training mode; new instances start in inference mode.
#[derive(Debug)]
pub struct ScaledDotProductAttention {
    config: AttentionConfig,
    training: AtomicBool,
    first_call: OnceLock<()>,
}

/// Dimensions shared by a validated `(q, k, v)` triple.
struct OperandDims {
    lead: Vec<usize>,
    seq_len: usize,
    d_k: usize,
    d_v: usize,
}

impl OperandDims {
    fn batch(&self) -> usize {
        self.lead.iter().product()
    }

    fn with_tail(&self, a: usize, b: usize) -> Vec<usize> {
        let mut dims = self.lead.clone();
        dims.extend([a, b]);
        dims
    }
}

impl ScaledDotProductAttention {
    pub fn new(config: AttentionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid(config))
    }

    /// Attention without masking or dropout.
    pub fn unmasked() -> Self {
        Self::from_valid(AttentionConfig::default())
    }

    /// Attention with the causal mask and no dropout.
    pub fn causal() -> Self {
        Self::from_valid(AttentionConfig::causal())
    }

    fn from_valid(config: AttentionConfig) -> Self {
        Self {
            config,
            training: AtomicBool::new(false),
            first_call: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &AttentionConfig {
        &self.config
    }

    /// Enables or disables dropout on the attention weights.
    pub fn set_training(&self, training: bool) {
        self.training.store(training, Ordering::Relaxed);
    }

    pub fn is_training(&self) -> bool {
        self.training.load(Ordering::Relaxed)
    }

    /// Computes attention and also returns the normalised weights.
    pub fn attend_with_weights(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&Tensor>,
    ) -> Result<AttentionOutput> {
        let dims = validate_operands(q, k, v)?;
        if let Some(mask) = mask {
            validate_mask(mask, q, dims.seq_len)?;
        }

        if self.first_call.set(()).is_ok() {
            log::info!(
                "attention::reference init causal={} dropout={:?} dtype={:?} shape={:?}",
                self.config.causal,
                self.config.dropout_p,
                q.dtype(),
                q.dims()
            );
        }

        // Leading dims collapse into one batch axis for the matmuls.
        let (batch, n) = (dims.batch(), dims.seq_len);
        let q32 = q.to_dtype(DType::F32)?.reshape((batch, n, dims.d_k))?;
        let k_t = k
            .to_dtype(DType::F32)?
            .reshape((batch, n, dims.d_k))?
            .t()?
            .contiguous()?;
        let v32 = v.to_dtype(DType::F32)?.reshape((batch, n, dims.d_v))?;

        let scale = 1.0 / (dims.d_k as f64).sqrt();
        let mut scores = q32.matmul(&k_t)?.affine(scale, 0.0)?;

        if self.config.causal {
            let mask = causal_mask(q.device(), n)?;
            scores = scores.broadcast_add(&mask)?;
        }
        if let Some(mask) = mask {
            let mask = mask
                .to_dtype(MASK_DTYPE)?
                .broadcast_as(dims.with_tail(n, n))?
                .contiguous()?
                .reshape((batch, n, n))?;
            scores = scores.add(&mask)?;
        }

        let mut weights = stable_softmax_last_dim(&scores)?;
        if let Some(p) = self.config.active_dropout() {
            if self.is_training() {
                weights = dropout(&weights, p)?;
            }
        }

        let output = weights
            .matmul(&v32)?
            .reshape(dims.with_tail(n, dims.d_v))?
            .to_dtype(q.dtype())?;
        let weights = weights.reshape(dims.with_tail(n, n))?;
        Ok(AttentionOutput { output, weights })
    }
}

impl Default for ScaledDotProductAttention {
    fn default() -> Self {
        Self::unmasked()
    }
}

impl Attention for ScaledDotProductAttention {
    fn attend(&self, q: &Tensor, k: &Tensor, v: &Tensor, mask: Option<&Tensor>) -> Result<Tensor> {
        Ok(self.attend_with_weights(q, k, v, mask)?.output)
    }
}

fn validate_operands(q: &Tensor, k: &Tensor, v: &Tensor) -> Result<OperandDims> {
    checks::expect_dtype_in("q", q, &checks::FLOAT_DTYPES)?;
    checks::expect_same_dtype("k", k, "q", q)?;
    checks::expect_same_dtype("v", v, "q", q)?;
    checks::expect_same_device("k", k, "q", q)?;
    checks::expect_same_device("v", v, "q", q)?;
    checks::expect_min_rank("q", q, 2)?;

    let rank = q.rank();
    if k.rank() != rank || v.rank() != rank {
        return Err(LayerError::shape_mismatch(format!(
            "q, k, v must share a rank: q {:?}, k {:?}, v {:?}",
            q.dims(),
            k.dims(),
            v.dims()
        )));
    }

    let (q_lead, q_tail) = q.dims().split_at(rank - 2);
    let (k_lead, k_tail) = k.dims().split_at(rank - 2);
    let (v_lead, v_tail) = v.dims().split_at(rank - 2);
    if q_lead != k_lead || q_lead != v_lead {
        return Err(LayerError::shape_mismatch(format!(
            "leading dims differ: q {q_lead:?}, k {k_lead:?}, v {v_lead:?}"
        )));
    }

    let (seq_len, d_k) = (q_tail[0], q_tail[1]);
    if k_tail[1] != d_k {
        return Err(LayerError::shape_mismatch(format!(
            "q has d_k {d_k} but k has {}",
            k_tail[1]
        )));
    }
    if k_tail[0] != seq_len || v_tail[0] != seq_len {
        return Err(LayerError::shape_mismatch(format!(
            "sequence lengths differ: q {seq_len}, k {}, v {}",
            k_tail[0], v_tail[0]
        )));
    }
    if seq_len == 0 || d_k == 0 || v_tail[1] == 0 {
        return Err(LayerError::invalid_argument(format!(
            "attention needs non-empty sequence and feature dims, got q {:?}, v {:?}",
            q.dims(),
            v.dims()
        )));
    }

    Ok(OperandDims {
        lead: q_lead.to_vec(),
        seq_len,
        d_k,
        d_v: v_tail[1],
    })
}

fn validate_mask(mask: &Tensor, q: &Tensor, seq_len: usize) -> Result<()> {
    checks::expect_same_device("mask", mask, "q", q)?;
    checks::expect_min_rank("mask", mask, 2)?;

    let dims = mask.dims();
    let tail = &dims[dims.len() - 2..];
    if tail != [seq_len, seq_len] {
        return Err(LayerError::shape_mismatch(format!(
            "mask must end in ({seq_len}, {seq_len}), got {dims:?}"
        )));
    }

    // Every mask dim must be 1 or match the score dim it lines up with.
    let mut score_dims = q.dims().to_vec();
    if let Some(last) = score_dims.last_mut() {
        *last = seq_len;
    }
    let offset = score_dims.len().checked_sub(dims.len()).ok_or_else(|| {
        LayerError::shape_mismatch(format!(
            "mask {dims:?} has more dims than the scores {score_dims:?}"
        ))
    })?;
    for (i, &dim) in dims.iter().enumerate() {
        let target = score_dims[offset + i];
        if dim != 1 && dim != target {
            return Err(LayerError::shape_mismatch(format!(
                "mask {dims:?} does not broadcast to scores {score_dims:?}"
            )));
        }
    }
    Ok(())
}
