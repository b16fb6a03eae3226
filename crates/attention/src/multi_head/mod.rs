//! Multi-head self-attention.
//!
//! One fused projection produces `[Q | K | V]`, each `hidden_dim` wide. The
//! three are split into heads, attended as a single batched call to
//! [`ScaledDotProductAttention`] with `(batch, heads)` as leading dims, merged
//! back in head order and mixed by an output projection. With `n_heads == 1`
//! this is plain single-head attention.

pub mod heads;

use candle_core::{DType, Device, Tensor};
use layers::{checks, LayerError, Linear, LinearConfig, LinearInit, Result};

pub use heads::{merge_heads, split_heads};

use crate::core::{AttentionConfig, AttentionOutput};
use crate::reference::ScaledDotProductAttention;

/// Construction-time configuration for [`MultiHeadAttention`].
#[derive(Debug, Clone, PartialEq)]
pub struct MultiHeadConfig {
    /// Width of the incoming representation.
    pub input_dim: usize,
    /// Width of `Q`, `K`, `V` and of the output.
    pub hidden_dim: usize,
    pub n_heads: usize,
    pub causal: bool,
    /// Whether both projections carry a bias.
    pub bias: bool,
    pub dropout_p: Option<f32>,
}

impl MultiHeadConfig {
    pub fn new(input_dim: usize, hidden_dim: usize, n_heads: usize) -> Self {
        Self {
            input_dim,
            hidden_dim,
            n_heads,
            causal: false,
            bias: true,
            dropout_p: None,
        }
    }

    pub fn head_dim(&self) -> usize {
        self.hidden_dim / self.n_heads.max(1)
    }

    pub fn attention_config(&self) -> AttentionConfig {
        AttentionConfig {
            causal: self.causal,
            dropout_p: self.dropout_p,
        }
    }

    pub fn validate(&self) -> Result<()> {
        checks::expect_positive("multi_head.input_dim", self.input_dim)?;
        checks::expect_positive("multi_head.hidden_dim", self.hidden_dim)?;
        checks::expect_positive("multi_head.n_heads", self.n_heads)?;
        if self.hidden_dim % self.n_heads != 0 {
            return Err(LayerError::invalid_argument(format!(
                "hidden_dim ({}) must be divisible by n_heads ({})",
                self.hidden_dim, self.n_heads
            )));
        }
        self.attention_config().validate()
    }
}

/// Multi-head attention with learned input and output projections.
#[derive(Debug)]
pub struct MultiHeadAttention {
    config: MultiHeadConfig,
    qkv_proj: Linear,
    out_proj: Linear,
    attention: ScaledDotProductAttention,
}

impl MultiHeadAttention {
    /// Builds the layer with Xavier-uniform projections and zero biases.
    pub fn new(config: MultiHeadConfig, device: &Device, dtype: DType) -> Result<Self> {
        config.validate()?;
        let mut qkv_config = LinearConfig::fused(config.input_dim, config.hidden_dim, 3);
        qkv_config.bias = config.bias;
        let mut out_config = LinearConfig::new(config.hidden_dim, config.hidden_dim);
        out_config.bias = config.bias;

        let qkv_proj = Linear::with_init(qkv_config, LinearInit::XavierUniform, device, dtype)?;
        let out_proj = Linear::with_init(out_config, LinearInit::XavierUniform, device, dtype)?;
        Self::from_projections(config, qkv_proj, out_proj)
    }

    /// Builds the layer from existing projections.
    ///
    /// `qkv_proj` must map `input_dim → 3 * hidden_dim` with outputs packed as
    /// `[Q | K | V]`; `out_proj` must map `hidden_dim → hidden_dim`.
    pub fn from_projections(
        config: MultiHeadConfig,
        qkv_proj: Linear,
        out_proj: Linear,
    ) -> Result<Self> {
        config.validate()?;
        let qkv = qkv_proj.config();
        if qkv.input_dim != config.input_dim || qkv.total_output_dim() != 3 * config.hidden_dim {
            return Err(LayerError::invalid_argument(format!(
                "qkv projection must map {} -> {}, got {} -> {}",
                config.input_dim,
                3 * config.hidden_dim,
                qkv.input_dim,
                qkv.total_output_dim()
            )));
        }
        let out = out_proj.config();
        if out.input_dim != config.hidden_dim || out.total_output_dim() != config.hidden_dim {
            return Err(LayerError::invalid_argument(format!(
                "output projection must map {0} -> {0}, got {1} -> {2}",
                config.hidden_dim,
                out.input_dim,
                out.total_output_dim()
            )));
        }

        let attention = ScaledDotProductAttention::new(config.attention_config())?;
        Ok(Self {
            config,
            qkv_proj,
            out_proj,
            attention,
        })
    }

    pub fn config(&self) -> &MultiHeadConfig {
        &self.config
    }

    pub fn qkv_proj(&self) -> &Linear {
        &self.qkv_proj
    }

    pub fn out_proj(&self) -> &Linear {
        &self.out_proj
    }

    /// Switches attention dropout on or off. Layers start in inference mode.
    pub fn set_training(&self, training: bool) {
        self.attention.set_training(training);
    }

    pub fn is_training(&self) -> bool {
        self.attention.is_training()
    }

    /// `(batch, seq, input_dim)` → `(batch, seq, hidden_dim)`.
    ///
    /// `mask` is an optional additive mask broadcastable to
    /// `(batch, n_heads, seq, seq)`, e.g. from
    /// [`padding_mask_from_lengths`](crate::masks::padding_mask_from_lengths).
    pub fn forward(&self, x: &Tensor, mask: Option<&Tensor>) -> Result<Tensor> {
        Ok(self.forward_with_weights(x, mask)?.output)
    }

    /// Like [`forward`](Self::forward), also returning the
    /// `(batch, n_heads, seq, seq)` attention weights.
    pub fn forward_with_weights(&self, x: &Tensor, mask: Option<&Tensor>) -> Result<AttentionOutput> {
        checks::expect_rank("multi_head.input", x, 3)?;
        checks::expect_last_dim("multi_head.input", x, self.config.input_dim)?;

        let hidden = self.config.hidden_dim;
        let heads = self.config.n_heads;
        let packed = self.qkv_proj.forward(x)?;
        let q = split_heads(&packed.narrow(2, 0, hidden)?, heads)?;
        let k = split_heads(&packed.narrow(2, hidden, hidden)?, heads)?;
        let v = split_heads(&packed.narrow(2, 2 * hidden, hidden)?, heads)?;

        let attended = self.attention.attend_with_weights(&q, &k, &v, mask)?;
        let merged = merge_heads(&attended.output)?;
        Ok(AttentionOutput {
            output: self.out_proj.forward(&merged)?,
            weights: attended.weights,
        })
    }
}
