use attention::{AttentionOutput, MultiHeadAttention};
use candle_core::{DType, Device, Tensor};
use embedding::{SinusoidalEncoding, TokenEmbedding, TokenEmbeddingConfig};
use layers::{checks, LayerError};

use crate::config::BlocksConfig;
use crate::error::Result;

/// `token ids → embedding + positional encoding → multi-head attention`.
#[derive(Debug)]
pub struct AttentionPipeline {
    embedding: TokenEmbedding,
    positional: SinusoidalEncoding,
    attention: MultiHeadAttention,
}

impl AttentionPipeline {
    /// Builds every component from `config`.
    ///
    /// Each component validates its own settings, so a bad value (for example
    /// `hidden_dim` not divisible by `n_heads`) surfaces as
    /// [`LayerError::InvalidArgument`] wrapped in [`BlocksError::Layer`].
    /// [`BlocksConfig::validate`] reports all problems at once instead.
    ///
    /// [`BlocksError::Layer`]: crate::BlocksError::Layer
    pub fn new(config: &BlocksConfig, device: &Device, dtype: DType) -> Result<Self> {
        let model = &config.model;
        checks::expect_positive("model.max_seq_len", model.max_seq_len)?;
        log::debug!(
            "building attention pipeline: vocab={} embed={} hidden={} heads={} max_seq_len={} causal={}",
            model.vocab_size,
            model.embed_dim,
            model.hidden_dim,
            model.n_heads,
            model.max_seq_len,
            model.causal
        );

        let embedding = TokenEmbedding::new(TokenEmbeddingConfig {
            vocab_size: model.vocab_size,
            embed_dim: model.embed_dim,
            dtype,
            device: device.clone(),
        })?;
        let positional = SinusoidalEncoding::with_base(
            model.max_seq_len,
            model.embed_dim,
            config.positional.base,
            device,
        )?;
        let attention = MultiHeadAttention::new(config.multi_head_config(), device, dtype)?;
        Self::from_parts(embedding, positional, attention)
    }

    /// Assembles a pipeline from pre-built components whose widths must agree.
    pub fn from_parts(
        embedding: TokenEmbedding,
        positional: SinusoidalEncoding,
        attention: MultiHeadAttention,
    ) -> Result<Self> {
        let embed_dim = embedding.config().embed_dim;
        if positional.dim() != embed_dim {
            return Err(LayerError::shape_mismatch(format!(
                "positional width {} does not match embedding width {embed_dim}",
                positional.dim()
            ))
            .into());
        }
        if attention.config().input_dim != embed_dim {
            return Err(LayerError::shape_mismatch(format!(
                "attention input width {} does not match embedding width {embed_dim}",
                attention.config().input_dim
            ))
            .into());
        }
        Ok(Self {
            embedding,
            positional,
            attention,
        })
    }

    pub fn embedding(&self) -> &TokenEmbedding {
        &self.embedding
    }

    pub fn positional(&self) -> &SinusoidalEncoding {
        &self.positional
    }

    pub fn attention(&self) -> &MultiHeadAttention {
        &self.attention
    }

    /// Toggles attention dropout; pipelines start in inference mode.
    pub fn set_training(&self, training: bool) {
        self.attention.set_training(training);
    }

    /// `(batch, seq)` ids → `(batch, seq, embed_dim)` position-aware embeddings.
    pub fn embed(&self, token_ids: &Tensor) -> Result<Tensor> {
        let embedded = self.embedding.forward(token_ids)?;
        Ok(self.positional.forward(&embedded)?)
    }

    /// `(batch, seq)` ids → `(batch, seq, hidden_dim)`.
    pub fn forward(&self, token_ids: &Tensor, mask: Option<&Tensor>) -> Result<Tensor> {
        Ok(self.forward_with_weights(token_ids, mask)?.output)
    }

    pub fn forward_with_weights(
        &self,
        token_ids: &Tensor,
        mask: Option<&Tensor>,
    ) -> Result<AttentionOutput> {
        let x = self.embed(token_ids)?;
        Ok(self.attention.forward_with_weights(&x, mask)?)
    }
}
