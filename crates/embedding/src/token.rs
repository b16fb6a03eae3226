//! Token embedding lookup table.

use candle_core::{DType, Device, Tensor, Var};
use layers::{checks, LayerError, Result};

/// Configuration for building a token embedding table.
#[derive(Debug, Clone)]
pub struct TokenEmbeddingConfig {
    /// Number of distinct token ids.
    pub vocab_size: usize,
    /// Width of each embedding vector.
    pub embed_dim: usize,
    /// Storage dtype of the table and of lookup outputs.
    pub dtype: DType,
    /// Device hosting the table.
    pub device: Device,
}

impl TokenEmbeddingConfig {
    pub fn validate(&self) -> Result<()> {
        checks::expect_positive("embedding.vocab_size", self.vocab_size)?;
        checks::expect_positive("embedding.embed_dim", self.embed_dim)?;
        if !checks::FLOAT_DTYPES.contains(&self.dtype) {
            return Err(LayerError::UnsupportedDType {
                requested: format!("{:?} for embedding table", self.dtype),
            });
        }
        Ok(())
    }
}

/// Learned `(vocab_size, embed_dim)` lookup table.
///
/// The forward path never mutates the table; updates belong to whatever
/// trainer holds the [`Var`] returned by [`TokenEmbedding::named_parameters`].
#[derive(Debug, Clone)]
pub struct TokenEmbedding {
    config: TokenEmbeddingConfig,
    weight: Var,
}

impl TokenEmbedding {
    /// Builds a table with entries sampled from `N(0, 1)`.
    pub fn new(config: TokenEmbeddingConfig) -> Result<Self> {
        config.validate()?;
        let shape = (config.vocab_size, config.embed_dim);
        let initial = Var::randn(0f32, 1f32, shape, &config.device)?;
        let weight = if config.dtype == DType::F32 {
            initial
        } else {
            Var::from_tensor(&initial.to_dtype(config.dtype)?)?
        };
        Ok(Self { config, weight })
    }

    /// Wraps an existing `(vocab_size, embed_dim)` table.
    pub fn from_weight(weight: Tensor) -> Result<Self> {
        checks::expect_rank("embedding.weight", &weight, 2)?;
        let (vocab_size, embed_dim) = weight.dims2()?;
        let config = TokenEmbeddingConfig {
            vocab_size,
            embed_dim,
            dtype: weight.dtype(),
            device: weight.device().clone(),
        };
        config.validate()?;
        Ok(Self {
            config,
            weight: Var::from_tensor(&weight)?,
        })
    }

    pub fn config(&self) -> &TokenEmbeddingConfig {
        &self.config
    }

    pub fn weight(&self) -> &Tensor {
        self.weight.as_tensor()
    }

    /// Trainable parameters under an optional scope prefix.
    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let prefix = if scope.is_empty() { "embedding" } else { scope };
        vec![(format!("{prefix}.weight"), self.weight.clone())]
    }

    /// Looks up embeddings for `(batch, seq)` integer ids.
    ///
    /// Returns `(batch, seq, embed_dim)` in the table dtype. Ids outside
    /// `[0, vocab_size)` are rejected before the gather.
    pub fn forward(&self, token_ids: &Tensor) -> Result<Tensor> {
        let (batch, seq) = match token_ids.dims() {
            [batch, seq] => (*batch, *seq),
            dims => {
                return Err(LayerError::shape_mismatch(format!(
                    "token_ids must be shaped (batch, seq), got {dims:?}"
                )))
            }
        };
        if batch == 0 || seq == 0 {
            return Err(LayerError::invalid_argument(
                "token_ids must have non-zero batch and seq dimensions",
            ));
        }
        if !token_ids.dtype().is_int() {
            return Err(LayerError::UnsupportedDType {
                requested: format!("{:?} for token_ids (expected an integer dtype)", token_ids.dtype()),
            });
        }
        checks::expect_same_device("token_ids", token_ids, "embedding.weight", self.weight())?;

        let flat = token_ids.to_dtype(DType::I64)?.flatten_all()?;
        self.ensure_id_range(&flat)?;

        let gathered = self.weight().index_select(&flat, 0)?;
        Ok(gathered.reshape((batch, seq, self.config.embed_dim))?)
    }

    fn ensure_id_range(&self, flat_ids: &Tensor) -> Result<()> {
        let min_id = flat_ids.min(0)?.to_scalar::<i64>()?;
        if min_id < 0 {
            return Err(LayerError::invalid_argument(format!(
                "encountered negative token id {min_id}"
            )));
        }
        let max_id = flat_ids.max(0)?.to_scalar::<i64>()?;
        let vocab = self.config.vocab_size as i64;
        if max_id >= vocab {
            return Err(LayerError::invalid_argument(format!(
                "token id {max_id} exceeds vocab size {vocab}"
            )));
        }
        Ok(())
    }
}
