//! File-based configuration for [`AttentionPipeline`](crate::AttentionPipeline).
//!
//! ```toml
//! [model]
//! vocab_size = 32
//! embed_dim = 8
//! hidden_dim = 8
//! n_heads = 2
//! max_seq_len = 16
//! causal = true
//!
//! [positional]
//! base = 10000.0
//! ```
//!
//! Environment overrides (applied by [`BlocksConfig::load`]):
//! - `BLOCKS_CAUSAL` (`1`/`true`/`0`/`false`) overrides `model.causal`.
//! - `BLOCKS_N_HEADS` overrides `model.n_heads`.

use std::{fs, path::Path};

use attention::MultiHeadConfig;
use embedding::positional::DEFAULT_BASE;
use serde::{Deserialize, Serialize};

use crate::error::{BlocksError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlocksConfig {
    pub model: ModelSection,
    #[serde(default)]
    pub positional: PositionalSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSection {
    pub vocab_size: usize,
    /// Width of token embeddings and of the positional table.
    pub embed_dim: usize,
    /// Width of the attention projections and of the pipeline output.
    pub hidden_dim: usize,
    pub n_heads: usize,
    /// Longest sequence the positional table covers.
    pub max_seq_len: usize,
    #[serde(default)]
    pub causal: bool,
    #[serde(default = "default_bias")]
    pub bias: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropout_p: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionalSection {
    #[serde(default = "default_base")]
    pub base: f64,
}

impl Default for PositionalSection {
    fn default() -> Self {
        Self {
            base: default_base(),
        }
    }
}

fn default_bias() -> bool {
    true
}

fn default_base() -> f64 {
    DEFAULT_BASE
}

impl BlocksConfig {
    /// Reads and validates a `.toml` (default) or `.json` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config: BlocksConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("toml") | None => toml::from_str(&contents)?,
            Some(other) => {
                return Err(BlocksError::ConfigFormat(format!(
                    "unsupported configuration extension '{other}'"
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// [`from_path`](Self::from_path) followed by environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_path(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("BLOCKS_CAUSAL") {
            self.model.causal = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" => true,
                "0" | "false" => false,
                other => {
                    return Err(BlocksError::InvalidConfig(format!(
                        "BLOCKS_CAUSAL must be one of 1/true/0/false, got '{other}'"
                    )))
                }
            };
        }
        if let Some(raw) = lookup("BLOCKS_N_HEADS") {
            self.model.n_heads = raw.trim().parse().map_err(|_| {
                BlocksError::InvalidConfig(format!(
                    "BLOCKS_N_HEADS must be a positive integer, got '{raw}'"
                ))
            })?;
        }
        Ok(())
    }

    /// Reports every problem at once instead of stopping at the first.
    pub fn validate(&self) -> Result<()> {
        let model = &self.model;
        let mut errors = Vec::new();

        for (name, value) in [
            ("model.vocab_size", model.vocab_size),
            ("model.embed_dim", model.embed_dim),
            ("model.hidden_dim", model.hidden_dim),
            ("model.n_heads", model.n_heads),
            ("model.max_seq_len", model.max_seq_len),
        ] {
            if value == 0 {
                errors.push(format!("{name} must be greater than 0"));
            }
        }
        if model.embed_dim % 2 != 0 {
            errors.push(format!(
                "model.embed_dim must be even for the sinusoidal table, got {}",
                model.embed_dim
            ));
        }
        if model.n_heads != 0 && model.hidden_dim % model.n_heads != 0 {
            errors.push(format!(
                "model.hidden_dim ({}) must be divisible by model.n_heads ({})",
                model.hidden_dim, model.n_heads
            ));
        }
        if let Some(p) = model.dropout_p {
            if !(0.0..1.0).contains(&p) {
                errors.push(format!("model.dropout_p must be in [0, 1), got {p}"));
            }
        }
        if !self.positional.base.is_finite() || self.positional.base <= 0.0 {
            errors.push(format!(
                "positional.base must be positive, got {}",
                self.positional.base
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(BlocksError::InvalidConfig(errors.join("; ")))
        }
    }

    /// Multi-head settings taking embeddings as input.
    pub fn multi_head_config(&self) -> MultiHeadConfig {
        MultiHeadConfig {
            input_dim: self.model.embed_dim,
            hidden_dim: self.model.hidden_dim,
            n_heads: self.model.n_heads,
            causal: self.model.causal,
            bias: self.model.bias,
            dropout_p: self.model.dropout_p,
        }
    }
}
