//! Configuration fixed when an attention layer is constructed.

use layers::{LayerError, Result};

/// Configuration driving attention behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct AttentionConfig {
    /// Forbid position `i` from attending to any `j > i`.
    pub causal: bool,
    /// Dropout applied to attention weights during training.
    ///
    /// When `None` (or zero) the computation is deterministic.
    pub dropout_p: Option<f32>,
}

impl Default for AttentionConfig {
    fn default() -> Self {
        Self {
            causal: false,
            dropout_p: None,
        }
    }
}

impl AttentionConfig {
    pub fn causal() -> Self {
        Self {
            causal: true,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.dropout_p {
            Some(p) if !(0.0..1.0).contains(&p) => Err(LayerError::invalid_argument(format!(
                "dropout probability must be in [0, 1), got {p}"
            ))),
            _ => Ok(()),
        }
    }

    /// Dropout probability when it actually changes the output.
    pub(crate) fn active_dropout(&self) -> Option<f32> {
        self.dropout_p.filter(|p| *p > 0.0)
    }
}
