//! Core traits and types shared across attention implementations.

pub mod config;

use candle_core::Tensor;
use layers::Result;

pub use config::AttentionConfig;

/// Unified interface for attention kernels.
///
/// * `q` is `(..., n, d_k)`, `k` is `(..., n, d_k)`, `v` is `(..., n, d_v)`.
/// * The returned tensor is `(..., n, d_v)` in the dtype of `q`.
/// * `mask`, when present, is additive, ends in `(n, n)` and must broadcast
///   to the score shape `(..., n, n)`.
pub trait Attention: Send + Sync {
    fn attend(&self, q: &Tensor, k: &Tensor, v: &Tensor, mask: Option<&Tensor>) -> Result<Tensor>;
}

/// Attention result together with the normalised weights that produced it.
#[derive(Debug, Clone)]
pub struct AttentionOutput {
    /// `(..., n, d_v)` in the input dtype.
    pub output: Tensor,
    /// `(..., n, n)` row-stochastic weights in `f32`, after dropout if enabled.
    pub weights: Tensor,
}
