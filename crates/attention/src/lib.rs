//! Scaled dot-product attention and multi-head attention.
//!
//! [`ScaledDotProductAttention`] accepts `Q (..., n, d_k)`, `K (..., n, d_k)`
//! and `V (..., n, d_v)` with any number of matching leading dimensions and
//! returns `(..., n, d_v)`. Inputs may be `f32`, `f16` or `bf16`; scores,
//! softmax and the value reduction run in `f32` and the output is cast back
//! to the input dtype.
//!
//! Masks are additive `f32` tensors: `0.0` keeps a position and
//! `f32::NEG_INFINITY` removes it. The causal mask is selected through
//! [`AttentionConfig::causal`]; padding masks from [`masks`] are passed per
//! call. A row left with no unmasked position is reported as
//! [`LayerError::NumericInstability`] rather than producing `NaN`.
//!
//! [`MultiHeadAttention`] projects its input into `Q`, `K`, `V`, splits the
//! hidden width into heads that become a leading batch dimension, runs the
//! same primitive once over all heads, and merges them back in head order.

pub mod core;
pub mod masks;
pub mod multi_head;
pub mod reference;

pub use crate::core::{Attention, AttentionConfig, AttentionOutput};
pub use layers::{LayerError, Result};
pub use multi_head::{merge_heads, split_heads, MultiHeadAttention, MultiHeadConfig};
pub use reference::{stable_softmax_last_dim, ScaledDotProductAttention};
