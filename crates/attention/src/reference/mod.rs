//! Reference attention path.
//!
//! The exact path prioritises numerical fidelity: all reductions run in `f32`
//! and the softmax subtracts the row maximum before exponentiating.

pub mod exact;
pub mod softmax;

pub use exact::ScaledDotProductAttention;
pub use softmax::stable_softmax_last_dim;
