//! Building blocks shared by the embedding and attention crates.
//!
//! The crate owns the error taxonomy every component reports through
//! ([`LayerError`]), small validation helpers for shapes and dtypes, the
//! precision policy used to promote reduced-precision parameters for matmuls,
//! and dense linear projections.

pub mod checks;
pub mod errors;
pub mod linear;
pub mod precision;

pub use errors::{LayerError, Result};
pub use linear::{Linear, LinearConfig, LinearInit};
pub use precision::PrecisionPolicy;
