//! Fixed (non-learned) positional encodings.

pub mod sinusoidal;

pub use sinusoidal::{sinusoidal_table, SinusoidalEncoding, DEFAULT_BASE};
