//! Embedding crate
//!
//! `token` maps integer ids to learned vectors; `positional` produces the
//! fixed sinusoidal table added on top of them to encode sequence order.

pub mod positional;
pub mod token;

pub use positional::*;
pub use token::*;
