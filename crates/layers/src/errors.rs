//! Error types emitted by every building block in the workspace.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LayerError>;

/// Failure categories for configuration and forward passes.
#[derive(Debug, Error)]
pub enum LayerError {
    /// Malformed configuration or argument, rejected before any computation.
    #[error("invalid argument: {context}")]
    InvalidArgument { context: String },

    /// Operands whose dimensions cannot be combined.
    #[error("shape mismatch: {context}")]
    ShapeMismatch { context: String },

    /// A normalisation step produced no finite probability mass.
    #[error("numeric instability: {context}")]
    NumericInstability { context: String },

    /// The computation does not support the requested dtype.
    #[error("unsupported dtype {requested}")]
    UnsupportedDType { requested: String },

    /// A failure propagated from the tensor backend.
    #[error("backend error: {0}")]
    Backend(#[from] candle_core::Error),
}

impl LayerError {
    pub fn invalid_argument(context: impl Into<String>) -> Self {
        Self::InvalidArgument {
            context: context.into(),
        }
    }

    pub fn shape_mismatch(context: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
        }
    }

    pub fn numeric_instability(context: impl Into<String>) -> Self {
        Self::NumericInstability {
            context: context.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = LayerError::invalid_argument("dim must be even, got 3");
        assert_eq!(err.to_string(), "invalid argument: dim must be even, got 3");

        let err = LayerError::shape_mismatch("k has d_k 8, q has 4");
        assert!(err.to_string().starts_with("shape mismatch"));
    }

    #[test]
    fn candle_errors_convert_into_backend() {
        let err: LayerError = candle_core::Error::Msg("boom".into()).into();
        assert!(matches!(err, LayerError::Backend(_)));
    }
}
