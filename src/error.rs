use layers::LayerError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BlocksError>;

#[derive(Debug, Error)]
pub enum BlocksError {
    #[error(transparent)]
    Layer(#[from] LayerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported configuration format: {0}")]
    ConfigFormat(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<candle_core::Error> for BlocksError {
    fn from(value: candle_core::Error) -> Self {
        Self::Layer(LayerError::Backend(value))
    }
}
