//! Token embedding, sinusoidal positional encoding and multi-head attention.
//!
//! The member crates provide the components; this crate wires them into the
//! one-way pipeline `token ids → embeddings + positional encoding → attention`
//! ([`AttentionPipeline`]), loads its configuration from TOML or JSON
//! ([`BlocksConfig`]) and picks a compute device.

pub mod config;
pub mod error;
pub mod pipeline;

pub use attention;
pub use embedding;
pub use layers;

pub use config::{BlocksConfig, ModelSection, PositionalSection};
pub use error::{BlocksError, Result};
pub use pipeline::AttentionPipeline;

use candle_core::Device;

/// Selects the compute device.
///
/// `CANDLE_FORCE_CPU` forces the CPU backend. Otherwise Metal (with the
/// `metal` feature) or CUDA is used when available, falling back to CPU.
pub fn setup_device() -> Result<Device> {
    if std::env::var("CANDLE_FORCE_CPU").is_ok() {
        log::info!("CANDLE_FORCE_CPU set, using CPU backend");
        return Ok(Device::Cpu);
    }

    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) if metal_preflight(&device).is_ok() => {
                log::info!("Metal device selected: {device:?}");
                return Ok(device);
            }
            Ok(_) => log::info!("Metal device detected but preflight failed, falling back"),
            Err(err) => log::info!("Metal unavailable ({err}), falling back"),
        }
    }

    match Device::cuda_if_available(0) {
        Ok(device) if device.is_cuda() => {
            log::info!("CUDA device selected: {device:?}");
            Ok(device)
        }
        Ok(_) | Err(_) => {
            log::info!("using CPU backend");
            Ok(Device::Cpu)
        }
    }
}

#[cfg(feature = "metal")]
fn metal_preflight(device: &Device) -> Result<()> {
    use attention::{Attention, ScaledDotProductAttention};
    use candle_core::{DType, Tensor};

    let x = Tensor::ones((1, 2, 4, 8), DType::F32, device)?;
    ScaledDotProductAttention::causal().attend(&x, &x, &x, None)?;
    Ok(())
}
