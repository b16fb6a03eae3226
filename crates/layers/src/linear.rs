//! Dense affine projections.
//!
//! Inputs are shaped `(..., input_dim)` and outputs `(..., total_output_dim)`.
//! Fused variants pack several projections side by side along the feature
//! axis (`fused_projections * output_dim` features) so callers can `narrow`
//! them apart, which is how multi-head attention derives `Q`, `K` and `V`
//! from a single matmul. Matmuls run in the compute dtype of the
//! [`PrecisionPolicy`] derived from the weight dtype; outputs are cast back
//! to the weight dtype.

use candle_core::{DType, Device, Tensor};

use crate::checks::{self, FLOAT_DTYPES};
use crate::errors::{LayerError, Result};
use crate::precision::PrecisionPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearConfig {
    /// Incoming feature dimension.
    pub input_dim: usize,
    /// Output feature dimension per projection shard.
    pub output_dim: usize,
    /// Whether a learnable bias vector is applied.
    pub bias: bool,
    /// Number of projections fused together (1 for a standard linear).
    pub fused_projections: usize,
}

impl LinearConfig {
    pub fn new(input_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim,
            bias: true,
            fused_projections: 1,
        }
    }

    /// Configuration producing `count` projections of width `output_dim` in one matmul.
    pub fn fused(input_dim: usize, output_dim: usize, count: usize) -> Self {
        Self {
            fused_projections: count,
            ..Self::new(input_dim, output_dim)
        }
    }

    pub fn total_output_dim(&self) -> usize {
        self.output_dim * self.fused_projections
    }

    pub fn validate(&self) -> Result<()> {
        checks::expect_positive("linear.input_dim", self.input_dim)?;
        checks::expect_positive("linear.output_dim", self.output_dim)?;
        checks::expect_positive("linear.fused_projections", self.fused_projections)
    }
}

/// Weight initialisation policies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinearInit {
    /// Xavier/Glorot uniform initialisation.
    XavierUniform,
    /// Xavier/Glorot normal initialisation.
    XavierNormal,
}

impl LinearInit {
    fn sample(&self, shape: (usize, usize), device: &Device, dtype: DType) -> Result<Tensor> {
        let (out_dim, in_dim) = shape;
        let fan_sum = (in_dim + out_dim) as f64;
        let weight = match self {
            LinearInit::XavierUniform => {
                let bound = (6.0 / fan_sum).sqrt() as f32;
                Tensor::rand(-bound, bound, shape, device)?
            }
            LinearInit::XavierNormal => {
                let std = (2.0 / fan_sum).sqrt() as f32;
                Tensor::randn(0f32, std, shape, device)?
            }
        };
        Ok(weight.to_dtype(dtype)?)
    }
}

/// Dense affine projection `y = x · Wᵗ + b` with `W` shaped `(out, in)`.
#[derive(Debug, Clone)]
pub struct Linear {
    config: LinearConfig,
    weight: Tensor,
    bias: Option<Tensor>,
    policy: PrecisionPolicy,
}

impl Linear {
    /// Constructs a linear layer from pre-existing parameters.
    pub fn new(config: LinearConfig, weight: Tensor, bias: Option<Tensor>) -> Result<Self> {
        config.validate()?;
        checks::expect_shape(
            "linear.weight",
            &weight,
            &[config.total_output_dim(), config.input_dim],
        )?;
        checks::expect_dtype_in("linear.weight", &weight, &FLOAT_DTYPES)?;

        match (config.bias, bias.as_ref()) {
            (true, Some(b)) => {
                checks::expect_shape("linear.bias", b, &[config.total_output_dim()])?;
                checks::expect_same_dtype("linear.bias", b, "linear.weight", &weight)?;
                checks::expect_same_device("linear.bias", b, "linear.weight", &weight)?;
            }
            (true, None) => {
                return Err(LayerError::invalid_argument(
                    "config expects a bias but none was supplied",
                ))
            }
            (false, Some(_)) => {
                return Err(LayerError::invalid_argument(
                    "bias supplied but config disables bias",
                ))
            }
            (false, None) => {}
        }

        let policy = PrecisionPolicy::from_storage(weight.dtype());
        Ok(Self {
            config,
            weight,
            bias,
            policy,
        })
    }

    /// Builds a layer with weights sampled from `init` and a zero bias.
    pub fn with_init(
        config: LinearConfig,
        init: LinearInit,
        device: &Device,
        dtype: DType,
    ) -> Result<Self> {
        config.validate()?;
        let weight = init.sample((config.total_output_dim(), config.input_dim), device, dtype)?;
        let bias = if config.bias {
            Some(Tensor::zeros(config.total_output_dim(), dtype, device)?)
        } else {
            None
        };
        Self::new(config, weight, bias)
    }

    pub fn config(&self) -> &LinearConfig {
        &self.config
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }

    /// Applies the projection over the trailing axis of `hidden`.
    pub fn forward(&self, hidden: &Tensor) -> Result<Tensor> {
        checks::expect_min_rank("linear.input", hidden, 1)?;
        checks::expect_last_dim("linear.input", hidden, self.config.input_dim)?;
        checks::expect_same_device("linear.input", hidden, "linear.weight", &self.weight)?;

        let dims = hidden.dims();
        let rows: usize = dims[..dims.len() - 1].iter().product();
        let out_dim = self.config.total_output_dim();

        let input = self.policy.to_compute(hidden)?;
        let weight = self.policy.to_compute(&self.weight)?;
        let flat = input.reshape((rows, self.config.input_dim))?;
        let mut output = flat.matmul(&weight.t()?)?;
        if let Some(bias) = &self.bias {
            output = output.broadcast_add(&self.policy.to_compute(bias)?)?;
        }

        let mut out_dims = dims.to_vec();
        if let Some(last) = out_dims.last_mut() {
            *last = out_dim;
        }
        let output = output.reshape(out_dims)?;
        self.policy.to_storage(&output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max_abs_diff(a: &Tensor, b: &Tensor) -> Result<f32> {
        let diff = a
            .to_dtype(DType::F32)?
            .sub(&b.to_dtype(DType::F32)?)?
            .abs()?
            .flatten_all()?
            .max(0)?;
        Ok(diff.to_scalar::<f32>()?)
    }

    #[test]
    fn forward_matches_manual_affine() -> Result<()> {
        let device = Device::Cpu;
        let config = LinearConfig::new(3, 2);
        let weight = Tensor::new(&[[1f32, 0., 2.], [0., -1., 1.]], &device)?;
        let bias = Tensor::new(&[0.5f32, -0.5], &device)?;
        let linear = Linear::new(config, weight, Some(bias))?;

        let input = Tensor::new(&[[[1f32, 2., 3.], [0., 1., 0.]]], &device)?;
        let output = linear.forward(&input)?;
        assert_eq!(output.dims(), &[1, 2, 2]);

        let expected = Tensor::new(&[[[7.5f32, 0.5], [0.5, -1.5]]], &device)?;
        assert!(max_abs_diff(&output, &expected)? < 1e-6);
        Ok(())
    }

    #[test]
    fn fused_output_packs_projections() -> Result<()> {
        let device = Device::Cpu;
        let mut config = LinearConfig::fused(4, 4, 3);
        config.bias = false;
        let linear = Linear::with_init(config, LinearInit::XavierUniform, &device, DType::F32)?;
        let input = Tensor::ones((2, 5, 4), DType::F32, &device)?;
        assert_eq!(linear.forward(&input)?.dims(), &[2, 5, 12]);
        Ok(())
    }

    #[test]
    fn reduced_precision_output_matches_f32_reference() -> Result<()> {
        let device = Device::Cpu;
        let config = LinearConfig::new(8, 4);
        let reference =
            Linear::with_init(config.clone(), LinearInit::XavierNormal, &device, DType::F32)?;
        let input = Tensor::arange(0f32, 16., &device)?.reshape((2, 8))?.affine(0.1, 0.)?;
        let expected = reference.forward(&input)?;

        for dtype in [DType::F16, DType::BF16] {
            let cast = Linear::new(
                config.clone(),
                reference.weight().to_dtype(dtype)?,
                reference.bias().map(|b| b.to_dtype(dtype)).transpose()?,
            )?;
            let output = cast.forward(&input.to_dtype(dtype)?)?;
            assert_eq!(output.dtype(), dtype);
            assert!(max_abs_diff(&output, &expected)? < 5e-2, "{dtype:?} diverged");
        }
        Ok(())
    }

    #[test]
    fn rejects_mismatched_parameters_and_inputs() -> Result<()> {
        let device = Device::Cpu;
        let config = LinearConfig::new(3, 2);
        let weight = Tensor::zeros((3, 2), DType::F32, &device)?;
        let err = Linear::new(config.clone(), weight, None).unwrap_err();
        assert!(matches!(err, LayerError::ShapeMismatch { .. }));

        let weight = Tensor::zeros((2, 3), DType::F32, &device)?;
        let err = Linear::new(config.clone(), weight.clone(), None).unwrap_err();
        assert!(matches!(err, LayerError::InvalidArgument { .. }));

        let mut no_bias = config;
        no_bias.bias = false;
        let linear = Linear::new(no_bias, weight, None)?;
        let err = linear
            .forward(&Tensor::zeros((1, 4), DType::F32, &device)?)
            .unwrap_err();
        assert!(matches!(err, LayerError::ShapeMismatch { .. }));
        Ok(())
    }
}
