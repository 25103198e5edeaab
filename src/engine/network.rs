//! Executable emotion network
//!
//! Turns a [`Topology`] plus a bound [`WeightSet`] into candle layers and runs
//! the forward pass in inference mode: dropout is inert and batch
//! normalization uses the stored moving statistics.

use candle_core::{Device, Module, Tensor};
use candle_nn::{BatchNorm, Conv2d, Conv2dConfig, Dropout, Linear};

use super::topology::{Activation, LayerSpec, Topology, TopologyVariant, BATCH_NORM_EPSILON};
use super::weights::WeightSet;
use crate::error::WeightError;

enum Layer {
    Conv(Conv2d),
    Activation(Activation),
    BatchNorm(BatchNorm),
    MaxPool(usize),
    Dropout(Dropout),
    Flatten,
    Dense(Linear, Option<Activation>),
}

/// The little-VGG emotion classifier bound to concrete weights
pub struct EmotionNet {
    variant: TopologyVariant,
    layers: Vec<Layer>,
    device: Device,
}

impl EmotionNet {
    /// Build the candle layers for `topology` from validated weights.
    ///
    /// Kernels are stored channels-last and are converted to candle's
    /// `(out, in, kh, kw)` and `(out, in)` layouts here.
    pub fn new(topology: &Topology, weights: &WeightSet, device: &Device) -> Result<Self, WeightError> {
        let mut layers = Vec::with_capacity(topology.layers().len());

        for spec in topology.layers() {
            let layer = match spec {
                LayerSpec::Conv2d { name, .. } => {
                    let kernel = weights
                        .get(&format!("{name}.kernel"))?
                        .permute((3, 2, 0, 1))?
                        .contiguous()?;
                    let bias = weights.get(&format!("{name}.bias"))?.clone();
                    Layer::Conv(Conv2d::new(
                        kernel,
                        Some(bias),
                        Conv2dConfig {
                            // same padding for 3x3 kernels
                            padding: 1,
                            stride: 1,
                            dilation: 1,
                            groups: 1,
                            cudnn_fwd_algo: None,
                        },
                    ))
                }
                LayerSpec::Activation(activation) => Layer::Activation(*activation),
                LayerSpec::BatchNorm { name, features } => {
                    let param = |p: &str| weights.get(&format!("{name}.{p}")).cloned();
                    Layer::BatchNorm(BatchNorm::new(
                        *features,
                        param("moving_mean")?,
                        param("moving_variance")?,
                        param("gamma")?,
                        param("beta")?,
                        BATCH_NORM_EPSILON,
                    )?)
                }
                LayerSpec::MaxPool2d { size } => Layer::MaxPool(*size),
                LayerSpec::Dropout { rate } => Layer::Dropout(Dropout::new(*rate)),
                LayerSpec::Flatten => Layer::Flatten,
                LayerSpec::Dense { name, activation, .. } => {
                    let kernel = weights.get(&format!("{name}.kernel"))?.t()?.contiguous()?;
                    let bias = weights.get(&format!("{name}.bias"))?.clone();
                    Layer::Dense(Linear::new(kernel, Some(bias)), *activation)
                }
            };
            layers.push(layer);
        }

        Ok(Self {
            variant: topology.variant(),
            layers,
            device: device.clone(),
        })
    }

    pub fn variant(&self) -> TopologyVariant {
        self.variant
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Forward pass over a channels-last batch `(n, 48, 48, 1)`.
    ///
    /// Returns `(n, 5)` probabilities. Inputs of any other spatial size fail
    /// once the flattened features reach the first dense layer.
    pub fn forward(&self, input: &Tensor) -> candle_core::Result<Tensor> {
        // NHWC -> NCHW
        let mut xs = input.permute((0, 3, 1, 2))?.contiguous()?;

        for layer in &self.layers {
            xs = match layer {
                Layer::Conv(conv) => conv.forward(&xs)?,
                Layer::Activation(activation) => activate(&xs, *activation)?,
                Layer::BatchNorm(norm) => xs.apply_t(norm, false)?,
                Layer::MaxPool(size) => xs.max_pool2d(*size)?,
                Layer::Dropout(dropout) => xs.apply_t(dropout, false)?,
                // flatten in channels-last order to match the dense kernel rows
                Layer::Flatten => xs.permute((0, 2, 3, 1))?.contiguous()?.flatten_from(1)?,
                Layer::Dense(linear, activation) => {
                    let ys = linear.forward(&xs)?;
                    match activation {
                        Some(activation) => activate(&ys, *activation)?,
                        None => ys,
                    }
                }
            };
        }

        Ok(xs)
    }
}

fn activate(xs: &Tensor, activation: Activation) -> candle_core::Result<Tensor> {
    match activation {
        Activation::Elu => xs.elu(1.0),
        Activation::Softmax => candle_nn::ops::softmax_last_dim(xs),
    }
}
