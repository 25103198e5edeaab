//! Emotion Network Topology
//!
//! Builds the ordered layer description of the little-VGG emotion classifier.
//! The layer order, channel widths and parameter shapes are a contract with
//! the stored weight artifact: every weighted layer contributes tensors in the
//! order it is appended here, named the way the training framework names them.
//!
//! Input is a single 48x48 grayscale tile, output a 5-way probability vector.

use serde::{Deserialize, Serialize};

/// Side length of the square input tile
pub const INPUT_SIZE: usize = 48;

/// Number of input channels (grayscale)
pub const INPUT_CHANNELS: usize = 1;

/// Number of output classes
pub const NUM_CLASSES: usize = 5;

/// Filter widths of the four convolution stages
pub const STAGE_FILTERS: [usize; 4] = [32, 64, 128, 256];

/// Units of each hidden dense stage
pub const HIDDEN_UNITS: usize = 64;

const KERNEL_SIZE: usize = 3;
const POOL_SIZE: usize = 2;
const CONV_DROPOUT: f32 = 0.2;
const DENSE_DROPOUT: f32 = 0.5;

/// Batch normalization epsilon used at training time
pub const BATCH_NORM_EPSILON: f64 = 1e-3;

/// Named topology variants.
///
/// Both variants share parameter shapes but differ in how the hidden dense
/// stages are declared and initialized. Each pairs with its own artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyVariant {
    /// Hidden dense layers with He-normal init and a separate ELU layer
    LittleVgg,
    /// Hidden dense layers with Glorot-uniform init and a fused ELU
    LittleVggCompact,
}

impl TopologyVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopologyVariant::LittleVgg => "little_vgg",
            TopologyVariant::LittleVggCompact => "little_vgg_compact",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "little_vgg" => Some(TopologyVariant::LittleVgg),
            "little_vgg_compact" => Some(TopologyVariant::LittleVggCompact),
            _ => None,
        }
    }
}

impl std::fmt::Display for TopologyVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Activation functions used by the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Elu,
    Softmax,
}

/// Parameter initializers for untrained construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initializer {
    HeNormal,
    GlorotUniform,
    Zeros,
    Ones,
}

/// One layer of the topology
#[derive(Debug, Clone, PartialEq)]
pub enum LayerSpec {
    /// 3x3 convolution with same padding, channels-last kernel
    Conv2d {
        name: String,
        in_channels: usize,
        filters: usize,
        kernel_size: usize,
        initializer: Initializer,
    },
    Activation(Activation),
    BatchNorm {
        name: String,
        features: usize,
    },
    MaxPool2d {
        size: usize,
    },
    /// Inert outside training
    Dropout {
        rate: f32,
    },
    /// Flattens channels-last feature maps
    Flatten,
    Dense {
        name: String,
        in_features: usize,
        units: usize,
        initializer: Initializer,
        activation: Option<Activation>,
    },
}

/// A named weight tensor expected by the topology
#[derive(Debug, Clone, PartialEq)]
pub struct WeightSlot {
    pub name: String,
    pub shape: Vec<usize>,
    pub initializer: Initializer,
}

/// Ordered, untrained description of the emotion network
#[derive(Debug, Clone)]
pub struct Topology {
    variant: TopologyVariant,
    layers: Vec<LayerSpec>,
}

/// Feature shape tracked while building, channels-last
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureShape {
    Map { height: usize, width: usize, channels: usize },
    Flat(usize),
}

impl Topology {
    /// Build the layer stack for a variant
    pub fn build(variant: TopologyVariant) -> Self {
        let mut builder = Builder::new();

        for filters in STAGE_FILTERS {
            for _ in 0..2 {
                builder.conv(filters);
                builder.push(LayerSpec::Activation(Activation::Elu));
                builder.batch_norm();
            }
            builder.max_pool();
            builder.push(LayerSpec::Dropout { rate: CONV_DROPOUT });
        }

        builder.flatten();

        for _ in 0..2 {
            match variant {
                TopologyVariant::LittleVgg => {
                    builder.dense(HIDDEN_UNITS, Initializer::HeNormal, None);
                    builder.push(LayerSpec::Activation(Activation::Elu));
                }
                TopologyVariant::LittleVggCompact => {
                    builder.dense(HIDDEN_UNITS, Initializer::GlorotUniform, Some(Activation::Elu));
                }
            }
            builder.batch_norm();
            builder.push(LayerSpec::Dropout { rate: DENSE_DROPOUT });
        }

        builder.dense(NUM_CLASSES, Initializer::GlorotUniform, Some(Activation::Softmax));

        Self {
            variant,
            layers: builder.layers,
        }
    }

    pub fn variant(&self) -> TopologyVariant {
        self.variant
    }

    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }

    /// Input shape of a single sample: (height, width, channels)
    pub fn input_shape(&self) -> [usize; 3] {
        [INPUT_SIZE, INPUT_SIZE, INPUT_CHANNELS]
    }

    /// Weight tensors in the order the layers were built
    pub fn weight_slots(&self) -> Vec<WeightSlot> {
        let mut slots = Vec::new();
        for layer in &self.layers {
            match layer {
                LayerSpec::Conv2d { name, in_channels, filters, kernel_size, initializer } => {
                    slots.push(WeightSlot {
                        name: format!("{name}.kernel"),
                        shape: vec![*kernel_size, *kernel_size, *in_channels, *filters],
                        initializer: *initializer,
                    });
                    slots.push(WeightSlot {
                        name: format!("{name}.bias"),
                        shape: vec![*filters],
                        initializer: Initializer::Zeros,
                    });
                }
                LayerSpec::BatchNorm { name, features } => {
                    for (param, initializer) in [
                        ("gamma", Initializer::Ones),
                        ("beta", Initializer::Zeros),
                        ("moving_mean", Initializer::Zeros),
                        ("moving_variance", Initializer::Ones),
                    ] {
                        slots.push(WeightSlot {
                            name: format!("{name}.{param}"),
                            shape: vec![*features],
                            initializer,
                        });
                    }
                }
                LayerSpec::Dense { name, in_features, units, initializer, .. } => {
                    slots.push(WeightSlot {
                        name: format!("{name}.kernel"),
                        shape: vec![*in_features, *units],
                        initializer: *initializer,
                    });
                    slots.push(WeightSlot {
                        name: format!("{name}.bias"),
                        shape: vec![*units],
                        initializer: Initializer::Zeros,
                    });
                }
                _ => {}
            }
        }
        slots
    }

    /// Run shape inference from the input tile to the last layer
    pub fn output_shape(&self) -> FeatureShape {
        let [height, width, channels] = self.input_shape();
        self.layers.iter().fold(
            FeatureShape::Map { height, width, channels },
            |shape, layer| next_shape(shape, layer),
        )
    }

    /// Total number of scalar parameters, batch-norm statistics included
    pub fn parameter_count(&self) -> usize {
        self.weight_slots()
            .iter()
            .map(|slot| slot.shape.iter().product::<usize>())
            .sum()
    }
}

fn next_shape(shape: FeatureShape, layer: &LayerSpec) -> FeatureShape {
    match (shape, layer) {
        (FeatureShape::Map { height, width, .. }, LayerSpec::Conv2d { filters, .. }) => {
            FeatureShape::Map { height, width, channels: *filters }
        }
        (FeatureShape::Map { height, width, channels }, LayerSpec::MaxPool2d { size }) => {
            FeatureShape::Map { height: height / size, width: width / size, channels }
        }
        (FeatureShape::Map { height, width, channels }, LayerSpec::Flatten) => {
            FeatureShape::Flat(height * width * channels)
        }
        (FeatureShape::Flat(_), LayerSpec::Dense { units, .. }) => FeatureShape::Flat(*units),
        (shape, _) => shape,
    }
}

/// Keeps per-kind layer counters so names match the training framework
struct Builder {
    layers: Vec<LayerSpec>,
    shape: FeatureShape,
    conv_count: usize,
    norm_count: usize,
    dense_count: usize,
}

impl Builder {
    fn new() -> Self {
        Self {
            layers: Vec::new(),
            shape: FeatureShape::Map {
                height: INPUT_SIZE,
                width: INPUT_SIZE,
                channels: INPUT_CHANNELS,
            },
            conv_count: 0,
            norm_count: 0,
            dense_count: 0,
        }
    }

    fn push(&mut self, layer: LayerSpec) {
        self.shape = next_shape(self.shape, &layer);
        self.layers.push(layer);
    }

    fn conv(&mut self, filters: usize) {
        let in_channels = match self.shape {
            FeatureShape::Map { channels, .. } => channels,
            FeatureShape::Flat(features) => features,
        };
        let name = layer_name("conv2d", &mut self.conv_count);
        self.push(LayerSpec::Conv2d {
            name,
            in_channels,
            filters,
            kernel_size: KERNEL_SIZE,
            initializer: Initializer::HeNormal,
        });
    }

    fn batch_norm(&mut self) {
        let features = match self.shape {
            FeatureShape::Map { channels, .. } => channels,
            FeatureShape::Flat(features) => features,
        };
        let name = layer_name("batch_normalization", &mut self.norm_count);
        self.push(LayerSpec::BatchNorm { name, features });
    }

    fn max_pool(&mut self) {
        self.push(LayerSpec::MaxPool2d { size: POOL_SIZE });
    }

    fn flatten(&mut self) {
        self.push(LayerSpec::Flatten);
    }

    fn dense(&mut self, units: usize, initializer: Initializer, activation: Option<Activation>) {
        let in_features = match self.shape {
            FeatureShape::Flat(features) => features,
            FeatureShape::Map { height, width, channels } => height * width * channels,
        };
        let name = layer_name("dense", &mut self.dense_count);
        self.push(LayerSpec::Dense {
            name,
            in_features,
            units,
            initializer,
            activation,
        });
    }
}

/// `base`, `base_1`, `base_2`, ...
fn layer_name(base: &str, counter: &mut usize) -> String {
    let name = if *counter == 0 {
        base.to_string()
    } else {
        format!("{base}_{counter}")
    };
    *counter += 1;
    name
}
