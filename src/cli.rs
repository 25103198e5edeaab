//! Command line interface
//!
//! `emoface` with no subcommand serves HTTP. `predict` classifies one image
//! file offline and `init-weights` writes an untrained weight artifact.

use std::path::{Path, PathBuf};

use anyhow::Context;
use candle_core::Device;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::api::dto::NO_FACE_MESSAGE;
use crate::engine::{Topology, TopologyVariant, WeightSet};
use crate::service::Detection;

#[derive(Parser, Debug)]
#[command(name = "emoface")]
#[command(version, about = "Facial emotion recognition service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Serve the HTML and JSON routes (default)
    Serve,

    /// Print the emotion of the selected face in an image file
    Predict {
        /// Input image file
        image: PathBuf,
    },

    /// Write an untrained weight artifact for a topology
    InitWeights {
        /// Output safetensors file
        path: PathBuf,

        /// Topology variant the artifact is built for
        #[arg(long, default_value = "little_vgg", value_parser = parse_topology)]
        topology: TopologyVariant,
    },
}

impl Cli {
    /// The subcommand to run, `serve` when none was given
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}

fn parse_topology(name: &str) -> Result<TopologyVariant, String> {
    TopologyVariant::from_name(name)
        .ok_or_else(|| format!("unknown topology `{}` (expected little_vgg or little_vgg_compact)", name))
}

/// Write freshly initialized weights for `variant` to `path`.
/// Returns the number of tensors written.
pub fn init_weights(path: &Path, variant: TopologyVariant) -> anyhow::Result<usize> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("cannot create {:?}", dir))?;
    }

    let topology = Topology::build(variant);
    let weights = WeightSet::initialize(&topology, &Device::Cpu)?;
    weights.save(path, &topology)?;

    info!(
        "Initialized {} weights ({} parameters) at {:?}",
        variant,
        topology.parameter_count(),
        path
    );
    Ok(weights.len())
}

/// One-line report for an offline prediction
pub fn describe(detection: Option<&Detection>) -> String {
    match detection {
        Some(d) => format!("{} ({:.3})", d.prediction.emotion, d.prediction.confidence),
        None => NO_FACE_MESSAGE.to_string(),
    }
}
