//! Weight Artifact Loader
//!
//! Binds a safetensors artifact to the weight slots of a [`Topology`].
//! Every slot is validated (presence, shape) before anything is bound, so a
//! failing artifact never yields a partially initialized network.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use safetensors::{tensor::TensorView, Dtype, SafeTensors};
use tracing::{debug, info, warn};

use super::topology::{Initializer, Topology, WeightSlot};
use crate::error::WeightError;

/// Metadata key naming the topology variant an artifact pairs with
pub const TOPOLOGY_METADATA_KEY: &str = "topology";

/// Tensors bound to a topology's weight slots
#[derive(Debug, Clone)]
pub struct WeightSet {
    tensors: HashMap<String, Tensor>,
}

impl WeightSet {
    /// Load and validate an artifact from disk
    pub fn load(path: &Path, topology: &Topology, device: &Device) -> Result<Self, WeightError> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => WeightError::Missing(path.to_path_buf()),
            _ => corrupt(path, e),
        })?;

        let (_, metadata) = SafeTensors::read_metadata(&bytes).map_err(|e| corrupt(path, e))?;
        match metadata
            .metadata()
            .as_ref()
            .and_then(|m| m.get(TOPOLOGY_METADATA_KEY))
        {
            Some(found) if found != topology.variant().as_str() => {
                return Err(WeightError::TopologyMismatch {
                    expected: topology.variant().as_str().to_string(),
                    found: found.clone(),
                });
            }
            Some(_) => {}
            None => warn!(
                "Weight artifact {:?} carries no topology tag, binding by tensor names only",
                path
            ),
        }

        let raw = candle_core::safetensors::load_buffer(&bytes, device)
            .map_err(|e| corrupt(path, e))?;
        debug!("Read {} tensors from {:?}", raw.len(), path);

        let weights = Self::from_tensors(raw, topology)?;
        info!(
            "Bound {} weight tensors ({} parameters) for topology {}",
            weights.len(),
            topology.parameter_count(),
            topology.variant()
        );
        Ok(weights)
    }

    /// Validate named tensors against the topology's slots
    pub fn from_tensors(
        mut raw: HashMap<String, Tensor>,
        topology: &Topology,
    ) -> Result<Self, WeightError> {
        let slots = topology.weight_slots();
        let mut tensors = HashMap::with_capacity(slots.len());

        for slot in slots {
            let tensor = raw
                .remove(&slot.name)
                .ok_or_else(|| WeightError::MissingTensor(slot.name.clone()))?;

            if tensor.dims() != slot.shape.as_slice() {
                return Err(WeightError::ShapeMismatch {
                    name: slot.name,
                    expected: slot.shape,
                    found: tensor.dims().to_vec(),
                });
            }

            let tensor = if tensor.dtype() == DType::F32 {
                tensor
            } else {
                tensor.to_dtype(DType::F32)?
            };
            tensors.insert(slot.name, tensor);
        }

        if !raw.is_empty() {
            let mut extra: Vec<String> = raw.into_keys().collect();
            extra.sort();
            return Err(WeightError::UnexpectedTensors(extra));
        }

        Ok(Self { tensors })
    }

    /// Untrained values drawn from each slot's initializer
    pub fn initialize(topology: &Topology, device: &Device) -> Result<Self, WeightError> {
        let tensors = topology
            .weight_slots()
            .into_iter()
            .map(|slot| {
                let tensor = init_tensor(&slot, device)?;
                Ok((slot.name, tensor))
            })
            .collect::<Result<HashMap<_, _>, WeightError>>()?;

        Ok(Self { tensors })
    }

    /// Write the set as a safetensors artifact tagged with the topology
    pub fn save(&self, path: &Path, topology: &Topology) -> Result<(), WeightError> {
        let mut buffers = Vec::with_capacity(self.tensors.len());
        for slot in topology.weight_slots() {
            let tensor = self.get(&slot.name)?;
            let values = tensor.flatten_all()?.to_vec1::<f32>()?;
            let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
            buffers.push((slot.name, slot.shape, bytes));
        }

        let views = buffers
            .iter()
            .map(|(name, shape, bytes)| {
                TensorView::new(Dtype::F32, shape.clone(), bytes).map(|view| (name.as_str(), view))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| write_failed(path, e))?;

        let metadata = HashMap::from([(
            TOPOLOGY_METADATA_KEY.to_string(),
            topology.variant().as_str().to_string(),
        )]);

        safetensors::serialize_to_file(views, &Some(metadata), path)
            .map_err(|e| write_failed(path, e))?;
        info!("Wrote {} weight tensors to {:?}", buffers.len(), path);
        Ok(())
    }

    /// Tensor bound to a slot
    pub fn get(&self, name: &str) -> Result<&Tensor, WeightError> {
        self.tensors
            .get(name)
            .ok_or_else(|| WeightError::MissingTensor(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

fn init_tensor(slot: &WeightSlot, device: &Device) -> candle_core::Result<Tensor> {
    let shape = slot.shape.clone();
    match slot.initializer {
        Initializer::Zeros => Tensor::zeros(shape, DType::F32, device),
        Initializer::Ones => Tensor::ones(shape, DType::F32, device),
        Initializer::HeNormal => {
            let (fan_in, _) = fans(&slot.shape);
            let std = (2.0 / fan_in as f32).sqrt();
            Tensor::randn(0f32, std, shape, device)
        }
        Initializer::GlorotUniform => {
            let (fan_in, fan_out) = fans(&slot.shape);
            let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
            Tensor::rand(-limit, limit, shape, device)
        }
    }
}

/// Fan-in and fan-out of channels-last kernels
fn fans(shape: &[usize]) -> (usize, usize) {
    match shape {
        [kh, kw, inputs, outputs] => (kh * kw * inputs, kh * kw * outputs),
        [inputs, outputs] => (*inputs, *outputs),
        [n] => (*n, *n),
        _ => (1, 1),
    }
}

fn corrupt(path: &Path, reason: impl std::fmt::Display) -> WeightError {
    WeightError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn write_failed(path: &Path, reason: impl std::fmt::Display) -> WeightError {
    WeightError::Write {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::topology::TopologyVariant;

    fn topology() -> Topology {
        Topology::build(TopologyVariant::LittleVgg)
    }

    fn untrained_tensors(topology: &Topology) -> HashMap<String, Tensor> {
        let weights = WeightSet::initialize(topology, &Device::Cpu).unwrap();
        weights.tensors
    }

    #[test]
    fn test_fans() {
        assert_eq!(fans(&[3, 3, 32, 64]), (288, 576));
        assert_eq!(fans(&[2304, 64]), (2304, 64));
    }

    #[test]
    fn test_initialize_fills_every_slot() {
        let topology = topology();
        let weights = WeightSet::initialize(&topology, &Device::Cpu).unwrap();
        assert_eq!(weights.len(), topology.weight_slots().len());

        let gamma = weights.get("batch_normalization.gamma").unwrap();
        assert_eq!(gamma.to_vec1::<f32>().unwrap(), vec![1.0; 32]);

        let kernel = weights.get("conv2d_7.kernel").unwrap();
        assert_eq!(kernel.dims(), &[3, 3, 256, 256]);
    }

    #[test]
    fn test_save_then_load() {
        let topology = topology();
        let weights = WeightSet::initialize(&topology, &Device::Cpu).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emotion.safetensors");

        weights.save(&path, &topology).unwrap();
        let loaded = WeightSet::load(&path, &topology, &Device::Cpu).unwrap();

        let name = "dense_2.kernel";
        let before = weights.get(name).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        let after = loaded.get(name).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.safetensors");
        let err = WeightSet::load(&path, &topology(), &Device::Cpu).unwrap_err();
        assert!(matches!(err, WeightError::Missing(p) if p == path));
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.safetensors");
        std::fs::write(&path, b"definitely not a weight file").unwrap();
        let err = WeightSet::load(&path, &topology(), &Device::Cpu).unwrap_err();
        assert!(matches!(err, WeightError::Corrupt { .. }));
    }

    #[test]
    fn test_variant_tag_must_match() {
        let little = Topology::build(TopologyVariant::LittleVgg);
        let compact = Topology::build(TopologyVariant::LittleVggCompact);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("little.safetensors");

        WeightSet::initialize(&little, &Device::Cpu)
            .unwrap()
            .save(&path, &little)
            .unwrap();

        let err = WeightSet::load(&path, &compact, &Device::Cpu).unwrap_err();
        match err {
            WeightError::TopologyMismatch { expected, found } => {
                assert_eq!(expected, "little_vgg_compact");
                assert_eq!(found, "little_vgg");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_tensor_rejected() {
        let topology = topology();
        let mut raw = untrained_tensors(&topology);
        raw.remove("batch_normalization_4.moving_variance");
        let err = WeightSet::from_tensors(raw, &topology).unwrap_err();
        assert!(
            matches!(err, WeightError::MissingTensor(name) if name == "batch_normalization_4.moving_variance")
        );
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let topology = topology();
        let mut raw = untrained_tensors(&topology);
        // 3x3 kernel widened to 5x5
        raw.insert(
            "conv2d_2.kernel".to_string(),
            Tensor::zeros((5, 5, 32, 64), DType::F32, &Device::Cpu).unwrap(),
        );
        let err = WeightSet::from_tensors(raw, &topology).unwrap_err();
        match err {
            WeightError::ShapeMismatch { name, expected, found } => {
                assert_eq!(name, "conv2d_2.kernel");
                assert_eq!(expected, vec![3, 3, 32, 64]);
                assert_eq!(found, vec![5, 5, 32, 64]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_extra_tensors_rejected() {
        let topology = topology();
        let mut raw = untrained_tensors(&topology);
        raw.insert(
            "dense_3.bias".to_string(),
            Tensor::zeros(7, DType::F32, &Device::Cpu).unwrap(),
        );
        let err = WeightSet::from_tensors(raw, &topology).unwrap_err();
        assert!(matches!(err, WeightError::UnexpectedTensors(names) if names == vec!["dense_3.bias"]));
    }

    #[test]
    fn test_non_f32_tensors_are_converted() {
        let topology = topology();
        let mut raw = untrained_tensors(&topology);
        let bias = raw["dense_2.bias"].to_dtype(DType::F64).unwrap();
        raw.insert("dense_2.bias".to_string(), bias);
        let weights = WeightSet::from_tensors(raw, &topology).unwrap();
        assert_eq!(weights.get("dense_2.bias").unwrap().dtype(), DType::F32);
    }
}
