//! Cascade Face Locator
//!
//! Wraps the external funnel-structured cascade detector (SeetaFace model
//! file, run by `rustface`). The detector itself is opaque: this module only
//! feeds it grayscale frames, clamps its boxes to the frame and applies the
//! face selection policy.

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;

use anyhow::{Context, Result};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A detected face rectangle in grayscale frame coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Detector score, higher is more face-like
    pub score: f64,
}

impl FaceRegion {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Clamp a detector box (which may extend past the frame) to the frame.
    /// Returns `None` when nothing of the box lies inside.
    pub fn clamped(
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        score: f64,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Self> {
        let x0 = (x as i64).clamp(0, frame_width as i64);
        let y0 = (y as i64).clamp(0, frame_height as i64);
        let x1 = (x as i64 + width as i64).clamp(0, frame_width as i64);
        let y1 = (y as i64 + height as i64).clamp(0, frame_height as i64);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(Self {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
            score,
        })
    }
}

/// Which of several detected faces is classified
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceSelection {
    /// The first rectangle in detector order
    #[default]
    First,
    /// The rectangle with the largest area
    Largest,
    /// The rectangle with the highest detector score
    MostConfident,
}

impl FaceSelection {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaceSelection::First => "first",
            FaceSelection::Largest => "largest",
            FaceSelection::MostConfident => "most_confident",
        }
    }

    /// Pick one face; earlier entries win ties
    pub fn select(&self, faces: &[FaceRegion]) -> Option<FaceRegion> {
        match self {
            FaceSelection::First => faces.first().copied(),
            FaceSelection::Largest => faces
                .iter()
                .copied()
                .reduce(|best, face| if face.area() > best.area() { face } else { best }),
            FaceSelection::MostConfident => faces
                .iter()
                .copied()
                .reduce(|best, face| if face.score > best.score { face } else { best }),
        }
    }
}

/// Locates faces in a grayscale frame
pub trait FaceLocator: Send + Sync {
    /// Zero or more face rectangles, in detector-defined order
    fn locate(&self, frame: &GrayImage) -> Vec<FaceRegion>;
}

/// Detector sensitivity parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocatorParams {
    /// Downscale ratio between pyramid levels, > 1
    pub scale_factor: f32,
    /// Smallest face side in pixels, >= 20
    pub min_face_size: u32,
    /// Minimum classifier score for a window to count as a face
    pub score_threshold: f64,
    /// Sliding window step in pixels
    pub window_step: u32,
}

impl Default for LocatorParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.3,
            min_face_size: 20,
            score_threshold: 2.0,
            window_step: 4,
        }
    }
}

impl LocatorParams {
    /// The detector's pyramid factor is the reciprocal of the downscale ratio
    pub fn pyramid_factor(&self) -> f32 {
        1.0 / self.scale_factor
    }

    /// Reject values the detector would panic on
    pub fn validate(&self) -> Result<()> {
        let factor = self.pyramid_factor();
        anyhow::ensure!(
            self.scale_factor.is_finite() && (0.01..=0.99).contains(&factor),
            "detector scale_factor must be between 1.0102 and 100, got {}",
            self.scale_factor
        );
        anyhow::ensure!(
            self.min_face_size >= 20,
            "detector min_face_size must be at least 20, got {}",
            self.min_face_size
        );
        anyhow::ensure!(
            self.score_threshold > 0.0,
            "detector score_threshold must be positive, got {}",
            self.score_threshold
        );
        anyhow::ensure!(self.window_step > 0, "detector window_step must be positive");
        Ok(())
    }
}

/// Face locator backed by the `rustface` cascade engine
pub struct CascadeLocator {
    model: rustface::Model,
    params: LocatorParams,
}

impl CascadeLocator {
    /// Load the detector model file. Fails when missing or unreadable.
    pub fn from_file(path: &Path, params: LocatorParams) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("face detector model not found at {:?}", path))?;
        Self::from_reader(BufReader::new(file), params)
            .with_context(|| format!("invalid face detector model at {:?}", path))
    }

    pub fn from_reader<R: Read>(mut reader: R, params: LocatorParams) -> Result<Self> {
        params.validate()?;
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .context("failed to read detector model")?;

        // rustface trusts the header counts and aborts on absurd allocations
        check_model_layout(&bytes)?;

        let model = rustface::read_model(Cursor::new(bytes))
            .map_err(|e| anyhow::anyhow!("failed to parse detector model: {}", e))?;
        Ok(Self { model, params })
    }
}

/// Classifier kinds known to the funnel cascade format
const LAB_BOOSTED: i32 = 0;
const SURF_MLP: i32 = 1;

/// Little-endian cursor over a model file that never reads past the end
struct LayoutCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl LayoutCursor<'_> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        anyhow::ensure!(
            len <= self.remaining(),
            "detector model truncated at byte {} (needs {} more, {} left)",
            self.pos,
            len,
            self.remaining()
        );
        self.pos += len;
        Ok(())
    }

    fn read_i32(&mut self) -> Result<i32> {
        let start = self.pos;
        self.skip(4)?;
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.bytes[start..start + 4]);
        Ok(i32::from_le_bytes(word))
    }

    /// A count of 4-byte items that must fit in the rest of the file
    fn read_count(&mut self, what: &str) -> Result<usize> {
        let value = self.read_i32()?;
        anyhow::ensure!(value >= 0, "detector model has negative {} ({})", what, value);
        let count = value as usize;
        anyhow::ensure!(
            count <= self.remaining() / 4,
            "detector model {} ({}) exceeds the file size",
            what,
            count
        );
        Ok(count)
    }

    /// Skip `count` 4-byte items
    fn skip_words(&mut self, count: usize) -> Result<()> {
        let len = count
            .checked_mul(4)
            .ok_or_else(|| anyhow::anyhow!("detector model section too large"))?;
        self.skip(len)
    }
}

/// Walk the funnel cascade layout and verify every count fits the file.
fn check_model_layout(bytes: &[u8]) -> Result<()> {
    let mut cursor = LayoutCursor { bytes, pos: 0 };

    let num_hierarchy = cursor.read_count("hierarchy count")?;
    anyhow::ensure!(num_hierarchy > 0, "detector model has no hierarchies");

    for _ in 0..num_hierarchy {
        let hierarchy_size = cursor.read_count("hierarchy size")?;
        for _ in 0..hierarchy_size {
            let num_stage = cursor.read_count("stage count")?;
            for _ in 0..num_stage {
                match cursor.read_i32()? {
                    LAB_BOOSTED => {
                        let num_base = cursor.read_count("base classifier count")?;
                        let num_bin = cursor.read_count("bin count")?;
                        // (x, y) features, thresholds, then num_bin + 1 weights each
                        let per_base = 3 + num_bin + 1;
                        let words = num_base
                            .checked_mul(per_base)
                            .ok_or_else(|| anyhow::anyhow!("detector model section too large"))?;
                        cursor.skip_words(words)?;
                    }
                    SURF_MLP => {
                        let num_layer = cursor.read_count("layer count")?;
                        let num_feat = cursor.read_count("feature count")?;
                        // feature ids, then the threshold
                        cursor.skip_words(num_feat + 1)?;
                        let mut input_dim = cursor.read_count("input dimension")?;
                        for _ in 1..num_layer {
                            let output_dim = cursor.read_count("output dimension")?;
                            let words = input_dim
                                .checked_mul(output_dim)
                                .and_then(|w| w.checked_add(output_dim))
                                .ok_or_else(|| anyhow::anyhow!("detector model layer too large"))?;
                            cursor.skip_words(words)?;
                            input_dim = output_dim;
                        }
                    }
                    kind => anyhow::bail!("detector model has unknown classifier kind {}", kind),
                }
            }
            let num_wnd_src = cursor.read_i32()?;
            if num_wnd_src > 0 {
                cursor.skip_words(num_wnd_src as usize)?;
            }
        }
    }

    Ok(())
}

impl FaceLocator for CascadeLocator {
    fn locate(&self, frame: &GrayImage) -> Vec<FaceRegion> {
        let (width, height) = frame.dimensions();
        // the detector keeps per-run buffers, so each call gets its own
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(self.params.min_face_size);
        detector.set_score_thresh(self.params.score_threshold);
        detector.set_pyramid_scale_factor(self.params.pyramid_factor());
        detector.set_slide_window_step(self.params.window_step, self.params.window_step);

        let faces = detector.detect(&rustface::ImageData::new(frame.as_raw(), width, height));
        debug!("Cascade detector returned {} faces", faces.len());

        faces
            .iter()
            .filter_map(|face| {
                let bbox = face.bbox();
                FaceRegion::clamped(
                    bbox.x(),
                    bbox.y(),
                    bbox.width(),
                    bbox.height(),
                    face.score(),
                    width,
                    height,
                )
            })
            .collect()
    }
}
