//! Image preprocessing for emotion classification

use image::{imageops, DynamicImage, GrayImage, Luma};
use ndarray::Array4;

use super::locator::FaceRegion;
use super::topology::{INPUT_CHANNELS, INPUT_SIZE};
use crate::error::{EmotionError, Result};

/// Shape of a normalized tile: (batch, height, width, channels)
pub const TILE_SHAPE: [usize; 4] = [1, INPUT_SIZE, INPUT_SIZE, INPUT_CHANNELS];

/// Decode image from bytes with EXIF orientation handling
/// This ensures images are correctly oriented regardless of how they were captured
pub fn decode_image(data: &[u8]) -> Result<DynamicImage> {
    let image = image::load_from_memory(data)
        .map_err(|e| EmotionError::InvalidImage(e.to_string()))?;

    if image.width() == 0 || image.height() == 0 {
        return Err(EmotionError::InvalidImage("image has zero dimensions".to_string()));
    }

    Ok(apply_exif_orientation(data, image))
}

/// Apply EXIF orientation to correct image rotation
/// Mobile phones often store images with EXIF orientation tags instead of rotating pixels
fn apply_exif_orientation(data: &[u8], image: DynamicImage) -> DynamicImage {
    use std::io::Cursor;

    let orientation = match exif::Reader::new().read_from_container(&mut Cursor::new(data)) {
        Ok(exif_data) => exif_data
            .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .unwrap_or(1),
        Err(_) => 1,
    };

    // See: https://exiftool.org/TagNames/EXIF.html (Orientation)
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

/// Convert to a single-channel frame with BT.601 luma weights
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    GrayImage::from_fn(width, height, |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// Extract a face region from the grayscale frame
pub fn crop_face(frame: &GrayImage, region: &FaceRegion) -> GrayImage {
    imageops::crop_imm(frame, region.x, region.y, region.width, region.height).to_image()
}

/// A face resized to 48x48 and rescaled to [0, 1], shaped `(1, 48, 48, 1)`
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTile(Array4<f32>);

impl NormalizedTile {
    /// Resize a cropped face and rescale its intensities
    pub fn from_face(face: &GrayImage) -> Self {
        let size = INPUT_SIZE as u32;
        let resized = imageops::resize(face, size, size, imageops::FilterType::Triangle);

        let mut tile = Array4::<f32>::zeros(TILE_SHAPE);
        for (x, y, pixel) in resized.enumerate_pixels() {
            tile[[0, y as usize, x as usize, 0]] = pixel[0] as f32 / 255.0;
        }

        Self(tile)
    }

    /// The tile's values in row-major order
    pub fn as_slice(&self) -> &[f32] {
        // tiles are always kept in standard layout
        self.0.as_slice().unwrap_or(&[])
    }

    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }
}

impl TryFrom<Array4<f32>> for NormalizedTile {
    type Error = EmotionError;

    fn try_from(array: Array4<f32>) -> Result<Self> {
        if array.shape() != TILE_SHAPE {
            return Err(EmotionError::TileShape {
                expected: TILE_SHAPE,
                found: array.shape().to_vec(),
            });
        }
        Ok(Self(array.as_standard_layout().into_owned()))
    }
}
