//! Derivative policy: turns an original image into its thumbnail and
//! compressed renditions.
//!
//! Everything here is a pure function of the source bytes and the policy
//! parameters, which is what allows the resolver to rebuild a missing
//! derivative at any time.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};

use crate::config::DerivativeConfig;
use crate::storage::ArtifactKind;

#[derive(Debug, thiserror::Error)]
pub enum DeriveError {
    #[error("Failed to decode source image: {0}")]
    Decode(String),

    #[error("Failed to encode derived image: {0}")]
    Encode(String),

    #[error("{0} is not a derived artifact kind")]
    NotDerived(ArtifactKind),
}

/// An encoded derivative together with what produced it
#[derive(Debug, Clone)]
pub struct DerivedImage {
    pub kind: ArtifactKind,
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivativePolicy {
    pub thumbnail_size: u32,
    pub thumbnail_quality: u8,
    pub compressed_max: u32,
    pub compressed_quality: u8,
}

impl Default for DerivativePolicy {
    fn default() -> Self {
        Self::from_config(&DerivativeConfig::default())
    }
}

impl DerivativePolicy {
    pub fn from_config(config: &DerivativeConfig) -> Self {
        Self {
            thumbnail_size: config.thumbnail_size.max(1),
            thumbnail_quality: config.thumbnail_quality.clamp(1, 100),
            compressed_max: config.compressed_max.max(1),
            compressed_quality: config.compressed_quality.clamp(1, 100),
        }
    }

    /// Build the artifact for `kind` from encoded original bytes
    pub fn derive(&self, kind: ArtifactKind, source: &[u8]) -> Result<DerivedImage, DeriveError> {
        match kind {
            ArtifactKind::Thumbnail => self.thumbnail(source),
            ArtifactKind::Compressed => self.compressed(source),
            ArtifactKind::Original => Err(DeriveError::NotDerived(kind)),
        }
    }

    /// Square, center-cropped thumbnail
    pub fn thumbnail(&self, source: &[u8]) -> Result<DerivedImage, DeriveError> {
        let img = decode(source)?;
        let pixels = self.thumbnail_pixels(&img);
        encode(ArtifactKind::Thumbnail, &pixels, self.thumbnail_quality)
    }

    /// Rendition bounded by `compressed_max` on its longer side
    pub fn compressed(&self, source: &[u8]) -> Result<DerivedImage, DeriveError> {
        let img = decode(source)?;
        let pixels = self.compressed_pixels(&img);
        encode(ArtifactKind::Compressed, &pixels, self.compressed_quality)
    }

    pub fn thumbnail_pixels(&self, img: &DynamicImage) -> RgbImage {
        let rgb = flatten_onto_white(img);
        let (left, top, crop_size) = center_square(rgb.width(), rgb.height());
        let square = imageops::crop_imm(&rgb, left, top, crop_size, crop_size).to_image();
        imageops::resize(
            &square,
            self.thumbnail_size,
            self.thumbnail_size,
            FilterType::Lanczos3,
        )
    }

    pub fn compressed_pixels(&self, img: &DynamicImage) -> RgbImage {
        let rgb = flatten_onto_white(img);
        let (width, height) = bounded_dimensions(rgb.width(), rgb.height(), self.compressed_max);
        if (width, height) == rgb.dimensions() {
            return rgb;
        }
        imageops::resize(&rgb, width, height, FilterType::Lanczos3)
    }
}

/// Crop rectangle `(left, top, size)` of the centered square; odd remainders
/// fall toward the top-left.
pub fn center_square(width: u32, height: u32) -> (u32, u32, u32) {
    let crop_size = width.min(height);
    ((width - crop_size) / 2, (height - crop_size) / 2, crop_size)
}

/// Output size for the compressed rendition: the longer side becomes `max`
/// and the other side is scaled and rounded. Images within bounds keep their size.
pub fn bounded_dimensions(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }

    let scale = |other: u32, longer: u32| -> u32 {
        let scaled = (other as u64 * max as u64 * 2 + longer as u64) / (longer as u64 * 2);
        (scaled as u32).max(1)
    };

    if width > height {
        (max, scale(height, width))
    } else {
        (scale(width, height), max)
    }
}

/// Alpha-composite onto opaque white; images without alpha are converted as is
pub fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let blend = |c: u8| -> u8 {
            let a = a as u32;
            ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8
        };
        Rgb([blend(r), blend(g), blend(b)])
    })
}

pub fn decode(source: &[u8]) -> Result<DynamicImage, DeriveError> {
    let img = image::load_from_memory(source).map_err(|e| DeriveError::Decode(e.to_string()))?;
    if img.width() == 0 || img.height() == 0 {
        return Err(DeriveError::Decode("image has no pixels".to_string()));
    }
    Ok(img)
}

/// Fully decode `source` and report `(width, height)`; a readable header alone
/// does not make an image usable
pub fn decoded_dimensions(source: &[u8]) -> Result<(u32, u32), DeriveError> {
    decode(source).map(|img| img.dimensions())
}

fn encode(kind: ArtifactKind, pixels: &RgbImage, quality: u8) -> Result<DerivedImage, DeriveError> {
    let mut buf = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
        encoder
            .encode_image(pixels)
            .map_err(|e| DeriveError::Encode(e.to_string()))?;
    }
    if buf.is_empty() {
        return Err(DeriveError::Encode("encoder produced no data".to_string()));
    }

    Ok(DerivedImage {
        kind,
        bytes: Bytes::from(buf),
        width: pixels.width(),
        height: pixels.height(),
        quality,
    })
}
