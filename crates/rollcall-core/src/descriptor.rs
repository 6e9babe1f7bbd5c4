//! Histogram face descriptor extraction.
//!
//! Reduces a grayscale face crop to a fixed-length, sum-normalized
//! intensity histogram. Deterministic for identical input, no model files,
//! cheap enough to run on every enrollment image at registry rebuild.

use crate::types::Descriptor;
use image::imageops::FilterType;
use image::GrayImage;
use thiserror::Error;

// --- Named constants ---
/// Dimensions every descriptor produced by [`HistogramExtractor`] has.
pub const DESCRIPTOR_LEN: usize = 256;
const FACE_SIZE: u32 = 100;
const MIN_REGION_DIM: u32 = 50;
const NORM_EPSILON: f32 = 1e-10;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("face region is empty")]
    EmptyRegion,
    #[error("face region too small: {width}x{height} (minimum {min}x{min})", min = MIN_REGION_DIM)]
    RegionTooSmall { width: u32, height: u32 },
    #[error("image unreadable: {0}")]
    Unreadable(#[from] image::ImageError),
}

/// Strategy producing fixed-length descriptors from grayscale face crops.
///
/// All descriptors produced by one extractor share a single length and
/// normalization scheme; mixing schemes within a registry is a
/// configuration error, checked at rebuild.
pub trait DescriptorExtractor {
    fn extract(&self, face: &GrayImage) -> Result<Descriptor, ExtractError>;

    /// Decode raw image bytes, convert to grayscale, and extract.
    fn extract_from_bytes(&self, bytes: &[u8]) -> Result<Descriptor, ExtractError> {
        if bytes.is_empty() {
            return Err(ExtractError::EmptyRegion);
        }
        let gray = image::load_from_memory(bytes)?.to_luma8();
        self.extract(&gray)
    }
}

/// Intensity-histogram descriptor extractor.
///
/// The crop is resized to 100x100 and reduced to a 256-bin histogram
/// normalized to sum to 1, so descriptors are comparable across crop sizes.
#[derive(Debug, Default, Clone, Copy)]
pub struct HistogramExtractor;

impl DescriptorExtractor for HistogramExtractor {
    fn extract(&self, face: &GrayImage) -> Result<Descriptor, ExtractError> {
        let (width, height) = face.dimensions();
        if width == 0 || height == 0 {
            return Err(ExtractError::EmptyRegion);
        }
        if width < MIN_REGION_DIM || height < MIN_REGION_DIM {
            return Err(ExtractError::RegionTooSmall { width, height });
        }

        let resized = image::imageops::resize(face, FACE_SIZE, FACE_SIZE, FilterType::Triangle);

        let mut bins = [0u32; DESCRIPTOR_LEN];
        for pixel in resized.pixels() {
            bins[pixel.0[0] as usize] += 1;
        }

        let total = bins.iter().map(|&c| c as f32).sum::<f32>() + NORM_EPSILON;
        let values = bins.iter().map(|&c| c as f32 / total).collect();

        Ok(Descriptor { values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use std::io::Cursor;

    fn gradient(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| Luma([((x + y) % 256) as u8]))
    }

    fn png_bytes(img: &GrayImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .expect("png encode");
        buf
    }

    #[test]
    fn test_descriptor_has_fixed_length() {
        let d = HistogramExtractor.extract(&gradient(100, 100)).unwrap();
        assert_eq!(d.len(), DESCRIPTOR_LEN);
    }

    #[test]
    fn test_descriptor_sums_to_one() {
        let d = HistogramExtractor.extract(&gradient(120, 80)).unwrap();
        let sum: f32 = d.values.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4, "histogram sum was {sum}");
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let img = gradient(100, 100);
        let a = HistogramExtractor.extract(&img).unwrap();
        let b = HistogramExtractor.extract(&img).unwrap();
        assert_eq!(a.values, b.values);
    }

    #[test]
    fn test_uniform_image_collapses_to_one_bin() {
        let img = GrayImage::from_pixel(100, 100, Luma([128u8]));
        let d = HistogramExtractor.extract(&img).unwrap();
        assert!((d.values[128] - 1.0).abs() < 1e-4);
        assert!(d.values[0].abs() < 1e-6);
    }

    #[test]
    fn test_crop_size_does_not_change_length() {
        let small = HistogramExtractor.extract(&gradient(60, 60)).unwrap();
        let large = HistogramExtractor.extract(&gradient(400, 300)).unwrap();
        assert_eq!(small.len(), large.len());
    }

    #[test]
    fn test_empty_region_rejected() {
        let err = HistogramExtractor.extract(&GrayImage::new(0, 0)).unwrap_err();
        assert!(matches!(err, ExtractError::EmptyRegion));
    }

    #[test]
    fn test_small_region_rejected() {
        let err = HistogramExtractor.extract(&gradient(49, 100)).unwrap_err();
        assert!(matches!(err, ExtractError::RegionTooSmall { width: 49, height: 100 }));
    }

    #[test]
    fn test_extract_from_bytes_roundtrip() {
        let img = gradient(100, 100);
        let direct = HistogramExtractor.extract(&img).unwrap();
        let decoded = HistogramExtractor.extract_from_bytes(&png_bytes(&img)).unwrap();
        assert_eq!(direct.values, decoded.values);
    }

    #[test]
    fn test_extract_from_bytes_rejects_garbage() {
        let err = HistogramExtractor.extract_from_bytes(b"not an image").unwrap_err();
        assert!(matches!(err, ExtractError::Unreadable(_)));
    }

    #[test]
    fn test_extract_from_bytes_rejects_empty() {
        let err = HistogramExtractor.extract_from_bytes(&[]).unwrap_err();
        assert!(matches!(err, ExtractError::EmptyRegion));
    }
}
