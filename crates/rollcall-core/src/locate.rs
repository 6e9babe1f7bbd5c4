//! Face region location.
//!
//! Candidate detection is an external collaborator; the engine only needs
//! a way to pick face regions out of an enrollment photo. Implementations
//! return regions in scan order and the first region is the primary face.

use image::GrayImage;

/// A rectangular face region inside a larger image, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Strategy for locating candidate face regions in an image.
pub trait FaceLocator {
    /// Candidate regions in scan order; empty when nothing is found.
    fn locate(&self, image: &GrayImage) -> Vec<FaceRegion>;
}

/// Locator for pre-framed shots: proposes the largest centered square.
///
/// Enrollment photos from the capture flow contain a single face filling
/// the frame, so the centered square is the face region.
#[derive(Debug, Default, Clone, Copy)]
pub struct CenterSquareLocator;

impl FaceLocator for CenterSquareLocator {
    fn locate(&self, image: &GrayImage) -> Vec<FaceRegion> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Vec::new();
        }
        let side = width.min(height);
        vec![FaceRegion {
            x: (width - side) / 2,
            y: (height - side) / 2,
            width: side,
            height: side,
        }]
    }
}

/// Crop a located region out of an image.
pub fn crop_region(image: &GrayImage, region: &FaceRegion) -> GrayImage {
    image::imageops::crop_imm(image, region.x, region.y, region.width, region.height).to_image()
}
