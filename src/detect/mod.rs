//! Face detection seam and frame preprocessing

#[cfg(feature = "opencv")]
mod haar;

#[cfg(feature = "opencv")]
pub use haar::HaarCascadeDetector;

use image::{GrayImage, RgbImage};

use crate::errors::Result;
use crate::tracking::FaceBox;

/// Pluggable face detection backend.
///
/// Receives a grayscale, histogram-equalised copy of the frame and returns
/// boxes in frame pixel coordinates. An empty vector means no faces.
pub trait FaceDetector {
    fn detect(&mut self, gray: &GrayImage) -> Result<Vec<FaceBox>>;
}

impl<D: FaceDetector + ?Sized> FaceDetector for Box<D> {
    fn detect(&mut self, gray: &GrayImage) -> Result<Vec<FaceBox>> {
        (**self).detect(gray)
    }
}

/// Luma copy of `frame` with its histogram equalised
pub fn equalized_grayscale(frame: &RgbImage) -> GrayImage {
    let mut gray = image::imageops::grayscale(frame);
    equalize_histogram(&mut gray);
    gray
}

/// Spread intensities over the full 0..=255 range using the cumulative
/// histogram. A single-intensity image is left untouched.
pub fn equalize_histogram(gray: &mut GrayImage) {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[usize::from(pixel.0[0])] += 1;
    }

    let total: u64 = histogram.iter().sum();
    let cdf_min = histogram.iter().copied().find(|&c| c > 0).unwrap_or(0);
    if total == cdf_min {
        return;
    }

    let mut lut = [0u8; 256];
    let mut cumulative = 0u64;
    let range = (total - cdf_min) as f64;
    for (value, count) in histogram.iter().enumerate() {
        cumulative += count;
        let scaled = (cumulative.saturating_sub(cdf_min)) as f64 * 255.0 / range;
        lut[value] = scaled.round().clamp(0.0, 255.0) as u8;
    }

    for pixel in gray.pixels_mut() {
        pixel.0[0] = lut[usize::from(pixel.0[0])];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn test_equalize_stretches_narrow_range() {
        let mut gray = GrayImage::from_fn(4, 1, |x, _| Luma([100 + x as u8]));
        equalize_histogram(&mut gray);
        let values: Vec<u8> = gray.pixels().map(|p| p.0[0]).collect();
        assert_eq!(values.first(), Some(&0));
        assert_eq!(values.last(), Some(&255));
        assert!(values.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_equalize_flat_image_unchanged() {
        let mut gray = GrayImage::from_pixel(8, 8, Luma([77]));
        equalize_histogram(&mut gray);
        assert!(gray.pixels().all(|p| p.0[0] == 77));
    }

    #[test]
    fn test_equalized_grayscale_dimensions() {
        let frame = RgbImage::from_fn(32, 24, |x, y| Rgb([x as u8 * 8, y as u8 * 10, 0]));
        let gray = equalized_grayscale(&frame);
        assert_eq!(gray.dimensions(), (32, 24));
    }
}
