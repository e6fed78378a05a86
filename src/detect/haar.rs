//! OpenCV Haar cascade detector

use image::GrayImage;
use opencv::core::{Mat, Rect, Size, Vector};
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;

use super::FaceDetector;
use crate::config::DetectionConfig;
use crate::errors::{Result, SentryError};
use crate::tracking::FaceBox;

pub struct HaarCascadeDetector {
    classifier: CascadeClassifier,
    scale_factor: f64,
    min_neighbors: i32,
    min_size: Size,
}

impl HaarCascadeDetector {
    /// Load the cascade named by `config.model_path`.
    ///
    /// A missing or unreadable model is a [`SentryError::Configuration`].
    pub fn load(config: &DetectionConfig) -> Result<Self> {
        let path = &config.model_path;
        if !path.is_file() {
            return Err(SentryError::Configuration(format!(
                "Face model not found: {}",
                path.display()
            )));
        }
        let path_str = path.to_str().ok_or_else(|| {
            SentryError::Configuration(format!("Face model path is not UTF-8: {}", path.display()))
        })?;

        let classifier = CascadeClassifier::new(path_str).map_err(|e| {
            SentryError::Configuration(format!("Failed to load {}: {}", path.display(), e))
        })?;
        if classifier.empty().unwrap_or(true) {
            return Err(SentryError::Configuration(format!(
                "Face model {} contains no cascade",
                path.display()
            )));
        }

        log::info!("Loaded face cascade {}", path.display());
        Ok(Self {
            classifier,
            scale_factor: config.scale_factor,
            min_neighbors: config.min_neighbors,
            min_size: Size::new(config.min_face_size, config.min_face_size),
        })
    }
}

impl FaceDetector for HaarCascadeDetector {
    fn detect(&mut self, gray: &GrayImage) -> Result<Vec<FaceBox>> {
        let (width, height) = gray.dimensions();
        let mat = Mat::new_rows_cols_with_data(height as i32, width as i32, gray.as_raw())
            .and_then(|m| m.try_clone())
            .map_err(|e| SentryError::Frame(format!("Failed to wrap frame: {}", e)))?;

        let mut found = Vector::<Rect>::new();
        self.classifier
            .detect_multi_scale(
                &mat,
                &mut found,
                self.scale_factor,
                self.min_neighbors,
                0,
                self.min_size,
                Size::new(0, 0),
            )
            .map_err(|e| SentryError::Frame(format!("Detection failed: {}", e)))?;

        Ok(found
            .iter()
            .map(|r| FaceBox::new(r.x, r.y, r.width, r.height))
            .collect())
    }
}
