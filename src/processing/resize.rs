//! Downscaling into a square bounding box

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Available resize filters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    /// Nearest neighbor (fastest, lowest quality)
    Nearest,
    /// Triangle (linear interpolation)
    Triangle,
    /// Catmull-Rom cubic spline
    CatmullRom,
    /// Gaussian blur
    Gaussian,
    /// Lanczos with radius 3 (high quality, recommended)
    #[default]
    Lanczos3,
}

impl From<FilterType> for image::imageops::FilterType {
    fn from(filter: FilterType) -> Self {
        match filter {
            FilterType::Nearest => image::imageops::FilterType::Nearest,
            FilterType::Triangle => image::imageops::FilterType::Triangle,
            FilterType::CatmullRom => image::imageops::FilterType::CatmullRom,
            FilterType::Gaussian => image::imageops::FilterType::Gaussian,
            FilterType::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

/// Shrinks images that exceed a maximum edge length
#[derive(Debug, Clone, Copy)]
pub struct ImageResizer {
    max_dimension: u32,
    filter: FilterType,
}

impl ImageResizer {
    pub fn new(max_dimension: u32, filter: FilterType) -> Self {
        Self {
            max_dimension,
            filter,
        }
    }

    /// Whether either edge of a `width` x `height` image is over the limit
    pub fn needs_resize(&self, width: u32, height: u32) -> bool {
        width > self.max_dimension || height > self.max_dimension
    }

    /// Shrink `image` so neither edge exceeds the limit.
    ///
    /// Both bounds are handed to `DynamicImage::resize`, which keeps the
    /// aspect ratio itself. Images already within bounds are returned as is.
    pub fn fit(&self, image: DynamicImage) -> DynamicImage {
        if !self.needs_resize(image.width(), image.height()) {
            return image;
        }

        let resized = image.resize(self.max_dimension, self.max_dimension, self.filter.into());

        debug!(
            "Resized {}x{} -> {}x{} using {:?}",
            image.width(),
            image.height(),
            resized.width(),
            resized.height(),
            self.filter
        );

        resized
    }
}
