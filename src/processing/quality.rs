//! Highest-quality-that-fits search over JPEG encodings

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tracing::{debug, trace};

use crate::error::{JpegFitError, Result};

/// Something that can be encoded as a JPEG at a given quality.
///
/// Implemented for [`DynamicImage`]; the search itself only sees encoded
/// bytes, so any encoder that produces them can be plugged in.
pub trait JpegEncode {
    type Error;

    fn encode_jpeg(&self, quality: u8) -> std::result::Result<Vec<u8>, Self::Error>;
}

impl JpegEncode for DynamicImage {
    type Error = image::ImageError;

    fn encode_jpeg(&self, quality: u8) -> std::result::Result<Vec<u8>, Self::Error> {
        let mut buffer = Cursor::new(Vec::new());
        let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
        self.write_with_encoder(encoder)?;
        Ok(buffer.into_inner())
    }
}

/// Inclusive quality bounds for a search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityRange {
    min: u8,
    max: u8,
}

impl QualityRange {
    pub fn new(min: u8, max: u8) -> Result<Self> {
        if min == 0 || max > 100 || min > max {
            return Err(JpegFitError::invalid_parameters(format!(
                "Quality range {min}..={max} must satisfy 1 <= min <= max <= 100"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn min(self) -> u8 {
        self.min
    }

    pub fn max(self) -> u8 {
        self.max
    }
}

impl Default for QualityRange {
    fn default() -> Self {
        Self { min: 50, max: 100 }
    }
}

/// Outcome of a quality search
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Quality of the returned encoding
    pub quality: u8,
    /// The encoding itself, ready to be written out
    pub encoded: Vec<u8>,
    /// Whether `encoded` fits in the byte budget
    pub met_budget: bool,
    /// Number of encodes performed
    pub attempts: u32,
}

impl SearchResult {
    pub fn size(&self) -> u64 {
        self.encoded.len() as u64
    }
}

/// Find the highest quality in `range` whose encoding is at most `max_bytes`.
///
/// Qualities are tried from `range.max()` downwards one step at a time and the
/// first one that fits wins. Encoded size is only roughly monotonic in
/// quality, so bisection could skip a fitting quality near the boundary.
/// When nothing fits, the encoding at `range.min()` is returned with
/// `met_budget == false`.
pub fn search<E>(image: &E, max_bytes: u64, range: QualityRange) -> std::result::Result<SearchResult, E::Error>
where
    E: JpegEncode + ?Sized,
{
    let mut attempts = 0;
    let mut quality = range.max;

    loop {
        let encoded = image.encode_jpeg(quality)?;
        attempts += 1;
        let size = encoded.len() as u64;
        trace!("quality {} -> {} bytes", quality, size);

        if size <= max_bytes {
            debug!("Quality {} fits {} <= {} after {} attempts", quality, size, max_bytes, attempts);
            return Ok(SearchResult {
                quality,
                encoded,
                met_budget: true,
                attempts,
            });
        }

        if quality <= range.min {
            debug!("Budget {} unmet at minimum quality {} ({} bytes)", max_bytes, quality, size);
            return Ok(SearchResult {
                quality,
                encoded,
                met_budget: false,
                attempts,
            });
        }

        quality -= 1;
    }
}
