//! EXIF orientation normalization

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use exif::{In, Tag};
use image::DynamicImage;
use tracing::debug;

/// Orientation recorded in a file's EXIF data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    Normal,
    MirroredHorizontal,
    CW180,
    MirroredVertical,
    MirroredHorizontalAnd270CW,
    CW90,
    MirroredHorizontalAnd90CW,
    CW270,
}

impl Orientation {
    /// Read the orientation tag from `path`.
    ///
    /// Missing or unreadable EXIF data is not an error: the image is taken
    /// to be stored upright.
    pub fn from_path(path: &Path) -> Self {
        match read_orientation_tag(path) {
            Ok(Some(value)) => value.into(),
            Ok(None) => Self::Normal,
            Err(e) => {
                debug!("No usable EXIF orientation in {:?}: {}", path, e);
                Self::Normal
            }
        }
    }

    /// Rotate/flip the decoded pixels so they display upright
    #[must_use]
    pub fn apply(self, img: DynamicImage) -> DynamicImage {
        match self {
            Self::Normal => img,
            Self::CW90 => img.rotate90(),
            Self::CW180 => img.rotate180(),
            Self::CW270 => img.rotate270(),
            Self::MirroredHorizontal => img.fliph(),
            Self::MirroredVertical => img.flipv(),
            Self::MirroredHorizontalAnd90CW => img.fliph().rotate90(),
            Self::MirroredHorizontalAnd270CW => img.fliph().rotate270(),
        }
    }
}

impl From<u32> for Orientation {
    fn from(value: u32) -> Self {
        match value {
            2 => Self::MirroredHorizontal,
            3 => Self::CW180,
            4 => Self::MirroredVertical,
            5 => Self::MirroredHorizontalAnd270CW,
            6 => Self::CW90,
            7 => Self::MirroredHorizontalAnd90CW,
            8 => Self::CW270,
            _ => Self::Normal,
        }
    }
}

fn read_orientation_tag(path: &Path) -> Result<Option<u32>, exif::Error> {
    let mut reader = BufReader::new(File::open(path)?);
    let exif = exif::Reader::new().read_from_container(&mut reader)?;

    Ok(exif
        .get_field(Tag::Orientation, In::PRIMARY)
        .and_then(|field| field.value.get_uint(0)))
}

/// Decode-time orientation correction: read the tag and apply it
pub fn auto_orient(path: &Path, img: DynamicImage) -> DynamicImage {
    let orientation = Orientation::from_path(path);
    if orientation != Orientation::Normal {
        debug!("Applying EXIF orientation {:?} to {:?}", orientation, path);
    }
    orientation.apply(img)
}
