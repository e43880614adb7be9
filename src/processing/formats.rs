//! Input extension allow-list and format classification

use std::collections::HashSet;
use std::path::Path;

/// Raster and container formats accepted as input
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "tif", "tiff", "jpg", "jpeg", "png", "bmp", "gif", "webp", "heic", "heif", "psd", "psb", "svg",
];

/// Camera raw formats accepted as input
pub const RAW_EXTENSIONS: &[&str] = &[
    "3fr", "ari", "arw", "bay", "crw", "cr2", "cr3", "cap", "dcs", "dcr", "dng", "drf", "eip",
    "erf", "fff", "gpr", "iiq", "k25", "kdc", "mdc", "mef", "mos", "mrw", "nef", "nrw", "obm",
    "orf", "pef", "ptx", "pxn", "r3d", "raf", "raw", "rwl", "rw2", "rwz", "sr2", "srf", "srw",
    "x3f",
];

/// Extensions whose files are already JPEG streams
const JPEG_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// Rough family of a source file, by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Jpeg,
    Raster,
    Raw,
}

/// Case-insensitive set of accepted extensions, stored without the leading dot
#[derive(Debug, Clone)]
pub struct ExtensionAllowList {
    extensions: HashSet<String>,
}

impl ExtensionAllowList {
    /// Build an allow-list from arbitrary extensions (with or without a dot)
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| normalize_extension(ext.as_ref()))
                .filter(|ext| !ext.is_empty())
                .collect(),
        }
    }

    /// Add extra extensions on top of the current set
    #[must_use]
    pub fn with_extra<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions
            .extend(extra.into_iter().map(|ext| normalize_extension(ext.as_ref())));
        self
    }

    pub fn contains(&self, extension: &str) -> bool {
        self.extensions.contains(&normalize_extension(extension))
    }

    /// Whether `path` carries an accepted extension
    pub fn matches(&self, path: &Path) -> bool {
        extension_of(path).is_some_and(|ext| self.extensions.contains(&ext))
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

impl Default for ExtensionAllowList {
    fn default() -> Self {
        Self::new(IMAGE_EXTENSIONS.iter().chain(RAW_EXTENSIONS))
    }
}

/// Lowercased extension of `path`, without the dot
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Classify an extension (already lowercased)
pub fn source_kind(extension: &str) -> SourceKind {
    if JPEG_EXTENSIONS.contains(&extension) {
        SourceKind::Jpeg
    } else if RAW_EXTENSIONS.contains(&extension) {
        SourceKind::Raw
    } else {
        SourceKind::Raster
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}
