//! Source directory scanning

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{JpegFitError, Result};
use crate::processing::formats::{extension_of, source_kind, ExtensionAllowList, SourceKind};

/// Extension every output file gets
pub const OUTPUT_EXTENSION: &str = "jpg";

/// One file to transcode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageJob {
    source: PathBuf,
    extension: String,
    destination: PathBuf,
}

impl ImageJob {
    /// Build a job for `source`, writing `<stem>.jpg` into `output_dir`
    pub fn new(source: impl Into<PathBuf>, output_dir: &Path) -> Self {
        let source = source.into();
        let extension = extension_of(&source).unwrap_or_default();
        let mut file_name = source.file_stem().map(ToOwned::to_owned).unwrap_or_default();
        file_name.push(".");
        file_name.push(OUTPUT_EXTENSION);
        let destination = output_dir.join(file_name);

        Self {
            source,
            extension,
            destination,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Lowercased source extension, without the dot
    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Source file name, for messages
    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }

    pub fn source_kind(&self) -> SourceKind {
        source_kind(&self.extension)
    }

    pub fn is_jpeg(&self) -> bool {
        self.source_kind() == SourceKind::Jpeg
    }
}

/// List the top-level files in `dir` whose extension is allowed.
///
/// A missing directory yields no jobs. Jobs are sorted by source path so a
/// given directory snapshot always produces the same order.
pub fn discover(dir: &Path, allow_list: &ExtensionAllowList, output_dir: &Path) -> Result<Vec<ImageJob>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("Source directory {:?} does not exist, nothing to do", dir);
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(JpegFitError::SourceDirectory {
                path: dir.to_path_buf(),
                source: e,
            })
        }
    };

    let absolute_dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    let mut sources = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|e| JpegFitError::SourceDirectory {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = absolute_dir.join(entry.file_name());

        // Follows symlinks, so linked files are picked up and subdirectories skipped
        if !path.is_file() {
            continue;
        }

        if allow_list.matches(&path) {
            sources.push(path);
        } else {
            debug!("Skipping {:?}: extension not accepted", path);
        }
    }

    sources.sort();
    info!("Found {} image files in {:?}", sources.len(), dir);

    Ok(sources
        .into_iter()
        .map(|source| ImageJob::new(source, output_dir))
        .collect())
}

/// Number of regular files anywhere under `dir`, accepted or not
pub fn count_files(dir: &Path) -> usize {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .count()
}
