//! Timestamped output folder for one run

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::info;

use crate::error::{JpegFitError, Result};

/// Folder name format, e.g. `2024-05-01_14-03-59`
pub const SESSION_DIR_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// The `<output root>/<start timestamp>` folder a run writes into.
///
/// The path is fixed when the run starts; the folder itself is only created
/// once there is something to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutputDirectory {
    path: PathBuf,
}

impl SessionOutputDirectory {
    /// Session folder for a run starting now
    pub fn starting_now(output_root: &Path) -> Self {
        Self::at(output_root, Local::now())
    }

    /// Session folder for a run that started at `started`
    pub fn at(output_root: &Path, started: DateTime<Local>) -> Self {
        Self {
            path: output_root.join(started.format(SESSION_DIR_FORMAT).to_string()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the folder (and missing parents)
    pub fn create(&self) -> Result<()> {
        fs::create_dir_all(&self.path).map_err(|e| JpegFitError::OutputDirectory {
            path: self.path.clone(),
            source: e,
        })?;
        info!("Writing output to {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_folder_name_from_timestamp() {
        let started = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        let session = SessionOutputDirectory::at(Path::new("/converted"), started);
        assert_eq!(session.path(), Path::new("/converted/2024-03-07_09-05-01"));
    }

    #[test]
    fn test_create_nests_under_root() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path().join("Converted");
        let session = SessionOutputDirectory::starting_now(&root);
        assert!(!session.path().exists());

        session.create().unwrap();
        assert!(session.path().is_dir());
        assert_eq!(session.path().parent(), Some(root.as_path()));
        // Creating again is harmless
        session.create().unwrap();
    }

    #[test]
    fn test_create_fails_under_a_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let blocker = tmp.path().join("Converted");
        fs::write(&blocker, b"not a folder").unwrap();

        let err = SessionOutputDirectory::starting_now(&blocker).create().unwrap_err();
        assert!(matches!(err, JpegFitError::OutputDirectory { .. }));
        assert!(!err.is_recoverable());
    }
}
