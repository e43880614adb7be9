//! Error types and handling for JpegFit

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for JpegFit operations
pub type Result<T> = std::result::Result<T, JpegFitError>;

/// Main error type for JpegFit operations
#[derive(Debug, Error)]
pub enum JpegFitError {
    /// Source file could not be read or is not a decodable image
    #[error("Failed to decode {file:?}: {source}")]
    Decode {
        file: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Codec failure while encoding the output
    #[error("Failed to encode {file:?}: {source}")]
    Encode {
        file: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// File-level I/O failure (reading a source, writing a destination)
    #[error("I/O error on {file:?}: {source}")]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Source directory exists but cannot be listed
    #[error("Cannot read source directory {path:?}: {source}")]
    SourceDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Session output directory cannot be created
    #[error("Cannot create output directory {path:?}: {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Worker pool could not be started
    #[error("Failed to start worker pool: {message}")]
    ThreadPool { message: String },

    /// A worker panicked while processing one file
    #[error("Worker panicked on {file:?}: {message}")]
    WorkerPanic { file: PathBuf, message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Invalid transcoding parameters
    #[error("Invalid parameters: {message}")]
    InvalidParameters { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serde(String),
}

impl JpegFitError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new invalid parameters error
    pub fn invalid_parameters<S: Into<String>>(message: S) -> Self {
        Self::InvalidParameters {
            message: message.into(),
        }
    }

    pub fn io(file: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            file: file.into(),
            source,
        }
    }

    pub fn decode(file: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Decode {
            file: file.into(),
            source,
        }
    }

    pub fn encode(file: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Encode {
            file: file.into(),
            source,
        }
    }

    pub fn thread_pool<S: Into<String>>(message: S) -> Self {
        Self::ThreadPool {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (the batch can continue)
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Per-job failures: counted and reported, siblings keep running
            Self::Decode { .. }
            | Self::Encode { .. }
            | Self::Io { .. }
            | Self::WorkerPanic { .. } => true,

            // Directory and setup failures stop the whole run
            Self::SourceDirectory { .. }
            | Self::OutputDirectory { .. }
            | Self::ThreadPool { .. }
            | Self::Config { .. }
            | Self::InvalidParameters { .. }
            | Self::Serde(_) => false,
        }
    }

    /// Get the associated file path if available
    pub fn file_path(&self) -> Option<&Path> {
        match self {
            Self::Decode { file, .. }
            | Self::Encode { file, .. }
            | Self::Io { file, .. }
            | Self::WorkerPanic { file, .. } => Some(file),

            Self::SourceDirectory { path, .. } | Self::OutputDirectory { path, .. } => Some(path),

            _ => None,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        let name = self
            .file_path()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match self {
            Self::Decode { source, .. } => format!("{name}: not a readable image ({source})"),
            Self::Encode { source, .. } => format!("{name}: JPEG encoding failed ({source})"),
            Self::Io { source, .. } => format!("{name}: file system error ({source})"),
            Self::WorkerPanic { message, .. } => format!("{name}: internal error ({message})"),
            Self::SourceDirectory { path, source } => format!(
                "Cannot read source folder {}: {source}",
                path.display()
            ),
            Self::OutputDirectory { path, source } => format!(
                "Cannot create output folder {}: {source}",
                path.display()
            ),
            other => other.to_string(),
        }
    }
}

impl From<toml::de::Error> for JpegFitError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serde(format!("TOML parsing error: {err}"))
    }
}

impl From<serde_yaml::Error> for JpegFitError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serde(format!("YAML parsing error: {err}"))
    }
}

/// Error context extension for attaching the file a failure happened on
pub trait ErrorContext<T> {
    /// Treat an I/O failure as belonging to `file`
    fn with_file_context(self, file: &Path) -> Result<T>;
}

impl<T> ErrorContext<T> for std::result::Result<T, std::io::Error> {
    fn with_file_context(self, file: &Path) -> Result<T> {
        self.map_err(|e| JpegFitError::io(file, e))
    }
}

/// Same as [`ErrorContext`], for codec results where the stage matters.
pub trait CodecContext<T> {
    fn decode_context(self, file: &Path) -> Result<T>;
    fn encode_context(self, file: &Path) -> Result<T>;
}

impl<T> CodecContext<T> for std::result::Result<T, image::ImageError> {
    fn decode_context(self, file: &Path) -> Result<T> {
        self.map_err(|e| JpegFitError::decode(file, e))
    }

    fn encode_context(self, file: &Path) -> Result<T> {
        self.map_err(|e| JpegFitError::encode(file, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_found() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::NotFound, "gone")
    }

    #[test]
    fn test_error_creation() {
        let err = JpegFitError::config("test message");
        assert!(matches!(err, JpegFitError::Config { .. }));
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(JpegFitError::io("a.png", not_found()).is_recoverable());
        assert!(!JpegFitError::OutputDirectory {
            path: PathBuf::from("/out"),
            source: not_found(),
        }
        .is_recoverable());
        assert!(!JpegFitError::thread_pool("boom").is_recoverable());
    }

    #[test]
    fn test_user_message_names_file() {
        let err = JpegFitError::io("/some/dir/holiday.png", not_found());
        let msg = err.user_message();
        assert!(msg.starts_with("holiday.png"));
        assert!(msg.contains("gone"));
    }

    #[test]
    fn test_file_context() {
        let result: std::result::Result<(), _> = Err(not_found());
        let err = result.with_file_context(Path::new("test.jpg")).unwrap_err();
        assert_eq!(err.file_path(), Some(Path::new("test.jpg")));
    }
}
