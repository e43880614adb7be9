//! JpegFit - batch transcoder for size-constrained JPEGs
//!
//! Converts every image in a folder into a JPEG that fits a byte budget and
//! a maximum edge length, picking the highest quality that fits. Files are
//! processed in parallel, a single progress line tracks the run, and a bad
//! input only fails its own job.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use jpegfit::{discover, BatchCoordinator, ExtensionAllowList, FileTranscoder, Limits,
//!     ProgressReporter, SessionOutputDirectory};
//!
//! let session = SessionOutputDirectory::starting_now(Path::new("Converted"));
//! let jobs = discover(Path::new("ToConvert"), &ExtensionAllowList::default(), session.path())?;
//!
//! let reporter = Arc::new(ProgressReporter::stdout(&Default::default()));
//! let transcoder = FileTranscoder::new(Limits::default())?;
//! let summary = BatchCoordinator::with_default_threads(transcoder, reporter).run(jobs, &session)?;
//!
//! println!("{} converted, {} failed", summary.success(), summary.failure());
//! # Ok::<(), jpegfit::JpegFitError>(())
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod discovery;
pub mod error;
pub mod parallel;
pub mod processing;

use std::sync::Arc;

// Re-export commonly used types
pub use config::{Config, Limits, LoggingConfig, ProgressConfig};
pub use discovery::{discover, ImageJob};
pub use error::{JpegFitError, Result};
pub use parallel::{BatchCoordinator, BatchCounters, BatchSummary, ProgressReporter, SessionOutputDirectory};
pub use processing::{ExtensionAllowList, FileTranscoder, Transcode, TranscodeOutcome};

use tracing::info;
use tracing_subscriber::EnvFilter;

use parallel::LogSink;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the global tracing subscriber.
///
/// Log lines are written through `reporter` so they share its lock with the
/// progress line. `RUST_LOG` takes precedence over `config.level`. Returns
/// `false` if a subscriber was already installed.
pub fn init_logging(config: &LoggingConfig, reporter: &Arc<ProgressReporter>) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));
    let writer = LogSink::new(Arc::clone(reporter));

    let installed = if config.json_format {
        tracing::subscriber::set_global_default(
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(writer)
                .finish(),
        )
    } else {
        tracing::subscriber::set_global_default(
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(console::colors_enabled())
                .with_writer(writer)
                .finish(),
        )
    }
    .is_ok();

    if installed {
        info!("JpegFit v{} initialized", VERSION);
    }
    installed
}
