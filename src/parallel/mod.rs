//! Concurrent batch execution with failure isolation and live progress

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::discovery::ImageJob;
use crate::error::{JpegFitError, Result};
use crate::processing::{Transcode, TranscodeOutcome};

pub mod progress;
pub mod session;

pub use progress::*;
pub use session::*;

/// Per-run tallies.
///
/// Owned by the coordinating thread; workers report completions over a
/// channel and never touch these directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchCounters {
    pub total: usize,
    pub processed: usize,
    pub success: usize,
    pub failure: usize,
    /// Successes that came with a warning (subset of `success`)
    pub warnings: usize,
}

impl BatchCounters {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Count one finished job
    pub fn record(&mut self, outcome: &TranscodeOutcome) {
        debug_assert!(self.processed < self.total, "more completions than jobs");
        self.processed += 1;
        match outcome {
            TranscodeOutcome::Success => self.success += 1,
            TranscodeOutcome::SuccessWithWarning(_) => {
                self.success += 1;
                self.warnings += 1;
            }
            TranscodeOutcome::Failure(_) => self.failure += 1,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.processed == self.total
    }
}

/// Result of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    #[serde(flatten)]
    pub counters: BatchCounters,
    /// Session folder, if anything was dispatched
    pub output_dir: Option<PathBuf>,
    #[serde(serialize_with = "serialize_secs", rename = "elapsed_secs")]
    pub elapsed: Duration,
}

impl BatchSummary {
    fn empty() -> Self {
        Self {
            counters: BatchCounters::default(),
            output_dir: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn success(&self) -> usize {
        self.counters.success
    }

    pub fn failure(&self) -> usize {
        self.counters.failure
    }

    pub fn processed(&self) -> usize {
        self.counters.processed
    }
}

fn serialize_secs<S: serde::Serializer>(elapsed: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}

/// A finished job on its way back to the coordinator
struct Completion {
    job: ImageJob,
    outcome: TranscodeOutcome,
}

/// Runs a transcoder over many jobs on a worker pool
pub struct BatchCoordinator<T> {
    transcoder: T,
    reporter: Arc<ProgressReporter>,
    threads: usize,
}

impl<T: Transcode> BatchCoordinator<T> {
    /// Create a coordinator with `threads` workers
    pub fn new(transcoder: T, reporter: Arc<ProgressReporter>, threads: usize) -> Self {
        Self {
            transcoder,
            reporter,
            threads: threads.max(1),
        }
    }

    /// Create a coordinator sized to the host's parallelism
    pub fn with_default_threads(transcoder: T, reporter: Arc<ProgressReporter>) -> Self {
        Self::new(transcoder, reporter, num_cpus::get())
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Transcode every job into `session`.
    ///
    /// The session folder is created before the first dispatch, and only if
    /// there is at least one job. Per-job errors and panics become `Failure`
    /// outcomes; only setup errors end the run early.
    pub fn run(&self, jobs: Vec<ImageJob>, session: &SessionOutputDirectory) -> Result<BatchSummary> {
        if jobs.is_empty() {
            info!("No jobs to run");
            return Ok(BatchSummary::empty());
        }

        let start = Instant::now();
        session.create()?;
        warn_on_collisions(&jobs);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("jpegfit-worker-{i}"))
            .build()
            .map_err(|e| JpegFitError::thread_pool(e.to_string()))?;

        let mut counters = BatchCounters::new(jobs.len());
        info!("Starting {} jobs on {} workers", counters.total, self.threads);
        self.show(&counters);

        let (sender, receiver) = channel::unbounded::<Completion>();
        let transcoder = &self.transcoder;

        thread::scope(|scope| {
            scope.spawn(move || {
                pool.install(|| {
                    jobs.into_par_iter().for_each_with(sender, |sender, job| {
                        let outcome = transcode_isolated(transcoder, &job);
                        // The receiver lives until every sender is gone
                        let _ = sender.send(Completion { job, outcome });
                    });
                });
            });

            for completion in &receiver {
                self.complete(&mut counters, &completion);
            }
        });

        if let Err(e) = self.reporter.finish() {
            debug!("Progress output failed: {}", e);
        }

        let elapsed = start.elapsed();
        info!(
            "Finished: {} succeeded, {} failed in {:.2}s",
            counters.success,
            counters.failure,
            elapsed.as_secs_f64()
        );

        Ok(BatchSummary {
            counters,
            output_dir: Some(session.path().to_path_buf()),
            elapsed,
        })
    }

    /// Record one completion, then report it, as a single step
    fn complete(&self, counters: &mut BatchCounters, completion: &Completion) {
        counters.record(&completion.outcome);
        debug!("{}: {}", completion.job.file_name(), completion.outcome);

        if let Some(message) = completion.outcome.message() {
            let tag = if completion.outcome.is_success() { "Warning" } else { "Error" };
            if let Err(e) = self.reporter.emit(&format!("{tag}: {message}")) {
                debug!("Console output failed: {}", e);
            }
        }
        self.show(counters);
    }

    fn show(&self, counters: &BatchCounters) {
        if let Err(e) = self.reporter.update(counters.processed, counters.total) {
            debug!("Progress output failed: {}", e);
        }
    }
}

/// Run one job, turning a panic into a `Failure`
fn transcode_isolated<T: Transcode>(transcoder: &T, job: &ImageJob) -> TranscodeOutcome {
    panic::catch_unwind(AssertUnwindSafe(|| transcoder.transcode(job))).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());

        TranscodeOutcome::Failure(JpegFitError::WorkerPanic {
            file: job.source().to_path_buf(),
            message,
        })
    })
}

/// Sources sharing a stem write the same file; the last one to finish wins
fn warn_on_collisions(jobs: &[ImageJob]) {
    let mut by_destination: HashMap<_, Vec<String>> = HashMap::new();
    for job in jobs {
        by_destination
            .entry(job.destination())
            .or_default()
            .push(job.file_name());
    }

    for (destination, sources) in by_destination {
        if sources.len() > 1 {
            warn!(
                "{} all write {:?}; only one of them will be kept",
                sources.join(", "),
                destination.file_name().unwrap_or_default()
            );
        }
    }
}
