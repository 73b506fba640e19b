//! Parallel analysis driver.
//!
//! Shape: one feeder thread walks discovery into a bounded channel, N
//! worker threads analyze (consulting the cache), and the calling thread is
//! the sole collector. Only the collector touches the result buffers and
//! the progress reporter, so workers need no shared locks.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use crossbeam_channel::bounded;
use tracing::{debug, warn};

use crate::decoder::ImageDecoder;
use crate::error::FileErrorKind;
use crate::model::{Analysis, ErrorRecord, ImageRecord};
use crate::progress::{ProgressMeter, ProgressReporter};
use crate::scanner::analyze::{analyze_file, mtime_nanos};
use crate::storage::ImageCache;

/// Input queue depth per worker; bounds memory while keeping workers fed.
const QUEUE_FACTOR: usize = 4;

struct WorkerOutcome {
    analysis: Analysis,
    cache_hit: bool,
    cache_degraded: bool,
}

pub struct DriveOutcome {
    pub records: Vec<ImageRecord>,
    pub errors: Vec<ErrorRecord>,
    pub found: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cache_degraded: bool,
    pub cancelled: bool,
}

/// Fan `paths` across `workers` analyzer threads and collect the outcomes.
///
/// Cancellation is cooperative: the feeder and each worker check the flag
/// between files, in-flight analyses run to completion, and everything
/// collected so far remains valid.
pub fn analyze_paths<I>(
    paths: I,
    decoder: &dyn ImageDecoder,
    cache: Option<&ImageCache>,
    workers: usize,
    reporter: &dyn ProgressReporter,
    cancel: &AtomicBool,
) -> DriveOutcome
where
    I: Iterator<Item = PathBuf> + Send,
{
    let workers = workers.max(1);
    let found = AtomicUsize::new(0);

    let mut records = Vec::new();
    let mut errors = Vec::new();
    let mut cache_hits = 0usize;
    let mut cache_misses = 0usize;
    let mut cache_degraded = false;

    thread::scope(|scope| {
        let (path_tx, path_rx) = bounded::<PathBuf>(workers * QUEUE_FACTOR);
        let (out_tx, out_rx) = bounded::<WorkerOutcome>(workers * QUEUE_FACTOR);

        let found_ref = &found;
        scope.spawn(move || {
            for path in paths {
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
                found_ref.fetch_add(1, Ordering::Relaxed);
                if path_tx.send(path).is_err() {
                    break;
                }
            }
        });

        for _ in 0..workers {
            let path_rx = path_rx.clone();
            let out_tx = out_tx.clone();
            scope.spawn(move || {
                while let Ok(path) = path_rx.recv() {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    let outcome = process_one(path, decoder, cache);
                    if out_tx.send(outcome).is_err() {
                        break;
                    }
                }
            });
        }
        drop(path_rx);
        drop(out_tx);

        let mut meter = ProgressMeter::new();
        let mut analyzed = 0usize;
        for outcome in out_rx.iter() {
            analyzed += 1;
            match outcome.analysis {
                Analysis::Complete(record) => records.push(record),
                Analysis::Partial(record, error) => {
                    records.push(record);
                    errors.push(error);
                }
                Analysis::Failed(error) => errors.push(error),
            }
            if outcome.cache_hit {
                cache_hits += 1;
            } else {
                cache_misses += 1;
            }
            if outcome.cache_degraded && !cache_degraded {
                cache_degraded = true;
                warn!("Cache storage error; continuing without caching for affected files");
            }

            if let Some(progress) = meter.tick(
                found.load(Ordering::Relaxed),
                analyzed,
                cache_hits,
                errors.len(),
            ) {
                reporter.on_analysis_progress(&progress);
            }
        }

        let final_progress = meter.finish(
            found.load(Ordering::Relaxed),
            analyzed,
            cache_hits,
            errors.len(),
        );
        reporter.on_analysis_complete(&final_progress);
    });

    let cancelled = cancel.load(Ordering::Relaxed);
    debug!(
        "Analysis complete: {} records, {} errors, {} cache hits, cancelled={}",
        records.len(),
        errors.len(),
        cache_hits,
        cancelled
    );

    DriveOutcome {
        records,
        errors,
        found: found.into_inner(),
        cache_hits,
        cache_misses,
        cache_degraded,
        cancelled,
    }
}

fn process_one(
    path: PathBuf,
    decoder: &dyn ImageDecoder,
    cache: Option<&ImageCache>,
) -> WorkerOutcome {
    let metadata = match std::fs::metadata(&path) {
        Ok(m) => m,
        Err(err) => {
            return WorkerOutcome {
                analysis: Analysis::Failed(ErrorRecord::new(
                    path,
                    FileErrorKind::Io,
                    format!("stat failed: {err}"),
                )),
                cache_hit: false,
                cache_degraded: false,
            };
        }
    };
    let size_bytes = metadata.len();
    let mtime_ns = match metadata.modified() {
        Ok(mtime) => mtime_nanos(mtime),
        Err(err) => {
            return WorkerOutcome {
                analysis: Analysis::Failed(ErrorRecord::new(
                    path,
                    FileErrorKind::Io,
                    format!("mtime unavailable: {err}"),
                )),
                cache_hit: false,
                cache_degraded: false,
            };
        }
    };

    match cache {
        Some(cache) => {
            let result = cache.get_or_compute(&path, size_bytes, mtime_ns, || {
                analyze_file(&path, size_bytes, mtime_ns, decoder)
            });
            WorkerOutcome {
                analysis: result.analysis,
                cache_hit: result.hit,
                cache_degraded: result.degraded,
            }
        }
        None => WorkerOutcome {
            analysis: analyze_file(&path, size_bytes, mtime_ns, decoder),
            cache_hit: false,
            cache_degraded: false,
        },
    }
}
