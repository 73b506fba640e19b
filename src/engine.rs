//! Scan orchestration: discovery → parallel analysis → grouping.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::AHashSet;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{LshMode, ScanMode, DEFAULT_THRESHOLD, DEFAULT_WORKERS};
use crate::decoder::ImageDecoder;
use crate::dedupe::{exact, perceptual};
use crate::error::Error;
use crate::model::{DuplicateGroup, ErrorRecord, GroupKind, ImageRecord};
use crate::progress::ProgressReporter;
use crate::scanner;
use crate::storage::ImageCache;

/// Options for one scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanOptions {
    pub recursive: bool,
    /// Hamming-distance cutoff for perceptual matching, 0..=64.
    pub threshold: u32,
    pub mode: ScanMode,
    pub lsh_mode: LshMode,
    pub use_cache: bool,
    /// Analyzer worker threads, at least 1.
    pub workers: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            recursive: true,
            threshold: DEFAULT_THRESHOLD,
            mode: ScanMode::Both,
            lsh_mode: LshMode::Auto,
            use_cache: true,
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Everything one scan produced.
#[derive(Debug, Serialize)]
pub struct ScanResult {
    pub records: Vec<ImageRecord>,
    pub errors: Vec<ErrorRecord>,
    /// Exact groups first, then perceptual; ids dense across both, order
    /// stable for a given record set and options.
    pub groups: Vec<DuplicateGroup>,
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// A storage error forced at least one cache bypass during this scan.
    pub cache_degraded: bool,
    /// Which grouping stages this scan ran.
    pub mode: ScanMode,
    /// The candidate-enumeration mode that was requested.
    pub lsh_mode: LshMode,
    /// Whether perceptual grouping actually went through the LSH index
    /// (resolves [`LshMode::Auto`] by collection size).
    pub lsh_used: bool,
    /// True when the scan was cancelled; records are whatever finished and
    /// interrupted grouping stages are omitted.
    pub partial: bool,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl ScanResult {
    pub fn exact_groups(&self) -> impl Iterator<Item = &DuplicateGroup> {
        self.groups.iter().filter(|g| g.kind == GroupKind::Exact)
    }

    pub fn perceptual_groups(&self) -> impl Iterator<Item = &DuplicateGroup> {
        self.groups
            .iter()
            .filter(|g| g.kind == GroupKind::Perceptual)
    }

    pub fn potential_savings_bytes(&self) -> u64 {
        self.groups.iter().map(|g| g.potential_savings_bytes).sum()
    }
}

/// The pipeline orchestrator.
///
/// Owns the decoder capability and (optionally) an explicit cache handle;
/// the caller controls the cache lifecycle (`open` → scans → drop).
pub struct ScanEngine {
    decoder: Arc<dyn ImageDecoder>,
    cache: Option<Arc<ImageCache>>,
    cancel: Arc<AtomicBool>,
}

impl ScanEngine {
    pub fn new(decoder: Arc<dyn ImageDecoder>) -> Self {
        ScanEngine {
            decoder,
            cache: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_cache(mut self, cache: Arc<ImageCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The cache handle, for maintenance operations (stats, clear,
    /// cleanup) by the owning collaborator.
    pub fn cache(&self) -> Option<&Arc<ImageCache>> {
        self.cache.as_ref()
    }

    /// Request cooperative cancellation of a running scan.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Shared flag for cancelling from another thread.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run the full pipeline over `root`.
    ///
    /// Fails fast with [`Error::BadArgument`] on an invalid root or
    /// options; per-file problems surface as [`ErrorRecord`]s in the
    /// result instead. Cancellation returns a partial result rather than
    /// an error.
    pub fn scan(
        &self,
        root: &Path,
        options: &ScanOptions,
        reporter: &dyn ProgressReporter,
    ) -> Result<ScanResult, Error> {
        validate(root, options)?;
        // Each scan starts with a fresh token.
        self.cancel.store(false, Ordering::Relaxed);
        let started = Instant::now();

        info!(
            "Scanning {} (recursive={}, threshold={}, workers={})",
            root.display(),
            options.recursive,
            options.threshold,
            options.workers
        );

        // Phase 1+2: discovery feeding parallel analysis
        reporter.on_analysis_start();
        let cache = if options.use_cache {
            self.cache.as_deref()
        } else {
            None
        };
        let drive = scanner::analyze_paths(
            scanner::find_image_files(root, options.recursive),
            &*self.decoder,
            cache,
            options.workers,
            reporter,
            &self.cancel,
        );
        debug!(
            "Analysis phase done in {:.2}s: {} files found, {} records",
            started.elapsed().as_secs_f64(),
            drive.found,
            drive.records.len()
        );

        // The grouping stages work on a path-sorted snapshot so the output
        // is a pure function of the record set.
        let mut records = drive.records;
        records.sort_by(|a, b| a.path.cmp(&b.path));

        let mut result = ScanResult {
            records,
            errors: drive.errors,
            groups: Vec::new(),
            cache_hits: drive.cache_hits,
            cache_misses: drive.cache_misses,
            cache_degraded: drive.cache_degraded,
            mode: options.mode,
            lsh_mode: options.lsh_mode,
            lsh_used: false,
            partial: drive.cancelled,
            elapsed: started.elapsed(),
        };
        if drive.cancelled {
            info!("Scan cancelled during analysis; returning partial result");
            result.elapsed = started.elapsed();
            return Ok(result);
        }

        // Phase 3: exact grouping
        let mut exclude = AHashSet::new();
        if options.mode != ScanMode::PerceptualOnly {
            reporter.on_grouping_start(GroupKind::Exact);
            let outcome = exact::find_exact_groups(&result.records);
            reporter.on_grouping_complete(GroupKind::Exact, outcome.groups.len());
            exclude = outcome.member_paths;
            result.groups = outcome.groups;
        }

        // Phase 4: perceptual grouping, excluding exact members
        if options.mode != ScanMode::ExactOnly {
            reporter.on_grouping_start(GroupKind::Perceptual);
            let start_id = result.groups.len() as u32 + 1;
            let outcome = perceptual::find_perceptual_groups(
                &result.records,
                options.threshold,
                &exclude,
                options.lsh_mode,
                start_id,
                &self.cancel,
            );
            result.lsh_used = outcome.lsh_used;
            if outcome.cancelled {
                info!("Scan cancelled during grouping; returning partial result");
                result.partial = true;
                result.elapsed = started.elapsed();
                return Ok(result);
            }
            reporter.on_grouping_complete(GroupKind::Perceptual, outcome.groups.len());
            result.groups.extend(outcome.groups);
        }

        result.elapsed = started.elapsed();
        info!(
            "Scan complete in {:.2}s: {} records, {} groups, {} errors",
            result.elapsed.as_secs_f64(),
            result.records.len(),
            result.groups.len(),
            result.errors.len()
        );
        Ok(result)
    }
}

fn validate(root: &Path, options: &ScanOptions) -> Result<(), Error> {
    if !root.is_absolute() {
        return Err(Error::BadArgument(format!(
            "root must be an absolute path: {}",
            root.display()
        )));
    }
    if !root.exists() {
        return Err(Error::BadArgument(format!(
            "root does not exist: {}",
            root.display()
        )));
    }
    if !root.is_dir() {
        return Err(Error::BadArgument(format!(
            "root is not a directory: {}",
            root.display()
        )));
    }
    if options.threshold > 64 {
        return Err(Error::BadArgument(format!(
            "threshold must be within 0..=64, got {}",
            options.threshold
        )));
    }
    if options.workers == 0 {
        return Err(Error::BadArgument("workers must be at least 1".to_string()));
    }
    Ok(())
}
