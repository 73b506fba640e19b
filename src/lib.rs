//! Duplicate and near-duplicate image detection engine.
//!
//! The pipeline walks a directory, analyzes every image in parallel
//! (SHA-256 content hash, 64-bit DCT perceptual hash, quality metadata)
//! through a persistent SQLite cache, then groups duplicates two ways:
//! byte-exact by content hash and visually similar by Hamming distance
//! over perceptual hashes, accelerated by a bit-sampling LSH index on
//! large collections. Group members are ranked by a deterministic quality
//! score so callers can keep the best copy.

pub mod config;
pub mod decoder;
pub mod dedupe;
pub mod engine;
pub mod error;
pub mod model;
pub mod progress;
pub mod quality;
pub mod scanner;
pub mod storage;

pub use config::{LshMode, ScanMode};
pub use decoder::{DecodeError, DecodedImage, ImageDecoder, StandardDecoder};
pub use engine::{ScanEngine, ScanOptions, ScanResult};
pub use error::{Error, FileErrorKind};
pub use model::{Analysis, DuplicateGroup, ErrorRecord, FormatTag, GroupKind, ImageRecord};
pub use progress::{AnalysisProgress, ProgressReporter, SilentReporter};
pub use storage::{CacheStats, ImageCache};
