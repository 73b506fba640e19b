use serde::{Deserialize, Serialize};

/// Extensions treated as images during discovery. Matching is
/// case-insensitive; entries are stored lowercase.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    // Common formats
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "tif",
    // RAW formats
    "raw", "cr2", "cr3", "nef", "arw", "dng", "raf", "orf", "rw2",
    // Modern formats
    "heic", "heif", "avif", "jxl",
];

pub fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(ext))
}

/// Default Hamming-distance cutoff for perceptual matching (0..=64).
pub const DEFAULT_THRESHOLD: u32 = 10;

/// Default number of analyzer worker threads.
pub const DEFAULT_WORKERS: usize = 4;

/// Collection size at which perceptual grouping switches from brute force
/// to the LSH index when the mode is [`LshMode::Auto`].
pub const LSH_AUTO_THRESHOLD: usize = 5000;

/// Seed for the LSH bit-sampling permutations. Fixed so two runs over the
/// same inputs produce identical candidate sets.
pub const LSH_SEED: u64 = 42;

/// The LSH parameter schedule is tuned for thresholds up to this distance;
/// larger cutoffs degrade recall and are logged as a warning.
pub const LSH_TUNED_MAX_DISTANCE: u32 = 10;

/// Which grouping stages a scan runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    ExactOnly,
    PerceptualOnly,
    Both,
}

/// Candidate-enumeration strategy for perceptual grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LshMode {
    /// LSH for collections of at least [`LSH_AUTO_THRESHOLD`] hashes,
    /// brute force below that.
    Auto,
    ForceOn,
    ForceOff,
}
