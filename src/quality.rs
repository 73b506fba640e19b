//! Quality scoring used to rank members inside a duplicate group.
//!
//! The score is deterministic and bounded to `[0, 110]`: up to 50 points
//! for resolution, 30 for file size, 10 for bit depth, and 20 for the
//! container format.

use std::cmp::Ordering;

use crate::model::{FormatTag, ImageRecord};

/// Points awarded for the container format. Lossless and RAW formats rank
/// higher than lossy ones.
pub fn format_points(tag: FormatTag) -> f64 {
    match tag {
        FormatTag::Raw => 20.0,
        FormatTag::Png | FormatTag::Tiff => 17.0,
        FormatTag::Webp | FormatTag::Jpeg | FormatTag::Heif => 12.0,
        FormatTag::Bmp => 10.0,
        FormatTag::Gif => 5.0,
        FormatTag::Other => 0.0,
    }
}

pub fn quality_score(record: &ImageRecord) -> f64 {
    let resolution = (record.pixel_count() as f64 / 1_000_000.0 * 2.0).min(50.0);
    let filesize = (record.size_bytes as f64 / 1_048_576.0 * 3.0).min(30.0);
    let bitdepth = (record.bit_depth as f64 / 3.2).min(10.0);
    resolution + filesize + bitdepth + format_points(record.format_tag)
}

/// Total order used to sort group members best-first: higher score, then
/// larger pixel count, then larger file, then deeper bit depth, then
/// lexicographically smaller path. Stable across runs.
pub fn cmp_quality(a: &ImageRecord, b: &ImageRecord) -> Ordering {
    quality_score(b)
        .total_cmp(&quality_score(a))
        .then_with(|| b.pixel_count().cmp(&a.pixel_count()))
        .then_with(|| b.size_bytes.cmp(&a.size_bytes))
        .then_with(|| b.bit_depth.cmp(&a.bit_depth))
        .then_with(|| a.path.cmp(&b.path))
}
