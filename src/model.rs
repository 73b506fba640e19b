use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::FileErrorKind;

/// Container-format classification of an image file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FormatTag {
    Raw,
    Png,
    Tiff,
    Jpeg,
    Webp,
    Heif,
    Gif,
    Bmp,
    Other,
}

impl FormatTag {
    pub fn from_extension(ext: &str) -> FormatTag {
        match ext.to_ascii_lowercase().as_str() {
            "raw" | "cr2" | "cr3" | "nef" | "arw" | "dng" | "raf" | "orf" | "rw2" => {
                FormatTag::Raw
            }
            "png" => FormatTag::Png,
            "tiff" | "tif" => FormatTag::Tiff,
            "jpg" | "jpeg" => FormatTag::Jpeg,
            "webp" => FormatTag::Webp,
            "heic" | "heif" | "avif" => FormatTag::Heif,
            "gif" => FormatTag::Gif,
            "bmp" => FormatTag::Bmp,
            _ => FormatTag::Other,
        }
    }

    pub fn from_path(path: &Path) -> FormatTag {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(FormatTag::from_extension)
            .unwrap_or(FormatTag::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FormatTag::Raw => "RAW",
            FormatTag::Png => "PNG",
            FormatTag::Tiff => "TIFF",
            FormatTag::Jpeg => "JPEG",
            FormatTag::Webp => "WEBP",
            FormatTag::Heif => "HEIF",
            FormatTag::Gif => "GIF",
            FormatTag::Bmp => "BMP",
            FormatTag::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> FormatTag {
        match s {
            "RAW" => FormatTag::Raw,
            "PNG" => FormatTag::Png,
            "TIFF" => FormatTag::Tiff,
            "JPEG" => FormatTag::Jpeg,
            "WEBP" => FormatTag::Webp,
            "HEIF" => FormatTag::Heif,
            "GIF" => FormatTag::Gif,
            "BMP" => FormatTag::Bmp,
            _ => FormatTag::Other,
        }
    }
}

impl std::fmt::Display for FormatTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata for one successfully analyzed file. Immutable once produced.
///
/// `perceptual_hash` is absent for files that hashed but did not decode;
/// such records still take part in exact grouping. `width`/`height` are
/// meaningful only when the perceptual hash is present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// File modification time in nanoseconds since the Unix epoch. The
    /// cache writes and compares this same unit.
    pub mtime_ns: i64,
    /// SHA-256 over the full file contents.
    pub content_hash: [u8; 32],
    /// 64-bit DCT perceptual hash, raw bits.
    pub perceptual_hash: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub format_tag: FormatTag,
    /// Unix seconds at analyzer completion.
    pub analyzed_at: i64,
}

impl ImageRecord {
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// One file that failed analysis. Error records never enter groups; they
/// are reported alongside the scan result.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub path: PathBuf,
    pub kind: FileErrorKind,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(path: impl Into<PathBuf>, kind: FileErrorKind, message: impl Into<String>) -> Self {
        ErrorRecord {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Outcome of analyzing one file.
///
/// A file that hashes but fails to decode yields `Partial`: the record
/// (content hash only, no perceptual hash) stays eligible for exact
/// grouping while the paired error record is surfaced to the caller.
#[derive(Debug, Clone)]
pub enum Analysis {
    Complete(ImageRecord),
    Partial(ImageRecord, ErrorRecord),
    Failed(ErrorRecord),
}

impl Analysis {
    pub fn record(&self) -> Option<&ImageRecord> {
        match self {
            Analysis::Complete(record) | Analysis::Partial(record, _) => Some(record),
            Analysis::Failed(_) => None,
        }
    }
}

/// How the members of a duplicate group were matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Exact,
    Perceptual,
}

/// A set of two or more duplicate images. Members are ordered best-first
/// by the quality ranking; singletons are never emitted.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub id: u32,
    pub kind: GroupKind,
    pub members: Vec<ImageRecord>,
    /// Bytes reclaimed if every member except the best were removed.
    pub potential_savings_bytes: u64,
}

impl DuplicateGroup {
    /// `members` must already be sorted best-first.
    pub(crate) fn new(id: u32, kind: GroupKind, members: Vec<ImageRecord>) -> Self {
        debug_assert!(members.len() >= 2);
        let potential_savings_bytes = members.iter().skip(1).map(|m| m.size_bytes).sum();
        DuplicateGroup {
            id,
            kind,
            members,
            potential_savings_bytes,
        }
    }

    /// The highest-quality member.
    pub fn best(&self) -> &ImageRecord {
        &self.members[0]
    }

    /// Every member except the best.
    pub fn duplicates(&self) -> &[ImageRecord] {
        &self.members[1..]
    }
}
