use serde::Serialize;
use thiserror::Error;

/// Crate-level error. Per-file analysis failures are not errors; they are
/// recorded as [`crate::model::ErrorRecord`]s and never abort a scan.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("cache corrupt: {0}")]
    CacheCorrupt(String),

    #[error("bad argument: {0}")]
    BadArgument(String),

    #[error("scan cancelled")]
    Cancelled,
}

/// Classification of a single-file analysis failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileErrorKind {
    /// The file could not be stat'ed or read.
    Io,
    /// The bytes were readable but did not decode as an image.
    Decode,
    /// The format is recognized but not supported by the decoder.
    FormatUnsupported,
    /// The image decoded but the perceptual hash could not be computed.
    HashUnsupported,
}

impl FileErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileErrorKind::Io => "io",
            FileErrorKind::Decode => "decode",
            FileErrorKind::FormatUnsupported => "format_unsupported",
            FileErrorKind::HashUnsupported => "hash_unsupported",
        }
    }

    pub fn parse(s: &str) -> Option<FileErrorKind> {
        match s {
            "io" => Some(FileErrorKind::Io),
            "decode" => Some(FileErrorKind::Decode),
            "format_unsupported" => Some(FileErrorKind::FormatUnsupported),
            "hash_unsupported" => Some(FileErrorKind::HashUnsupported),
            _ => None,
        }
    }
}

impl std::fmt::Display for FileErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
