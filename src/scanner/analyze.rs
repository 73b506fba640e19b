//! Single-file analysis: content hash, decode, perceptual hash, metadata.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::decoder::ImageDecoder;
use crate::error::FileErrorKind;
use crate::model::{Analysis, ErrorRecord, FormatTag, ImageRecord};

const HASH_CHUNK: usize = 64 * 1024;

/// Analyze one file. Deterministic: identical bytes and the same decoder
/// always produce the same record.
///
/// A read failure fails the file outright; a decode failure produces a
/// partial record (content hash only, `format_tag = Other`) that remains
/// usable for exact grouping, paired with the error for reporting.
pub fn analyze_file(
    path: &Path,
    size_bytes: u64,
    mtime_ns: i64,
    decoder: &dyn ImageDecoder,
) -> Analysis {
    let content_hash = match hash_file(path) {
        Ok(digest) => digest,
        Err(err) => {
            return Analysis::Failed(ErrorRecord::new(
                path,
                FileErrorKind::Io,
                format!("read failed: {err}"),
            ));
        }
    };

    match decoder.decode(path) {
        Ok(decoded) => Analysis::Complete(ImageRecord {
            path: path.to_path_buf(),
            size_bytes,
            mtime_ns,
            content_hash,
            perceptual_hash: Some(decoded.perceptual_hash),
            width: decoded.width,
            height: decoded.height,
            bit_depth: decoded.bit_depth,
            format_tag: decoded.format_tag,
            analyzed_at: Utc::now().timestamp(),
        }),
        Err(err) => {
            debug!("Decode failed for {}: {}", path.display(), err);
            let record = ImageRecord {
                path: path.to_path_buf(),
                size_bytes,
                mtime_ns,
                content_hash,
                perceptual_hash: None,
                width: 0,
                height: 0,
                bit_depth: 8,
                format_tag: FormatTag::Other,
                analyzed_at: Utc::now().timestamp(),
            };
            let error = ErrorRecord::new(path, err.kind(), err.to_string());
            Analysis::Partial(record, error)
        }
    }
}

/// SHA-256 over the full file contents, streamed in fixed-size chunks.
pub fn hash_file(path: &Path) -> std::io::Result<[u8; 32]> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_CHUNK];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize().into())
}

/// File mtime in nanoseconds since the Unix epoch; pre-epoch times map to
/// negative values.
pub fn mtime_nanos(mtime: SystemTime) -> i64 {
    match mtime.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as i64,
        Err(e) => -(e.duration().as_nanos() as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{DecodeError, DecodedImage};
    use std::fs;
    use tempfile::tempdir;

    struct FixedDecoder(Result<DecodedImage, ()>);

    impl ImageDecoder for FixedDecoder {
        fn decode(&self, _path: &Path) -> Result<DecodedImage, DecodeError> {
            self.0
                .map_err(|_| DecodeError::Malformed("synthetic failure".to_string()))
        }
    }

    fn decoded() -> DecodedImage {
        DecodedImage {
            width: 640,
            height: 480,
            bit_depth: 24,
            format_tag: FormatTag::Jpeg,
            perceptual_hash: 0xabcd,
        }
    }

    #[test]
    fn test_sha256_of_known_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hello.jpg");
        fs::write(&path, b"hello world").unwrap();

        let digest = hash_file(&path).unwrap();
        // Leading bytes of sha256("hello world").
        assert_eq!(&digest[..4], &[0xb9, 0x4d, 0x27, 0xb9]);
    }

    #[test]
    fn test_complete_record_carries_decoded_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("img.jpg");
        fs::write(&path, b"fake image bytes").unwrap();

        let analysis = analyze_file(&path, 16, 123, &FixedDecoder(Ok(decoded())));
        let Analysis::Complete(record) = analysis else {
            panic!("expected complete analysis");
        };
        assert_eq!(record.size_bytes, 16);
        assert_eq!(record.mtime_ns, 123);
        assert_eq!(record.perceptual_hash, Some(0xabcd));
        assert_eq!(record.width, 640);
        assert_eq!(record.format_tag, FormatTag::Jpeg);
    }

    #[test]
    fn test_decode_failure_keeps_hashable_partial() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        fs::write(&path, b"not an image").unwrap();

        let analysis = analyze_file(&path, 12, 0, &FixedDecoder(Err(())));
        let Analysis::Partial(record, error) = analysis else {
            panic!("expected partial analysis");
        };
        assert!(record.perceptual_hash.is_none());
        assert_eq!(record.format_tag, FormatTag::Other);
        assert_eq!(record.content_hash, hash_file(&path).unwrap());
        assert_eq!(error.kind, FileErrorKind::Decode);
    }

    #[test]
    fn test_missing_file_fails_with_io() {
        let analysis = analyze_file(
            Path::new("/nonexistent/file.jpg"),
            0,
            0,
            &FixedDecoder(Ok(decoded())),
        );
        let Analysis::Failed(error) = analysis else {
            panic!("expected failed analysis");
        };
        assert_eq!(error.kind, FileErrorKind::Io);
    }

    #[test]
    fn test_hash_is_deterministic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("same.png");
        fs::write(&path, vec![0x5a; 200_000]).unwrap();
        assert_eq!(hash_file(&path).unwrap(), hash_file(&path).unwrap());
    }
}
