use std::path::Path;

use image_hasher::{HashAlg, HasherConfig};
use thiserror::Error;

use crate::error::FileErrorKind;
use crate::model::FormatTag;

/// Failure to turn a file into pixels and a perceptual hash.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported image format: {0}")]
    Unsupported(String),

    #[error("corrupt or truncated image: {0}")]
    Malformed(String),

    #[error("perceptual hash failed: {0}")]
    HashFailed(String),
}

impl DecodeError {
    pub fn kind(&self) -> FileErrorKind {
        match self {
            DecodeError::Io(_) => FileErrorKind::Io,
            DecodeError::Unsupported(_) => FileErrorKind::FormatUnsupported,
            DecodeError::Malformed(_) => FileErrorKind::Decode,
            DecodeError::HashFailed(_) => FileErrorKind::HashUnsupported,
        }
    }
}

/// What the decoder extracts from one image file.
#[derive(Debug, Clone, Copy)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub format_tag: FormatTag,
    /// 64-bit block-DCT perceptual hash.
    pub perceptual_hash: u64,
}

/// Capability consumed by the analyzer: given a path, produce pixel
/// dimensions, bit depth, a format tag, and a perceptual hash.
///
/// The perceptual hash algorithm (block DCT, 8x8 quantized) is part of the
/// contract: changing it invalidates every cached hash.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<DecodedImage, DecodeError>;
}

/// Default decoder backed by the `image` crate with an `image_hasher`
/// DCT hash. Covers the common raster formats; RAW and HEIF files fall out
/// as [`DecodeError::Unsupported`] and keep their exact-match ability
/// through the content hash.
#[derive(Debug, Default)]
pub struct StandardDecoder;

impl StandardDecoder {
    pub fn new() -> Self {
        StandardDecoder
    }
}

impl ImageDecoder for StandardDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedImage, DecodeError> {
        let img = image::open(path).map_err(|e| match e {
            image::ImageError::IoError(io) => DecodeError::Io(io),
            image::ImageError::Unsupported(u) => DecodeError::Unsupported(u.to_string()),
            other => DecodeError::Malformed(other.to_string()),
        })?;

        // Hashers are cheap to build and not shared across worker threads.
        let hasher = HasherConfig::new()
            .hash_size(8, 8)
            .hash_alg(HashAlg::Median)
            .preproc_dct()
            .to_hasher();
        let hash = hasher.hash_image(&img);
        let bits: [u8; 8] = hash
            .as_bytes()
            .try_into()
            .map_err(|_| DecodeError::HashFailed("hash is not 64 bits".to_string()))?;

        let bit_depth = img.color().bits_per_pixel().clamp(1, 48) as u8;

        Ok(DecodedImage {
            width: img.width(),
            height: img.height(),
            bit_depth,
            format_tag: FormatTag::from_path(path),
            perceptual_hash: u64::from_be_bytes(bits),
        })
    }
}
