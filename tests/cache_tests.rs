use std::fs;
use std::path::Path;

use imagedup_core::model::Analysis;
use imagedup_core::{FileErrorKind, FormatTag, ImageCache, ImageRecord};
use tempfile::tempdir;

fn record_for(path: &Path, size_bytes: u64, mtime_ns: i64, phash: Option<u64>) -> ImageRecord {
    let mut content_hash = [0u8; 32];
    content_hash[0] = size_bytes as u8;
    content_hash[1] = (mtime_ns & 0xff) as u8;
    ImageRecord {
        path: path.to_path_buf(),
        size_bytes,
        mtime_ns,
        content_hash,
        perceptual_hash: phash,
        width: 800,
        height: 600,
        bit_depth: 24,
        format_tag: FormatTag::Jpeg,
        analyzed_at: 1_700_000_000,
    }
}

#[test]
fn test_round_trip_returns_equal_record() {
    let cache = ImageCache::open_in_memory().unwrap();
    let path = Path::new("/photos/a.jpg");
    let original = record_for(path, 1234, 99_000_000_001, Some(0xfeed_f00d_dead_beef));

    let stored = original.clone();
    let first = cache.get_or_compute(path, 1234, 99_000_000_001, move || {
        Analysis::Complete(stored)
    });
    assert!(!first.hit);
    assert!(!first.degraded);

    let second = cache.get_or_compute(path, 1234, 99_000_000_001, || {
        panic!("compute must not run on a cache hit")
    });
    assert!(second.hit);
    let Analysis::Complete(cached) = second.analysis else {
        panic!("expected complete analysis from cache");
    };
    assert_eq!(cached, original);
}

#[test]
fn test_mtime_change_invalidates() {
    let cache = ImageCache::open_in_memory().unwrap();
    let path = Path::new("/photos/a.jpg");

    cache.get_or_compute(path, 100, 1, || {
        Analysis::Complete(record_for(path, 100, 1, Some(1)))
    });

    let recomputed = cache.get_or_compute(path, 100, 2, || {
        Analysis::Complete(record_for(path, 100, 2, Some(2)))
    });
    assert!(!recomputed.hit);
    let Analysis::Complete(record) = recomputed.analysis else {
        panic!("expected fresh record");
    };
    assert_eq!(record.perceptual_hash, Some(2));
}

#[test]
fn test_size_change_invalidates() {
    let cache = ImageCache::open_in_memory().unwrap();
    let path = Path::new("/photos/a.jpg");

    cache.get_or_compute(path, 100, 1, || {
        Analysis::Complete(record_for(path, 100, 1, Some(1)))
    });
    let recomputed = cache.get_or_compute(path, 101, 1, || {
        Analysis::Complete(record_for(path, 101, 1, Some(3)))
    });
    assert!(!recomputed.hit);
}

#[test]
fn test_one_entry_per_path_after_invalidation() {
    let cache = ImageCache::open_in_memory().unwrap();
    let path = Path::new("/photos/a.jpg");

    cache.get_or_compute(path, 100, 1, || {
        Analysis::Complete(record_for(path, 100, 1, Some(1)))
    });
    cache.get_or_compute(path, 100, 2, || {
        Analysis::Complete(record_for(path, 100, 2, Some(2)))
    });

    let stats = cache.stats().unwrap();
    assert_eq!(stats.total_entries, 1);

    // The surviving row is the newest key.
    let hit = cache.get_or_compute(path, 100, 2, || panic!("should hit"));
    assert!(hit.hit);
}

#[test]
fn test_partial_record_rehit_reports_decode_error() {
    let cache = ImageCache::open_in_memory().unwrap();
    let path = Path::new("/photos/broken.jpg");

    let first = cache.get_or_compute(path, 10, 1, || {
        let record = record_for(path, 10, 1, None);
        let error = imagedup_core::ErrorRecord::new(path, FileErrorKind::Decode, "bad data");
        Analysis::Partial(record, error)
    });
    assert!(!first.hit);

    let second = cache.get_or_compute(path, 10, 1, || panic!("should hit"));
    assert!(second.hit);
    let Analysis::Partial(record, error) = second.analysis else {
        panic!("cached partial must re-report its decode failure");
    };
    assert!(record.perceptual_hash.is_none());
    assert_eq!(error.kind, FileErrorKind::Decode);
}

#[test]
fn test_partial_rehit_preserves_error_kind() {
    let cache = ImageCache::open_in_memory().unwrap();
    let path = Path::new("/photos/shot.cr2");

    // Cold scan: a RAW file the decoder does not support.
    let first = cache.get_or_compute(path, 10, 1, || {
        let record = record_for(path, 10, 1, None);
        let error = imagedup_core::ErrorRecord::new(
            path,
            FileErrorKind::FormatUnsupported,
            "unsupported image format: cr2",
        );
        Analysis::Partial(record, error)
    });
    assert!(!first.hit);

    // Warm scan must report the same error kind, not a generic decode
    // failure.
    let second = cache.get_or_compute(path, 10, 1, || panic!("should hit"));
    assert!(second.hit);
    let Analysis::Partial(_, error) = second.analysis else {
        panic!("expected cached partial");
    };
    assert_eq!(error.kind, FileErrorKind::FormatUnsupported);
}

#[test]
fn test_failed_analysis_is_not_cached() {
    let cache = ImageCache::open_in_memory().unwrap();
    let path = Path::new("/photos/gone.jpg");

    cache.get_or_compute(path, 10, 1, || {
        Analysis::Failed(imagedup_core::ErrorRecord::new(
            path,
            FileErrorKind::Io,
            "read failed",
        ))
    });
    assert_eq!(cache.stats().unwrap().total_entries, 0);

    let again = cache.get_or_compute(path, 10, 1, || {
        Analysis::Complete(record_for(path, 10, 1, Some(9)))
    });
    assert!(!again.hit);
}

#[test]
fn test_clear_drops_everything() {
    let cache = ImageCache::open_in_memory().unwrap();
    for i in 0..5 {
        let path = format!("/photos/{i}.jpg");
        let path = Path::new(&path);
        cache.get_or_compute(path, i, 0, || {
            Analysis::Complete(record_for(path, i, 0, Some(i)))
        });
    }
    assert_eq!(cache.stats().unwrap().total_entries, 5);
    cache.clear().unwrap();
    assert_eq!(cache.stats().unwrap().total_entries, 0);
}

#[test]
fn test_cleanup_missing_removes_dead_paths() {
    let dir = tempdir().unwrap();
    let cache = ImageCache::open_in_memory().unwrap();

    let live = dir.path().join("live.jpg");
    fs::write(&live, "content").unwrap();
    cache.get_or_compute(&live, 7, 0, || {
        Analysis::Complete(record_for(&live, 7, 0, Some(1)))
    });

    let dead = dir.path().join("dead.jpg");
    cache.get_or_compute(&dead, 7, 0, || {
        Analysis::Complete(record_for(&dead, 7, 0, Some(2)))
    });

    let removed = cache.cleanup_missing().unwrap();
    assert_eq!(removed, 1);
    assert_eq!(cache.stats().unwrap().total_entries, 1);
}

#[test]
fn test_cleanup_stale_by_age() {
    let cache = ImageCache::open_in_memory().unwrap();
    let path = Path::new("/photos/old.jpg");
    cache.get_or_compute(path, 1, 0, || {
        Analysis::Complete(record_for(path, 1, 0, Some(1)))
    });

    // Everything was touched just now, so a 1-day cutoff removes nothing.
    assert_eq!(cache.cleanup_stale(1).unwrap(), 0);
    assert_eq!(cache.stats().unwrap().total_entries, 1);
}

#[test]
fn test_invalidate_single_path() {
    let cache = ImageCache::open_in_memory().unwrap();
    let a = Path::new("/photos/a.jpg");
    let b = Path::new("/photos/b.jpg");
    cache.get_or_compute(a, 1, 0, || Analysis::Complete(record_for(a, 1, 0, Some(1))));
    cache.get_or_compute(b, 1, 0, || Analysis::Complete(record_for(b, 1, 0, Some(2))));

    cache.invalidate(a).unwrap();
    assert_eq!(cache.stats().unwrap().total_entries, 1);
    assert!(!cache.get_or_compute(a, 1, 0, || Analysis::Complete(record_for(a, 1, 0, Some(1)))).hit);
}

#[test]
fn test_invalidate_directory_prefix() {
    let cache = ImageCache::open_in_memory().unwrap();
    let inside = Path::new("/photos/album/x.jpg");
    let outside = Path::new("/photos/albumette/y.jpg");
    cache.get_or_compute(inside, 1, 0, || {
        Analysis::Complete(record_for(inside, 1, 0, Some(1)))
    });
    cache.get_or_compute(outside, 1, 0, || {
        Analysis::Complete(record_for(outside, 1, 0, Some(2)))
    });

    cache.invalidate_directory(Path::new("/photos/album")).unwrap();
    let stats = cache.stats().unwrap();
    // Prefix match is directory-aware: "albumette" survives.
    assert_eq!(stats.total_entries, 1);
}

#[test]
fn test_persistent_cache_survives_reopen() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("cache.db");
    let file = dir.path().join("img.jpg");
    fs::write(&file, "payload").unwrap();

    {
        let cache = ImageCache::open(&db_path).unwrap();
        cache.get_or_compute(&file, 7, 42, || {
            Analysis::Complete(record_for(&file, 7, 42, Some(0x1122)))
        });
    }

    let cache = ImageCache::open(&db_path).unwrap();
    let hit = cache.get_or_compute(&file, 7, 42, || panic!("should hit after reopen"));
    assert!(hit.hit);
    let stats = cache.stats().unwrap();
    assert_eq!(stats.total_entries, 1);
    assert!(stats.bytes_on_disk > 0);
    assert_eq!(stats.path, db_path);
}

#[test]
fn test_garbage_database_file_is_rebuilt() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("cache.db");
    fs::write(&db_path, "this is not a sqlite database at all").unwrap();

    let cache = ImageCache::open(&db_path).unwrap();
    assert_eq!(cache.stats().unwrap().total_entries, 0);
}
