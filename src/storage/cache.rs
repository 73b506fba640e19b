//! SQLite-backed analysis cache.
//!
//! One row per path, keyed for validity on `(path, mtime, size_bytes)`; any
//! change to the triple invalidates. Writes are serialized behind a mutex,
//! so concurrent workers never observe torn records. Cache health is
//! best-effort: storage failures degrade to a computed result and never
//! fail the scan.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, FileErrorKind};
use crate::model::{Analysis, ErrorRecord, FormatTag, ImageRecord};

/// Bump when the table layout changes; a mismatch drops and rebuilds the
/// database (all content is recomputable).
const SCHEMA_VERSION: i64 = 1;

/// SQLite caps bound variables; delete batches stay well under the limit.
const DELETE_CHUNK: usize = 500;

const DEFAULT_CACHE_FILE: &str = ".duplicate_finder_cache.db";

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_entries: u64,
    pub bytes_on_disk: u64,
    pub path: PathBuf,
}

/// What `get_or_compute` did for one path.
pub struct CacheResult {
    pub analysis: Analysis,
    pub hit: bool,
    /// True when a storage error forced a cache bypass for this call.
    pub degraded: bool,
}

pub struct ImageCache {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl ImageCache {
    /// Open (or create) the cache database at `path`.
    pub fn open(path: &Path) -> Result<Self, Error> {
        match Self::try_open(path) {
            Ok(cache) => Ok(cache),
            Err(first_err) => {
                // A cache that cannot even initialize holds nothing worth
                // keeping; drop the file and start over.
                warn!(
                    "Cache at {} failed to open ({}); rebuilding",
                    path.display(),
                    first_err
                );
                let _ = std::fs::remove_file(path);
                Self::try_open(path)
                    .map_err(|e| Error::CacheCorrupt(format!("{}: {}", path.display(), e)))
            }
        }
    }

    /// Open the cache at its default location in the user's home directory.
    pub fn open_default() -> Result<Self, Error> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::BadArgument("cannot resolve home directory".to_string()))?;
        Self::open(&home.join(DEFAULT_CACHE_FILE))
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()?;
        let cache = ImageCache {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        };
        cache.configure_pragmas()?;
        cache.migrate_schema()?;
        Ok(cache)
    }

    fn try_open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        let cache = ImageCache {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        };
        cache.configure_pragmas()?;
        cache.migrate_schema()?;
        Ok(cache)
    }

    fn configure_pragmas(&self) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Check the recorded schema version; on mismatch drop the cache table
    /// and recreate from scratch.
    fn migrate_schema(&self) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )?;
        let version: Option<i64> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .and_then(|v| v.parse().ok());

        if version != Some(SCHEMA_VERSION) {
            debug!(
                "Cache schema version {:?} != {}, rebuilding tables",
                version, SCHEMA_VERSION
            );
            conn.execute("DROP TABLE IF EXISTS image_cache", [])?;
        }

        conn.execute_batch(include_str!("schema.sql"))?;
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )?;
        Ok(())
    }

    /// Return the cached record when `(path, mtime, size)` matches,
    /// otherwise run `compute` and write its record through.
    ///
    /// The lookup and the upsert each take the storage lock briefly;
    /// `compute` runs outside it so slow decodes do not serialize workers.
    /// Each path is dispatched once per scan, so no two callers compute the
    /// same path concurrently.
    pub fn get_or_compute(
        &self,
        path: &Path,
        size_bytes: u64,
        mtime_ns: i64,
        compute: impl FnOnce() -> Analysis,
    ) -> CacheResult {
        match self.lookup(path, size_bytes, mtime_ns) {
            Ok(Some((record, error_kind))) => CacheResult {
                analysis: cached_analysis(record, error_kind),
                hit: true,
                degraded: false,
            },
            Ok(None) => {
                let analysis = compute();
                let mut degraded = false;
                if let Some(record) = analysis.record() {
                    let error_kind = match &analysis {
                        Analysis::Partial(_, error) => Some(error.kind),
                        _ => None,
                    };
                    if let Err(e) = self.store(record, error_kind) {
                        debug!("Cache write failed for {}: {}", path.display(), e);
                        degraded = true;
                    }
                }
                CacheResult {
                    analysis,
                    hit: false,
                    degraded,
                }
            }
            Err(e) => {
                debug!("Cache lookup failed for {}: {}", path.display(), e);
                CacheResult {
                    analysis: compute(),
                    hit: false,
                    degraded: true,
                }
            }
        }
    }

    fn lookup(
        &self,
        path: &Path,
        size_bytes: u64,
        mtime_ns: i64,
    ) -> Result<Option<(ImageRecord, Option<FileErrorKind>)>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT size_bytes, mtime, content_hash, phash, width, height, \
                        bit_depth, format_tag, error_kind, analyzed_at \
                 FROM image_cache WHERE path = ?1",
                params![path_key(path)],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                        row.get::<_, Option<Vec<u8>>>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, Option<String>>(8)?,
                        row.get::<_, i64>(9)?,
                    ))
                },
            )
            .optional()?;

        let Some((
            size,
            mtime,
            content_hash,
            phash,
            width,
            height,
            bit_depth,
            format_tag,
            error_kind,
            analyzed_at,
        )) = row
        else {
            return Ok(None);
        };

        if size != size_bytes as i64 || mtime != mtime_ns {
            // Stale entry; the upsert after recompute replaces it.
            return Ok(None);
        }

        let Ok(content_hash) = <[u8; 32]>::try_from(content_hash.as_slice()) else {
            return Ok(None);
        };
        let perceptual_hash = phash
            .as_deref()
            .and_then(|b| <[u8; 8]>::try_from(b).ok())
            .map(u64::from_be_bytes);

        conn.execute(
            "UPDATE image_cache SET last_access_at = ?1 WHERE path = ?2",
            params![Utc::now().timestamp(), path_key(path)],
        )?;

        let record = ImageRecord {
            path: path.to_path_buf(),
            size_bytes: size as u64,
            mtime_ns: mtime,
            content_hash,
            perceptual_hash,
            width: width as u32,
            height: height as u32,
            bit_depth: bit_depth as u8,
            format_tag: FormatTag::parse(&format_tag),
            analyzed_at,
        };
        let error_kind = error_kind.as_deref().and_then(FileErrorKind::parse);
        Ok(Some((record, error_kind)))
    }

    fn store(
        &self,
        record: &ImageRecord,
        error_kind: Option<FileErrorKind>,
    ) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "INSERT OR REPLACE INTO image_cache \
             (path, size_bytes, mtime, content_hash, phash, width, height, \
              bit_depth, format_tag, error_kind, analyzed_at, last_access_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;
        stmt.execute(params![
            path_key(&record.path),
            record.size_bytes as i64,
            record.mtime_ns,
            record.content_hash.as_slice(),
            record.perceptual_hash.map(|h| h.to_be_bytes().to_vec()),
            record.width as i64,
            record.height as i64,
            record.bit_depth as i64,
            record.format_tag.as_str(),
            error_kind.map(|k| k.as_str()),
            record.analyzed_at,
            Utc::now().timestamp(),
        ])?;
        Ok(())
    }

    pub fn stats(&self) -> Result<CacheStats, Error> {
        let total_entries: i64 = {
            let conn = self.conn.lock().unwrap();
            conn.query_row("SELECT COUNT(*) FROM image_cache", [], |row| row.get(0))?
        };
        let bytes_on_disk = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        Ok(CacheStats {
            total_entries: total_entries as u64,
            bytes_on_disk,
            path: self.path.clone(),
        })
    }

    /// Drop every entry and compact the file.
    pub fn clear(&self) -> Result<(), Error> {
        {
            let conn = self.conn.lock().unwrap();
            conn.execute("DELETE FROM image_cache", [])?;
        }
        self.vacuum()
    }

    /// Remove entries whose path no longer exists on disk. Returns the
    /// number removed.
    pub fn cleanup_missing(&self) -> Result<usize, Error> {
        let paths: Vec<String> = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare("SELECT path FROM image_cache")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };

        let missing: Vec<String> = paths
            .into_iter()
            .filter(|p| !Path::new(p).exists())
            .collect();

        {
            let conn = self.conn.lock().unwrap();
            for chunk in missing.chunks(DELETE_CHUNK) {
                let placeholders = vec!["?"; chunk.len()].join(",");
                conn.execute(
                    &format!("DELETE FROM image_cache WHERE path IN ({placeholders})"),
                    rusqlite::params_from_iter(chunk.iter()),
                )?;
            }
        }

        debug!("Removed {} cache entries for missing files", missing.len());
        Ok(missing.len())
    }

    /// Remove entries not accessed within `max_age_days`, then compact.
    /// Returns the number removed.
    pub fn cleanup_stale(&self, max_age_days: u32) -> Result<usize, Error> {
        let cutoff = Utc::now().timestamp() - max_age_days as i64 * 86_400;
        let removed = {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "DELETE FROM image_cache WHERE last_access_at < ?1",
                params![cutoff],
            )?
        };
        self.vacuum()?;
        debug!("Removed {} stale cache entries", removed);
        Ok(removed)
    }

    /// Drop the entry for one path.
    pub fn invalidate(&self, path: &Path) -> Result<(), Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM image_cache WHERE path = ?1",
            params![path_key(path)],
        )?;
        Ok(())
    }

    /// Drop every entry under a directory prefix.
    pub fn invalidate_directory(&self, dir: &Path) -> Result<(), Error> {
        let mut prefix = path_key(dir);
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM image_cache WHERE path LIKE ?1 || '%'",
            params![prefix],
        )?;
        Ok(())
    }

    fn vacuum(&self) -> Result<(), Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("VACUUM")?;
        Ok(())
    }
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// A cached partial record (no perceptual hash) re-reports its original
/// failure kind so warm scans surface the same error list as cold ones.
fn cached_analysis(record: ImageRecord, error_kind: Option<FileErrorKind>) -> Analysis {
    if record.perceptual_hash.is_some() {
        Analysis::Complete(record)
    } else {
        let error = ErrorRecord::new(
            record.path.clone(),
            error_kind.unwrap_or(FileErrorKind::Decode),
            "image could not be decoded (cached result)",
        );
        Analysis::Partial(record, error)
    }
}
